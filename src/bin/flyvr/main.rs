//! Runs the closed-loop tracking rig.

use clap::Parser;
use flyvr::{
    args::{CommandTask, HomeCommand, RigArgs, RunCommand, StageOptions},
    config::RigConfig,
    error::RigError,
    rig::{self, RunOptions},
    stim::LogRenderer,
};

use env_logger::Env;
use log::{error, info};
use std::io::Write;
use std::process;

// Example:
// cargo run -- run --config rig.ron --duration 600
// cargo run -- run --simulate --no-keys
// cargo run -- home --port /dev/ttyACM0

fn main() {
    // Raw mode turns off the terminal's own newline translation, so every
    // record ends in an explicit carriage return.
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}] {}\r",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = RigArgs::parse();
    let res = match args.command {
        CommandTask::Run(run) => run_rig(run),
        CommandTask::Home(home) => home_stage(home),
        CommandTask::Ports => list_ports(),
    };

    if let Err(e) = res {
        error!("{}", e);
        process::exit(1);
    }
}

fn load_config(options: &StageOptions) -> Result<RigConfig, RigError> {
    let config = match &options.config {
        Some(path) => {
            info!("Loading configuration from {}.", path.display());
            RigConfig::from_path(path)?
        }
        None => RigConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run_rig(run: RunCommand) -> Result<(), RigError> {
    let mut config = load_config(&run.stage)?;
    if run.duration.is_some() {
        config.tracker.max_duration = run.duration;
    }

    let port = if run.simulate {
        None
    } else {
        Some(rig::choose_port(run.stage.port.as_deref(), &config.stage)?)
    };
    let options = RunOptions {
        port,
        frames: run.frames,
        simulate: run.simulate,
        keys: !run.no_keys,
    };

    let mut renderer = LogRenderer::new();
    rig::run(&config, &options, &mut renderer)?;
    Ok(())
}

fn home_stage(home: HomeCommand) -> Result<(), RigError> {
    let config = load_config(&home.stage)?;
    let port = rig::choose_port(home.stage.port.as_deref(), &config.stage)?;
    let status = rig::home(&config.stage, &port)?;
    println!(
        "Stage {} at ({:.3}, {:.3}, {:.3})",
        status.state, status.x, status.y, status.z
    );
    Ok(())
}

fn list_ports() -> Result<(), RigError> {
    let ports = rig::ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{}", port.to_string_lossy());
    }
    Ok(())
}
