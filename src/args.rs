// Commandline argument parser using clap for the rig

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct RigArgs {
    #[command(subcommand, long_about)]
    /// Which task to perform
    pub command: CommandTask,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Run the closed-loop tracking rig
    #[command(about)]
    Run(RunCommand),

    /// Home the stage and report where it ended up
    #[command(about)]
    Home(HomeCommand),

    /// List serial ports
    #[command(about)]
    Ports,
}

/// Options shared by every command that talks to the stage.
#[derive(Debug, Args, Clone)]
pub struct StageOptions {
    /// RON configuration file; built-in defaults when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial port of the stage controller, overriding the configuration
    #[arg(short, long)]
    pub port: Option<String>,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct RunCommand {
    #[command(flatten)]
    pub stage: StageOptions,

    /// Replay frames from this directory instead of a camera
    #[arg(short, long)]
    pub frames: Option<PathBuf>,

    /// Use the simulated stage and synthetic camera; no hardware needed
    #[arg(long)]
    pub simulate: bool,

    /// Stop after this many seconds, overriding the configuration
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Do not read operator keys from the terminal
    #[arg(long)]
    pub no_keys: bool,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct HomeCommand {
    #[command(flatten)]
    pub stage: StageOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_with_options() {
        let args = RigArgs::parse_from([
            "flyvr", "run", "--config", "rig.ron", "--simulate", "--duration", "12.5", "--no-keys",
        ]);
        let CommandTask::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.stage.config, Some(PathBuf::from("rig.ron")));
        assert!(run.simulate && run.no_keys);
        assert_eq!(run.duration, Some(12.5));
        assert_eq!(run.frames, None);
    }

    #[test]
    fn home_takes_a_port() {
        let args = RigArgs::parse_from(["flyvr", "home", "-p", "/dev/ttyACM0"]);
        let CommandTask::Home(home) = args.command else {
            panic!("expected home");
        };
        assert_eq!(home.stage.port.as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn ports_has_no_options() {
        let args = RigArgs::parse_from(["flyvr", "ports"]);
        assert!(matches!(args.command, CommandTask::Ports));
    }
}
