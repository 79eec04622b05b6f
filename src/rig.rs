//! Brings the whole rig up, runs the main loop, and takes it down again.
//!
//! Startup order is fixed: configuration is validated and the stimulus
//! sequencer built first, then the stage worker connects to the controller,
//! then the vision worker opens its frame source. Each worker is fully
//! initialized before the next one starts, so a missing device aborts the
//! run before anything moves. The main loop then runs on the calling thread
//! until the configured duration is up, the operator quits, or a worker dies.

use crate::cell::{CommandCell, LatestCell};
use crate::config::{secs, ConfigError, RigConfig, StageConfig, TrackerConfig};
use crate::error::RigError;
use crate::fusion::{PoseFusion, Pose3D};
use crate::gui::port_selector;
use crate::input::{OperatorCommand, TerminalKeys};
use crate::recorder::CsvRecorder;
use crate::stage::grbl::GrblBoard;
use crate::stage::link::{SerialLink, StageLink};
use crate::stage::poller::StagePoller;
use crate::stage::sim::SimulatedGrbl;
use crate::stage::{timestamp, StageStatus};
use crate::stim::{Renderer, Sequencer};
use crate::time_manager::TimeManager;
use crate::vision::{FlyPose, SourceKind, VisionLoop};
use crate::worker::Worker;

use log::{debug, info, warn};
use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::{Duration, Instant};

// Seconds between status polls of the simulated controller.
const SIM_POLL_INTERVAL: f64 = 5e-3;

const POSE_HEADER: &str = "timestamp,x,y,z,yaw,trial,state,t,rotation";

/// How a run is wired to the outside world.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Serial port of the stage controller. Ignored when simulating.
    pub port: Option<String>,
    /// Replay frames from this directory instead of opening a camera.
    pub frames: Option<PathBuf>,
    /// Use the simulated controller, and the synthetic camera unless
    /// `frames` is set.
    pub simulate: bool,
    /// Read operator keys from the terminal.
    pub keys: bool,
}

/// Why the main loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured run time was used up.
    Duration,
    /// The operator quit.
    Quit,
}

/// What a finished run looked like.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// What ended the run.
    pub reason: StopReason,
    /// Wall-clock time the main loop ran for.
    pub elapsed: Duration,
    /// Main loop iterations.
    pub ticks: u64,
    /// Main loop iterations that ran past their target duration.
    pub overruns: u64,
}

/// Picks the stage port: the command line wins over the configuration,
/// and with neither the operator is asked, if there is a terminal to ask on.
pub fn choose_port(cli: Option<&str>, config: &StageConfig) -> Result<String, RigError> {
    if let Some(port) = cli.or(config.port.as_deref()) {
        return Ok(port.to_owned());
    }
    if !std::io::stdin().is_terminal() {
        return Err(ConfigError::Invalid("no stage port configured".to_owned()).into());
    }

    match port_selector(SerialLink::available_ports()?)? {
        Some(port) => Ok(port.to_string_lossy().into_owned()),
        None => Err(ConfigError::Invalid("no stage port selected".to_owned()).into()),
    }
}

/// Serial ports present on this machine.
pub fn ports() -> Result<Vec<PathBuf>, RigError> {
    Ok(SerialLink::available_ports()?)
}

/// Connects to the controller on `port`, runs the homing cycle, and returns
/// the status it ended up in.
pub fn home(config: &StageConfig, port: &str) -> Result<StageStatus, RigError> {
    let config = StageConfig {
        home_on_startup: true,
        ..config.clone()
    };
    let link = SerialLink::open(port, config.baud_rate, secs(config.read_timeout))?;
    let mut board = GrblBoard::connect(link, &config)?;
    Ok(board.read_status()?)
}

/// Runs the rig until it is told to stop. Every frame goes to `renderer`.
pub fn run(
    config: &RigConfig,
    options: &RunOptions,
    renderer: &mut dyn Renderer,
) -> Result<RunSummary, RigError> {
    config.validate()?;
    let sequencer = Sequencer::new(&config.stimulus)?;

    let record_dir = config.record.dir.clone();
    if let Some(dir) = &record_dir {
        if let Err(e) = fs::create_dir_all(dir) {
            warn!("Cannot create {}: {}", dir.display(), e);
        }
    }

    let status_cell = LatestCell::new(StageStatus::default());
    let fly_cell = LatestCell::new(FlyPose::default());
    let commands = CommandCell::new();

    let mut stage = spawn_stage(
        &config.stage,
        options,
        status_cell.clone(),
        commands.clone(),
        record_dir.clone(),
    )?;

    let source = match (&options.frames, options.simulate) {
        (Some(dir), _) => SourceKind::Directory(dir.clone()),
        (None, true) => SourceKind::Dummy,
        (None, false) => SourceKind::Camera(config.camera.device),
    };
    let camera = config.camera.clone();
    let vision_cell = fly_cell.clone();
    let vision_dir = record_dir.clone();
    let mut vision = Worker::spawn(
        "CameraThread",
        move || {
            let recorder = CsvRecorder::maybe_create(
                vision_dir.as_deref(),
                "camera.csv",
                "timestamp,present,x,y,angle",
            );
            let source = source.open(&camera)?;
            Ok(VisionLoop::new(source, &camera, vision_cell).with_recorder(recorder))
        },
        |vision: &mut VisionLoop| {
            vision.run_once()?;
            Ok(())
        },
    )?;

    let keys = if options.keys {
        match TerminalKeys::open(config.tracker.jog_step) {
            Ok(keys) => {
                info!("Keys: arrows jog, t toggles tracking, s prints status, q quits.");
                Some(keys)
            }
            Err(e) => {
                warn!("No operator keys: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut main = MainLoop {
        config: &config.tracker,
        fusion: PoseFusion::new(&config.tracker),
        sequencer,
        fly_cell,
        status_cell,
        commands,
        pose: Pose3D::default(),
        keys,
        recorder: CsvRecorder::maybe_create(
            record_dir.as_deref(),
            "pose.csv",
            POSE_HEADER,
        ),
    };
    let result = main.run(&mut [&mut stage, &mut vision], renderer);
    // Restore the terminal before the workers log their shutdown.
    drop(main);

    let vision_res = vision.stop();
    let stage_res = stage.stop();
    let summary = result?;
    vision_res?;
    stage_res?;

    info!(
        "Rig stopped ({:?}) after {:.1} s, {} ticks, {} overruns.",
        summary.reason,
        summary.elapsed.as_secs_f64(),
        summary.ticks,
        summary.overruns
    );
    Ok(summary)
}

fn spawn_stage(
    config: &StageConfig,
    options: &RunOptions,
    status_cell: LatestCell<StageStatus>,
    commands: CommandCell,
    record_dir: Option<PathBuf>,
) -> Result<Worker, RigError> {
    let simulate = options.simulate;
    let port = if simulate {
        None
    } else {
        let port = options.port.clone().or_else(|| config.port.clone());
        Some(port.ok_or_else(|| ConfigError::Invalid("no stage port configured".to_owned()))?)
    };
    let config = if simulate {
        StageConfig {
            // No reset to wait out, and no serial round trip to pace polling.
            reset_delay: 0.0,
            poll_interval: config.poll_interval.max(SIM_POLL_INTERVAL),
            ..config.clone()
        }
    } else {
        config.clone()
    };

    Worker::spawn(
        "StageThread",
        move || {
            let link: Box<dyn StageLink> = match &port {
                Some(port) => Box::new(SerialLink::open(
                    port,
                    config.baud_rate,
                    secs(config.read_timeout),
                )?),
                None => Box::new(SimulatedGrbl::new(&config)),
            };
            let board = GrblBoard::connect(link, &config)?;
            let recorder = CsvRecorder::maybe_create(
                record_dir.as_deref(),
                "stage.csv",
                "timestamp,state,x,y,z",
            );
            Ok(StagePoller::new(board, &config, status_cell, commands).with_recorder(recorder))
        },
        |poller: &mut StagePoller<Box<dyn StageLink>>| {
            poller.run_once()?;
            Ok(())
        },
    )
}

// Finds the first worker whose loop has ended and reports why.
fn check_workers(workers: &mut [&mut Worker]) -> Result<(), RigError> {
    for worker in workers.iter_mut() {
        if !worker.is_running() {
            worker.stop()?;
            return Err(RigError::WorkerDied(worker.name().to_owned()));
        }
    }
    Ok(())
}

struct MainLoop<'a> {
    config: &'a TrackerConfig,
    fusion: PoseFusion,
    sequencer: Sequencer,
    fly_cell: LatestCell<FlyPose>,
    status_cell: LatestCell<StageStatus>,
    commands: CommandCell,
    pose: Pose3D,
    keys: Option<TerminalKeys>,
    recorder: Option<CsvRecorder>,
}

impl MainLoop<'_> {
    fn run(
        &mut self,
        workers: &mut [&mut Worker],
        renderer: &mut dyn Renderer,
    ) -> Result<RunSummary, RigError> {
        let loop_duration = secs(self.config.loop_duration);
        let max_duration = self.config.max_duration.map(secs);
        let status_interval = secs(self.config.status_interval);

        let mut time = TimeManager::new("MainThread");
        time.start();
        let mut ticks = 0;
        let mut last_status = Instant::now();

        let reason = loop {
            time.tick();
            if max_duration.is_some_and(|max| time.total_duration() >= max) {
                break StopReason::Duration;
            }
            check_workers(workers)?;

            let fly = self.fly_cell.read();
            let stage = self.status_cell.read();
            if let Some(out) = self.fusion.step(&fly, &stage) {
                self.pose = out.pose;
                if let Some(cmd) = out.command {
                    self.commands.submit(cmd.x, cmd.y);
                }
            }

            if self.handle_keys(&fly, &stage)? {
                break StopReason::Quit;
            }

            let now = Instant::now();
            // Read the name first: the update may finish the trial.
            let trial = self.sequencer.current_trial().map(str::to_owned);
            let report = self.sequencer.update(&self.pose, now)?;
            renderer.present(&self.pose, self.sequencer.scene());

            if let (Some(trial), Some(report)) = (&trial, &report) {
                debug!("{} {}", trial, report);
            }
            if let Some(rec) = self.recorder.as_mut() {
                let p = &self.pose;
                let stim = match report {
                    Some(r) => format!(
                        "{},{:.6},{:.6}",
                        r.state,
                        r.elapsed.as_secs_f64(),
                        r.rotation
                    ),
                    None => ",,".to_owned(),
                };
                rec.record(format_args!(
                    "{:.6},{:.6},{:.6},{:.6},{:.4},{},{}",
                    timestamp(),
                    p.x,
                    p.y,
                    p.z,
                    p.yaw,
                    trial.as_deref().unwrap_or(""),
                    stim
                ));
            }

            if now.duration_since(last_status) >= status_interval {
                self.log_status(&fly, &stage);
                last_status = now;
            }

            ticks += 1;
            time.wait_until(loop_duration);
        };

        Ok(RunSummary {
            reason,
            elapsed: time.total_duration(),
            ticks,
            overruns: time.overruns(),
        })
    }

    // Returns whether the operator asked to quit.
    fn handle_keys(&mut self, fly: &FlyPose, stage: &StageStatus) -> Result<bool, RigError> {
        let Some(keys) = self.keys.as_mut() else {
            return Ok(false);
        };

        for command in keys.poll()? {
            match command {
                OperatorCommand::Jog { dx, dy } if stage.valid => {
                    self.commands.submit(stage.x + dx, stage.y + dy);
                }
                OperatorCommand::Jog { .. } => warn!("No stage status yet, ignoring jog."),
                OperatorCommand::ToggleTracking => {
                    let on = !self.fusion.tracking();
                    self.fusion.set_tracking(on);
                    info!("Tracking {}.", if on { "on" } else { "off" });
                }
                OperatorCommand::PrintStatus => self.log_status(fly, stage),
                OperatorCommand::Quit => {
                    info!("Quit requested.");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn log_status(&self, fly: &FlyPose, stage: &StageStatus) {
        info!(
            "fly {} ({:.2}, {:.2}) {:.1} deg | stage {} ({:.2}, {:.2}) | tracking {} | {}",
            if fly.present { "present" } else { "absent" },
            fly.x,
            fly.y,
            fly.angle,
            stage.state,
            stage.x,
            stage.y,
            if self.fusion.tracking() { "on" } else { "off" },
            self.sequencer.current_trial().unwrap_or("interleave"),
        );
    }
}
