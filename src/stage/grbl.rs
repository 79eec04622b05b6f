//! The GRBL protocol client: settings, homing, status queries and moves.

use super::status_decoder::StatusReport;
use super::{timestamp, StageError, StageLink, StageState, StageStatus};
use crate::config::{secs, StageConfig};

use log::{debug, info, trace};
use std::thread::sleep;
use std::time::Instant;

/// The rectangle the stage may be commanded into, in machine coordinates.
/// After homing the machine sits at the pull-off corner and all reachable
/// positions are negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    /// Lowest reachable x.
    pub x_min: f64,
    /// Highest reachable x.
    pub x_max: f64,
    /// Lowest reachable y.
    pub y_min: f64,
    /// Highest reachable y.
    pub y_max: f64,
}

impl Envelope {
    /// Whether `(x, y)` lies inside the envelope, edges included.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.x_min..=self.x_max).contains(&x) && (self.y_min..=self.y_max).contains(&y)
    }
}

/// A GRBL controller on the other end of a [`StageLink`].
#[derive(Debug)]
pub struct GrblBoard<L: StageLink> {
    link: L,
    config: StageConfig,
    envelope: Envelope,
    status: StageStatus,
}

impl<L: StageLink> GrblBoard<L> {
    /// Wraps an open link without talking to the device.
    pub fn new(link: L, config: &StageConfig) -> Self {
        Self {
            link,
            envelope: config.envelope(),
            config: config.clone(),
            status: StageStatus::default(),
        }
    }

    /// Wraps an open link and runs the full startup sequence. Blocks until
    /// the controller is configured, homed if it needed to be, and idle.
    pub fn connect(link: L, config: &StageConfig) -> Result<Self, StageError> {
        let mut board = Self::new(link, config);
        board.startup()?;
        Ok(board)
    }

    /// Brings the controller up from a fresh reset.
    pub fn startup(&mut self) -> Result<(), StageError> {
        info!("Waiting for the stage controller to reset.");
        sleep(secs(self.config.reset_delay));
        self.link.discard_input()?;

        info!("Sending stage controller settings.");
        self.send_settings()?;

        let status = self.read_status()?;
        if status.state == StageState::Alarm || self.config.home_on_startup {
            info!("Homing stage (controller reports {}).", status.state);
            self.home()?;
        }

        info!("Sending G-code configuration.");
        // Absolute positioning, millimeters, feed rate.
        self.command("G90")?;
        self.command("G21")?;
        self.command(&format!("F{}", self.config.feed_rate))?;

        Ok(())
    }

    fn send_settings(&mut self) -> Result<(), StageError> {
        let c = &self.config;
        let settings = [
            // Hold position after each move.
            (1, 255),
            (10, c.status_report_mask),
            (100, c.steps_per_mm_x),
            (101, c.steps_per_mm_y),
            (110, c.max_velocity),
            (111, c.max_velocity),
            (120, c.max_acceleration),
            (121, c.max_acceleration),
            (22, 1),
            (27, c.homing_pull_off),
            (26, c.homing_debounce),
            (24, c.homing_feed_rate),
            (25, c.homing_seek_rate),
            (21, 1),
        ];

        for (key, value) in settings {
            self.command(&format!("${}={}", key, value))?;
        }
        Ok(())
    }

    /// Sends one line and blocks until the controller answers `ok`.
    pub fn command(&mut self, line: &str) -> Result<(), StageError> {
        self.link.write_line(line)?;

        let deadline = Instant::now() + secs(self.config.ack_timeout);
        while Instant::now() < deadline {
            let Some(resp) = self.link.read_line()? else {
                continue;
            };
            let resp = resp.trim();
            if resp == "ok" {
                return Ok(());
            }
            if resp.starts_with("error:") {
                return Err(StageError::Rejected(line.to_owned(), resp.to_owned()));
            }
            debug!("Ignoring {:?} while waiting for ok", resp);
        }
        Err(StageError::AckTimeout(line.to_owned()))
    }

    /// Queries the controller and returns its status. Lines that are not a
    /// status report are skipped until one arrives or the status timeout
    /// runs out.
    pub fn read_status(&mut self) -> Result<StageStatus, StageError> {
        self.link.write_bytes(b"?")?;

        let deadline = Instant::now() + secs(self.config.status_timeout);
        let mut discarded = 0;
        while Instant::now() < deadline {
            let Some(line) = self.link.read_line()? else {
                continue;
            };
            match line.parse::<StatusReport>() {
                Ok(report) => return Ok(self.store(report)),
                Err(_) => {
                    trace!("Discarding {:?}", line);
                    discarded += 1;
                }
            }
        }
        Err(StageError::StatusTimeout { discarded })
    }

    fn store(&mut self, report: StatusReport) -> StageStatus {
        self.status = StageStatus {
            state: report.state,
            x: report.x,
            y: report.y,
            z: report.z,
            buffer: report.buffer,
            timestamp: timestamp(),
            valid: true,
        };
        self.status
    }

    /// Commands a linear move to `(x, y)`. Targets outside the travel
    /// envelope are dropped; returns whether a command was written.
    pub fn move_to(&mut self, x: f64, y: f64) -> Result<bool, StageError> {
        if !self.envelope.contains(x, y) {
            debug!("Dropping move to ({:.3}, {:.3}): outside travel", x, y);
            return Ok(false);
        }
        self.link.write_line(&format!("G1X{:.3}Y{:.3}", x, y))?;
        Ok(true)
    }

    /// Runs the homing cycle and blocks until the controller has both
    /// acknowledged `$H` and reports idle, so the acknowledgement cannot be
    /// mistaken for the answer to a later command.
    pub fn home(&mut self) -> Result<(), StageError> {
        self.link.write_line("$H")?;
        sleep(secs(self.config.settle_delay));

        let deadline = Instant::now() + secs(self.config.home_timeout);
        let mut acked = false;
        let mut last_state = None;
        while !(acked && last_state == Some(StageState::Idle)) {
            if Instant::now() >= deadline {
                return Err(match last_state {
                    Some(StageState::Alarm) => StageError::StillAlarmed,
                    _ => StageError::HomeTimeout,
                });
            }

            // Some firmware stays quiet while homing; keep asking.
            self.link.write_bytes(b"?")?;
            while !(acked && last_state == Some(StageState::Idle)) {
                let Some(line) = self.link.read_line()? else {
                    break;
                };
                let line = line.trim();
                if line == "ok" {
                    acked = true;
                } else if line.starts_with("error:") {
                    return Err(StageError::Rejected("$H".to_owned(), line.to_owned()));
                } else if let Ok(report) = line.parse::<StatusReport>() {
                    last_state = Some(self.store(report).state);
                } else {
                    trace!("Discarding {:?} while homing", line);
                }
            }
        }
        info!("Stage homed.");
        Ok(())
    }

    /// The last status read from the controller.
    pub fn status(&self) -> StageStatus {
        self.status
    }

    /// The travel envelope moves are checked against.
    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    /// The link underneath.
    pub fn link(&self) -> &L {
        &self.link
    }
}
