//! The motorized XY stage and the GRBL motion controller that drives it.
//!
//! The stage worker owns the serial link. It polls the controller for its
//! status, publishes a [`StageStatus`] for everyone else, and executes move
//! commands it finds in the [`CommandCell`](crate::cell::CommandCell) when
//! the controller can take them.

pub mod grbl;
pub mod link;
pub mod poller;
pub mod sim;
pub mod status_decoder;

pub use grbl::GrblBoard;
pub use link::{SerialLink, StageLink};
pub use poller::{PollOutcome, StagePoller};
pub use sim::SimulatedGrbl;

use std::borrow::Cow;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Controller states, as reported by the device itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageState {
    /// Not moving, ready for commands.
    #[default]
    Idle,
    /// Executing a motion.
    Run,
    /// Running the homing cycle.
    Homing,
    /// Faulted. Only a homing cycle clears it.
    Alarm,
    /// Executing a manual jog.
    Jogging,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageState::Idle => "Idle",
            StageState::Run => "Run",
            StageState::Homing => "Homing",
            StageState::Alarm => "Alarm",
            StageState::Jogging => "Jogging",
        };
        write!(f, "{}", s)
    }
}

/// Buffer occupancy reported by newer firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferState {
    /// Free blocks in the motion planner queue.
    pub planner_blocks: u32,
    /// Free bytes in the serial receive buffer.
    pub rx_free: u32,
}

/// The most recent status report from the controller. Positions are in
/// millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StageStatus {
    /// Machine state.
    pub state: StageState,
    /// X, mm.
    pub x: f64,
    /// Y, mm.
    pub y: f64,
    /// Z, mm.
    pub z: f64,
    /// `None` when the firmware does not report buffer state.
    pub buffer: Option<BufferState>,
    /// Seconds since the Unix epoch at which the report was parsed.
    pub timestamp: f64,
    /// Whether this is a real report, rather than the initial placeholder.
    pub valid: bool,
}

impl StageStatus {
    /// Whether the controller has room for another command. Firmware that
    /// does not report its buffers always counts as having room.
    pub fn has_headroom(&self, min_rx_free: u32) -> bool {
        match self.buffer {
            Some(BufferState {
                planner_blocks,
                rx_free,
            }) => rx_free > min_rx_free && planner_blocks > 0,
            None => true,
        }
    }
}

/// A request to move the stage to an absolute position, in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StageCommand {
    /// X, mm.
    pub x: f64,
    /// Y, mm.
    pub y: f64,
    /// Set when submitted, cleared when the stage worker takes it.
    pub fresh: bool,
}

/// Everything that can go wrong talking to the controller.
#[derive(Debug)]
pub enum StageError {
    /// The serial port could not be opened or configured.
    Open(String, std::io::Error),
    /// Reading or writing the link failed.
    Io(std::io::Error),
    /// No well-formed status line arrived in time.
    StatusTimeout {
        /// How many other lines were thrown away while waiting.
        discarded: usize,
    },
    /// A setting or G-code line was not acknowledged in time.
    AckTimeout(String),
    /// The controller answered a command with `error:N`.
    Rejected(String, String),
    /// The homing cycle did not finish in time.
    HomeTimeout,
    /// The controller is still in alarm after homing.
    StillAlarmed,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use StageError as SE;
        let msg = match self {
            SE::Open(port, error) => Cow::from(format!("cannot open {}: {}", port, error)),
            SE::Io(error) => Cow::from(format!("serial io error: {}", error)),
            SE::StatusTimeout { discarded } => Cow::from(format!(
                "no status report (discarded {} lines)",
                discarded
            )),
            SE::AckTimeout(cmd) => Cow::from(format!("no acknowledgement for {:?}", cmd)),
            SE::Rejected(cmd, code) => {
                Cow::from(format!("controller rejected {:?} with {}", cmd, code))
            }
            SE::HomeTimeout => Cow::from("homing cycle did not finish"),
            SE::StillAlarmed => Cow::from("controller still in alarm after homing"),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for StageError {}

impl From<std::io::Error> for StageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Wall-clock timestamp in seconds, as stamped on every published record.
pub fn timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_with(buffer: Option<BufferState>) -> StageStatus {
        StageStatus {
            buffer,
            valid: true,
            ..Default::default()
        }
    }

    #[test]
    fn headroom_needs_rx_space_and_planner_blocks() {
        let min = 64;
        assert!(status_with(Some(BufferState {
            planner_blocks: 15,
            rx_free: 128
        }))
        .has_headroom(min));
        assert!(!status_with(Some(BufferState {
            planner_blocks: 15,
            rx_free: 64
        }))
        .has_headroom(min));
        assert!(!status_with(Some(BufferState {
            planner_blocks: 0,
            rx_free: 128
        }))
        .has_headroom(min));
    }

    #[test]
    fn old_firmware_always_has_headroom() {
        assert!(status_with(None).has_headroom(64));
    }
}
