//! The error type fatal conditions reach the top level with.

use crate::config::ConfigError;
use crate::gui::GuiError;
use crate::stage::StageError;
use crate::stim::StimError;
use crate::vision::VisionError;

use std::{error::Error, fmt::Display};

/// Anything that stops the rig.
#[derive(Debug)]
pub enum RigError {
    /// Bad or missing configuration.
    Config(ConfigError),
    /// The motion controller failed.
    Stage(StageError),
    /// Frame capture failed.
    Vision(VisionError),
    /// A trial reached a state it cannot be in.
    Stim(StimError),
    /// The terminal interface failed.
    Gui(GuiError),
    /// Some other io failure, such as spawning a thread.
    Io(std::io::Error),
    /// A worker thread panicked.
    WorkerPanicked(String),
    /// A worker loop ended while the rig was still running.
    WorkerDied(String),
}

impl Display for RigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RigError::Config(e) => write!(f, "{}", e),
            RigError::Stage(e) => write!(f, "stage: {}", e),
            RigError::Vision(e) => write!(f, "vision: {}", e),
            RigError::Stim(e) => write!(f, "stimulus: {}", e),
            RigError::Gui(e) => write!(f, "terminal: {}", e),
            RigError::Io(e) => write!(f, "io error: {}", e),
            RigError::WorkerPanicked(name) => write!(f, "{} panicked", name),
            RigError::WorkerDied(name) => write!(f, "{} stopped unexpectedly", name),
        }
    }
}

impl Error for RigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RigError::Config(e) => Some(e),
            RigError::Stage(e) => Some(e),
            RigError::Vision(e) => Some(e),
            RigError::Stim(e) => Some(e),
            RigError::Gui(e) => Some(e),
            RigError::Io(e) => Some(e),
            RigError::WorkerPanicked(_) | RigError::WorkerDied(_) => None,
        }
    }
}

impl From<ConfigError> for RigError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<StageError> for RigError {
    fn from(value: StageError) -> Self {
        Self::Stage(value)
    }
}

impl From<VisionError> for RigError {
    fn from(value: VisionError) -> Self {
        Self::Vision(value)
    }
}

impl From<StimError> for RigError {
    fn from(value: StimError) -> Self {
        Self::Stim(value)
    }
}

impl From<GuiError> for RigError {
    fn from(value: GuiError) -> Self {
        Self::Gui(value)
    }
}

impl From<std::io::Error> for RigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
