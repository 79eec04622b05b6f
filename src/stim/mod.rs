//! Visual stimuli and the order they run in.
//!
//! The [`Sequencer`] alternates between a plain interleave background and
//! trials drawn from the configuration. A trial is anything implementing
//! [`Trial`]; [`make_trial()`] builds one from its configured type name.
//! The result of each tick is a [`SceneFrame`] handed to a [`Renderer`].

mod color;
pub mod cylinder_bars;
mod scene;
pub mod sequencer;
pub mod trial;
pub mod uniform_field;

pub use color::Color;
pub use cylinder_bars::{CylinderBars, CylinderBarsSettings};
pub use scene::{LogRenderer, Panel, Renderer, SceneFrame};
pub use sequencer::{Sequencer, SequencerState};
pub use trial::{make_trial, Trial, TrialReport, TrialState};
pub use uniform_field::{UniformField, UniformFieldSettings};

use crate::config::ConfigError;

use std::borrow::Cow;
use std::fmt;

/// Stimulus failures. All of them are fatal.
#[derive(Debug)]
pub enum StimError {
    /// A trial names a type nobody knows how to build.
    UnknownTrialType {
        /// The trial's name.
        trial: String,
        /// The type it asked for.
        kind: String,
    },
    /// A colour string is neither a grey level nor hex.
    BadColor(String),
    /// A trial's settings did not decode.
    Settings(ConfigError),
    /// A state machine was driven somewhere it cannot go.
    InvalidState(String),
}

impl fmt::Display for StimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use StimError as SE;
        let msg = match self {
            SE::UnknownTrialType { trial, kind } => {
                Cow::from(format!("trial {:?} has unknown type {:?}", trial, kind))
            }
            SE::BadColor(s) => Cow::from(format!("bad colour {:?}", s)),
            SE::Settings(error) => Cow::from(error.to_string()),
            SE::InvalidState(what) => Cow::from(format!("invalid state: {}", what)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for StimError {}

impl From<ConfigError> for StimError {
    fn from(value: ConfigError) -> Self {
        Self::Settings(value)
    }
}
