//! Runs the configured trials one after another, with an interleave between
//! them.

use super::{make_trial, Color, SceneFrame, StimError, Trial, TrialReport};
use crate::config::{secs, StimulusConfig, TrialDef};
use crate::fusion::Pose3D;

use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::{Duration, Instant};

/// The sequencer's own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// About to start an interleave.
    Init,
    /// Showing the interleave background.
    Interleave,
    /// Running a trial.
    Stimulus,
}

/// `Init → Interleave → Stimulus → Init ...`. Trials are drawn from a
/// shuffled order that is reshuffled each time it runs out, so every trial
/// runs once per round.
pub struct Sequencer {
    defs: Vec<TrialDef>,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
    interleave: SceneFrame,
    interleave_duration: Duration,
    state: SequencerState,
    entered: Instant,
    current: Option<Box<dyn Trial>>,
}

impl Sequencer {
    /// Builds a sequencer, checking every trial definition and the
    /// interleave colour up front.
    pub fn new(config: &StimulusConfig) -> Result<Self, StimError> {
        let color: Color = config.interleave_color.parse()?;
        for def in &config.trials {
            make_trial(def)?;
        }
        if config.trials.is_empty() {
            return Err(StimError::InvalidState("no trials configured".to_owned()));
        }

        let order: Vec<usize> = (0..config.trials.len()).collect();
        Ok(Self {
            cursor: order.len(),
            order,
            defs: config.trials.clone(),
            rng: StdRng::seed_from_u64(config.random_seed),
            interleave: SceneFrame::plain("interleave", color),
            interleave_duration: secs(config.interleave_duration),
            state: SequencerState::Init,
            entered: Instant::now(),
            current: None,
        })
    }

    /// Advances to `now`. Returns the running trial's report while in the
    /// stimulus state.
    pub fn update(&mut self, pose: &Pose3D, now: Instant) -> Result<Option<TrialReport>, StimError> {
        match self.state {
            SequencerState::Init => {
                self.entered = now;
                self.state = SequencerState::Interleave;
                Ok(None)
            }
            SequencerState::Interleave => {
                if now.saturating_duration_since(self.entered) >= self.interleave_duration {
                    let idx = self.draw();
                    let trial = make_trial(&self.defs[idx])?;
                    info!("Starting trial {}.", trial.name());
                    self.current = Some(trial);
                    self.state = SequencerState::Stimulus;
                }
                Ok(None)
            }
            SequencerState::Stimulus => {
                let Some(trial) = self.current.as_mut() else {
                    return Err(StimError::InvalidState("no trial to run".to_owned()));
                };
                let report = trial.update(pose, now)?;
                if trial.is_done() {
                    info!("Finished trial {}.", trial.name());
                    self.current = None;
                    self.state = SequencerState::Init;
                }
                Ok(Some(report))
            }
        }
    }

    // Index of the next trial, reshuffling when the order runs out.
    fn draw(&mut self) -> usize {
        if self.cursor >= self.order.len() {
            self.order.shuffle(&mut self.rng);
            self.cursor = 0;
        }
        let idx = self.order[self.cursor];
        self.cursor += 1;
        idx
    }

    /// What should be on the display now.
    pub fn scene(&self) -> &SceneFrame {
        match &self.current {
            Some(trial) => trial.scene(),
            None => &self.interleave,
        }
    }

    /// The running trial's name, if one is running.
    pub fn current_trial(&self) -> Option<&str> {
        self.current.as_ref().map(|t| t.name())
    }

    /// Whether a trial or the interleave is playing.
    pub fn state(&self) -> SequencerState {
        self.state
    }
}
