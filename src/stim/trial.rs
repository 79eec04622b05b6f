//! The trial interface and the timing every trial shares.

use super::{CylinderBars, SceneFrame, StimError, UniformField};
use crate::config::{secs, TrialDef};
use crate::fusion::Pose3D;

use std::fmt;
use std::time::{Duration, Instant};

/// Where a trial is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    /// Built but not started.
    Init,
    /// Blank lead-in.
    WaitBefore,
    /// The stimulus is shown.
    Active,
    /// Blank tail. The trial is done when this runs out.
    WaitAfter,
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrialState::Init => "Init",
            TrialState::WaitBefore => "WaitBefore",
            TrialState::Active => "Active",
            TrialState::WaitAfter => "WaitAfter",
        };
        write!(f, "{}", s)
    }
}

/// What one trial update did, for logs and data files.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialReport {
    /// The state the update ran in.
    pub state: TrialState,
    /// Time spent in that state so far.
    pub elapsed: Duration,
    /// Pattern rotation in radians.
    pub rotation: f64,
}

impl fmt::Display for TrialReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state:{},duration:{:.6},rotation:{:.6}",
            self.state,
            self.elapsed.as_secs_f64(),
            self.rotation
        )
    }
}

/// A timed visual stimulus.
pub trait Trial {
    /// The configured name.
    fn name(&self) -> &str;

    /// Advances the trial to `now` with the subject at `pose`. Updating a
    /// trial that is already done is an error.
    fn update(&mut self, pose: &Pose3D, now: Instant) -> Result<TrialReport, StimError>;

    /// Whether the trial has run to the end.
    fn is_done(&self) -> bool;

    /// What should be on the display.
    fn scene(&self) -> &SceneFrame;
}

/// Builds a trial from its definition, by type name.
pub fn make_trial(def: &TrialDef) -> Result<Box<dyn Trial>, StimError> {
    match def.kind.as_str() {
        "CylinderBars" => Ok(Box::new(CylinderBars::new(&def.name, def.settings()?))),
        "UniformField" => Ok(Box::new(UniformField::new(&def.name, def.settings()?))),
        other => Err(StimError::UnknownTrialType {
            trial: def.name.clone(),
            kind: other.to_owned(),
        }),
    }
}

/// The `Init → WaitBefore → Active → WaitAfter → done` clock. Each state
/// lasts for its configured time, measured from the first update that ran in
/// it.
#[derive(Debug, Clone)]
pub struct PhaseClock {
    wait_before: Duration,
    active: Duration,
    wait_after: Duration,
    state: TrialState,
    entered: Option<Instant>,
    done: bool,
}

impl PhaseClock {
    /// A clock with the three durations in seconds.
    pub fn new(wait_before: f64, active: f64, wait_after: f64) -> Self {
        Self {
            wait_before: secs(wait_before),
            active: secs(active),
            wait_after: secs(wait_after),
            state: TrialState::Init,
            entered: None,
            done: false,
        }
    }

    /// Runs one update at `now`. Returns the state the update ran in and how
    /// long that state had lasted; the clock may have moved on afterwards.
    pub fn advance(&mut self, now: Instant) -> Result<(TrialState, Duration), StimError> {
        if self.done {
            return Err(StimError::InvalidState("updated after finishing".to_owned()));
        }

        let ran_in = self.state;
        let elapsed = match (self.state, self.entered) {
            (TrialState::Init, _) => {
                self.enter(TrialState::WaitBefore, now);
                Duration::ZERO
            }
            (state, Some(entered)) => {
                let elapsed = now.saturating_duration_since(entered);
                match state {
                    TrialState::WaitBefore if elapsed >= self.wait_before => {
                        self.enter(TrialState::Active, now)
                    }
                    TrialState::Active if elapsed >= self.active => {
                        self.enter(TrialState::WaitAfter, now)
                    }
                    TrialState::WaitAfter if elapsed >= self.wait_after => self.done = true,
                    _ => {}
                }
                elapsed
            }
            (state, None) => {
                return Err(StimError::InvalidState(format!("{} with no start time", state)))
            }
        };

        Ok((ran_in, elapsed))
    }

    fn enter(&mut self, state: TrialState, now: Instant) {
        self.state = state;
        self.entered = Some(now);
    }

    /// Whether the last state has run out.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The current state.
    pub fn state(&self) -> TrialState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RigConfig;

    #[test]
    fn finishes_after_the_three_durations_and_not_before() {
        let mut clock = PhaseClock::new(0.1, 0.2, 0.1);
        let t0 = Instant::now();
        let tick = Duration::from_millis(10);

        for k in 0..40 {
            clock.advance(t0 + tick * k).unwrap();
            assert!(!clock.is_done(), "done early at tick {}", k);
        }
        clock.advance(t0 + tick * 40).unwrap();
        assert!(clock.is_done());
    }

    #[test]
    fn states_run_in_order() {
        let mut clock = PhaseClock::new(0.1, 0.2, 0.1);
        let t0 = Instant::now();
        let at = |ms| t0 + Duration::from_millis(ms);

        assert_eq!(clock.advance(at(0)).unwrap().0, TrialState::Init);
        assert_eq!(clock.advance(at(50)).unwrap(), (TrialState::WaitBefore, Duration::from_millis(50)));
        assert_eq!(clock.advance(at(100)).unwrap().0, TrialState::WaitBefore);
        assert_eq!(clock.state(), TrialState::Active);
        assert_eq!(clock.advance(at(250)).unwrap(), (TrialState::Active, Duration::from_millis(150)));
        assert_eq!(clock.advance(at(300)).unwrap().0, TrialState::Active);
        assert_eq!(clock.advance(at(400)).unwrap().0, TrialState::WaitAfter);
        assert!(clock.is_done());
    }

    #[test]
    fn updating_a_finished_trial_is_an_error() {
        let mut clock = PhaseClock::new(0.0, 0.0, 0.0);
        let now = Instant::now();
        while !clock.is_done() {
            clock.advance(now).unwrap();
        }
        assert!(matches!(clock.advance(now), Err(StimError::InvalidState(_))));
    }

    #[test]
    fn factory_knows_the_trial_types() {
        let config = RigConfig::parse(
            r#"(stimulus: (trials: [
                (name: "bars", type: "CylinderBars"),
                (name: "grey", type: "UniformField", settings: Some({"level": "0.25"})),
                (name: "odd", type: "Spiral"),
            ]))"#,
        )
        .unwrap();
        let defs = &config.stimulus.trials;

        assert_eq!(make_trial(&defs[0]).unwrap().name(), "bars");
        assert_eq!(make_trial(&defs[1]).unwrap().name(), "grey");
        assert!(matches!(
            make_trial(&defs[2]),
            Err(StimError::UnknownTrialType { .. })
        ));
    }

    #[test]
    fn report_formats_like_the_data_log() {
        let report = TrialReport {
            state: TrialState::Active,
            elapsed: Duration::from_millis(1500),
            rotation: -0.25,
        };
        assert_eq!(
            report.to_string(),
            "state:Active,duration:1.500000,rotation:-0.250000"
        );
    }
}
