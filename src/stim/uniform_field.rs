//! A whole-field flash.

use super::trial::PhaseClock;
use super::{Color, SceneFrame, StimError, Trial, TrialReport};
use crate::fusion::Pose3D;

use serde::Deserialize;
use std::time::Instant;

/// Settings for [`UniformField`], times in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UniformFieldSettings {
    /// Brightness of the whole field.
    pub level: Color,
    /// Blank time before the field is lit.
    pub wait_before: f64,
    /// How long the field stays lit.
    pub duration: f64,
    /// Blank time after.
    pub wait_after: f64,
}

impl Default for UniformFieldSettings {
    fn default() -> Self {
        Self {
            level: Color::BLACK,
            wait_before: 0.0,
            duration: 5.0,
            wait_after: 0.0,
        }
    }
}

/// The whole display held at one colour.
#[derive(Debug, Clone)]
pub struct UniformField {
    name: String,
    clock: PhaseClock,
    scene: SceneFrame,
}

impl UniformField {
    /// A trial named `name`.
    pub fn new(name: &str, settings: UniformFieldSettings) -> Self {
        Self {
            name: name.to_owned(),
            clock: PhaseClock::new(settings.wait_before, settings.duration, settings.wait_after),
            scene: SceneFrame::plain(name, settings.level),
        }
    }
}

impl Trial for UniformField {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, _pose: &Pose3D, now: Instant) -> Result<TrialReport, StimError> {
        let (state, elapsed) = self.clock.advance(now)?;
        Ok(TrialReport {
            state,
            elapsed,
            rotation: 0.0,
        })
    }

    fn is_done(&self) -> bool {
        self.clock.is_done()
    }

    fn scene(&self) -> &SceneFrame {
        &self.scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn holds_the_level_for_its_duration() {
        let mut field = UniformField::new(
            "grey",
            UniformFieldSettings {
                level: Color::grey(0.3),
                duration: 1.0,
                ..Default::default()
            },
        );
        let pose = Pose3D::default();
        let t0 = Instant::now();

        // Init, then through the zero-length wait.
        field.update(&pose, t0).unwrap();
        field.update(&pose, t0).unwrap();
        field.update(&pose, t0 + Duration::from_millis(999)).unwrap();
        assert!(!field.is_done());
        assert_eq!(field.scene().background, Color::grey(0.3));
        assert!(field.scene().panels.is_empty());

        field.update(&pose, t0 + Duration::from_millis(1000)).unwrap();
        field.update(&pose, t0 + Duration::from_millis(1000)).unwrap();
        assert!(field.is_done());
    }
}
