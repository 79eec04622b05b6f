//! Vertical bars on a cylinder around the subject.

use super::trial::PhaseClock;
use super::{Color, Panel, SceneFrame, StimError, Trial, TrialReport, TrialState};
use crate::fusion::Pose3D;

use serde::Deserialize;
use std::f64::consts::TAU;
use std::time::Instant;

/// Settings for [`CylinderBars`]. Times in seconds, lengths in display
/// units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CylinderBarsSettings {
    /// Move the world with the subject, so the cylinder stays centred on it.
    pub closed_loop: bool,
    /// Bars around the full circle.
    pub periods: u32,
    /// Fraction of each period covered by the bar.
    pub duty_cycle: f64,
    /// Bar colour.
    pub foreground: Color,
    /// Colour between bars.
    pub background: Color,
    /// Blank time before the bars appear.
    pub wait_before: f64,
    /// How long the bars are shown.
    pub active_duration: f64,
    /// Blank time after the bars.
    pub wait_after: f64,
    /// Degrees per second while active.
    pub rotation_speed: f64,
    /// Cylinder radius, display units.
    pub radius: f64,
    /// Bar height.
    pub panel_height: f64,
    /// Bar thickness.
    pub panel_thickness: f64,
}

impl Default for CylinderBarsSettings {
    fn default() -> Self {
        Self {
            closed_loop: true,
            periods: 50,
            duty_cycle: 0.5,
            foreground: Color::WHITE,
            background: Color::BLACK,
            wait_before: 0.55,
            active_duration: 5.0,
            wait_after: 0.55,
            rotation_speed: 15.0,
            radius: 0.8,
            panel_height: 5.0,
            panel_thickness: 0.001,
        }
    }
}

/// Vertical bars on a cylinder around the subject, rotating at a constant
/// speed during the active phase.
#[derive(Debug, Clone)]
pub struct CylinderBars {
    name: String,
    settings: CylinderBarsSettings,
    clock: PhaseClock,
    scene: SceneFrame,
}

impl CylinderBars {
    /// A trial named `name`.
    pub fn new(name: &str, settings: CylinderBarsSettings) -> Self {
        let mut scene = SceneFrame::plain(name, settings.background);
        scene.foreground = settings.foreground;
        scene.panels = bar_panels(&settings);

        Self {
            name: name.to_owned(),
            clock: PhaseClock::new(
                settings.wait_before,
                settings.active_duration,
                settings.wait_after,
            ),
            settings,
            scene,
        }
    }
}

// One panel per period, evenly spaced around the circle and facing the
// centre.
fn bar_panels(s: &CylinderBarsSettings) -> Vec<Panel> {
    let n = s.periods.max(1);
    let dtheta = TAU / n as f64;
    let width = 2.0 * s.radius * (s.duty_cycle * dtheta / 2.0).sin();

    (0..n)
        .map(|i| {
            let theta = i as f64 * dtheta;
            Panel {
                position: [s.radius * theta.sin(), 0.0, -s.radius * theta.cos()],
                yaw: -theta,
                size: [width, s.panel_height, s.panel_thickness],
            }
        })
        .collect()
}

impl Trial for CylinderBars {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, pose: &Pose3D, now: Instant) -> Result<TrialReport, StimError> {
        if self.settings.closed_loop {
            self.scene.world = Some(*pose);
        }

        let (state, elapsed) = self.clock.advance(now)?;
        let mut rotation = 0.0;
        match state {
            TrialState::Init => self.scene.background = self.settings.background,
            TrialState::Active => {
                rotation = -self.settings.rotation_speed.to_radians() * elapsed.as_secs_f64();
                self.scene.rotation = rotation;
            }
            TrialState::WaitBefore | TrialState::WaitAfter => {}
        }

        Ok(TrialReport {
            state,
            elapsed,
            rotation,
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

    fn quick() -> CylinderBarsSettings {
        CylinderBarsSettings {
            wait_before: 0.1,
            active_duration: 0.2,
            wait_after: 0.1,
            ..Default::default()
        }
    }

    #[test]
    fn panels_ring_the_subject() {
        let bars = CylinderBars::new("bars", CylinderBarsSettings::default());
        let panels = &bars.scene().panels;
        assert_eq!(panels.len(), 50);

        for p in panels {
            let r = (p.position[0].powi(2) + p.position[2].powi(2)).sqrt();
            assert!((r - 0.8).abs() < 1e-12);
        }
        // First panel straight ahead, facing back at the centre.
        assert_eq!(panels[0].position, [0.0, 0.0, -0.8]);
        assert_eq!(panels[0].yaw, 0.0);

        let expected_width = 2.0 * 0.8 * (0.5 * TAU / 50.0 / 2.0).sin();
        assert!((panels[0].size[0] - expected_width).abs() < 1e-12);
    }

    #[test]
    fn done_after_waits_and_active_time() {
        let mut bars = CylinderBars::new("bars", quick());
        let pose = Pose3D::default();
        let t0 = Instant::now();

        for k in 0..40u32 {
            bars.update(&pose, t0 + Duration::from_millis(10) * k).unwrap();
            assert!(!bars.is_done());
        }
        bars.update(&pose, t0 + Duration::from_millis(400)).unwrap();
        assert!(bars.is_done());
        assert!(bars.update(&pose, t0 + Duration::from_millis(410)).is_err());
    }

    #[test]
    fn rotation_grows_while_active() {
        let mut bars = CylinderBars::new("bars", quick());
        let pose = Pose3D::default();
        let t0 = Instant::now();

        bars.update(&pose, t0).unwrap();
        bars.update(&pose, t0 + Duration::from_millis(100)).unwrap();
        let report = bars.update(&pose, t0 + Duration::from_millis(200)).unwrap();

        assert_eq!(report.state, TrialState::Active);
        // 15 deg/s for 0.1 s, turning the negative way.
        let expected = -(1.5f64).to_radians();
        assert!((report.rotation - expected).abs() < 1e-9);
        assert_eq!(bars.scene().rotation, report.rotation);
    }

    #[test]
    fn closed_loop_follows_the_pose() {
        let pose = Pose3D {
            x: 0.1,
            z: -0.2,
            yaw: 1.0,
            ..Default::default()
        };

        let mut closed = CylinderBars::new("a", quick());
        closed.update(&pose, Instant::now()).unwrap();
        assert_eq!(closed.scene().world, Some(pose));

        let mut open = CylinderBars::new(
            "b",
            CylinderBarsSettings {
                closed_loop: false,
                ..quick()
            },
        );
        open.update(&pose, Instant::now()).unwrap();
        assert_eq!(open.scene().world, None);
    }
}
