//! What the renderer is asked to draw.

use super::Color;
use crate::fusion::Pose3D;

use log::{info, trace};

/// One panel of a stimulus, in display units. Panels are boxes centred on
/// `position`, turned by `yaw` radians about the vertical axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Panel {
    /// Centre of the panel.
    pub position: [f64; 3],
    /// Rotation about the vertical axis.
    pub yaw: f64,
    /// Width, height and thickness.
    pub size: [f64; 3],
}

/// The current scene description.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneFrame {
    /// Who the scene belongs to: a trial name, or `"interleave"`.
    pub name: String,
    /// Colour behind the panels.
    pub background: Color,
    /// Colour the panels are lit with.
    pub foreground: Color,
    /// Panels to draw.
    pub panels: Vec<Panel>,
    /// Yaw of the whole panel set, in radians.
    pub rotation: f64,
    /// When set, the world is moved with the subject's pose so that the
    /// subject stays at the same place in it.
    pub world: Option<Pose3D>,
}

impl SceneFrame {
    /// A scene of nothing but `background`.
    pub fn plain(name: &str, background: Color) -> Self {
        Self {
            name: name.to_owned(),
            background,
            foreground: background,
            panels: Vec::new(),
            rotation: 0.0,
            world: None,
        }
    }
}

/// The display side. Gets the fused pose and the scene once per main loop
/// tick.
pub trait Renderer {
    /// Draws one frame.
    fn present(&mut self, pose: &Pose3D, scene: &SceneFrame);
}

/// A renderer that only logs what it would draw. Used when no display is
/// attached.
#[derive(Debug, Default)]
pub struct LogRenderer {
    last: Option<(String, Color)>,
    frames: u64,
}

impl LogRenderer {
    /// A renderer that has drawn nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames presented so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for LogRenderer {
    fn present(&mut self, pose: &Pose3D, scene: &SceneFrame) {
        self.frames += 1;

        let now = (scene.name.clone(), scene.background);
        if self.last.as_ref() != Some(&now) {
            info!(
                "Display: {} on {} ({} panels).",
                scene.name,
                scene.background,
                scene.panels.len()
            );
            self.last = Some(now);
        }
        trace!(
            "pose ({:.4}, {:.4}, {:.4}) yaw {:.3}, rotation {:.3}",
            pose.x,
            pose.y,
            pose.z,
            pose.yaw,
            scene.rotation
        );
    }
}
