//! Combines where the stage is with where the camera sees the subject.
//!
//! Each main loop tick feeds the latest [`FlyPose`] and [`StageStatus`] into
//! [`PoseFusion::step()`], which produces the subject's pose in the display
//! frame and, when the subject has wandered off centre, the stage move that
//! brings it back.

use crate::config::TrackerConfig;
use crate::stage::{StageCommand, StageStatus};
use crate::vision::FlyPose;

use std::collections::VecDeque;

/// The pose the renderer draws the world from. Positions in display units,
/// angles in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose3D {
    /// Sideways, display units.
    pub x: f64,
    /// Forwards, display units.
    pub y: f64,
    /// Eye height above the floor.
    pub z: f64,
    /// Not driven by tracking.
    pub pitch: f64,
    /// Heading, radians.
    pub yaw: f64,
    /// Not driven by tracking.
    pub roll: f64,
}

/// Makes the ellipse heading continuous. The fitted angle cannot tell head
/// from tail, so a jump of more than `threshold` degrees from the previous
/// heading is taken as a half-turn flip and undone.
#[derive(Debug, Clone)]
pub struct AngleUnwrapper {
    threshold: f64,
    last: Option<f64>,
}

impl AngleUnwrapper {
    /// Thresholds below 90 degrees cannot be satisfied by half-turn shifts
    /// and are raised to 90.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.max(90.0),
            last: None,
        }
    }

    /// Unwraps `angle` against the previous result. The first angle passes
    /// through unchanged. Non-finite angles are returned as they are and do
    /// not become the reference for the next one.
    pub fn unwrap(&mut self, angle: f64) -> f64 {
        if !angle.is_finite() {
            return angle;
        }
        let Some(last) = self.last else {
            self.last = Some(angle);
            return angle;
        };

        // The fewest half turns that bring the jump within the threshold.
        let jump = angle - last;
        let angle = if jump.abs() > self.threshold {
            let turns = ((jump.abs() - self.threshold) / 180.0).ceil();
            angle - jump.signum() * turns * 180.0
        } else {
            angle
        };
        self.last = Some(angle);
        angle
    }
}

/// Mean of the last `len` samples.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    len: usize,
    samples: VecDeque<f64>,
}

impl MovingAverage {
    /// An average over the last `len` samples. Zero is treated as one.
    pub fn new(len: usize) -> Self {
        let len = len.max(1);
        Self {
            len,
            samples: VecDeque::with_capacity(len),
        }
    }

    /// Adds a sample and returns the mean of the window.
    pub fn push(&mut self, value: f64) -> f64 {
        if self.samples.len() == self.len {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

/// Zero inside the deadband, otherwise `value` limited to `±max_step`.
pub fn clamp_step(value: f64, deadband: f64, max_step: f64) -> f64 {
    if value.abs() < deadband {
        0.0
    } else {
        value.clamp(-max_step, max_step)
    }
}

/// How camera axes line up with stage axes on the rig.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisMap {
    /// Multiplies the camera x offset.
    pub x_sign: f64,
    /// Multiplies the camera y offset.
    pub y_sign: f64,
}

impl AxisMap {
    /// A camera offset expressed in stage coordinates. Moving the stage by
    /// this much puts the subject back in the centre of the frame.
    pub fn to_stage(&self, fly: &FlyPose) -> (f64, f64) {
        (self.x_sign * fly.x, self.y_sign * fly.y)
    }
}

/// The result of one fusion step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionOutput {
    /// The pose to render from.
    pub pose: Pose3D,
    /// Where the stage should go next, if anywhere.
    pub command: Option<StageCommand>,
}

/// The state the main loop carries between ticks for pose fusion.
#[derive(Debug, Clone)]
pub struct PoseFusion {
    unwrapper: AngleUnwrapper,
    heading: MovingAverage,
    axes: AxisMap,
    min_move: f64,
    max_move: f64,
    display_scale: f64,
    eye_height: f64,
    tracking: bool,
}

impl PoseFusion {
    /// Fusion for `config`, tracking enabled or not as configured.
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            unwrapper: AngleUnwrapper::new(config.unwrap_threshold),
            heading: MovingAverage::new(config.average_len),
            axes: AxisMap {
                x_sign: config.stage_x_sign,
                y_sign: config.stage_y_sign,
            },
            min_move: config.min_move,
            max_move: config.max_move,
            display_scale: config.display_scale,
            eye_height: config.eye_height,
            tracking: config.tracking,
        }
    }

    /// Fuses one pair of readings. Returns `None` unless both are valid and
    /// the subject is in view; the heading history is left untouched then.
    pub fn step(&mut self, fly: &FlyPose, stage: &StageStatus) -> Option<FusionOutput> {
        if !fly.valid || !stage.valid || !fly.present {
            return None;
        }

        let heading = self.heading.push(self.unwrapper.unwrap(fly.angle));

        let (dx, dy) = self.axes.to_stage(fly);
        let (world_x, world_y) = (stage.x + dx, stage.y + dy);
        let pose = Pose3D {
            x: world_x * self.display_scale,
            y: self.eye_height,
            z: world_y * self.display_scale,
            pitch: 0.0,
            yaw: -heading.to_radians(),
            roll: 0.0,
        };

        let step_x = clamp_step(dx, self.min_move, self.max_move);
        let step_y = clamp_step(dy, self.min_move, self.max_move);
        let command = (self.tracking && (step_x != 0.0 || step_y != 0.0)).then_some(StageCommand {
            x: stage.x + step_x,
            y: stage.y + step_y,
            fresh: true,
        });

        Some(FusionOutput { pose, command })
    }

    /// Turns automatic re-centering on or off.
    pub fn set_tracking(&mut self, on: bool) {
        self.tracking = on;
    }

    /// Whether automatic re-centering is on.
    pub fn tracking(&self) -> bool {
        self.tracking
    }
}
