//! Finding the subject in camera frames.
//!
//! The vision worker captures a frame, runs it through a fixed chain of
//! image operations (grayscale, blur, crop, inverted threshold, contours),
//! fits an ellipse to the largest contour and publishes the result as a
//! [`FlyPose`]. A frame without a large enough contour is a valid negative
//! observation, not an error.

#[cfg(feature = "camera")]
pub mod camera;
pub mod dummy_camera;
pub mod ellipse;
pub mod frame;
pub mod ops;
pub mod tracker;

#[cfg(feature = "camera")]
pub use camera::NokhwaCamera;
pub use dummy_camera::DummyCamera;
pub use frame::{FrameSource, ImageSequence, SourceKind};
pub use tracker::{FlyTracker, VisionLoop};

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

/// Where the subject is relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlyPose {
    /// Offset from the frame centre in millimeters, camera axes.
    pub x: f64,
    /// Offset from the frame centre in millimeters, camera y.
    pub y: f64,
    /// Orientation of the fitted ellipse in degrees, `[0, 180)`. Which end is
    /// the head is unknown, so this is ambiguous by half a turn.
    pub angle: f64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    /// Whether a subject was found in this frame.
    pub present: bool,
    /// Whether any frame has been processed yet.
    pub valid: bool,
}

/// Frame capture failures.
#[derive(Debug)]
pub enum VisionError {
    /// A frame directory could not be listed.
    Io(PathBuf, std::io::Error),
    /// A frame could not be decoded.
    Image(PathBuf, image::ImageError),
    /// The frame directory holds no images.
    NoFrames(PathBuf),
    /// The live camera failed.
    Camera(String),
}

impl fmt::Display for VisionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use VisionError as VE;
        let msg = match self {
            VE::Io(path, error) => Cow::from(format!("cannot read {}: {}", path.display(), error)),
            VE::Image(path, error) => {
                Cow::from(format!("cannot decode {}: {}", path.display(), error))
            }
            VE::NoFrames(path) => Cow::from(format!("no images in {}", path.display())),
            VE::Camera(msg) => Cow::from(format!("camera error: {}", msg)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for VisionError {}
