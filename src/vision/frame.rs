//! Sources of camera frames.

use super::{DummyCamera, VisionError};
use crate::config::CameraConfig;

use image::DynamicImage;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Something that produces frames. [`FrameSource::capture()`] blocks until a
/// frame is available.
///
/// Sources are not required to be `Send`; some camera backends are tied to
/// the thread that opened them. Open them on the vision worker's own thread
/// through a [`SourceKind`].
pub trait FrameSource {
    /// Grabs the next frame.
    fn capture(&mut self) -> Result<DynamicImage, VisionError>;
}

/// Which frame source to open.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// The synthetic camera.
    Dummy,
    /// Recorded frames in a directory.
    Directory(PathBuf),
    /// A live camera, by index.
    Camera(u32),
}

impl SourceKind {
    /// Opens the source, sized per `config` where the source has a size.
    pub fn open(&self, config: &CameraConfig) -> Result<Box<dyn FrameSource>, VisionError> {
        match self {
            SourceKind::Dummy => Ok(Box::new(DummyCamera::new(
                config.frame_width,
                config.frame_height,
            ))),
            SourceKind::Directory(dir) => Ok(Box::new(ImageSequence::open(dir)?)),
            #[cfg(feature = "camera")]
            SourceKind::Camera(index) => Ok(Box::new(super::NokhwaCamera::open(*index)?)),
            #[cfg(not(feature = "camera"))]
            SourceKind::Camera(index) => Err(VisionError::Camera(format!(
                "camera {} requested, but built without the `camera` feature",
                index
            ))),
        }
    }
}

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Replays a directory of recorded frames in file name order, starting over
/// after the last one.
#[derive(Debug)]
pub struct ImageSequence {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageSequence {
    /// Lists the image files in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, VisionError> {
        let dir = dir.as_ref().to_owned();
        let entries = fs::read_dir(&dir).map_err(|e| VisionError::Io(dir.clone(), e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| VisionError::Io(dir.clone(), e))?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if is_image {
                paths.push(path);
            }
        }

        if paths.is_empty() {
            return Err(VisionError::NoFrames(dir));
        }
        paths.sort();
        debug!("{} frames in {}", paths.len(), dir.display());

        Ok(Self {
            dir,
            paths,
            next: 0,
        })
    }

    /// How many frames there are in one pass.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Never true; an empty directory fails to open.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// The directory being replayed.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameSource for ImageSequence {
    fn capture(&mut self) -> Result<DynamicImage, VisionError> {
        let path = &self.paths[self.next];
        self.next = (self.next + 1) % self.paths.len();
        image::open(path).map_err(|e| VisionError::Image(path.clone(), e))
    }
}
