//! Live capture through nokhwa.

use super::{FrameSource, VisionError};

use image::{DynamicImage, RgbImage};
use log::info;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
    Camera,
};

/// A live camera.
pub struct NokhwaCamera {
    camera: Camera,
}

impl NokhwaCamera {
    /// Opens camera `index` at its highest frame rate and starts streaming.
    pub fn open(index: u32) -> Result<Self, VisionError> {
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(index), requested)
            .map_err(|e| VisionError::Camera(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| VisionError::Camera(e.to_string()))?;

        info!(
            "Opened camera {} ({}).",
            camera.info().human_name(),
            camera.camera_format()
        );
        Ok(Self { camera })
    }
}

impl FrameSource for NokhwaCamera {
    fn capture(&mut self) -> Result<DynamicImage, VisionError> {
        let frame = self
            .camera
            .frame()
            .map_err(|e| VisionError::Camera(e.to_string()))?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| VisionError::Camera(e.to_string()))?;

        // Rebuild the buffer so we don't depend on the camera's image version.
        let (w, h) = decoded.dimensions();
        RgbImage::from_raw(w, h, decoded.into_raw())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| VisionError::Camera("short frame buffer".to_owned()))
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        let _ = self.camera.stop_stream();
    }
}
