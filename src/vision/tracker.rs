//! Locating the subject in a frame, and the vision worker loop.

use super::ellipse::fit_ellipse;
use super::{ops, FlyPose, FrameSource, VisionError};
use crate::cell::LatestCell;
use crate::config::{secs, CameraConfig};
use crate::recorder::CsvRecorder;
use crate::stage::timestamp;
use crate::time_manager::TimeManager;

use image::imageops::{self, FilterType};
use image::DynamicImage;
use log::trace;
use std::time::Duration;

/// Turns frames into [`FlyPose`]s.
#[derive(Debug, Clone)]
pub struct FlyTracker {
    config: CameraConfig,
}

impl FlyTracker {
    /// A tracker using the detection settings in `config`.
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Finds the subject in `frame`. Frames of a different size than
    /// configured are scaled first.
    pub fn locate(&self, frame: &DynamicImage, timestamp: f64) -> FlyPose {
        let c = &self.config;
        let mut gray = ops::grayscale(frame);
        if gray.dimensions() != (c.frame_width, c.frame_height) {
            gray = imageops::resize(&gray, c.frame_width, c.frame_height, FilterType::Triangle);
        }

        let blurred = ops::box_blur(&gray, c.blur_size);
        let cropped = ops::crop_border(&blurred, c.blur_size);
        let mask = ops::threshold_inv(&cropped, c.threshold);

        let absent = FlyPose {
            timestamp,
            present: false,
            valid: true,
            ..Default::default()
        };

        let contours = ops::find_contours(&mask);
        let Some(largest) = contours.iter().max_by_key(|c| c.len()) else {
            trace!("No contours.");
            return absent;
        };
        if largest.len() < c.min_contour {
            trace!("Largest contour has only {} points.", largest.len());
            return absent;
        }
        let Some(ellipse) = fit_ellipse(largest) else {
            return absent;
        };

        let (w, h) = mask.dimensions();
        FlyPose {
            x: (ellipse.cx - w as f64 / 2.0) / c.pixels_per_mm,
            y: (ellipse.cy - h as f64 / 2.0) / c.pixels_per_mm,
            angle: ellipse.angle,
            timestamp,
            present: true,
            valid: true,
        }
    }
}

/// The vision worker's loop body: capture, locate, publish.
pub struct VisionLoop {
    source: Box<dyn FrameSource>,
    tracker: FlyTracker,
    pose_cell: LatestCell<FlyPose>,
    loop_duration: Duration,
    time: TimeManager,
    recorder: Option<CsvRecorder>,
}

impl VisionLoop {
    /// Publishes what `source` sees into `pose_cell`.
    pub fn new(
        source: Box<dyn FrameSource>,
        config: &CameraConfig,
        pose_cell: LatestCell<FlyPose>,
    ) -> Self {
        let mut time = TimeManager::new("CameraThread");
        time.start();
        Self {
            source,
            tracker: FlyTracker::new(config),
            pose_cell,
            loop_duration: secs(config.loop_duration),
            time,
            recorder: None,
        }
    }

    /// Records every pose to `recorder`.
    pub fn with_recorder(mut self, recorder: Option<CsvRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// One paced iteration. Capture failures are fatal.
    pub fn run_once(&mut self) -> Result<FlyPose, VisionError> {
        self.time.tick();

        let frame = self.source.capture()?;
        let pose = self.tracker.locate(&frame, timestamp());
        self.pose_cell.publish(pose);

        if let Some(rec) = self.recorder.as_mut() {
            rec.record(format_args!(
                "{:.6},{},{:.4},{:.4},{:.2}",
                pose.timestamp, pose.present as u8, pose.x, pose.y, pose.angle
            ));
        }

        self.time.wait_until(self.loop_duration);
        Ok(pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::DummyCamera;
    use image::{GrayImage, Luma};

    fn config() -> CameraConfig {
        CameraConfig::default()
    }

    #[test]
    fn empty_frame_is_a_valid_negative() {
        let frame = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 200, Luma([230])));
        let pose = FlyTracker::new(&config()).locate(&frame, 1.0);
        assert!(pose.valid);
        assert!(!pose.present);
        assert_eq!(pose.timestamp, 1.0);
    }

    #[test]
    fn speck_below_min_contour_is_not_present() {
        let mut img = GrayImage::from_pixel(200, 200, Luma([230]));
        // One dark pixel with no blur: a contour, but far too small.
        img.put_pixel(100, 100, Luma([0]));
        let pose = FlyTracker::new(&CameraConfig {
            blur_size: 0,
            ..config()
        })
        .locate(&DynamicImage::ImageLuma8(img), 0.0);
        assert!(pose.valid && !pose.present);
    }

    #[test]
    fn finds_offset_and_heading_of_a_dark_ellipse() {
        let cfg = config();
        // 5 mm right of and 3 mm above the centre, long axis at 60 degrees.
        let (dx, dy) = (5.0 * cfg.pixels_per_mm, -3.0 * cfg.pixels_per_mm);
        let frame = DummyCamera::new(200, 200).fly_at(100.0 + dx, 100.0 + dy, 60.0).frame();

        let pose = FlyTracker::new(&cfg).locate(&frame, 0.0);
        assert!(pose.present);
        assert!((pose.x - 5.0).abs() < 0.3, "x {}", pose.x);
        assert!((pose.y + 3.0).abs() < 0.3, "y {}", pose.y);
        assert!((pose.angle - 60.0).abs() < 5.0, "angle {}", pose.angle);
    }

    #[test]
    fn smaller_frames_are_scaled_to_the_configured_size() {
        let frame = DummyCamera::new(100, 100).fly_at(50.0, 50.0, 0.0).frame();
        let pose = FlyTracker::new(&CameraConfig {
            min_contour: 1,
            ..config()
        })
        .locate(&frame, 0.0);
        assert!(pose.present);
        assert!(pose.x.abs() < 0.5 && pose.y.abs() < 0.5);
    }

    #[test]
    fn loop_publishes_each_frame() {
        let cell = LatestCell::new(FlyPose::default());
        let mut vision = VisionLoop::new(Box::new(DummyCamera::new(200, 200)), &config(), cell.clone());

        let pose = vision.run_once().unwrap();
        assert_eq!(cell.read(), pose);
        assert!(cell.read().valid);
    }
}
