//! Synthetic frames of a dark ellipse on a light floor.

use super::{FrameSource, VisionError};

use image::{DynamicImage, GrayImage, Luma};
use std::f64::consts::TAU;

const FLOOR: u8 = 220;
const FLY: u8 = 30;

/// A synthetic camera: a dark ellipse on a light floor, walking around the
/// frame centre with its long axis along its direction of travel. Good
/// enough to drive the whole rig without hardware.
#[derive(Debug, Clone)]
pub struct DummyCamera {
    width: u32,
    height: u32,
    radius: f64,
    step: f64,
    phase: f64,
    fixed: Option<(f64, f64, f64)>,
}

impl DummyCamera {
    /// A camera producing `width` × `height` frames.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            radius: width.min(height) as f64 * 0.2,
            step: TAU / 400.0,
            phase: 0.0,
            fixed: None,
        }
    }

    /// Sets the radius of the walk, in pixels.
    pub fn radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    /// Sets how far around the circle each frame moves, in radians.
    pub fn step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    /// Pins the fly at `(x, y)` pixels, heading `angle` degrees.
    pub fn fly_at(mut self, x: f64, y: f64, angle: f64) -> Self {
        self.fixed = Some((x, y, angle));
        self
    }

    // Centre and heading for the current phase.
    fn fly(&self) -> (f64, f64, f64) {
        if let Some(fixed) = self.fixed {
            return fixed;
        }
        let cx = self.width as f64 / 2.0 + self.radius * self.phase.cos();
        let cy = self.height as f64 / 2.0 + self.radius * self.phase.sin();
        // Tangent to the circle.
        let heading = (self.phase.to_degrees() + 90.0).rem_euclid(180.0);
        (cx, cy, heading)
    }

    /// Renders the current frame without advancing.
    pub fn frame(&self) -> DynamicImage {
        let (cx, cy, heading) = self.fly();
        let size = self.width.min(self.height) as f64;
        let (a, b) = (0.09 * size, 0.035 * size);
        let (sin, cos) = heading.to_radians().sin_cos();

        let img = GrayImage::from_fn(self.width, self.height, |x, y| {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let u = dx * cos + dy * sin;
            let v = -dx * sin + dy * cos;
            if (u / a).powi(2) + (v / b).powi(2) <= 1.0 {
                Luma([FLY])
            } else {
                Luma([FLOOR])
            }
        });
        DynamicImage::ImageLuma8(img)
    }
}

impl FrameSource for DummyCamera {
    fn capture(&mut self) -> Result<DynamicImage, VisionError> {
        let frame = self.frame();
        self.phase = (self.phase + self.step) % TAU;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn darkest(frame: &DynamicImage) -> (u32, u32) {
        let gray = frame.to_luma8();
        let (mut sx, mut sy, mut n) = (0u64, 0u64, 0u64);
        for (x, y, p) in gray.enumerate_pixels() {
            if p.0[0] == FLY {
                sx += x as u64;
                sy += y as u64;
                n += 1;
            }
        }
        ((sx / n) as u32, (sy / n) as u32)
    }

    #[test]
    fn fly_walks_around_the_centre() {
        let mut cam = DummyCamera::new(200, 200).radius(40.0).step(TAU / 4.0);
        let first = darkest(&cam.capture().unwrap());
        let second = darkest(&cam.capture().unwrap());

        assert!(first.0.abs_diff(140) <= 1 && first.1.abs_diff(100) <= 1);
        assert!(second.0.abs_diff(100) <= 1 && second.1.abs_diff(140) <= 1);
    }

    #[test]
    fn pinned_fly_stays_put() {
        let mut cam = DummyCamera::new(120, 80).fly_at(30.0, 20.0, 0.0);
        let a = darkest(&cam.capture().unwrap());
        let b = darkest(&cam.capture().unwrap());
        assert_eq!(a, b);
        assert_eq!(cam.frame().width(), 120);
    }
}
