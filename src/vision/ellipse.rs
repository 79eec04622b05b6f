//! Ellipse fit over a contour.

use super::ops::Point;

/// An ellipse in pixel coordinates (x right, y down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    /// Centre x.
    pub cx: f64,
    /// Centre y.
    pub cy: f64,
    /// Semi-major axis, pixels.
    pub major: f64,
    /// Semi-minor axis, pixels.
    pub minor: f64,
    /// Orientation of the major axis in degrees, `[0, 180)`, measured from
    /// the x axis towards the y axis.
    pub angle: f64,
}

/// Fits an ellipse to a contour from its second moments. Needs at least five
/// points.
///
/// Axis lengths assume the points are spread evenly in the ellipse's angle
/// parameter, where the variance along an axis is half the squared
/// semi-axis. Pixel contours of long shapes come out a little short on the
/// major axis. The tracker only uses the centre and orientation.
pub fn fit_ellipse(points: &[Point]) -> Option<Ellipse> {
    if points.len() < 5 {
        return None;
    }

    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x as f64, sy + y as f64));
    let (cx, cy) = (sx / n, sy / n);

    let (mut mxx, mut myy, mut mxy) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        mxx += dx * dx;
        myy += dy * dy;
        mxy += dx * dy;
    }
    mxx /= n;
    myy /= n;
    mxy /= n;

    let mean = (mxx + myy) / 2.0;
    let spread = (((mxx - myy) / 2.0).powi(2) + mxy * mxy).sqrt();
    let (l1, l2) = (mean + spread, (mean - spread).max(0.0));

    let angle = (0.5 * (2.0 * mxy).atan2(mxx - myy)).to_degrees();

    Some(Ellipse {
        cx,
        cy,
        major: (2.0 * l1).sqrt(),
        minor: (2.0 * l2).sqrt(),
        angle: angle.rem_euclid(180.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outline(cx: f64, cy: f64, a: f64, b: f64, deg: f64) -> Vec<Point> {
        let t = deg.to_radians();
        (0..720)
            .map(|i| {
                let s = i as f64 / 720.0 * std::f64::consts::TAU;
                let (ex, ey) = (a * s.cos(), b * s.sin());
                let x = cx + ex * t.cos() - ey * t.sin();
                let y = cy + ex * t.sin() + ey * t.cos();
                (x.round() as u32, y.round() as u32)
            })
            .collect()
    }

    #[test]
    fn too_few_points_is_no_fit() {
        assert!(fit_ellipse(&[(0, 0), (1, 1), (2, 2), (3, 3)]).is_none());
    }

    #[test]
    fn recovers_centre_and_orientation() {
        for deg in [0.0, 30.0, 90.0, 135.0] {
            let e = fit_ellipse(&outline(100.0, 80.0, 30.0, 10.0, deg)).unwrap();
            assert!((e.cx - 100.0).abs() < 0.5, "cx {}", e.cx);
            assert!((e.cy - 80.0).abs() < 0.5, "cy {}", e.cy);
            let diff = (e.angle - deg).rem_euclid(180.0);
            assert!(diff.min(180.0 - diff) < 2.0, "{} vs {}", e.angle, deg);
            assert!(e.major > e.minor);
        }
    }

    #[test]
    fn axis_lengths_are_close() {
        let e = fit_ellipse(&outline(50.0, 50.0, 30.0, 10.0, 0.0)).unwrap();
        assert!((e.major - 30.0).abs() < 3.0, "major {}", e.major);
        assert!((e.minor - 10.0).abs() < 3.0, "minor {}", e.minor);
    }

    #[test]
    fn angle_is_in_half_open_range() {
        // A line at -45 degrees reads as 135.
        let pts: Vec<Point> = (0..10).map(|i| (i, 10 - i)).collect();
        let e = fit_ellipse(&pts).unwrap();
        assert!((e.angle - 135.0).abs() < 1e-9);
    }
}
