//! The image operations the tracker chains together, on 8-bit grayscale
//! frames.

use image::{imageops, DynamicImage, GrayImage, Luma};

/// Foreground value in a mask.
pub const FOREGROUND: u8 = 255;

/// A pixel position, `(x, y)`.
pub type Point = (u32, u32);

/// Converts any frame to 8-bit grayscale.
pub fn grayscale(frame: &DynamicImage) -> GrayImage {
    frame.to_luma8()
}

/// Normalized box filter with a `size` × `size` kernel anchored at its
/// centre. Pixels outside the image repeat the nearest edge pixel.
pub fn box_blur(img: &GrayImage, size: u32) -> GrayImage {
    if size <= 1 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    let (wi, hi) = (w as i64, h as i64);
    let before = (size / 2) as i64;
    let after = size as i64 - 1 - before;

    // Running sums along each row, then along each column: each step adds
    // the pixel entering the window and drops the one leaving it.
    let px = |x: i64, y: i64| img.get_pixel(x.clamp(0, wi - 1) as u32, y as u32).0[0] as u32;
    let mut rows = vec![0u32; (w * h) as usize];
    for y in 0..hi {
        let mut sum: u32 = (-before..=after).map(|xx| px(xx, y)).sum();
        rows[(y * wi) as usize] = sum;
        for x in 1..wi {
            sum = sum + px(x + after, y) - px(x - 1 - before, y);
            rows[(y * wi + x) as usize] = sum;
        }
    }

    let row = |x: i64, y: i64| rows[(y.clamp(0, hi - 1) * wi + x) as usize];
    let area = size * size;
    let mut out = GrayImage::new(w, h);
    for x in 0..wi {
        let mut sum: u32 = (-before..=after).map(|yy| row(x, yy)).sum();
        for y in 0..hi {
            if y > 0 {
                sum = sum + row(x, y + after) - row(x, y - 1 - before);
            }
            out.put_pixel(x as u32, y as u32, Luma([((sum + area / 2) / area) as u8]));
        }
    }
    out
}

/// Cuts `border` pixels off every edge, where the blur has smeared in
/// repeated edge pixels.
pub fn crop_border(img: &GrayImage, border: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    let border = border.min(w / 2).min(h / 2);
    imageops::crop_imm(img, border, border, w - 2 * border, h - 2 * border).to_image()
}

/// Inverted binary threshold: pixels at or below `level` become
/// [`FOREGROUND`], brighter ones become 0. A dark subject on a light floor
/// comes out as foreground.
pub fn threshold_inv(img: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        if img.get_pixel(x, y).0[0] > level {
            Luma([0])
        } else {
            Luma([FOREGROUND])
        }
    })
}

/// Outer contours of the foreground regions of a mask. Regions are
/// 8-connected; a region's contour is every one of its pixels that touches
/// background or the image edge through one of its four sides.
pub fn find_contours(mask: &GrayImage) -> Vec<Vec<Point>> {
    let (w, h) = mask.dimensions();
    let is_fg = |x: i64, y: i64| {
        x >= 0
            && y >= 0
            && x < w as i64
            && y < h as i64
            && mask.get_pixel(x as u32, y as u32).0[0] == FOREGROUND
    };

    let mut seen = vec![false; (w * h) as usize];
    let mut contours = Vec::new();
    let mut stack = Vec::new();

    for start_y in 0..h {
        for start_x in 0..w {
            let idx = (start_y * w + start_x) as usize;
            if seen[idx] || !is_fg(start_x as i64, start_y as i64) {
                continue;
            }

            seen[idx] = true;
            stack.push((start_x, start_y));
            let mut contour = Vec::new();

            while let Some((x, y)) = stack.pop() {
                let (xi, yi) = (x as i64, y as i64);
                let on_edge = [(1, 0), (-1, 0), (0, 1), (0, -1)]
                    .iter()
                    .any(|(dx, dy)| !is_fg(xi + dx, yi + dy));
                if on_edge {
                    contour.push((x, y));
                }

                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let (nx, ny) = (xi + dx, yi + dy);
                        if is_fg(nx, ny) {
                            let nidx = (ny as u32 * w + nx as u32) as usize;
                            if !seen[nidx] {
                                seen[nidx] = true;
                                stack.push((nx as u32, ny as u32));
                            }
                        }
                    }
                }
            }

            contours.push(contour);
        }
    }

    contours
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> GrayImage {
        GrayImage::from_fn(rows[0].len() as u32, rows.len() as u32, |x, y| {
            match rows[y as usize].as_bytes()[x as usize] {
                b'#' => Luma([FOREGROUND]),
                _ => Luma([0]),
            }
        })
    }

    #[test]
    fn blur_of_a_flat_image_is_flat() {
        let img = GrayImage::from_pixel(12, 9, Luma([77]));
        let out = box_blur(&img, 4);
        assert!(out.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn blur_spreads_a_bright_pixel() {
        let mut img = GrayImage::new(7, 7);
        img.put_pixel(3, 3, Luma([90]));
        let out = box_blur(&img, 3);
        assert_eq!(out.get_pixel(3, 3).0[0], 10);
        assert_eq!(out.get_pixel(2, 2).0[0], 10);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn blur_matches_a_direct_window_average() {
        let img = GrayImage::from_fn(12, 9, |x, y| Luma([((x * 37 + y * 91) % 256) as u8]));
        let clamp = |v: i64, n: u32| v.clamp(0, n as i64 - 1) as u32;

        for size in [2u32, 3, 4, 10] {
            let out = box_blur(&img, size);
            let before = (size / 2) as i64;
            let after = size as i64 - 1 - before;
            for (x, y, p) in out.enumerate_pixels() {
                let mut sum = 0u32;
                for yy in y as i64 - before..=y as i64 + after {
                    for xx in x as i64 - before..=x as i64 + after {
                        sum += img.get_pixel(clamp(xx, 12), clamp(yy, 9)).0[0] as u32;
                    }
                }
                let area = size * size;
                assert_eq!(p.0[0], ((sum + area / 2) / area) as u8, "size {} at ({}, {})", size, x, y);
            }
        }
    }

    #[test]
    fn crop_removes_border_on_every_side() {
        let img = GrayImage::new(20, 16);
        assert_eq!(crop_border(&img, 3).dimensions(), (14, 10));
    }

    #[test]
    fn threshold_marks_dark_pixels() {
        let mut img = GrayImage::from_pixel(2, 1, Luma([200]));
        img.put_pixel(1, 0, Luma([110]));
        let out = threshold_inv(&img, 110);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], FOREGROUND);
    }

    #[test]
    fn contours_separate_regions() {
        let mask = mask_from(&[
            "##.....",
            "##.....",
            ".......",
            "...####",
            "...####",
            "...####",
            "...####",
        ]);
        let mut sizes: Vec<usize> = find_contours(&mask).iter().map(|c| c.len()).collect();
        sizes.sort();
        // The 4x4 block has 4 interior pixels that are not on its contour.
        assert_eq!(sizes, vec![4, 12]);
    }

    #[test]
    fn diagonal_neighbours_are_one_region() {
        let mask = mask_from(&["#..", ".#.", "..#"]);
        assert_eq!(find_contours(&mask).len(), 1);
    }

    #[test]
    fn empty_mask_has_no_contours() {
        assert!(find_contours(&GrayImage::new(5, 5)).is_empty());
    }
}
