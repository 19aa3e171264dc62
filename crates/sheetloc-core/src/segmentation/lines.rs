//! Straight line segment detection.
//!
//! `imageproc` provides the standard Hough transform, which yields infinite
//! lines in polar form. Each polar line is then walked across the image to
//! recover the actual ink runs, bridging short gaps, so the result matches
//! what a probabilistic transform reports: finite segments with endpoints.

use image::GrayImage;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use tracing::trace;

/// A finite segment between two pixel endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl LineSegment {
    pub fn dx(&self) -> u32 {
        self.x1.abs_diff(self.x2)
    }

    pub fn dy(&self) -> u32 {
        self.y1.abs_diff(self.y2)
    }

    /// Endpoint drift in y is below `tolerance`.
    pub fn is_horizontal(&self, tolerance: u32) -> bool {
        self.dy() < tolerance
    }

    /// Endpoint drift in x is below `tolerance`.
    pub fn is_vertical(&self, tolerance: u32) -> bool {
        self.dx() < tolerance
    }

    /// Mean y of the endpoints.
    pub fn mid_y(&self) -> i32 {
        (self.y1 + self.y2) / 2
    }

    /// Mean x of the endpoints.
    pub fn mid_x(&self) -> i32 {
        (self.x1 + self.x2) / 2
    }
}

/// Finds segments of foreground (non-zero) pixels.
#[derive(Debug, Clone, Copy)]
pub struct LineDetector {
    /// Accumulator votes needed for a candidate line.
    pub vote_threshold: u32,
    /// Non-maximum suppression radius in the accumulator.
    pub suppression_radius: u32,
    /// Shortest segment reported, in pixels.
    pub min_length: u32,
    /// Longest run of missing pixels bridged inside a segment.
    pub max_gap: u32,
}

impl LineDetector {
    /// Detect segments in a binary image.
    ///
    /// Output is ordered by accumulator line, then by position along it.
    pub fn detect(&self, binary: &GrayImage) -> Vec<LineSegment> {
        if binary.width() == 0 || binary.height() == 0 {
            return Vec::new();
        }

        let options = LineDetectionOptions {
            vote_threshold: self.vote_threshold.max(1),
            suppression_radius: self.suppression_radius,
        };
        let mut polar = detect_lines(binary, options);
        polar.sort_by(|a, b| {
            a.angle_in_degrees
                .cmp(&b.angle_in_degrees)
                .then(a.r.total_cmp(&b.r))
        });
        trace!("Hough transform found {} candidate lines", polar.len());

        polar
            .iter()
            .flat_map(|line| self.walk(binary, line))
            .collect()
    }

    /// Collect the ink runs along one polar line.
    fn walk(&self, binary: &GrayImage, line: &PolarLine) -> Vec<LineSegment> {
        let (width, height) = (binary.width() as i64, binary.height() as i64);
        let theta = (line.angle_in_degrees as f64).to_radians();
        let (sin, cos) = theta.sin_cos();
        let r = line.r as f64;

        // Step along the axis the line is closer to, so every step moves one pixel.
        let along_x = (45..=135).contains(&line.angle_in_degrees);
        let steps = if along_x { width } else { height };

        let point_at = |t: i64| -> (i64, i64) {
            let t_f = t as f64;
            if along_x {
                (t, ((r - t_f * cos) / sin).round() as i64)
            } else {
                (((r - t_f * sin) / cos).round() as i64, t)
            }
        };

        let is_ink = |x: i64, y: i64| -> bool {
            x >= 0 && y >= 0 && x < width && y < height && binary.get_pixel(x as u32, y as u32)[0] > 0
        };

        let mut segments = Vec::new();
        let mut run: Option<(i64, i64)> = None;
        let close = |start: i64, end: i64, segments: &mut Vec<LineSegment>| {
            if (end - start + 1) as u64 >= self.min_length as u64 {
                let (x1, y1) = point_at(start);
                let (x2, y2) = point_at(end);
                segments.push(LineSegment {
                    x1: x1 as i32,
                    y1: y1 as i32,
                    x2: x2 as i32,
                    y2: y2 as i32,
                });
            }
        };

        for t in 0..steps {
            let (x, y) = point_at(t);
            let hit = if along_x {
                (-1..=1).any(|d| is_ink(x, y + d))
            } else {
                (-1..=1).any(|d| is_ink(x + d, y))
            };
            if !hit {
                continue;
            }
            run = match run {
                Some((start, last)) if t - last - 1 <= self.max_gap as i64 => Some((start, t)),
                Some((start, last)) => {
                    close(start, last, &mut segments);
                    Some((t, t))
                }
                None => Some((t, t)),
            };
        }
        if let Some((start, last)) = run {
            close(start, last, &mut segments);
        }

        segments
    }
}

/// Collapse sorted positions closer than `tolerance` into their mean.
///
/// A thick or dilated rule produces several nearly identical lines.
pub fn merge_positions(sorted: &[i32], tolerance: u32) -> Vec<i32> {
    let mut merged = Vec::new();
    let mut group: Vec<i32> = Vec::new();

    for &position in sorted {
        if let Some(&last) = group.last() {
            if position.abs_diff(last) > tolerance {
                merged.push(group.iter().sum::<i32>() / group.len() as i32);
                group.clear();
            }
        }
        group.push(position);
    }
    if !group.is_empty() {
        merged.push(group.iter().sum::<i32>() / group.len() as i32);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect as DrawRect;
    use pretty_assertions::assert_eq;

    fn detector(min_length: u32) -> LineDetector {
        LineDetector {
            vote_threshold: 50,
            suppression_radius: 8,
            min_length,
            max_gap: 10,
        }
    }

    #[test]
    fn test_detects_horizontal_rule() {
        let mut binary = GrayImage::new(200, 100);
        draw_filled_rect_mut(&mut binary, DrawRect::at(10, 40).of_size(180, 1), Luma([255]));

        let horizontal: Vec<_> = detector(150)
            .detect(&binary)
            .into_iter()
            .filter(|s| s.is_horizontal(10))
            .collect();

        assert!(horizontal.iter().any(|s| s.mid_y() == 40 && s.dx() >= 170));
        assert!(horizontal.iter().all(|s| (38..=42).contains(&s.mid_y())));
    }

    #[test]
    fn test_detects_vertical_rule_and_bridges_gaps() {
        let mut binary = GrayImage::new(100, 200);
        // dashed rule: 20px dashes, 5px gaps
        for top in (0..200).step_by(25) {
            draw_filled_rect_mut(&mut binary, DrawRect::at(60, top).of_size(1, 20), Luma([255]));
        }

        let vertical: Vec<_> = detector(150)
            .detect(&binary)
            .into_iter()
            .filter(|s| s.is_vertical(10))
            .collect();

        assert!(vertical.iter().any(|s| s.mid_x() == 60 && s.dy() >= 170));
        assert!(vertical.iter().all(|s| (58..=62).contains(&s.mid_x())));
    }

    #[test]
    fn test_short_runs_are_ignored() {
        let mut binary = GrayImage::new(200, 100);
        draw_filled_rect_mut(&mut binary, DrawRect::at(10, 40).of_size(60, 1), Luma([255]));
        draw_filled_rect_mut(&mut binary, DrawRect::at(100, 40).of_size(60, 1), Luma([255]));

        let segments = detector(100).detect(&binary);
        assert!(segments.iter().all(|s| !s.is_horizontal(10)));
    }

    #[test]
    fn test_blank_image_has_no_lines() {
        assert!(detector(10).detect(&GrayImage::new(50, 50)).is_empty());
    }

    #[test]
    fn test_merge_positions() {
        assert_eq!(merge_positions(&[48, 50, 52, 300, 650, 655], 10), vec![50, 300, 652]);
        assert_eq!(merge_positions(&[], 10), Vec::<i32>::new());
    }
}
