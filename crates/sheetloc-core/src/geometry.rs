//! Axis-aligned rectangles and the region arithmetic shared by every stage.
//!
//! Coordinates are integer pixels with exclusive right/bottom edges, so a
//! rectangle `(x1, y1, x2, y2)` covers `x2 - x1` columns and `y2 - y1` rows.
//! Arithmetic is done in `i32` so that padding and OCR border offsets may
//! temporarily leave the image; `clamp` brings them back.

use std::fmt;
use std::str::FromStr;

use image::{DynamicImage, GenericImageView, GrayImage};
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Axis-aligned bounding box with `x1 <= x2` and `y1 <= y2`.
///
/// Deserialized corners are normalized the same way as [`Rect::new`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Corners")]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

#[derive(Deserialize)]
struct Corners {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

impl From<Corners> for Rect {
    fn from(c: Corners) -> Self {
        Rect::new(c.x1, c.y1, c.x2, c.y2)
    }
}

impl Rect {
    /// Create a rectangle from two corners, in any order.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Create a rectangle from a left/top origin and a size.
    pub fn from_xywh(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self::new(left, top, left + width as i32, top + height as i32)
    }

    /// Rectangle covering a whole `width` x `height` image.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn width(&self) -> u32 {
        self.x2.abs_diff(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.abs_diff(self.y1)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.x1 == self.x2 || self.y1 == self.y2
    }

    /// Clip the rectangle into `[0, width] x [0, height]`. Never fails.
    pub fn clamp(&self, width: u32, height: u32) -> Rect {
        let (w, h) = (width as i32, height as i32);
        Rect {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }

    /// Grow the rectangle by `margin` on every side, then clamp.
    pub fn pad(&self, margin: i32, width: u32, height: u32) -> Rect {
        Rect::new(
            self.x1 - margin,
            self.y1 - margin,
            self.x2 + margin,
            self.y2 + margin,
        )
        .clamp(width, height)
    }

    /// Project a rectangle computed on a resized copy back to another resolution.
    pub fn scale(&self, factor_x: f64, factor_y: f64) -> Rect {
        Rect::new(
            (self.x1 as f64 * factor_x).round() as i32,
            (self.y1 as f64 * factor_y).round() as i32,
            (self.x2 as f64 * factor_x).round() as i32,
            (self.y2 as f64 * factor_y).round() as i32,
        )
    }

    /// Shift the rectangle by an offset.
    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
        }
    }

    /// Check that `other` lies entirely inside this rectangle.
    pub fn contains(&self, other: &Rect) -> bool {
        other.x1 >= self.x1 && other.y1 >= self.y1 && other.x2 <= self.x2 && other.y2 <= self.y2
    }

    /// Check that the rectangle lies inside a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        Rect::full(width, height).contains(self)
    }

    /// Check whether two rectangles share any area.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x1 < other.x2 && other.x1 < self.x2 && self.y1 < other.y2 && other.y1 < self.y2
    }

    fn check_bounds(&self, width: u32, height: u32) -> Result<(), GeometryError> {
        if !self.fits_within(width, height) {
            return Err(GeometryError::OutOfBounds {
                rect: *self,
                width,
                height,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x1, self.y1, self.x2, self.y2)
    }
}

impl FromStr for Rect {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<i32> = s
            .split(',')
            .map(|p| p.trim().parse::<i32>())
            .collect::<Result<_, _>>()
            .map_err(|_| GeometryError::Parse(s.to_string()))?;

        match parts.as_slice() {
            [x1, y1, x2, y2] => Ok(Rect::new(*x1, *y1, *x2, *y2)),
            _ => Err(GeometryError::Parse(s.to_string())),
        }
    }
}

/// Crop a region out of an image. The region must already be clamped.
pub fn crop(image: &DynamicImage, rect: &Rect) -> Result<DynamicImage, GeometryError> {
    let (width, height) = image.dimensions();
    rect.check_bounds(width, height)?;
    Ok(image.crop_imm(
        rect.x1 as u32,
        rect.y1 as u32,
        rect.width(),
        rect.height(),
    ))
}

/// Crop a region out of a grayscale buffer. The region must already be clamped.
pub fn crop_gray(image: &GrayImage, rect: &Rect) -> Result<GrayImage, GeometryError> {
    let (width, height) = image.dimensions();
    rect.check_bounds(width, height)?;
    Ok(image::imageops::crop_imm(
        image,
        rect.x1 as u32,
        rect.y1 as u32,
        rect.width(),
        rect.height(),
    )
    .to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_normalizes_corners() {
        let rect = Rect::new(40, 30, 10, 5);
        assert_eq!(rect, Rect { x1: 10, y1: 5, x2: 40, y2: 30 });
        assert_eq!(rect.width(), 30);
        assert_eq!(rect.height(), 25);
    }

    #[test]
    fn test_deserialize_normalizes_swapped_corners() {
        let rect: Rect = serde_json::from_str(r#"{"x1": 40, "y1": 30, "x2": 10, "y2": 5}"#).unwrap();
        assert_eq!(rect, Rect::new(10, 5, 40, 30));
        assert_eq!(rect.width(), 30);
        assert_eq!(rect.height(), 25);

        let swapped = Rect { x1: 40, y1: 0, x2: 10, y2: 5 };
        assert_eq!(swapped.width(), 30);
        assert_eq!(serde_json::to_string(&rect).unwrap(), r#"{"x1":10,"y1":5,"x2":40,"y2":30}"#);
    }

    #[test]
    fn test_clamp_clips_to_image() {
        let rect = Rect::new(-5, -10, 120, 90);
        assert_eq!(rect.clamp(100, 80), Rect::new(0, 0, 100, 80));

        // Entirely outside collapses onto the border
        let outside = Rect::new(150, 10, 200, 20).clamp(100, 80);
        assert!(outside.is_empty());
        assert!(outside.fits_within(100, 80));
    }

    #[test]
    fn test_pad_expands_then_clamps() {
        let rect = Rect::new(10, 10, 50, 30);
        assert_eq!(rect.pad(20, 200, 200), Rect::new(0, 0, 70, 50));
        assert_eq!(rect.pad(5, 52, 200), Rect::new(5, 5, 52, 35));
    }

    #[test]
    fn test_scale_projects_back() {
        let rect = Rect::new(10, 20, 30, 40);
        assert_eq!(rect.scale(2.0, 0.5), Rect::new(20, 10, 60, 20));
        assert_eq!(rect.scale(1.0 / 3.0, 1.0 / 3.0), Rect::new(3, 7, 10, 13));
    }

    #[test]
    fn test_translate_round_trip() {
        let local = Rect::new(3, 7, 45, 19);
        let global = local.translate(700, 450).translate(0, 150);
        assert_eq!(global.translate(-700, -450).translate(0, -150), local);
    }

    #[test]
    fn test_parse_rect() {
        assert_eq!("1, 2,30,40".parse::<Rect>(), Ok(Rect::new(1, 2, 30, 40)));
        assert!("1,2,3".parse::<Rect>().is_err());
        assert!("a,b,c,d".parse::<Rect>().is_err());
        assert_eq!(Rect::new(1, 2, 3, 4).to_string(), "1,2,3,4");
    }

    #[test]
    fn test_crop_requires_clamped_rect() {
        let image = DynamicImage::new_luma8(100, 50);
        let cropped = crop(&image, &Rect::new(10, 10, 60, 40)).unwrap();
        assert_eq!(cropped.dimensions(), (50, 30));

        let err = crop(&image, &Rect::new(90, 0, 110, 20)).unwrap_err();
        assert!(matches!(err, GeometryError::OutOfBounds { width: 100, height: 50, .. }));
    }

    #[test]
    fn test_overlaps() {
        let a = Rect::new(0, 0, 10, 10);
        assert!(a.overlaps(&Rect::new(5, 5, 15, 15)));
        assert!(!a.overlaps(&Rect::new(10, 0, 20, 10)));
    }
}
