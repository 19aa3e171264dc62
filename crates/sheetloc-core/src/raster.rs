//! Raster primitives shared by segmentation and OCR preparation.

use std::path::Path;

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use tracing::{debug, warn};

use crate::geometry::Rect;

/// Inverted binary threshold: pixels at or below `threshold` become 255 (ink), the rest 0.
pub fn binarize_inverted(gray: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = gray.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if gray.get_pixel(x, y)[0] <= threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Dilate foreground with a square structuring element of roughly `kernel` pixels.
///
/// Even sizes are rounded up to the next odd size so the element stays centered.
pub fn dilate_square(binary: &GrayImage, kernel: u32) -> GrayImage {
    if kernel <= 1 {
        return binary.clone();
    }
    let radius = (kernel / 2).min(u8::MAX as u32) as u8;
    morphology::dilate(binary, Norm::LInf, radius)
}

/// Return a copy with every pixel inverted.
pub fn inverted(image: &GrayImage) -> GrayImage {
    let mut out = image.clone();
    image::imageops::invert(&mut out);
    out
}

/// Surround an image with a constant border of `border` pixels on every side.
pub fn add_border(image: &GrayImage, border: u32, value: u8) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut out = GrayImage::from_pixel(width + 2 * border, height + 2 * border, Luma([value]));
    image::imageops::replace(&mut out, image, border as i64, border as i64);
    out
}

/// Fraction of pixels inside `rect` brighter than `threshold` (background).
///
/// An empty or out-of-image region reports 1.0, i.e. fully empty.
pub fn background_fraction(gray: &GrayImage, rect: &Rect, threshold: u8) -> f64 {
    let rect = rect.clamp(gray.width(), gray.height());
    if rect.is_empty() {
        return 1.0;
    }

    let mut background = 0u64;
    for y in rect.y1 as u32..rect.y2 as u32 {
        for x in rect.x1 as u32..rect.x2 as u32 {
            if gray.get_pixel(x, y)[0] > threshold {
                background += 1;
            }
        }
    }

    background as f64 / rect.area() as f64
}

/// Check whether a region is blank margin rather than drawing content.
pub fn is_mostly_empty(gray: &GrayImage, rect: &Rect, threshold: u8, empty_fraction: f64) -> bool {
    background_fraction(gray, rect, threshold) >= empty_fraction
}

/// Write an intermediate raster as `<dir>/<name>.png` when a debug directory is set.
///
/// Failures are logged and otherwise ignored.
pub fn save_debug(dir: Option<&Path>, name: &str, image: &GrayImage) {
    let Some(dir) = dir else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("Cannot create debug directory {}: {}", dir.display(), e);
        return;
    }
    let path = dir.join(format!("{}.png", name));
    match image.save(&path) {
        Ok(()) => debug!("Wrote debug image {}", path.display()),
        Err(e) => warn!("Cannot write debug image {}: {}", path.display(), e),
    }
}
