//! Terminal implementation of the manual review collaborator.
//!
//! The page is written as a preview PNG with the region of interest outlined;
//! the operator opens it in any viewer and answers on the terminal.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::Utc;
use console::{style, Term};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use tracing::debug;

use sheetloc_core::error::ReviewError;
use sheetloc_core::review::{ManualBox, ManualReviewer, ReviewVerdict};
use sheetloc_core::Rect;

const OUTLINE: Rgb<u8> = Rgb([255, 0, 0]);
const OUTLINE_WIDTH: i32 = 3;

pub struct TerminalReviewer {
    term: Term,
    preview_dir: PathBuf,
}

impl TerminalReviewer {
    pub fn new(preview_dir: impl Into<PathBuf>) -> Self {
        Self {
            term: Term::stderr(),
            preview_dir: preview_dir.into(),
        }
    }

    fn write_preview(&self, image: &DynamicImage, rect: Option<Rect>) -> Result<PathBuf, ReviewError> {
        fs::create_dir_all(&self.preview_dir)?;
        let path = self
            .preview_dir
            .join(format!("review_{}.png", Utc::now().format("%Y%m%d_%H%M%S_%3f")));
        render_preview(image, rect)
            .save(&path)
            .map_err(|e| ReviewError::Io(io::Error::other(e)))?;
        debug!("Wrote review preview {}", path.display());
        Ok(path)
    }

    fn read_key(&self) -> Result<char, ReviewError> {
        if self.term.is_term() {
            let key = self.term.read_char()?;
            self.term.write_line("")?;
            Ok(key)
        } else {
            Ok(self.term.read_line()?.trim().chars().next().unwrap_or(' '))
        }
    }
}

/// Copy of the page with `rect` outlined.
fn render_preview(image: &DynamicImage, rect: Option<Rect>) -> RgbImage {
    let mut preview = image.to_rgb8();
    if let Some(rect) = rect {
        let rect = rect.clamp(preview.width(), preview.height());
        for inset in 0..OUTLINE_WIDTH {
            let width = rect.width() as i32 - 2 * inset;
            let height = rect.height() as i32 - 2 * inset;
            if width <= 0 || height <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                &mut preview,
                imageproc::rect::Rect::at(rect.x1 + inset, rect.y1 + inset).of_size(width as u32, height as u32),
                OUTLINE,
            );
        }
    }
    preview
}

/// `y` is valid, `n` is invalid, anything else skips.
fn verdict_for_key(key: char) -> ReviewVerdict {
    match key.to_ascii_lowercase() {
        'y' => ReviewVerdict::Valid,
        'n' => ReviewVerdict::Invalid,
        _ => ReviewVerdict::Skip,
    }
}

impl ManualReviewer for TerminalReviewer {
    fn request_bounding_box(
        &mut self,
        image: &DynamicImage,
        hint: Option<Rect>,
    ) -> Result<ManualBox, ReviewError> {
        let preview = self.write_preview(image, hint)?;
        self.term.write_line(&format!(
            "{} Preview written to {}",
            style("ℹ").blue(),
            preview.display()
        ))?;
        if let Some(hint) = hint {
            self.term.write_line(&format!("   Outlined region: {}", hint))?;
        }

        loop {
            self.term
                .write_str("Page-number box as x1,y1,x2,y2 (empty line cancels): ")?;
            let line = self.term.read_line()?;
            let line = line.trim();
            if line.is_empty() {
                return Ok(ManualBox::Cancelled);
            }
            match line.parse::<Rect>() {
                Ok(rect) if !rect.is_empty() => return Ok(ManualBox::Drawn(rect)),
                Ok(rect) => self.term.write_line(&format!("{} Box {} is empty", style("!").yellow(), rect))?,
                Err(e) => self.term.write_line(&format!("{} {}", style("!").yellow(), e))?,
            }
        }
    }

    fn request_validity_judgment(
        &mut self,
        image: &DynamicImage,
        bbox: &Rect,
        text: &str,
    ) -> Result<ReviewVerdict, ReviewError> {
        let preview = self.write_preview(image, Some(*bbox))?;
        self.term.write_line(&format!(
            "{} Preview written to {}",
            style("ℹ").blue(),
            preview.display()
        ))?;
        self.term.write_str(&format!(
            "Is {} at {} the page number? [y]es / [n]o / other key skips: ",
            style(text).bold(),
            bbox
        ))?;
        Ok(verdict_for_key(self.read_key()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_verdict_keys() {
        assert_eq!(verdict_for_key('y'), ReviewVerdict::Valid);
        assert_eq!(verdict_for_key('N'), ReviewVerdict::Invalid);
        assert_eq!(verdict_for_key('s'), ReviewVerdict::Skip);
    }

    #[test]
    fn test_preview_outlines_region() {
        let page = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(50, 40, Luma([255])));
        let preview = render_preview(&page, Some(Rect::new(10, 10, 30, 25)));

        assert_eq!(preview.get_pixel(10, 10), &OUTLINE);
        assert_eq!(preview.get_pixel(12, 15), &OUTLINE);
        assert_eq!(preview.get_pixel(20, 17), &Rgb([255, 255, 255]));
        assert_eq!(preview.get_pixel(5, 5), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_preview_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let reviewer = TerminalReviewer::new(dir.path().join("review"));
        let page = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(20, 20, Luma([255])));

        let path = reviewer.write_preview(&page, None).unwrap();
        assert!(path.exists());
    }
}
