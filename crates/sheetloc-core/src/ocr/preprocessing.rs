//! Region preparation for OCR.
//!
//! Title-block numerals are large and isolated, which page-oriented engines
//! handle poorly. A region is therefore thickened, turned back into dark ink
//! on white and centered in a white frame as wide as the region itself.

use std::path::PathBuf;

use image::{DynamicImage, GrayImage};
use tracing::{debug, trace};

use crate::error::OcrError;
use crate::models::config::OcrConfig;
use crate::raster;

use super::{PageSegMode, TextFragment, TextRecognizer};

/// Prepares regions for a [`TextRecognizer`] and maps results back.
#[derive(Debug, Clone)]
pub struct OcrPreprocessor {
    /// Gray levels at or below this are ink.
    binarize_threshold: u8,
    /// Glyph-thickening kernel.
    dilation_kernel: u32,
    /// Write the bordered OCR input here when set.
    debug_dir: Option<PathBuf>,
}

impl OcrPreprocessor {
    pub fn new(binarize_threshold: u8, dilation_kernel: u32) -> Self {
        Self {
            binarize_threshold,
            dilation_kernel,
            debug_dir: None,
        }
    }

    /// Build from the OCR section plus the segmentation ink threshold.
    pub fn from_config(ocr: &OcrConfig, binarize_threshold: u8) -> Self {
        Self::new(binarize_threshold, ocr.dilation_kernel)
    }

    /// Dump prepared images into `dir`.
    pub fn with_debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    /// Binarize, dilate, invert and frame a region.
    ///
    /// Returns the prepared image and the border width added on each side.
    pub fn prepare(&self, region: &DynamicImage) -> (GrayImage, u32) {
        let gray = region.to_luma8();
        let binary = raster::binarize_inverted(&gray, self.binarize_threshold);
        let dilated = raster::dilate_square(&binary, self.dilation_kernel);
        let ink_on_white = raster::inverted(&dilated);

        let border = gray.width();
        let framed = raster::add_border(&ink_on_white, border, 255);
        trace!(
            "Prepared {}x{} region with {}px border",
            gray.width(),
            gray.height(),
            border
        );
        (framed, border)
    }

    /// OCR a region and return fragments in region-local coordinates.
    ///
    /// Fragments that fall entirely in the added frame are dropped.
    pub fn recognize_region<R: TextRecognizer + ?Sized>(
        &self,
        recognizer: &R,
        region: &DynamicImage,
        mode: PageSegMode,
    ) -> Result<Vec<TextFragment>, OcrError> {
        if region.width() == 0 || region.height() == 0 {
            return Ok(Vec::new());
        }

        let (framed, border) = self.prepare(region);
        raster::save_debug(
            self.debug_dir.as_deref(),
            &format!("ocr_input_{:?}", mode).to_lowercase(),
            &framed,
        );

        let raw = recognizer.recognize(&DynamicImage::ImageLuma8(framed), mode)?;
        let offset = border as i32;
        let fragments: Vec<TextFragment> = raw
            .into_iter()
            .filter_map(|fragment| {
                let bbox = fragment
                    .bbox
                    .translate(-offset, -offset)
                    .clamp(region.width(), region.height());
                (!bbox.is_empty()).then(|| TextFragment { bbox, ..fragment })
            })
            .collect();

        debug!(
            "OCR ({:?}) returned {} fragments for {}x{} region",
            mode,
            fragments.len(),
            region.width(),
            region.height()
        );
        Ok(fragments)
    }
}

impl Default for OcrPreprocessor {
    fn default() -> Self {
        Self::new(0, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use image::Luma;
    use std::cell::RefCell;

    struct Recording {
        seen: RefCell<Vec<(u32, u32)>>,
        reply: Vec<TextFragment>,
    }

    impl TextRecognizer for Recording {
        fn recognize(
            &self,
            image: &DynamicImage,
            _mode: PageSegMode,
        ) -> Result<Vec<TextFragment>, OcrError> {
            self.seen.borrow_mut().push((image.width(), image.height()));
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn test_prepare_frames_region() {
        let mut gray = GrayImage::from_pixel(40, 10, Luma([255]));
        gray.put_pixel(20, 5, Luma([0]));
        let (framed, border) = OcrPreprocessor::default().prepare(&DynamicImage::ImageLuma8(gray));

        assert_eq!(border, 40);
        assert_eq!(framed.dimensions(), (120, 90));
        // ink stays dark and is thickened by one pixel each way
        assert_eq!(framed.get_pixel(60, 45)[0], 0);
        assert_eq!(framed.get_pixel(61, 46)[0], 0);
        assert_eq!(framed.get_pixel(63, 45)[0], 255);
        assert_eq!(framed.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_recognize_region_removes_border() {
        let recognizer = Recording {
            seen: RefCell::new(Vec::new()),
            reply: vec![
                TextFragment::new("A-101", Rect::new(110, 130, 150, 150), 91.0),
                TextFragment::new("noise", Rect::new(0, 0, 20, 20), 40.0),
            ],
        };
        let region = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 60, Luma([255])));

        let fragments = OcrPreprocessor::default()
            .recognize_region(&recognizer, &region, PageSegMode::SparseTextOsd)
            .unwrap();

        assert_eq!(recognizer.seen.borrow().as_slice(), &[(300, 260)]);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].bbox, Rect::new(10, 30, 50, 50));
    }
}
