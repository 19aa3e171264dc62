//! Text-region OCR adapter.
//!
//! The localization pipeline only needs words with boxes and confidences, so
//! every engine is reduced to the [`TextRecognizer`] trait. Backends:
//!
//! - [`TesseractRecognizer`]: the `tesseract` command line tool (TSV output)
//! - `OnnxRecognizer`: pure Rust ONNX models (`native` feature)

mod preprocessing;
#[cfg(feature = "native")]
mod pure_engine;
mod tesseract;

pub use preprocessing::OcrPreprocessor;
#[cfg(feature = "native")]
pub use pure_engine::OnnxRecognizer;
pub use tesseract::{parse_tsv, TesseractRecognizer};

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::OcrError;
use crate::geometry::Rect;

/// A recognized word or text run with its box and confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    /// Recognized text content.
    pub text: String,

    /// Box in the coordinates of the image handed to the recognizer.
    pub bbox: Rect,

    /// Engine confidence. Tesseract reports 0-100, ONNX models 0-1.
    pub confidence: f32,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, bbox: Rect, confidence: f32) -> Self {
        Self {
            text: text.into(),
            bbox,
            confidence,
        }
    }

    /// Pixel height of the fragment box.
    pub fn height(&self) -> u32 {
        self.bbox.height()
    }

    /// Check whether the text has at least one decimal digit.
    pub fn has_digit(&self) -> bool {
        self.text.chars().any(|c| c.is_ascii_digit())
    }

    /// Non-blank text with a positive confidence.
    pub fn is_measurable(&self) -> bool {
        !self.text.trim().is_empty() && self.confidence > 0.0
    }
}

/// How the engine partitions an image into text before recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSegMode {
    /// Fully automatic page segmentation.
    Auto,
    /// Treat the image as a single text line.
    SingleLine,
    /// Find as much text as possible in no particular order.
    SparseText,
    /// Sparse text with orientation and script detection.
    SparseTextOsd,
}

impl PageSegMode {
    /// Tesseract `--psm` value.
    pub fn as_psm(self) -> u8 {
        match self {
            PageSegMode::Auto => 3,
            PageSegMode::SingleLine => 7,
            PageSegMode::SparseText => 11,
            PageSegMode::SparseTextOsd => 12,
        }
    }
}

/// An OCR capability: image in, fragments out.
///
/// Fragment boxes are relative to the image passed in. Implementations must
/// be deterministic for a given image and mode.
pub trait TextRecognizer {
    fn recognize(
        &self,
        image: &DynamicImage,
        mode: PageSegMode,
    ) -> Result<Vec<TextFragment>, OcrError>;
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Box<T> {
    fn recognize(
        &self,
        image: &DynamicImage,
        mode: PageSegMode,
    ) -> Result<Vec<TextFragment>, OcrError> {
        (**self).recognize(image, mode)
    }
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for &T {
    fn recognize(
        &self,
        image: &DynamicImage,
        mode: PageSegMode,
    ) -> Result<Vec<TextFragment>, OcrError> {
        (**self).recognize(image, mode)
    }
}

/// Join fragments into one label in left-to-right order, e.g. `"A" "1.01"` -> `"A 1.01"`.
pub fn join_single_line(fragments: &[TextFragment]) -> String {
    let mut words: Vec<&TextFragment> = fragments
        .iter()
        .filter(|f| !f.text.trim().is_empty())
        .collect();
    words.sort_by_key(|f| f.bbox.x1);

    words
        .iter()
        .map(|f| f.text.trim())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_single_line_orders_left_to_right() {
        let fragments = vec![
            TextFragment::new("1.01", Rect::new(40, 0, 80, 20), 90.0),
            TextFragment::new("  ", Rect::new(20, 0, 30, 20), 10.0),
            TextFragment::new("A", Rect::new(0, 0, 15, 20), 95.0),
        ];
        assert_eq!(join_single_line(&fragments), "A 1.01");
        assert_eq!(join_single_line(&[]), "");
    }

    #[test]
    fn test_psm_values() {
        assert_eq!(PageSegMode::SparseTextOsd.as_psm(), 12);
        assert_eq!(PageSegMode::SingleLine.as_psm(), 7);
        let json = serde_json::to_string(&PageSegMode::SparseText).unwrap();
        assert_eq!(json, "\"sparse_text\"");
    }

    #[test]
    fn test_fragment_predicates() {
        let fragment = TextFragment::new("A-101", Rect::new(0, 0, 10, 12), 80.0);
        assert!(fragment.has_digit());
        assert!(fragment.is_measurable());
        assert_eq!(fragment.height(), 12);

        let blank = TextFragment::new(" ", Rect::new(0, 0, 10, 12), 80.0);
        assert!(!blank.is_measurable());
        let zero = TextFragment::new("SHEET", Rect::new(0, 0, 10, 12), 0.0);
        assert!(!zero.is_measurable());
        assert!(!zero.has_digit());
    }
}
