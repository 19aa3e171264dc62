//! Pure Rust OCR backend using `pure-onnx-ocr`.

use std::path::Path;
use std::time::Instant;

use image::DynamicImage;
use tracing::{debug, info};

use crate::error::OcrError;
use crate::geometry::Rect;

use super::{PageSegMode, TextFragment, TextRecognizer};

/// Detection + recognition models loaded from a directory.
///
/// The engine does its own text detection, so the page segmentation mode
/// is ignored.
pub struct OnnxRecognizer {
    engine: pure_onnx_ocr::engine::OcrEngine,
}

impl OnnxRecognizer {
    /// Load `det.onnx`, `latin_rec.onnx` and `latin_dict.txt` from `model_dir`.
    pub fn from_dir(model_dir: &Path) -> Result<Self, OcrError> {
        let det_path = model_dir.join("det.onnx");
        let rec_path = model_dir.join("latin_rec.onnx");
        let dict_path = model_dir.join("latin_dict.txt");

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::Unavailable(format!(
                    "model file missing: {}",
                    path.display()
                )));
            }
        }

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::Unavailable(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded ONNX OCR models from {}", model_dir.display());
        Ok(Self { engine })
    }
}

impl TextRecognizer for OnnxRecognizer {
    fn recognize(
        &self,
        image: &DynamicImage,
        _mode: PageSegMode,
    ) -> Result<Vec<TextFragment>, OcrError> {
        let start = Instant::now();
        let results = self
            .engine
            .run_from_image(image)
            .map_err(|e| OcrError::Engine(format!("pure-onnx-ocr: {}", e)))?;

        let fragments: Vec<TextFragment> = results
            .iter()
            .map(|r| {
                TextFragment::new(
                    r.text.replace("[UNK]", " ").trim(),
                    polygon_to_rect(&r.bounding_box),
                    r.confidence,
                )
            })
            .collect();

        debug!(
            "pure-onnx-ocr returned {} regions in {}ms",
            fragments.len(),
            start.elapsed().as_millis()
        );
        Ok(fragments)
    }
}

/// Axis-aligned hull of a detection polygon.
fn polygon_to_rect(polygon: &pure_onnx_ocr::Polygon<f64>) -> Rect {
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for coord in polygon.exterior().coords() {
        min_x = min_x.min(coord.x);
        min_y = min_y.min(coord.y);
        max_x = max_x.max(coord.x);
        max_y = max_y.max(coord.y);
    }
    if !min_x.is_finite() {
        return Rect::default();
    }
    Rect::new(
        min_x.floor() as i32,
        min_y.floor() as i32,
        max_x.ceil() as i32,
        max_y.ceil() as i32,
    )
}
