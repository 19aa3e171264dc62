//! Configuration structures for the localization pipeline.
//!
//! Every threshold the heuristics use lives here so that alternative
//! settings can be compared against the same image corpus.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ocr::PageSegMode;

/// Main configuration for the sheetloc pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetlocConfig {
    /// Pipeline-wide limits and paths.
    pub pipeline: PipelineConfig,

    /// Panel segmentation thresholds.
    pub segmentation: SegmentationConfig,

    /// Page-number candidate selection thresholds.
    pub selection: SelectionConfig,

    /// OCR backend configuration.
    pub ocr: OcrConfig,

    /// PDF rasterization configuration.
    pub pdf: PdfConfig,
}

/// Pipeline-wide limits and paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Reject pages with more pixels than this (None = unlimited).
    pub max_image_pixels: Option<u64>,

    /// Directory for cached pages and review previews.
    pub working_directory: PathBuf,

    /// Write intermediate rasters here when set.
    pub debug_dir: Option<PathBuf>,

    /// Segment a downscaled copy whose longer side is at most this (0 = full resolution).
    pub max_working_side: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_image_pixels: None,
            working_directory: PathBuf::from(".sheetloc"),
            debug_dir: None,
            max_working_side: 0,
        }
    }
}

/// Panel segmentation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Gray levels at or below this are ink.
    pub binarize_threshold: u8,

    /// Side of the square structuring element used to bridge gaps in rules.
    pub dilation_kernel: u32,

    /// Hough votes needed for a horizontal rule candidate.
    pub horizontal_vote_threshold: u32,

    /// Minimum horizontal segment length as a fraction of image width.
    pub horizontal_min_length_ratio: f32,

    /// Largest gap (pixels) bridged inside one segment.
    pub max_line_gap: u32,

    /// Maximum endpoint drift (pixels) for a segment to count as axis-aligned.
    pub axis_tolerance: u32,

    /// Canny low threshold for the vertical pass.
    pub canny_low: f32,

    /// Canny high threshold for the vertical pass.
    pub canny_high: f32,

    /// Hough votes for a vertical rule as a fraction of band height.
    pub vertical_vote_ratio: f32,

    /// Minimum vertical segment length in pixels.
    pub vertical_min_length: u32,

    /// Non-maximum suppression radius in the Hough accumulator.
    pub suppression_radius: u32,

    /// Panels narrower than this fraction of band width are dropped.
    pub min_panel_width_ratio: f32,

    /// Regions with at least this fraction of background pixels are empty.
    pub empty_fraction: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            binarize_threshold: 0,
            dilation_kernel: 10,
            horizontal_vote_threshold: 100,
            horizontal_min_length_ratio: 0.8,
            max_line_gap: 10,
            axis_tolerance: 10,
            canny_low: 50.0,
            canny_high: 150.0,
            vertical_vote_ratio: 0.8,
            vertical_min_length: 100,
            suppression_radius: 8,
            min_panel_width_ratio: 0.05,
            empty_fraction: 0.999,
        }
    }
}

/// Page-number candidate selection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Fraction of the side panel (from the bottom) that is scanned.
    pub bottom_fraction: f32,

    /// Fragments at least this many standard deviations above the mean height are dropped.
    pub outlier_sigma: f64,

    /// Candidates must be taller than this fraction of the tallest fragment.
    pub height_cutoff_ratio: f32,

    /// Candidates starting below this fraction of the region height win ties.
    pub lower_half_ratio: f32,

    /// Re-OCR the chosen box as a single text line.
    pub rescan_single_line: bool,

    /// Padding (pixels) around a prior box in refine mode.
    pub refine_margin: i32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            bottom_fraction: 0.25,
            outlier_sigma: 3.0,
            height_cutoff_ratio: 0.75,
            lower_half_ratio: 0.5,
            rescan_single_line: true,
            refine_margin: 20,
        }
    }
}

/// Which OCR engine backs the text-region adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    /// The `tesseract` command line tool.
    Tesseract,
    /// Pure Rust ONNX models via `pure-onnx-ocr`.
    Onnx,
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Engine used for recognition.
    pub backend: OcrBackend,

    /// Recognition language (tesseract `-l`).
    pub language: String,

    /// Path or name of the tesseract binary.
    pub tesseract_path: PathBuf,

    /// Tesseract engine mode (`--oem`).
    pub engine_mode: u8,

    /// Segmentation mode for whole side-panel scans.
    pub sidepanel_mode: PageSegMode,

    /// Segmentation mode for the page-number-only rescan.
    pub line_mode: PageSegMode,

    /// Side of the square kernel used to thicken glyphs before OCR.
    pub dilation_kernel: u32,

    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackend::Tesseract,
            language: "eng".to_string(),
            tesseract_path: PathBuf::from("tesseract"),
            engine_mode: 1,
            sidepanel_mode: PageSegMode::SparseTextOsd,
            line_mode: PageSegMode::SingleLine,
            dilation_kernel: 3,
            model_dir: PathBuf::from("models"),
        }
    }
}

/// Which collaborator turns PDF pages into rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterizerKind {
    /// Render with poppler's `pdftoppm`.
    Poppler,
    /// Use the largest raster image embedded in each page.
    Embedded,
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// DPI for rendering PDF pages to images.
    pub render_dpi: u32,

    /// Rasterization strategy.
    pub rasterizer: RasterizerKind,

    /// Path or name of the pdftoppm binary.
    pub pdftoppm_path: PathBuf,

    /// Maximum pages to process (0 = unlimited).
    pub max_pages: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            render_dpi: 300,
            rasterizer: RasterizerKind::Poppler,
            pdftoppm_path: PathBuf::from("pdftoppm"),
            max_pages: 0,
        }
    }
}

impl SheetlocConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{ "selection": { "height_cutoff_ratio": 0.6 }, "ocr": { "backend": "onnx" } }"#;
        let config: SheetlocConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.selection.height_cutoff_ratio, 0.6);
        assert_eq!(config.selection.refine_margin, 20);
        assert_eq!(config.ocr.backend, OcrBackend::Onnx);
        assert_eq!(config.ocr.sidepanel_mode, PageSegMode::SparseTextOsd);
        assert_eq!(config.segmentation.dilation_kernel, 10);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = SheetlocConfig::default();
        config.pipeline.max_image_pixels = Some(50_000_000);
        config.save(&path).unwrap();

        let loaded = SheetlocConfig::from_file(&path).unwrap();
        assert_eq!(loaded.pipeline.max_image_pixels, Some(50_000_000));
        assert_eq!(loaded.pdf.render_dpi, 300);
    }
}
