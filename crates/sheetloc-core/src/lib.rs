//! Core library for locating sheet numbers on construction drawings.
//!
//! This crate provides:
//! - Panel segmentation from the ruling lines of a drawing sheet
//! - Side-panel (title block) selection
//! - OCR adapters (tesseract subprocess, pure Rust ONNX models)
//! - Page-number candidate selection and the localization orchestrator
//! - Collaborator seams for PDF rasterization, annotation storage and manual review

pub mod error;
pub mod geometry;
pub mod locate;
pub mod models;
pub mod ocr;
pub mod patterns;
pub mod pdf;
pub mod raster;
pub mod review;
pub mod segmentation;
pub mod store;

pub use error::{Result, SheetlocError};
pub use geometry::Rect;
pub use locate::{Localization, LocalizationResult, Localizer, ManualOutcome, MissReason, Refinement};
pub use models::annotation::{image_key, Annotation, AnnotationSource, NewAnnotation};
pub use models::config::SheetlocConfig;
pub use ocr::{PageSegMode, TesseractRecognizer, TextFragment, TextRecognizer};
#[cfg(feature = "native")]
pub use ocr::OnnxRecognizer;
pub use pdf::{open_rasterizer, PageRasterizer, PdfExtractor, PopplerRasterizer};
pub use review::{ManualBox, ManualReviewer, ReviewVerdict};
pub use segmentation::{segment_panels, select_side_panel, Panel, PanelSegmenter};
pub use store::{pending_refinement, refine_stored, AnnotationStore, JsonAnnotationStore, MemoryAnnotationStore, StoreAction};
