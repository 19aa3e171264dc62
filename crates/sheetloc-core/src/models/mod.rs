//! Data models shared across the pipeline.

pub mod annotation;
pub mod config;

pub use annotation::{image_key, Annotation, AnnotationSource, NewAnnotation};
pub use config::{
    OcrBackend, OcrConfig, PdfConfig, PipelineConfig, RasterizerKind, SegmentationConfig,
    SelectionConfig, SheetlocConfig,
};
