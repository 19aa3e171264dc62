//! Error types for the sheetloc-core library.
//!
//! Soft misses (no ruling lines, too few panels, no digit-bearing text) are
//! not errors; they are reported as values by the localizer. The variants
//! here cover caller mistakes and collaborator failures only.

use thiserror::Error;

use crate::geometry::Rect;

/// Main error type for the sheetloc library.
#[derive(Error, Debug)]
pub enum SheetlocError {
    /// Region arithmetic precondition failed.
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// OCR collaborator failed.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// PDF rasterization collaborator failed.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Annotation store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Manual review collaborator failed.
    #[error("review error: {0}")]
    Review(#[from] ReviewError),

    /// Image decoding or encoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The page exceeds the configured pixel budget.
    #[error("image has {pixels} pixels, limit is {limit}")]
    ImageTooLarge { pixels: u64, limit: u64 },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to rectangle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// The rectangle is not contained in the image; clamp it first.
    #[error("rectangle {rect} is outside a {width}x{height} image")]
    OutOfBounds { rect: Rect, width: u32, height: u32 },

    /// The rectangle has no area.
    #[error("rectangle {0} is empty")]
    Empty(Rect),

    /// Text could not be parsed as `x1,y1,x2,y2`.
    #[error("invalid rectangle '{0}', expected x1,y1,x2,y2")]
    Parse(String),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The OCR engine could not be started or its models could not be loaded.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// The OCR engine ran but reported a failure.
    #[error("OCR engine failed: {0}")]
    Engine(String),

    /// The engine output could not be parsed.
    #[error("failed to parse OCR output: {0}")]
    Parse(String),

    /// Image preparation for the engine failed.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),

    /// The page could not be turned into a raster image.
    #[error("failed to render page: {0}")]
    Render(String),
}

/// Errors raised by annotation stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backing storage could not be read or written.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("invalid annotation record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store lock was poisoned by a panicking writer.
    #[error("store is poisoned")]
    Poisoned,
}

/// Errors raised by manual review collaborators.
#[derive(Error, Debug)]
pub enum ReviewError {
    /// No operator is available to answer.
    #[error("manual review unavailable: {0}")]
    Unavailable(String),

    /// The operator answer could not be understood.
    #[error("invalid review input: {0}")]
    InvalidInput(String),

    /// I/O error while talking to the operator.
    #[error("review I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the sheetloc library.
pub type Result<T> = std::result::Result<T, SheetlocError>;
