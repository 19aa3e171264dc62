//! PDF rasterization collaborator.
//!
//! Bid documents arrive as PDFs; the localizer wants one raster per page.

mod extractor;
mod poppler;

pub use extractor::PdfExtractor;
pub use poppler::PopplerRasterizer;

use std::path::Path;

use image::DynamicImage;
use lopdf::Document;
use tracing::debug;

use crate::error::PdfError;
use crate::models::config::{PdfConfig, RasterizerKind};

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Produces one raster image per PDF page.
pub trait PageRasterizer {
    /// Number of pages in the document.
    fn page_count(&self) -> u32;

    /// Render a 1-indexed page at the given resolution.
    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage>;
}

/// Open `path` with the rasterizer selected in `config`.
pub fn open_rasterizer(path: &Path, config: &PdfConfig) -> Result<Box<dyn PageRasterizer>> {
    match config.rasterizer {
        RasterizerKind::Poppler => Ok(Box::new(PopplerRasterizer::open(path, &config.pdftoppm_path)?)),
        RasterizerKind::Embedded => {
            let data = std::fs::read(path).map_err(|e| PdfError::Parse(format!("{}: {}", path.display(), e)))?;
            Ok(Box::new(PdfExtractor::load(&data)?))
        }
    }
}

/// Pages to process: all of them, or the first `max_pages` when that is non-zero.
pub fn page_range(rasterizer: &dyn PageRasterizer, max_pages: usize) -> std::ops::RangeInclusive<u32> {
    let count = rasterizer.page_count();
    let last = if max_pages == 0 {
        count
    } else {
        count.min(max_pages as u32)
    };
    1..=last
}

/// Parse a PDF, decrypting documents protected by an empty password.
pub(crate) fn load_document(data: &[u8]) -> Result<Document> {
    let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

    if doc.is_encrypted() {
        if doc.decrypt("").is_err() {
            return Err(PdfError::Encrypted);
        }
        debug!("Decrypted PDF with empty password");
    }

    if doc.get_pages().is_empty() {
        return Err(PdfError::NoPages);
    }
    Ok(doc)
}

#[cfg(test)]
pub(crate) mod tests {
    use lopdf::{dictionary, Document, Object, Stream};

    /// One-page PDF whose page draws the given gray images as XObjects.
    pub(crate) fn pdf_with_gray_images(sizes: &[(u32, u32)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut xobjects = lopdf::Dictionary::new();
        for (i, &(width, height)) in sizes.iter().enumerate() {
            let image = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                vec![128u8; (width * height) as usize],
            );
            let image_id = doc.add_object(image);
            xobjects.set(format!("Im{}", i), image_id);
        }

        let resources_id = doc.add_object(dictionary! { "XObject" => xobjects });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(matches!(
            super::load_document(b"not a pdf"),
            Err(crate::error::PdfError::Parse(_))
        ));
    }

    #[test]
    fn test_page_range() {
        let pdf = pdf_with_gray_images(&[(4, 3)]);
        let extractor = super::PdfExtractor::load(&pdf).unwrap();
        assert_eq!(super::page_range(&extractor, 0), 1..=1);
        assert_eq!(super::page_range(&extractor, 5), 1..=1);
    }
}
