//! Rasterizer backed by poppler's `pdftoppm`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::DynamicImage;
use tracing::{debug, trace};

use super::{load_document, PageRasterizer, Result};
use crate::error::PdfError;

/// Renders single pages with `pdftoppm -r <dpi> -f <n> -l <n> -png -singlefile`.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    path: PathBuf,
    binary: PathBuf,
    pages: u32,
}

impl PopplerRasterizer {
    /// Open `path`, counting its pages with lopdf.
    pub fn open(path: &Path, binary: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| PdfError::Parse(format!("{}: {}", path.display(), e)))?;
        let pages = load_document(&data)?.get_pages().len() as u32;
        debug!("{} has {} pages", path.display(), pages);
        Ok(Self {
            path: path.to_path_buf(),
            binary: binary.to_path_buf(),
            pages,
        })
    }
}

impl PageRasterizer for PopplerRasterizer {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage> {
        if page == 0 || page > self.pages {
            return Err(PdfError::InvalidPage(page));
        }

        let out_dir = tempfile::Builder::new()
            .prefix("sheetloc-pdf-")
            .tempdir()
            .map_err(|e| PdfError::Render(format!("temp dir: {}", e)))?;
        let prefix = out_dir.path().join("page");

        trace!("Rendering page {} of {} at {} dpi", page, self.path.display(), dpi);
        let output = Command::new(&self.binary)
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-png")
            .arg("-singlefile")
            .arg(&self.path)
            .arg(&prefix)
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    PdfError::Render(format!("{} not found", self.binary.display()))
                } else {
                    PdfError::Render(format!("cannot start {}: {}", self.binary.display(), e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PdfError::Render(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        image::open(prefix.with_extension("png"))
            .map_err(|e| PdfError::Render(format!("decode page {}: {}", page, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::tests::pdf_with_gray_images;

    fn write_pdf(dir: &Path) -> PathBuf {
        let path = dir.join("set.pdf");
        std::fs::write(&path, pdf_with_gray_images(&[(8, 8)])).unwrap();
        path
    }

    #[test]
    fn test_missing_binary_is_a_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = write_pdf(dir.path());
        let rasterizer = PopplerRasterizer::open(&pdf, Path::new("/nonexistent/pdftoppm")).unwrap();

        assert_eq!(rasterizer.page_count(), 1);
        match rasterizer.render_page(1, 72) {
            Err(PdfError::Render(msg)) => assert!(msg.contains("not found")),
            other => panic!("expected render error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_page_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = write_pdf(dir.path());
        let rasterizer = PopplerRasterizer::open(&pdf, Path::new("pdftoppm")).unwrap();
        assert!(matches!(rasterizer.render_page(0, 72), Err(PdfError::InvalidPage(0))));
        assert!(matches!(rasterizer.render_page(2, 72), Err(PdfError::InvalidPage(2))));
    }
}
