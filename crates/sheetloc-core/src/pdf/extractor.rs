//! Embedded-image rasterizer using lopdf.
//!
//! Scanned bid sets store each sheet as one full-page raster, so the largest
//! image XObject on a page is the page itself. No rendering is involved and
//! the requested DPI is ignored.

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace};

use super::{load_document, PageRasterizer, Result};
use crate::error::PdfError;

/// Extracts the largest embedded image of each page.
pub struct PdfExtractor {
    document: Document,
}

impl PdfExtractor {
    /// Parse a PDF from memory.
    pub fn load(data: &[u8]) -> Result<Self> {
        let document = load_document(data)?;
        debug!("Loaded PDF with {} pages", document.get_pages().len());
        Ok(Self { document })
    }

    /// All decodable images drawn on a page, in XObject order.
    pub fn page_images(&self, page: u32) -> Result<Vec<DynamicImage>> {
        let doc = &self.document;
        let pages = doc.get_pages();
        let page_id = pages.get(&page).ok_or(PdfError::InvalidPage(page))?;

        let mut images = Vec::new();
        let Some(resources) = page_resources(doc, *page_id) else {
            return Ok(images);
        };
        let Ok(xobjects) = resources.get(b"XObject") else {
            return Ok(images);
        };
        if let Ok((_, Object::Dictionary(xobj_dict))) = doc.dereference(xobjects) {
            for (_name, obj_ref) in xobj_dict.iter() {
                if let Ok((_, obj)) = doc.dereference(obj_ref) {
                    if let Some(img) = decode_image_object(doc, obj) {
                        images.push(img);
                    }
                }
            }
        }

        trace!("Decoded {} images on page {}", images.len(), page);
        Ok(images)
    }
}

impl PageRasterizer for PdfExtractor {
    fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    fn render_page(&self, page: u32, _dpi: u32) -> Result<DynamicImage> {
        self.page_images(page)?
            .into_iter()
            .max_by_key(|img| img.width() as u64 * img.height() as u64)
            .ok_or_else(|| PdfError::Render(format!("page {} has no decodable image", page)))
    }
}

/// Resources of a page, following `Parent` links for inherited entries.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<Dictionary> {
    let mut node_id = page_id;
    // Guard against cyclic page trees.
    for _ in 0..32 {
        let Object::Dictionary(dict) = doc.get_object(node_id).ok()? else {
            return None;
        };
        if let Ok(resources) = dict.get(b"Resources") {
            if let Ok((_, Object::Dictionary(res_dict))) = doc.dereference(resources) {
                return Some(res_dict.clone());
            }
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => node_id = *parent_id,
            _ => return None,
        }
    }
    None
}

fn decode_image_object(doc: &Document, obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;
    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
    let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;
    trace!("Found image object: {}x{}", width, height);

    let filter = dict.get(b"Filter").ok().and_then(|filter| match filter {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(arr) => arr.last().and_then(|o| o.as_name().ok()),
        _ => None,
    });
    match filter {
        Some(b"DCTDecode") => {
            return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg).ok();
        }
        Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
            trace!("Skipping image with unsupported filter");
            return None;
        }
        _ => {}
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");
    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);

    raw_to_image(&data, width, height, color_space, bits)
}

fn raw_to_image(data: &[u8], width: u32, height: u32, color_space: &[u8], bits: i64) -> Option<DynamicImage> {
    let pixels = width as usize * height as usize;
    match (color_space, bits) {
        (b"DeviceGray" | b"G", 8) if data.len() >= pixels => {
            GrayImage::from_raw(width, height, data[..pixels].to_vec()).map(DynamicImage::ImageLuma8)
        }
        (b"DeviceGray" | b"G", 1) => {
            // 1-bit rows are padded to whole bytes; 1 = white.
            let stride = (width as usize).div_ceil(8);
            if data.len() < stride * height as usize {
                return None;
            }
            Some(DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
                let byte = data[y as usize * stride + x as usize / 8];
                let bit = (byte >> (7 - (x % 8))) & 1;
                image::Luma([if bit == 1 { 255 } else { 0 }])
            })))
        }
        (b"DeviceRGB" | b"RGB", 8) if data.len() >= pixels * 3 => {
            RgbImage::from_raw(width, height, data[..pixels * 3].to_vec()).map(DynamicImage::ImageRgb8)
        }
        _ => {
            trace!(
                "Unsupported raw image: {} bits, colorspace {:?}, {} bytes",
                bits,
                String::from_utf8_lossy(color_space),
                data.len()
            );
            None
        }
    }
}
