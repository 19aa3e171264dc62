//! CLI commands and the helpers they share.

pub mod annotate;
pub mod batch;
pub mod config;
pub mod locate;
pub mod refine;
pub mod review;

use std::fs;
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use serde::Serialize;
use tracing::debug;

use sheetloc_core::locate::{Localization, LocalizationResult, MissReason};
use sheetloc_core::models::config::{OcrBackend, SheetlocConfig};
use sheetloc_core::ocr::{OnnxRecognizer, TesseractRecognizer, TextRecognizer};
use sheetloc_core::pdf::{open_rasterizer, page_range, PageRasterizer};
use sheetloc_core::Rect;

/// Extensions accepted as page images.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "webp"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sheetloc")
        .join("config.json")
}

/// Load the explicit config, else the default file if it exists, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<SheetlocConfig> {
    if let Some(path) = config_path {
        return Ok(SheetlocConfig::from_file(Path::new(path))?);
    }
    let default_path = default_config_path();
    if default_path.exists() {
        debug!("Using config {}", default_path.display());
        return Ok(SheetlocConfig::from_file(&default_path)?);
    }
    Ok(SheetlocConfig::default())
}

/// Build the OCR backend selected in the configuration.
pub fn build_recognizer(config: &SheetlocConfig) -> anyhow::Result<Box<dyn TextRecognizer>> {
    match config.ocr.backend {
        OcrBackend::Tesseract => Ok(Box::new(TesseractRecognizer::from_config(&config.ocr))),
        OcrBackend::Onnx => {
            let recognizer = OnnxRecognizer::from_dir(&config.ocr.model_dir)
                .map_err(|e| anyhow::anyhow!("Failed to load OCR models: {}", e))?;
            Ok(Box::new(recognizer))
        }
    }
}

pub fn is_supported_input(path: &Path) -> bool {
    let ext = extension_of(path);
    ext == "pdf" || IMAGE_EXTENSIONS.contains(&ext.as_str())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Pages of one input file: a single image, or the pages of a PDF.
pub enum PageSource {
    Image(PathBuf),
    Pdf {
        rasterizer: Box<dyn PageRasterizer>,
        pages: RangeInclusive<u32>,
        dpi: u32,
    },
}

impl PageSource {
    pub fn open(path: &Path, config: &SheetlocConfig) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!("Input file not found: {}", path.display());
        }
        let ext = extension_of(path);
        if ext == "pdf" {
            let rasterizer = open_rasterizer(path, &config.pdf)?;
            let pages = page_range(rasterizer.as_ref(), config.pdf.max_pages);
            debug!("{}: pages {:?}", path.display(), pages);
            Ok(PageSource::Pdf {
                rasterizer,
                pages,
                dpi: config.pdf.render_dpi,
            })
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Ok(PageSource::Image(path.to_path_buf()))
        } else {
            anyhow::bail!("Unsupported file format: {}", ext)
        }
    }

    /// Page numbers to visit; `None` stands for a plain image.
    pub fn pages(&self) -> Vec<Option<u32>> {
        match self {
            PageSource::Image(_) => vec![None],
            PageSource::Pdf { pages, .. } => pages.clone().map(Some).collect(),
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, PageSource::Pdf { .. })
    }

    pub fn load(&self, page: Option<u32>) -> anyhow::Result<DynamicImage> {
        match (self, page) {
            (PageSource::Image(path), _) => Ok(image::open(path)?),
            (PageSource::Pdf { rasterizer, dpi, .. }, Some(page)) => {
                Ok(rasterizer.render_page(page, *dpi)?)
            }
            (PageSource::Pdf { .. }, None) => anyhow::bail!("PDF input needs a page number"),
        }
    }
}

/// Write a rasterized page to `<working_directory>/pages/<key>.png` unless it is cached.
pub fn cache_page(config: &SheetlocConfig, key: &str, image: &DynamicImage) -> anyhow::Result<PathBuf> {
    let dir = config.pipeline.working_directory.join("pages");
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.png", key));
    if !path.exists() {
        image.save(&path)?;
        debug!("Cached page {}", path.display());
    }
    Ok(path)
}

/// Per-page output row shared by locate and batch.
#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub image_key: String,
    pub found: bool,
    pub page_number: Option<String>,
    pub bbox: Option<Rect>,
    pub confidence: Option<f32>,
    pub conventional: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidepanel: Option<Rect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PageReport {
    pub fn new(file: &Path, page: Option<u32>, image_key: &str, outcome: &Localization) -> Self {
        let mut report = Self {
            file: file.display().to_string(),
            page,
            image_key: image_key.to_string(),
            found: false,
            page_number: None,
            bbox: None,
            confidence: None,
            conventional: None,
            sidepanel: None,
            reason: None,
        };
        match outcome {
            Localization::Found(result) => report.fill(result),
            Localization::NotFound { reason, hint } => {
                report.reason = Some(miss_label(reason));
                report.sidepanel = *hint;
            }
        }
        report
    }

    fn fill(&mut self, result: &LocalizationResult) {
        self.found = true;
        self.page_number = Some(result.text.clone());
        self.bbox = Some(result.bbox);
        self.confidence = Some(result.confidence);
        self.conventional = Some(result.conventional);
        self.sidepanel = result.sidepanel;
    }

    pub fn label(&self) -> String {
        match self.page {
            Some(page) => format!("{}#{}", self.file, page),
            None => self.file.clone(),
        }
    }
}

pub fn miss_label(reason: &MissReason) -> String {
    match reason {
        MissReason::TooFewPanels { panels } => format!("too few panels ({})", panels),
        MissReason::NoCandidate => "no candidate".to_string(),
    }
}

pub fn format_reports(reports: &[PageReport], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(reports)?),
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(vec![]);
            write_csv_reports(&mut wtr, reports)?;
            Ok(String::from_utf8(wtr.into_inner()?)?)
        }
        OutputFormat::Text => Ok(reports.iter().map(format_report_text).collect::<Vec<_>>().join("\n")),
    }
}

pub fn write_csv_reports<W: Write>(wtr: &mut csv::Writer<W>, reports: &[PageReport]) -> anyhow::Result<()> {
    wtr.write_record([
        "file",
        "page",
        "image_key",
        "found",
        "page_number",
        "x1",
        "y1",
        "x2",
        "y2",
        "confidence",
        "conventional",
        "reason",
    ])?;

    for report in reports {
        let coords = report
            .bbox
            .map(|b| [b.x1, b.y1, b.x2, b.y2].map(|v| v.to_string()))
            .unwrap_or_default();
        wtr.write_record([
            report.file.as_str(),
            &report.page.map(|p| p.to_string()).unwrap_or_default(),
            &report.image_key,
            &report.found.to_string(),
            report.page_number.as_deref().unwrap_or(""),
            &coords[0],
            &coords[1],
            &coords[2],
            &coords[3],
            &report.confidence.map(|c| format!("{:.1}", c)).unwrap_or_default(),
            &report.conventional.map(|c| c.to_string()).unwrap_or_default(),
            report.reason.as_deref().unwrap_or(""),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn format_report_text(report: &PageReport) -> String {
    match (&report.page_number, report.bbox) {
        (Some(text), Some(bbox)) => format!(
            "{}: {} at {} (confidence {:.1}{})",
            report.label(),
            text,
            bbox,
            report.confidence.unwrap_or_default(),
            if report.conventional == Some(false) { ", unconventional" } else { "" }
        ),
        _ => format!(
            "{}: not found ({})",
            report.label(),
            report.reason.as_deref().unwrap_or("unknown")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetloc_core::models::annotation::AnnotationSource;

    fn found() -> Localization {
        Localization::Found(LocalizationResult {
            text: "A-101".to_string(),
            bbox: Rect::new(700, 600, 760, 630),
            confidence: 91.3,
            source: AnnotationSource::Heuristic,
            sidepanel: Some(Rect::new(690, 50, 980, 650)),
            conventional: true,
        })
    }

    #[test]
    fn test_text_report() {
        let report = PageReport::new(Path::new("set.pdf"), Some(3), "abc", &found());
        assert_eq!(
            format_reports(&[report], OutputFormat::Text).unwrap(),
            "set.pdf#3: A-101 at 700,600,760,630 (confidence 91.3)"
        );

        let miss = Localization::NotFound {
            reason: MissReason::TooFewPanels { panels: 1 },
            hint: None,
        };
        let report = PageReport::new(Path::new("a.png"), None, "abc", &miss);
        assert_eq!(
            format_reports(&[report], OutputFormat::Text).unwrap(),
            "a.png: not found (too few panels (1))"
        );
    }

    #[test]
    fn test_csv_report() {
        let report = PageReport::new(Path::new("a.png"), None, "abc", &found());
        let csv = format_reports(&[report], OutputFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("file,page,image_key,found"));
        assert_eq!(lines.next().unwrap(), "a.png,,abc,true,A-101,700,600,760,630,91.3,true,");
    }

    #[test]
    fn test_supported_inputs() {
        assert!(is_supported_input(Path::new("set.PDF")));
        assert!(is_supported_input(Path::new("sheet.tif")));
        assert!(!is_supported_input(Path::new("notes.txt")));
    }
}
