//! Tesseract backend driven through its command line interface.

use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::Command;

use image::{DynamicImage, ImageFormat};
use tracing::{debug, trace};

use crate::error::OcrError;
use crate::geometry::Rect;
use crate::models::config::OcrConfig;

use super::{PageSegMode, TextFragment, TextRecognizer};

/// Word level in tesseract's TSV output.
const WORD_LEVEL: u32 = 5;

/// Runs `tesseract <png> stdout -l <lang> --oem <n> --psm <n> tsv`.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: PathBuf,
    language: String,
    engine_mode: u8,
}

impl TesseractRecognizer {
    pub fn new(binary: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
            engine_mode: 1,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(&config.tesseract_path, &config.language).with_engine_mode(config.engine_mode)
    }

    /// Set `--oem`.
    pub fn with_engine_mode(mut self, engine_mode: u8) -> Self {
        self.engine_mode = engine_mode;
        self
    }

    fn spawn_error(&self, e: std::io::Error) -> OcrError {
        if e.kind() == ErrorKind::NotFound {
            OcrError::Unavailable(format!("{} not found", self.binary.display()))
        } else {
            OcrError::Unavailable(format!("cannot start {}: {}", self.binary.display(), e))
        }
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::from_config(&OcrConfig::default())
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(
        &self,
        image: &DynamicImage,
        mode: PageSegMode,
    ) -> Result<Vec<TextFragment>, OcrError> {
        let mut input = tempfile::Builder::new()
            .prefix("sheetloc-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Preprocessing(format!("temp file: {}", e)))?;
        image
            .write_to(&mut input, ImageFormat::Png)
            .map_err(|e| OcrError::Preprocessing(format!("encode png: {}", e)))?;
        input
            .flush()
            .map_err(|e| OcrError::Preprocessing(format!("flush png: {}", e)))?;

        trace!(
            "Running {} on {} (psm {})",
            self.binary.display(),
            input.path().display(),
            mode.as_psm()
        );
        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--oem")
            .arg(self.engine_mode.to_string())
            .arg("--psm")
            .arg(mode.as_psm().to_string())
            .arg("tsv")
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let fragments = parse_tsv(&String::from_utf8_lossy(&output.stdout))?;
        debug!("tesseract returned {} words", fragments.len());
        Ok(fragments)
    }
}

/// Parse tesseract TSV output into word fragments.
///
/// Only word rows are kept; rows with blank text or a negative confidence
/// (structural rows) are skipped.
pub fn parse_tsv(tsv: &str) -> Result<Vec<TextFragment>, OcrError> {
    let mut fragments = Vec::new();

    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 || row.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        if cols[0].trim().parse::<u32>().ok() != Some(WORD_LEVEL) {
            continue;
        }

        let text = cols[11].trim();
        let confidence: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        if text.is_empty() || confidence < 0.0 {
            continue;
        }

        let number = |i: usize| -> Result<i64, OcrError> {
            cols[i].trim().parse::<i64>().map_err(|_| {
                OcrError::Parse(format!("line {}: bad column {}: {:?}", idx + 1, i, cols[i]))
            })
        };
        let (left, top, width, height) = (number(6)?, number(7)?, number(8)?, number(9)?);

        fragments.push(TextFragment::new(
            text,
            Rect::from_xywh(left as i32, top as i32, width.max(0) as u32, height.max(0) as u32),
            confidence,
        ));
    }

    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_tsv_words_only() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t600\t400\t-1\t\n\
             4\t1\t1\t1\t1\t0\t300\t310\t90\t40\t-1\t\n\
             5\t1\t1\t1\t1\t1\t300\t310\t20\t40\t96.5\tA\n\
             5\t1\t1\t1\t1\t2\t330\t311\t60\t39\t91.02\t1.01\n\
             5\t1\t2\t1\t1\t1\t12\t20\t5\t5\t95\t \n"
        );

        let fragments = parse_tsv(&tsv).unwrap();
        assert_eq!(
            fragments,
            vec![
                TextFragment::new("A", Rect::new(300, 310, 320, 350), 96.5),
                TextFragment::new("1.01", Rect::new(330, 311, 390, 350), 91.02),
            ]
        );
    }

    #[test]
    fn test_parse_tsv_rejects_bad_geometry() {
        let tsv = format!("{HEADER}\n5\t1\t1\t1\t1\t1\tx\t310\t20\t40\t96\tA\n");
        assert!(matches!(parse_tsv(&tsv), Err(OcrError::Parse(_))));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let recognizer = TesseractRecognizer::new("/nonexistent/tesseract-binary", "eng");
        let image = DynamicImage::new_luma8(8, 8);
        let err = recognizer
            .recognize(&image, PageSegMode::SingleLine)
            .unwrap_err();
        assert!(matches!(err, OcrError::Unavailable(_)));
    }
}
