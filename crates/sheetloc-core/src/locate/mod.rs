//! Page-number localization.
//!
//! One run per page image:
//!
//! ```text
//! segment panels -> select side panel -> OCR bottom strip -> select candidate -> Found | NotFound
//! ```
//!
//! plus the refine mode (OCR around a prior box) and the manual seam
//! (operator region fed back through the same candidate selection).

mod candidate;

pub use candidate::select_candidate;

use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{GeometryError, Result, SheetlocError};
use crate::geometry::{crop, Rect};
use crate::models::annotation::AnnotationSource;
use crate::models::config::SheetlocConfig;
use crate::ocr::{join_single_line, OcrPreprocessor, TextRecognizer};
use crate::patterns;
use crate::review::{ManualBox, ManualReviewer};
use crate::segmentation::{select_side_panel, PanelSegmenter};

/// A located page number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationResult {
    /// Recognized page-number text.
    pub text: String,

    /// Page-number box in page coordinates.
    pub bbox: Rect,

    /// Engine confidence of the selected fragment.
    pub confidence: f32,

    pub source: AnnotationSource,

    /// Side panel the box was found in, if segmentation was involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidepanel: Option<Rect>,

    /// Text follows the usual sheet-number convention.
    pub conventional: bool,
}

/// Why a page produced no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    /// Segmentation produced fewer than two panels.
    TooFewPanels { panels: usize },
    /// OCR found no digit-bearing candidate in the side panel.
    NoCandidate,
}

/// Outcome of [`Localizer::locate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Localization {
    Found(LocalizationResult),
    NotFound {
        reason: MissReason,
        /// Best-guess region for a manual reviewer.
        hint: Option<Rect>,
    },
}

impl Localization {
    pub fn is_found(&self) -> bool {
        matches!(self, Localization::Found(_))
    }

    pub fn result(&self) -> Option<&LocalizationResult> {
        match self {
            Localization::Found(result) => Some(result),
            Localization::NotFound { .. } => None,
        }
    }

    pub fn into_result(self) -> Option<LocalizationResult> {
        match self {
            Localization::Found(result) => Some(result),
            Localization::NotFound { .. } => None,
        }
    }

    /// Region to show a reviewer: the found box or the miss hint.
    pub fn hint(&self) -> Option<Rect> {
        match self {
            Localization::Found(result) => Some(result.bbox),
            Localization::NotFound { hint, .. } => *hint,
        }
    }
}

/// Outcome of [`Localizer::refine`].
#[derive(Debug, Clone, PartialEq)]
pub enum Refinement {
    Refined(LocalizationResult),
    /// Refinement failed; the prior box should not be trusted.
    NeedsManual { hint: Rect },
}

/// Outcome of [`Localizer::resolve_manually`].
#[derive(Debug, Clone, PartialEq)]
pub enum ManualOutcome {
    Located(LocalizationResult),
    Cancelled,
}

/// The localization pipeline bound to an OCR backend and a configuration.
///
/// Holds no per-page state; one instance may process any number of pages.
pub struct Localizer<R> {
    recognizer: R,
    config: SheetlocConfig,
    segmenter: PanelSegmenter,
    preprocessor: OcrPreprocessor,
}

impl<R: TextRecognizer> Localizer<R> {
    pub fn new(recognizer: R, config: SheetlocConfig) -> Self {
        let debug_dir = config.pipeline.debug_dir.clone();
        let segmenter = PanelSegmenter::new(config.segmentation.clone())
            .with_max_working_side(config.pipeline.max_working_side)
            .with_debug_dir(debug_dir.clone());
        let preprocessor =
            OcrPreprocessor::from_config(&config.ocr, config.segmentation.binarize_threshold)
                .with_debug_dir(debug_dir);

        Self {
            recognizer,
            config,
            segmenter,
            preprocessor,
        }
    }

    pub fn config(&self) -> &SheetlocConfig {
        &self.config
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    /// Find the page number on a full page image.
    pub fn locate(&self, image: &DynamicImage) -> Result<Localization> {
        self.check_budget(image)?;

        let panels = self.segmenter.segment(image);
        let Some(side) = select_side_panel(&panels) else {
            info!("No side panel ({} panels)", panels.len());
            return Ok(Localization::NotFound {
                reason: MissReason::TooFewPanels {
                    panels: panels.len(),
                },
                hint: None,
            });
        };

        let side_rect = side.rect;
        let strip = self.bottom_strip(&side_rect);
        debug!("Side panel {}, scanning strip {}", side_rect, strip);

        match self.scan_region(image, &strip, AnnotationSource::Heuristic)? {
            Some(mut result) => {
                result.sidepanel = Some(side_rect);
                info!("Found page number {:?} at {}", result.text, result.bbox);
                Ok(Localization::Found(result))
            }
            None => {
                info!("No page-number candidate in side panel {}", side_rect);
                Ok(Localization::NotFound {
                    reason: MissReason::NoCandidate,
                    hint: Some(side_rect),
                })
            }
        }
    }

    /// OCR and candidate selection on an arbitrary page region.
    ///
    /// The region is clamped to the image first.
    pub fn locate_in_region(
        &self,
        image: &DynamicImage,
        region: &Rect,
    ) -> Result<Option<LocalizationResult>> {
        self.check_budget(image)?;
        self.scan_region(image, region, AnnotationSource::Heuristic)
    }

    /// Re-examine a padded region around a prior, approximate box.
    pub fn refine(&self, image: &DynamicImage, prior: &Rect) -> Result<Refinement> {
        self.check_budget(image)?;
        let (width, height) = image.dimensions();
        let region = prior.pad(self.config.selection.refine_margin, width, height);

        match self.scan_region(image, &region, AnnotationSource::Heuristic)? {
            Some(result) => {
                info!("Refined {} -> {}", prior, result.bbox);
                Ok(Refinement::Refined(result))
            }
            None => {
                warn!("Refinement around {} failed, manual correction needed", prior);
                Ok(Refinement::NeedsManual { hint: region })
            }
        }
    }

    /// Read the page number from an operator-drawn region.
    ///
    /// Candidate selection runs on the region first; if nothing survives,
    /// the whole region is read as one line and returned with the operator box.
    pub fn apply_manual_region(
        &self,
        image: &DynamicImage,
        rect: &Rect,
    ) -> Result<LocalizationResult> {
        self.check_budget(image)?;
        let (width, height) = image.dimensions();
        let region = rect.clamp(width, height);
        if region.is_empty() {
            return Err(GeometryError::Empty(*rect).into());
        }

        if let Some(result) = self.scan_region(image, &region, AnnotationSource::Manual)? {
            return Ok(result);
        }

        let crop_img = crop(image, &region)?;
        let fragments =
            self.preprocessor
                .recognize_region(&self.recognizer, &crop_img, self.config.ocr.line_mode)?;
        let text = join_single_line(&fragments);
        let confidence = if fragments.is_empty() {
            0.0
        } else {
            fragments.iter().map(|f| f.confidence).sum::<f32>() / fragments.len() as f32
        };
        debug!("Manual region {} read as {:?}", region, text);

        Ok(LocalizationResult {
            conventional: patterns::is_sheet_number(&text),
            text,
            bbox: region,
            confidence,
            source: AnnotationSource::Manual,
            sidepanel: None,
        })
    }

    /// Ask a reviewer for the page-number region and read it.
    pub fn resolve_manually<M: ManualReviewer + ?Sized>(
        &self,
        image: &DynamicImage,
        hint: Option<Rect>,
        reviewer: &mut M,
    ) -> Result<ManualOutcome> {
        match reviewer.request_bounding_box(image, hint)? {
            ManualBox::Drawn(rect) => Ok(ManualOutcome::Located(self.apply_manual_region(image, &rect)?)),
            ManualBox::Cancelled => {
                info!("Manual annotation cancelled");
                Ok(ManualOutcome::Cancelled)
            }
        }
    }

    fn check_budget(&self, image: &DynamicImage) -> Result<()> {
        let Some(limit) = self.config.pipeline.max_image_pixels else {
            return Ok(());
        };
        let pixels = image.width() as u64 * image.height() as u64;
        if pixels > limit {
            return Err(SheetlocError::ImageTooLarge { pixels, limit });
        }
        Ok(())
    }

    /// Bottom part of the side panel where title-block labels sit.
    fn bottom_strip(&self, side: &Rect) -> Rect {
        let keep = self.config.selection.bottom_fraction.clamp(0.0, 1.0);
        let offset = (side.height() as f32 * (1.0 - keep)) as i32;
        Rect::new(side.x1, side.y1 + offset, side.x2, side.y2)
    }

    fn scan_region(
        &self,
        image: &DynamicImage,
        region: &Rect,
        source: AnnotationSource,
    ) -> Result<Option<LocalizationResult>> {
        let (width, height) = image.dimensions();
        let region = region.clamp(width, height);
        if region.is_empty() {
            return Ok(None);
        }

        let crop_img = crop(image, &region)?;
        let fragments = self.preprocessor.recognize_region(
            &self.recognizer,
            &crop_img,
            self.config.ocr.sidepanel_mode,
        )?;

        let Some(candidate) = select_candidate(&fragments, region.height(), &self.config.selection)
        else {
            return Ok(None);
        };

        let local = candidate.bbox.clamp(region.width(), region.height());
        let bbox = local.translate(region.x1, region.y1);
        let mut text = candidate.text.trim().to_string();

        if self.config.selection.rescan_single_line {
            if let Some(line) = self.rescan(image, &bbox)? {
                text = line;
            }
        }

        Ok(Some(LocalizationResult {
            conventional: patterns::is_sheet_number(&text),
            text,
            bbox,
            confidence: candidate.confidence,
            source,
            sidepanel: None,
        }))
    }

    /// Read exactly the candidate box as a single line.
    ///
    /// Returns `None` when the line read has no digit, keeping the sparse text.
    fn rescan(&self, image: &DynamicImage, bbox: &Rect) -> Result<Option<String>> {
        if bbox.is_empty() {
            return Ok(None);
        }
        let crop_img = crop(image, bbox)?;
        let fragments =
            self.preprocessor
                .recognize_region(&self.recognizer, &crop_img, self.config.ocr.line_mode)?;

        let line = join_single_line(&fragments);
        if line.is_empty() || !line.chars().any(|c| c.is_ascii_digit()) {
            debug!("Rescan of {} gave {:?}, keeping sparse text", bbox, line);
            return Ok(None);
        }
        Ok(Some(line))
    }
}
