//! Annotation records exchanged with the persistence collaborator.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::geometry::Rect;

/// Where an annotation's bounding box came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationSource {
    /// Found by the panel/OCR heuristics.
    Heuristic,
    /// Drawn or confirmed by an operator.
    Manual,
}

/// A stored page-number annotation for one unique page image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Content hash of the page image.
    pub image_key: String,

    /// Recognized page-number text.
    pub page_number: String,

    /// Page-number location in page coordinates.
    pub bbox: Rect,

    /// Heuristic or manual.
    pub source: AnnotationSource,

    /// Operator verdict (None = not reviewed yet).
    pub valid: Option<bool>,

    /// Whether a refine pass produced this box.
    #[serde(default)]
    pub refined: bool,

    /// Where the page image can be reopened for review.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Annotation {
    /// Annotations an operator confirmed are never overwritten or removed by heuristics.
    pub fn is_protected(&self) -> bool {
        self.valid == Some(true)
    }
}

/// Values a caller hands to the store; the store decides create or update.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnnotation {
    pub image_key: String,
    pub page_number: String,
    pub bbox: Rect,
    pub source: AnnotationSource,
    pub valid: Option<bool>,
    pub refined: bool,
    pub image_path: Option<PathBuf>,
}

impl NewAnnotation {
    /// Create an unreviewed annotation.
    pub fn new(
        image_key: impl Into<String>,
        page_number: impl Into<String>,
        bbox: Rect,
        source: AnnotationSource,
    ) -> Self {
        Self {
            image_key: image_key.into(),
            page_number: page_number.into(),
            bbox,
            source,
            valid: None,
            refined: false,
            image_path: None,
        }
    }

    /// Set the operator verdict.
    pub fn with_validity(mut self, valid: Option<bool>) -> Self {
        self.valid = valid;
        self
    }

    /// Mark the box as produced by a refine pass.
    pub fn with_refined(mut self, refined: bool) -> Self {
        self.refined = refined;
        self
    }

    /// Record where the page image lives.
    pub fn with_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    /// Turn into a stored record, keeping the creation time of `previous` if any.
    pub fn into_annotation(self, previous: Option<&Annotation>) -> Annotation {
        let now = Utc::now();
        let (created_at, updated_at) = match previous {
            Some(prev) => (prev.created_at, Some(now)),
            None => (now, None),
        };
        let image_path = self
            .image_path
            .or_else(|| previous.and_then(|p| p.image_path.clone()));

        Annotation {
            image_key: self.image_key,
            page_number: self.page_number,
            bbox: self.bbox,
            source: self.source,
            valid: self.valid,
            refined: self.refined,
            image_path,
            created_at,
            updated_at,
        }
    }
}

/// Content key of a decoded page: SHA-256 over its dimensions, color type and pixels.
///
/// Identical sheets that appear in several bid sets share one key.
pub fn image_key(image: &DynamicImage) -> String {
    let (width, height) = image.dimensions();
    let mut hasher = Sha256::new();
    hasher.update(width.to_le_bytes());
    hasher.update(height.to_le_bytes());
    hasher.update(format!("{:?}", image.color()).as_bytes());
    hasher.update(image.as_bytes());
    hex::encode(hasher.finalize())
}
