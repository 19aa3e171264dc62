//! Human-in-the-loop collaborator.
//!
//! The pipeline never blocks on an operator itself. Callers that want manual
//! input pass an implementation of [`ManualReviewer`] to
//! [`Localizer::resolve_manually`](crate::locate::Localizer::resolve_manually).

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::ReviewError;
use crate::geometry::Rect;

/// Operator answer to a bounding-box request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManualBox {
    /// Region drawn by the operator, in page coordinates.
    Drawn(Rect),
    Cancelled,
}

/// Operator answer to a validity question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Valid,
    Invalid,
    Skip,
}

impl ReviewVerdict {
    /// Stored validity for the verdict; `Skip` leaves it unset.
    pub fn validity(self) -> Option<bool> {
        match self {
            ReviewVerdict::Valid => Some(true),
            ReviewVerdict::Invalid => Some(false),
            ReviewVerdict::Skip => None,
        }
    }
}

/// Something that can ask a person about a page.
pub trait ManualReviewer {
    /// Ask for the page-number region, optionally pointing at a hint region.
    fn request_bounding_box(
        &mut self,
        image: &DynamicImage,
        hint: Option<Rect>,
    ) -> Result<ManualBox, ReviewError>;

    /// Ask whether `bbox` really holds the page number `text`.
    fn request_validity_judgment(
        &mut self,
        image: &DynamicImage,
        bbox: &Rect,
        text: &str,
    ) -> Result<ReviewVerdict, ReviewError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_validity() {
        assert_eq!(ReviewVerdict::Valid.validity(), Some(true));
        assert_eq!(ReviewVerdict::Invalid.validity(), Some(false));
        assert_eq!(ReviewVerdict::Skip.validity(), None);
    }
}
