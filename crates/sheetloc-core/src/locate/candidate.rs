//! Page-number candidate selection over OCR fragments of a side-panel strip.

use tracing::{debug, trace};

use crate::models::config::SelectionConfig;
use crate::ocr::TextFragment;

/// Pick the fragment most likely to be the page number.
///
/// `region_height` is the height of the region the fragments were read from;
/// fragment boxes are relative to that region. Returns `None` when nothing
/// survives filtering.
pub fn select_candidate<'a>(
    fragments: &'a [TextFragment],
    region_height: u32,
    config: &SelectionConfig,
) -> Option<&'a TextFragment> {
    let measurable: Vec<&TextFragment> = fragments
        .iter()
        .filter(|f| f.is_measurable() && f.height() > 0)
        .collect();
    if measurable.is_empty() {
        trace!("No measurable fragments");
        return None;
    }

    let kept = reject_tall_outliers(&measurable, config.outlier_sigma);
    let tallest = kept.iter().map(|f| f.height()).max()?;
    let cutoff = (tallest as f32 * config.height_cutoff_ratio) as u32;

    let candidates: Vec<&TextFragment> = kept
        .into_iter()
        .filter(|f| f.height() > cutoff && f.has_digit())
        .collect();
    debug!(
        "{} fragments, {} candidates above height cutoff {}",
        measurable.len(),
        candidates.len(),
        cutoff
    );

    match candidates.as_slice() {
        [] => None,
        [only] => Some(*only),
        _ => {
            let lower_bound = region_height as f32 * config.lower_half_ratio;
            let lower = candidates
                .iter()
                .copied()
                .filter(|f| f.bbox.y1 as f32 >= lower_bound);
            tallest_first(lower).or_else(|| tallest_first(candidates.iter().copied()))
        }
    }
}

/// Drop fragments at least `sigma` population standard deviations above the mean height.
///
/// Uniform heights have no outliers.
fn reject_tall_outliers<'a>(fragments: &[&'a TextFragment], sigma: f64) -> Vec<&'a TextFragment> {
    let heights: Vec<f64> = fragments.iter().map(|f| f.height() as f64).collect();
    let n = heights.len() as f64;
    let mean = heights.iter().sum::<f64>() / n;
    let std_dev = (heights.iter().map(|h| (h - mean).powi(2)).sum::<f64>() / n).sqrt();

    if std_dev == 0.0 {
        return fragments.to_vec();
    }

    let limit = mean + sigma * std_dev;
    fragments
        .iter()
        .copied()
        .filter(|f| (f.height() as f64) < limit)
        .collect()
}

/// Tallest fragment; the earliest one wins ties.
fn tallest_first<'a>(fragments: impl Iterator<Item = &'a TextFragment>) -> Option<&'a TextFragment> {
    fragments.fold(None, |best: Option<&TextFragment>, f| match best {
        Some(b) if b.height() >= f.height() => Some(b),
        _ => Some(f),
    })
}
