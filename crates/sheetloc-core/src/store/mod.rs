//! Annotation persistence collaborator.
//!
//! The localizer returns plain values; a store decides whether a save is a
//! create or an update. Stores take `&self` so one instance can be shared by
//! parallel workers.

mod json;

pub use json::JsonAnnotationStore;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use image::DynamicImage;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::locate::{Localization, Localizer, Refinement};
use crate::models::annotation::{Annotation, NewAnnotation};
use crate::ocr::TextRecognizer;

/// Save and retrieve annotations keyed by image identity.
pub trait AnnotationStore: Send + Sync {
    /// The annotation for `image_key`, if any.
    fn find_existing(&self, image_key: &str) -> Result<Option<Annotation>, StoreError>;

    /// Create or update the annotation for `annotation.image_key`.
    fn save(&self, annotation: NewAnnotation) -> Result<Annotation, StoreError>;

    /// Delete the annotation for `image_key`. Returns whether one existed.
    fn remove(&self, image_key: &str) -> Result<bool, StoreError>;

    /// Like [`save`](Self::save), but leaves a protected annotation in place
    /// and returns `None`. The check and the write happen atomically.
    fn save_unless_protected(&self, annotation: NewAnnotation) -> Result<Option<Annotation>, StoreError>;

    /// Like [`remove`](Self::remove), but never deletes a protected
    /// annotation. The check and the delete happen atomically.
    fn remove_unless_protected(&self, image_key: &str) -> Result<bool, StoreError>;

    /// All annotations, ordered by key.
    fn list(&self) -> Result<Vec<Annotation>, StoreError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryAnnotationStore {
    records: RwLock<BTreeMap<String, Annotation>>,
}

impl MemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnnotationStore for MemoryAnnotationStore {
    fn find_existing(&self, image_key: &str) -> Result<Option<Annotation>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(image_key).cloned())
    }

    fn save(&self, annotation: NewAnnotation) -> Result<Annotation, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let previous = records.get(&annotation.image_key).cloned();
        let stored = annotation.into_annotation(previous.as_ref());
        records.insert(stored.image_key.clone(), stored.clone());
        Ok(stored)
    }

    fn remove(&self, image_key: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        Ok(records.remove(image_key).is_some())
    }

    fn save_unless_protected(&self, annotation: NewAnnotation) -> Result<Option<Annotation>, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let previous = records.get(&annotation.image_key).cloned();
        if previous.as_ref().is_some_and(Annotation::is_protected) {
            return Ok(None);
        }
        let stored = annotation.into_annotation(previous.as_ref());
        records.insert(stored.image_key.clone(), stored.clone());
        Ok(Some(stored))
    }

    fn remove_unless_protected(&self, image_key: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        match records.get(image_key) {
            Some(existing) if !existing.is_protected() => Ok(records.remove(image_key).is_some()),
            _ => Ok(false),
        }
    }

    fn list(&self) -> Result<Vec<Annotation>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.values().cloned().collect())
    }
}

/// What [`record_localization`] did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreAction {
    /// A new or updated annotation was written.
    Saved(Annotation),
    /// A stale, unconfirmed annotation was deleted after a miss.
    Removed,
    /// The store was left as it was.
    Unchanged,
}

/// Whether a page needs localization: no annotation yet, or `force`.
pub fn needs_annotation(
    store: &dyn AnnotationStore,
    image_key: &str,
    force: bool,
) -> Result<bool, StoreError> {
    Ok(force || store.find_existing(image_key)?.is_none())
}

/// Apply a localization outcome to the store.
///
/// Annotations an operator marked valid are never replaced or removed.
/// Otherwise a hit is saved and a miss deletes the existing annotation.
pub fn record_localization(
    store: &dyn AnnotationStore,
    image_key: &str,
    outcome: &Localization,
    image_path: Option<&Path>,
) -> Result<StoreAction, StoreError> {
    match outcome {
        Localization::Found(result) => {
            let mut record = NewAnnotation::new(image_key, &result.text, result.bbox, result.source);
            if let Some(path) = image_path {
                record = record.with_image_path(path);
            }
            match store.save_unless_protected(record)? {
                Some(saved) => Ok(StoreAction::Saved(saved)),
                None => {
                    debug!("Annotation {} is protected, leaving it", image_key);
                    Ok(StoreAction::Unchanged)
                }
            }
        }
        Localization::NotFound { .. } => {
            if store.remove_unless_protected(image_key)? {
                debug!("Removed stale annotation {}", image_key);
                Ok(StoreAction::Removed)
            } else {
                Ok(StoreAction::Unchanged)
            }
        }
    }
}

/// Unreviewed annotations that were never refined and still have a page image.
pub fn pending_refinement(store: &dyn AnnotationStore) -> Result<Vec<Annotation>, StoreError> {
    Ok(store
        .list()?
        .into_iter()
        .filter(|a| a.valid.is_none() && !a.refined && a.image_path.is_some())
        .collect())
}

/// Run refine mode around a stored box and write the outcome back.
///
/// A refined box replaces the stored one and is flagged `refined`. When
/// nothing is found near the prior the annotation is dropped so the page
/// goes back to the annotate queue.
pub fn refine_stored<R: TextRecognizer>(
    localizer: &Localizer<R>,
    store: &dyn AnnotationStore,
    annotation: &Annotation,
    image: &DynamicImage,
) -> crate::Result<StoreAction> {
    let key = &annotation.image_key;
    match localizer.refine(image, &annotation.bbox)? {
        Refinement::Refined(result) => {
            let mut record = NewAnnotation::new(key, &result.text, result.bbox, annotation.source)
                .with_refined(true);
            if let Some(path) = &annotation.image_path {
                record = record.with_image_path(path);
            }
            match store.save_unless_protected(record)? {
                Some(saved) => {
                    info!("Refined annotation {}: {} -> {}", key, annotation.bbox, saved.bbox);
                    Ok(StoreAction::Saved(saved))
                }
                None => Ok(StoreAction::Unchanged),
            }
        }
        Refinement::NeedsManual { .. } => {
            if store.remove_unless_protected(key)? {
                info!("Dropped annotation {}, nothing found near {}", key, annotation.bbox);
                Ok(StoreAction::Removed)
            } else {
                Ok(StoreAction::Unchanged)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::locate::tests::{sheet, ScriptedRecognizer};
    use crate::locate::{LocalizationResult, MissReason};
    use crate::models::annotation::AnnotationSource;
    use crate::models::config::SheetlocConfig;
    use crate::ocr::{PageSegMode, TextFragment};
    use pretty_assertions::assert_eq;

    fn found(text: &str) -> Localization {
        Localization::Found(LocalizationResult {
            text: text.to_string(),
            bbox: Rect::new(700, 600, 760, 630),
            confidence: 90.0,
            source: AnnotationSource::Heuristic,
            sidepanel: Some(Rect::new(690, 50, 980, 650)),
            conventional: true,
        })
    }

    fn miss() -> Localization {
        Localization::NotFound {
            reason: MissReason::NoCandidate,
            hint: None,
        }
    }

    #[test]
    fn test_memory_store_create_then_update() {
        let store = MemoryAnnotationStore::new();
        let first = store
            .save(NewAnnotation::new("k1", "A-1", Rect::new(0, 0, 5, 5), AnnotationSource::Heuristic))
            .unwrap();
        let second = store
            .save(NewAnnotation::new("k1", "A-2", Rect::new(0, 0, 6, 6), AnnotationSource::Manual))
            .unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.find_existing("k1").unwrap().unwrap().page_number, "A-2");
        assert!(store.remove("k1").unwrap());
        assert!(!store.remove("k1").unwrap());
    }

    #[test]
    fn test_existing_annotation_skipped_unless_forced() {
        let store = MemoryAnnotationStore::new();
        assert!(needs_annotation(&store, "k", false).unwrap());

        record_localization(&store, "k", &found("A-101"), None).unwrap();
        assert!(!needs_annotation(&store, "k", false).unwrap());
        assert!(needs_annotation(&store, "k", true).unwrap());
    }

    #[test]
    fn test_miss_removes_unconfirmed_annotation() {
        let store = MemoryAnnotationStore::new();
        record_localization(&store, "k", &found("A-101"), Some(Path::new("/pages/k.png"))).unwrap();
        assert_eq!(
            store.find_existing("k").unwrap().unwrap().image_path.as_deref(),
            Some(Path::new("/pages/k.png"))
        );

        assert_eq!(record_localization(&store, "k", &miss(), None).unwrap(), StoreAction::Removed);
        assert!(store.find_existing("k").unwrap().is_none());
        assert_eq!(record_localization(&store, "k", &miss(), None).unwrap(), StoreAction::Unchanged);
    }

    #[test]
    fn test_valid_annotation_is_protected() {
        let store = MemoryAnnotationStore::new();
        store
            .save(
                NewAnnotation::new("k", "A-9", Rect::new(0, 0, 5, 5), AnnotationSource::Manual)
                    .with_validity(Some(true)),
            )
            .unwrap();

        assert_eq!(record_localization(&store, "k", &miss(), None).unwrap(), StoreAction::Unchanged);
        assert_eq!(record_localization(&store, "k", &found("B-1"), None).unwrap(), StoreAction::Unchanged);
        assert_eq!(store.find_existing("k").unwrap().unwrap().page_number, "A-9");
    }

    #[test]
    fn test_concurrent_recording_keeps_one_record() {
        let store = std::sync::Arc::new(MemoryAnnotationStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for round in 0..50 {
                        let outcome = if (i + round) % 3 == 0 { miss() } else { found("A-101") };
                        record_localization(store.as_ref(), "k", &outcome, None).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(store.list().unwrap().len() <= 1);
    }

    fn stored_guess(store: &MemoryAnnotationStore) -> Annotation {
        store
            .save(
                NewAnnotation::new("k", "A-2", Rect::new(800, 600, 860, 640), AnnotationSource::Heuristic)
                    .with_image_path("/pages/k.png"),
            )
            .unwrap()
    }

    #[test]
    fn test_refine_stored_marks_annotation_refined() {
        let store = MemoryAnnotationStore::new();
        let annotation = stored_guess(&store);
        assert_eq!(pending_refinement(&store).unwrap().len(), 1);

        let recognizer = ScriptedRecognizer::new(|_, _, mode| match mode {
            PageSegMode::SingleLine => Vec::new(),
            _ => vec![TextFragment::new("A-2.04", Rect::from_xywh(22, 21, 40, 18), 80.0)],
        });
        let localizer = Localizer::new(&recognizer, SheetlocConfig::default());

        let action = refine_stored(&localizer, &store, &annotation, &sheet()).unwrap();
        assert!(matches!(action, StoreAction::Saved(_)));

        let stored = store.find_existing("k").unwrap().unwrap();
        assert!(stored.refined);
        assert_eq!(stored.page_number, "A-2.04");
        assert_eq!(stored.bbox, Rect::new(802, 601, 842, 619));
        assert_eq!(stored.image_path.as_deref(), Some(Path::new("/pages/k.png")));
        assert!(pending_refinement(&store).unwrap().is_empty());
    }

    #[test]
    fn test_refine_stored_drops_box_with_nothing_nearby() {
        let store = MemoryAnnotationStore::new();
        let annotation = stored_guess(&store);
        let recognizer = ScriptedRecognizer::new(|_, _, _| Vec::new());
        let localizer = Localizer::new(&recognizer, SheetlocConfig::default());

        assert_eq!(
            refine_stored(&localizer, &store, &annotation, &sheet()).unwrap(),
            StoreAction::Removed
        );
        assert!(store.find_existing("k").unwrap().is_none());
    }

    #[test]
    fn test_pending_refinement_skips_reviewed_and_imageless() {
        let store = MemoryAnnotationStore::new();
        stored_guess(&store);
        store
            .save(NewAnnotation::new("no-image", "A-3", Rect::new(0, 0, 5, 5), AnnotationSource::Heuristic))
            .unwrap();
        store
            .save(
                NewAnnotation::new("judged", "A-4", Rect::new(0, 0, 5, 5), AnnotationSource::Heuristic)
                    .with_validity(Some(false))
                    .with_image_path("/pages/judged.png"),
            )
            .unwrap();

        let keys: Vec<String> = pending_refinement(&store)
            .unwrap()
            .into_iter()
            .map(|a| a.image_key)
            .collect();
        assert_eq!(keys, vec!["k".to_string()]);
    }
}
