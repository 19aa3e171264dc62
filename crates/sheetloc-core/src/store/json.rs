//! Directory of pretty-printed JSON annotation files, one per image key.

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::annotation::{Annotation, NewAnnotation};

use super::AnnotationStore;

/// Stores `<dir>/<image_key>.json`.
///
/// Writers in one process are serialized; each write goes to a uniquely named
/// temp file in `dir` and is renamed over the record.
#[derive(Debug)]
pub struct JsonAnnotationStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonAnnotationStore {
    /// Open a store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, lock: Mutex::new(()) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, image_key: &str) -> Result<PathBuf, StoreError> {
        let well_formed = !image_key.is_empty()
            && image_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(StoreError::Io(io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid image key {:?}", image_key),
            )));
        }
        Ok(self.dir.join(format!("{}.json", image_key)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.lock.lock().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self, path: &Path, annotation: &Annotation) -> Result<(), StoreError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(serde_json::to_string_pretty(annotation)?.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;
        debug!("Saved annotation {}", path.display());
        Ok(())
    }

    fn delete(path: &Path) -> Result<bool, StoreError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read(path: &Path) -> Result<Option<Annotation>, StoreError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl AnnotationStore for JsonAnnotationStore {
    fn find_existing(&self, image_key: &str) -> Result<Option<Annotation>, StoreError> {
        Self::read(&self.path_for(image_key)?)
    }

    fn save(&self, annotation: NewAnnotation) -> Result<Annotation, StoreError> {
        let path = self.path_for(&annotation.image_key)?;
        let _guard = self.lock()?;
        let previous = Self::read(&path)?;
        let stored = annotation.into_annotation(previous.as_ref());
        self.write(&path, &stored)?;
        Ok(stored)
    }

    fn remove(&self, image_key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(image_key)?;
        let _guard = self.lock()?;
        Self::delete(&path)
    }

    fn save_unless_protected(&self, annotation: NewAnnotation) -> Result<Option<Annotation>, StoreError> {
        let path = self.path_for(&annotation.image_key)?;
        let _guard = self.lock()?;
        let previous = Self::read(&path)?;
        if previous.as_ref().is_some_and(Annotation::is_protected) {
            return Ok(None);
        }
        let stored = annotation.into_annotation(previous.as_ref());
        self.write(&path, &stored)?;
        Ok(Some(stored))
    }

    fn remove_unless_protected(&self, image_key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(image_key)?;
        let _guard = self.lock()?;
        match Self::read(&path)? {
            Some(existing) if !existing.is_protected() => Self::delete(&path),
            _ => Ok(false),
        }
    }

    fn list(&self) -> Result<Vec<Annotation>, StoreError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut annotations = Vec::with_capacity(paths.len());
        for path in paths {
            match Self::read(&path) {
                Ok(Some(annotation)) => annotations.push(annotation),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable annotation {}: {}", path.display(), e),
            }
        }
        Ok(annotations)
    }
}
