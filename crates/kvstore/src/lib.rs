//! Small persistent key/value layer for derived data.
//!
//! Values are strings held by a [`KeyValueBackend`]. Two typed views sit on
//! top of a backend:
//!
//! - [`ExpireStore`] wraps each value in an envelope carrying an absolute
//!   expiry and drops entries once it passes.
//! - [`InstantStore`] keeps one versioned object under a single key and falls
//!   back to a template when nothing usable is stored.
//!
//! [`FileBackend`] writes through to a single JSON file on every mutation so
//! a crash never loses more than the mutation in flight.

mod expire;
mod instant;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use expire::ExpireStore;
pub use instant::InstantStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode stored value: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("stored value for '{key}' has version {found}; expected {expected}")]
    TemplateMismatch {
        key: String,
        expected: u32,
        found: u32,
    },
}

/// String storage keyed by string.
pub trait KeyValueBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
    /// Returns whether a value was present.
    fn remove(&mut self, key: &str) -> Result<bool, StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: BTreeMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.keys().cloned().collect())
    }
}

/// Backend persisted as one JSON object in a file.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileBackend {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), entries = entries.len(), "opened key-value file");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let encoded = serde_json::to_vec_pretty(&self.entries)?;
        let staging = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&staging)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl KeyValueBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.flush()?;
        }
        Ok(removed)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_round_trips() {
        let mut backend = MemoryBackend::new();
        assert!(backend.is_empty());
        backend.set("a", "1".into()).unwrap();
        backend.set("b", "2".into()).unwrap();
        assert_eq!(backend.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(backend.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert!(backend.remove("a").unwrap());
        assert!(!backend.remove("a").unwrap());
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn file_backend_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let mut backend = FileBackend::open(&path).unwrap();
        assert!(backend.keys().unwrap().is_empty());
        backend.set("cover", "a.png".into()).unwrap();
        backend.set("other", "b.png".into()).unwrap();
        backend.remove("other").unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.get("cover").unwrap().as_deref(), Some("a.png"));
        assert_eq!(reopened.get("other").unwrap(), None);
    }

    #[test]
    fn file_backend_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{ not json").unwrap();
        let err = FileBackend::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Serde(_)));
    }

    #[test]
    fn file_backend_treats_empty_file_as_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "").unwrap();
        let backend = FileBackend::open(&path).unwrap();
        assert!(backend.keys().unwrap().is_empty());
    }
}
