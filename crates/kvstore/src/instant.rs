use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{KeyValueBackend, StoreError};

#[derive(Debug, Serialize, Deserialize)]
struct Versioned<T> {
    version: u32,
    data: T,
}

/// One versioned object stored under a single key.
///
/// The template supplies both the value returned when nothing is stored and
/// the version that stored data must carry to be trusted.
#[derive(Debug)]
pub struct InstantStore<T, B> {
    backend: B,
    key: String,
    version: u32,
    template: T,
}

impl<T, B> InstantStore<T, B>
where
    T: Clone + Serialize + DeserializeOwned,
    B: KeyValueBackend,
{
    pub fn new(backend: B, key: impl Into<String>, version: u32, template: T) -> Self {
        Self {
            backend,
            key: key.into(),
            version,
            template,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn template(&self) -> &T {
        &self.template
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Reads the stored object, or the template when nothing is stored.
    ///
    /// Fails with [`StoreError::TemplateMismatch`] when the stored version
    /// differs or the payload no longer deserializes into `T`.
    pub fn load(&self) -> Result<T, StoreError> {
        let Some(raw) = self.backend.get(&self.key)? else {
            return Ok(self.template.clone());
        };
        let stored: Versioned<Value> = serde_json::from_str(&raw)?;
        if stored.version != self.version {
            return Err(self.mismatch(stored.version));
        }
        serde_json::from_value(stored.data).map_err(|_| self.mismatch(stored.version))
    }

    /// Like [`InstantStore::load`], but replaces unusable data with the
    /// template.
    pub fn load_or_reset(&mut self) -> Result<T, StoreError> {
        match self.load() {
            Ok(value) => Ok(value),
            Err(StoreError::TemplateMismatch { found, .. }) => {
                warn!(key = %self.key, found, expected = self.version, "stored object is stale; resetting");
                self.reset()
            }
            Err(StoreError::Serde(err)) => {
                warn!(key = %self.key, %err, "stored object is unreadable; resetting");
                self.reset()
            }
            Err(err) => Err(err),
        }
    }

    pub fn save(&mut self, value: &T) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&Versioned {
            version: self.version,
            data: value,
        })?;
        self.backend.set(&self.key, encoded)
    }

    /// Loads, applies `apply` and saves the result.
    pub fn update<F>(&mut self, apply: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut T),
    {
        let mut value = self.load_or_reset()?;
        apply(&mut value);
        self.save(&value)?;
        Ok(value)
    }

    /// Writes the template back and returns it.
    pub fn reset(&mut self) -> Result<T, StoreError> {
        let template = self.template.clone();
        self.save(&template)?;
        debug!(key = %self.key, "reset stored object to template");
        Ok(template)
    }

    fn mismatch(&self, found: u32) -> StoreError {
        StoreError::TemplateMismatch {
            key: self.key.clone(),
            expected: self.version,
            found,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileBackend, MemoryBackend};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Settings {
        last_image: Option<String>,
        hue: f32,
    }

    fn template() -> Settings {
        Settings {
            last_image: None,
            hue: 0.0,
        }
    }

    #[test]
    fn absent_key_loads_template() {
        let store = InstantStore::new(MemoryBackend::new(), "settings", 1, template());
        assert_eq!(store.load().unwrap(), template());
        assert!(store.backend().is_empty());
    }

    #[test]
    fn save_then_load() {
        let mut store = InstantStore::new(MemoryBackend::new(), "settings", 1, template());
        let value = Settings {
            last_image: Some("a.png".into()),
            hue: 45.0,
        };
        store.save(&value).unwrap();
        assert_eq!(store.load().unwrap(), value);
    }

    #[test]
    fn version_change_is_a_template_mismatch() {
        let mut old = InstantStore::new(MemoryBackend::new(), "settings", 1, template());
        old.save(&template()).unwrap();
        let backend = old.backend().clone();

        let mut current = InstantStore::new(backend, "settings", 2, template());
        match current.load() {
            Err(StoreError::TemplateMismatch {
                key,
                expected,
                found,
            }) => {
                assert_eq!(key, "settings");
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }

        assert_eq!(current.load_or_reset().unwrap(), template());
        assert_eq!(current.load().unwrap(), template());
    }

    #[test]
    fn payload_of_wrong_shape_is_a_template_mismatch() {
        let mut backend = MemoryBackend::new();
        backend
            .set("settings", r#"{"version":1,"data":{"unrelated":true}}"#.into())
            .unwrap();
        let store = InstantStore::new(backend, "settings", 1, template());
        assert!(matches!(
            store.load(),
            Err(StoreError::TemplateMismatch { found: 1, .. })
        ));
    }

    #[test]
    fn unreadable_payload_resets() {
        let mut backend = MemoryBackend::new();
        backend.set("settings", "garbage".into()).unwrap();
        let mut store = InstantStore::new(backend, "settings", 1, template());
        assert!(matches!(store.load(), Err(StoreError::Serde(_))));
        assert_eq!(store.load_or_reset().unwrap(), template());
    }

    #[test]
    fn update_persists_through_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let mut store =
                InstantStore::new(FileBackend::open(&path).unwrap(), "settings", 1, template());
            let updated = store
                .update(|settings| settings.last_image = Some("b.png".into()))
                .unwrap();
            assert_eq!(updated.last_image.as_deref(), Some("b.png"));
        }
        let store = InstantStore::new(FileBackend::open(&path).unwrap(), "settings", 1, template());
        assert_eq!(store.load().unwrap().last_image.as_deref(), Some("b.png"));
    }
}
