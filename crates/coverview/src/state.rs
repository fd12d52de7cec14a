use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use backdropconfig::ResolvedImage;
use kvstore::{ExpireStore, FileBackend, InstantStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const STATE_FILE: &str = "state.json";
const FAILURES_FILE: &str = "failures.json";
const STATE_KEY: &str = "viewer";
const STATE_VERSION: u32 = 1;

/// What the viewer last put on screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewerState {
    pub last_image: Option<String>,
    pub hue_shift: f32,
    pub blur: f32,
    pub rotation_speed: f32,
}

/// Remembered viewer state plus images that recently failed to load.
pub struct ViewerStore {
    state: InstantStore<ViewerState, FileBackend>,
    failures: ExpireStore<String, FileBackend>,
    failure_ttl: Duration,
}

impl ViewerStore {
    pub fn open(dir: &Path, failure_ttl: Duration) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create state directory {}", dir.display()))?;
        let state_backend = FileBackend::open(dir.join(STATE_FILE))
            .with_context(|| format!("failed to open {}", dir.join(STATE_FILE).display()))?;
        let failure_backend = FileBackend::open(dir.join(FAILURES_FILE))
            .with_context(|| format!("failed to open {}", dir.join(FAILURES_FILE).display()))?;

        let mut failures = ExpireStore::new(failure_backend);
        let purged = failures
            .purge_expired()
            .context("failed to purge expired failures")?;
        debug!(dir = %dir.display(), purged, "opened viewer state");

        Ok(Self {
            state: InstantStore::new(state_backend, STATE_KEY, STATE_VERSION, ViewerState::default()),
            failures,
            failure_ttl,
        })
    }

    pub fn last_state(&mut self) -> ViewerState {
        self.state.load_or_reset().unwrap_or_else(|err| {
            warn!(%err, "failed to read viewer state");
            ViewerState::default()
        })
    }

    pub fn record_applied(&mut self, image: &ResolvedImage) -> Result<()> {
        self.state
            .save(&ViewerState {
                last_image: Some(image.handle.clone()),
                hue_shift: image.hue_shift,
                blur: image.blur,
                rotation_speed: image.rotation_speed,
            })
            .context("failed to save viewer state")
    }

    pub fn record_failure(&mut self, handle: &str, message: &str) -> Result<()> {
        self.record_failure_at(handle, message, SystemTime::now())
    }

    fn record_failure_at(&mut self, handle: &str, message: &str, now: SystemTime) -> Result<()> {
        self.failures
            .set_at(handle, &message.to_string(), self.failure_ttl, now)
            .with_context(|| format!("failed to remember failure for {handle}"))
    }

    pub fn has_failed(&mut self, handle: &str) -> bool {
        self.has_failed_at(handle, SystemTime::now())
    }

    fn has_failed_at(&mut self, handle: &str, now: SystemTime) -> bool {
        match self.failures.contains_at(handle, now) {
            Ok(failed) => failed,
            Err(err) => {
                warn!(handle, %err, "unreadable failure entry; dropping it");
                if let Err(err) = self.failures.remove(handle) {
                    warn!(handle, %err, "failed to drop unreadable failure entry");
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(handle: &str) -> ResolvedImage {
        ResolvedImage {
            handle: handle.to_string(),
            hue_shift: 15.0,
            blur: 8.0,
            rotation_speed: 0.5,
        }
    }

    #[test]
    fn remembers_last_applied_image_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = ViewerStore::open(dir.path(), Duration::from_secs(60)).unwrap();
            assert_eq!(store.last_state(), ViewerState::default());
            store.record_applied(&image("cover.png")).unwrap();
        }
        let mut store = ViewerStore::open(dir.path(), Duration::from_secs(60)).unwrap();
        let state = store.last_state();
        assert_eq!(state.last_image.as_deref(), Some("cover.png"));
        assert_eq!(state.hue_shift, 15.0);
        assert_eq!(state.rotation_speed, 0.5);
    }

    #[test]
    fn failures_expire_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ViewerStore::open(dir.path(), Duration::from_secs(60)).unwrap();
        let now = SystemTime::now();
        store.record_failure_at("bad.png", "HTTP 404", now).unwrap();

        assert!(store.has_failed_at("bad.png", now + Duration::from_secs(30)));
        assert!(!store.has_failed_at("good.png", now));
        assert!(!store.has_failed_at("bad.png", now + Duration::from_secs(61)));
    }

    #[test]
    fn unreadable_failure_entry_is_dropped() {
        use kvstore::KeyValueBackend;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FAILURES_FILE);
        let mut store = ViewerStore::open(dir.path(), Duration::from_secs(60)).unwrap();
        fs::write(&path, r#"{"bad.png": "not an envelope", "worse.png": "[]"}"#).unwrap();
        store.failures = ExpireStore::new(FileBackend::open(&path).unwrap());

        assert!(!store.has_failed("bad.png"));
        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.get("bad.png").unwrap(), None);

        // Dropping the entry cannot be persisted once the directory is gone.
        fs::remove_dir_all(dir.path()).unwrap();
        assert!(!store.has_failed("worse.png"));
    }

    #[test]
    fn stale_state_file_resets_to_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(STATE_FILE),
            r#"{"viewer": "{\"version\":0,\"data\":{}}"}"#,
        )
        .unwrap();
        let mut store = ViewerStore::open(dir.path(), Duration::from_secs(60)).unwrap();
        assert_eq!(store.last_state(), ViewerState::default());
    }
}
