use std::marker::PhantomData;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{KeyValueBackend, StoreError};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    value: T,
    expires_at_ms: u64,
}

fn millis_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Values that disappear once their time-to-live has passed.
///
/// Expiry is checked lazily on read and in bulk by
/// [`ExpireStore::purge_expired`]. An entry expires at exactly
/// `set time + ttl`.
#[derive(Debug)]
pub struct ExpireStore<T, B> {
    backend: B,
    _value: PhantomData<fn() -> T>,
}

impl<T, B> ExpireStore<T, B>
where
    T: Serialize + DeserializeOwned,
    B: KeyValueBackend,
{
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            _value: PhantomData,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_inner(self) -> B {
        self.backend
    }

    pub fn set(&mut self, key: &str, value: &T, ttl: Duration) -> Result<(), StoreError> {
        self.set_at(key, value, ttl, SystemTime::now())
    }

    pub fn set_at(
        &mut self,
        key: &str,
        value: &T,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<(), StoreError> {
        let expires_at_ms = millis_since_epoch(now)
            .saturating_add(ttl.as_millis().try_into().unwrap_or(u64::MAX));
        let encoded = serde_json::to_string(&Envelope {
            value,
            expires_at_ms,
        })?;
        self.backend.set(key, encoded)
    }

    pub fn get(&mut self, key: &str) -> Result<Option<T>, StoreError> {
        self.get_at(key, SystemTime::now())
    }

    /// Returns the live value for `key`, removing it if it has expired.
    pub fn get_at(&mut self, key: &str, now: SystemTime) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.backend.get(key)? else {
            return Ok(None);
        };
        let envelope: Envelope<T> = serde_json::from_str(&raw)?;
        if millis_since_epoch(now) >= envelope.expires_at_ms {
            debug!(key, "dropping expired entry");
            self.backend.remove(key)?;
            return Ok(None);
        }
        Ok(Some(envelope.value))
    }

    pub fn contains_at(&mut self, key: &str, now: SystemTime) -> Result<bool, StoreError> {
        Ok(self.get_at(key, now)?.is_some())
    }

    pub fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
        self.backend.remove(key)
    }

    pub fn purge_expired(&mut self) -> Result<usize, StoreError> {
        self.purge_expired_at(SystemTime::now())
    }

    /// Removes every expired or unreadable entry and returns how many went.
    pub fn purge_expired_at(&mut self, now: SystemTime) -> Result<usize, StoreError> {
        #[derive(Deserialize)]
        struct Expiry {
            expires_at_ms: u64,
        }

        let now_ms = millis_since_epoch(now);
        let mut purged = 0;
        for key in self.backend.keys()? {
            let Some(raw) = self.backend.get(&key)? else {
                continue;
            };
            let expired = match serde_json::from_str::<Expiry>(&raw) {
                Ok(expiry) => now_ms >= expiry.expires_at_ms,
                Err(_) => true,
            };
            if expired && self.backend.remove(&key)? {
                purged += 1;
            }
        }
        if purged > 0 {
            debug!(purged, "purged expired entries");
        }
        Ok(purged)
    }
}
