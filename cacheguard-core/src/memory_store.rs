//! In-process [`KvStore`] with lazily enforced per-key expiry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::error::StoreError;
use crate::store::KvStore;

/// A value held by [`MemoryStore`] together with its store-level deadline.
#[derive(Clone, Debug)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

/// An in-process [`KvStore`] backed by a sharded concurrent map.
///
/// Expired keys are treated as absent by every operation and removed lazily
/// the next time they are touched. `set_if_absent` and `compare_and_delete`
/// hold the shard lock for the key for their whole duration, so both are
/// atomic with respect to concurrent callers.
///
/// # Examples
///
/// ```
/// use cacheguard_core::{KvStore, MemoryStore};
/// use std::time::Duration;
///
/// let store = MemoryStore::new();
/// assert!(store.set_if_absent("lock:shop:1", "t1", Duration::from_secs(10)).unwrap());
/// assert!(!store.set_if_absent("lock:shop:1", "t2", Duration::from_secs(10)).unwrap());
/// assert_eq!(store.get("lock:shop:1").unwrap().as_deref(), Some("t1"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: DashMap<String, StoredValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining store-level time to live of `key`.
    ///
    /// Returns `None` if the key is absent, expired or has no expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entry = self.map.get(key)?;
        if entry.is_expired() {
            return None;
        }
        entry
            .expires_at
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.map.iter().filter(|entry| !entry.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every key.
    pub fn clear(&self) {
        self.map.clear();
    }

    fn evict_if_expired(&self, key: &str) {
        self.map.remove_if(key, |_, stored| stored.is_expired());
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.map.get(key) {
            None => return Ok(None),
            Some(stored) if !stored.is_expired() => return Ok(Some(stored.value.clone())),
            Some(_) => {}
        }
        self.evict_if_expired(key);
        Ok(None)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.map.insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(StoredValue::new(value, Some(ttl)));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, Some(ttl)));
                Ok(true)
            }
        }
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.map.remove(key);
        Ok(())
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        match self.map.get_mut(key) {
            Some(mut stored) if !stored.is_expired() => {
                stored.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            Some(stored) => {
                drop(stored);
                self.evict_if_expired(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let removed = self
            .map
            .remove_if(key, |_, stored| !stored.is_expired() && stored.value == expected);
        Ok(removed.is_some())
    }
}
