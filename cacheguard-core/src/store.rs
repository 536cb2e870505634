//! The minimal key-value protocol the cache client is built on.

use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;

/// A fast key-value store holding string values under string keys.
///
/// Implementations are shared by every caller of a
/// [`CacheClient`](crate::CacheClient) and by the rebuild workers, so they
/// must be safe to use from many threads at once. Each method is one
/// synchronous round trip; a networked implementation is expected to apply
/// its own timeouts.
///
/// | Operation        | Semantics                                   |
/// |------------------|---------------------------------------------|
/// | `get`            | stored string, or `None` if absent          |
/// | `set`            | upsert, optional expiry                     |
/// | `set_if_absent`  | atomic; `true` iff this call created the key |
/// | `delete`         | no-op if absent                             |
/// | `expire`         | refresh the TTL of an existing key          |
pub trait KvStore: Send + Sync + 'static {
    /// Returns the value stored at `key`, or `None` if there is none.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` at `key`, replacing any previous value.
    ///
    /// With `ttl = None` the key never expires at the store level.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Atomically stores `value` at `key` with the given `ttl` if and only if
    /// the key does not exist yet.
    ///
    /// Returns `true` if this call created the key.
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Sets a new TTL on an existing key.
    ///
    /// Returns `false` if the key does not exist.
    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Deletes `key` only if its current value equals `expected`.
    ///
    /// Returns `true` if the key was deleted. The provided implementation
    /// reads and then deletes in two round trips; stores able to do it
    /// atomically should override it.
    fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        match self.get(key)? {
            Some(current) if current == expected => {
                self.delete(key)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        (**self).set(key, value, ttl)
    }

    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        (**self).set_if_absent(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        (**self).expire(key, ttl)
    }

    fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        (**self).compare_and_delete(key, expected)
    }
}
