//! Token-verified mutual exclusion on top of [`KvStore::set_if_absent`].
//!
//! A lock is a key holding a random token. It is held by a caller only while
//! the stored value equals that caller's token, and it is released by a
//! compare-then-delete, so a holder whose lock already expired can never
//! delete a lock somebody else re-acquired in the meantime. The TTL bounds
//! how long a crashed holder can block everybody else.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::KvStore;

/// Proof of a successful [`DistributedLock::try_acquire`].
///
/// Handles are deliberately not `Clone`: releasing consumes the handle.
#[derive(Debug, PartialEq, Eq)]
pub struct LockHandle {
    key: String,
    token: String,
    ttl: Duration,
}

impl LockHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The opaque token stored at [`key`](Self::key) while the lock is held.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Short-lived distributed lock over a shared [`KvStore`].
///
/// # Examples
///
/// ```
/// use cacheguard_core::{DistributedLock, MemoryStore};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let lock = DistributedLock::new(Arc::new(MemoryStore::new()));
///
/// let handle = lock.try_acquire("lock:Shop:1", Duration::from_secs(10)).unwrap();
/// assert!(handle.is_some());
///
/// // A second attempt loses the race and gets nothing back.
/// assert!(lock.try_acquire("lock:Shop:1", Duration::from_secs(10)).unwrap().is_none());
///
/// assert!(lock.release(handle.unwrap()));
/// ```
pub struct DistributedLock<S> {
    store: Arc<S>,
}

impl<S> Clone for DistributedLock<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> fmt::Debug for DistributedLock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedLock").finish_non_exhaustive()
    }
}

impl<S: KvStore> DistributedLock<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Makes a single, non-blocking attempt to take the lock at `key`.
    ///
    /// Stores a fresh random token at `key` with the given `ttl` if and only
    /// if the key is absent. Losing the race is not an error and is never
    /// retried here.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(handle))` - The lock is now held by the caller
    /// * `Ok(None)` - Somebody else holds it
    /// * `Err(_)` - The store could not be reached
    pub fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockHandle>, StoreError> {
        let token = Uuid::new_v4().simple().to_string();
        if self.store.set_if_absent(key, &token, ttl)? {
            debug!(lock = %key, ttl_ms = ttl.as_millis() as u64, "lock acquired");
            Ok(Some(LockHandle {
                key: key.to_string(),
                token,
                ttl,
            }))
        } else {
            debug!(lock = %key, "lock held elsewhere");
            Ok(None)
        }
    }

    /// Releases the lock described by `handle` if the caller still holds it.
    ///
    /// The key is deleted only if it still stores the handle's token. A
    /// mismatch (the lock expired and was re-acquired, or was already
    /// released) is a silent no-op. Store failures are logged and swallowed,
    /// so releasing can never fail the caller.
    ///
    /// Returns `true` if the key was deleted by this call.
    pub fn release(&self, handle: LockHandle) -> bool {
        match self.store.compare_and_delete(&handle.key, &handle.token) {
            Ok(true) => {
                debug!(lock = %handle.key, "lock released");
                true
            }
            Ok(false) => {
                debug!(lock = %handle.key, "lock no longer owned, nothing released");
                false
            }
            Err(err) => {
                error!(lock = %handle.key, error = %err, "failed to release lock");
                false
            }
        }
    }

    /// Wraps `handle` in a guard that releases it when dropped.
    pub fn guard(&self, handle: LockHandle) -> LockGuard<S> {
        LockGuard {
            lock: self.clone(),
            handle: Some(handle),
        }
    }
}

/// Releases its lock on drop, whether the owning scope ends normally,
/// returns early or unwinds.
pub struct LockGuard<S: KvStore> {
    lock: DistributedLock<S>,
    handle: Option<LockHandle>,
}

impl<S: KvStore> LockGuard<S> {
    pub fn handle(&self) -> Option<&LockHandle> {
        self.handle.as_ref()
    }

    /// Releases now instead of at drop time.
    pub fn release(mut self) -> bool {
        self.handle
            .take()
            .map(|handle| self.lock.release(handle))
            .unwrap_or(false)
    }
}

impl<S: KvStore> fmt::Debug for LockGuard<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("handle", &self.handle)
            .finish()
    }
}

impl<S: KvStore> Drop for LockGuard<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.lock.release(handle);
        }
    }
}
