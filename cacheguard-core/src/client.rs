//! The cache client: read-through strategies over a [`KvStore`].

use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache_entry::CacheEntry;
use crate::codec::{self, NULL_MARKER};
use crate::config::CacheConfig;
use crate::error::{BoxError, CacheError, ConfigError, Result};
use crate::keys::{cache_key, lock_key_for};
use crate::lock::DistributedLock;
use crate::rebuild::{write_envelope, RebuildTask};
use crate::scheduler::RebuildScheduler;
use crate::store::KvStore;
#[cfg(feature = "stats")]
use crate::CacheStats;

/// A caching client in front of a primary data store.
///
/// The client owns no cached state itself: everything lives in the shared
/// [`KvStore`], so one instance (or any number of clones) can be used from
/// every thread of the process. It offers two read-through strategies:
///
/// * [`get_or_load`](Self::get_or_load) - store-level TTL plus a short-lived
///   null placeholder for ids the primary store does not know, so repeated
///   lookups of nonexistent ids cannot hammer the primary store
///   (*penetration*).
/// * [`get_or_load_with_logical_expiry`](Self::get_or_load_with_logical_expiry) -
///   entries never expire in the store; a logical expiry stored next to the
///   value marks them stale, stale values are served immediately and exactly
///   one caller per key rebuilds the entry in the background
///   (*stampede* protection).
///
/// # Examples
///
/// ```
/// use cacheguard_core::{CacheClient, CacheConfig, MemoryStore, RebuildScheduler};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = Arc::new(RebuildScheduler::new(2).unwrap());
/// let client = CacheClient::new(Arc::new(MemoryStore::new()), scheduler, CacheConfig::default()).unwrap();
///
/// let name: Option<String> = client
///     .get_or_load("cache:shop:", &1, |id| Ok(Some(format!("shop #{}", id))), Duration::from_secs(60))
///     .unwrap();
/// assert_eq!(name.as_deref(), Some("shop #1"));
///
/// // Unknown ids are remembered as absent.
/// let none: Option<String> = client
///     .get_or_load("cache:shop:", &404, |_| Ok(None), Duration::from_secs(60))
///     .unwrap();
/// assert_eq!(none, None);
/// ```
pub struct CacheClient<S> {
    store: Arc<S>,
    lock: DistributedLock<S>,
    scheduler: Arc<RebuildScheduler>,
    config: CacheConfig,
    #[cfg(feature = "stats")]
    stats: Arc<CacheStats>,
}

impl<S> Clone for CacheClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lock: self.lock.clone(),
            scheduler: Arc::clone(&self.scheduler),
            config: self.config.clone(),
            #[cfg(feature = "stats")]
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<S> fmt::Debug for CacheClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheClient")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl<S: KvStore> CacheClient<S> {
    /// Creates a client over `store`, handing rebuilds to `scheduler`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `config` does not pass
    /// [`CacheConfig::validate`], e.g. a zero null-placeholder or lock TTL.
    pub fn new(
        store: Arc<S>,
        scheduler: Arc<RebuildScheduler>,
        config: CacheConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            lock: DistributedLock::new(Arc::clone(&store)),
            store,
            scheduler,
            config,
            #[cfg(feature = "stats")]
            stats: Arc::new(CacheStats::new()),
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<RebuildScheduler> {
        &self.scheduler
    }

    /// Counters shared by this client and all of its clones.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Serializes `value` and stores it at `key`, expiring after `ttl`.
    pub fn set_with_ttl<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let raw = codec::encode(value)?;
        self.store.set(key, &raw, Some(ttl))?;
        Ok(())
    }

    /// Wraps `value` in a [`CacheEntry`] going stale after `logical_ttl` and
    /// stores it at `key` with no store-level expiry.
    pub fn set_with_logical_expiry<T>(&self, key: &str, value: &T, logical_ttl: Duration) -> Result<()>
    where
        T: Serialize,
    {
        write_envelope(self.store.as_ref(), key, &CacheEntry::wrap(value, logical_ttl))
    }

    /// Penetration-safe read-through.
    ///
    /// # Behavior
    ///
    /// 1. Reads `key_prefix + id` from the store
    /// 2. Hit with a payload: decodes and returns it
    /// 3. Hit with the null placeholder: returns `None` without calling `loader`
    /// 4. Miss: calls `loader(id)`
    ///    - `None`: stores the null placeholder for the configured
    ///      [`null_ttl`](CacheConfig::null_ttl) and returns `None`
    ///    - `Some(value)`: stores it for `ttl` and returns it
    ///
    /// A confirmed-absent id therefore reaches the primary store at most once
    /// per placeholder window.
    ///
    /// # Errors
    ///
    /// Store failures, decode failures and loader failures are returned to
    /// the caller. Nothing is cached when the loader fails.
    pub fn get_or_load<T, Id, F>(&self, key_prefix: &str, id: &Id, loader: F, ttl: Duration) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        Id: Display + ?Sized,
        F: FnOnce(&Id) -> std::result::Result<Option<T>, BoxError>,
    {
        let key = cache_key(key_prefix, id);

        if let Some(raw) = self.store.get(&key)? {
            if codec::is_null_marker(&raw) {
                #[cfg(feature = "stats")]
                self.stats.record_null_hit();
                debug!(key = %key, "null placeholder hit");
                return Ok(None);
            }
            let value = codec::decode(&key, &raw)?;
            #[cfg(feature = "stats")]
            self.stats.record_hit();
            debug!(key = %key, "cache hit");
            return Ok(Some(value));
        }

        #[cfg(feature = "stats")]
        self.stats.record_miss();
        debug!(key = %key, "cache miss, loading from primary store");

        match loader(id).map_err(CacheError::Loader)? {
            Some(value) => {
                self.set_with_ttl(&key, &value, ttl)?;
                Ok(Some(value))
            }
            None => {
                self.store.set(&key, NULL_MARKER, Some(self.config.null_ttl()))?;
                debug!(key = %key, "primary store has no value, null placeholder written");
                Ok(None)
            }
        }
    }

    /// [`get_or_load`](Self::get_or_load) with the configured TTL.
    pub fn get_or_load_default<T, Id, F>(&self, key_prefix: &str, id: &Id, loader: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        Id: Display + ?Sized,
        F: FnOnce(&Id) -> std::result::Result<Option<T>, BoxError>,
    {
        self.get_or_load(key_prefix, id, loader, self.config.ttl())
    }

    /// Stampede-safe read-through over logically expiring entries.
    ///
    /// # Behavior
    ///
    /// * **Missing** (nothing stored): returns `None` and never calls
    ///   `loader`. Entries are expected to be pre-populated, e.g. with
    ///   [`warm_up`](Self::warm_up).
    /// * **Fresh**: returns the stored value.
    /// * **Stale**: returns the stored value immediately, then tries to take
    ///   the rebuild lock for `(T, id)`. The winner re-reads the entry and,
    ///   if it is still stale, hands `loader` to the [`RebuildScheduler`],
    ///   which rewrites the entry and releases the lock whatever the loader
    ///   does. Everybody else keeps serving the stale
    ///   value until the rebuild lands.
    ///
    /// The caller is never blocked on a rebuild. An envelope holding the null
    /// marker (the last rebuild found nothing) reads as `None`.
    ///
    /// # Errors
    ///
    /// Failing to read or decode the entry is returned to the caller. Failing
    /// to take the lock is only logged: the stale value is still returned.
    pub fn get_or_load_with_logical_expiry<T, Id, F>(
        &self,
        key_prefix: &str,
        id: Id,
        loader: F,
        logical_ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        Id: Display + Send + 'static,
        F: FnOnce(&Id) -> std::result::Result<Option<T>, BoxError> + Send + 'static,
    {
        let key = cache_key(key_prefix, &id);

        let raw = match self.store.get(&key)? {
            Some(raw) if !codec::is_null_marker(&raw) => raw,
            _ => {
                #[cfg(feature = "stats")]
                self.stats.record_miss();
                debug!(key = %key, "logical cache miss, entry not pre-populated");
                return Ok(None);
            }
        };

        let entry: CacheEntry<T> = codec::decode(&key, &raw)?;
        if !entry.is_expired() {
            #[cfg(feature = "stats")]
            self.stats.record_hit();
            debug!(key = %key, "cache hit");
            return Ok(entry.value);
        }

        #[cfg(feature = "stats")]
        self.stats.record_stale_hit();
        debug!(key = %key, expired_at = %entry.logical_expiry, "stale cache hit");

        self.schedule_rebuild::<T, Id, F>(key, id, loader, logical_ttl);
        Ok(entry.value)
    }

    /// [`get_or_load_with_logical_expiry`](Self::get_or_load_with_logical_expiry)
    /// with the configured logical TTL.
    pub fn get_or_load_with_logical_expiry_default<T, Id, F>(
        &self,
        key_prefix: &str,
        id: Id,
        loader: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        Id: Display + Send + 'static,
        F: FnOnce(&Id) -> std::result::Result<Option<T>, BoxError> + Send + 'static,
    {
        self.get_or_load_with_logical_expiry(key_prefix, id, loader, self.config.logical_ttl())
    }

    fn schedule_rebuild<T, Id, F>(&self, key: String, id: Id, loader: F, logical_ttl: Duration)
    where
        T: Serialize + Send + 'static,
        Id: Display + Send + 'static,
        F: FnOnce(&Id) -> std::result::Result<Option<T>, BoxError> + Send + 'static,
    {
        let lock_key = lock_key_for::<T, Id>(&self.config.lock_key_prefix, &id);

        let handle = match self.lock.try_acquire(&lock_key, self.config.lock_ttl()) {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                debug!(key = %key, lock = %lock_key, "rebuild already in flight");
                return;
            }
            Err(err) => {
                warn!(key = %key, lock = %lock_key, error = %err, "could not take rebuild lock, serving stale value");
                return;
            }
        };
        let guard = self.lock.guard(handle);

        // The previous holder may have finished between our read and our
        // acquire; the guard releases the lock on return.
        if !self.still_stale(&key) {
            debug!(key = %key, lock = %lock_key, "entry already rebuilt, skipping");
            return;
        }

        let task = RebuildTask {
            key,
            id,
            loader,
            logical_ttl,
            store: Arc::clone(&self.store),
            guard,
            #[cfg(feature = "stats")]
            stats: Arc::clone(&self.stats),
        };

        // A rejected task is dropped here, which releases its lock.
        if self.scheduler.submit(move || task.run()) {
            #[cfg(feature = "stats")]
            self.stats.record_rebuild_submitted();
            debug!(lock = %lock_key, "rebuild submitted");
        }
    }

    /// Re-reads the envelope at `key` and reports whether it still needs a
    /// rebuild. Only the expiry is decoded.
    fn still_stale(&self, key: &str) -> bool {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) if !codec::is_null_marker(&raw) => raw,
            Ok(_) => return false,
            Err(err) => {
                warn!(key = %key, error = %err, "could not re-read stale entry, skipping rebuild");
                return false;
            }
        };
        match codec::decode::<CacheEntry<IgnoredAny>>(key, &raw) {
            Ok(entry) => entry.is_expired(),
            Err(err) => {
                warn!(key = %key, error = %err, "could not re-read stale entry, skipping rebuild");
                false
            }
        }
    }

    /// Loads `id` from the primary store and writes it as a logically
    /// expiring entry.
    ///
    /// This is how entries read by
    /// [`get_or_load_with_logical_expiry`](Self::get_or_load_with_logical_expiry)
    /// get into the store in the first place. Nothing is written when the
    /// loader finds nothing.
    ///
    /// Returns `true` if a value was found and written.
    pub fn warm_up<T, Id, F>(&self, key_prefix: &str, id: &Id, loader: F, logical_ttl: Duration) -> Result<bool>
    where
        T: Serialize,
        Id: Display + ?Sized,
        F: FnOnce(&Id) -> std::result::Result<Option<T>, BoxError>,
    {
        let key = cache_key(key_prefix, id);
        match loader(id).map_err(CacheError::Loader)? {
            Some(value) => {
                self.set_with_logical_expiry(&key, &value, logical_ttl)?;
                debug!(key = %key, "cache entry warmed up");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reads and decodes the value at `key`, without any loading.
    ///
    /// The null placeholder and a missing key both read as `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key)? {
            Some(raw) if !codec::is_null_marker(&raw) => Ok(Some(codec::decode(key, &raw)?)),
            _ => Ok(None),
        }
    }

    /// Reads the raw string at `key`.
    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.get(key)?)
    }

    /// Stores a plain string (e.g. a one-time code) at `key` for `ttl`.
    pub fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.store.set(key, value, Some(ttl))?;
        Ok(())
    }

    /// Drops the cached entry at `key`.
    ///
    /// Call it after updating the primary store so the next read reloads.
    pub fn invalidate(&self, key: &str) -> Result<()> {
        self.store.delete(key)?;
        debug!(key = %key, "cache entry invalidated");
        Ok(())
    }

    /// Pushes the store-level expiry of `key` to `ttl` from now.
    ///
    /// Returns `false` if the key does not exist (anymore).
    pub fn touch(&self, key: &str, ttl: Duration) -> Result<bool> {
        Ok(self.store.expire(key, ttl)?)
    }
}
