//! Background rebuild of a logically expired entry.

use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error};

use crate::cache_entry::CacheEntry;
use crate::codec;
use crate::error::{BoxError, CacheError};
use crate::lock::LockGuard;
use crate::store::KvStore;
#[cfg(feature = "stats")]
use crate::CacheStats;

/// Writes `entry` at `key` with no store-level TTL.
pub(crate) fn write_envelope<S, T>(store: &S, key: &str, entry: &CacheEntry<T>) -> Result<(), CacheError>
where
    S: KvStore + ?Sized,
    T: Serialize,
{
    let raw = codec::encode(entry)?;
    store.set(key, &raw, None)?;
    Ok(())
}

/// One recomputation of one key, owned by a rebuild worker while it runs.
///
/// The lock guarding the key travels with the task and is released when the
/// task is dropped: after it ran, if it panicked, or if the scheduler
/// rejected it without running it.
pub(crate) struct RebuildTask<S: KvStore, Id, F> {
    pub(crate) key: String,
    pub(crate) id: Id,
    pub(crate) loader: F,
    pub(crate) logical_ttl: Duration,
    pub(crate) store: Arc<S>,
    pub(crate) guard: LockGuard<S>,
    #[cfg(feature = "stats")]
    pub(crate) stats: Arc<CacheStats>,
}

impl<S, Id, F, T> RebuildTask<S, Id, F>
where
    S: KvStore,
    Id: Display,
    F: FnOnce(&Id) -> Result<Option<T>, BoxError>,
    T: Serialize,
{
    /// Loads a fresh value and rewrites the envelope.
    ///
    /// A loader error or panic, or a failed write, is logged and leaves the
    /// stale entry in place so the next stale reader can try again.
    pub(crate) fn run(self) {
        let started = Instant::now();
        let loader = self.loader;
        let id = self.id;

        let loaded = match catch_unwind(AssertUnwindSafe(|| loader(&id))) {
            Ok(loaded) => loaded,
            Err(_) => Err(BoxError::from("loader panicked")),
        };

        let outcome = loaded.map_err(CacheError::Loader).and_then(|value| {
            let entry = match value {
                Some(value) => CacheEntry::wrap(value, self.logical_ttl),
                None => CacheEntry::null(self.logical_ttl),
            };
            write_envelope(self.store.as_ref(), &self.key, &entry).map(|()| entry.is_null())
        });

        match outcome {
            Ok(absent) => {
                debug!(
                    key = %self.key,
                    id = %id,
                    absent,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "cache entry rebuilt"
                );
            }
            Err(err) => {
                #[cfg(feature = "stats")]
                self.stats.record_rebuild_failure();
                error!(key = %self.key, error = %err, "cache rebuild failed, keeping stale entry");
            }
        }

        drop(self.guard);
    }
}
