use std::sync::atomic::{AtomicU64, Ordering};

/// Cache client statistics.
///
/// Tracks how reads were answered and how background rebuilds went, using
/// atomic counters with `Relaxed` ordering so recording never contends.
///
/// # Counters
///
/// * `hits` - Reads answered with a cached value (fresh or stale)
/// * `stale_hits` - The subset of `hits` that served a logically expired value
/// * `null_hits` - Reads answered by a null placeholder (penetration guard)
/// * `misses` - Reads that found nothing usable in the store
/// * `rebuilds_submitted` - Background rebuilds handed to the scheduler
/// * `rebuild_failures` - Background rebuilds whose loader or write failed
///
/// # Examples
///
/// ```
/// use cacheguard_core::CacheStats;
///
/// let stats = CacheStats::new();
///
/// stats.record_hit();
/// stats.record_null_hit();
/// stats.record_miss();
///
/// assert_eq!(stats.hits(), 1);
/// assert_eq!(stats.null_hits(), 1);
/// assert_eq!(stats.total_accesses(), 3);
/// assert!((stats.hit_rate() - 0.6666).abs() < 0.001);
/// ```
#[derive(Debug)]
pub struct CacheStats {
    hits: AtomicU64,
    stale_hits: AtomicU64,
    null_hits: AtomicU64,
    misses: AtomicU64,
    rebuilds_submitted: AtomicU64,
    rebuild_failures: AtomicU64,
}

impl CacheStats {
    /// Creates a new `CacheStats` instance with zero counters.
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            stale_hits: AtomicU64::new(0),
            null_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            rebuilds_submitted: AtomicU64::new(0),
            rebuild_failures: AtomicU64::new(0),
        }
    }

    /// Records a read answered with a fresh cached value.
    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a read answered with a logically expired value.
    ///
    /// Counts towards both `hits` and `stale_hits`.
    #[inline]
    pub fn record_stale_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.stale_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a read answered by a null placeholder.
    #[inline]
    pub fn record_null_hit(&self) {
        self.null_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a read that found nothing usable in the store.
    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rebuild_submitted(&self) {
        self.rebuilds_submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rebuild_failure(&self) {
        self.rebuild_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn stale_hits(&self) -> u64 {
        self.stale_hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn null_hits(&self) -> u64 {
        self.null_hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rebuilds_submitted(&self) -> u64 {
        self.rebuilds_submitted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rebuild_failures(&self) -> u64 {
        self.rebuild_failures.load(Ordering::Relaxed)
    }

    /// Returns the total number of reads (hits + null hits + misses).
    #[inline]
    pub fn total_accesses(&self) -> u64 {
        self.hits() + self.null_hits() + self.misses()
    }

    /// Fraction of reads answered without consulting the primary store.
    ///
    /// Null-placeholder hits count as hits: they are exactly the lookups the
    /// penetration guard keeps off the primary store. Returns 0.0 if there
    /// have been no reads.
    #[inline]
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            (self.hits() + self.null_hits()) as f64 / total as f64
        }
    }

    #[inline]
    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.stale_hits.store(0, Ordering::Relaxed);
        self.null_hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.rebuilds_submitted.store(0, Ordering::Relaxed);
        self.rebuild_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CacheStats {
    fn clone(&self) -> Self {
        Self {
            hits: AtomicU64::new(self.hits()),
            stale_hits: AtomicU64::new(self.stale_hits()),
            null_hits: AtomicU64::new(self.null_hits()),
            misses: AtomicU64::new(self.misses()),
            rebuilds_submitted: AtomicU64::new(self.rebuilds_submitted()),
            rebuild_failures: AtomicU64::new(self.rebuild_failures()),
        }
    }
}
