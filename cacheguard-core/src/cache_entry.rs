use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Envelope written by the logical-expiry strategy.
///
/// Wraps a value with the wall-clock instant after which it is considered
/// stale. The envelope is stored with no store-level TTL, so a stale copy
/// stays servable while a background rebuild is in flight; expiry is only
/// ever checked here, by the application.
///
/// Entries written by the TTL strategy are stored bare (no envelope) and
/// rely on the store's own expiry, so every `CacheEntry` carries a
/// `logical_expiry`.
///
/// # Type Parameters
///
/// * `T` - The type of the cached value
///
/// # Fields
///
/// * `value` - The cached value, or `None` for the null marker (the primary
///   store confirmed the id absent during the last rebuild). The null marker
///   is encoded by leaving the field out, so a value that itself serializes
///   to `null` (e.g. `None::<u32>`) still reads back as a value.
/// * `logical_expiry` - When the entry becomes stale
///
/// # Examples
///
/// ```
/// use cacheguard_core::CacheEntry;
/// use std::time::Duration;
///
/// let entry = CacheEntry::wrap("data", Duration::from_secs(60));
/// assert_eq!(entry.value, Some("data"));
/// assert!(!entry.is_expired());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct CacheEntry<T> {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "present_value")]
    pub value: Option<T>,
    pub logical_expiry: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Wraps `value` so that it goes stale `logical_ttl` from now.
    ///
    /// # Arguments
    ///
    /// * `value` - The value to cache
    /// * `logical_ttl` - How long the value stays fresh
    pub fn wrap(value: T, logical_ttl: Duration) -> Self {
        Self::with_expiry(Some(value), expiry_from_now(logical_ttl))
    }

    /// Creates an envelope holding the null marker, fresh for `logical_ttl`.
    pub fn null(logical_ttl: Duration) -> Self {
        Self::with_expiry(None, expiry_from_now(logical_ttl))
    }

    /// Creates an envelope with an explicit expiry instant.
    ///
    /// Mostly useful to pre-populate or inspect stale entries.
    ///
    /// # Examples
    ///
    /// ```
    /// use cacheguard_core::CacheEntry;
    /// use chrono::{Duration, Utc};
    ///
    /// let stale = CacheEntry::with_expiry(Some(7), Utc::now() - Duration::seconds(5));
    /// assert!(stale.is_expired());
    /// ```
    pub fn with_expiry(value: Option<T>, logical_expiry: DateTime<Utc>) -> Self {
        Self {
            value,
            logical_expiry,
        }
    }

    /// Returns true once the logical expiry has passed.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns true if the entry is stale at `now`.
    ///
    /// An entry whose expiry equals `now` is stale.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.logical_expiry <= now
    }

    /// Returns true if the envelope holds the null marker.
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

/// Serializes a present value as `T` itself; absence is the missing field.
mod present_value {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(value) => value.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Some)
    }
}

/// `now + ttl`, saturating at the largest representable instant.
fn expiry_from_now(ttl: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new_entry_not_expired() {
        let entry = CacheEntry::wrap(42, Duration::from_secs(10));
        assert_eq!(entry.value, Some(42));
        assert!(!entry.is_expired());
        assert!(!entry.is_null());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::wrap("data", Duration::from_millis(50));
        assert!(!entry.is_expired());
        thread::sleep(Duration::from_millis(80));
        assert!(entry.is_expired());
    }

    #[test]
    fn test_zero_ttl_is_immediately_stale() {
        let entry = CacheEntry::wrap(1u8, Duration::ZERO);
        assert!(entry.is_expired());
    }

    #[test]
    fn test_expiry_boundary_is_stale() {
        let at = Utc::now();
        let entry = CacheEntry::with_expiry(Some(1), at);
        assert!(entry.is_expired_at(at));
        assert!(!entry.is_expired_at(at - chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let entry = CacheEntry::wrap((), Duration::from_secs(u64::MAX));
        assert_eq!(entry.logical_expiry, DateTime::<Utc>::MAX_UTC);
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_null_entry() {
        let entry: CacheEntry<String> = CacheEntry::null(Duration::from_secs(5));
        assert!(entry.is_null());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_serialized_shape() {
        let at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = CacheEntry::with_expiry(Some(vec![1, 2]), at);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["value"], serde_json::json!([1, 2]));
        let stored_at = json["logical_expiry"].as_str().unwrap();
        assert_eq!(
            DateTime::parse_from_rfc3339(stored_at).unwrap().with_timezone(&Utc),
            at
        );

        let back: CacheEntry<Vec<i32>> = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_null_marker_leaves_value_out() {
        let entry: CacheEntry<u32> = CacheEntry::null(Duration::from_secs(5));
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("value").is_none());

        let back: CacheEntry<u32> = serde_json::from_value(json).unwrap();
        assert!(back.is_null());
    }

    #[test]
    fn test_null_like_values_survive_encoding() {
        let entry = CacheEntry::wrap(None::<u32>, Duration::from_secs(5));
        let raw = serde_json::to_string(&entry).unwrap();
        assert!(raw.contains("\"value\":null"));

        let back: CacheEntry<Option<u32>> = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.value, Some(None));
        assert!(!back.is_null());
        assert_eq!(back, entry);

        let unit = CacheEntry::wrap((), Duration::from_secs(5));
        let back: CacheEntry<()> = serde_json::from_str(&serde_json::to_string(&unit).unwrap()).unwrap();
        assert_eq!(back.value, Some(()));
    }
}
