//! Cache client configuration.
//!
//! Defaults can be overridden from an optional config file and from
//! `CACHEGUARD__*` environment variables, e.g. `CACHEGUARD__NULL_TTL_MS=30000`.
//! Every TTL is kept in whole milliseconds.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_TTL_MS: u64 = 30 * 60 * 1000;
const DEFAULT_NULL_TTL_MS: u64 = 2 * 60 * 1000;
const DEFAULT_LOCK_TTL_MS: u64 = 10 * 1000;
const DEFAULT_LOGICAL_TTL_MS: u64 = 30 * 60 * 1000;
const DEFAULT_REBUILD_WORKERS: usize = 10;
const DEFAULT_LOCK_KEY_PREFIX: &str = "lock:";

const ENV_PREFIX: &str = "CACHEGUARD";

/// Tunables of a [`CacheClient`](crate::CacheClient) and its rebuild scheduler.
///
/// TTLs passed to individual client calls always win; these values are what
/// the `*_default` convenience methods, the null placeholder and the lock use.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL of positive entries written by `get_or_load`.
    pub ttl_ms: u64,
    /// TTL of null placeholders. Usually much shorter than `ttl_ms`.
    pub null_ttl_ms: u64,
    /// TTL of rebuild locks; bounds how long a crashed holder blocks rebuilds.
    pub lock_ttl_ms: u64,
    /// Logical TTL of entries written by the logical-expiry strategy.
    pub logical_ttl_ms: u64,
    /// Number of rebuild worker threads.
    pub rebuild_workers: usize,
    /// Prefix of rebuild lock keys.
    pub lock_key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            null_ttl_ms: DEFAULT_NULL_TTL_MS,
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
            logical_ttl_ms: DEFAULT_LOGICAL_TTL_MS,
            rebuild_workers: DEFAULT_REBUILD_WORKERS,
            lock_key_prefix: DEFAULT_LOCK_KEY_PREFIX.to_string(),
        }
    }
}

/// Converts `ttl` to milliseconds, rounding a non-zero sub-millisecond
/// remainder up so that no positive TTL collapses to zero.
fn to_millis(ttl: Duration) -> u64 {
    let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    if ttl.subsec_nanos() % 1_000_000 != 0 {
        millis.saturating_add(1)
    } else {
        millis
    }
}

fn require_positive(key: &'static str, value: u64, reason: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: reason.to_string(),
        });
    }
    Ok(())
}

impl CacheConfig {
    /// Loads the configuration from `path` (if given and present) and the
    /// environment, on top of the defaults, then validates it.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cacheguard_core::CacheConfig;
    ///
    /// let config = CacheConfig::load(Some("cacheguard.toml")).unwrap();
    /// println!("null placeholders live {:?}", config.null_ttl());
    /// ```
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.as_ref()).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: CacheConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that would make the client misbehave.
    ///
    /// Every TTL and the worker count must be non-zero. A zero null TTL
    /// writes placeholders that are already expired, and a zero lock TTL
    /// writes locks that anybody can take again at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("ttl_ms", self.ttl_ms, "must be greater than zero")?;
        require_positive(
            "null_ttl_ms",
            self.null_ttl_ms,
            "a placeholder that is expired on write does not stop repeated loads",
        )?;
        require_positive(
            "lock_ttl_ms",
            self.lock_ttl_ms,
            "a lock that is expired on write does not exclude anybody",
        )?;
        require_positive("logical_ttl_ms", self.logical_ttl_ms, "must be greater than zero")?;
        if self.rebuild_workers == 0 {
            return Err(ConfigError::Invalid {
                key: "rebuild_workers",
                reason: "at least one worker is needed to run rebuilds".to_string(),
            });
        }
        Ok(())
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = to_millis(ttl);
        self
    }

    pub fn with_null_ttl(mut self, ttl: Duration) -> Self {
        self.null_ttl_ms = to_millis(ttl);
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl_ms = to_millis(ttl);
        self
    }

    pub fn with_logical_ttl(mut self, ttl: Duration) -> Self {
        self.logical_ttl_ms = to_millis(ttl);
        self
    }

    pub fn with_rebuild_workers(mut self, workers: usize) -> Self {
        self.rebuild_workers = workers;
        self
    }

    pub fn with_lock_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.lock_key_prefix = prefix.into();
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn null_ttl(&self) -> Duration {
        Duration::from_millis(self.null_ttl_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn logical_ttl(&self) -> Duration {
        Duration::from_millis(self.logical_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl(), Duration::from_secs(1800));
        assert_eq!(config.null_ttl(), Duration::from_secs(120));
        assert_eq!(config.lock_ttl(), Duration::from_secs(10));
        assert_eq!(config.logical_ttl(), Duration::from_secs(1800));
        assert_eq!(config.rebuild_workers, 10);
        assert_eq!(config.lock_key_prefix, "lock:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::default()
            .with_ttl(Duration::from_secs(60))
            .with_null_ttl(Duration::from_secs(5))
            .with_lock_ttl(Duration::from_secs(3))
            .with_logical_ttl(Duration::from_secs(20))
            .with_rebuild_workers(2)
            .with_lock_key_prefix("mutex:");

        assert_eq!(config.ttl_ms, 60_000);
        assert_eq!(config.null_ttl_ms, 5_000);
        assert_eq!(config.lock_ttl_ms, 3_000);
        assert_eq!(config.logical_ttl_ms, 20_000);
        assert_eq!(config.rebuild_workers, 2);
        assert_eq!(config.lock_key_prefix, "mutex:");
    }

    #[test]
    fn test_sub_second_ttls_are_kept() {
        let config = CacheConfig::default()
            .with_ttl(Duration::from_millis(750))
            .with_null_ttl(Duration::from_millis(500))
            .with_lock_ttl(Duration::from_millis(500))
            .with_logical_ttl(Duration::from_millis(250));

        assert_eq!(config.ttl(), Duration::from_millis(750));
        assert_eq!(config.null_ttl(), Duration::from_millis(500));
        assert_eq!(config.lock_ttl(), Duration::from_millis(500));
        assert_eq!(config.logical_ttl(), Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sub_millisecond_ttl_rounds_up() {
        let config = CacheConfig::default()
            .with_null_ttl(Duration::from_micros(10))
            .with_lock_ttl(Duration::from_micros(1_500));

        assert_eq!(config.null_ttl(), Duration::from_millis(1));
        assert_eq!(config.lock_ttl(), Duration::from_millis(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = CacheConfig::default().with_rebuild_workers(0);
        match config.validate() {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "rebuild_workers"),
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_zero_lock_ttl() {
        let config = CacheConfig::default().with_lock_ttl(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "lock_ttl_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_null_ttl() {
        let config = CacheConfig::default().with_null_ttl(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "null_ttl_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_ttl_and_logical_ttl() {
        let config = CacheConfig::default().with_ttl(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "ttl_ms", .. })
        ));

        let config = CacheConfig::default().with_logical_ttl(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "logical_ttl_ms",
                ..
            })
        ));
    }

    #[test]
    #[serial]
    fn test_load_from_file_with_defaults_for_missing_fields() {
        let path = std::env::temp_dir().join(format!(
            "cacheguard-config-{}.toml",
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "null_ttl_ms = 30000").unwrap();
        writeln!(file, "lock_ttl_ms = 500").unwrap();
        writeln!(file, "rebuild_workers = 4").unwrap();
        drop(file);

        let config = CacheConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.null_ttl(), Duration::from_secs(30));
        assert_eq!(config.lock_ttl(), Duration::from_millis(500));
        assert_eq!(config.rebuild_workers, 4);
        assert_eq!(config.ttl_ms, DEFAULT_TTL_MS);
    }

    #[test]
    #[serial]
    fn test_load_rejects_zero_null_ttl_from_file() {
        let path = std::env::temp_dir().join(format!(
            "cacheguard-config-zero-{}.toml",
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "null_ttl_ms = 0").unwrap();
        drop(file);

        let result = CacheConfig::load(Some(&path));
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                key: "null_ttl_ms",
                ..
            })
        ));
    }

    #[test]
    #[serial]
    fn test_load_without_sources_gives_defaults() {
        let config = CacheConfig::load(None::<&Path>).unwrap();
        assert_eq!(config, CacheConfig::default());
    }
}
