//! Error types returned by the cache client and its collaborators.
//!
//! Only genuine I/O, codec and loader failures are errors. A key that is not
//! cached, a confirmed-absent id or a lock held by someone else are ordinary
//! outcomes and are modelled with `Option` instead.

use thiserror::Error;

/// Boxed error produced by a loader callback.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = CacheError> = std::result::Result<T, E>;

/// Failure of a key-value store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Generic backend failure, e.g. a lost connection or a timeout.
    #[error("store `{op}` failed: {message}")]
    Backend {
        /// The protocol operation that failed (`get`, `set`, ...).
        op: &'static str,
        /// Human readable cause reported by the backend.
        message: String,
    },

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl StoreError {
    /// Creates a [`StoreError::Backend`] for the given operation.
    pub fn backend(op: &'static str, message: impl Into<String>) -> Self {
        StoreError::Backend {
            op,
            message: message.into(),
        }
    }
}

/// Failure to convert a value to or from its stored string form.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode value stored at `{key}`: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Error returned by foreground cache client operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The primary-store loader failed while filling the cache.
    #[error("loader failed: {0}")]
    Loader(#[source] BoxError),
}

/// Failure to build or validate a [`CacheConfig`](crate::CacheConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),

    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}
