//! # Cacheguard
//!
//! A read-through cache client for slow primary stores, backed by a shared
//! key-value store such as Redis.
//!
//! ## Features
//!
//! - **Penetration guard**: ids the primary store does not know are cached as
//!   a short-lived null placeholder, so they cannot be used to hammer it
//! - **Stampede guard**: hot entries expire logically, are served stale while
//!   exactly one background worker rebuilds them, and never block readers
//! - **Distributed lock**: token-verified, TTL-bounded and safe to release late
//! - **Bounded rebuilds**: one process-wide pool of named worker threads
//! - **Configuration**: defaults, a TOML file and `CACHEGUARD__*` environment
//!   variables
//! - **Statistics**: hit, miss and rebuild counters (`stats` feature, on by
//!   default)
//!
//! ## Quick Start
//!
//! ```rust
//! use cacheguard::{CacheClient, CacheConfig, MemoryStore, RebuildScheduler};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct Shop {
//!     id: u64,
//!     name: String,
//! }
//!
//! let config = CacheConfig::default();
//! let scheduler = Arc::new(RebuildScheduler::from_config(&config).unwrap());
//! let client = CacheClient::new(Arc::new(MemoryStore::new()), scheduler, config).unwrap();
//!
//! // Penetration-safe lookup: the loader runs only on a miss.
//! let shop: Option<Shop> = client
//!     .get_or_load_default("cache:shop:", &1, |id| {
//!         Ok(Some(Shop { id: *id, name: "Tea House".into() }))
//!     })
//!     .unwrap();
//! assert_eq!(shop.unwrap().name, "Tea House");
//! ```
//!
//! ## Hot Keys
//!
//! Entries read through the logical-expiry strategy must be pre-populated.
//! Once stale, they keep being served until a background rebuild replaces
//! them:
//!
//! ```rust
//! use cacheguard::{CacheClient, MemoryStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # let scheduler = Arc::new(cacheguard::RebuildScheduler::new(1).unwrap());
//! # let client = CacheClient::new(Arc::new(MemoryStore::new()), scheduler, Default::default()).unwrap();
//! client
//!     .warm_up("cache:shop:", &7, |id| Ok(Some(format!("shop {}", id))), Duration::from_secs(30))
//!     .unwrap();
//!
//! let name: Option<String> = client
//!     .get_or_load_with_logical_expiry(
//!         "cache:shop:",
//!         7,
//!         |id| Ok(Some(format!("shop {}", id))),
//!         Duration::from_secs(30),
//!     )
//!     .unwrap();
//! assert_eq!(name.as_deref(), Some("shop 7"));
//! ```
//!
//! ## Redis
//!
//! Enable the `redis` feature and use `RedisStore::open("redis://127.0.0.1/")`
//! as the store. Lock release runs as one Lua script on the server.
//!
pub use cacheguard_core::*;
