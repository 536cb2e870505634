//! # Cacheguard Core
//!
//! Building blocks for a read-through cache in front of a slow primary
//! store, backed by a shared key-value store.
//!
//! ## Features
//!
//! - **Penetration guard**: ids the primary store does not know are cached as
//!   a short-lived null placeholder
//! - **Stampede guard**: logically expiring entries are served stale while a
//!   single background worker rebuilds them
//! - **Distributed lock**: token-verified, TTL-bounded locks on any [`KvStore`]
//! - **Bounded rebuilds**: a fixed pool of named worker threads
//! - **Pluggable stores**: an in-process [`MemoryStore`] and, behind the
//!   `redis` feature, a Redis-backed store
//!
//! ## Module Organization
//!
//! - [`codec`] - JSON encoding and the null placeholder
//! - [`keys`] - Cache and lock key construction
//! - [`cache_entry`](CacheEntry) - The logical-expiry envelope
//! - [`client`](CacheClient) - The two read-through strategies
//! - [`lock`](DistributedLock) - Token-verified distributed lock
//! - [`scheduler`](RebuildScheduler) - Background rebuild workers
//! - [`store`](KvStore) - The store abstraction and its implementations
//!
mod cache_entry;
mod client;
mod config;
mod error;
mod lock;
mod memory_store;
mod rebuild;
mod scheduler;
mod store;

pub mod codec;
pub mod keys;

#[cfg(feature = "redis")]
mod redis_store;

#[cfg(feature = "stats")]
mod stats;

pub use cache_entry::CacheEntry;
pub use client::CacheClient;
pub use config::CacheConfig;
pub use error::{BoxError, CacheError, CodecError, ConfigError, Result, StoreError};
pub use lock::{DistributedLock, LockGuard, LockHandle};
pub use memory_store::MemoryStore;
pub use scheduler::RebuildScheduler;
pub use store::KvStore;

#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

#[cfg(feature = "stats")]
pub use stats::CacheStats;
