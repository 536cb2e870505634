//! Shop lookups in front of a slow "database", with the penetration guard.
//!
//! Run with `RUST_LOG=cacheguard_core=debug cargo run --example shop_lookup`.

use cacheguard::{BoxError, CacheClient, CacheConfig, MemoryStore, RebuildScheduler};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Shop {
    id: u64,
    name: String,
    area: String,
    score: u32,
}

/// Stand-in for the primary store.
struct ShopTable {
    rows: HashMap<u64, (String, String, u32)>,
    queries: AtomicUsize,
}

impl ShopTable {
    fn new() -> Self {
        let mut rows = HashMap::new();
        rows.insert(1, ("Tea House".to_string(), "Riverside".to_string(), 46));
        rows.insert(2, ("Noodle Bar".to_string(), "Old Town".to_string(), 43));
        Self {
            rows,
            queries: AtomicUsize::new(0),
        }
    }

    fn find(&self, id: &u64) -> Result<Option<Shop>, BoxError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        Ok(self.rows.get(id).map(|(name, area, score)| Shop {
            id: *id,
            name: name.clone(),
            area: area.clone(),
            score: *score,
        }))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = CacheConfig::load(None::<&str>)?.with_null_ttl(Duration::from_secs(2));
    let scheduler = Arc::new(RebuildScheduler::from_config(&config)?);
    let client = CacheClient::new(Arc::new(MemoryStore::new()), scheduler, config)?;
    let table = ShopTable::new();

    for id in [1, 1, 2, 404, 404, 404] {
        let started = Instant::now();
        let shop: Option<Shop> = client.get_or_load_default("cache:shop:", &id, |id| table.find(id))?;
        info!(id, found = shop.is_some(), elapsed_us = started.elapsed().as_micros() as u64, "lookup");
    }

    info!(queries = table.queries.load(Ordering::SeqCst), "primary store queries");

    let stats = client.stats();
    info!(
        hits = stats.hits(),
        null_hits = stats.null_hits(),
        misses = stats.misses(),
        hit_rate = stats.hit_rate(),
        "cache statistics"
    );

    // Writes go to the primary store first, then drop the cached copy.
    client.invalidate("cache:shop:1")?;
    let _: Option<Shop> = client.get_or_load_default("cache:shop:", &1, |id| table.find(id))?;
    info!(queries = table.queries.load(Ordering::SeqCst), "after invalidation");

    Ok(())
}
