//! Many readers hammering one hot key right after it went stale.
//!
//! Only one rebuild reaches the primary store; every reader gets an answer
//! immediately.

use cacheguard::{CacheClient, CacheConfig, MemoryStore, RebuildScheduler};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Shop {
    id: u64,
    name: String,
    revision: usize,
}

static QUERIES: AtomicUsize = AtomicUsize::new(0);

fn load_shop(id: &u64) -> Result<Option<Shop>, cacheguard::BoxError> {
    let revision = QUERIES.fetch_add(1, Ordering::SeqCst) + 1;
    thread::sleep(Duration::from_millis(200));
    Ok(Some(Shop {
        id: *id,
        name: "Tea House".to_string(),
        revision,
    }))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cacheguard_core=debug,info")),
        )
        .with_thread_names(true)
        .init();

    let config = CacheConfig::default().with_rebuild_workers(4);
    let scheduler = Arc::new(RebuildScheduler::from_config(&config)?);
    let client = CacheClient::new(Arc::new(MemoryStore::new()), Arc::clone(&scheduler), config)?;

    // Pre-populate with an entry that goes stale almost immediately.
    client.warm_up("cache:shop:", &1, load_shop, Duration::from_millis(100))?;
    thread::sleep(Duration::from_millis(150));

    let readers = 100;
    let barrier = Arc::new(Barrier::new(readers));
    let handles: Vec<_> = (0..readers)
        .map(|_| {
            let client = client.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let started = Instant::now();
                let shop: Option<Shop> = client
                    .get_or_load_with_logical_expiry("cache:shop:", 1u64, load_shop, Duration::from_secs(30))
                    .ok()
                    .flatten();
                (shop.map(|s| s.revision), started.elapsed())
            })
        })
        .collect();

    let mut slowest = Duration::ZERO;
    for handle in handles {
        if let Ok((_, elapsed)) = handle.join() {
            slowest = slowest.max(elapsed);
        }
    }
    info!(readers, slowest_us = slowest.as_micros() as u64, "all readers answered");

    scheduler.wait_idle(Duration::from_secs(5));
    let shop: Option<Shop> = client.get_or_load_with_logical_expiry_default("cache:shop:", 1u64, load_shop)?;
    info!(
        revision = shop.map(|s| s.revision),
        queries = QUERIES.load(Ordering::SeqCst),
        "after rebuild"
    );

    Ok(())
}
