use cacheguard::{codec, BoxError, CacheClient, CacheConfig, CacheEntry, KvStore, MemoryStore, RebuildScheduler};
use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Shop {
    id: u64,
    name: String,
}

fn new_client() -> CacheClient<MemoryStore> {
    let config = CacheConfig::default().with_rebuild_workers(4);
    let scheduler = Arc::new(RebuildScheduler::from_config(&config).unwrap());
    CacheClient::new(Arc::new(MemoryStore::new()), scheduler, config).unwrap()
}

fn store_stale(client: &CacheClient<MemoryStore>, id: u64, name: &str) {
    // Zero logical TTL: stale as soon as it is written
    let entry = CacheEntry::wrap(
        Shop {
            id,
            name: name.to_string(),
        },
        Duration::ZERO,
    );
    let raw = codec::encode(&entry).unwrap();
    client
        .store()
        .set(&format!("cache:shop:{}", id), &raw, None)
        .unwrap();
}

#[test]
#[serial]
fn test_hot_key_is_rebuilt_exactly_once() {
    static DB_CALLS: AtomicUsize = AtomicUsize::new(0);
    const READERS: usize = 50;

    let client = new_client();
    store_stale(&client, 1, "Old Name");

    let barrier = Arc::new(Barrier::new(READERS));
    let handles: Vec<_> = (0..READERS)
        .map(|_| {
            let client = client.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let started = Instant::now();
                let value: Option<Shop> = client
                    .get_or_load_with_logical_expiry(
                        "cache:shop:",
                        1u64,
                        |id| {
                            DB_CALLS.fetch_add(1, Ordering::SeqCst);
                            // Slow primary store
                            thread::sleep(Duration::from_millis(300));
                            Ok(Some(Shop {
                                id: *id,
                                name: "New Name".to_string(),
                            }))
                        },
                        Duration::from_secs(60),
                    )
                    .unwrap();
                (value, started.elapsed())
            })
        })
        .collect();

    for handle in handles {
        let (value, elapsed) = handle.join().unwrap();
        // Every reader got the stale value without waiting for the rebuild
        assert_eq!(value.unwrap().name, "Old Name");
        assert!(elapsed < Duration::from_millis(250), "reader blocked for {:?}", elapsed);
    }

    assert!(client.scheduler().wait_idle(Duration::from_secs(5)));
    assert_eq!(DB_CALLS.load(Ordering::SeqCst), 1);

    // The rebuilt value is now served fresh
    let value: Option<Shop> = client
        .get_or_load_with_logical_expiry(
            "cache:shop:",
            1u64,
            |_| panic!("entry is fresh again"),
            Duration::from_secs(60),
        )
        .unwrap();
    assert_eq!(value.unwrap().name, "New Name");
    assert_eq!(client.store().get("lock:Shop:1").unwrap(), None);
}

#[test]
#[serial]
fn test_distinct_keys_rebuild_independently() {
    static DB_CALLS: AtomicUsize = AtomicUsize::new(0);

    let client = new_client();
    for id in 1..=3 {
        store_stale(&client, id, "Old");
    }

    for id in 1..=3u64 {
        let value: Option<Shop> = client
            .get_or_load_with_logical_expiry(
                "cache:shop:",
                id,
                |id| {
                    DB_CALLS.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(Shop {
                        id: *id,
                        name: "New".to_string(),
                    }))
                },
                Duration::from_secs(60),
            )
            .unwrap();
        assert_eq!(value.unwrap().name, "Old");
    }

    assert!(client.scheduler().wait_idle(Duration::from_secs(5)));
    assert_eq!(DB_CALLS.load(Ordering::SeqCst), 3);
}

#[test]
#[serial]
fn test_missing_entry_is_not_loaded() {
    static DB_CALLS: AtomicUsize = AtomicUsize::new(0);

    let client = new_client();
    let value: Option<Shop> = client
        .get_or_load_with_logical_expiry(
            "cache:shop:",
            99u64,
            |_| {
                DB_CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            },
            Duration::from_secs(60),
        )
        .unwrap();

    assert_eq!(value, None);
    assert!(client.scheduler().wait_idle(Duration::from_secs(1)));
    assert_eq!(DB_CALLS.load(Ordering::SeqCst), 0);
    assert_eq!(client.store().get("cache:shop:99").unwrap(), None);
}

#[test]
#[serial]
fn test_failed_rebuild_is_retried_by_next_reader() {
    static DB_CALLS: AtomicUsize = AtomicUsize::new(0);

    let client = new_client();
    store_stale(&client, 1, "Old");

    let flaky = |id: &u64| -> Result<Option<Shop>, BoxError> {
        // First call fails, second succeeds
        if DB_CALLS.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err("primary store timed out".into());
        }
        Ok(Some(Shop {
            id: *id,
            name: "New".to_string(),
        }))
    };

    let first: Option<Shop> = client
        .get_or_load_with_logical_expiry("cache:shop:", 1u64, flaky, Duration::from_secs(60))
        .unwrap();
    assert!(client.scheduler().wait_idle(Duration::from_secs(5)));
    assert_eq!(first.unwrap().name, "Old");

    // Stale entry survived and the lock was released
    let second: Option<Shop> = client
        .get_or_load_with_logical_expiry("cache:shop:", 1u64, flaky, Duration::from_secs(60))
        .unwrap();
    assert!(client.scheduler().wait_idle(Duration::from_secs(5)));
    assert_eq!(second.unwrap().name, "Old");

    let third: Option<Shop> = client
        .get_or_load_with_logical_expiry(
            "cache:shop:",
            1u64,
            |_| panic!("entry is fresh again"),
            Duration::from_secs(60),
        )
        .unwrap();
    assert_eq!(third.unwrap().name, "New");
    assert_eq!(DB_CALLS.load(Ordering::SeqCst), 2);
}

#[test]
#[serial]
fn test_rewriting_envelope_is_idempotent() {
    let client = new_client();
    let shop = Shop {
        id: 3,
        name: "Bakery".to_string(),
    };

    client
        .set_with_logical_expiry("cache:shop:3", &shop, Duration::from_secs(60))
        .unwrap();
    client
        .set_with_logical_expiry("cache:shop:3", &shop, Duration::from_secs(60))
        .unwrap();

    let entry: CacheEntry<Shop> = client.get("cache:shop:3").unwrap().unwrap();
    assert_eq!(entry.value, Some(shop));
    assert!(!entry.is_expired());
    // Envelopes never expire at the store level
    assert_eq!(client.store().ttl("cache:shop:3"), None);
}
