mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

use payment_guard::boundary::DuplicateStore;
use payment_guard::cache::{CacheStats, MemoryDuplicateStore, RedisDuplicateStore};

#[tokio::test]
async fn test_release_requires_matching_owner() {
    let store = MemoryDuplicateStore::new();
    let ttl = Duration::from_secs(30);

    assert!(store.set_if_absent("hash-1", "owner-a", ttl).await.unwrap());
    assert!(!store.set_if_absent("hash-1", "owner-b", ttl).await.unwrap());

    assert!(!store.release("hash-1", "owner-b").await.unwrap());
    assert!(store.contains("hash-1"));

    assert!(store.release("hash-1", "owner-a").await.unwrap());
    assert!(!store.contains("hash-1"));
    assert!(store.set_if_absent("hash-1", "owner-b", ttl).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_late_release_cannot_free_a_newer_window() {
    let store = MemoryDuplicateStore::new();

    assert!(store.set_if_absent("hash-2", "old", Duration::from_secs(1)).await.unwrap());
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(store.set_if_absent("hash-2", "new", Duration::from_secs(30)).await.unwrap());

    assert!(!store.release("hash-2", "old").await.unwrap());
    assert!(store.contains("hash-2"));
}

#[test]
fn test_cache_stats_concurrent_access() {
    let stats = Arc::new(CacheStats::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let stats = stats.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    stats.record_hit();
                    stats.record_miss();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(stats.get_hits(), 8000);
    assert_eq!(stats.get_misses(), 8000);
    assert!((stats.hit_rate() - 0.5).abs() < 0.01);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_store_sets_once_and_releases() {
    let store = RedisDuplicateStore::new(common::redis_client(), format!("test-{}", Uuid::new_v4()));
    let ttl = Duration::from_secs(5);

    assert!(store.set_if_absent("hash", "owner-a", ttl).await.unwrap());
    assert!(!store.set_if_absent("hash", "owner-b", ttl).await.unwrap());
    assert!(!store.release("hash", "owner-b").await.unwrap());
    assert!(store.release("hash", "owner-a").await.unwrap());

    let stats = store.stats();
    assert_eq!(stats.get_misses(), 1);
    assert_eq!(stats.get_hits(), 1);
}
