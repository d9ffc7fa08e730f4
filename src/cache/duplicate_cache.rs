use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::boundary::DuplicateStore;
use crate::error::{AppError, Result};
use crate::observability::{get_metrics, LatencyTimer};

/// Compare-and-delete, so a late release never frees another owner's window.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Cache statistics for monitoring.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub releases: AtomicU64,
    pub errors: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn get_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn get_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn get_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Redis-backed duplicate window shared by every boundary instance.
pub struct RedisDuplicateStore {
    client: redis::Client,
    key_prefix: String,
    stats: Arc<CacheStats>,
}

impl RedisDuplicateStore {
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            stats: Arc::new(CacheStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        self.stats.clone()
    }

    fn make_key(&self, content_hash: &str) -> String {
        format!("{}:dup:{}", self.key_prefix, content_hash)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                self.stats.record_error();
                AppError::Redis(e)
            })
    }
}

#[async_trait]
impl DuplicateStore for RedisDuplicateStore {
    async fn set_if_absent(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let timer = LatencyTimer::new();
        let mut conn = self.connection().await?;
        let key = self.make_key(key);

        let result: Option<String> = conn
            .set_options(
                &key,
                owner,
                redis::SetOptions::default()
                    .conditional_set(redis::ExistenceCheck::NX)
                    .with_expiration(redis::SetExpiry::PX(ttl.as_millis().max(1) as usize)),
            )
            .await
            .map_err(|e| {
                self.stats.record_error();
                get_metrics().record_redis_operation("set_nx", timer.elapsed_ms(), false);
                AppError::Redis(e)
            })?;

        get_metrics().record_redis_operation("set_nx", timer.elapsed_ms(), true);
        let created = result.is_some();
        if created {
            self.stats.record_miss();
        } else {
            self.stats.record_hit();
        }
        Ok(created)
    }

    async fn release(&self, key: &str, owner: &str) -> Result<bool> {
        let timer = LatencyTimer::new();
        let mut conn = self.connection().await?;
        let key = self.make_key(key);

        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&key)
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                self.stats.record_error();
                get_metrics().record_redis_operation("release", timer.elapsed_ms(), false);
                AppError::Redis(e)
            })?;

        get_metrics().record_redis_operation("release", timer.elapsed_ms(), true);
        if deleted > 0 {
            self.stats.record_release();
        }
        Ok(deleted > 0)
    }
}

struct Reservation {
    owner: String,
    expires_at: Instant,
}

/// Single-process store with the same semantics, for tests and local runs.
#[derive(Clone, Default)]
pub struct MemoryDuplicateStore {
    entries: Arc<Mutex<HashMap<String, Reservation>>>,
    stats: Arc<CacheStats>,
}

impl MemoryDuplicateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        self.stats.clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .get(key)
            .map(|r| r.expires_at > now)
            .unwrap_or(false)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Reservation>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DuplicateStore for MemoryDuplicateStore {
    async fn set_if_absent(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.lock();

        if let Some(existing) = entries.get(key) {
            if existing.expires_at > now {
                self.stats.record_hit();
                return Ok(false);
            }
        }

        entries.insert(
            key.to_string(),
            Reservation {
                owner: owner.to_string(),
                expires_at: now + ttl,
            },
        );
        self.stats.record_miss();
        Ok(true)
    }

    async fn release(&self, key: &str, owner: &str) -> Result<bool> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(existing) if existing.owner == owner => {
                entries.remove(key);
                self.stats.record_release();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats() {
        let stats = CacheStats::new();

        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_error();

        assert_eq!(stats.get_hits(), 2);
        assert_eq!(stats.get_misses(), 1);
        assert_eq!(stats.get_errors(), 1);
        assert!((stats.hit_rate() - 0.666).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_memory_store_set_if_absent() {
        let store = MemoryDuplicateStore::new();
        let ttl = Duration::from_secs(30);

        assert!(store.set_if_absent("h", "owner-1", ttl).await.unwrap());
        assert!(!store.set_if_absent("h", "owner-2", ttl).await.unwrap());
        assert!(store.contains("h"));
    }

    #[tokio::test]
    async fn test_memory_store_release_requires_owner() {
        let store = MemoryDuplicateStore::new();
        let ttl = Duration::from_secs(30);
        store.set_if_absent("h", "owner-1", ttl).await.unwrap();

        assert!(!store.release("h", "owner-2").await.unwrap());
        assert!(store.contains("h"));
        assert!(store.release("h", "owner-1").await.unwrap());
        assert!(!store.contains("h"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_window_expires() {
        let store = MemoryDuplicateStore::new();
        let ttl = Duration::from_secs(30);
        store.set_if_absent("h", "owner-1", ttl).await.unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(store.set_if_absent("h", "owner-2", ttl).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at REDIS_URL"]
    async fn test_redis_store_round_trip() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let store = RedisDuplicateStore::new(redis::Client::open(url).unwrap(), "test");
        let key = uuid::Uuid::new_v4().to_string();
        let ttl = Duration::from_secs(5);

        assert!(store.set_if_absent(&key, "a", ttl).await.unwrap());
        assert!(!store.set_if_absent(&key, "b", ttl).await.unwrap());
        assert!(!store.release(&key, "b").await.unwrap());
        assert!(store.release(&key, "a").await.unwrap());
    }
}
