//! Ephemeral object cache with per-entry TTL, bounded by total bytes.

use super::RepositoryResult;
use async_trait::async_trait;
use bytes::Bytes;
use moka::{Expiry, future::Cache};
use std::time::{Duration, Instant};

/// Total payload bytes kept by [`MemoryCache::new`].
pub const DEFAULT_CACHE_CAPACITY: u64 = 256 * 1024 * 1024;

#[async_trait]
pub trait CacheRepository: Send + Sync {
    async fn cache_image(&self, key: &str, bytes: Bytes, ttl: Duration) -> RepositoryResult<()>;

    /// `Ok(None)` is a miss, not an error.
    async fn get_image(&self, key: &str) -> RepositoryResult<Option<Bytes>>;

    async fn delete_image(&self, key: &str) -> RepositoryResult<()>;
}

#[derive(Clone)]
struct Entry {
    bytes: Bytes,
    ttl: Duration,
}

/// Each entry lives for the TTL it was written with; an overwrite restarts it.
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process cache on `moka`. Expired entries read as misses and are
/// dropped by the cache's housekeeping; once the byte budget is exceeded the
/// least valuable entries are evicted.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, Entry>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `max_bytes` bounds the summed payload length of live entries.
    pub fn with_capacity(max_bytes: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|_key: &String, entry: &Entry| {
                u32::try_from(entry.bytes.len()).unwrap_or(u32::MAX)
            })
            .expire_after(EntryTtl)
            .build();
        Self { entries }
    }

    /// Live entries after pending evictions have been applied.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Payload bytes currently held.
    pub async fn weighted_size(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.weighted_size()
    }
}

#[async_trait]
impl CacheRepository for MemoryCache {
    async fn cache_image(&self, key: &str, bytes: Bytes, ttl: Duration) -> RepositoryResult<()> {
        self.entries
            .insert(key.to_string(), Entry { bytes, ttl })
            .await;
        Ok(())
    }

    async fn get_image(&self, key: &str) -> RepositoryResult<Option<Bytes>> {
        Ok(self.entries.get(key).await.map(|entry| entry.bytes))
    }

    async fn delete_image(&self, key: &str) -> RepositoryResult<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);
    const BRIEF: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn set_get_delete() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get_image("k").await.unwrap(), None);

        cache.cache_image("k", Bytes::from_static(b"v"), HOUR).await.unwrap();
        assert_eq!(cache.get_image("k").await.unwrap().unwrap(), "v");

        cache.delete_image("k").await.unwrap();
        assert_eq!(cache.get_image("k").await.unwrap(), None);
        cache.delete_image("k").await.unwrap();
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = MemoryCache::new();
        cache.cache_image("k", Bytes::from_static(b"v"), BRIEF).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get_image("k").await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_without_being_read() {
        let cache = MemoryCache::new();
        for i in 0..1000 {
            cache
                .cache_image(&format!("full-{i}"), Bytes::from_static(b"x"), BRIEF)
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache
            .cache_image("prev-live", Bytes::from_static(b"y"), HOUR)
            .await
            .unwrap();

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.weighted_size().await, 1);
    }

    #[tokio::test]
    async fn overwrite_refreshes_value_and_ttl() {
        let cache = MemoryCache::new();
        cache.cache_image("k", Bytes::from_static(b"a"), BRIEF).await.unwrap();
        cache.cache_image("k", Bytes::from_static(b"b"), HOUR).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get_image("k").await.unwrap().unwrap(), "b");
    }

    #[tokio::test]
    async fn byte_budget_is_enforced() {
        let cache = MemoryCache::with_capacity(10);
        for key in ["a", "b", "c"] {
            cache
                .cache_image(key, Bytes::from_static(b"12345678"), HOUR)
                .await
                .unwrap();
        }
        assert!(cache.weighted_size().await <= 10);
        assert!(cache.len().await <= 1);
    }
}
