use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache as MokaCache;
use moka::Expiry;
use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::traits::SharedCache;

#[derive(Clone)]
struct CacheValue {
    data: Bytes,
    ttl: Duration,
}

/// Expires each entry `ttl` after its last write.
struct PerEntryTtl;

impl Expiry<String, CacheValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process [`SharedCache`] backed by moka.
///
/// Total size is bounded by `capacity_bytes` (least-recently-used eviction);
/// single values larger than `max_item_size` are refused.
#[derive(Clone)]
pub struct MemoryCache {
    cache: MokaCache<String, CacheValue>,
    max_item_size: usize,
}

impl MemoryCache {
    pub fn new(capacity_bytes: u64, max_item_size: usize) -> Self {
        let cache = MokaCache::builder()
            .weigher(|k: &String, v: &CacheValue| {
                (k.len() + v.data.len()).try_into().unwrap_or(u32::MAX)
            })
            .max_capacity(capacity_bytes)
            .expire_after(PerEntryTtl)
            .build();

        debug!(capacity_bytes, max_item_size, "memory cache created");

        Self { cache, max_item_size }
    }

    pub fn max_item_size(&self) -> usize {
        self.max_item_size
    }

    /// Number of live entries, after applying pending evictions.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        Ok(self.cache.get(key).await.map(|v| v.data))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()> {
        if value.len() > self.max_item_size {
            return Err(CacheError::TooLarge {
                size: value.len(),
                max: self.max_item_size,
            });
        }
        self.cache
            .insert(key.to_string(), CacheValue { data: value, ttl })
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn flush(&self) -> CacheResult<()> {
        self.cache.invalidate_all();
        Ok(())
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("max_item_size", &self.max_item_size)
            .finish()
    }
}
