use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CacheResult;

/// Process-external key/value cache with expiration.
///
/// Backends serialize their own state; callers add no locking around these
/// calls. Every operation is atomic with respect to a single key.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Look up `key`. Expired entries are reported as absent.
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>>;

    /// Store `value` under `key`, expiring `ttl` after this call.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Drop every entry.
    async fn flush(&self) -> CacheResult<()>;
}
