use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use weasel_cache::{cache_key, CacheResult, CachedObject, SharedCache};
use weasel_store::{filter_meta, Object, ObjectStore, StoreError, StoreResult};

use crate::body::{CachePolicy, CachingBody};

/// Cache-aside access to store objects.
///
/// [`open`](Self::open) consults the shared cache first and falls back to the
/// object store; a store-backed object populates the cache once its body has
/// been read to the end. [`purge`](Self::purge) invalidates one entry.
pub struct Storage {
    store: Arc<dyn ObjectStore>,
    cache: Arc<dyn SharedCache>,
    policy: CachePolicy,
    fetch_timeout: Duration,
}

impl Storage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cache: Arc<dyn SharedCache>,
        policy: CachePolicy,
        fetch_timeout: Duration,
    ) -> Self {
        Self { store, cache, policy, fetch_timeout }
    }

    pub fn cache(&self) -> &Arc<dyn SharedCache> {
        &self.cache
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Open object `name` in bucket `container`.
    ///
    /// Not-found errors are expected and returned without logging; other
    /// store errors are left to the caller to log.
    pub async fn open(&self, container: &str, name: &str) -> StoreResult<Object> {
        let key = cache_key(container, name);
        if let Some(obj) = self.lookup(&key).await {
            debug!(%key, "cache hit");
            return Ok(obj);
        }

        let deadline = Instant::now() + self.fetch_timeout;
        let fetched = tokio::time::timeout_at(deadline, self.store.fetch(container, name))
            .await
            .map_err(|_| StoreError::Timeout(self.fetch_timeout))??;

        let meta = filter_meta(&fetched.metadata);
        let body = CachingBody::new(
            fetched.body,
            key,
            meta.clone(),
            self.policy,
            Arc::clone(&self.cache),
        )
        .with_deadline(deadline);
        Ok(Object::new(meta, body.boxed()))
    }

    /// Remove the cached copy of `name` in `container`, if any.
    pub async fn purge(&self, container: &str, name: &str) -> CacheResult<()> {
        let key = cache_key(container, name);
        self.cache.delete(&key).await?;
        debug!(%key, "cache entry purged");
        Ok(())
    }

    async fn lookup(&self, key: &str) -> Option<Object> {
        let raw = match self.cache.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(%key, error = %e, "cache get failed, falling back to store");
                return None;
            }
        };
        match CachedObject::decode(&raw) {
            Ok(entry) => Some(entry.into_object()),
            Err(e) => {
                warn!(%key, error = %e, "undecodable cache entry, falling back to store");
                None
            }
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("policy", &self.policy)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}
