//! Object change notifications.
//!
//! The object store posts a notification whenever an object in a watched
//! bucket changes. The handler drops the matching cache entry so the next
//! request refetches the object. A 5xx answer asks the notifier to retry,
//! which is only useful when the purge itself failed.

use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::storage::Storage;

/// Header carrying the notification state in GCS object change notifications.
pub const RESOURCE_STATE_HEADER: &str = "x-goog-resource-state";

/// Resource state of the handshake sent when a watch channel is created.
pub const SYNC_STATE: &str = "sync";

/// Notification payload. Only the fields needed to locate the object are read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    #[serde(default)]
    pub resource_state: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
}

/// What the handler did with a notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookOutcome {
    /// Sync handshake, nothing to do.
    Ignored,
    /// Payload could not be decoded; dropped without asking for a retry.
    Malformed,
    /// Cache entry removed (or was already absent).
    Purged { bucket: String, name: String },
    /// Purge failed; the notifier should retry.
    RetryLater,
}

impl HookOutcome {
    /// Status code returned to the notifier.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RetryLater => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        }
    }
}

fn is_sync(state: Option<&str>) -> bool {
    state.is_some_and(|s| s.eq_ignore_ascii_case(SYNC_STATE))
}

/// Process one change notification with request headers `headers` and raw
/// JSON `body`.
pub async fn handle_change(storage: &Storage, headers: &HeaderMap, body: &[u8]) -> HookOutcome {
    let header_state = headers.get(RESOURCE_STATE_HEADER).and_then(|v| v.to_str().ok());
    if is_sync(header_state) {
        debug!("sync notification ignored");
        return HookOutcome::Ignored;
    }

    let note: ChangeNotification = match serde_json::from_slice(body) {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "decoding change notification");
            return HookOutcome::Malformed;
        }
    };
    if is_sync(note.resource_state.as_deref()) {
        debug!("sync notification ignored");
        return HookOutcome::Ignored;
    }

    let (Some(bucket), Some(name)) = (note.bucket, note.name) else {
        warn!("change notification without bucket or name");
        return HookOutcome::Malformed;
    };
    if bucket.is_empty() || name.is_empty() {
        warn!(%bucket, %name, "change notification with empty bucket or name");
        return HookOutcome::Malformed;
    }

    match storage.purge(&bucket, &name).await {
        Ok(()) => HookOutcome::Purged { bucket, name },
        Err(e) => {
            error!(%bucket, %name, error = %e, "purging cache entry");
            HookOutcome::RetryLater
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::HeaderValue;
    use bytes::Bytes;
    use weasel_cache::{CacheError, CacheResult, MemoryCache, SharedCache};
    use weasel_store::InMemoryObjectStore;

    use crate::body::CachePolicy;

    /// Cache that counts deletes and can be told to fail them.
    #[derive(Default)]
    struct CountingCache {
        inner: Option<MemoryCache>,
        deletes: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl SharedCache for CountingCache {
        async fn get(&self, _key: &str) -> CacheResult<Option<Bytes>> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> CacheResult<()> {
            Ok(())
        }
        async fn delete(&self, key: &str) -> CacheResult<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CacheError::Backend("unreachable".into()));
            }
            match &self.inner {
                Some(c) => c.delete(key).await,
                None => Ok(()),
            }
        }
        async fn flush(&self) -> CacheResult<()> {
            Ok(())
        }
    }

    fn storage(cache: Arc<CountingCache>) -> Storage {
        Storage::new(
            Arc::new(InMemoryObjectStore::new()),
            cache,
            CachePolicy::default(),
            Duration::from_secs(1),
        )
    }

    fn sync_header() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(RESOURCE_STATE_HEADER, HeaderValue::from_static("sync"));
        h
    }

    #[tokio::test]
    async fn sync_header_never_purges() {
        let cache = Arc::new(CountingCache::default());
        let out = handle_change(&storage(cache.clone()), &sync_header(), b"not even json").await;
        assert_eq!(out, HookOutcome::Ignored);
        assert_eq!(out.status(), StatusCode::OK);
        assert_eq!(cache.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sync_body_never_purges() {
        let cache = Arc::new(CountingCache::default());
        let body = br#"{"resourceState":"sync","name":"index.html","bucket":"bucket1"}"#;
        let out = handle_change(&storage(cache.clone()), &HeaderMap::new(), body).await;
        assert_eq!(out, HookOutcome::Ignored);
        assert_eq!(cache.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped_with_ok() {
        let cache = Arc::new(CountingCache::default());
        let bodies: [&[u8]; 3] = [
            b"{oops",
            br#"{"name":"index.html"}"#,
            br#"{"name":"","bucket":"b"}"#,
        ];
        for body in bodies {
            let out = handle_change(&storage(cache.clone()), &HeaderMap::new(), body).await;
            assert_eq!(out, HookOutcome::Malformed);
            assert_eq!(out.status(), StatusCode::OK);
        }
        assert_eq!(cache.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn change_purges_entry() {
        let mem = MemoryCache::new(1 << 20, 1 << 20);
        mem.set("bucket1/index.html", Bytes::from_static(b"x"), Duration::from_secs(60))
            .await
            .unwrap();
        let cache = Arc::new(CountingCache { inner: Some(mem.clone()), ..Default::default() });

        let body = br#"{"kind":"storage#object","resourceState":"exists","name":"index.html","bucket":"bucket1","generation":"3"}"#;
        let out = handle_change(&storage(cache.clone()), &HeaderMap::new(), body).await;
        assert_eq!(
            out,
            HookOutcome::Purged { bucket: "bucket1".into(), name: "index.html".into() }
        );
        assert_eq!(cache.deletes.load(Ordering::SeqCst), 1);
        assert!(mem.get("bucket1/index.html").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_failure_asks_for_retry() {
        let cache = Arc::new(CountingCache { fail: true, ..Default::default() });
        let body = br#"{"name":"index.html","bucket":"bucket1"}"#;
        let out = handle_change(&storage(cache), &HeaderMap::new(), body).await;
        assert_eq!(out, HookOutcome::RetryLater);
        assert_eq!(out.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
