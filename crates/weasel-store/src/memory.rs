use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use crate::error::{StoreError, StoreResult};
use crate::traits::{FetchedObject, ObjectStore};

#[derive(Clone, Debug)]
struct StoredEntry {
    metadata: HashMap<String, String>,
    data: Bytes,
}

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. Bodies are streamed in `chunk_size`
/// pieces so consumers see more than one read. Every call to
/// [`ObjectStore::fetch`] is counted, hits and misses alike.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<(String, String), StoredEntry>>,
    fetches: AtomicUsize,
    failure: RwLock<Option<u16>>,
    latency: RwLock<Option<Duration>>,
    chunk_size: usize,
}

impl InMemoryObjectStore {
    /// Create a new empty store streaming bodies in 4 KiB chunks.
    pub fn new() -> Self {
        Self::with_chunk_size(4096)
    }

    /// Create a new empty store with a custom body chunk size.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
            failure: RwLock::new(None),
            latency: RwLock::new(None),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Insert or replace an object.
    pub fn put<I, K, V>(&self, container: &str, name: &str, data: impl Into<Bytes>, metadata: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entry = StoredEntry {
            metadata: metadata.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            data: data.into(),
        };
        self.objects
            .write()
            .expect("lock poisoned")
            .insert((container.to_string(), name.to_string()), entry);
    }

    /// Remove an object. Returns `true` if it existed.
    pub fn remove(&self, container: &str, name: &str) -> bool {
        self.objects
            .write()
            .expect("lock poisoned")
            .remove(&(container.to_string(), name.to_string()))
            .is_some()
    }

    /// Make every subsequent fetch fail with `code` (`None` restores service).
    pub fn fail_with(&self, code: Option<u16>) {
        *self.failure.write().expect("lock poisoned") = code;
    }

    /// Delay every subsequent fetch by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().expect("lock poisoned") = latency;
    }

    /// Number of fetch calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn fetch(&self, container: &str, name: &str) -> StoreResult<FetchedObject> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.read().expect("lock poisoned");
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
        if let Some(code) = *self.failure.read().expect("lock poisoned") {
            return Err(StoreError::fetch(Some(code), "injected failure"));
        }

        let entry = self
            .objects
            .read()
            .expect("lock poisoned")
            .get(&(container.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                container: container.to_string(),
                name: name.to_string(),
            })?;

        let chunks: Vec<std::io::Result<Bytes>> = (0..entry.data.len())
            .step_by(self.chunk_size)
            .map(|start| {
                let end = (start + self.chunk_size).min(entry.data.len());
                Ok(entry.data.slice(start..end))
            })
            .collect();

        Ok(FetchedObject {
            metadata: entry.metadata,
            body: stream::iter(chunks).boxed(),
        })
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .field("fetch_count", &self.fetch_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn collect(obj: FetchedObject) -> Vec<Bytes> {
        obj.body.try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn fetch_present_object() {
        let store = InMemoryObjectStore::new();
        store.put("bucket1", "index.html", "hello", [("content-type", "text/html")]);

        let obj = store.fetch("bucket1", "index.html").await.unwrap();
        assert_eq!(obj.metadata.get("content-type").map(String::as_str), Some("text/html"));
        assert_eq!(collect(obj).await.concat(), b"hello");
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn fetch_missing_object_is_not_found() {
        let store = InMemoryObjectStore::new();
        let err = store.fetch("bucket1", "missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn containers_are_separate() {
        let store = InMemoryObjectStore::new();
        store.put("a", "x", "from a", Vec::<(String, String)>::new());
        assert!(store.fetch("b", "x").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn body_is_chunked() {
        let store = InMemoryObjectStore::with_chunk_size(2);
        store.put("b", "n", "hello", Vec::<(String, String)>::new());
        let chunks = collect(store.fetch("b", "n").await.unwrap()).await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), b"hello");
    }

    #[tokio::test]
    async fn injected_failure_carries_code() {
        let store = InMemoryObjectStore::new();
        store.put("b", "n", "x", Vec::<(String, String)>::new());
        store.fail_with(Some(503));
        let err = store.fetch("b", "n").await.unwrap_err();
        assert_eq!(err.status_code(), 503);

        store.fail_with(None);
        assert!(store.fetch("b", "n").await.is_ok());
    }

    #[test]
    fn put_remove_len() {
        let store = InMemoryObjectStore::default();
        assert!(store.is_empty());
        store.put("b", "n", "x", Vec::<(String, String)>::new());
        assert_eq!(store.len(), 1);
        assert!(store.remove("b", "n"));
        assert!(!store.remove("b", "n"));
        assert!(store.is_empty());
    }

    #[test]
    fn debug_format() {
        let store = InMemoryObjectStore::new();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryObjectStore"));
        assert!(debug.contains("fetch_count"));
    }
}
