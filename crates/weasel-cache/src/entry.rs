use serde::{Deserialize, Serialize};
use weasel_store::{Meta, Object};

use crate::error::{CacheError, CacheResult};

/// Cache key for object `name` in bucket `container`.
///
/// Bucket names never contain `/`, so the first `/` always splits the key
/// back into its two parts and distinct pairs never share a key.
pub fn cache_key(container: &str, name: &str) -> String {
    format!("{container}/{name}")
}

/// A fully-read object as stored in the cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedObject {
    pub meta: Meta,
    pub body: Vec<u8>,
}

impl CachedObject {
    pub fn new(meta: Meta, body: Vec<u8>) -> Self {
        Self { meta, body }
    }

    /// Serialize into the opaque cache value.
    pub fn encode(&self) -> CacheResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Deserialize a cache value produced by [`encode`](Self::encode).
    pub fn decode(data: &[u8]) -> CacheResult<Self> {
        bincode::deserialize(data).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Turn the entry into an object whose body reads from memory.
    pub fn into_object(self) -> Object {
        Object::from_bytes(self.meta, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(cache_key("bucket1", "index.html"), "bucket1/index.html");
        assert_eq!(cache_key("b", "docs/a/b.html"), "b/docs/a/b.html");
        assert_ne!(cache_key("a", "b/c"), cache_key("a/b", "c"));
    }

    #[test]
    fn encoding_preserves_meta_and_raw_bytes() {
        let mut meta = Meta::new();
        meta.insert("content-type".into(), "application/octet-stream".into());
        meta.insert("x-goog-meta-note".into(), "ünïcödé, commas, \"quotes\"".into());
        let body: Vec<u8> = (0..=255).collect();

        let entry = CachedObject::new(meta, body);
        let decoded = CachedObject::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = CachedObject::decode(&[0xff; 3]).unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[tokio::test]
    async fn into_object_serves_body() {
        let mut meta = Meta::new();
        meta.insert("content-type".into(), "text/html".into());
        let obj = CachedObject::new(meta, b"hello".to_vec()).into_object();
        assert_eq!(obj.meta().get("content-type").map(String::as_str), Some("text/html"));
        assert_eq!(obj.read_to_end().await.unwrap(), b"hello");
    }
}
