use std::collections::{BTreeMap, HashMap};
use std::io;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};

/// Custom metadata key holding a redirect target URL.
pub const META_REDIRECT: &str = "x-goog-meta-redirect";

/// Custom metadata key holding the HTTP status code used for a redirect.
pub const META_REDIRECT_CODE: &str = "x-goog-meta-redirect-code";

/// Prefix of user-defined object metadata keys, passed through as-is.
pub const CUSTOM_META_PREFIX: &str = "x-goog-meta-";

/// Headers propagated from a store object to the client.
pub const OBJECT_HEADERS: &[&str] = &[
    "cache-control",
    "content-disposition",
    "content-type",
    "etag",
    "last-modified",
    META_REDIRECT,
    META_REDIRECT_CODE,
];

/// Default redirect status (301 Moved Permanently).
const DEFAULT_REDIRECT_CODE: u16 = 301;

/// Object metadata: lower-cased header name to value.
pub type Meta = BTreeMap<String, String>;

/// Streaming object body.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Keep only the allow-listed headers and custom metadata from a raw store
/// response. Keys are lower-cased; values pass through verbatim.
pub fn filter_meta(raw: &HashMap<String, String>) -> Meta {
    raw.iter()
        .filter_map(|(k, v)| {
            let key = k.to_ascii_lowercase();
            let keep = OBJECT_HEADERS.contains(&key.as_str()) || key.starts_with(CUSTOM_META_PREFIX);
            keep.then(|| (key, v.clone()))
        })
        .collect()
}

/// A single asset fetched from the store or the cache.
pub struct Object {
    meta: Meta,
    body: ByteStream,
}

impl Object {
    pub fn new(meta: Meta, body: ByteStream) -> Self {
        Self { meta, body }
    }

    /// Build an object whose body is an in-memory buffer.
    pub fn from_bytes(meta: Meta, data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        let body = if data.is_empty() {
            stream::empty().boxed()
        } else {
            stream::iter(std::iter::once(Ok(data))).boxed()
        };
        Self::new(meta, body)
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Redirect target, if the object is flagged as a redirect.
    pub fn redirect(&self) -> Option<&str> {
        self.meta
            .get(META_REDIRECT)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Status code for a redirect response. Defaults to 301.
    pub fn redirect_code(&self) -> u16 {
        self.meta
            .get(META_REDIRECT_CODE)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_REDIRECT_CODE)
    }

    /// Take ownership of the body stream. Dropping it closes the object.
    pub fn into_body(self) -> ByteStream {
        self.body
    }

    /// Replace the body with a wrapper around it, keeping the metadata.
    pub fn map_body(self, f: impl FnOnce(ByteStream) -> ByteStream) -> Self {
        Self::new(self.meta, f(self.body))
    }

    /// Split into metadata and body.
    pub fn into_parts(self) -> (Meta, ByteStream) {
        (self.meta, self.body)
    }

    /// Drain the body into memory.
    pub async fn read_to_end(self) -> io::Result<Vec<u8>> {
        let mut body = self.body;
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object").field("meta", &self.meta).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> Meta {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn filter_keeps_allow_list_and_custom_meta() {
        let raw: HashMap<String, String> = [
            ("Content-Type", "text/html"),
            ("ETag", "\"abc\""),
            ("x-goog-meta-redirect", "https://goa.design/"),
            ("x-goog-meta-owner", "docs"),
            ("x-goog-generation", "1234"),
            ("server", "UploadServer"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let m = filter_meta(&raw);
        assert_eq!(m.get("content-type").map(String::as_str), Some("text/html"));
        assert_eq!(m.get("etag").map(String::as_str), Some("\"abc\""));
        assert!(m.contains_key("x-goog-meta-redirect"));
        assert!(m.contains_key("x-goog-meta-owner"));
        assert!(!m.contains_key("x-goog-generation"));
        assert!(!m.contains_key("server"));
        assert_eq!(m.len(), 4);
    }

    #[test]
    fn redirect_requires_non_empty_target() {
        let o = Object::from_bytes(meta(&[(META_REDIRECT, "")]), "x");
        assert!(o.redirect().is_none());

        let o = Object::from_bytes(meta(&[(META_REDIRECT, "/docs/")]), "x");
        assert_eq!(o.redirect(), Some("/docs/"));
    }

    #[test]
    fn redirect_code_defaults_to_moved_permanently() {
        let o = Object::from_bytes(Meta::new(), Bytes::new());
        assert_eq!(o.redirect_code(), 301);

        let o = Object::from_bytes(meta(&[(META_REDIRECT_CODE, "three-oh-two")]), Bytes::new());
        assert_eq!(o.redirect_code(), 301);

        let o = Object::from_bytes(meta(&[(META_REDIRECT_CODE, "302")]), Bytes::new());
        assert_eq!(o.redirect_code(), 302);
    }

    #[tokio::test]
    async fn read_to_end_collects_body() {
        let o = Object::from_bytes(Meta::new(), "hello");
        assert_eq!(o.read_to_end().await.unwrap(), b"hello");

        let empty = Object::from_bytes(Meta::new(), Bytes::new());
        assert!(empty.read_to_end().await.unwrap().is_empty());
    }
}
