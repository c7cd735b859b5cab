use std::collections::HashMap;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{FetchedObject, ObjectStore};

/// Public Google Cloud Storage endpoint.
pub const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

/// Object store reached over plain HTTP: `GET {base}/{bucket}/{name}`.
///
/// Response headers become the object's raw metadata, so `x-goog-meta-*`
/// custom metadata set on GCS objects flows through untouched.
#[derive(Clone, Debug)]
pub struct HttpObjectStore {
    client: Client,
    base_url: Url,
    timeout: Option<Duration>,
}

impl HttpObjectStore {
    pub fn new(base_url: &str) -> StoreResult<Self> {
        Self::with_client(Client::new(), base_url)
    }

    /// Store whose requests, body reads included, are cut off after
    /// `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Client(e.to_string()))?;
        let mut store = Self::with_client(client, base_url)?;
        store.timeout = Some(timeout);
        Ok(store)
    }

    pub fn with_client(client: Client, base_url: &str) -> StoreResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| StoreError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { client, base_url, timeout: None })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of object `name` in bucket `container`, one path segment per
    /// `/`-separated name component.
    pub fn object_url(&self, container: &str, name: &str) -> StoreResult<Url> {
        if container.is_empty() || container.contains('/') {
            return Err(StoreError::InvalidName(format!("bucket {container:?}")));
        }
        if name.is_empty() {
            return Err(StoreError::InvalidName("empty object name".into()));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(container)
            .extend(name.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn fetch(&self, container: &str, name: &str) -> StoreResult<FetchedObject> {
        let url = self.object_url(container, name)?;
        debug!(%url, "fetching object");

        let resp = self.client.get(url).send().await.map_err(|e| match self.timeout {
            Some(t) if e.is_timeout() => StoreError::Timeout(t),
            _ => {
                let code = e.status().map(|s| s.as_u16()).unwrap_or(502);
                StoreError::fetch(Some(code), e.to_string())
            }
        })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                container: container.to_string(),
                name: name.to_string(),
            });
        }
        if !status.is_success() {
            return Err(StoreError::fetch(
                Some(status.as_u16()),
                status.canonical_reason().unwrap_or("unexpected status"),
            ));
        }

        let metadata: HashMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = resp.bytes_stream().map_err(body_error).boxed();

        Ok(FetchedObject { metadata, body })
    }
}

fn body_error(e: reqwest::Error) -> io::Error {
    if e.is_timeout() {
        io::Error::new(io::ErrorKind::TimedOut, e)
    } else {
        io::Error::other(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode as AxumStatus};
    use axum::routing::get;
    use axum::Router;
    use bytes::Bytes;
    use tokio::net::TcpListener;

    async fn spawn(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn bucket() -> Router {
        Router::new()
            .route(
                "/bucket1/index.html",
                get(|| async {
                    (
                        [
                            (header::CONTENT_TYPE, "text/html"),
                            (header::HeaderName::from_static("x-goog-meta-redirect"), "/docs"),
                        ],
                        "hello",
                    )
                }),
            )
            .route("/bucket1/busy", get(|| async { AxumStatus::SERVICE_UNAVAILABLE }))
            .route(
                "/bucket1/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
    }

    async fn read_body(fetched: FetchedObject) -> Vec<u8> {
        let chunks: Vec<Bytes> = fetched.body.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn fetch_returns_body_and_header_metadata() {
        let base = spawn(bucket()).await;
        let store = HttpObjectStore::new(&base).unwrap();
        let fetched = store.fetch("bucket1", "index.html").await.unwrap();
        assert_eq!(fetched.metadata["content-type"], "text/html");
        assert_eq!(fetched.metadata["x-goog-meta-redirect"], "/docs");
        assert_eq!(read_body(fetched).await, b"hello");
    }

    #[tokio::test]
    async fn fetch_maps_404_to_not_found() {
        let base = spawn(bucket()).await;
        let store = HttpObjectStore::new(&base).unwrap();
        let err = store.fetch("bucket1", "missing.html").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn fetch_keeps_failure_status() {
        let base = spawn(bucket()).await;
        let store = HttpObjectStore::new(&base).unwrap();
        let err = store.fetch("bucket1", "busy").await.unwrap_err();
        assert!(matches!(err, StoreError::Fetch { code: 503, .. }));
    }

    #[tokio::test]
    async fn refused_connection_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let store = HttpObjectStore::new(&format!("http://{addr}")).unwrap();
        let err = store.fetch("bucket1", "index.html").await.unwrap_err();
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn client_timeout_is_reported_as_timeout() {
        let base = spawn(bucket()).await;
        let store = HttpObjectStore::with_timeout(&base, Duration::from_millis(100)).unwrap();
        let err = store.fetch("bucket1", "slow").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert_eq!(err.status_code(), 504);
    }

    #[test]
    fn object_url_joins_segments() {
        let store = HttpObjectStore::new(DEFAULT_BASE_URL).unwrap();
        let url = store.object_url("goa.design", "docs/index.html").unwrap();
        assert_eq!(url.as_str(), "https://storage.googleapis.com/goa.design/docs/index.html");
    }

    #[test]
    fn object_url_escapes_names() {
        let store = HttpObjectStore::new(DEFAULT_BASE_URL).unwrap();
        let url = store.object_url("b", "a b/c?d.html").unwrap();
        assert_eq!(url.as_str(), "https://storage.googleapis.com/b/a%20b/c%3Fd.html");
    }

    #[test]
    fn object_url_keeps_base_path() {
        let store = HttpObjectStore::new("http://localhost:4443/storage/v1/").unwrap();
        let url = store.object_url("b", "n").unwrap();
        assert_eq!(url.as_str(), "http://localhost:4443/storage/v1/b/n");
    }

    #[test]
    fn object_url_rejects_bad_names() {
        let store = HttpObjectStore::new(DEFAULT_BASE_URL).unwrap();
        assert!(matches!(store.object_url("", "n"), Err(StoreError::InvalidName(_))));
        assert!(matches!(store.object_url("a/b", "n"), Err(StoreError::InvalidName(_))));
        assert!(matches!(store.object_url("b", ""), Err(StoreError::InvalidName(_))));
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(HttpObjectStore::new("not a url"), Err(StoreError::InvalidUrl(_))));
        assert!(matches!(HttpObjectStore::new("mailto:x@y.z"), Err(StoreError::InvalidUrl(_))));
    }
}
