use std::sync::{Arc, Mutex};

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{error, info};
use weasel_cache::SharedCache;

use crate::error::{ServerError, ServerResult};

/// Response header set on the request that performed the deploy flush.
pub const CACHE_FLUSHED_HEADER: &str = "x-weasel-cache-flushed";

/// A boolean that flips to `true` at most once per process.
#[derive(Debug, Default)]
pub struct OnceFlag {
    done: Mutex<bool>,
}

impl OnceFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        *self.done.lock().expect("lock poisoned")
    }

    /// Set the flag, returning whether it was already set.
    pub fn try_mark_done(&self) -> bool {
        let mut done = self.done.lock().expect("lock poisoned");
        std::mem::replace(&mut *done, true)
    }
}

/// Flushes the whole shared cache on the first request after a deploy.
///
/// Entries written by a previous version may be stale once new objects are
/// uploaded alongside a deploy. Disabled flushes mark themselves done on
/// first use; failed flushes are attempted again on the next request.
///
/// Concurrent first requests queue on `gate`, so only one of them flushes.
pub struct DeployFlush {
    enabled: bool,
    version: Option<String>,
    cache: Arc<dyn SharedCache>,
    flag: OnceFlag,
    gate: tokio::sync::Mutex<()>,
}

impl DeployFlush {
    pub fn new(enabled: bool, version: Option<String>, cache: Arc<dyn SharedCache>) -> Self {
        Self {
            enabled,
            version: version.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()),
            cache,
            flag: OnceFlag::new(),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.flag.is_done()
    }

    /// Flush the cache if that has not happened yet in this process.
    /// Returns `true` only for the call that performed the flush.
    pub async fn run_once(&self) -> ServerResult<bool> {
        if !self.enabled {
            self.flag.try_mark_done();
            return Ok(false);
        }
        if self.flag.is_done() {
            return Ok(false);
        }
        let _gate = self.gate.lock().await;
        if self.flag.is_done() {
            return Ok(false);
        }
        let version = self
            .version
            .as_deref()
            .ok_or_else(|| ServerError::Config("deploy version not set".into()))?;

        self.cache.flush().await?;
        if self.flag.try_mark_done() {
            return Ok(false);
        }
        info!(%version, "cache flushed for deploy");
        Ok(true)
    }
}

impl std::fmt::Debug for DeployFlush {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployFlush")
            .field("enabled", &self.enabled)
            .field("version", &self.version)
            .field("done", &self.flag.is_done())
            .finish()
    }
}

/// Middleware running [`DeployFlush::run_once`] ahead of every request.
pub async fn flush_on_deploy(
    State(flush): State<Arc<DeployFlush>>,
    req: Request,
    next: Next,
) -> Response {
    let flushed = match flush.run_once().await {
        Ok(flushed) => flushed,
        Err(e) => {
            error!(error = %e, "deploy cache flush");
            false
        }
    };
    let mut resp = next.run(req).await;
    if flushed {
        resp.headers_mut()
            .insert(CACHE_FLUSHED_HEADER, HeaderValue::from_static("1"));
    }
    resp
}
