//! Configured redirects.
//!
//! Host and path redirects run ahead of routing. The HTTPS upgrade for
//! TLS-only hosts is applied by the asset handler, after the method check.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{HOST, LOCATION};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::config::RedirectsConfig;

/// Header set by the front end with the scheme the client used.
pub const FORWARDED_PROTO: &str = "x-forwarded-proto";

#[derive(Clone, Debug, Default)]
pub struct Redirects {
    config: RedirectsConfig,
}

impl Redirects {
    pub fn new(config: RedirectsConfig) -> Self {
        Self { config }
    }

    /// Target of a request to `uri` on `host`, if one is configured.
    ///
    /// Host redirects keep the request path and query. Path redirects are
    /// absolute; the longest matching path wins.
    pub fn resolve(&self, host: &str, uri: &Uri) -> Option<String> {
        if let Some(base) = self.config.hosts.get(host) {
            return Some(format!("{}{}", base.trim_end_matches('/'), path_and_query(uri)));
        }
        let path = uri.path();
        self.config
            .paths
            .iter()
            .filter(|(from, _)| {
                path == from.as_str() || (from.ends_with('/') && path.starts_with(from.as_str()))
            })
            .max_by_key(|(from, _)| from.len())
            .map(|(_, to)| to.clone())
    }

    /// HTTPS location for a plain request to a TLS-only host.
    pub fn tls_upgrade(&self, host: &str, headers: &HeaderMap, uri: &Uri) -> Option<String> {
        if !self.config.tls_only.iter().any(|h| h == host) {
            return None;
        }
        let proto = headers
            .get(FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("http");
        if proto.eq_ignore_ascii_case("https") {
            return None;
        }
        Some(format!("https://{host}{}", path_and_query(uri)))
    }
}

fn path_and_query(uri: &Uri) -> &str {
    uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
}

/// 301 response pointing at `target`.
pub fn moved_permanently(target: &str) -> Response {
    match HeaderValue::from_str(target) {
        Ok(location) => (StatusCode::MOVED_PERMANENTLY, [(LOCATION, location)]).into_response(),
        Err(_) => {
            warn!(%target, "redirect target is not a valid header value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Middleware answering configured host and path redirects.
pub async fn apply_redirects(
    State(redirects): State<Arc<Redirects>>,
    req: Request,
    next: Next,
) -> Response {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if let Some(target) = redirects.resolve(host, req.uri()) {
        debug!(%host, %target, "redirect");
        return moved_permanently(&target);
    }
    next.run(req).await
}
