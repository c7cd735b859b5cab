use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use tracing::{debug, error};
use weasel_store::StoreError;

use crate::config::SitesConfig;
use crate::flush::DeployFlush;
use crate::hook::handle_change;
use crate::redirect::{moved_permanently, Redirects};
use crate::render::{log_body_errors, serve_object, valid_method, CorsPolicy, ALLOW_METHODS};
use crate::storage::Storage;
use crate::vanity::{ImportSite, VersionedPackage};

/// Shared state of every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub cors: Arc<CorsPolicy>,
    pub sites: Arc<SitesConfig>,
    pub vanity: Arc<ImportSite>,
    pub flush: Arc<DeployFlush>,
    pub redirects: Arc<Redirects>,
}

/// Serve the object addressed by the request host and path.
pub async fn serve_asset(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    if !valid_method(&method) {
        let mut resp = status_response(StatusCode::METHOD_NOT_ALLOWED);
        resp.headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static(ALLOW_METHODS));
        return resp;
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if let Some(target) = state.redirects.tls_upgrade(host, &headers, &uri) {
        return moved_permanently(&target);
    }
    let bucket = state.sites.bucket_for_host(host).to_string();
    let path = percent_decode_str(uri.path()).decode_utf8_lossy();
    let name = state.sites.object_name(&path);
    debug!(%bucket, %name, %method, "asset request");

    let err = match state.storage.open(&bucket, &name).await {
        Ok(obj) => {
            let obj = obj.map_body(|body| log_body_errors(body, format!("{bucket}/{name}")));
            return serve_object(&state.cors, &method, &headers, obj);
        }
        Err(e) => e,
    };

    if err.is_not_found() {
        if let Some(fallback) = state.sites.not_found.as_deref() {
            return serve_not_found(&state, &method, &headers, &bucket, fallback).await;
        }
    } else {
        error!(object = %format!("{bucket}/{name}"), error = %err, "opening object");
    }
    error_response(&err)
}

async fn serve_not_found(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    bucket: &str,
    name: &str,
) -> Response {
    match state.storage.open(bucket, name).await {
        Ok(obj) => {
            let label = format!("{bucket}/{name}");
            let obj = obj.map_body(|body| log_body_errors(body, label));
            let mut resp = serve_object(&state.cors, method, headers, obj);
            if resp.status() == StatusCode::OK {
                *resp.status_mut() = StatusCode::NOT_FOUND;
            }
            resp
        }
        Err(e) => {
            if !e.is_not_found() {
                error!(object = %format!("{bucket}/{name}"), error = %e, "opening not-found page");
            }
            status_response(StatusCode::NOT_FOUND)
        }
    }
}

/// Receive an object change notification.
pub async fn change_hook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    handle_change(&state.storage, &headers, &body).await.status()
}

/// Vanity import page for package `pkg`.
pub async fn vanity_page(state: AppState, pkg: Arc<str>, uri: Uri) -> Response {
    state.vanity.respond(&pkg, &uri).into_response()
}

/// Import page for versioned package `pkg`.
pub async fn versioned_page(state: AppState, pkg: Arc<VersionedPackage>, uri: Uri) -> Response {
    state.vanity.respond_versioned(&pkg, &uri).into_response()
}

fn error_response(err: &StoreError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    status_response(status)
}

fn status_response(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("");
    (status, format!("{reason}\n")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        let resp = error_response(&StoreError::NotFound {
            container: "b".into(),
            name: "n".into(),
        });
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = error_response(&StoreError::Timeout(std::time::Duration::from_secs(1)));
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);

        let resp = error_response(&StoreError::fetch(Some(1000), "weird"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn status_body_is_reason_text() {
        let resp = status_response(StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
