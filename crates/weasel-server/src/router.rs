use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::State;
use axum::http::Uri;
use axum::routing::{get, post, MethodRouter};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::VanityConfig;
use crate::flush::flush_on_deploy;
use crate::handler::{self, AppState};
use crate::redirect::apply_redirects;

/// Build the axum router with all weasel endpoints.
///
/// Every path not claimed by the change hook or a vanity package is served
/// from the object store. Configured redirects answer before any route.
pub fn build_router(state: AppState, hook_path: &str, vanity: &VanityConfig) -> Router {
    let mut router = Router::new().route(hook_path, post(handler::change_hook));

    let hook_root = hook_path.trim_start_matches('/').split('/').next().unwrap_or("");
    let mut claimed: HashSet<&str> = HashSet::new();
    claimed.insert(hook_root);

    for pkg in &vanity.packages {
        if !claimed.insert(pkg.as_str()) {
            warn!(package = %pkg, "vanity package already routed, skipping");
            continue;
        }
        let name: Arc<str> = Arc::from(pkg.as_str());
        let page = get(move |State(state): State<AppState>, uri: Uri| {
            let name = Arc::clone(&name);
            async move { handler::vanity_page(state, name, uri).await }
        });
        router = package_routes(router, pkg, page);
    }

    for pkg in &vanity.versioned {
        if !claimed.insert(pkg.name.as_str()) {
            warn!(package = %pkg.name, "vanity package already routed, skipping");
            continue;
        }
        let shared = Arc::new(pkg.clone());
        let page = get(move |State(state): State<AppState>, uri: Uri| {
            let pkg = Arc::clone(&shared);
            async move { handler::versioned_page(state, pkg, uri).await }
        });
        router = package_routes(router, &pkg.name, page);
    }

    let flush = Arc::clone(&state.flush);
    let redirects = Arc::clone(&state.redirects);
    router
        .fallback(handler::serve_asset)
        .layer(middleware::from_fn_with_state(flush, flush_on_deploy))
        .layer(middleware::from_fn_with_state(redirects, apply_redirects))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// `/{name}/*rest` does not match an empty remainder, so the trailing slash
// form gets its own route.
fn package_routes(
    router: Router<AppState>,
    name: &str,
    page: MethodRouter<AppState>,
) -> Router<AppState> {
    router
        .route(&format!("/{name}"), page.clone())
        .route(&format!("/{name}/"), page.clone())
        .route(&format!("/{name}/*rest"), page)
}
