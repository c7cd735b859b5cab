use std::sync::Arc;

use tokio::net::TcpListener;
use weasel_cache::{MemoryCache, SharedCache};
use weasel_store::{HttpObjectStore, ObjectStore};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::flush::DeployFlush;
use crate::handler::AppState;
use crate::redirect::Redirects;
use crate::router::build_router;
use crate::storage::Storage;

/// Room for encoded metadata on top of the body size bound.
const ENTRY_OVERHEAD: usize = 64 << 10;

/// Weasel asset server.
pub struct WeaselServer {
    config: ServerConfig,
    state: AppState,
}

impl WeaselServer {
    /// Server backed by the HTTP object store and an in-memory cache.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let store = Arc::new(HttpObjectStore::with_timeout(
            &config.store.base_url,
            config.store.fetch_timeout(),
        )?);
        let cache = Arc::new(MemoryCache::new(
            config.cache.capacity_bytes,
            config.cache.item_max_bytes.saturating_add(ENTRY_OVERHEAD),
        ));
        Ok(Self::with_backends(config, store, cache))
    }

    /// Server with caller-provided store and cache.
    pub fn with_backends(
        config: ServerConfig,
        store: Arc<dyn ObjectStore>,
        cache: Arc<dyn SharedCache>,
    ) -> Self {
        let storage = Storage::new(
            store,
            Arc::clone(&cache),
            config.cache.policy(),
            config.store.fetch_timeout(),
        );
        let state = AppState {
            storage: Arc::new(storage),
            cors: Arc::new(config.cors.policy()),
            sites: Arc::new(config.sites.clone()),
            vanity: Arc::new(config.vanity.site()),
            flush: Arc::new(DeployFlush::new(
                config.deploy.flush_cache,
                config.deploy.version.clone(),
                cache,
            )),
            redirects: Arc::new(Redirects::new(config.redirects.clone())),
        };
        Self { config, state }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone(), &self.config.hook_path, &self.config.vanity)
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            bucket = %self.config.sites.default_bucket,
            "weasel listening"
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_construction() {
        let server = WeaselServer::new(ServerConfig::default()).unwrap();
        assert_eq!(server.config().bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert!(!server.state().flush.is_done());
    }

    #[test]
    fn bad_store_url_is_rejected() {
        let mut config = ServerConfig::default();
        config.store.base_url = "not a url".into();
        assert!(matches!(
            WeaselServer::new(config),
            Err(ServerError::Store(_))
        ));
    }

    #[test]
    fn router_builds() {
        let mut config = ServerConfig::default();
        config.vanity.packages = vec!["clue".into(), "pulse".into()];
        let server = WeaselServer::new(config).unwrap();
        let _router = server.router();
    }
}
