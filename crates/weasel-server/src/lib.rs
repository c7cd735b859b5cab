//! HTTP server for weasel.
//!
//! Serves objects from a bucket-oriented object store through a shared
//! cache, purges cache entries when the store reports object changes, and
//! answers Go vanity import requests for configured packages.

pub mod body;
pub mod config;
pub mod error;
pub mod flush;
pub mod handler;
pub mod hook;
pub mod redirect;
pub mod render;
pub mod router;
pub mod server;
pub mod storage;
pub mod vanity;

pub use body::{CachePolicy, CachingBody};
pub use config::{
    CacheConfig, CorsConfig, DeployConfig, RedirectsConfig, ServerConfig, SitesConfig,
    StoreConfig, VanityConfig,
};
pub use error::{ServerError, ServerResult};
pub use flush::{DeployFlush, OnceFlag, CACHE_FLUSHED_HEADER};
pub use handler::AppState;
pub use hook::{handle_change, ChangeNotification, HookOutcome};
pub use redirect::Redirects;
pub use render::{serve_object, valid_method, AllowedOrigins, CorsPolicy};
pub use server::WeaselServer;
pub use storage::Storage;
pub use vanity::{ImportSite, VersionedPackage};
