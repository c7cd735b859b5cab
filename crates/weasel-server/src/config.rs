use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::body::CachePolicy;
use crate::error::{ServerError, ServerResult};
use crate::render::CorsPolicy;
use crate::vanity::{ImportSite, VersionedPackage};

/// Environment variable enabling the deploy flush (`1`, `true`, `yes`, `on`).
pub const ENV_FLUSH_ON_DEPLOY: &str = "WEASEL_FLUSH_CACHE_ON_DEPLOY";

/// Environment variable carrying the deployed version identifier.
pub const ENV_DEPLOY_VERSION: &str = "WEASEL_DEPLOY_VERSION";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Path receiving object change notifications.
    pub hook_path: String,
    pub sites: SitesConfig,
    pub cors: CorsConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub deploy: DeployConfig,
    pub vanity: VanityConfig,
    pub redirects: RedirectsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            hook_path: "/_hooks/object-change".into(),
            sites: SitesConfig::default(),
            cors: CorsConfig::default(),
            cache: CacheConfig::default(),
            store: StoreConfig::default(),
            deploy: DeployConfig::default(),
            vanity: VanityConfig::default(),
            redirects: RedirectsConfig::default(),
        }
    }
}

/// Mapping of request hosts to buckets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitesConfig {
    /// Bucket used when the request host has no entry in `buckets`.
    pub default_bucket: String,
    /// Host (as sent in the `host` header) to bucket name.
    pub buckets: BTreeMap<String, String>,
    /// Document appended to directory paths.
    pub index: String,
    /// Object served, with status 404, when the requested object is absent.
    pub not_found: Option<String>,
}

impl Default for SitesConfig {
    fn default() -> Self {
        Self {
            default_bucket: "goa.design".into(),
            buckets: BTreeMap::new(),
            index: "index.html".into(),
            not_found: None,
        }
    }
}

impl SitesConfig {
    /// Bucket serving `host`. Falls back to the default bucket.
    pub fn bucket_for_host(&self, host: &str) -> &str {
        self.buckets
            .get(host)
            .map(String::as_str)
            .unwrap_or(&self.default_bucket)
    }

    /// Object name for request path `path`, with the index document
    /// appended to directory paths.
    pub fn object_name(&self, path: &str) -> String {
        let name = path.strip_prefix('/').unwrap_or(path);
        if name.is_empty() || name.ends_with('/') {
            format!("{name}{}", self.index)
        } else {
            name.to_string()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; `"*"` allows every origin.
    pub origin: Vec<String>,
    /// Value for `access-control-max-age`, passed through verbatim.
    pub max_age: Option<String>,
}

impl CorsConfig {
    pub fn policy(&self) -> CorsPolicy {
        CorsPolicy::new(self.origin.iter().cloned(), self.max_age.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Objects larger than this are served but never cached.
    pub item_max_bytes: usize,
    pub ttl_secs: u64,
    /// Total size of the in-memory cache.
    pub capacity_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            item_max_bytes: 1 << 20,
            ttl_secs: 24 * 60 * 60,
            capacity_bytes: 256 << 20,
        }
    }
}

impl CacheConfig {
    pub fn policy(&self) -> CachePolicy {
        CachePolicy {
            max_item_size: self.item_max_bytes,
            ttl: Duration::from_secs(self.ttl_secs),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_url: String,
    pub fetch_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: weasel_store::http::DEFAULT_BASE_URL.into(),
            fetch_timeout_secs: 10,
        }
    }
}

impl StoreConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Flush the shared cache on the first request after startup.
    pub flush_cache: bool,
    pub version: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VanityConfig {
    pub domain: String,
    pub org: String,
    pub branch: String,
    /// Package names served at `/{name}` and `/{name}/...`.
    pub packages: Vec<String>,
    /// Packages published per major version on gopkg.in.
    pub versioned: Vec<VersionedPackage>,
}

impl Default for VanityConfig {
    fn default() -> Self {
        Self {
            domain: "goa.design".into(),
            org: "goadesign".into(),
            branch: "main".into(),
            packages: Vec::new(),
            versioned: Vec::new(),
        }
    }
}

impl VanityConfig {
    pub fn site(&self) -> ImportSite {
        ImportSite {
            domain: self.domain.clone(),
            org: self.org.clone(),
            branch: self.branch.clone(),
        }
    }
}

/// Redirects answered with 301 before any other routing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectsConfig {
    /// Host to target base URL; the request path and query are appended.
    pub hosts: BTreeMap<String, String>,
    /// Request path to absolute target URL. Paths ending in `/` also match
    /// everything below them.
    pub paths: BTreeMap<String, String>,
    /// Hosts served over HTTPS only; plain requests are upgraded.
    pub tls_only: Vec<String>,
}

fn is_absolute_url(s: &str) -> bool {
    s.starts_with("https://") || s.starts_with("http://")
}

/// Parse a boolean switch the way operators tend to write them.
pub fn parse_switch(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Read, apply environment overrides, and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env(|k| std::env::var(k).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply deploy overrides looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var(ENV_FLUSH_ON_DEPLOY) {
            self.deploy.flush_cache = parse_switch(&v);
        }
        if let Some(v) = var(ENV_DEPLOY_VERSION).filter(|v| !v.trim().is_empty()) {
            self.deploy.version = Some(v);
        }
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.sites.default_bucket.is_empty() || self.sites.default_bucket.contains('/') {
            return Err(ServerError::Config("sites.default_bucket must be a bucket name".into()));
        }
        if let Some((host, _)) = self.sites.buckets.iter().find(|(_, b)| b.is_empty() || b.contains('/')) {
            return Err(ServerError::Config(format!("sites.buckets[{host}] must be a bucket name")));
        }
        if self.sites.index.is_empty() {
            return Err(ServerError::Config("sites.index must not be empty".into()));
        }
        if !self.hook_path.starts_with('/') {
            return Err(ServerError::Config("hook_path must start with '/'".into()));
        }
        if self.cache.ttl_secs == 0 || self.cache.item_max_bytes == 0 || self.cache.capacity_bytes == 0 {
            return Err(ServerError::Config("cache limits must be greater than zero".into()));
        }
        if self.store.fetch_timeout_secs == 0 {
            return Err(ServerError::Config("store.fetch_timeout_secs must be greater than zero".into()));
        }
        self.validate_vanity()?;
        self.validate_redirects()
    }

    fn validate_vanity(&self) -> ServerResult<()> {
        let invalid = |s: &str| s.is_empty() || s.contains(['/', ':', '*', '{', '}']);
        let hook_root = self.hook_path.trim_start_matches('/').split('/').next().unwrap_or("");
        let mut seen = BTreeSet::new();
        let names = self
            .vanity
            .packages
            .iter()
            .chain(self.vanity.versioned.iter().map(|p| &p.name));
        for name in names {
            if invalid(name.as_str()) {
                return Err(ServerError::Config(format!("invalid vanity package name {name:?}")));
            }
            if !seen.insert(name.as_str()) {
                return Err(ServerError::Config(format!("vanity package {name:?} listed twice")));
            }
            if name == hook_root {
                return Err(ServerError::Config(format!(
                    "vanity package {name:?} collides with hook_path"
                )));
            }
        }
        for pkg in &self.vanity.versioned {
            if invalid(pkg.default_version.as_str()) || pkg.versions.iter().any(|v| invalid(v.as_str())) {
                return Err(ServerError::Config(format!(
                    "invalid versions for vanity package {:?}",
                    pkg.name
                )));
            }
        }
        Ok(())
    }

    fn validate_redirects(&self) -> ServerResult<()> {
        if let Some((host, _)) = self.redirects.hosts.iter().find(|(_, to)| !is_absolute_url(to)) {
            return Err(ServerError::Config(format!(
                "redirects.hosts[{host}] must be an absolute URL"
            )));
        }
        for (from, to) in &self.redirects.paths {
            if !from.starts_with('/') || !is_absolute_url(to) {
                return Err(ServerError::Config(format!(
                    "redirects.paths[{from}] must map a path to an absolute URL"
                )));
            }
        }
        Ok(())
    }
}
