//! Shared cache for fetched objects.
//!
//! The cache holds fully-read objects keyed by `bucket/name`. Values are
//! opaque blobs produced by [`CachedObject::encode`]; backends only see bytes
//! and a time-to-live.
//!
//! # Backends
//!
//! All backends implement the [`SharedCache`] trait:
//!
//! - [`MemoryCache`] -- moka-based in-process cache with per-entry TTL and a
//!   per-item size limit

pub mod entry;
pub mod error;
pub mod memory;
pub mod traits;

pub use entry::{cache_key, CachedObject};
pub use error::{CacheError, CacheResult};
pub use memory::MemoryCache;
pub use traits::SharedCache;
