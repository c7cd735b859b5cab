//! Object store access for weasel.
//!
//! This crate defines how the server talks to the bucket-style object store
//! that holds the site's assets. The store itself is opaque: given a bucket
//! and an object name it hands back a byte stream and a metadata map, or an
//! error that distinguishes "not found" from everything else.
//!
//! # Key Types
//!
//! - [`ObjectStore`] -- the fetch-by-name client trait
//! - [`FetchedObject`] -- raw store response (unfiltered metadata + body)
//! - [`Object`] -- one asset as handed to callers: filtered [`Meta`] + body
//!
//! # Backends
//!
//! - [`HttpObjectStore`] -- reads objects over HTTP (GCS public endpoint)
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Metadata is filtered through a fixed allow-list exactly once, at the
//!    fetch boundary ([`filter_meta`]).
//! 2. An [`Object`]'s metadata is never mutated after construction.
//! 3. An [`Object`]'s body is single-use; dropping it releases the underlying
//!    connection.

pub mod error;
pub mod http;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use http::HttpObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{
    filter_meta, ByteStream, Meta, Object, CUSTOM_META_PREFIX, META_REDIRECT, META_REDIRECT_CODE,
    OBJECT_HEADERS,
};
pub use traits::{FetchedObject, ObjectStore};
