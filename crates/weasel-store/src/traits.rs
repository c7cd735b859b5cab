use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::object::ByteStream;

/// Raw response of a store fetch: unfiltered metadata plus the body stream.
pub struct FetchedObject {
    /// Every header or metadata entry the store reported.
    pub metadata: HashMap<String, String>,
    /// The object's bytes. Dropping the stream releases the connection.
    pub body: ByteStream,
}

impl std::fmt::Debug for FetchedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedObject")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Bucket-style object store client.
///
/// Implementations must:
/// - Return [`StoreError::NotFound`](crate::StoreError::NotFound) when the
///   object is absent, and nothing else for that case.
/// - Carry the store's numeric status code in
///   [`StoreError::Fetch`](crate::StoreError::Fetch) for every other failure.
/// - Not retry; callers decide.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch object `name` from bucket `container`.
    async fn fetch(&self, container: &str, name: &str) -> StoreResult<FetchedObject>;
}
