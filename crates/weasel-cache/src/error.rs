/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache backend failed or is unreachable.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// An entry could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The value exceeds the backend's per-item limit.
    #[error("value of {size} bytes exceeds the {max} byte item limit")]
    TooLarge { size: usize, max: usize },
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
