/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object does not exist in the bucket.
    #[error("object not found: {container}/{name}")]
    NotFound { container: String, name: String },

    /// The store answered with a failure other than "not found".
    #[error("fetch failed with status {code}: {message}")]
    Fetch { code: u16, message: String },

    /// The fetch did not complete within its deadline.
    #[error("fetch timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The object name cannot be addressed in the store.
    #[error("invalid object name: {0}")]
    InvalidName(String),

    /// The store endpoint URL is unusable.
    #[error("invalid store URL: {0}")]
    InvalidUrl(String),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),

    /// I/O error while talking to the backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Build a fetch error, defaulting to 500 when the store gave no code.
    pub fn fetch(code: Option<u16>, message: impl Into<String>) -> Self {
        Self::Fetch {
            code: code.unwrap_or(500),
            message: message.into(),
        }
    }

    /// HTTP status code to surface to a client for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Fetch { code, .. } => *code,
            Self::Timeout(_) => 504,
            Self::InvalidName(_) => 400,
            Self::InvalidUrl(_) | Self::Client(_) => 500,
            Self::Io(_) => 500,
        }
    }

    /// Returns `true` for the expected "object absent" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
