/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object (or bucket) does not exist.
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// A generation precondition did not hold.
    #[error("precondition failed for {bucket}/{key}")]
    PreconditionFailed { bucket: String, key: String },

    /// Missing, expired, or insufficient credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The store answered with an unexpected HTTP status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never got a response (DNS, TLS, connection reset, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// I/O error while reading an upload body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure injected into the in-memory store by a test.
    #[error("injected failure: {op} {key}")]
    Injected { op: String, key: String },
}

impl StoreError {
    /// Returns `true` if the error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Returns `true` if a generation precondition rejected the request.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, StoreError::PreconditionFailed { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
