//! Entity error model.

use thiserror::Error;

/// Result type used across the entity layer.
pub type EntityResult<T> = Result<T, EntityError>;

/// Entity-level error.
///
/// Every variant surfaces directly to the caller. Nothing is retried or swallowed
/// below this type, and multi-step writes are never rolled back on failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// A required identity or domain field is missing or invalid.
    ///
    /// Always raised before any call reaches the store.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A conditional create found an item already present at the key.
    #[error("item already exists: {0}")]
    ConflictExists(String),

    /// The store reported that the target item does not exist.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// The operation is not allowed for this record kind.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A sort key could not be built from, or parsed against, its template.
    #[error("malformed key: {0}")]
    MalformedKey(String),

    /// A batched write returned with keys the store did not process.
    #[error("batch write left {0} item(s) unprocessed")]
    Unprocessed(usize),

    /// Any other failure reported by the underlying store.
    #[error("store error: {0}")]
    Store(String),
}

impl EntityError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConflictExists(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::RecordNotFound(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    pub fn malformed_key(msg: impl Into<String>) -> Self {
        Self::MalformedKey(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}
