//! Error types for the data store.

use crate::key::ContentDigest;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data not found: {0}")]
    NotFound(String),

    #[error("Digest mismatch for {path}: expected {expected}, got {got}")]
    DigestMismatch {
        path: String,
        expected: ContentDigest,
        got: ContentDigest,
    },

    #[error("Invalid store configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown store type: {0}")]
    UnknownStoreType(String),

    #[error("Archive integrity failure: {0}")]
    ArchiveIntegrity(String),
}

impl StoreError {
    /// Whether this error means "the requested data is unavailable",
    /// covering both plain absence and a stale digest. Callers that treat
    /// a mismatch like a miss can branch on this instead of matching both
    /// variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::DigestMismatch { .. }
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
