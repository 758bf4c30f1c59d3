//! Error types for the response cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the response cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Caller error: empty key, non-positive max age, negative size
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The SQLite backing file could not be read or written
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// File metadata could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row holds a value that cannot be turned back into an item
    #[error("Corrupt entry for key '{key}': {reason}")]
    CorruptEntry { key: String, reason: String },
}

impl CacheError {
    /// Shorthand for the empty-key rejection shared by every keyed operation.
    pub(crate) fn empty_key() -> Self {
        CacheError::InvalidArgument("Key cannot be empty".to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the response cache.
pub type Result<T> = std::result::Result<T, CacheError>;
