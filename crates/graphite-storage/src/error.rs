//! Error types for block storage.

use thiserror::Error;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed metadata file.
    #[error("Metadata error: {0}")]
    Metadata(String),
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
