//! Error types for the ledger.

use thiserror::Error;

/// Ledger errors.
///
/// Rejections carry a human-readable reason; they are terminal for the
/// offending object and never retried.
#[derive(Error, Debug)]
pub enum ChainError {
    /// Malformed bytes, wrong length, count overflow.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Block or transaction violates policy or consensus rules.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Proof-of-work failure.
    #[error("Proof error: {0}")]
    Pow(#[from] graphite_pow::PowError),

    /// Persistence failure.
    #[error("Storage error: {0}")]
    Storage(#[from] graphite_storage::StoreError),

    /// Startup replay found an invalid persisted block.
    #[error("Replay failed for block {hash}: {reason}")]
    ReplayFailed { hash: String, reason: String },

    /// The chain actor is gone.
    #[error("Chainstate service unavailable")]
    ServiceUnavailable,
}

/// Result type for ledger operations.
pub type ChainResult<T> = Result<T, ChainError>;
