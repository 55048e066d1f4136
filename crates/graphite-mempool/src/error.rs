//! Error types for the mempool.

use thiserror::Error;

/// Mempool errors.
#[derive(Error, Debug)]
pub enum MempoolError {
    /// Transaction already pooled; idempotent no-op for callers.
    #[error("Transaction already in mempool")]
    Duplicate,

    /// Transaction failed an admission check; terminal.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The chainstate could not be queried.
    #[error("Chainstate unavailable: {0}")]
    Chain(#[from] graphite_chain::ChainError),

    /// The mempool actor is gone.
    #[error("Mempool service unavailable")]
    ServiceUnavailable,
}

/// Result type for mempool operations.
pub type MempoolResult<T> = Result<T, MempoolError>;
