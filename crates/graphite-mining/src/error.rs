//! Error types for mining.

use thiserror::Error;

/// Mining errors.
#[derive(Error, Debug)]
pub enum MiningError {
    /// Candidate assembly failed.
    #[error("Candidate failed: {0}")]
    CandidateFailed(String),

    /// Chainstate query failed.
    #[error("Chain error: {0}")]
    Chain(#[from] graphite_chain::ChainError),
}

/// Result type for mining operations.
pub type MiningResult<T> = Result<T, MiningError>;
