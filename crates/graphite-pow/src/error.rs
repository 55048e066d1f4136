//! Error types for proof-of-work operations.

use thiserror::Error;

/// Proof-of-work errors.
#[derive(Error, Debug)]
pub enum PowError {
    /// Invalid graph parameters.
    #[error("Invalid graph parameters: {0}")]
    Params(String),

    /// Malformed proof or header bytes.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Proof failed a structural or consensus check.
    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    /// Proof hash does not meet the difficulty target.
    #[error("Proof hash does not meet target")]
    TargetNotMet,
}

/// Result type for proof-of-work operations.
pub type PowResult<T> = Result<T, PowError>;
