//! Error types for the network layer.

use thiserror::Error;

/// Network errors. Transport-level failures close the offending peer only.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame exceeded the size cap; the peer is disconnected.
    #[error("Frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),

    /// Peer violated the protocol; the peer is disconnected.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Message could not be encoded.
    #[error("Encode error: {0}")]
    Encode(String),
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
