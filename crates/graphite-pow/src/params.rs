//! Graph parameter derivation.
//!
//! Every run of [`EPOCH_BLOCKS`] consecutive blocks shares one parameter
//! vector. The vector is derived deterministically from the epoch seed, so
//! all nodes agree on graph size, scratchpad size, matrix dimension and the
//! trim round count without exchanging anything.

use crate::{PowError, PowResult};
use sha2::{Digest, Sha256};

/// Number of consecutive blocks sharing one parameter vector.
pub const EPOCH_BLOCKS: u64 = 4096;

/// Smallest permitted scratchpad (12 MiB).
const MIN_SCRATCHPAD_BYTES: usize = 12 * 1024 * 1024;

/// Largest permitted scratchpad (20 MiB).
const MAX_SCRATCHPAD_BYTES: usize = 20 * 1024 * 1024;

/// Domain separator for epoch seed hashing.
const EPOCH_SEED_TAG: &[u8] = b"graphite/epoch";

/// Parameters of the bipartite proof-of-work graph.
///
/// Invariants (upheld by both constructors):
/// - `num_edges` is a power of two
/// - `num_nodes == num_edges / 2` per partition
/// - `node_mask + 1 == num_nodes`
/// - `scratchpad_bytes` is divisible by 16 and large enough for two
///   `matrix_dim x matrix_dim` f32 matrices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphParams {
    /// Scratchpad size in bytes.
    pub scratchpad_bytes: usize,
    /// Number of edges generated per (header, nonce).
    pub num_edges: u32,
    /// Nodes per partition (`num_edges / 2`).
    pub num_nodes: u32,
    /// Low-bit mask applied to raw node values (`num_nodes - 1`).
    pub node_mask: u32,
    /// Dense matrix dimension, one of 8, 16 or 32.
    pub matrix_dim: usize,
    /// Number of trimming rounds.
    pub trim_rounds: u32,
}

impl GraphParams {
    /// Derive the parameter vector for an epoch.
    ///
    /// The epoch seed is `SHA256(tag || epoch_le8)`; individual parameters
    /// are picked from disjoint seed bytes so they vary independently.
    pub fn for_epoch(epoch: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(EPOCH_SEED_TAG);
        hasher.update(epoch.to_le_bytes());
        let seed: [u8; 32] = hasher.finalize().into();

        let num_edges = 1u32 << (23 + (seed[0] % 3) as u32);
        let num_nodes = num_edges / 2;

        let span = (MAX_SCRATCHPAD_BYTES - MIN_SCRATCHPAD_BYTES) as u64;
        let pick = u32::from_le_bytes([seed[1], seed[2], seed[3], seed[4]]) as u64 % span;
        let scratchpad_bytes = (MIN_SCRATCHPAD_BYTES + pick as usize) & !15;

        let matrix_dim = 8usize << (seed[5] % 3);
        let trim_rounds = 60 + (seed[6] % 41) as u32;

        Self {
            scratchpad_bytes,
            num_edges,
            num_nodes,
            node_mask: num_nodes - 1,
            matrix_dim,
            trim_rounds,
        }
    }

    /// Derive the parameter vector governing a block height.
    pub fn for_height(height: u64) -> Self {
        Self::for_epoch(height / EPOCH_BLOCKS)
    }

    /// Build an explicit parameter vector.
    ///
    /// Intended for tests and benches that want small graphs; checks the
    /// structural invariants but not the consensus size ranges.
    pub fn custom(
        scratchpad_bytes: usize,
        num_edges: u32,
        matrix_dim: usize,
        trim_rounds: u32,
    ) -> PowResult<Self> {
        if !num_edges.is_power_of_two() || num_edges < 4 {
            return Err(PowError::Params(format!(
                "num_edges must be a power of two >= 4, got {}",
                num_edges
            )));
        }
        if !matches!(matrix_dim, 8 | 16 | 32) {
            return Err(PowError::Params(format!(
                "matrix_dim must be 8, 16 or 32, got {}",
                matrix_dim
            )));
        }
        let matrix_bytes = matrix_dim * matrix_dim * 4;
        if scratchpad_bytes % 16 != 0 || scratchpad_bytes < 2 * matrix_bytes + 16 {
            return Err(PowError::Params(format!(
                "scratchpad of {} bytes is misaligned or too small for two {}x{} matrices",
                scratchpad_bytes, matrix_dim, matrix_dim
            )));
        }
        let num_nodes = num_edges / 2;
        Ok(Self {
            scratchpad_bytes,
            num_edges,
            num_nodes,
            node_mask: num_nodes - 1,
            matrix_dim,
            trim_rounds,
        })
    }

    /// Bytes occupied by one `matrix_dim x matrix_dim` f32 matrix.
    pub fn matrix_bytes(&self) -> usize {
        self.matrix_dim * self.matrix_dim * 4
    }

    /// Largest scratchpad offset at which two matrices still fit.
    pub fn max_matrix_offset(&self) -> usize {
        self.scratchpad_bytes - 2 * self.matrix_bytes()
    }

    /// Number of 16-byte cells in the scratchpad.
    pub fn scratchpad_cells(&self) -> usize {
        self.scratchpad_bytes / 16
    }
}
