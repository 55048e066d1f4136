//! # graphite-pow
//!
//! Proof-of-Work for the Graphite blockchain.
//!
//! Graphite miners search for an 8-edge cycle in a bipartite graph whose
//! edges are derived from a dependent chain of AES and small dense-matrix
//! operations over a multi-megabyte scratchpad. The chain makes edge `i`
//! depend on every edge before it, so there is no shortcut to computing a
//! sparse subset of edges: this is the memory-hardness property.
//!
//! This crate provides:
//! - Per-epoch graph parameter derivation
//! - The scratchpad and edge generator
//! - Degree-1 trimming (parallel kernel plus a CPU reference)
//! - Bounded DFS cycle search
//! - Compact difficulty encoding, retarget algebra and work scoring
//! - The 80-byte header and 120-byte proof codecs
//! - The consensus proof verifier

mod cycle;
mod difficulty;
mod edges;
mod error;
mod params;
mod proof;
mod scratchpad;
mod trimmer;
mod verifier;

pub use cycle::{forms_valid_cycle, CycleFinder, CYCLE_LEN};
pub use difficulty::{
    compact_to_target, hash_meets_target, retarget, target_to_compact, work_for_bits,
};
pub use edges::{Edge, EdgeGenerator};
pub use error::{PowError, PowResult};
pub use params::{GraphParams, EPOCH_BLOCKS};
pub use proof::{parse_header_bits, BlockHeader, Proof, HEADER_BYTES, PROOF_BYTES};
pub use scratchpad::Scratchpad;
pub use trimmer::{trim, trim_reference};
pub use verifier::{Verifier, VerifyConfig};
