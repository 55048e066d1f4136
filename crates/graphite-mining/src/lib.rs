//! # graphite-mining
//!
//! CPU mining for Graphite. A pool of worker threads shares the nonce space;
//! each worker owns its scratchpad and edge generator, runs the
//! generate-trim-search pipeline per nonce, and reports solutions over a
//! channel. Workers poll a cancel flag between nonces and may finish the
//! nonce in flight.

mod candidate;
mod error;
mod solver;
mod worker;

pub use candidate::{BlockTemplate, CandidateGenerator};
pub use error::{MiningError, MiningResult};
pub use solver::CycleSolver;
pub use worker::{FoundSolution, MiningTask, WorkerPool};
