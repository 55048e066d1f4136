//! # graphite-mempool
//!
//! The transaction pool. Admission runs structural, signature and conflict
//! checks against the current best tip's UTXO set; no two pooled
//! transactions may share an outpoint and coinbases are never admitted.
//!
//! Mutations are serialized through one actor task, mirroring the chainstate
//! discipline. Reads are served lock-free from a shared index and may run
//! concurrently with the writer.

mod error;
mod pool;

pub use error::{MempoolError, MempoolResult};
pub use pool::{spawn_mempool_actor, MempoolConfig, MempoolHandle, PooledTx};
