//! # graphite-storage
//!
//! Durable block storage. The layout under a storage directory is one file
//! per block, `blocks/<hex_hash>.blk`, holding the raw serialized block,
//! plus a `meta.json` with the best-hash marker. All writes are atomic
//! write-then-rename, so a crash never leaves a torn file behind.

mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::BlockStore;
