//! # graphite-chain
//!
//! The Graphite ledger: UTXO-style transactions with ed25519 pay-to-pubkey
//! scripts, block validation, heaviest-work fork choice with deterministic
//! tie-breaking, difficulty retargeting, and durable chainstate that replays
//! persisted blocks on restart.
//!
//! The chainstate is a serialized service: all mutations flow through one
//! actor task draining a request queue, so there is at most one writer and
//! no externally visible locking.

mod actor;
mod block;
mod error;
mod genesis;
pub mod params;
mod state;
mod transaction;

pub use actor::{spawn_chain_actor, ChainHandle};
pub use block::{merkle_root, Block};
pub use error::{ChainError, ChainResult};
pub use genesis::mainnet_genesis;
pub use state::{ChainState, ChainTip, SubmitOutcome, ValidationPolicy};
pub use transaction::{
    sighash, sign_input, OutPoint, Transaction, TxInput, TxOutput, LOCKING_SCRIPT_TAG,
};
