//! Shared fixtures: deterministic test chains, keys and block builders.

use ed25519_dalek::SigningKey;
use graphite_chain::{
    merkle_root, params::subsidy, Block, ChainState, Transaction, TxOutput, ValidationPolicy,
};
use graphite_pow::{BlockHeader, Proof};
use graphite_storage::BlockStore;
use rand::rngs::OsRng;
use tempfile::TempDir;

/// Compact bits easy enough that any proof hash passes.
pub const EASY_BITS: u32 = 0x2100_ffff;

/// Timestamp base for generated chains.
pub const T0: u32 = 1_700_000_000;

/// A fresh signing key.
pub fn keypair() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Build a block at `height` on `prev_hash` carrying `txs` after the
/// coinbase. The proof is a placeholder bound to the header; pair with a
/// relaxed [`ValidationPolicy`].
pub fn build_block(
    prev_hash: [u8; 32],
    height: u64,
    timestamp: u32,
    mut txs: Vec<Transaction>,
    reward_to: &SigningKey,
) -> Block {
    let coinbase = Transaction::coinbase(
        height,
        vec![TxOutput::pay_to_pubkey(
            subsidy(height),
            &reward_to.verifying_key(),
        )],
    );
    let mut transactions = vec![coinbase];
    transactions.append(&mut txs);

    let txids: Vec<[u8; 32]> = transactions.iter().map(|tx| tx.txid()).collect();
    let header = BlockHeader {
        version: 1,
        prev_hash,
        merkle_root: merkle_root(&txids),
        timestamp,
        bits: EASY_BITS,
    };
    Block {
        proof: Proof {
            header: header.serialize(),
            nonce: height,
            cycle_edges: [0, 1, 2, 3, 4, 5, 6, 7],
        },
        header,
        transactions,
    }
}

/// A genesis block whose coinbase pays `reward_to`.
pub fn test_genesis(reward_to: &SigningKey) -> Block {
    build_block([0u8; 32], 0, T0, Vec::new(), reward_to)
}

/// An in-memory chainstate under the relaxed policy.
pub fn memory_chain(reward_to: &SigningKey) -> ChainState {
    ChainState::open(test_genesis(reward_to), ValidationPolicy::relaxed(), None)
        .expect("test genesis must open")
}

/// A disk-backed chainstate in a fresh temp directory.
pub fn disk_chain(reward_to: &SigningKey) -> (ChainState, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let store = BlockStore::open(dir.path()).expect("store");
    let state = ChainState::open(
        test_genesis(reward_to),
        ValidationPolicy::relaxed(),
        Some(store),
    )
    .expect("test genesis must open");
    (state, dir)
}

/// Extend a chain with `count` empty blocks, returning the new tip hash.
pub fn extend_chain(
    state: &mut ChainState,
    from: [u8; 32],
    from_height: u64,
    base_timestamp: u32,
    count: u64,
    key: &SigningKey,
) -> [u8; 32] {
    let mut parent = from;
    for i in 1..=count {
        let block = build_block(
            parent,
            from_height + i,
            base_timestamp + i as u32,
            Vec::new(),
            key,
        );
        parent = block.hash();
        match state.submit_block(block) {
            graphite_chain::SubmitOutcome::Accepted { .. } => {}
            other => panic!("extension block not accepted: {:?}", other),
        }
    }
    parent
}
