//! The mainnet genesis block.
//!
//! Genesis has no parent, so its proof is never verified; it anchors the
//! chain purely by hash. The coinbase pays the initial subsidy to a burn
//! script nobody holds a key for.

use crate::params::{subsidy, MIN_BITS};
use crate::{merkle_root, Block, Transaction, TxOutput, LOCKING_SCRIPT_TAG};
use graphite_pow::{BlockHeader, Proof};

/// Fixed genesis timestamp: 2025-01-01T00:00:00Z.
const GENESIS_TIMESTAMP: u32 = 1_735_689_600;

/// Build the canonical mainnet genesis block.
pub fn mainnet_genesis() -> Block {
    let mut burn_script = vec![LOCKING_SCRIPT_TAG];
    burn_script.extend_from_slice(&[0u8; 32]);
    let coinbase = Transaction::coinbase(
        0,
        vec![TxOutput {
            value: subsidy(0),
            locking_script: burn_script,
        }],
    );

    let header = BlockHeader {
        version: 1,
        prev_hash: [0u8; 32],
        merkle_root: merkle_root(&[coinbase.txid()]),
        timestamp: GENESIS_TIMESTAMP,
        bits: MIN_BITS,
    };
    Block {
        proof: Proof {
            header: header.serialize(),
            nonce: 0,
            cycle_edges: [0, 1, 2, 3, 4, 5, 6, 7],
        },
        header,
        transactions: vec![coinbase],
    }
}
