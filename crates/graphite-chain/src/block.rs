//! Blocks and the transaction merkle tree.

use crate::transaction::Reader;
use crate::{ChainError, ChainResult, Transaction};
use graphite_pow::{BlockHeader, Proof};
use sha2::{Digest, Sha256};

/// A full block: header, proof-of-work, transactions.
///
/// Invariants checked at validation time: the proof's embedded header bytes
/// equal the serialized header, the header's merkle root matches the
/// transactions, the first transaction is a coinbase, and txids are unique
/// within the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Proof-of-work solution committing to the header.
    pub proof: Proof,
    /// Transactions; the first must be the coinbase.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Serialize: `header | proof_len:u32 | proof | tx_count:u32 |
    /// (tx_len:u32 | tx)*`, all little-endian.
    pub fn serialize(&self) -> Vec<u8> {
        let proof = self.proof.serialize();
        let mut out = Vec::new();
        out.extend_from_slice(&self.header.serialize());
        out.extend_from_slice(&(proof.len() as u32).to_le_bytes());
        out.extend_from_slice(&proof);
        out.extend_from_slice(&(self.transactions.len() as u32).to_le_bytes());
        for tx in &self.transactions {
            let bytes = tx.serialize();
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&bytes);
        }
        out
    }

    /// Parse a block, consuming the whole slice.
    pub fn deserialize(bytes: &[u8]) -> ChainResult<Self> {
        let mut reader = Reader::new(bytes);

        let header_bytes = reader.bytes(graphite_pow::HEADER_BYTES)?;
        let header = BlockHeader::deserialize(header_bytes)?;

        let proof_len = reader.u32()? as usize;
        let proof = Proof::deserialize(reader.bytes(proof_len)?)?;

        let tx_count = reader.u32()? as usize;
        if tx_count > crate::params::MAX_BLOCK_TXS {
            return Err(ChainError::Serialization(format!(
                "transaction count {} exceeds limit",
                tx_count
            )));
        }
        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            let tx_len = reader.u32()? as usize;
            let tx_bytes = reader.bytes(tx_len)?;
            transactions.push(Transaction::deserialize(tx_bytes)?);
        }

        if !reader.is_empty() {
            return Err(ChainError::Serialization(
                "trailing bytes after block".into(),
            ));
        }
        Ok(Self {
            header,
            proof,
            transactions,
        })
    }

    /// The block hash: SHA-256 of the serialized header.
    pub fn hash(&self) -> [u8; 32] {
        self.header.hash()
    }

    /// Ids of all transactions, in block order.
    pub fn txids(&self) -> Vec<[u8; 32]> {
        self.transactions.iter().map(|tx| tx.txid()).collect()
    }
}

/// Merkle root over transaction ids.
///
/// Levels hash `SHA256(left || right)`; an odd level duplicates its last
/// hash. The empty list yields the all-zero root.
pub fn merkle_root(txids: &[[u8; 32]]) -> [u8; 32] {
    if txids.is_empty() {
        return [0u8; 32];
    }
    let mut level = txids.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        level = level
            .chunks_exact(2)
            .map(|pair| {
                let mut hasher = Sha256::new();
                hasher.update(pair[0]);
                hasher.update(pair[1]);
                hasher.finalize().into()
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TxOutput;
    use graphite_pow::HEADER_BYTES;

    fn sample_block() -> Block {
        let coinbase = Transaction::coinbase(
            0,
            vec![TxOutput {
                value: 50,
                locking_script: vec![0x01; 33],
            }],
        );
        let header = BlockHeader {
            version: 1,
            prev_hash: [0u8; 32],
            merkle_root: merkle_root(&[coinbase.txid()]),
            timestamp: 1_700_000_000,
            bits: 0x2100_ffff,
        };
        let proof = Proof {
            header: header.serialize(),
            nonce: 3,
            cycle_edges: [0, 1, 2, 3, 4, 5, 6, 7],
        };
        Block {
            header,
            proof,
            transactions: vec![coinbase],
        }
    }

    #[test]
    fn test_block_roundtrip() {
        let block = sample_block();
        let bytes = block.serialize();
        assert_eq!(Block::deserialize(&bytes).unwrap(), block);
    }

    #[test]
    fn test_block_rejects_truncation() {
        let bytes = sample_block().serialize();
        for cut in [0, HEADER_BYTES - 1, HEADER_BYTES + 2, bytes.len() - 1] {
            assert!(Block::deserialize(&bytes[..cut]).is_err());
        }
    }

    #[test]
    fn test_block_rejects_trailing_bytes() {
        let mut bytes = sample_block().serialize();
        bytes.push(0xFF);
        assert!(Block::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_merkle_empty_is_zero() {
        assert_eq!(merkle_root(&[]), [0u8; 32]);
    }

    #[test]
    fn test_merkle_single_is_identity() {
        let txid = [9u8; 32];
        assert_eq!(merkle_root(&[txid]), txid);
    }

    #[test]
    fn test_merkle_odd_count_duplicates_last() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let c = [3u8; 32];
        // Three leaves behave as four with the last duplicated.
        assert_eq!(merkle_root(&[a, b, c]), merkle_root(&[a, b, c, c]));
    }

    #[test]
    fn test_merkle_order_matters() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }
}
