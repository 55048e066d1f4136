//! Block candidate assembly.

use crate::{MiningError, MiningResult};
use ed25519_dalek::VerifyingKey;
use graphite_chain::{merkle_root, params::subsidy, Block, ChainHandle, Transaction, TxOutput};
use graphite_mempool::MempoolHandle;
use graphite_pow::{BlockHeader, Proof, CYCLE_LEN};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// A candidate ready for the worker pool.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// The block, with a placeholder proof awaiting nonce and cycle.
    pub block: Block,
    /// Height the candidate would land at.
    pub height: u64,
}

impl BlockTemplate {
    /// Bind a solved proof to the template, producing a submittable block.
    pub fn with_proof(mut self, proof: Proof) -> Block {
        self.block.proof = proof;
        self.block
    }
}

/// Builds block candidates from the chain tip and the mempool.
pub struct CandidateGenerator {
    chain: ChainHandle,
    mempool: MempoolHandle,
    reward_pubkey: VerifyingKey,
}

impl CandidateGenerator {
    /// Create a generator paying rewards to `reward_pubkey`.
    pub fn new(chain: ChainHandle, mempool: MempoolHandle, reward_pubkey: VerifyingKey) -> Self {
        Self {
            chain,
            mempool,
            reward_pubkey,
        }
    }

    /// Assemble a candidate on top of the current best tip.
    pub async fn build(&self) -> MiningResult<BlockTemplate> {
        let tip = self.chain.tip().await?;
        let parent = self
            .chain
            .get_block(tip.hash)
            .await?
            .ok_or_else(|| MiningError::CandidateFailed("best block missing".into()))?;
        let bits = self.chain.next_bits().await?;
        let height = tip.height + 1;

        // Pool snapshot; fees fund the coinbase on top of the subsidy.
        let pooled = self.mempool.snapshot();
        let total_fees: u64 = pooled.iter().map(|p| p.fee).sum();
        let transactions: Vec<Transaction> = {
            let coinbase = Transaction::coinbase(
                height,
                vec![TxOutput::pay_to_pubkey(
                    subsidy(height).saturating_add(total_fees),
                    &self.reward_pubkey,
                )],
            );
            std::iter::once(coinbase)
                .chain(pooled.into_iter().map(|p| p.tx))
                .collect()
        };

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        let timestamp = now.max(parent.header.timestamp + 1);

        let txids: Vec<[u8; 32]> = transactions.iter().map(|tx| tx.txid()).collect();
        let header = BlockHeader {
            version: 1,
            prev_hash: tip.hash,
            merkle_root: merkle_root(&txids),
            timestamp,
            bits,
        };
        debug!(height, txs = transactions.len(), "candidate assembled");

        Ok(BlockTemplate {
            block: Block {
                proof: Proof {
                    header: header.serialize(),
                    nonce: 0,
                    cycle_edges: [0; CYCLE_LEN],
                },
                header,
                transactions,
            },
            height,
        })
    }
}
