//! Chainstate: block validation, UTXO tracking and fork choice.
//!
//! Every accepted block becomes an immutable [`ChainNode`] owning a full
//! UTXO snapshot derived from its parent's. Fork choice never unwinds the
//! losing branch; both sides stay in the node map and the best pointer moves
//! to the heaviest tip, breaking ties toward the lexicographically smaller
//! hash. Persistence is one file per block plus a best-hash marker; on
//! restart every non-genesis block is re-validated against its parent and
//! the snapshots rebuilt.

use crate::params::{
    subsidy, BLOCKS_PER_ADJUSTMENT, MAX_BLOCK_BYTES, MAX_BLOCK_TXS, MAX_FUTURE_DRIFT_SECS,
    MIN_BITS, TARGET_BLOCK_SECONDS,
};
use crate::{merkle_root, Block, ChainError, ChainResult, OutPoint, TxOutput};
use graphite_pow::{retarget, work_for_bits, GraphParams, Verifier, VerifyConfig};
use graphite_storage::BlockStore;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Which optional checks block validation enforces.
#[derive(Debug, Clone, Copy)]
pub struct ValidationPolicy {
    /// Verify the proof-of-work (including the expected-bits retarget check).
    pub require_pow: bool,
    /// Verify transaction signatures.
    pub require_signatures: bool,
}

impl ValidationPolicy {
    /// Full consensus validation.
    pub fn secure() -> Self {
        Self {
            require_pow: true,
            require_signatures: true,
        }
    }

    /// Skip proof-of-work; for tests and private harnesses.
    pub fn relaxed() -> Self {
        Self {
            require_pow: false,
            require_signatures: true,
        }
    }

    /// Skip everything optional.
    pub fn insecure() -> Self {
        Self {
            require_pow: false,
            require_signatures: false,
        }
    }
}

/// The current best tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    /// Block hash of the tip.
    pub hash: [u8; 32],
    /// Height of the tip.
    pub height: u64,
    /// Cumulative work up to the tip.
    pub total_work: u64,
    /// Compact bits the tip was mined at.
    pub bits: u32,
}

/// Outcome of a block submission.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Block accepted and indexed.
    Accepted {
        /// Hash of the accepted block.
        hash: [u8; 32],
        /// Height it landed at.
        height: u64,
        /// Whether the block became the best tip.
        became_best: bool,
        /// Ids of its non-coinbase transactions, for mempool eviction.
        confirmed_txids: Vec<[u8; 32]>,
    },
    /// Block already known; idempotent no-op.
    Duplicate,
    /// Parent unknown; caller should backfill.
    Orphan {
        /// The missing parent hash.
        parent_hash: [u8; 32],
    },
    /// Block violates policy or consensus; terminal.
    Rejected {
        /// Human-readable reason.
        reason: String,
    },
}

/// An accepted block with its derived state. Never mutated after insertion.
struct ChainNode {
    block: Block,
    parent_hash: Option<[u8; 32]>,
    height: u64,
    total_work: u64,
    utxo: HashMap<OutPoint, TxOutput>,
}

/// The block tree and UTXO state.
///
/// Not internally synchronized: exclusive ownership lives with the chain
/// actor, which serializes all access.
pub struct ChainState {
    nodes: HashMap<[u8; 32], ChainNode>,
    best: [u8; 32],
    genesis_hash: [u8; 32],
    policy: ValidationPolicy,
    store: Option<BlockStore>,
}

impl ChainState {
    /// Initialize from a genesis block and an optional storage directory.
    ///
    /// With storage, every persisted block is replayed in topological order
    /// and re-validated; a single invalid or unconnectable block aborts
    /// startup. The best-hash marker is repaired if stale.
    pub fn open(
        genesis: Block,
        policy: ValidationPolicy,
        store: Option<BlockStore>,
    ) -> ChainResult<Self> {
        let genesis_hash = genesis.hash();

        let mut state = Self {
            nodes: HashMap::new(),
            best: genesis_hash,
            genesis_hash,
            policy,
            store,
        };
        state.insert_genesis(genesis)?;

        let Some(store) = state.store.as_ref() else {
            return Ok(state);
        };

        // Gather persisted blocks, then walk the tree parents-first.
        let mut by_parent: HashMap<[u8; 32], Vec<Block>> = HashMap::new();
        let mut pending = 0usize;
        for (hash, bytes) in store.load_all_blocks()? {
            if hash == genesis_hash {
                continue;
            }
            let block = Block::deserialize(&bytes).map_err(|e| ChainError::ReplayFailed {
                hash: hex::encode(hash),
                reason: e.to_string(),
            })?;
            by_parent
                .entry(block.header.prev_hash)
                .or_default()
                .push(block);
            pending += 1;
        }

        let mut queue = vec![genesis_hash];
        while let Some(parent) = queue.pop() {
            for block in by_parent.remove(&parent).unwrap_or_default() {
                let hash = block.hash();
                match state.submit_block(block) {
                    SubmitOutcome::Accepted { .. } | SubmitOutcome::Duplicate => {
                        pending -= 1;
                        queue.push(hash);
                    }
                    SubmitOutcome::Orphan { parent_hash } => {
                        return Err(ChainError::ReplayFailed {
                            hash: hex::encode(hash),
                            reason: format!("parent {} missing", hex::encode(parent_hash)),
                        });
                    }
                    SubmitOutcome::Rejected { reason } => {
                        return Err(ChainError::ReplayFailed {
                            hash: hex::encode(hash),
                            reason,
                        });
                    }
                }
            }
        }
        if pending > 0 {
            return Err(ChainError::ReplayFailed {
                hash: "-".into(),
                reason: format!("{} persisted blocks are not connected to genesis", pending),
            });
        }

        // Repair a stale best marker.
        let store = state.store.as_ref().unwrap();
        if store.get_best_hash()? != Some(state.best) {
            store.put_best_hash(&state.best)?;
            info!(best = %hex::encode(state.best), "repaired best-hash marker");
        }

        let tip = state.tip();
        info!(
            height = tip.height,
            best = %hex::encode(tip.hash),
            blocks = state.nodes.len(),
            "chainstate ready"
        );
        Ok(state)
    }

    /// Validate the genesis block and seed the node map with it.
    fn insert_genesis(&mut self, genesis: Block) -> ChainResult<()> {
        self.check_standalone(&genesis)
            .map_err(|e| ChainError::Rejected(format!("genesis invalid: {}", e)))?;
        let mut utxo = HashMap::new();
        self.apply_transactions(&genesis, 0, &mut utxo)
            .map_err(|e| ChainError::Rejected(format!("genesis invalid: {}", e)))?;

        let node = ChainNode {
            total_work: work_for_bits(genesis.header.bits),
            parent_hash: None,
            height: 0,
            utxo,
            block: genesis,
        };
        if let Some(store) = &self.store {
            if !store.contains_block(&self.genesis_hash) {
                store.put_block(&self.genesis_hash, &node.block.serialize())?;
            }
        }
        self.nodes.insert(self.genesis_hash, node);
        Ok(())
    }

    /// The accept pipeline for a submitted block.
    pub fn submit_block(&mut self, block: Block) -> SubmitOutcome {
        let hash = block.hash();
        if self.nodes.contains_key(&hash) {
            return SubmitOutcome::Duplicate;
        }

        if let Err(e) = self.check_standalone(&block) {
            return SubmitOutcome::Rejected {
                reason: e.to_string(),
            };
        }

        let parent_hash = block.header.prev_hash;
        let Some(parent) = self.nodes.get(&parent_hash) else {
            debug!(hash = %hex::encode(hash), parent = %hex::encode(parent_hash), "orphan block");
            return SubmitOutcome::Orphan { parent_hash };
        };

        if block.header.timestamp <= parent.block.header.timestamp {
            return SubmitOutcome::Rejected {
                reason: "timestamp not after parent".into(),
            };
        }
        if u64::from(block.header.timestamp) > unix_now() + MAX_FUTURE_DRIFT_SECS {
            return SubmitOutcome::Rejected {
                reason: "timestamp too far in the future".into(),
            };
        }

        let height = parent.height + 1;
        let mut utxo = parent.utxo.clone();
        if let Err(e) = self.apply_transactions(&block, height, &mut utxo) {
            return SubmitOutcome::Rejected {
                reason: e.to_string(),
            };
        }

        if self.policy.require_pow {
            let expected_bits = self.bits_for_child_of(parent_hash);
            let verifier = Verifier::new(VerifyConfig {
                params: GraphParams::for_height(height),
                expected_bits: Some(expected_bits),
                min_bits: MIN_BITS,
            });
            if let Err(e) = verifier.verify(&block.proof) {
                return SubmitOutcome::Rejected {
                    reason: e.to_string(),
                };
            }
        }

        let total_work = parent
            .total_work
            .wrapping_add(work_for_bits(block.header.bits));
        let confirmed_txids = block
            .transactions
            .iter()
            .skip(1)
            .map(|tx| tx.txid())
            .collect();

        // Storage failure is logged, not fatal: in-memory state stays
        // authoritative and a later restart may re-persist.
        if let Some(store) = &self.store {
            if let Err(e) = store.put_block(&hash, &block.serialize()) {
                warn!(hash = %hex::encode(hash), error = %e, "failed to persist block");
            }
        }

        self.nodes.insert(
            hash,
            ChainNode {
                block,
                parent_hash: Some(parent_hash),
                height,
                total_work,
                utxo,
            },
        );

        let best = self.nodes.get(&self.best).expect("best node exists");
        let became_best =
            total_work > best.total_work || (total_work == best.total_work && hash < self.best);
        if became_best {
            self.best = hash;
            if let Some(store) = &self.store {
                if let Err(e) = store.put_best_hash(&hash) {
                    warn!(error = %e, "failed to persist best-hash marker");
                }
            }
        }

        info!(
            height,
            hash = %hex::encode(hash),
            became_best,
            "block accepted"
        );
        SubmitOutcome::Accepted {
            hash,
            height,
            became_best,
            confirmed_txids,
        }
    }

    /// Checks independent of the parent: size, counts, structure, proof
    /// binding and merkle commitment.
    fn check_standalone(&self, block: &Block) -> ChainResult<()> {
        if block.transactions.is_empty() {
            return Err(ChainError::Rejected("block has no transactions".into()));
        }
        if block.transactions.len() > MAX_BLOCK_TXS {
            return Err(ChainError::Rejected("too many transactions".into()));
        }
        if block.serialize().len() > MAX_BLOCK_BYTES {
            return Err(ChainError::Rejected("block too large".into()));
        }
        for tx in &block.transactions {
            tx.check_structure()?;
        }
        if block.proof.header != block.header.serialize() {
            return Err(ChainError::Rejected(
                "proof does not commit to the header".into(),
            ));
        }
        let txids = block.txids();
        if block.header.merkle_root != merkle_root(&txids) {
            return Err(ChainError::Rejected("merkle root mismatch".into()));
        }
        let mut sorted = txids;
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(ChainError::Rejected("duplicate txid in block".into()));
        }
        Ok(())
    }

    /// Apply the block's transactions to a working UTXO set.
    fn apply_transactions(
        &self,
        block: &Block,
        height: u64,
        utxo: &mut HashMap<OutPoint, TxOutput>,
    ) -> ChainResult<()> {
        let coinbase = &block.transactions[0];
        if !coinbase.is_coinbase() {
            return Err(ChainError::Rejected(
                "first transaction is not a coinbase".into(),
            ));
        }
        if coinbase.coinbase_height()? != height {
            return Err(ChainError::Rejected(
                "coinbase encodes the wrong height".into(),
            ));
        }
        let coinbase_txid = coinbase.txid();
        for (vout, output) in coinbase.outputs.iter().enumerate() {
            utxo.insert(
                OutPoint {
                    txid: coinbase_txid,
                    vout: vout as u32,
                },
                output.clone(),
            );
        }

        let mut total_fees: u64 = 0;
        for tx in &block.transactions[1..] {
            if tx.is_coinbase() {
                return Err(ChainError::Rejected("misplaced coinbase".into()));
            }
            let mut sum_in: u64 = 0;
            for (index, input) in tx.inputs.iter().enumerate() {
                let spent = utxo.remove(&input.prev).ok_or_else(|| {
                    ChainError::Rejected(format!(
                        "input {}:{} missing or already spent",
                        hex::encode(input.prev.txid),
                        input.prev.vout
                    ))
                })?;
                if self.policy.require_signatures {
                    tx.verify_input(index, &spent)?;
                }
                sum_in = sum_in
                    .checked_add(spent.value)
                    .ok_or_else(|| ChainError::Rejected("input value overflow".into()))?;
            }
            let sum_out = tx.output_total();
            if sum_in < sum_out {
                return Err(ChainError::Rejected("outputs exceed inputs".into()));
            }
            total_fees = total_fees
                .checked_add(sum_in - sum_out)
                .ok_or_else(|| ChainError::Rejected("fee overflow".into()))?;

            let txid = tx.txid();
            for (vout, output) in tx.outputs.iter().enumerate() {
                utxo.insert(
                    OutPoint {
                        txid,
                        vout: vout as u32,
                    },
                    output.clone(),
                );
            }
        }

        let allowed = subsidy(height).saturating_add(total_fees);
        if coinbase.output_total() > allowed {
            return Err(ChainError::Rejected(format!(
                "coinbase pays {} but only {} is allowed",
                coinbase.output_total(),
                allowed
            )));
        }
        Ok(())
    }

    /// Compact bits required for a child of `parent_hash`.
    ///
    /// Retargets every `BLOCKS_PER_ADJUSTMENT` blocks; the window walks back
    /// `BLOCKS_PER_ADJUSTMENT - 1` parents and the expected timespan covers
    /// that many intervals.
    pub fn bits_for_child_of(&self, parent_hash: [u8; 32]) -> u32 {
        let Some(parent) = self.nodes.get(&parent_hash) else {
            return MIN_BITS;
        };
        let child_height = parent.height + 1;
        if child_height == 0 || child_height % BLOCKS_PER_ADJUSTMENT != 0 {
            return parent.block.header.bits;
        }

        let window = BLOCKS_PER_ADJUSTMENT - 1;
        let mut anchor = parent;
        for _ in 0..window {
            let Some(previous) = anchor.parent_hash.and_then(|h| self.nodes.get(&h)) else {
                break;
            };
            anchor = previous;
        }
        let actual = u64::from(parent.block.header.timestamp)
            .saturating_sub(u64::from(anchor.block.header.timestamp))
            .max(1);
        let expected = TARGET_BLOCK_SECONDS * window;
        retarget(parent.block.header.bits, actual, expected, MIN_BITS)
    }

    /// Bits required for the next block on the best chain.
    pub fn next_bits(&self) -> u32 {
        self.bits_for_child_of(self.best)
    }

    /// The current best tip.
    pub fn tip(&self) -> ChainTip {
        let node = self.nodes.get(&self.best).expect("best node exists");
        ChainTip {
            hash: self.best,
            height: node.height,
            total_work: node.total_work,
            bits: node.block.header.bits,
        }
    }

    /// Whether a block hash is known.
    pub fn contains(&self, hash: &[u8; 32]) -> bool {
        self.nodes.contains_key(hash)
    }

    /// Fetch a block by hash.
    pub fn get_block(&self, hash: &[u8; 32]) -> Option<Block> {
        self.nodes.get(hash).map(|n| n.block.clone())
    }

    /// Look up an unspent output in the best tip's UTXO set.
    pub fn utxo_entry(&self, outpoint: &OutPoint) -> Option<TxOutput> {
        self.nodes
            .get(&self.best)
            .and_then(|n| n.utxo.get(outpoint).cloned())
    }

    /// Size of the best tip's UTXO set.
    pub fn utxo_len(&self) -> usize {
        self.nodes.get(&self.best).map_or(0, |n| n.utxo.len())
    }

    /// The genesis hash.
    pub fn genesis_hash(&self) -> [u8; 32] {
        self.genesis_hash
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
