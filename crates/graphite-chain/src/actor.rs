//! The chainstate actor.
//!
//! All chainstate access flows through one task draining a request queue,
//! giving single-writer semantics without visible locking. Handles are cheap
//! to clone; every operation is a request/oneshot-response pair. Block
//! submission is totally ordered by the queue: once a submit resolves, a
//! subsequent `tip()` observes a tip at least as high as the accepted block
//! if it became best.

use crate::{Block, ChainError, ChainResult, ChainState, ChainTip, OutPoint, SubmitOutcome, TxOutput};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

/// Depth of the request queue.
const REQUEST_QUEUE: usize = 256;

enum ChainRequest {
    Submit {
        block: Block,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    Tip {
        reply: oneshot::Sender<ChainTip>,
    },
    Contains {
        hash: [u8; 32],
        reply: oneshot::Sender<bool>,
    },
    GetBlock {
        hash: [u8; 32],
        reply: oneshot::Sender<Option<Block>>,
    },
    Utxo {
        outpoint: OutPoint,
        reply: oneshot::Sender<Option<TxOutput>>,
    },
    NextBits {
        reply: oneshot::Sender<u32>,
    },
}

/// Cloneable handle to the chainstate actor.
#[derive(Clone)]
pub struct ChainHandle {
    tx: mpsc::Sender<ChainRequest>,
    genesis_hash: [u8; 32],
}

impl ChainHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ChainRequest,
    ) -> ChainResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| ChainError::ServiceUnavailable)?;
        rx.await.map_err(|_| ChainError::ServiceUnavailable)
    }

    /// Submit a block through the serialized accept pipeline.
    pub async fn submit_block(&self, block: Block) -> ChainResult<SubmitOutcome> {
        self.request(|reply| ChainRequest::Submit { block, reply })
            .await
    }

    /// The current best tip.
    pub async fn tip(&self) -> ChainResult<ChainTip> {
        self.request(|reply| ChainRequest::Tip { reply }).await
    }

    /// Whether a block hash is known.
    pub async fn contains(&self, hash: [u8; 32]) -> ChainResult<bool> {
        self.request(|reply| ChainRequest::Contains { hash, reply })
            .await
    }

    /// Fetch a block by hash.
    pub async fn get_block(&self, hash: [u8; 32]) -> ChainResult<Option<Block>> {
        self.request(|reply| ChainRequest::GetBlock { hash, reply })
            .await
    }

    /// Look up an unspent output at the best tip.
    pub async fn utxo_entry(&self, outpoint: OutPoint) -> ChainResult<Option<TxOutput>> {
        self.request(|reply| ChainRequest::Utxo { outpoint, reply })
            .await
    }

    /// Compact bits required for the next best-chain block.
    pub async fn next_bits(&self) -> ChainResult<u32> {
        self.request(|reply| ChainRequest::NextBits { reply }).await
    }

    /// The genesis hash (known at spawn time; no round trip).
    pub fn genesis_hash(&self) -> [u8; 32] {
        self.genesis_hash
    }
}

/// Spawn the actor task owning `state` and return a handle to it.
///
/// The task exits when the last handle is dropped.
pub fn spawn_chain_actor(state: ChainState) -> ChainHandle {
    let (tx, mut rx) = mpsc::channel(REQUEST_QUEUE);
    let genesis_hash = state.genesis_hash();

    tokio::spawn(async move {
        let mut state = state;
        while let Some(request) = rx.recv().await {
            match request {
                ChainRequest::Submit { block, reply } => {
                    let _ = reply.send(state.submit_block(block));
                }
                ChainRequest::Tip { reply } => {
                    let _ = reply.send(state.tip());
                }
                ChainRequest::Contains { hash, reply } => {
                    let _ = reply.send(state.contains(&hash));
                }
                ChainRequest::GetBlock { hash, reply } => {
                    let _ = reply.send(state.get_block(&hash));
                }
                ChainRequest::Utxo { outpoint, reply } => {
                    let _ = reply.send(state.utxo_entry(&outpoint));
                }
                ChainRequest::NextBits { reply } => {
                    let _ = reply.send(state.next_bits());
                }
            }
        }
        info!("chainstate actor stopped");
    });

    ChainHandle { tx, genesis_hash }
}
