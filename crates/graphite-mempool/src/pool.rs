//! Pool internals and the admission actor.

use crate::{MempoolError, MempoolResult};
use dashmap::DashMap;
use graphite_chain::{ChainHandle, OutPoint, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Depth of the actor request queue.
const REQUEST_QUEUE: usize = 256;

/// Mempool configuration.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of pooled transactions.
    pub max_transactions: usize,
    /// Maximum serialized size of a single transaction.
    pub max_tx_bytes: usize,
    /// Tolerate inputs that are not yet in the tip UTXO set. Reserved:
    /// such transactions are still not admitted by the current policy.
    pub allow_unconfirmed_parents: bool,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
            max_tx_bytes: 100_000,
            allow_unconfirmed_parents: false,
        }
    }
}

/// A pooled transaction with its admission metadata.
#[derive(Debug, Clone)]
pub struct PooledTx {
    /// Transaction id.
    pub txid: [u8; 32],
    /// The transaction itself.
    pub tx: Transaction,
    /// Serialized size at admission time.
    pub size: usize,
    /// Fee it pays (inputs minus outputs).
    pub fee: u64,
}

enum MempoolRequest {
    Admit {
        tx: Transaction,
        reply: oneshot::Sender<MempoolResult<[u8; 32]>>,
    },
    RemoveConfirmed {
        txids: Vec<[u8; 32]>,
        reply: oneshot::Sender<usize>,
    },
}

/// Cloneable mempool handle.
///
/// Reads go straight to the shared index; mutations are serialized through
/// the actor.
#[derive(Clone)]
pub struct MempoolHandle {
    tx: mpsc::Sender<MempoolRequest>,
    txs: Arc<DashMap<[u8; 32], PooledTx>>,
}

impl MempoolHandle {
    /// Run a transaction through the admission pipeline.
    pub async fn admit(&self, tx: Transaction) -> MempoolResult<[u8; 32]> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MempoolRequest::Admit { tx, reply })
            .await
            .map_err(|_| MempoolError::ServiceUnavailable)?;
        rx.await.map_err(|_| MempoolError::ServiceUnavailable)?
    }

    /// Drop every listed transaction; invoked with the delta of a new best
    /// block. Returns how many were actually present.
    pub async fn remove_confirmed(&self, txids: Vec<[u8; 32]>) -> MempoolResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MempoolRequest::RemoveConfirmed { txids, reply })
            .await
            .map_err(|_| MempoolError::ServiceUnavailable)?;
        rx.await.map_err(|_| MempoolError::ServiceUnavailable)
    }

    /// Whether a transaction is pooled.
    pub fn contains(&self, txid: &[u8; 32]) -> bool {
        self.txs.contains_key(txid)
    }

    /// Fetch a pooled transaction.
    pub fn get(&self, txid: &[u8; 32]) -> Option<PooledTx> {
        self.txs.get(txid).map(|entry| entry.value().clone())
    }

    /// Number of pooled transactions.
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Snapshot of all pooled transactions, for block assembly.
    pub fn snapshot(&self) -> Vec<PooledTx> {
        self.txs.iter().map(|entry| entry.value().clone()).collect()
    }
}

/// Writer-side state: the shared index plus the outpoint conflict map.
struct Pool {
    config: MempoolConfig,
    chain: ChainHandle,
    txs: Arc<DashMap<[u8; 32], PooledTx>>,
    spent_by: HashMap<OutPoint, [u8; 32]>,
}

impl Pool {
    async fn admit(&mut self, tx: Transaction) -> MempoolResult<[u8; 32]> {
        tx.check_structure()
            .map_err(|e| MempoolError::Rejected(e.to_string()))?;
        if tx.is_coinbase() {
            return Err(MempoolError::Rejected(
                "coinbase transactions are not relayable".into(),
            ));
        }
        if tx.inputs.is_empty() {
            return Err(MempoolError::Rejected("transaction has no inputs".into()));
        }

        let bytes = tx.serialize();
        if bytes.len() > self.config.max_tx_bytes {
            return Err(MempoolError::Rejected(format!(
                "transaction of {} bytes exceeds limit",
                bytes.len()
            )));
        }

        let txid = tx.txid();
        if self.txs.contains_key(&txid) {
            return Err(MempoolError::Duplicate);
        }
        if self.txs.len() >= self.config.max_transactions {
            return Err(MempoolError::Rejected("mempool full".into()));
        }

        // Conflicts: within the transaction, then against the pool.
        let mut seen = std::collections::HashSet::new();
        for input in &tx.inputs {
            if !seen.insert(input.prev) {
                return Err(MempoolError::Rejected("duplicate input".into()));
            }
        }
        for input in &tx.inputs {
            if let Some(other) = self.spent_by.get(&input.prev) {
                return Err(MempoolError::Rejected(format!(
                    "input {}:{} already spent by {}",
                    hex::encode(input.prev.txid),
                    input.prev.vout,
                    hex::encode(other)
                )));
            }
        }

        // Tip-UTXO check: inputs exist, signatures hold, fee non-negative.
        let mut sum_in: u64 = 0;
        for (index, input) in tx.inputs.iter().enumerate() {
            match self.chain.utxo_entry(input.prev).await? {
                Some(spent) => {
                    tx.verify_input(index, &spent)
                        .map_err(|e| MempoolError::Rejected(e.to_string()))?;
                    sum_in = sum_in
                        .checked_add(spent.value)
                        .ok_or_else(|| MempoolError::Rejected("input value overflow".into()))?;
                }
                None if self.config.allow_unconfirmed_parents => {
                    return Err(MempoolError::Rejected(
                        "unconfirmed parent spends are not admitted".into(),
                    ));
                }
                None => {
                    return Err(MempoolError::Rejected(format!(
                        "input {}:{} not found in tip UTXO set",
                        hex::encode(input.prev.txid),
                        input.prev.vout
                    )));
                }
            }
        }
        let sum_out = tx.output_total();
        if sum_in < sum_out {
            return Err(MempoolError::Rejected("negative fee".into()));
        }

        for input in &tx.inputs {
            self.spent_by.insert(input.prev, txid);
        }
        let entry = PooledTx {
            txid,
            size: bytes.len(),
            fee: sum_in - sum_out,
            tx,
        };
        self.txs.insert(txid, entry);
        debug!(txid = %hex::encode(txid), pooled = self.txs.len(), "transaction admitted");
        Ok(txid)
    }

    fn remove_confirmed(&mut self, txids: &[[u8; 32]]) -> usize {
        let mut removed = 0;
        for txid in txids {
            if let Some((_, entry)) = self.txs.remove(txid) {
                for input in &entry.tx.inputs {
                    self.spent_by.remove(&input.prev);
                }
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, pooled = self.txs.len(), "confirmed transactions evicted");
        }
        removed
    }
}

/// Spawn the mempool actor and return a handle.
pub fn spawn_mempool_actor(config: MempoolConfig, chain: ChainHandle) -> MempoolHandle {
    let (tx, mut rx) = mpsc::channel(REQUEST_QUEUE);
    let txs = Arc::new(DashMap::new());
    let handle = MempoolHandle {
        tx,
        txs: Arc::clone(&txs),
    };

    tokio::spawn(async move {
        let mut pool = Pool {
            config,
            chain,
            txs,
            spent_by: HashMap::new(),
        };
        while let Some(request) = rx.recv().await {
            match request {
                MempoolRequest::Admit { tx, reply } => {
                    let result = pool.admit(tx).await;
                    if let Err(MempoolError::Rejected(reason)) = &result {
                        warn!(reason = %reason, "transaction rejected");
                    }
                    let _ = reply.send(result);
                }
                MempoolRequest::RemoveConfirmed { txids, reply } => {
                    let _ = reply.send(pool.remove_confirmed(&txids));
                }
            }
        }
        info!("mempool actor stopped");
    });

    handle
}
