//! Node orchestration: wiring storage, chainstate, mempool, network and the
//! miner together, plus the network event loop.

use crate::config::NodeConfig;
use anyhow::Result;
use graphite_chain::{
    mainnet_genesis, spawn_chain_actor, Block, ChainHandle, SubmitOutcome, Transaction,
    ValidationPolicy,
};
use graphite_mempool::{spawn_mempool_actor, MempoolConfig, MempoolHandle};
use graphite_mining::{CandidateGenerator, MiningTask, WorkerPool};
use graphite_network::{
    encode_payload, HandlerGate, NetworkCommand, NetworkEvent, NetworkService, PeerId,
    RequestTracker, SharedTip, WireMessage,
};
use graphite_pow::GraphParams;
use graphite_storage::BlockStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Cap on concurrently running block/tx handlers.
const MAX_INFLIGHT_HANDLERS: usize = 64;

/// Outstanding block request table size.
const MAX_PENDING_REQUESTS: usize = 512;

/// How long a block request stays outstanding.
const REQUEST_TTL: Duration = Duration::from_secs(30);

/// Candidate refresh period while mining.
const CANDIDATE_REFRESH: Duration = Duration::from_secs(30);

/// Everything the event handlers need.
#[derive(Clone)]
struct NodeCtx {
    chain: ChainHandle,
    mempool: MempoolHandle,
    commands: mpsc::Sender<NetworkCommand>,
    shared_tip: SharedTip,
    tracker: Arc<Mutex<RequestTracker>>,
    gate: HandlerGate,
    tip_notify: Arc<watch::Sender<u64>>,
}

impl NodeCtx {
    /// Record a new best tip: update the handshake cell, poke the miner,
    /// announce to peers.
    async fn announce_best(&self, height: u64, hash: [u8; 32]) {
        let hash_hex = hex::encode(hash);
        self.shared_tip.set(height, hash_hex.clone());
        let _ = self.tip_notify.send(height);
        let _ = self
            .commands
            .send(NetworkCommand::Broadcast {
                message: WireMessage::Tip {
                    height,
                    hash_hex,
                },
            })
            .await;
    }

    async fn send(&self, peer_id: PeerId, message: WireMessage) {
        let _ = self
            .commands
            .send(NetworkCommand::Send { peer_id, message })
            .await;
    }
}

/// Run the full node until the event stream ends or ctrl-c.
pub async fn run_node(config: NodeConfig) -> Result<()> {
    let store = BlockStore::open(&config.data_dir)?;
    let state = graphite_chain::ChainState::open(
        mainnet_genesis(),
        ValidationPolicy::secure(),
        Some(store),
    )?;
    let tip = state.tip();
    let chain = spawn_chain_actor(state);
    let mempool = spawn_mempool_actor(MempoolConfig::default(), chain.clone());

    let (service, event_rx, command_tx, shared_tip) = NetworkService::new(config.network.clone());
    shared_tip.set(tip.height, hex::encode(tip.hash));
    tokio::spawn(async move {
        if let Err(e) = service.run().await {
            warn!(error = %e, "network service exited");
        }
    });

    for addr in &config.connect {
        let _ = command_tx
            .send(NetworkCommand::Connect { addr: *addr })
            .await;
    }

    let (tip_notify, tip_rx) = watch::channel(tip.height);
    let ctx = NodeCtx {
        chain: chain.clone(),
        mempool: mempool.clone(),
        commands: command_tx,
        shared_tip,
        tracker: Arc::new(Mutex::new(RequestTracker::new(
            MAX_PENDING_REQUESTS,
            REQUEST_TTL,
        ))),
        gate: HandlerGate::new(MAX_INFLIGHT_HANDLERS),
        tip_notify: Arc::new(tip_notify),
    };

    if config.mining.enabled {
        let miner_ctx = ctx.clone();
        let settings = config.mining.clone();
        tokio::spawn(async move {
            miner_loop(miner_ctx, settings, tip_rx).await;
        });
    }

    tokio::select! {
        _ = event_loop(ctx, event_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    Ok(())
}

/// Run chainstate plus miner with no network; the `mine` subcommand.
pub async fn run_miner_only(config: NodeConfig) -> Result<()> {
    let store = BlockStore::open(&config.data_dir)?;
    let state = graphite_chain::ChainState::open(
        mainnet_genesis(),
        ValidationPolicy::secure(),
        Some(store),
    )?;
    let tip = state.tip();
    let chain = spawn_chain_actor(state);
    let mempool = spawn_mempool_actor(MempoolConfig::default(), chain.clone());

    // No peers to talk to; commands land in a closed channel and are
    // silently dropped.
    let (command_tx, _command_rx) = mpsc::channel(1);
    let (tip_notify, tip_rx) = watch::channel(tip.height);
    let ctx = NodeCtx {
        chain,
        mempool,
        commands: command_tx,
        shared_tip: SharedTip::default(),
        tracker: Arc::new(Mutex::new(RequestTracker::new(
            MAX_PENDING_REQUESTS,
            REQUEST_TTL,
        ))),
        gate: HandlerGate::new(MAX_INFLIGHT_HANDLERS),
        tip_notify: Arc::new(tip_notify),
    };

    tokio::select! {
        _ = miner_loop(ctx, config.mining, tip_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    Ok(())
}

/// Dispatch network events until the stream closes.
async fn event_loop(ctx: NodeCtx, mut events: mpsc::Receiver<NetworkEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            NetworkEvent::PeerReady { peer_id } => {
                info!(peer = %peer_id, "peer ready");
            }
            NetworkEvent::PeerDisconnected { peer_id } => {
                debug!(peer = %peer_id, "peer gone");
            }
            NetworkEvent::TipRequested { peer_id } => {
                if let Ok(tip) = ctx.chain.tip().await {
                    ctx.send(
                        peer_id,
                        WireMessage::Tip {
                            height: tip.height,
                            hash_hex: hex::encode(tip.hash),
                        },
                    )
                    .await;
                }
            }
            NetworkEvent::TipAnnounced {
                peer_id,
                height,
                hash_hex,
            } => {
                handle_tip_announcement(&ctx, peer_id, height, &hash_hex).await;
            }
            NetworkEvent::BlockRequested { peer_id, hash_hex } => {
                let Ok(raw) = hex::decode(&hash_hex) else {
                    continue;
                };
                let Ok(hash) = <[u8; 32]>::try_from(raw.as_slice()) else {
                    continue;
                };
                if let Ok(Some(block)) = ctx.chain.get_block(hash).await {
                    ctx.send(
                        peer_id,
                        WireMessage::Block {
                            payload_b64: encode_payload(&block.serialize()),
                        },
                    )
                    .await;
                }
            }
            NetworkEvent::BlockReceived { peer_id, payload } => {
                let Some(permit) = ctx.gate.try_start("block") else {
                    continue;
                };
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    handle_incoming_block(&ctx, Some(peer_id), payload).await;
                });
            }
            NetworkEvent::TxReceived { peer_id, payload } => {
                let Some(permit) = ctx.gate.try_start("tx") else {
                    continue;
                };
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    handle_incoming_tx(&ctx, peer_id, payload).await;
                });
            }
        }
    }
}

/// A peer claims a higher tip: backfill the block if it is news to us.
async fn handle_tip_announcement(ctx: &NodeCtx, peer_id: PeerId, height: u64, hash_hex: &str) {
    let Ok(raw) = hex::decode(hash_hex) else {
        return;
    };
    let Ok(hash) = <[u8; 32]>::try_from(raw.as_slice()) else {
        return;
    };
    let Ok(tip) = ctx.chain.tip().await else {
        return;
    };
    if height <= tip.height {
        return;
    }
    if ctx.chain.contains(hash).await.unwrap_or(false) {
        return;
    }
    if ctx.tracker.lock().insert(hash_hex) {
        debug!(peer = %peer_id, height, hash = hash_hex, "requesting announced block");
        ctx.send(
            peer_id,
            WireMessage::GetBlock {
                hash_hex: hash_hex.to_string(),
            },
        )
        .await;
    }
}

/// Feed a received (or mined) block through the chainstate.
async fn handle_incoming_block(ctx: &NodeCtx, from: Option<PeerId>, payload: Vec<u8>) {
    let block = match Block::deserialize(&payload) {
        Ok(block) => block,
        Err(e) => {
            warn!(error = %e, "malformed block payload");
            return;
        }
    };
    let hash_hex = hex::encode(block.hash());

    match ctx.chain.submit_block(block).await {
        Ok(SubmitOutcome::Accepted {
            hash,
            height,
            became_best,
            confirmed_txids,
        }) => {
            ctx.tracker.lock().clear(&hash_hex);
            if became_best {
                if !confirmed_txids.is_empty() {
                    let _ = ctx.mempool.remove_confirmed(confirmed_txids).await;
                }
                ctx.announce_best(height, hash).await;
            }
        }
        Ok(SubmitOutcome::Orphan { parent_hash }) => {
            let parent_hex = hex::encode(parent_hash);
            if let Some(peer_id) = from {
                if ctx.tracker.lock().insert(&parent_hex) {
                    debug!(parent = %parent_hex, "backfilling orphan parent");
                    ctx.send(
                        peer_id,
                        WireMessage::GetBlock {
                            hash_hex: parent_hex,
                        },
                    )
                    .await;
                }
            }
        }
        Ok(SubmitOutcome::Duplicate) => {
            ctx.tracker.lock().clear(&hash_hex);
        }
        Ok(SubmitOutcome::Rejected { reason }) => {
            warn!(hash = %hash_hex, reason = %reason, "block rejected");
        }
        Err(e) => warn!(error = %e, "chainstate unavailable"),
    }
}

/// Feed a received transaction through the mempool; relay on acceptance.
async fn handle_incoming_tx(ctx: &NodeCtx, peer_id: PeerId, payload: Vec<u8>) {
    let tx = match Transaction::deserialize(&payload) {
        Ok(tx) => tx,
        Err(e) => {
            debug!(peer = %peer_id, error = %e, "malformed transaction payload");
            return;
        }
    };
    match ctx.mempool.admit(tx).await {
        Ok(txid) => {
            debug!(txid = %hex::encode(txid), "transaction relayed");
            let _ = ctx
                .commands
                .send(NetworkCommand::Broadcast {
                    message: WireMessage::Tx {
                        payload_b64: encode_payload(&payload),
                    },
                })
                .await;
        }
        Err(graphite_mempool::MempoolError::Duplicate) => {}
        Err(e) => debug!(peer = %peer_id, error = %e, "transaction not admitted"),
    }
}

/// Drive the worker pool: build a candidate, wait for a solution or a
/// reason to rebuild, submit what gets solved.
async fn miner_loop(
    ctx: NodeCtx,
    settings: crate::config::MiningSettings,
    mut tip_rx: watch::Receiver<u64>,
) {
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    let reward_pubkey = settings.reward_pubkey.unwrap_or_else(|| {
        let key = SigningKey::generate(&mut OsRng);
        warn!(
            pubkey = %hex::encode(key.verifying_key().as_bytes()),
            "no reward key supplied, mining to an ephemeral key"
        );
        key.verifying_key()
    });

    let generator = CandidateGenerator::new(ctx.chain.clone(), ctx.mempool.clone(), reward_pubkey);
    let mut pool = WorkerPool::new(settings.threads);
    let mut refresh = tokio::time::interval(CANDIDATE_REFRESH);
    refresh.tick().await; // the first tick is immediate

    info!(workers = pool.num_workers(), "mining started");
    loop {
        let template = match generator.build().await {
            Ok(template) => template,
            Err(e) => {
                warn!(error = %e, "candidate assembly failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };
        let header = template.block.header.serialize();
        pool.broadcast_task(MiningTask {
            header,
            params: GraphParams::for_height(template.height),
            bits: template.block.header.bits,
            height: template.height,
        });

        tokio::select! {
            found = pool.recv_solution() => {
                let Some(found) = found else { break };
                if found.proof.header != header {
                    debug!("stale solution discarded");
                    continue;
                }
                let block = template.with_proof(found.proof);
                let payload = block.serialize();
                match ctx.chain.submit_block(block).await {
                    Ok(SubmitOutcome::Accepted { hash, height, became_best, confirmed_txids }) => {
                        info!(height, hash = %hex::encode(hash), "mined block accepted");
                        if became_best {
                            if !confirmed_txids.is_empty() {
                                let _ = ctx.mempool.remove_confirmed(confirmed_txids).await;
                            }
                            ctx.announce_best(height, hash).await;
                            let _ = ctx.commands.send(NetworkCommand::Broadcast {
                                message: WireMessage::Block {
                                    payload_b64: encode_payload(&payload),
                                },
                            }).await;
                        }
                    }
                    Ok(outcome) => warn!(?outcome, "mined block not accepted"),
                    Err(e) => {
                        warn!(error = %e, "chainstate gone, stopping miner");
                        break;
                    }
                }
            }
            _ = tip_rx.changed() => {
                debug!("tip changed, rebuilding candidate");
            }
            _ = refresh.tick() => {
                debug!(graphs = pool.graphs_searched(), "refreshing candidate");
            }
        }
    }
    pool.shutdown();
}
