//! The network service: listener, peer sessions, handshake, routing.
//!
//! The service owns the peer table and the transport-level protocol
//! (handshake, ping/pong). Everything that needs chainstate or mempool
//! access is surfaced as a [`NetworkEvent`] for the node to handle, and the
//! node steers the service through [`NetworkCommand`]s.

use crate::{NetworkError, NetworkResult, PeerId, PeerState, WireCodec, WireMessage};
use futures::stream::StreamExt;
use futures::SinkExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// The local best tip, shared with peer sessions so the handshake can
/// announce it without a chainstate round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TipInfo {
    /// Best height.
    pub height: u64,
    /// Best hash, hex.
    pub hash_hex: String,
}

/// Cheaply cloneable shared tip cell. The node writes it on every best
/// change; sessions read it.
#[derive(Clone, Default)]
pub struct SharedTip(Arc<RwLock<TipInfo>>);

impl SharedTip {
    /// Replace the stored tip.
    pub fn set(&self, height: u64, hash_hex: String) {
        *self.0.write() = TipInfo { height, hash_hex };
    }

    /// Snapshot the stored tip.
    pub fn get(&self) -> TipInfo {
        self.0.read().clone()
    }
}

/// Network service configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Listen address.
    pub listen_addr: SocketAddr,
    /// Network discriminator; peers on other networks are disconnected.
    pub network_id: String,
    /// This node's id; connections claiming it are rejected as self-dials.
    pub node_id: String,
    /// Maximum concurrent peers.
    pub max_peers: usize,
    /// Frame size cap handed to the codec.
    pub max_frame: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:28444".parse().unwrap(),
            network_id: "graphite-main".to_string(),
            node_id: random_node_id(),
            max_peers: 50,
            max_frame: crate::codec::DEFAULT_MAX_FRAME,
        }
    }
}

/// Generate a random node id.
pub fn random_node_id() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

/// Events emitted to the node. All carry peers that completed the
/// handshake.
#[derive(Debug)]
pub enum NetworkEvent {
    /// Handshake finished; the peer is usable.
    PeerReady {
        /// The peer.
        peer_id: PeerId,
    },
    /// Session ended.
    PeerDisconnected {
        /// The peer.
        peer_id: PeerId,
    },
    /// Peer announced its tip.
    TipAnnounced {
        /// The peer.
        peer_id: PeerId,
        /// Announced height.
        height: u64,
        /// Announced hash, hex.
        hash_hex: String,
    },
    /// Peer asked for our tip.
    TipRequested {
        /// The peer.
        peer_id: PeerId,
    },
    /// Peer asked for a block.
    BlockRequested {
        /// The peer.
        peer_id: PeerId,
        /// Requested hash, hex.
        hash_hex: String,
    },
    /// Peer sent a serialized block.
    BlockReceived {
        /// The peer.
        peer_id: PeerId,
        /// Raw block bytes.
        payload: Vec<u8>,
    },
    /// Peer sent a serialized transaction.
    TxReceived {
        /// The peer.
        peer_id: PeerId,
        /// Raw transaction bytes.
        payload: Vec<u8>,
    },
}

/// Commands the node sends to the service.
#[derive(Debug)]
pub enum NetworkCommand {
    /// Dial a peer.
    Connect {
        /// Remote address.
        addr: SocketAddr,
    },
    /// Send one message to one peer.
    Send {
        /// Recipient.
        peer_id: PeerId,
        /// Message.
        message: WireMessage,
    },
    /// Send one message to every connected peer.
    Broadcast {
        /// Message.
        message: WireMessage,
    },
    /// Drop a peer.
    Disconnect {
        /// The peer.
        peer_id: PeerId,
    },
    /// Stop the service.
    Shutdown,
}

struct PeerHandle {
    tx: mpsc::Sender<WireMessage>,
}

type PeerTable = Arc<RwLock<HashMap<PeerId, PeerHandle>>>;

/// The P2P service.
pub struct NetworkService {
    config: NetworkConfig,
    tip: SharedTip,
    peers: PeerTable,
    event_tx: mpsc::Sender<NetworkEvent>,
    command_rx: Option<mpsc::Receiver<NetworkCommand>>,
}

impl NetworkService {
    /// Create the service plus its event stream, command sender and shared
    /// tip cell.
    pub fn new(
        config: NetworkConfig,
    ) -> (
        Self,
        mpsc::Receiver<NetworkEvent>,
        mpsc::Sender<NetworkCommand>,
        SharedTip,
    ) {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(256);
        let tip = SharedTip::default();

        let service = Self {
            config,
            tip: tip.clone(),
            peers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            command_rx: Some(command_rx),
        };
        (service, event_rx, command_tx, tip)
    }

    /// Run the listener/command loop until shutdown.
    pub async fn run(mut self) -> NetworkResult<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, node_id = %self.config.node_id, "p2p listening");

        let mut command_rx = self.command_rx.take().expect("run called once");
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.spawn_session(stream, addr),
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
                command = command_rx.recv() => {
                    match command {
                        Some(NetworkCommand::Connect { addr }) => self.connect(addr),
                        Some(NetworkCommand::Send { peer_id, message }) => {
                            self.send_to_peer(&peer_id, message).await;
                        }
                        Some(NetworkCommand::Broadcast { message }) => {
                            self.broadcast(message).await;
                        }
                        Some(NetworkCommand::Disconnect { peer_id }) => {
                            self.peers.write().remove(&peer_id);
                        }
                        Some(NetworkCommand::Shutdown) | None => {
                            info!("p2p service shutting down");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn connect(&self, addr: SocketAddr) {
        let peers = Arc::clone(&self.peers);
        let event_tx = self.event_tx.clone();
        let config = self.config.clone();
        let tip = self.tip.clone();
        tokio::spawn(async move {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if let Err(e) = run_session(stream, addr, config, peers, event_tx, tip).await {
                        debug!(addr = %addr, error = %e, "outgoing session ended");
                    }
                }
                Err(e) => warn!(addr = %addr, error = %e, "dial failed"),
            }
        });
    }

    fn spawn_session(&self, stream: TcpStream, addr: SocketAddr) {
        if self.peers.read().len() >= self.config.max_peers {
            warn!(addr = %addr, "peer limit reached, rejecting");
            return;
        }
        let peers = Arc::clone(&self.peers);
        let event_tx = self.event_tx.clone();
        let config = self.config.clone();
        let tip = self.tip.clone();
        tokio::spawn(async move {
            if let Err(e) = run_session(stream, addr, config, peers, event_tx, tip).await {
                debug!(addr = %addr, error = %e, "incoming session ended");
            }
        });
    }

    async fn send_to_peer(&self, peer_id: &PeerId, message: WireMessage) {
        let tx = self.peers.read().get(peer_id).map(|h| h.tx.clone());
        match tx {
            Some(tx) => {
                if tx.send(message).await.is_err() {
                    debug!(peer = %peer_id, "send to closing peer dropped");
                }
            }
            None => debug!(peer = %peer_id, "send to unknown peer dropped"),
        }
    }

    async fn broadcast(&self, message: WireMessage) {
        let targets: Vec<_> = self
            .peers
            .read()
            .values()
            .map(|h| h.tx.clone())
            .collect();
        for tx in targets {
            let _ = tx.send(message.clone()).await;
        }
    }
}

/// Drive one peer session to completion.
async fn run_session(
    stream: TcpStream,
    addr: SocketAddr,
    config: NetworkConfig,
    peers: PeerTable,
    event_tx: mpsc::Sender<NetworkEvent>,
    tip: SharedTip,
) -> NetworkResult<()> {
    let peer_id = PeerId::from_addr(&addr);
    let codec = WireCodec::with_max_frame(config.max_frame);
    let framed = Framed::new(stream, codec);
    let (mut sink, mut stream) = framed.split();

    // Both sides open with their version.
    let local_tip = tip.get();
    sink.send(WireMessage::Version {
        network_id: config.network_id.clone(),
        node_id: config.node_id.clone(),
        height: local_tip.height,
        hash_hex: local_tip.hash_hex,
    })
    .await?;

    let (out_tx, mut out_rx) = mpsc::channel::<WireMessage>(256);
    peers
        .write()
        .insert(peer_id.clone(), PeerHandle { tx: out_tx });

    let mut state = PeerState::default();
    let result: NetworkResult<()> = loop {
        tokio::select! {
            incoming = stream.next() => {
                let message = match incoming {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => break Err(e),
                    None => break Ok(()),
                };
                state.messages_received += 1;
                if let Err(e) = handle_message(
                    message,
                    &peer_id,
                    &mut state,
                    &config,
                    &tip,
                    &mut sink,
                    &event_tx,
                )
                .await
                {
                    break Err(e);
                }
            }
            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            break Err(e);
                        }
                    }
                    None => break Ok(()), // service dropped us
                }
            }
        }
    };

    peers.write().remove(&peer_id);
    if state.handshake_complete() {
        let _ = event_tx
            .send(NetworkEvent::PeerDisconnected {
                peer_id: peer_id.clone(),
            })
            .await;
    }
    debug!(peer = %peer_id, messages = state.messages_received, "session closed");
    result
}

/// Apply the per-peer protocol state machine to one message.
async fn handle_message(
    message: WireMessage,
    peer_id: &PeerId,
    state: &mut PeerState,
    config: &NetworkConfig,
    tip: &SharedTip,
    sink: &mut (impl futures::Sink<WireMessage, Error = NetworkError> + Unpin),
    event_tx: &mpsc::Sender<NetworkEvent>,
) -> NetworkResult<()> {
    match message {
        WireMessage::Version {
            network_id,
            node_id,
            height,
            hash_hex,
        } => {
            if state.saw_version {
                return Err(NetworkError::Protocol("duplicate version".into()));
            }
            if network_id != config.network_id {
                return Err(NetworkError::Protocol(format!(
                    "wrong network {}",
                    network_id
                )));
            }
            if node_id == config.node_id {
                return Err(NetworkError::Protocol("connected to self".into()));
            }
            state.saw_version = true;
            state.node_id = Some(node_id);
            state.version_tip = Some((height, hash_hex));

            sink.send(WireMessage::Verack).await?;
            let local = tip.get();
            sink.send(WireMessage::Tip {
                height: local.height,
                hash_hex: local.hash_hex,
            })
            .await?;
        }
        WireMessage::Verack => {
            if !state.saw_version || state.saw_verack {
                return Err(NetworkError::Protocol("unexpected verack".into()));
            }
            state.saw_verack = true;
            info!(peer = %peer_id, node_id = ?state.node_id, "handshake complete");
            let _ = event_tx
                .send(NetworkEvent::PeerReady {
                    peer_id: peer_id.clone(),
                })
                .await;
            // The version doubled as the peer's first tip announcement.
            if let Some((height, hash_hex)) = state.version_tip.take() {
                let _ = event_tx
                    .send(NetworkEvent::TipAnnounced {
                        peer_id: peer_id.clone(),
                        height,
                        hash_hex,
                    })
                    .await;
            }
            sink.send(WireMessage::GetTip).await?;
        }
        WireMessage::Ping { nonce } => {
            sink.send(WireMessage::Pong { nonce }).await?;
        }
        WireMessage::Pong { .. } => {}
        other => {
            if !state.handshake_complete() {
                return Err(NetworkError::Protocol(
                    "message before handshake completed".into(),
                ));
            }
            let event = match other {
                WireMessage::GetTip => NetworkEvent::TipRequested {
                    peer_id: peer_id.clone(),
                },
                WireMessage::Tip { height, hash_hex } => NetworkEvent::TipAnnounced {
                    peer_id: peer_id.clone(),
                    height,
                    hash_hex,
                },
                WireMessage::GetBlock { hash_hex } => NetworkEvent::BlockRequested {
                    peer_id: peer_id.clone(),
                    hash_hex,
                },
                WireMessage::Block { payload_b64 } => {
                    let Some(payload) = crate::decode_payload(&payload_b64) else {
                        return Err(NetworkError::Protocol("bad base64 in block".into()));
                    };
                    NetworkEvent::BlockReceived {
                        peer_id: peer_id.clone(),
                        payload,
                    }
                }
                WireMessage::Tx { payload_b64 } => {
                    let Some(payload) = crate::decode_payload(&payload_b64) else {
                        return Err(NetworkError::Protocol("bad base64 in tx".into()));
                    };
                    NetworkEvent::TxReceived {
                        peer_id: peer_id.clone(),
                        payload,
                    }
                }
                WireMessage::Version { .. }
                | WireMessage::Verack
                | WireMessage::Ping { .. }
                | WireMessage::Pong { .. } => unreachable!("handled above"),
            };
            let _ = event_tx.send(event).await;
        }
    }
    Ok(())
}
