//! # graphite-network
//!
//! The Graphite peer-to-peer layer. Transport is TCP carrying one JSON
//! object per line; binary payloads travel base64-encoded inside the JSON.
//! Sessions perform a version/verack handshake, exchange tips, backfill
//! blocks and flood-relay new objects. Oversized frames and protocol
//! violations close the offending peer; the rest of the node is unaffected.

mod codec;
mod error;
mod message;
mod peer;
mod service;

pub use codec::WireCodec;
pub use error::{NetworkError, NetworkResult};
pub use message::{decode_payload, encode_payload, WireMessage};
pub use peer::{HandlerGate, PeerId, PeerState, RequestTracker};
pub use service::{
    NetworkCommand, NetworkConfig, NetworkEvent, NetworkService, SharedTip, TipInfo,
};
