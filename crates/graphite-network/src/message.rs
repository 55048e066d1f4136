//! Wire messages.
//!
//! Every message is one JSON object with a `type` discriminator. Hashes are
//! hex strings; serialized blocks and transactions are base64.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// The protocol message set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireMessage {
    /// Handshake opener.
    Version {
        /// Network the sender is on; mismatches are disconnected.
        network_id: String,
        /// Sender's node id, used to reject self-connections.
        node_id: String,
        /// Sender's best height.
        height: u64,
        /// Sender's best hash, hex.
        hash_hex: String,
    },
    /// Handshake acknowledgement.
    Verack,
    /// Liveness probe.
    Ping {
        /// Echoed back in the pong.
        nonce: u64,
    },
    /// Liveness reply.
    Pong {
        /// Nonce from the ping.
        nonce: u64,
    },
    /// Ask for the peer's current tip.
    GetTip,
    /// Tip announcement.
    Tip {
        /// Height of the announced tip.
        height: u64,
        /// Hash of the announced tip, hex.
        hash_hex: String,
    },
    /// Request a block by hash.
    GetBlock {
        /// Requested hash, hex.
        hash_hex: String,
    },
    /// A serialized block.
    Block {
        /// Raw block bytes, base64.
        payload_b64: String,
    },
    /// A serialized transaction.
    Tx {
        /// Raw transaction bytes, base64.
        payload_b64: String,
    },
}

/// Base64-encode a binary payload for transport.
pub fn encode_payload(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode a base64 payload; `None` on malformed input.
pub fn decode_payload(payload: &str) -> Option<Vec<u8>> {
    BASE64.decode(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_are_camel_case() {
        let json = serde_json::to_string(&WireMessage::GetTip).unwrap();
        assert_eq!(json, r#"{"type":"getTip"}"#);

        let json = serde_json::to_string(&WireMessage::GetBlock {
            hash_hex: "ab".into(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"getBlock""#));
    }

    #[test]
    fn test_version_roundtrip() {
        let msg = WireMessage::Version {
            network_id: "graphite-main".into(),
            node_id: "abc123".into(),
            height: 42,
            hash_hex: "00ff".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: WireMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_payload_roundtrip() {
        let bytes = vec![0u8, 1, 2, 250, 255];
        let encoded = encode_payload(&bytes);
        assert_eq!(decode_payload(&encoded).unwrap(), bytes);
        assert!(decode_payload("not!!base64").is_none());
    }

    #[test]
    fn test_unknown_type_fails_parse() {
        let result: Result<WireMessage, _> =
            serde_json::from_str(r#"{"type":"teleport","x":1}"#);
        assert!(result.is_err());
    }
}
