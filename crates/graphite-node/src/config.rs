//! Runtime configuration assembled from the command line.

use ed25519_dalek::VerifyingKey;
use graphite_network::NetworkConfig;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Mining settings.
#[derive(Debug, Clone)]
pub struct MiningSettings {
    /// Whether the node mines.
    pub enabled: bool,
    /// Worker threads; 0 auto-detects.
    pub threads: usize,
    /// Reward key, if supplied.
    pub reward_pubkey: Option<VerifyingKey>,
}

/// Full node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Chainstate directory.
    pub data_dir: PathBuf,
    /// P2P listen address plus identity.
    pub network: NetworkConfig,
    /// Peers to dial at startup.
    pub connect: Vec<SocketAddr>,
    /// Mining settings.
    pub mining: MiningSettings,
}

/// Parse a hex-encoded ed25519 public key.
pub fn parse_reward_pubkey(hex_key: &str) -> anyhow::Result<VerifyingKey> {
    let raw = hex::decode(hex_key)?;
    let bytes: [u8; 32] = raw
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("reward key must be 32 bytes of hex"))?;
    Ok(VerifyingKey::from_bytes(&bytes)?)
}
