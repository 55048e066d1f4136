//! Header and proof codecs.
//!
//! Both structures use a fixed little-endian layout. The header is exactly
//! 80 bytes; a proof is exactly 120: the raw header bytes, the nonce, and
//! the eight cycle edge indices.

use crate::{PowError, PowResult, CYCLE_LEN};
use sha2::{Digest, Sha256};

/// Serialized header length.
pub const HEADER_BYTES: usize = 80;

/// Serialized proof length.
pub const PROOF_BYTES: usize = HEADER_BYTES + 8 + CYCLE_LEN * 4;

/// Byte offset of the compact bits field inside a serialized header.
const BITS_OFFSET: usize = 72;

/// A block header.
///
/// Layout: `version:u32 | prev_hash:32 | merkle_root:32 | timestamp:u32 |
/// bits:u32`, all little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Header format version.
    pub version: u32,
    /// SHA-256 of the parent header.
    pub prev_hash: [u8; 32],
    /// Merkle root over the block's transaction ids.
    pub merkle_root: [u8; 32],
    /// Unix timestamp, seconds.
    pub timestamp: u32,
    /// Compact difficulty target.
    pub bits: u32,
}

impl BlockHeader {
    /// Serialize to the fixed 80-byte layout.
    pub fn serialize(&self) -> [u8; HEADER_BYTES] {
        let mut out = [0u8; HEADER_BYTES];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_hash);
        out[36..68].copy_from_slice(&self.merkle_root);
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out
    }

    /// Parse an exactly-80-byte header.
    pub fn deserialize(bytes: &[u8]) -> PowResult<Self> {
        if bytes.len() != HEADER_BYTES {
            return Err(PowError::Serialization(format!(
                "header must be {} bytes, got {}",
                HEADER_BYTES,
                bytes.len()
            )));
        }
        Ok(Self {
            version: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            prev_hash: bytes[4..36].try_into().unwrap(),
            merkle_root: bytes[36..68].try_into().unwrap(),
            timestamp: u32::from_le_bytes(bytes[68..72].try_into().unwrap()),
            bits: u32::from_le_bytes(bytes[72..76].try_into().unwrap()),
        })
    }

    /// SHA-256 of the serialized header; this is the block hash.
    pub fn hash(&self) -> [u8; 32] {
        Sha256::digest(self.serialize()).into()
    }
}

/// Extract the compact bits field from raw header bytes.
pub fn parse_header_bits(header: &[u8]) -> PowResult<u32> {
    if header.len() != HEADER_BYTES {
        return Err(PowError::Serialization(format!(
            "header must be {} bytes, got {}",
            HEADER_BYTES,
            header.len()
        )));
    }
    Ok(u32::from_le_bytes(
        header[BITS_OFFSET..BITS_OFFSET + 4].try_into().unwrap(),
    ))
}

/// A proof-of-work solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proof {
    /// The serialized header the proof commits to.
    pub header: [u8; HEADER_BYTES],
    /// Nonce that seeded the edge chain.
    pub nonce: u64,
    /// Indices of the cycle edges in the full generated edge set.
    pub cycle_edges: [u32; CYCLE_LEN],
}

impl Proof {
    /// Serialize to the fixed 120-byte layout.
    pub fn serialize(&self) -> [u8; PROOF_BYTES] {
        let mut out = [0u8; PROOF_BYTES];
        out[0..HEADER_BYTES].copy_from_slice(&self.header);
        out[HEADER_BYTES..HEADER_BYTES + 8].copy_from_slice(&self.nonce.to_le_bytes());
        for (i, edge) in self.cycle_edges.iter().enumerate() {
            let at = HEADER_BYTES + 8 + i * 4;
            out[at..at + 4].copy_from_slice(&edge.to_le_bytes());
        }
        out
    }

    /// Parse an exactly-120-byte proof; anything shorter or longer is
    /// rejected.
    pub fn deserialize(bytes: &[u8]) -> PowResult<Self> {
        if bytes.len() != PROOF_BYTES {
            return Err(PowError::Serialization(format!(
                "proof must be {} bytes, got {}",
                PROOF_BYTES,
                bytes.len()
            )));
        }
        let mut header = [0u8; HEADER_BYTES];
        header.copy_from_slice(&bytes[0..HEADER_BYTES]);
        let nonce = u64::from_le_bytes(bytes[HEADER_BYTES..HEADER_BYTES + 8].try_into().unwrap());
        let mut cycle_edges = [0u32; CYCLE_LEN];
        for (i, edge) in cycle_edges.iter_mut().enumerate() {
            let at = HEADER_BYTES + 8 + i * 4;
            *edge = u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
        }
        Ok(Self {
            header,
            nonce,
            cycle_edges,
        })
    }

    /// SHA-256 of the serialized proof; compared against the target.
    pub fn hash(&self) -> [u8; 32] {
        Sha256::digest(self.serialize()).into()
    }
}
