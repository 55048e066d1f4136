//! File-backed block store.

use crate::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension of per-block files.
const BLOCK_EXT: &str = "blk";

/// Persisted metadata.
#[derive(Debug, Serialize, Deserialize)]
struct Meta {
    #[serde(rename = "bestHashHex")]
    best_hash_hex: String,
}

/// A directory-backed block store.
///
/// Blocks are immutable once written; only the best-hash marker is ever
/// rewritten.
pub struct BlockStore {
    root: PathBuf,
    blocks_dir: PathBuf,
}

impl BlockStore {
    /// Open (creating if necessary) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let root = dir.as_ref().to_path_buf();
        let blocks_dir = root.join("blocks");
        fs::create_dir_all(&blocks_dir)?;
        Ok(Self { root, blocks_dir })
    }

    /// Path of the file backing a block hash.
    fn block_path(&self, hash: &[u8; 32]) -> PathBuf {
        self.blocks_dir
            .join(format!("{}.{}", hex::encode(hash), BLOCK_EXT))
    }

    /// Persist a serialized block. Atomic; overwriting an existing file with
    /// identical content is harmless.
    pub fn put_block(&self, hash: &[u8; 32], bytes: &[u8]) -> StoreResult<()> {
        let path = self.block_path(hash);
        atomic_write(&path, bytes)?;
        debug!(hash = %hex::encode(hash), bytes = bytes.len(), "block persisted");
        Ok(())
    }

    /// Read one block's raw bytes, if present.
    pub fn get_block(&self, hash: &[u8; 32]) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.block_path(hash)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a block file exists.
    pub fn contains_block(&self, hash: &[u8; 32]) -> bool {
        self.block_path(hash).is_file()
    }

    /// Load every stored block as `(hash, bytes)` pairs.
    ///
    /// Files whose names do not decode to a 32-byte hash are skipped with a
    /// warning; they are not ours.
    pub fn load_all_blocks(&self) -> StoreResult<Vec<([u8; 32], Vec<u8>)>> {
        let mut blocks = Vec::new();
        for entry in fs::read_dir(&self.blocks_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOCK_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(raw) = hex::decode(stem) else {
                warn!(file = %path.display(), "skipping non-hash block file");
                continue;
            };
            let Ok(hash) = <[u8; 32]>::try_from(raw.as_slice()) else {
                warn!(file = %path.display(), "skipping block file with short name");
                continue;
            };
            blocks.push((hash, fs::read(&path)?));
        }
        Ok(blocks)
    }

    /// Persist the best-hash marker.
    pub fn put_best_hash(&self, hash: &[u8; 32]) -> StoreResult<()> {
        let meta = Meta {
            best_hash_hex: hex::encode(hash),
        };
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| StoreError::Metadata(e.to_string()))?;
        atomic_write(&self.root.join("meta.json"), &json)
    }

    /// Read the best-hash marker, if one was ever written.
    pub fn get_best_hash(&self) -> StoreResult<Option<[u8; 32]>> {
        let path = self.root.join("meta.json");
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: Meta = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Metadata(e.to_string()))?;
        let raw = hex::decode(&meta.best_hash_hex)
            .map_err(|e| StoreError::Metadata(e.to_string()))?;
        <[u8; 32]>::try_from(raw.as_slice())
            .map(Some)
            .map_err(|_| StoreError::Metadata("best hash is not 32 bytes".into()))
    }
}

/// Write-then-rename so readers never observe a partial file.
fn atomic_write(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
