//! The memory-hard scratchpad.
//!
//! A contiguous byte buffer viewed as 16-byte cells, filled by an AES-128
//! keystream before edge generation. One scratchpad is owned exclusively by
//! one edge generator and recycled across nonces.

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Block};

/// A fillable 16-byte-cell buffer.
pub struct Scratchpad {
    data: Vec<u8>,
}

impl Scratchpad {
    /// Allocate a zeroed scratchpad of `bytes` bytes (must be divisible by 16).
    pub fn new(bytes: usize) -> Self {
        debug_assert_eq!(bytes % 16, 0);
        Self {
            data: vec![0u8; bytes],
        }
    }

    /// Number of 16-byte cells.
    pub fn cells(&self) -> usize {
        self.data.len() / 16
    }

    /// Fill the scratchpad with the AES chain `S_i = AES128(S_{i-1}, key)`,
    /// writing `S_i` into cell `i-1`. Returns the final state, which also
    /// occupies the last cell.
    pub fn fill(&mut self, key: &[u8; 16], initial_state: &[u8; 16]) -> [u8; 16] {
        let cipher = Aes128::new(key.into());
        let mut state = Block::clone_from_slice(initial_state);
        for cell in self.data.chunks_exact_mut(16) {
            cipher.encrypt_block(&mut state);
            cell.copy_from_slice(&state);
        }
        state.into()
    }

    /// Immutable view of the raw bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Overwrite 16 bytes at `offset`.
    pub fn write_state(&mut self, offset: usize, state: &[u8; 16]) {
        self.data[offset..offset + 16].copy_from_slice(state);
    }
}

/// One AES-128 block encryption of `plaintext` under `key`.
pub(crate) fn aes128_encrypt(key: &[u8; 16], plaintext: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(key.into());
    let mut block = Block::clone_from_slice(plaintext);
    cipher.encrypt_block(&mut block);
    block.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_is_deterministic() {
        let key = [7u8; 16];
        let state = [9u8; 16];

        let mut a = Scratchpad::new(256);
        let mut b = Scratchpad::new(256);
        let fa = a.fill(&key, &state);
        let fb = b.fill(&key, &state);

        assert_eq!(fa, fb);
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_final_state_is_last_cell() {
        let mut pad = Scratchpad::new(1024);
        let final_state = pad.fill(&[1u8; 16], &[2u8; 16]);
        assert_eq!(&pad.as_slice()[1024 - 16..], &final_state);
    }

    #[test]
    fn test_fill_depends_on_key_and_state() {
        let mut a = Scratchpad::new(64);
        let mut b = Scratchpad::new(64);
        let fa = a.fill(&[1u8; 16], &[0u8; 16]);
        let fb = b.fill(&[2u8; 16], &[0u8; 16]);
        assert_ne!(fa, fb);

        let mut c = Scratchpad::new(64);
        let fc = c.fill(&[1u8; 16], &[1u8; 16]);
        assert_ne!(fa, fc);
    }

    #[test]
    fn test_single_block_encrypt_matches_fill() {
        let key = [3u8; 16];
        let state = [4u8; 16];
        let mut pad = Scratchpad::new(16);
        let filled = pad.fill(&key, &state);
        assert_eq!(filled, aes128_encrypt(&key, &state));
    }
}
