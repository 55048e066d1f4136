//! Transactions and the pay-to-pubkey script template.
//!
//! Serialization is a fixed little-endian layout with explicit u32 count
//! prefixes; there are no varints. The transaction id is the SHA-256 of the
//! serialized bytes.
//!
//! Scripts are a single template: a locking script is the tag byte `0x01`
//! followed by a 32-byte ed25519 public key, and an unlocking script is a
//! 64-byte ed25519 signature over the blanked-transaction sighash preimage.

use crate::params::{MAX_SCRIPT_BYTES, MAX_TX_INPUTS, MAX_TX_OUTPUTS};
use crate::{ChainError, ChainResult};
use ed25519_dalek::{Signature, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Tag byte opening every locking script.
pub const LOCKING_SCRIPT_TAG: u8 = 0x01;

/// The outpoint sentinel marking a coinbase input.
const COINBASE_VOUT: u32 = 0xFFFF_FFFF;

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    /// Id of the transaction that created the output.
    pub txid: [u8; 32],
    /// Output index within that transaction.
    pub vout: u32,
}

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// The output being spent.
    pub prev: OutPoint,
    /// Unlocking script; a 64-byte signature for spends, the encoded block
    /// height for coinbases.
    pub unlocking_script: Vec<u8>,
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Amount in base units.
    pub value: u64,
    /// Locking script.
    pub locking_script: Vec<u8>,
}

impl TxOutput {
    /// A standard pay-to-pubkey output.
    pub fn pay_to_pubkey(value: u64, pubkey: &VerifyingKey) -> Self {
        let mut script = Vec::with_capacity(33);
        script.push(LOCKING_SCRIPT_TAG);
        script.extend_from_slice(pubkey.as_bytes());
        Self {
            value,
            locking_script: script,
        }
    }

    /// Extract the pubkey from a standard locking script.
    pub fn pubkey(&self) -> ChainResult<VerifyingKey> {
        if self.locking_script.len() != 33 || self.locking_script[0] != LOCKING_SCRIPT_TAG {
            return Err(ChainError::Rejected(
                "locking script is not pay-to-pubkey".into(),
            ));
        }
        let bytes: [u8; 32] = self.locking_script[1..33].try_into().unwrap();
        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| ChainError::Rejected(format!("invalid pubkey in locking script: {}", e)))
    }
}

/// A UTXO-style transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Format version.
    pub version: u32,
    /// Spent outpoints with their unlocking scripts.
    pub inputs: Vec<TxInput>,
    /// Created outputs.
    pub outputs: Vec<TxOutput>,
    /// Locktime field; carried but not currently enforced.
    pub locktime: u32,
}

impl Transaction {
    /// Build the coinbase for a block at `height` paying `outputs`.
    pub fn coinbase(height: u64, outputs: Vec<TxOutput>) -> Self {
        Self {
            version: 1,
            inputs: vec![TxInput {
                prev: OutPoint {
                    txid: [0u8; 32],
                    vout: COINBASE_VOUT,
                },
                unlocking_script: (height as u32).to_le_bytes().to_vec(),
            }],
            outputs,
            locktime: 0,
        }
    }

    /// Whether this is a coinbase: exactly one input spending the sentinel
    /// outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev.txid == [0u8; 32]
            && self.inputs[0].prev.vout == COINBASE_VOUT
    }

    /// Block height encoded in a coinbase's unlocking script.
    pub fn coinbase_height(&self) -> ChainResult<u64> {
        if !self.is_coinbase() {
            return Err(ChainError::Rejected("not a coinbase".into()));
        }
        let script = &self.inputs[0].unlocking_script;
        let bytes: [u8; 4] = script
            .as_slice()
            .try_into()
            .map_err(|_| ChainError::Rejected("coinbase height must be 4 bytes".into()))?;
        Ok(u32::from_le_bytes(bytes) as u64)
    }

    /// Serialize to the fixed layout.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_len());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            out.extend_from_slice(&input.prev.txid);
            out.extend_from_slice(&input.prev.vout.to_le_bytes());
            out.extend_from_slice(&(input.unlocking_script.len() as u32).to_le_bytes());
            out.extend_from_slice(&input.unlocking_script);
        }
        out.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            out.extend_from_slice(&(output.locking_script.len() as u32).to_le_bytes());
            out.extend_from_slice(&output.locking_script);
        }
        out.extend_from_slice(&self.locktime.to_le_bytes());
        out
    }

    fn serialized_len(&self) -> usize {
        let ins: usize = self
            .inputs
            .iter()
            .map(|i| 40 + i.unlocking_script.len())
            .sum();
        let outs: usize = self
            .outputs
            .iter()
            .map(|o| 12 + o.locking_script.len())
            .sum();
        12 + ins + outs
    }

    /// Parse a transaction, consuming the whole slice.
    pub fn deserialize(bytes: &[u8]) -> ChainResult<Self> {
        let mut reader = Reader::new(bytes);
        let tx = Self::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(ChainError::Serialization(
                "trailing bytes after transaction".into(),
            ));
        }
        Ok(tx)
    }

    /// Parse a transaction from the front of a reader.
    pub(crate) fn read(reader: &mut Reader<'_>) -> ChainResult<Self> {
        let version = reader.u32()?;
        let n_in = reader.u32()? as usize;
        if n_in > MAX_TX_INPUTS {
            return Err(ChainError::Serialization(format!(
                "input count {} exceeds limit",
                n_in
            )));
        }
        let mut inputs = Vec::with_capacity(n_in);
        for _ in 0..n_in {
            let txid = reader.array::<32>()?;
            let vout = reader.u32()?;
            let script_len = reader.u32()? as usize;
            let unlocking_script = reader.bytes(script_len)?.to_vec();
            inputs.push(TxInput {
                prev: OutPoint { txid, vout },
                unlocking_script,
            });
        }

        let n_out = reader.u32()? as usize;
        if n_out > MAX_TX_OUTPUTS {
            return Err(ChainError::Serialization(format!(
                "output count {} exceeds limit",
                n_out
            )));
        }
        let mut outputs = Vec::with_capacity(n_out);
        for _ in 0..n_out {
            let value = reader.u64()?;
            let script_len = reader.u32()? as usize;
            let locking_script = reader.bytes(script_len)?.to_vec();
            outputs.push(TxOutput {
                value,
                locking_script,
            });
        }

        let locktime = reader.u32()?;
        Ok(Self {
            version,
            inputs,
            outputs,
            locktime,
        })
    }

    /// SHA-256 of the serialized bytes.
    pub fn txid(&self) -> [u8; 32] {
        Sha256::digest(self.serialize()).into()
    }

    /// Structural validity: non-empty outputs, bounded counts and script
    /// sizes, and an output sum that fits in u64.
    pub fn check_structure(&self) -> ChainResult<()> {
        if self.outputs.is_empty() {
            return Err(ChainError::Rejected("transaction has no outputs".into()));
        }
        if self.inputs.len() > MAX_TX_INPUTS {
            return Err(ChainError::Rejected("too many inputs".into()));
        }
        if self.outputs.len() > MAX_TX_OUTPUTS {
            return Err(ChainError::Rejected("too many outputs".into()));
        }
        for script in self
            .inputs
            .iter()
            .map(|i| &i.unlocking_script)
            .chain(self.outputs.iter().map(|o| &o.locking_script))
        {
            if script.len() > MAX_SCRIPT_BYTES {
                return Err(ChainError::Rejected("script too large".into()));
            }
        }
        let mut total: u64 = 0;
        for output in &self.outputs {
            total = total
                .checked_add(output.value)
                .ok_or_else(|| ChainError::Rejected("output value overflow".into()))?;
        }
        Ok(())
    }

    /// Sum of output values. Callers must have run [`check_structure`] first.
    pub fn output_total(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Verify the signature on input `index` against the output it spends.
    pub fn verify_input(&self, index: usize, spent: &TxOutput) -> ChainResult<()> {
        let input = self
            .inputs
            .get(index)
            .ok_or_else(|| ChainError::Rejected("input index out of range".into()))?;
        let sig_bytes: [u8; 64] = input
            .unlocking_script
            .as_slice()
            .try_into()
            .map_err(|_| ChainError::Rejected("unlocking script is not a signature".into()))?;
        let signature = Signature::from_bytes(&sig_bytes);
        let pubkey = spent.pubkey()?;
        let preimage = sighash(self, index as u32);
        pubkey
            .verify(&preimage, &signature)
            .map_err(|_| ChainError::Rejected("signature verification failed".into()))
    }
}

/// The signature preimage for input `index`: the transaction serialized with
/// every input's unlocking script blanked, followed by the index.
pub fn sighash(tx: &Transaction, index: u32) -> Vec<u8> {
    let mut blanked = tx.clone();
    for input in &mut blanked.inputs {
        input.unlocking_script.clear();
    }
    let mut preimage = blanked.serialize();
    preimage.extend_from_slice(&index.to_le_bytes());
    preimage
}

/// Produce the unlocking script for input `index` with `key`.
pub fn sign_input(tx: &Transaction, index: u32, key: &SigningKey) -> Vec<u8> {
    use ed25519_dalek::Signer;
    let preimage = sighash(tx, index);
    key.sign(&preimage).to_bytes().to_vec()
}

/// Bounds-checked little-endian reader over a byte slice.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }

    pub(crate) fn bytes(&mut self, len: usize) -> ChainResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| ChainError::Serialization("unexpected end of input".into()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> ChainResult<[u8; N]> {
        Ok(self.bytes(N)?.try_into().unwrap())
    }

    pub(crate) fn u32(&mut self) -> ChainResult<u32> {
        Ok(u32::from_le_bytes(self.array::<4>()?))
    }

    pub(crate) fn u64(&mut self) -> ChainResult<u64> {
        Ok(u64::from_le_bytes(self.array::<8>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn keypair() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    fn spend_tx(prev_txid: [u8; 32]) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                prev: OutPoint {
                    txid: prev_txid,
                    vout: 0,
                },
                unlocking_script: Vec::new(),
            }],
            outputs: vec![TxOutput {
                value: 900,
                locking_script: vec![LOCKING_SCRIPT_TAG; 33],
            }],
            locktime: 0,
        }
    }

    #[test]
    fn test_serialize_roundtrip() {
        let tx = spend_tx([5u8; 32]);
        let bytes = tx.serialize();
        assert_eq!(Transaction::deserialize(&bytes).unwrap(), tx);
    }

    #[test]
    fn test_deserialize_rejects_trailing_bytes() {
        let mut bytes = spend_tx([1u8; 32]).serialize();
        bytes.push(0);
        assert!(Transaction::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_deserialize_rejects_truncation() {
        let bytes = spend_tx([1u8; 32]).serialize();
        for cut in [0, 3, 10, bytes.len() - 1] {
            assert!(
                Transaction::deserialize(&bytes[..cut]).is_err(),
                "truncation at {} must fail",
                cut
            );
        }
    }

    #[test]
    fn test_deserialize_rejects_huge_script_len() {
        // A claimed script length far beyond the buffer must not allocate.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes()); // version
        bytes.extend_from_slice(&1u32.to_le_bytes()); // n_in
        bytes.extend_from_slice(&[0u8; 32]); // txid
        bytes.extend_from_slice(&0u32.to_le_bytes()); // vout
        bytes.extend_from_slice(&u32::MAX.to_le_bytes()); // script len
        assert!(Transaction::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_txid_commits_to_contents() {
        let a = spend_tx([1u8; 32]);
        let b = spend_tx([2u8; 32]);
        assert_ne!(a.txid(), b.txid());
        assert_eq!(a.txid(), a.clone().txid());
    }

    #[test]
    fn test_coinbase_shape() {
        let coinbase = Transaction::coinbase(42, vec![TxOutput::pay_to_pubkey(
            50,
            &keypair().verifying_key(),
        )]);
        assert!(coinbase.is_coinbase());
        assert_eq!(coinbase.coinbase_height().unwrap(), 42);
        assert!(!spend_tx([1u8; 32]).is_coinbase());
    }

    #[test]
    fn test_structure_rejects_empty_outputs() {
        let mut tx = spend_tx([1u8; 32]);
        tx.outputs.clear();
        assert!(tx.check_structure().is_err());
    }

    #[test]
    fn test_structure_rejects_value_overflow() {
        let mut tx = spend_tx([1u8; 32]);
        tx.outputs = vec![
            TxOutput {
                value: u64::MAX,
                locking_script: vec![0x01],
            },
            TxOutput {
                value: 1,
                locking_script: vec![0x01],
            },
        ];
        assert!(tx.check_structure().is_err());
    }

    #[test]
    fn test_structure_rejects_oversized_script() {
        let mut tx = spend_tx([1u8; 32]);
        tx.outputs[0].locking_script = vec![0u8; MAX_SCRIPT_BYTES + 1];
        assert!(tx.check_structure().is_err());
    }

    #[test]
    fn test_sign_and_verify_input() {
        let key = keypair();
        let spent = TxOutput::pay_to_pubkey(1000, &key.verifying_key());

        let mut tx = spend_tx([9u8; 32]);
        tx.inputs[0].unlocking_script = sign_input(&tx, 0, &key);
        tx.verify_input(0, &spent).unwrap();
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let key = keypair();
        let other = keypair();
        let spent = TxOutput::pay_to_pubkey(1000, &other.verifying_key());

        let mut tx = spend_tx([9u8; 32]);
        tx.inputs[0].unlocking_script = sign_input(&tx, 0, &key);
        assert!(tx.verify_input(0, &spent).is_err());
    }

    #[test]
    fn test_tampered_tx_fails_verification() {
        let key = keypair();
        let spent = TxOutput::pay_to_pubkey(1000, &key.verifying_key());

        let mut tx = spend_tx([9u8; 32]);
        tx.inputs[0].unlocking_script = sign_input(&tx, 0, &key);
        tx.outputs[0].value += 1;
        assert!(tx.verify_input(0, &spent).is_err());
    }

    #[test]
    fn test_sighash_blanks_all_inputs() {
        let mut tx = spend_tx([9u8; 32]);
        tx.inputs.push(TxInput {
            prev: OutPoint {
                txid: [8u8; 32],
                vout: 1,
            },
            unlocking_script: vec![0xFF; 64],
        });
        let before = sighash(&tx, 0);
        tx.inputs[1].unlocking_script = vec![0xAA; 64];
        let after = sighash(&tx, 0);
        assert_eq!(before, after, "other inputs' scripts must not affect the preimage");
    }
}
