// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{Error, Operation};
use agora_crypto::{ripe_digest, sha256, PrivateKey, PublicKey, Sha256Digest, Signature};
use agora_encoding::serialize_canonical;
use agora_types::Timestamp;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 20-byte transaction id: truncated sha-256 of the transaction without
/// signatures.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub [u8; 20]);

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Reserved extension slot; no variants exist yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Extension {}

/// An unsigned transaction. TaPoS fields tie it to a recent block so it
/// cannot be replayed onto a distant fork.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Low 16 bits of the referenced block height.
    pub ref_block_num: u16,
    /// Low 32 bits of the referenced block id.
    pub ref_block_prefix: u32,
    pub expiration: Timestamp,
    pub operations: Vec<Operation>,
    pub extensions: Vec<Extension>,
}

impl Transaction {
    pub fn new(expiration: Timestamp, operations: Vec<Operation>) -> Self {
        Transaction {
            ref_block_num: 0,
            ref_block_prefix: 0,
            operations,
            expiration,
            extensions: Vec::new(),
        }
    }

    /// Point TaPoS at a reference block.
    pub fn set_reference_block(&mut self, block_num: u32, block_id: &[u8; 20]) {
        self.ref_block_num = (block_num & 0xFFFF) as u16;
        self.ref_block_prefix = u32::from_le_bytes(block_id[4..8].try_into().expect("4 bytes"));
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        serialize_canonical(self).expect("transaction serialization cannot fail")
    }

    pub fn id(&self) -> TxId {
        TxId(ripe_digest(&self.canonical_bytes()))
    }

    /// The digest signatures commit to: `sha256(chain_id || tx_bytes)`.
    pub fn sig_digest(&self, chain_id: &Sha256Digest) -> Sha256Digest {
        let mut data = Vec::with_capacity(32 + 256);
        data.extend_from_slice(chain_id);
        data.extend_from_slice(&self.canonical_bytes());
        sha256(&data)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.operations.is_empty() {
            return Err(Error::EmptyTransaction);
        }
        for op in &self.operations {
            op.validate()?;
        }
        Ok(())
    }
}

/// A transaction plus its signatures, with lazily computed caches for the id
/// and the recovered signing keys. The caches are pure functions of the
/// bytes, so they may be warmed in parallel ahead of the writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signatures: Vec<Signature>,
    #[serde(skip)]
    cached_id: OnceCell<TxId>,
    #[serde(skip)]
    cached_signers: OnceCell<Vec<PublicKey>>,
}

impl PartialEq for SignedTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.transaction == other.transaction && self.signatures == other.signatures
    }
}

impl SignedTransaction {
    pub fn new(transaction: Transaction) -> Self {
        SignedTransaction {
            transaction,
            signatures: Vec::new(),
            cached_id: OnceCell::new(),
            cached_signers: OnceCell::new(),
        }
    }

    pub fn sign(&mut self, key: &PrivateKey, chain_id: &Sha256Digest) {
        let digest = self.transaction.sig_digest(chain_id);
        self.signatures.push(Signature::sign(&digest, key));
        self.cached_signers = OnceCell::new();
    }

    pub fn id(&self) -> TxId {
        *self.cached_id.get_or_init(|| self.transaction.id())
    }

    /// Recover the signing keys, erroring on duplicates. Cached after the
    /// first call; `chain_id` must not vary within a process.
    pub fn recovered_signers(&self, chain_id: &Sha256Digest) -> Result<&[PublicKey], Error> {
        if let Some(keys) = self.cached_signers.get() {
            return Ok(keys);
        }
        let digest = self.transaction.sig_digest(chain_id);
        let mut keys = Vec::with_capacity(self.signatures.len());
        for sig in &self.signatures {
            let key = sig.recover(&digest)?;
            if keys.contains(&key) {
                return Err(Error::DuplicateSignature);
            }
            keys.push(key);
        }
        Ok(self.cached_signers.get_or_init(|| keys))
    }

    /// Warm the id and signer caches; a pure function of the bytes.
    pub fn precompute(&self, chain_id: &Sha256Digest) -> Result<(), Error> {
        self.id();
        self.recovered_signers(chain_id)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.transaction.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::Transfer;
    use crate::Fee;
    use agora_types::Amount;

    fn tx() -> Transaction {
        Transaction::new(
            1_000,
            vec![Operation::Transfer(Transfer {
                fee: Fee::from_balance(1),
                from: 100,
                to: 101,
                amount: Amount::core(10),
                memo: None,
                from_prepaid: false,
                to_prepaid: false,
            })],
        )
    }

    #[test]
    fn id_ignores_signatures() {
        let unsigned = tx();
        let mut signed = SignedTransaction::new(unsigned.clone());
        signed.sign(&PrivateKey::from_seed("a"), &[7u8; 32]);
        assert_eq!(signed.id(), unsigned.id());
    }

    #[test]
    fn signer_recovery_round_trips() {
        let key = PrivateKey::from_seed("alice");
        let chain_id = [9u8; 32];
        let mut signed = SignedTransaction::new(tx());
        signed.sign(&key, &chain_id);
        let signers = signed.recovered_signers(&chain_id).unwrap();
        assert_eq!(signers, [key.public_key()]);
    }

    #[test]
    fn chain_id_separates_signatures() {
        let key = PrivateKey::from_seed("alice");
        let mut signed = SignedTransaction::new(tx());
        signed.sign(&key, &[1u8; 32]);
        let signers = signed.recovered_signers(&[2u8; 32]).unwrap();
        assert_ne!(signers, [key.public_key()]);
    }

    #[test]
    fn tapos_fields_derive_from_reference_block() {
        let mut t = tx();
        let mut id = [0u8; 20];
        id[4..8].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        t.set_reference_block(0x1_0005, &id);
        assert_eq!(t.ref_block_num, 5);
        assert_eq!(t.ref_block_prefix, 0xDEAD_BEEF);
    }

    #[test]
    fn wire_round_trip() {
        let mut signed = SignedTransaction::new(tx());
        signed.sign(&PrivateKey::from_seed("alice"), &[3u8; 32]);
        let bytes = serialize_canonical(&signed).unwrap();
        let back: SignedTransaction = agora_encoding::deserialize_canonical(&bytes).unwrap();
        assert_eq!(back, signed);
    }
}
