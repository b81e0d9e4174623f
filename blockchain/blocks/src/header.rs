// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::Error;
use agora_crypto::{ripe_digest, sha256, PrivateKey, PublicKey, Signature};
use agora_encoding::serialize_canonical;
use agora_message::SignedTransaction;
use agora_types::{AccountUid, BlockNum, Timestamp};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 20-byte block id. The leading 4 bytes hold the big-endian block height,
/// the rest is truncated header digest; `block_num()` is recoverable from
/// the id alone.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub [u8; 20]);

impl BlockId {
    pub fn block_num(&self) -> BlockNum {
        u32::from_be_bytes(self.0[..4].try_into().expect("4 bytes"))
    }

    /// Low 32 bits used as a TaPoS reference prefix.
    pub fn tapos_prefix(&self) -> u32 {
        u32::from_le_bytes(self.0[4..8].try_into().expect("4 bytes"))
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub previous: BlockId,
    pub timestamp: Timestamp,
    pub witness: AccountUid,
    pub transaction_merkle_root: [u8; 20],
}

impl BlockHeader {
    /// Height of this block: one past the previous id's height.
    pub fn block_num(&self) -> BlockNum {
        self.previous.block_num() + 1
    }

    pub fn digest(&self) -> [u8; 32] {
        sha256(&serialize_canonical(self).expect("header serialization cannot fail"))
    }

    /// The id commits to the unsigned header; its first four bytes are
    /// replaced by the height so ids sort and index by height.
    pub fn id(&self) -> BlockId {
        let mut id = ripe_digest(&serialize_canonical(self).expect("header serialization cannot fail"));
        id[..4].copy_from_slice(&self.block_num().to_be_bytes());
        BlockId(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBlockHeader {
    pub header: BlockHeader,
    pub witness_signature: Signature,
}

impl SignedBlockHeader {
    /// Check the witness signature against the scheduled witness's key.
    pub fn verify_signature(&self, signing_key: &PublicKey) -> Result<(), Error> {
        if self.witness_signature.verify(&self.header.digest(), signing_key) {
            Ok(())
        } else {
            Err(Error::InvalidSignature(format!(
                "block {} not signed by {}",
                self.header.id(),
                signing_key
            )))
        }
    }
}

/// A complete block as applied by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBlock {
    pub header: BlockHeader,
    pub witness_signature: Signature,
    pub transactions: Vec<SignedTransaction>,
    #[serde(skip)]
    cached_id: OnceCell<BlockId>,
}

impl SignedBlock {
    /// Assemble and sign a block over `transactions`.
    pub fn produce(
        previous: BlockId,
        timestamp: Timestamp,
        witness: AccountUid,
        transactions: Vec<SignedTransaction>,
        signing_key: &PrivateKey,
    ) -> Self {
        let header = BlockHeader {
            previous,
            timestamp,
            witness,
            transaction_merkle_root: merkle_root(&transactions),
        };
        let witness_signature = Signature::sign(&header.digest(), signing_key);
        SignedBlock { header, witness_signature, transactions, cached_id: OnceCell::new() }
    }

    pub fn id(&self) -> BlockId {
        *self.cached_id.get_or_init(|| self.header.id())
    }

    pub fn block_num(&self) -> BlockNum {
        self.header.block_num()
    }

    pub fn signed_header(&self) -> SignedBlockHeader {
        SignedBlockHeader {
            header: self.header.clone(),
            witness_signature: self.witness_signature,
        }
    }

    /// Structural check: the declared merkle root covers the transactions.
    pub fn verify_merkle_root(&self) -> Result<(), Error> {
        if merkle_root(&self.transactions) == self.header.transaction_merkle_root {
            Ok(())
        } else {
            Err(Error::MerkleMismatch)
        }
    }
}

/// Binary merkle tree over transaction ids; an odd leaf is paired with
/// itself, the empty tree is all zeroes.
pub fn merkle_root(transactions: &[SignedTransaction]) -> [u8; 20] {
    if transactions.is_empty() {
        return [0u8; 20];
    }
    let mut layer: Vec<[u8; 20]> = transactions.iter().map(|tx| tx.id().0).collect();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity((layer.len() + 1) / 2);
        for pair in layer.chunks(2) {
            let right = pair.get(1).unwrap_or(&pair[0]);
            let mut data = [0u8; 40];
            data[..20].copy_from_slice(&pair[0]);
            data[20..].copy_from_slice(right);
            next.push(ripe_digest(&data));
        }
        layer = next;
    }
    layer[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_at(height: BlockNum) -> SignedBlock {
        let mut previous = BlockId::default();
        previous.0[..4].copy_from_slice(&(height - 1).to_be_bytes());
        SignedBlock::produce(
            previous,
            3 * height,
            100,
            Vec::new(),
            &PrivateKey::from_seed("witness"),
        )
    }

    #[test]
    fn id_embeds_height() {
        let block = block_at(7);
        assert_eq!(block.id().block_num(), 7);
        assert_eq!(block.block_num(), 7);
    }

    #[test]
    fn signature_verifies_against_producer_key() {
        let block = block_at(1);
        let header = block.signed_header();
        header
            .verify_signature(&PrivateKey::from_seed("witness").public_key())
            .unwrap();
        assert!(header
            .verify_signature(&PrivateKey::from_seed("other").public_key())
            .is_err());
    }

    #[test]
    fn empty_merkle_root_is_zero() {
        assert_eq!(merkle_root(&[]), [0u8; 20]);
        block_at(1).verify_merkle_root().unwrap();
    }

    #[test]
    fn header_digest_is_stable_across_clone() {
        let block = block_at(3);
        assert_eq!(block.header.clone().id(), block.id());
    }
}
