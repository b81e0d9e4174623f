// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use agora_blocks::{BlockId, SignedBlockHeader};
use agora_types::BlockNum;
use std::collections::BTreeMap;

/// Recent block headers by height, kept only within the reversible window.
/// Competing branches are remembered so a rejected block's id can be
/// reported; deep reorganizations pop blocks through the undo stack first.
#[derive(Default)]
pub struct ForkDb {
    by_num: BTreeMap<BlockNum, Vec<SignedBlockHeader>>,
    max_size: usize,
}

impl ForkDb {
    pub fn push(&mut self, header: SignedBlockHeader) {
        let num = header.header.block_num();
        let entries = self.by_num.entry(num).or_default();
        if !entries.iter().any(|h| h.header == header.header) {
            entries.push(header);
        }
        self.prune();
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size.max(1);
        self.prune();
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.by_num
            .get(&id.block_num())
            .map(|headers| headers.iter().any(|h| h.header.id() == *id))
            .unwrap_or(false)
    }

    pub fn header(&self, id: &BlockId) -> Option<&SignedBlockHeader> {
        self.by_num.get(&id.block_num())?.iter().find(|h| h.header.id() == *id)
    }

    fn prune(&mut self) {
        while self.by_num.len() > self.max_size {
            let oldest = *self.by_num.keys().next().expect("non-empty map");
            self.by_num.remove(&oldest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_blocks::SignedBlock;
    use agora_crypto::PrivateKey;

    fn header_at(num: u32) -> SignedBlockHeader {
        let mut previous = BlockId::default();
        previous.0[..4].copy_from_slice(&(num - 1).to_be_bytes());
        SignedBlock::produce(previous, num * 3, 1, Vec::new(), &PrivateKey::from_seed("w"))
            .signed_header()
    }

    #[test]
    fn prunes_to_max_size() {
        let mut fork_db = ForkDb::default();
        fork_db.set_max_size(2);
        for n in 1..=5 {
            fork_db.push(header_at(n));
        }
        assert!(!fork_db.contains(&header_at(1).header.id()));
        assert!(fork_db.contains(&header_at(5).header.id()));
    }

    #[test]
    fn duplicate_pushes_are_ignored() {
        let mut fork_db = ForkDb::default();
        fork_db.set_max_size(8);
        fork_db.push(header_at(1));
        fork_db.push(header_at(1));
        assert_eq!(fork_db.by_num.get(&1).unwrap().len(), 1);
    }
}
