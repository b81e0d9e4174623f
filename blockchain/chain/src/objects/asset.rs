// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use agora_db::{ChainObject, IndexKey, KeyWriter};
use agora_types::{asset_flags, AccountUid, AssetAid, Share};
use serde::{Deserialize, Serialize};

/// A user-issued token, or the core coin itself (aid 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub aid: AssetAid,
    pub symbol: String,
    pub precision: u8,
    pub issuer: AccountUid,
    pub max_supply: Share,
    /// Active behavior flags; always a subset of `permissions`.
    pub flags: u16,
    /// Flags the issuer may ever enable; can only shrink.
    pub permissions: u16,
    pub description: String,
    /// Instance id of the 1:1 dynamic data row.
    pub dynamic_data: u64,
}

impl Asset {
    pub fn is_transfer_restricted(&self) -> bool {
        self.flags & asset_flags::TRANSFER_RESTRICTED != 0
    }

    pub fn uses_whitelist(&self) -> bool {
        self.flags & asset_flags::WHITE_LIST != 0
    }

    pub fn can_override(&self) -> bool {
        self.flags & asset_flags::OVERRIDE_AUTHORITY != 0
    }

    pub fn can_issue(&self) -> bool {
        self.flags & asset_flags::ISSUE_ASSET != 0
    }

    pub fn can_change_max_supply(&self) -> bool {
        self.flags & asset_flags::CHANGE_MAX_SUPPLY != 0
    }
}

pub mod asset_idx {
    pub const BY_AID: usize = 0;
    pub const BY_SYMBOL: usize = 1;
}

impl ChainObject for Asset {
    const TYPE_NAME: &'static str = "asset";
    const INDEX_COUNT: usize = 2;

    fn index_keys(&self, _id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default().u64(self.aid).finish(),
            KeyWriter::default().str(&self.symbol).finish(),
        ]
    }
}

/// Supply counters split from [`Asset`] so issuance and fee burns keep undo
/// records small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDynamicData {
    pub aid: AssetAid,
    pub current_supply: Share,
    pub accumulated_fees: Share,
}

impl AssetDynamicData {
    /// Unissued supply; the budget engine draws against the core reserve.
    pub fn reserved(&self, max_supply: Share) -> Share {
        max_supply - self.current_supply
    }
}

pub mod asset_dyn_idx {
    pub const BY_AID: usize = 0;
}

impl ChainObject for AssetDynamicData {
    const TYPE_NAME: &'static str = "asset_dynamic_data";
    const INDEX_COUNT: usize = 1;

    fn index_keys(&self, _id: u64) -> Vec<IndexKey> {
        vec![KeyWriter::default().u64(self.aid).finish()]
    }
}
