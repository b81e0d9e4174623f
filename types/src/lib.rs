// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Shared primitive types for the Agora chain: identifiers, share amounts,
//! protocol constants and the committee-governed chain parameters.

mod amount;
mod params;

pub use amount::{Amount, Share};
pub use params::{ChainParameters, ContentAwardParameters};

use serde::{Deserialize, Serialize};

/// Application-visible stable account identifier.
pub type AccountUid = u64;
/// Application-visible stable asset identifier.
pub type AssetAid = u64;
/// Per-poster monotonic post identifier.
pub type PostPid = u64;
/// Per-platform monotonic license identifier.
pub type LicenseLid = u64;
/// Monotonic committee proposal number.
pub type ProposalNumber = u64;
/// Block height.
pub type BlockNum = u32;
/// Seconds since the Unix epoch; all consensus timestamps are 32-bit.
pub type Timestamp = u32;

/// Hard-fork gates activate new behavior deterministically across nodes.
/// Gated branches are kept distinct even where both sides currently behave
/// identically, until replay shows them equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HardforkVersion {
    None = 0,
    Fork04 = 1,
    Fork05 = 2,
}

impl Default for HardforkVersion {
    fn default() -> Self {
        HardforkVersion::None
    }
}

/// The core asset always has aid 0.
pub const CORE_ASSET_AID: AssetAid = 0;
/// Denominator of all ratio arithmetic: 10_000 == 100%.
pub const FULL_PERCENT: u32 = 10_000;
/// 1% in ratio units.
pub const ONE_PERCENT: u32 = FULL_PERCENT / 100;
/// Satoshis per whole core coin (precision 5).
pub const COIN_PRECISION: i64 = 100_000;
/// Hard cap on any asset supply.
pub const MAX_SHARE_SUPPLY: i64 = 1_000_000_000_000_000;

/// Sentinel uid meaning "vote by self, no proxy".
pub const PROXY_TO_SELF_UID: AccountUid = 0;
/// Reserved uid owning genesis supply until distribution.
pub const COMMITTEE_ACCOUNT_UID: AccountUid = 1;
/// Reserved uid for the null account (burns, placeholders).
pub const NULL_ACCOUNT_UID: AccountUid = 2;

/// Supermajority confirmation threshold for irreversibility, in ratio units.
pub const IRREVERSIBLE_THRESHOLD: u32 = 67 * ONE_PERCENT;
/// Upper bound on the undo history, and so on tolerated missed blocks.
pub const MAX_UNDO_HISTORY: u32 = 10_000;
/// `recently_missed_count` bookkeeping increments.
pub const RECENTLY_MISSED_COUNT_INCREMENT: u32 = 4;
pub const RECENTLY_MISSED_COUNT_DECREMENT: u32 = 3;

/// Size of the TaPoS block-summary ring. A `ref_block_num` is the low 16 bits
/// of the referenced height.
pub const BLOCK_SUMMARY_SLOTS: u32 = 0x1_0000;

/// Bound on authority-graph walks; cycles are broken by this depth.
pub const MAX_AUTHORITY_RECURSION_DEPTH: u32 = 2;
/// Maximum number of keys plus account references in one authority.
pub const MAX_AUTHORITY_MEMBERSHIP: usize = 10;
/// Nested proposal fee computation recursion bound.
pub const MAX_PROPOSAL_NESTING_DEPTH: u32 = 4;

/// The platform's fixed share of every post's receipts.
pub const PLATFORM_RECEIPT_RATIO: u32 = 30 * ONE_PERCENT;
/// The scorers' share of a post's content award.
pub const SCORE_RECEIPT_RATIO: u32 = 20 * ONE_PERCENT;
/// A post's receiptor map never exceeds this size.
pub const MAX_RECEIPTORS: usize = 5;
/// "Unlimited" sentinel for platform prepaid draw authorizations.
pub const MAX_PLATFORM_LIMIT_PREPAID: i64 = i64::MAX;

/// Bounded per-block batch sizes for maintenance garbage collection.
pub const MAX_RESIGNED_WITNESS_VOTES_PER_BLOCK: u32 = 100;
pub const MAX_RESIGNED_COMMITTEE_VOTES_PER_BLOCK: u32 = 100;
pub const MAX_RESIGNED_PLATFORM_VOTES_PER_BLOCK: u32 = 100;
pub const MAX_EXPIRED_VOTERS_TO_PROCESS_PER_BLOCK: u32 = 100;

/// Release-block sentinel meaning "nothing releasing".
pub const NO_RELEASE_BLOCK: BlockNum = BlockNum::MAX;

/// Platform permission bits an account can grant via `account_auth_platform`.
pub mod platform_permission {
    pub const FORWARD: u32 = 1;
    pub const LIKED: u32 = 2;
    pub const BUYOUT: u32 = 4;
    pub const COMMENT: u32 = 8;
    pub const REWARD: u32 = 16;
    pub const POST: u32 = 32;
    pub const TRANSFER: u32 = 64;
    pub const ALL: u32 = FORWARD | LIKED | BUYOUT | COMMENT | REWARD | POST | TRANSFER;
}

/// Post permission bits.
pub mod post_permission {
    pub const FORWARD: u32 = 1;
    pub const LIKED: u32 = 2;
    pub const BUYOUT: u32 = 4;
    pub const COMMENT: u32 = 8;
    pub const REWARD: u32 = 16;
    pub const ALL: u32 = 0xFFFF_FFFF;
}

/// Asset flag bits; `flags ⊆ permissions ⊆ ASSET_PERMISSION_MASK`.
pub mod asset_flags {
    pub const WHITE_LIST: u16 = 0x02;
    pub const OVERRIDE_AUTHORITY: u16 = 0x04;
    pub const TRANSFER_RESTRICTED: u16 = 0x08;
    pub const ISSUE_ASSET: u16 = 0x200;
    pub const CHANGE_MAX_SUPPLY: u16 = 0x400;

    pub const ASSET_PERMISSION_MASK: u16 =
        WHITE_LIST | OVERRIDE_AUTHORITY | TRANSFER_RESTRICTED | ISSUE_ASSET | CHANGE_MAX_SUPPLY;
}

/// Which pool a scheduled witness slot was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledWitnessKind {
    ByVoteTop,
    ByVoteRest,
    ByPledge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_constants_are_consistent() {
        assert_eq!(FULL_PERCENT, 100 * ONE_PERCENT);
        assert_eq!(PLATFORM_RECEIPT_RATIO + 70 * ONE_PERCENT, FULL_PERCENT);
        assert!(SCORE_RECEIPT_RATIO < FULL_PERCENT);
    }

    #[test]
    fn asset_mask_covers_all_flags() {
        use asset_flags::*;
        for f in [WHITE_LIST, OVERRIDE_AUTHORITY, TRANSFER_RESTRICTED, ISSUE_ASSET, CHANGE_MAX_SUPPLY] {
            assert_eq!(ASSET_PERMISSION_MASK & f, f);
        }
    }
}
