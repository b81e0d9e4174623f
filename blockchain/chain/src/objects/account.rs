// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use agora_db::{ChainObject, IndexKey, KeyWriter};
use agora_crypto::PublicKey;
use agora_message::{operations::RegInfo, Authority};
use agora_types::{
    AccountUid, AssetAid, BlockNum, HardforkVersion, LicenseLid, PostPid, Share, Timestamp,
    NO_RELEASE_BLOCK,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An account: the unit of authority on the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub uid: AccountUid,
    pub name: String,
    pub owner: Authority,
    pub active: Authority,
    pub secondary: Authority,
    pub memo_key: PublicKey,
    pub reg_info: RegInfo,
    /// Set when the registrar owned a platform at registration time.
    pub register_by_platform: bool,

    pub can_post: bool,
    pub can_reply: bool,
    pub can_rate: bool,
    pub is_full_member: bool,
    pub is_registrar: bool,
    pub is_admin: bool,

    /// Accounts this account has white-/black-listed, as consulted by
    /// whitelist-flagged assets.
    pub whitelisted_accounts: BTreeSet<AccountUid>,
    pub blacklisted_accounts: BTreeSet<AccountUid>,
    /// When present, the only assets this account may hold.
    pub allowed_assets: Option<BTreeSet<AssetAid>>,

    /// Instance id of the 1:1 statistics row.
    pub statistics: u64,

    pub create_time: Timestamp,
    pub last_update_time: Timestamp,
}

impl Account {
    pub fn enabled_allowed_assets(&self) -> bool {
        self.allowed_assets.is_some()
    }

    pub fn may_hold(&self, asset: AssetAid) -> bool {
        match &self.allowed_assets {
            None => true,
            Some(allowed) => allowed.contains(&asset),
        }
    }

    pub fn authority(&self, class: agora_message::AuthClass) -> &Authority {
        match class {
            agora_message::AuthClass::Owner => &self.owner,
            agora_message::AuthClass::Active => &self.active,
            agora_message::AuthClass::Secondary => &self.secondary,
        }
    }
}

pub mod account_idx {
    pub const BY_UID: usize = 0;
    pub const BY_NAME: usize = 1;
}

impl ChainObject for Account {
    const TYPE_NAME: &'static str = "account";
    const INDEX_COUNT: usize = 2;

    fn index_keys(&self, _id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default().u64(self.uid).finish(),
            KeyWriter::default().str(&self.name).finish(),
        ]
    }
}

/// Frequently-updated counters split from [`Account`] so the undo records
/// of hot paths stay small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountStatistics {
    pub owner: AccountUid,

    /// Core-asset balance, mirrored from the balance table for cheap
    /// pledge arithmetic.
    pub core_balance: Share,
    /// Spendable fee credit, funded by CSAF collection and content flows.
    pub prepaid: Share,
    /// Collected coin-seconds-as-fee, spent by scoring.
    pub csaf: Share,

    pub core_leased_in: Share,
    pub core_leased_out: Share,

    /// Lazily-accumulated coin-seconds; see the csaf module for the
    /// accrual rules.
    pub coin_seconds_earned: u128,
    pub coin_seconds_earned_last_update: Timestamp,

    pub total_witness_pledge: Share,
    pub releasing_witness_pledge: Share,
    pub witness_pledge_release_block: BlockNum,
    pub last_witness_sequence: u32,
    pub uncollected_witness_pay: Share,
    pub witness_last_confirmed_block_num: BlockNum,
    pub witness_last_aslot: u64,
    pub witness_total_produced: u64,
    pub witness_total_missed: u64,
    pub witness_last_reported_block_num: BlockNum,
    pub witness_total_reported: u64,

    pub total_committee_member_pledge: Share,
    pub releasing_committee_member_pledge: Share,
    pub committee_member_pledge_release_block: BlockNum,
    pub last_committee_member_sequence: u32,

    pub total_platform_pledge: Share,
    pub releasing_platform_pledge: Share,
    pub platform_pledge_release_block: BlockNum,
    pub last_platform_sequence: u32,

    pub can_vote: bool,
    pub is_voter: bool,
    pub last_voter_sequence: u32,

    pub last_post_sequence: PostPid,
    pub last_license_sequence: LicenseLid,
}

impl AccountStatistics {
    pub fn new(owner: AccountUid) -> Self {
        AccountStatistics {
            owner,
            core_balance: 0,
            prepaid: 0,
            csaf: 0,
            core_leased_in: 0,
            core_leased_out: 0,
            coin_seconds_earned: 0,
            coin_seconds_earned_last_update: 0,
            total_witness_pledge: 0,
            releasing_witness_pledge: 0,
            witness_pledge_release_block: NO_RELEASE_BLOCK,
            last_witness_sequence: 0,
            uncollected_witness_pay: 0,
            witness_last_confirmed_block_num: 0,
            witness_last_aslot: 0,
            witness_total_produced: 0,
            witness_total_missed: 0,
            witness_last_reported_block_num: 0,
            witness_total_reported: 0,
            total_committee_member_pledge: 0,
            releasing_committee_member_pledge: 0,
            committee_member_pledge_release_block: NO_RELEASE_BLOCK,
            last_committee_member_sequence: 0,
            total_platform_pledge: 0,
            releasing_platform_pledge: 0,
            platform_pledge_release_block: NO_RELEASE_BLOCK,
            last_platform_sequence: 0,
            can_vote: true,
            is_voter: false,
            last_voter_sequence: 0,
            last_post_sequence: 0,
            last_license_sequence: 0,
        }
    }

    /// Core coins not encumbered by leases or any role pledge.
    pub fn unencumbered_balance(&self) -> Share {
        self.core_balance
            - self.core_leased_out
            - self.total_witness_pledge
            - self.total_committee_member_pledge
            - self.total_platform_pledge
    }

    /// Balance available to back a pledge for `role`; the role's own
    /// current pledge (including its releasing part) is reusable.
    pub fn available_for_pledge(&self, role: PledgeRole) -> Share {
        let mut available = self.core_balance - self.core_leased_out;
        if role != PledgeRole::Witness {
            available -= self.total_witness_pledge;
        }
        if role != PledgeRole::Committee {
            available -= self.total_committee_member_pledge;
        }
        if role != PledgeRole::Platform {
            available -= self.total_platform_pledge;
        }
        available
    }

    /// Coins accruing coin-seconds for this account.
    pub fn accruing_coins(&self, hardfork: HardforkVersion) -> Share {
        let mut coins = self.core_balance - self.core_leased_out + self.core_leased_in;
        // Fork04 stopped witness pledges from accruing CSAF; the branch is
        // kept distinct from the pre-fork path until replay proves them
        // equivalent on the live ledger.
        if hardfork >= HardforkVersion::Fork04 {
            coins -= self.total_witness_pledge;
        }
        coins.max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PledgeRole {
    Witness,
    Committee,
    Platform,
}

pub mod account_stats_idx {
    pub const BY_OWNER: usize = 0;
    pub const BY_WITNESS_RELEASE: usize = 1;
    pub const BY_COMMITTEE_RELEASE: usize = 2;
    pub const BY_PLATFORM_RELEASE: usize = 3;
}

impl ChainObject for AccountStatistics {
    const TYPE_NAME: &'static str = "account_statistics";
    const INDEX_COUNT: usize = 4;

    fn index_keys(&self, id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default().u64(self.owner).finish(),
            KeyWriter::default().u32(self.witness_pledge_release_block).u64(id).finish(),
            KeyWriter::default().u32(self.committee_member_pledge_release_block).u64(id).finish(),
            KeyWriter::default().u32(self.platform_pledge_release_block).u64(id).finish(),
        ]
    }
}

/// One (owner, asset) balance row; created on first credit, never erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub owner: AccountUid,
    pub asset_aid: AssetAid,
    pub balance: Share,
}

pub mod balance_idx {
    pub const BY_ACCOUNT_ASSET: usize = 0;
    pub const BY_ASSET: usize = 1;
}

impl ChainObject for AccountBalance {
    const TYPE_NAME: &'static str = "account_balance";
    const INDEX_COUNT: usize = 2;

    fn index_keys(&self, _id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default().u64(self.owner).u64(self.asset_aid).finish(),
            KeyWriter::default().u64(self.asset_aid).u64(self.owner).finish(),
        ]
    }
}

/// A governance voter. Lives as long as its votes do; `sequence`
/// distinguishes re-registrations of the same account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voter {
    pub uid: AccountUid,
    pub sequence: u32,
    pub is_valid: bool,

    /// Raw votes: the account's core balance when it last voted.
    pub votes: u64,
    pub votes_last_update: Timestamp,

    /// Votes as seen by targets, catching up to `votes` on scheduled
    /// update blocks.
    pub effective_votes: u64,
    pub effective_votes_last_update: Timestamp,
    pub effective_votes_next_update_block: BlockNum,

    pub proxy_uid: AccountUid,
    pub proxy_sequence: u32,

    /// Voters currently proxying to this one.
    pub proxied_voters: u64,
    /// `proxied_votes[i]`: votes arriving through an (i+1)-hop chain.
    pub proxied_votes: Vec<i64>,
    /// `[0]` is the voter's own last vote block; `[k]` the newest vote
    /// block among voters `k` hops below.
    pub proxy_last_vote_block: Vec<BlockNum>,
    pub effective_last_vote_block: BlockNum,

    pub number_of_witnesses_voted: u16,
    pub number_of_committee_members_voted: u16,
    pub number_of_platforms_voted: u16,
}

impl Voter {
    pub fn total_votes(&self) -> i64 {
        self.effective_votes as i64 + self.proxied_votes.iter().sum::<i64>()
    }

    pub fn update_effective_last_vote_block(&mut self) {
        self.effective_last_vote_block =
            self.proxy_last_vote_block.iter().copied().max().unwrap_or(0);
    }
}

pub mod voter_idx {
    pub const BY_UID_SEQ: usize = 0;
    pub const BY_NEXT_UPDATE: usize = 1;
    pub const BY_VALID: usize = 2;
    pub const BY_PROXY: usize = 3;
}

impl ChainObject for Voter {
    const TYPE_NAME: &'static str = "voter";
    const INDEX_COUNT: usize = 4;

    fn index_keys(&self, id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default().u64(self.uid).u32(self.sequence).finish(),
            KeyWriter::default().u32(self.effective_votes_next_update_block).u64(id).finish(),
            KeyWriter::default()
                .bool(self.is_valid)
                .u64(self.proxy_uid)
                .u32(self.effective_last_vote_block)
                .u64(id)
                .finish(),
            KeyWriter::default().u64(self.proxy_uid).u32(self.proxy_sequence).u64(id).finish(),
        ]
    }
}

/// Committee-decided takeover of a demoted registrar's accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrarTakeover {
    pub original_registrar: AccountUid,
    pub takeover_registrar: AccountUid,
}

pub mod takeover_idx {
    pub const BY_ORIGINAL: usize = 0;
    pub const BY_TAKEOVER: usize = 1;
}

impl ChainObject for RegistrarTakeover {
    const TYPE_NAME: &'static str = "registrar_takeover";
    const INDEX_COUNT: usize = 2;

    fn index_keys(&self, _id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default().u64(self.original_registrar).finish(),
            KeyWriter::default().u64(self.takeover_registrar).u64(self.original_registrar).finish(),
        ]
    }
}

/// A platform's standing authorization to draw on a user's prepaid, with an
/// action bitmask. Mirrored by a secondary-authority entry on the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountAuthPlatformObject {
    pub account: AccountUid,
    pub platform: AccountUid,
    pub max_limit: Share,
    pub cur_used: Share,
    pub permission_flags: u32,
    pub memo: Option<String>,
}

impl AccountAuthPlatformObject {
    pub fn usable_prepaid(&self) -> Share {
        (self.max_limit - self.cur_used).max(0)
    }
}

pub mod auth_platform_idx {
    pub const BY_ACCOUNT_PLATFORM: usize = 0;
    pub const BY_PLATFORM: usize = 1;
}

impl ChainObject for AccountAuthPlatformObject {
    const TYPE_NAME: &'static str = "account_auth_platform";
    const INDEX_COUNT: usize = 2;

    fn index_keys(&self, _id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default().u64(self.account).u64(self.platform).finish(),
            KeyWriter::default().u64(self.platform).u64(self.account).finish(),
        ]
    }
}
