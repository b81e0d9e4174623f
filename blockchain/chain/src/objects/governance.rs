// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use agora_crypto::PublicKey;
use agora_db::{ChainObject, IndexKey, KeyWriter};
use agora_message::{operations::CommitteeProposalItem, AuthClass, Operation};
use agora_types::{AccountUid, BlockNum, ProposalNumber, Share, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A block-producing witness. `sequence` ties votes to one incarnation; a
/// resigned witness stays, invalid, until its votes are garbage collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Witness {
    pub account: AccountUid,
    pub sequence: u32,
    pub is_valid: bool,
    pub signing_key: PublicKey,
    pub pledge: Share,
    pub total_votes: u64,
    pub url: String,

    pub last_confirmed_block_num: BlockNum,
    pub last_aslot: u64,
    pub total_produced: u64,
    pub total_missed: u64,

    /// Rolling average backing the by-pledge scheduler weight.
    pub average_pledge: Share,
    pub average_pledge_next_update_block: BlockNum,

    /// Virtual-time cursors of the two lottery pools.
    pub by_vote_scheduled_time: u128,
    pub by_pledge_scheduled_time: u128,
}

pub mod witness_idx {
    pub const BY_ACCOUNT: usize = 0;
    pub const BY_VALID: usize = 1;
    pub const BY_VOTES: usize = 2;
    pub const BY_PLEDGE_NEXT_UPDATE: usize = 3;
    pub const BY_VOTE_TIME: usize = 4;
    pub const BY_PLEDGE_TIME: usize = 5;
}

impl ChainObject for Witness {
    const TYPE_NAME: &'static str = "witness";
    const INDEX_COUNT: usize = 6;

    fn index_keys(&self, id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default().u64(self.account).u32(self.sequence).finish(),
            KeyWriter::default().bool(self.is_valid).u64(self.account).u32(self.sequence).finish(),
            KeyWriter::default()
                .bool(self.is_valid)
                .u64_desc(self.total_votes)
                .u64(self.account)
                .finish(),
            KeyWriter::default().u32(self.average_pledge_next_update_block).u64(id).finish(),
            KeyWriter::default()
                .bool(self.is_valid)
                .u128(self.by_vote_scheduled_time)
                .u64_desc(self.total_votes)
                .u64(self.account)
                .finish(),
            // ties on virtual time break by higher average pledge, then uid
            KeyWriter::default()
                .bool(self.is_valid)
                .u128(self.by_pledge_scheduled_time)
                .i64_desc(self.average_pledge)
                .u64(self.account)
                .finish(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeMember {
    pub account: AccountUid,
    pub sequence: u32,
    pub is_valid: bool,
    pub pledge: Share,
    pub total_votes: u64,
    pub url: String,
}

pub mod committee_idx {
    pub const BY_ACCOUNT: usize = 0;
    pub const BY_VALID: usize = 1;
    pub const BY_VOTES: usize = 2;
}

impl ChainObject for CommitteeMember {
    const TYPE_NAME: &'static str = "committee_member";
    const INDEX_COUNT: usize = 3;

    fn index_keys(&self, _id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default().u64(self.account).u32(self.sequence).finish(),
            KeyWriter::default().bool(self.is_valid).u64(self.account).u32(self.sequence).finish(),
            KeyWriter::default()
                .bool(self.is_valid)
                .u64_desc(self.total_votes)
                .u64(self.account)
                .finish(),
        ]
    }
}

/// Per-period earnings a platform accumulated, bounded to the retained
/// period window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformPeriodProfits {
    pub rewards_profits: BTreeMap<u64, Share>,
    pub forward_profits: Share,
    pub post_profits: Share,
    pub platform_profits: Share,
}

/// A content platform; owned by an account, voted like a witness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub owner: AccountUid,
    pub sequence: u32,
    pub is_valid: bool,
    pub name: String,
    pub url: String,
    pub extra_data: String,
    pub pledge: Share,
    pub total_votes: u64,

    pub average_pledge: Share,
    pub average_pledge_next_update_block: BlockNum,

    /// Recent award-period earnings, oldest evicted first.
    pub period_profits: BTreeMap<u64, PlatformPeriodProfits>,
    /// Recent platform-voted award payouts by settlement time.
    pub vote_profits: BTreeMap<Timestamp, Share>,

    pub create_time: Timestamp,
    pub last_update_time: Timestamp,
}

impl Platform {
    /// Accumulate period earnings, evicting the oldest period beyond
    /// `retained_periods`.
    pub fn add_period_profits(
        &mut self,
        period: u64,
        retained_periods: usize,
        reward: Option<(u64, Share)>,
        forward_profit: Share,
        post_profit: Share,
        platform_profit: Share,
    ) {
        if !self.period_profits.contains_key(&period) && self.period_profits.len() >= retained_periods {
            if let Some((&oldest, _)) = self.period_profits.iter().next() {
                self.period_profits.remove(&oldest);
            }
        }
        let entry = self.period_profits.entry(period).or_default();
        if let Some((asset, amount)) = reward {
            *entry.rewards_profits.entry(asset).or_insert(0) += amount;
        }
        entry.forward_profits += forward_profit;
        entry.post_profits += post_profit;
        entry.platform_profits += platform_profit;
    }
}

pub mod platform_idx {
    pub const BY_OWNER: usize = 0;
    pub const BY_VALID: usize = 1;
    pub const BY_VOTES: usize = 2;
    pub const BY_PLEDGE_NEXT_UPDATE: usize = 3;
}

impl ChainObject for Platform {
    const TYPE_NAME: &'static str = "platform";
    const INDEX_COUNT: usize = 4;

    fn index_keys(&self, id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default().u64(self.owner).u32(self.sequence).finish(),
            KeyWriter::default().bool(self.is_valid).u64(self.owner).u32(self.sequence).finish(),
            KeyWriter::default()
                .bool(self.is_valid)
                .u64_desc(self.total_votes)
                .u64(self.owner)
                .finish(),
            KeyWriter::default().u32(self.average_pledge_next_update_block).u64(id).finish(),
        ]
    }
}

/// A vote edge; both endpoints carry sequences so stale edges are
/// recognizable after either side re-registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceVote {
    pub voter_uid: AccountUid,
    pub voter_sequence: u32,
    pub target_uid: AccountUid,
    pub target_sequence: u32,
}

pub mod vote_idx {
    pub const BY_VOTER: usize = 0;
    pub const BY_TARGET: usize = 1;
}

impl GovernanceVote {
    fn keys(&self) -> Vec<IndexKey> {
        vec![
            KeyWriter::default()
                .u64(self.voter_uid)
                .u32(self.voter_sequence)
                .u64(self.target_uid)
                .u32(self.target_sequence)
                .finish(),
            KeyWriter::default()
                .u64(self.target_uid)
                .u32(self.target_sequence)
                .u64(self.voter_uid)
                .u32(self.voter_sequence)
                .finish(),
        ]
    }
}

/// The three edge tables share one shape but are distinct tables; a newtype
/// per target kind keeps their indices apart.
macro_rules! vote_table {
    ($name:ident, $type_name:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name(pub GovernanceVote);

        impl ChainObject for $name {
            const TYPE_NAME: &'static str = $type_name;
            const INDEX_COUNT: usize = 2;

            fn index_keys(&self, _id: u64) -> Vec<IndexKey> {
                self.0.keys()
            }
        }
    };
}

vote_table!(WitnessVote, "witness_vote");
vote_table!(CommitteeMemberVote, "committee_member_vote");
vote_table!(PlatformVote, "platform_vote");

/// A timed lease of CSAF-accruing coins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsafLease {
    pub from: AccountUid,
    pub to: AccountUid,
    pub amount: Share,
    pub expiration: Timestamp,
}

pub mod lease_idx {
    pub const BY_FROM_TO: usize = 0;
    pub const BY_EXPIRATION: usize = 1;
}

impl ChainObject for CsafLease {
    const TYPE_NAME: &'static str = "csaf_lease";
    const INDEX_COUNT: usize = 2;

    fn index_keys(&self, id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default().u64(self.from).u64(self.to).finish(),
            KeyWriter::default().u32(self.expiration).u64(id).finish(),
        ]
    }
}

/// A generic multi-signature proposal: executes once `available` covers
/// `required`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub expiration_time: Timestamp,
    pub proposed_ops: Vec<Operation>,
    pub required_approvals: BTreeSet<(AccountUid, AuthClass)>,
    pub available_approvals: BTreeSet<(AccountUid, AuthClass)>,
    pub available_key_approvals: BTreeSet<PublicKey>,
}

impl Proposal {
    pub fn is_authorized(&self) -> bool {
        self.required_approvals
            .iter()
            .all(|required| self.available_approvals.contains(required))
    }
}

pub mod proposal_idx {
    pub const BY_EXPIRATION: usize = 0;
}

impl ChainObject for Proposal {
    const TYPE_NAME: &'static str = "proposal";
    const INDEX_COUNT: usize = 1;

    fn index_keys(&self, id: u64) -> Vec<IndexKey> {
        vec![KeyWriter::default().u32(self.expiration_time).u64(id).finish()]
    }
}

/// A committee proposal: typed parameter/privilege changes voted by the
/// active committee within one committee term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeProposal {
    pub proposal_number: ProposalNumber,
    pub proposer: AccountUid,
    pub items: Vec<CommitteeProposalItem>,
    pub voting_closing_block_num: BlockNum,
    pub execution_block_num: BlockNum,
    pub expiration_block_num: BlockNum,
    /// Member uid to opinion; `true` is "for".
    pub opinions: BTreeMap<AccountUid, bool>,
    /// Ratio each "for" opinion contributes, fixed at creation.
    pub approve_threshold: u32,
    pub is_approved: bool,
}

pub mod committee_proposal_idx {
    pub const BY_NUMBER: usize = 0;
    pub const BY_APPROVED_CLOSING: usize = 1;
    pub const BY_APPROVED_EXECUTION: usize = 2;
}

impl ChainObject for CommitteeProposal {
    const TYPE_NAME: &'static str = "committee_proposal";
    const INDEX_COUNT: usize = 3;

    fn index_keys(&self, id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default().u64(self.proposal_number).finish(),
            KeyWriter::default()
                .bool(self.is_approved)
                .u32(self.voting_closing_block_num)
                .u64(id)
                .finish(),
            KeyWriter::default()
                .bool(self.is_approved)
                .u32(self.execution_block_num)
                .u64(id)
                .finish(),
        ]
    }
}
