// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use agora_blocks::BlockId;
use agora_db::{ChainObject, IndexKey, KeyWriter};
use agora_message::{FeeSchedule, TxId};
use agora_types::{
    AccountUid, BlockNum, ChainParameters, HardforkVersion, ProposalNumber,
    ScheduledWitnessKind, Share, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Committee-governed global state: parameters, the fee schedule and the
/// currently active witness and committee sets. Singleton row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalProperties {
    pub parameters: ChainParameters,
    pub fee_schedule: FeeSchedule,
    /// Active witnesses of the current round, with the pool each slot was
    /// drawn from.
    pub active_witnesses: BTreeMap<AccountUid, ScheduledWitnessKind>,
    pub active_committee_members: Vec<AccountUid>,
}

impl ChainObject for GlobalProperties {
    const TYPE_NAME: &'static str = "global_properties";
}

/// Head-block state and every rolling cursor of the periodic machinery.
/// Singleton row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicGlobalProperties {
    pub head_block_num: BlockNum,
    pub head_block_id: BlockId,
    pub head_block_time: Timestamp,
    pub genesis_time: Timestamp,
    pub current_witness: AccountUid,
    /// Absolute slot of the head block since genesis.
    pub current_aslot: u64,
    pub recently_missed_count: u32,
    /// One bit per recent slot, newest in the low bit.
    pub recent_slots_filled: u128,
    pub last_irreversible_block_num: BlockNum,

    /// Undistributed award funds; all content payouts draw from here.
    pub budget_pool: Share,
    pub total_budget_per_block: Share,
    pub by_pledge_witness_pay_per_block: Share,
    /// Sum of valid witness pledges, input to the pay curve.
    pub total_witness_pledge: Share,

    pub next_budget_adjust_block: BlockNum,
    pub next_committee_update_block: BlockNum,
    pub next_committee_proposal_number: ProposalNumber,
    pub next_schedule_block_num: BlockNum,

    pub last_content_award_time: Timestamp,
    pub next_content_award_time: Timestamp,
    pub content_award_enabled: bool,
    pub last_platform_voted_award_time: Timestamp,
    pub next_platform_voted_award_time: Timestamp,
    pub current_active_post_sequence: u64,

    /// Virtual-time cursors of the two scheduling lotteries.
    pub current_by_vote_time: u128,
    pub current_by_pledge_time: u128,

    pub enabled_hardfork_version: HardforkVersion,
}

impl ChainObject for DynamicGlobalProperties {
    const TYPE_NAME: &'static str = "dynamic_global_properties";
}

/// The shuffled slot assignment of the current round. Singleton row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WitnessSchedule {
    pub current_shuffled_witnesses: Vec<(AccountUid, ScheduledWitnessKind)>,
}

impl ChainObject for WitnessSchedule {
    const TYPE_NAME: &'static str = "witness_schedule";
}

/// Recently-seen transaction, kept until expiration for duplicate
/// rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub trx_id: TxId,
    pub expiration: Timestamp,
}

pub mod tx_record_idx {
    pub const BY_TRX_ID: usize = 0;
    pub const BY_EXPIRATION: usize = 1;
}

impl ChainObject for TransactionRecord {
    const TYPE_NAME: &'static str = "transaction_record";
    const INDEX_COUNT: usize = 2;

    fn index_keys(&self, id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default().bytes(&self.trx_id.0).finish(),
            KeyWriter::default().u32(self.expiration).u64(id).finish(),
        ]
    }
}

/// TaPoS ring entry; the instance id is `block_num % BLOCK_SUMMARY_SLOTS`,
/// overwritten cyclically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub block_id: BlockId,
}

impl ChainObject for BlockSummary {
    const TYPE_NAME: &'static str = "block_summary";
}
