// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{Share, Timestamp, COIN_PRECISION, FULL_PERCENT, ONE_PERCENT};
use serde::{Deserialize, Serialize};

/// Committee-governed global parameters. Every field can be changed by an
/// approved committee proposal; defaults mirror the genesis configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParameters {
    /// Seconds per block slot.
    pub block_interval: u8,
    pub maximum_block_size: u32,
    pub maximum_transaction_size: u32,
    /// Longest acceptable distance between now and a transaction expiration.
    pub maximum_time_until_expiration: u32,

    /// Witness slots drawn straight from the vote ranking.
    pub by_vote_top_witness_count: u16,
    /// Witness slots drawn from the remaining voted witnesses.
    pub by_vote_rest_witness_count: u16,
    /// Witness slots drawn from the pledge pool.
    pub by_pledge_witness_count: u16,

    pub min_witness_pledge: Share,
    pub min_committee_member_pledge: Share,
    pub min_platform_pledge: Share,
    pub witness_pledge_release_delay: u32,
    pub committee_member_pledge_release_delay: u32,
    pub platform_pledge_release_delay: u32,
    /// Blocks a witness may stay silent before its signing key is cleared.
    pub max_witness_inactive_blocks: u32,
    /// Window of the rolling `average_pledge` update.
    pub witness_avg_pledge_update_interval: u32,

    pub by_vote_top_witness_pay_per_block: Share,
    pub by_vote_rest_witness_pay_per_block: Share,

    pub committee_size: u16,
    pub committee_update_interval: u32,
    pub budget_adjust_interval: u32,
    /// Annual budget as a ratio of the reserved (unissued) core supply.
    pub budget_adjust_target: u32,

    pub min_governance_voting_balance: Share,
    pub max_governance_voting_proxy_level: u8,
    pub governance_voting_expiration_blocks: u32,
    pub governance_votes_update_interval: u32,
    pub max_witnesses_voted_per_account: u16,
    pub max_committee_members_voted_per_account: u16,
    pub max_platforms_voted_per_account: u16,

    /// Coin-seconds accumulation window, in seconds.
    pub csaf_accumulate_window: u64,
    /// Coin-seconds needed per unit of collected CSAF.
    pub csaf_rate: u64,
    /// Longest CSAF lease duration, in seconds.
    pub max_csaf_lease_duration: u32,

    pub content_award: ContentAwardParameters,
}

impl Default for ChainParameters {
    fn default() -> Self {
        ChainParameters {
            block_interval: 3,
            maximum_block_size: 2_000_000,
            maximum_transaction_size: 200_000,
            maximum_time_until_expiration: 86_400,

            by_vote_top_witness_count: 11,
            by_vote_rest_witness_count: 5,
            by_pledge_witness_count: 5,

            min_witness_pledge: 10_000 * COIN_PRECISION,
            min_committee_member_pledge: 1_000 * COIN_PRECISION,
            min_platform_pledge: 10_000 * COIN_PRECISION,
            witness_pledge_release_delay: 28_800,
            committee_member_pledge_release_delay: 28_800,
            platform_pledge_release_delay: 28_800,
            max_witness_inactive_blocks: 28_800,
            witness_avg_pledge_update_interval: 1_200,

            by_vote_top_witness_pay_per_block: 150 * COIN_PRECISION / 100,
            by_vote_rest_witness_pay_per_block: 75 * COIN_PRECISION / 100,

            committee_size: 5,
            committee_update_interval: 28_800 * 30,
            budget_adjust_interval: 28_800,
            budget_adjust_target: 5 * ONE_PERCENT,

            min_governance_voting_balance: 10 * COIN_PRECISION,
            max_governance_voting_proxy_level: 4,
            governance_voting_expiration_blocks: 2_880_000,
            governance_votes_update_interval: 1_200,
            max_witnesses_voted_per_account: 30,
            max_committee_members_voted_per_account: 5,
            max_platforms_voted_per_account: 10,

            csaf_accumulate_window: 86_400 * 7,
            csaf_rate: 86_400 * 10,
            max_csaf_lease_duration: 86_400 * 30,

            content_award: ContentAwardParameters::default(),
        }
    }
}

/// Parameters of the content-economy award engine. Grouped separately because
/// committee proposals may replace the whole group atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAwardParameters {
    /// Seconds between post/scorer award settlements; 0 disables the engine.
    pub content_award_interval: u32,
    /// Seconds between platform-voted award settlements; 0 disables them.
    pub platform_award_interval: u32,
    /// Largest CSAF a single score may carry.
    pub max_csaf_per_approval: Share,
    /// Seconds before a score expires out of the store.
    pub approval_expiration: u32,
    /// Posts below this CSAF total earn nothing in a period.
    pub min_effective_csaf: Share,
    /// Annual size of the post/scorer pool.
    pub total_content_award_amount: Share,
    /// Annual size of the per-platform content pool.
    pub total_platform_content_award_amount: Share,
    /// Annual size of the platform-voted pool.
    pub total_platform_voted_award_amount: Share,
    pub platform_award_min_votes: u64,
    /// How many top-voted platforms share the voted pool.
    pub platform_award_requested_rank: u16,
    /// Portion of the voted pool split equally; the rest goes by votes.
    pub platform_award_basic_rate: u32,
    /// Scales score values into approval amounts.
    pub casf_modulus: u32,
    /// Floor weight of the piecewise-linear scorer curve.
    pub approval_casf_min_weight: u32,
    /// First turn point of the scorer curve, as a ratio of total CSAF.
    pub approval_casf_first_rate: u32,
    /// Second turn point of the scorer curve.
    pub approval_casf_second_rate: u32,
    /// Receiptor discount applied when a post's net approval is negative.
    pub receiptor_award_modulus: u32,
    /// Extra scaling of disapprovers' shares on negative posts.
    pub disapprove_award_modulus: u32,
    /// Seconds after creation during which a post can still enter a period.
    pub post_award_expiration: u32,
}

impl Default for ContentAwardParameters {
    fn default() -> Self {
        ContentAwardParameters {
            content_award_interval: 86_400 * 7,
            platform_award_interval: 86_400 * 7,
            max_csaf_per_approval: 1_000 * COIN_PRECISION,
            approval_expiration: 86_400 * 30,
            min_effective_csaf: 10 * COIN_PRECISION,
            total_content_award_amount: 0,
            total_platform_content_award_amount: 0,
            total_platform_voted_award_amount: 0,
            platform_award_min_votes: 1,
            platform_award_requested_rank: 100,
            platform_award_basic_rate: 20 * ONE_PERCENT,
            casf_modulus: 120 * ONE_PERCENT,
            approval_casf_min_weight: 5 * ONE_PERCENT,
            approval_casf_first_rate: 50 * ONE_PERCENT,
            approval_casf_second_rate: 80 * ONE_PERCENT,
            receiptor_award_modulus: 75 * ONE_PERCENT,
            disapprove_award_modulus: 50 * ONE_PERCENT,
            post_award_expiration: 86_400 * 30,
        }
    }
}

impl ContentAwardParameters {
    /// Both pools disabled means the engine is off.
    pub fn content_awards_enabled(&self) -> bool {
        (self.total_content_award_amount > 0 || self.total_platform_content_award_amount > 0)
            && self.content_award_interval > 0
    }

    pub fn platform_voted_awards_enabled(&self) -> bool {
        self.total_platform_voted_award_amount > 0 && self.platform_award_interval > 0
    }
}

impl ChainParameters {
    /// Blocks produced per year at the configured interval.
    pub fn blocks_per_year(&self) -> u32 {
        86_400 * 365 / self.block_interval as u32
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.block_interval == 0 {
            return Err("block interval must be positive".into());
        }
        if self.maximum_time_until_expiration <= self.block_interval as u32 {
            return Err("transaction expiration window must exceed a block interval".into());
        }
        if self.by_vote_top_witness_count == 0 {
            return Err("need at least one by-vote-top witness slot".into());
        }
        let ca = &self.content_award;
        for ratio in [
            ca.platform_award_basic_rate,
            ca.approval_casf_min_weight,
            ca.approval_casf_first_rate,
            ca.approval_casf_second_rate,
            ca.receiptor_award_modulus,
            ca.disapprove_award_modulus,
            self.budget_adjust_target,
        ] {
            if ratio > FULL_PERCENT {
                return Err("ratio parameter above 100%".into());
            }
        }
        if ca.approval_casf_first_rate > ca.approval_casf_second_rate {
            return Err("scorer curve turn points out of order".into());
        }
        Ok(())
    }

    /// The wall-clock timestamp of the slot `slots` after `genesis_time`.
    pub fn slot_time(&self, genesis_time: Timestamp, slots: u64) -> Timestamp {
        genesis_time + (slots as u32) * self.block_interval as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        ChainParameters::default().validate().unwrap();
    }

    #[test]
    fn default_award_engine_is_disabled() {
        let p = ChainParameters::default();
        assert!(!p.content_award.content_awards_enabled());
        assert!(!p.content_award.platform_voted_awards_enabled());
    }

    #[test]
    fn parameters_round_trip_as_json() {
        let p = ChainParameters::default();
        let s = serde_json::to_string(&p).unwrap();
        let back: ChainParameters = serde_json::from_str(&s).unwrap();
        assert_eq!(p, back);
    }
}
