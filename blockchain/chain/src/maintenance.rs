// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The per-block maintenance pass: expiry sweeps, pledge releases, rolling
//! averages, voter upkeep, bounded garbage collection of resigned-role
//! votes, budget and committee epochs, the award engines and the schedule
//! cursor — in a fixed order, at the end of every block.

use crate::errors::Error;
use crate::evaluators::{execute_committee_proposal, execute_proposal};
use crate::objects::*;
use crate::pledges::rolling_average;
use crate::Database;
use agora_db::KeyWriter;
use agora_types::{
    Share, FULL_PERCENT, MAX_EXPIRED_VOTERS_TO_PROCESS_PER_BLOCK,
    MAX_RESIGNED_COMMITTEE_VOTES_PER_BLOCK, MAX_RESIGNED_PLATFORM_VOTES_PER_BLOCK,
    MAX_RESIGNED_WITNESS_VOTES_PER_BLOCK, NO_RELEASE_BLOCK, PROXY_TO_SELF_UID,
};
use log::info;

/// Blocks between full invariant checks in debug builds.
const INVARIANT_CHECK_INTERVAL: u32 = 128;

impl Database {
    pub(crate) fn perform_block_maintenance(&mut self) -> Result<(), Error> {
        self.clear_expired_transactions()?;
        self.clear_expired_proposals()?;
        self.clear_expired_scores()?;
        self.release_witness_pledges()?;
        self.release_committee_member_pledges()?;
        self.release_platform_pledges()?;
        self.clear_expired_csaf_leases()?;
        self.update_average_witness_pledges()?;
        self.update_average_platform_pledges()?;
        self.update_voter_effective_votes_scheduled()?;
        self.invalidate_expired_governance_voters()?;
        self.process_invalid_governance_voters()?;
        self.clear_resigned_witness_votes()?;
        self.clear_resigned_committee_member_votes()?;
        self.clear_resigned_platform_votes()?;
        self.adjust_budgets()?;
        self.update_committee()?;
        self.clear_unapproved_committee_proposals()?;
        self.execute_due_committee_proposals()?;
        self.process_content_awards()?;
        self.process_platform_voted_awards()?;
        self.update_witness_schedule()?;
        if cfg!(debug_assertions) && self.head_block_num() % INVARIANT_CHECK_INTERVAL == 0 {
            self.check_invariants()?;
        }
        Ok(())
    }

    fn clear_expired_transactions(&mut self) -> Result<(), Error> {
        let now = self.head_block_time();
        loop {
            let first = self
                .tables()
                .transaction_records
                .index(tx_record_idx::BY_EXPIRATION)
                .iter()
                .next()
                .map(|(_, id)| *id);
            let Some(id) = first else { break };
            let record = self.store.get::<TransactionRecord>(id)?;
            if record.expiration > now {
                break;
            }
            self.store.remove::<TransactionRecord>(id)?;
        }
        Ok(())
    }

    /// Expired proposals that became authorized at the last moment are
    /// applied before removal.
    fn clear_expired_proposals(&mut self) -> Result<(), Error> {
        let now = self.head_block_time();
        loop {
            let first = self
                .tables()
                .proposals
                .index(proposal_idx::BY_EXPIRATION)
                .iter()
                .next()
                .map(|(_, id)| *id);
            let Some(id) = first else { break };
            let satisfied = {
                let proposal = self.store.get::<Proposal>(id)?;
                if proposal.expiration_time > now {
                    break;
                }
                crate::evaluators::proposal_satisfied(proposal)
            };
            if satisfied {
                if let Err(e) = execute_proposal(self, id, true) {
                    log::error!("failed to apply proposal at expiration: {e}");
                }
            } else {
                self.store.remove::<Proposal>(id)?;
            }
        }
        Ok(())
    }

    fn clear_expired_scores(&mut self) -> Result<(), Error> {
        let expiration = self.params().content_award.approval_expiration;
        let now = self.head_block_time();
        if now < expiration {
            return Ok(());
        }
        let cutoff = now - expiration;
        loop {
            let first = self
                .tables()
                .scores
                .index(score_idx::BY_CREATE_TIME)
                .iter()
                .next()
                .map(|(_, id)| *id);
            let Some(id) = first else { break };
            let score = self.store.get::<Score>(id)?;
            if score.create_time > cutoff {
                break;
            }
            self.store.remove::<Score>(id)?;
        }
        Ok(())
    }

    fn release_witness_pledges(&mut self) -> Result<(), Error> {
        let head_num = self.head_block_num();
        loop {
            let first = self
                .tables()
                .account_statistics
                .index(account_stats_idx::BY_WITNESS_RELEASE)
                .iter()
                .next()
                .map(|(_, id)| *id);
            let Some(id) = first else { break };
            let stats = self.store.get::<AccountStatistics>(id)?;
            if stats.witness_pledge_release_block > head_num {
                break;
            }
            self.store.modify(id, |s: &mut AccountStatistics| {
                s.total_witness_pledge -= s.releasing_witness_pledge;
                s.releasing_witness_pledge = 0;
                s.witness_pledge_release_block = NO_RELEASE_BLOCK;
            })?;
        }
        Ok(())
    }

    fn release_committee_member_pledges(&mut self) -> Result<(), Error> {
        let head_num = self.head_block_num();
        loop {
            let first = self
                .tables()
                .account_statistics
                .index(account_stats_idx::BY_COMMITTEE_RELEASE)
                .iter()
                .next()
                .map(|(_, id)| *id);
            let Some(id) = first else { break };
            let stats = self.store.get::<AccountStatistics>(id)?;
            if stats.committee_member_pledge_release_block > head_num {
                break;
            }
            self.store.modify(id, |s: &mut AccountStatistics| {
                s.total_committee_member_pledge -= s.releasing_committee_member_pledge;
                s.releasing_committee_member_pledge = 0;
                s.committee_member_pledge_release_block = NO_RELEASE_BLOCK;
            })?;
        }
        Ok(())
    }

    fn release_platform_pledges(&mut self) -> Result<(), Error> {
        let head_num = self.head_block_num();
        loop {
            let first = self
                .tables()
                .account_statistics
                .index(account_stats_idx::BY_PLATFORM_RELEASE)
                .iter()
                .next()
                .map(|(_, id)| *id);
            let Some(id) = first else { break };
            let stats = self.store.get::<AccountStatistics>(id)?;
            if stats.platform_pledge_release_block > head_num {
                break;
            }
            self.store.modify(id, |s: &mut AccountStatistics| {
                s.total_platform_pledge -= s.releasing_platform_pledge;
                s.releasing_platform_pledge = 0;
                s.platform_pledge_release_block = NO_RELEASE_BLOCK;
            })?;
        }
        Ok(())
    }

    fn clear_expired_csaf_leases(&mut self) -> Result<(), Error> {
        let now = self.head_block_time();
        let hardfork = self.dpo().enabled_hardfork_version;
        loop {
            let first = self
                .tables()
                .csaf_leases
                .index(lease_idx::BY_EXPIRATION)
                .iter()
                .next()
                .map(|(_, id)| *id);
            let Some(id) = first else { break };
            let lease = *self.store.get::<CsafLease>(id)?;
            if lease.expiration > now {
                break;
            }
            // pre-Fork05 settles accrual inline; Fork05 relies on the next
            // touch of each account
            if hardfork < agora_types::HardforkVersion::Fork05 {
                self.update_coin_seconds_earned(lease.from)
                    .map_err(|e| Error::InternalInvariant(e.to_string()))?;
                self.update_coin_seconds_earned(lease.to)
                    .map_err(|e| Error::InternalInvariant(e.to_string()))?;
            }
            self.modify_account_statistics(lease.from, |s| s.core_leased_out -= lease.amount)
                .map_err(|e| Error::InternalInvariant(e.to_string()))?;
            self.modify_account_statistics(lease.to, |s| s.core_leased_in -= lease.amount)
                .map_err(|e| Error::InternalInvariant(e.to_string()))?;
            self.store.remove::<CsafLease>(id)?;
        }
        Ok(())
    }

    fn update_average_witness_pledges(&mut self) -> Result<(), Error> {
        let head_num = self.head_block_num();
        let interval = self.params().witness_avg_pledge_update_interval;
        loop {
            let first = self
                .tables()
                .witnesses
                .index(witness_idx::BY_PLEDGE_NEXT_UPDATE)
                .iter()
                .next()
                .map(|(_, id)| *id);
            let Some(id) = first else { break };
            let witness = self.store.get::<Witness>(id)?;
            if witness.average_pledge_next_update_block > head_num {
                break;
            }
            let (pledge, old_avg) = (witness.pledge, witness.average_pledge);
            let new_avg =
                rolling_average(old_avg as i128, pledge as i128, interval as u64, interval as u64 * 2)
                    as Share;
            self.store.modify(id, |w: &mut Witness| {
                w.average_pledge = new_avg;
                w.average_pledge_next_update_block += interval;
            })?;
        }
        Ok(())
    }

    fn update_average_platform_pledges(&mut self) -> Result<(), Error> {
        let head_num = self.head_block_num();
        let interval = self.params().witness_avg_pledge_update_interval;
        loop {
            let first = self
                .tables()
                .platforms
                .index(platform_idx::BY_PLEDGE_NEXT_UPDATE)
                .iter()
                .next()
                .map(|(_, id)| *id);
            let Some(id) = first else { break };
            let platform = self.store.get::<Platform>(id)?;
            if platform.average_pledge_next_update_block > head_num {
                break;
            }
            let (pledge, old_avg) = (platform.pledge, platform.average_pledge);
            let new_avg =
                rolling_average(old_avg as i128, pledge as i128, interval as u64, interval as u64 * 2)
                    as Share;
            self.store.modify(id, |p: &mut Platform| {
                p.average_pledge = new_avg;
                p.average_pledge_next_update_block += interval;
            })?;
        }
        Ok(())
    }

    fn update_voter_effective_votes_scheduled(&mut self) -> Result<(), Error> {
        let head_num = self.head_block_num();
        loop {
            let first = self
                .tables()
                .voters
                .index(voter_idx::BY_NEXT_UPDATE)
                .iter()
                .next()
                .map(|(_, id)| *id);
            let Some(id) = first else { break };
            let voter = self.store.get::<Voter>(id)?;
            if voter.effective_votes_next_update_block > head_num {
                break;
            }
            self.update_voter_effective_votes(id)
                .map_err(|e| Error::InternalInvariant(e.to_string()))?;
        }
        Ok(())
    }

    fn invalidate_expired_governance_voters(&mut self) -> Result<(), Error> {
        let expire_blocks = self.params().governance_voting_expiration_blocks;
        let head_num = self.head_block_num();
        if head_num < expire_blocks {
            return Ok(());
        }
        let max_last_vote_block = head_num - expire_blocks;

        // valid, self-voting, oldest last-vote first
        let prefix = KeyWriter::default().bool(true).u64(PROXY_TO_SELF_UID).finish();
        let candidates = self.tables().voters.ids_with_prefix(voter_idx::BY_VALID, &prefix);
        let mut invalidated = 0u32;
        for id in candidates {
            let voter = self.store.get::<Voter>(id)?;
            if voter.effective_last_vote_block > max_last_vote_block {
                break;
            }
            self.invalidate_voter(id).map_err(|e| Error::InternalInvariant(e.to_string()))?;
            invalidated += 1;
        }
        if invalidated > 0 {
            info!("invalidated {invalidated} expired voters");
        }
        Ok(())
    }

    fn process_invalid_governance_voters(&mut self) -> Result<(), Error> {
        let mut budget = MAX_EXPIRED_VOTERS_TO_PROCESS_PER_BLOCK;
        loop {
            if budget == 0 {
                info!(
                    "on block {}, reached threshold while processing invalid voters",
                    self.head_block_num()
                );
                break;
            }
            let invalid_prefix = KeyWriter::default().bool(false).finish();
            let first = self
                .tables()
                .voters
                .ids_with_prefix(voter_idx::BY_VALID, &invalid_prefix)
                .into_iter()
                .next();
            let Some(id) = first else { break };
            let processed = self
                .process_invalid_proxied_voters(id, budget)
                .map_err(|e| Error::InternalInvariant(e.to_string()))?;
            budget = budget.saturating_sub(processed);
        }
        Ok(())
    }

    fn clear_resigned_witness_votes(&mut self) -> Result<(), Error> {
        let mut budget = MAX_RESIGNED_WITNESS_VOTES_PER_BLOCK;
        let invalid_prefix = KeyWriter::default().bool(false).finish();
        loop {
            let first = self
                .tables()
                .witnesses
                .ids_with_prefix(witness_idx::BY_VALID, &invalid_prefix)
                .into_iter()
                .next();
            let Some(witness_id) = first else { break };
            let witness = self.store.get::<Witness>(witness_id)?.clone();
            let target_prefix =
                KeyWriter::default().u64(witness.account).u32(witness.sequence).finish();
            let edges = self
                .tables()
                .witness_votes
                .ids_with_prefix(vote_idx::BY_TARGET, &target_prefix);
            for edge_id in edges {
                if budget == 0 {
                    info!(
                        "on block {}, reached threshold while removing votes for resigned witnesses",
                        self.head_block_num()
                    );
                    return Ok(());
                }
                let edge = self.store.get::<WitnessVote>(edge_id)?.0;
                if let Some((voter_id, _)) = self.find_voter(edge.voter_uid, edge.voter_sequence) {
                    self.store.modify(voter_id, |v: &mut Voter| {
                        v.number_of_witnesses_voted = v.number_of_witnesses_voted.saturating_sub(1);
                    })?;
                }
                self.store.remove::<WitnessVote>(edge_id)?;
                budget -= 1;
            }
            self.store.remove::<Witness>(witness_id)?;
        }
        Ok(())
    }

    fn clear_resigned_committee_member_votes(&mut self) -> Result<(), Error> {
        let mut budget = MAX_RESIGNED_COMMITTEE_VOTES_PER_BLOCK;
        let invalid_prefix = KeyWriter::default().bool(false).finish();
        loop {
            let first = self
                .tables()
                .committee_members
                .ids_with_prefix(committee_idx::BY_VALID, &invalid_prefix)
                .into_iter()
                .next();
            let Some(member_id) = first else { break };
            let member = self.store.get::<CommitteeMember>(member_id)?.clone();
            let target_prefix =
                KeyWriter::default().u64(member.account).u32(member.sequence).finish();
            let edges = self
                .tables()
                .committee_member_votes
                .ids_with_prefix(vote_idx::BY_TARGET, &target_prefix);
            for edge_id in edges {
                if budget == 0 {
                    info!(
                        "on block {}, reached threshold while removing votes for resigned committee members",
                        self.head_block_num()
                    );
                    return Ok(());
                }
                let edge = self.store.get::<CommitteeMemberVote>(edge_id)?.0;
                if let Some((voter_id, _)) = self.find_voter(edge.voter_uid, edge.voter_sequence) {
                    self.store.modify(voter_id, |v: &mut Voter| {
                        v.number_of_committee_members_voted =
                            v.number_of_committee_members_voted.saturating_sub(1);
                    })?;
                }
                self.store.remove::<CommitteeMemberVote>(edge_id)?;
                budget -= 1;
            }
            self.store.remove::<CommitteeMember>(member_id)?;
        }
        Ok(())
    }

    fn clear_resigned_platform_votes(&mut self) -> Result<(), Error> {
        let mut budget = MAX_RESIGNED_PLATFORM_VOTES_PER_BLOCK;
        let invalid_prefix = KeyWriter::default().bool(false).finish();
        loop {
            let first = self
                .tables()
                .platforms
                .ids_with_prefix(platform_idx::BY_VALID, &invalid_prefix)
                .into_iter()
                .next();
            let Some(platform_id) = first else { break };
            let platform = self.store.get::<Platform>(platform_id)?.clone();
            let target_prefix =
                KeyWriter::default().u64(platform.owner).u32(platform.sequence).finish();
            let edges = self
                .tables()
                .platform_votes
                .ids_with_prefix(vote_idx::BY_TARGET, &target_prefix);
            for edge_id in edges {
                if budget == 0 {
                    info!(
                        "on block {}, reached threshold while removing votes for resigned platforms",
                        self.head_block_num()
                    );
                    return Ok(());
                }
                let edge = self.store.get::<PlatformVote>(edge_id)?.0;
                if let Some((voter_id, _)) = self.find_voter(edge.voter_uid, edge.voter_sequence) {
                    self.store.modify(voter_id, |v: &mut Voter| {
                        v.number_of_platforms_voted = v.number_of_platforms_voted.saturating_sub(1);
                    })?;
                }
                self.store.remove::<PlatformVote>(edge_id)?;
                budget -= 1;
            }
            self.store.remove::<Platform>(platform_id)?;
        }
        Ok(())
    }

    fn adjust_budgets(&mut self) -> Result<(), Error> {
        let head_num = self.head_block_num();
        if head_num < self.dpo().next_budget_adjust_block {
            return Ok(());
        }
        let params = self.params();
        let blocks_per_year = params.blocks_per_year();
        let target = params.budget_adjust_target;
        let interval = params.budget_adjust_interval;
        let core_reserved = self.core_reserved();
        let new_budget = ((core_reserved as u128) * target as u128
            / blocks_per_year as u128
            / FULL_PERCENT as u128) as Share;
        self.modify_dpo(|dpo| {
            dpo.total_budget_per_block = new_budget;
            dpo.next_budget_adjust_block += interval;
        });
        info!(
            "budgets adjusted on block {head_num}, next adjust block is {}",
            self.dpo().next_budget_adjust_block
        );
        Ok(())
    }

    /// Replace the active committee with the top-voted valid members once
    /// per committee term; every pending committee proposal dies with the
    /// old term.
    fn update_committee(&mut self) -> Result<(), Error> {
        let head_num = self.head_block_num();
        if head_num < self.dpo().next_committee_update_block {
            return Ok(());
        }
        let expired: Vec<u64> =
            self.tables().committee_proposals.iter().map(|(id, _)| id).collect();
        for id in expired {
            let number = self.store.get::<CommitteeProposal>(id)?.proposal_number;
            info!("expiring committee proposal #{number}");
            self.store.remove::<CommitteeProposal>(id)?;
        }

        let committee_size = self.params().committee_size as usize;
        let valid_prefix = KeyWriter::default().bool(true).finish();
        let ranked = self
            .tables()
            .committee_members
            .ids_with_prefix(committee_idx::BY_VOTES, &valid_prefix);
        let mut new_committee = Vec::with_capacity(committee_size);
        for id in ranked.into_iter().take(committee_size) {
            new_committee.push(self.store.get::<CommitteeMember>(id)?.account);
        }
        new_committee.sort_unstable();
        self.modify_gpo(|gpo| gpo.active_committee_members = new_committee);
        let interval = self.params().committee_update_interval;
        self.modify_dpo(|dpo| dpo.next_committee_update_block += interval);
        info!(
            "committee updated on block {head_num}, next update block is {}",
            self.dpo().next_committee_update_block
        );
        Ok(())
    }

    fn clear_unapproved_committee_proposals(&mut self) -> Result<(), Error> {
        let head_num = self.head_block_num();
        let unapproved_prefix = KeyWriter::default().bool(false).finish();
        loop {
            let first = self
                .tables()
                .committee_proposals
                .ids_with_prefix(committee_proposal_idx::BY_APPROVED_CLOSING, &unapproved_prefix)
                .into_iter()
                .next();
            let Some(id) = first else { break };
            let proposal = self.store.get::<CommitteeProposal>(id)?;
            if proposal.voting_closing_block_num > head_num {
                break;
            }
            info!(
                "removing voting-closed unapproved committee proposal #{}",
                proposal.proposal_number
            );
            self.store.remove::<CommitteeProposal>(id)?;
        }
        Ok(())
    }

    fn execute_due_committee_proposals(&mut self) -> Result<(), Error> {
        let head_num = self.head_block_num();
        let approved_prefix = KeyWriter::default().bool(true).finish();
        loop {
            let due = self
                .tables()
                .committee_proposals
                .ids_with_prefix(committee_proposal_idx::BY_APPROVED_EXECUTION, &approved_prefix)
                .into_iter()
                .find(|id| {
                    self.tables()
                        .committee_proposals
                        .get(*id)
                        .map(|p| p.execution_block_num <= head_num)
                        .unwrap_or(false)
                });
            let Some(id) = due else { break };
            execute_committee_proposal(self, id, true)
                .map_err(|e| Error::InternalInvariant(e.to_string()))?;
        }
        Ok(())
    }

    /// The accounting identities of the whole store. Any failure is fatal:
    /// continuing would diverge from the rest of the network.
    pub fn check_invariants(&self) -> Result<(), Error> {
        // core supply identity
        let mut core_balances: i128 = 0;
        for (_, balance) in self.tables().balances.iter() {
            if balance.asset_aid == agora_types::CORE_ASSET_AID {
                core_balances += balance.balance as i128;
            }
        }
        // the undistributed budget pool is supply that sits in no balance
        let mut prepaid_and_pay: i128 = self.dpo().budget_pool as i128;
        let mut leased_in: i128 = 0;
        let mut leased_out: i128 = 0;
        let mut stats_core_total: i128 = 0;
        for (_, stats) in self.tables().account_statistics.iter() {
            stats_core_total += stats.core_balance as i128;
            prepaid_and_pay += stats.prepaid as i128 + stats.uncollected_witness_pay as i128;
            leased_in += stats.core_leased_in as i128;
            leased_out += stats.core_leased_out as i128;
            if stats.core_balance
                < stats.core_leased_out
                    + stats.total_witness_pledge
                    + stats.total_committee_member_pledge
                    + stats.total_platform_pledge
            {
                return Err(Error::InternalInvariant(format!(
                    "account {} pledges exceed its balance",
                    stats.owner
                )));
            }
            if stats.total_witness_pledge < stats.releasing_witness_pledge
                || stats.total_committee_member_pledge < stats.releasing_committee_member_pledge
                || stats.total_platform_pledge < stats.releasing_platform_pledge
            {
                return Err(Error::InternalInvariant(format!(
                    "account {} releases more than it pledged",
                    stats.owner
                )));
            }
        }
        if stats_core_total != core_balances {
            return Err(Error::InternalInvariant(format!(
                "statistics mirror {stats_core_total} disagrees with balance rows {core_balances}"
            )));
        }
        let supply = self.core_current_supply() as i128;
        if core_balances + prepaid_and_pay != supply {
            return Err(Error::InternalInvariant(format!(
                "core supply identity broken: balances {core_balances} + credits {prepaid_and_pay} != supply {supply}"
            )));
        }

        // lease symmetry
        let lease_total: i128 =
            self.tables().csaf_leases.iter().map(|(_, l)| l.amount as i128).sum();
        if leased_in != lease_total || leased_out != lease_total {
            return Err(Error::InternalInvariant(format!(
                "lease symmetry broken: in {leased_in}, out {leased_out}, leases {lease_total}"
            )));
        }

        // every vote edge has live endpoints
        for (_, edge) in self.tables().witness_votes.iter() {
            let edge = edge.0;
            if self.find_voter(edge.voter_uid, edge.voter_sequence).is_none()
                || self.find_witness_id(edge.target_uid, edge.target_sequence).is_none()
            {
                return Err(Error::InternalInvariant(format!(
                    "dangling witness vote {} -> {}",
                    edge.voter_uid, edge.target_uid
                )));
            }
        }

        // proxied voter counts agree
        let mut proxied_counts: std::collections::BTreeMap<(u64, u32), u64> = Default::default();
        for (_, voter) in self.tables().voters.iter() {
            if voter.is_valid && voter.proxy_uid != PROXY_TO_SELF_UID {
                *proxied_counts.entry((voter.proxy_uid, voter.proxy_sequence)).or_insert(0) += 1;
            }
        }
        for ((proxy_uid, proxy_sequence), count) in proxied_counts {
            let actual = self
                .find_voter(proxy_uid, proxy_sequence)
                .map(|(_, v)| v.proxied_voters)
                .unwrap_or(0);
            if actual != count {
                return Err(Error::InternalInvariant(format!(
                    "voter {proxy_uid} has {actual} recorded proxiers, expected {count}"
                )));
            }
        }
        Ok(())
    }
}
