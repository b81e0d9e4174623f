// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Voter lifecycle and vote propagation. A voter's effective votes catch up
//! to its raw votes on scheduled blocks; deltas flow either to directly
//! voted targets or up the proxy chain, one level vector entry per hop.

use crate::errors::EvalError;
use crate::objects::*;
use crate::pledges::rolling_average;
use crate::Database;
use agora_db::KeyWriter;
use agora_types::{AccountUid, BlockNum, PROXY_TO_SELF_UID};
use log::info;

impl Database {
    /// A voter is usable while valid and not past the governance expiry.
    pub(crate) fn check_voter_valid(&self, voter: &Voter) -> bool {
        let expire = self.params().governance_voting_expiration_blocks;
        voter.is_valid
            && voter.effective_last_vote_block + expire > self.head_block_num()
    }

    /// Record a fresh vote at `head`: the voter's own slot updates and the
    /// news travels up the proxy chain, one level per hop.
    pub(crate) fn touch_vote_chain(&mut self, voter_id: u64) -> Result<(), EvalError> {
        let head = self.head_block_num();
        let max_level = self.params().max_governance_voting_proxy_level as usize;
        let mut next = {
            let voter = self.store.get::<Voter>(voter_id)?;
            (voter.proxy_uid, voter.proxy_sequence)
        };
        self.store.modify(voter_id, |v: &mut Voter| {
            v.proxy_last_vote_block[0] = head;
            v.update_effective_last_vote_block();
        })?;
        let mut level = 1usize;
        while next.0 != PROXY_TO_SELF_UID && level <= max_level {
            let Some((proxy_id, proxy)) = self.find_voter(next.0, next.1) else { break };
            let following = (proxy.proxy_uid, proxy.proxy_sequence);
            self.store.modify(proxy_id, |v: &mut Voter| {
                if level < v.proxy_last_vote_block.len() {
                    v.proxy_last_vote_block[level] = head;
                }
                v.update_effective_last_vote_block();
            })?;
            next = following;
            level += 1;
        }
        Ok(())
    }

    /// Adjust the totals of every target the voter votes for directly.
    pub(crate) fn adjust_direct_vote_targets(
        &mut self,
        voter_uid: AccountUid,
        voter_sequence: u32,
        delta: i64,
    ) -> Result<(), EvalError> {
        if delta == 0 {
            return Ok(());
        }
        let prefix = KeyWriter::default().u64(voter_uid).u32(voter_sequence).finish();

        let witness_edges = self.tables().witness_votes.ids_with_prefix(vote_idx::BY_VOTER, &prefix);
        for edge_id in witness_edges {
            let edge = self.store.get::<WitnessVote>(edge_id)?.0;
            if let Some(id) = self.find_witness_id(edge.target_uid, edge.target_sequence) {
                self.adjust_witness_votes(id, delta)?;
            }
        }
        let committee_edges =
            self.tables().committee_member_votes.ids_with_prefix(vote_idx::BY_VOTER, &prefix);
        for edge_id in committee_edges {
            let edge = self.store.get::<CommitteeMemberVote>(edge_id)?.0;
            if let Some(id) = self.find_committee_member_id(edge.target_uid, edge.target_sequence) {
                self.store.modify(id, |m: &mut CommitteeMember| {
                    m.total_votes = m.total_votes.saturating_add_signed(delta);
                })?;
            }
        }
        let platform_edges =
            self.tables().platform_votes.ids_with_prefix(vote_idx::BY_VOTER, &prefix);
        for edge_id in platform_edges {
            let edge = self.store.get::<PlatformVote>(edge_id)?.0;
            if let Some(id) = self.find_platform_id(edge.target_uid, edge.target_sequence) {
                self.store.modify(id, |p: &mut Platform| {
                    p.total_votes = p.total_votes.saturating_add_signed(delta);
                })?;
            }
        }
        Ok(())
    }

    pub(crate) fn adjust_witness_votes(&mut self, witness_id: u64, delta: i64) -> Result<(), EvalError> {
        self.store.modify(witness_id, |w: &mut Witness| {
            w.total_votes = w.total_votes.saturating_add_signed(delta);
        })?;
        Ok(())
    }

    /// Propagate a level vector of vote deltas up the proxy chain starting
    /// at `proxy`. Entry `i` of `delta` lands at chain level `hop + i`. The
    /// chain ends at a self-voting proxy, whose direct targets absorb the
    /// change in its total.
    pub(crate) fn adjust_voter_proxy_votes(
        &mut self,
        mut proxy: (AccountUid, u32),
        delta: Vec<i64>,
    ) -> Result<(), EvalError> {
        let max_level = self.params().max_governance_voting_proxy_level as usize;
        let mut hop = 0usize;
        while proxy.0 != PROXY_TO_SELF_UID && hop < max_level {
            let Some((proxy_id, proxy_voter)) = self.find_voter(proxy.0, proxy.1) else {
                return Ok(());
            };
            let is_terminal = proxy_voter.proxy_uid == PROXY_TO_SELF_UID;
            let following = (proxy_voter.proxy_uid, proxy_voter.proxy_sequence);
            let (target_uid, target_seq) = (proxy_voter.uid, proxy_voter.sequence);
            let mut landed: i64 = 0;
            self.store.modify(proxy_id, |v: &mut Voter| {
                for (i, d) in delta.iter().enumerate() {
                    let level = hop + i;
                    if level < v.proxied_votes.len() {
                        v.proxied_votes[level] += d;
                        landed += d;
                    }
                }
            })?;
            if is_terminal {
                self.adjust_direct_vote_targets(target_uid, target_seq, landed)?;
                return Ok(());
            }
            proxy = following;
            hop += 1;
        }
        Ok(())
    }

    /// The level vector a voter contributes to its proxy: its own effective
    /// votes at level 0, shifted proxied levels above.
    pub(crate) fn proxy_contribution(&self, voter: &Voter) -> Vec<i64> {
        let max_level = self.params().max_governance_voting_proxy_level as usize;
        let mut delta = vec![0i64; max_level];
        if !delta.is_empty() {
            delta[0] = voter.effective_votes as i64;
            for i in 1..max_level {
                delta[i] = voter.proxied_votes.get(i - 1).copied().unwrap_or(0);
            }
        }
        delta
    }

    /// Scheduled catch-up of one voter's effective votes toward its raw
    /// votes, pushing the delta to targets or up the proxy chain.
    pub(crate) fn update_voter_effective_votes(&mut self, voter_id: u64) -> Result<(), EvalError> {
        let interval = self.params().governance_votes_update_interval;
        let window = interval as u64 * self.params().block_interval as u64;
        let now = self.head_block_time();
        let voter = self.store.get::<Voter>(voter_id)?.clone();
        let new_effective = rolling_average(
            voter.effective_votes as i128,
            voter.votes as i128,
            (now.saturating_sub(voter.effective_votes_last_update)) as u64,
            window,
        ) as u64;
        let delta = new_effective as i64 - voter.effective_votes as i64;
        self.store.modify(voter_id, |v: &mut Voter| {
            v.effective_votes = new_effective;
            v.effective_votes_last_update = now;
            v.effective_votes_next_update_block += interval;
        })?;
        if delta != 0 {
            if voter.proxy_uid == PROXY_TO_SELF_UID {
                self.adjust_direct_vote_targets(voter.uid, voter.sequence, delta)?;
            } else {
                let max_level = self.params().max_governance_voting_proxy_level as usize;
                let mut level_delta = vec![0i64; max_level];
                if !level_delta.is_empty() {
                    level_delta[0] = delta;
                }
                self.adjust_voter_proxy_votes(
                    (voter.proxy_uid, voter.proxy_sequence),
                    level_delta,
                )?;
            }
        }
        Ok(())
    }

    /// Remove every direct vote edge of a voter, rolling the totals back.
    pub(crate) fn clear_voter_votes(&mut self, voter_id: u64) -> Result<(), EvalError> {
        let voter = self.store.get::<Voter>(voter_id)?.clone();
        let total = voter.total_votes();
        self.adjust_direct_vote_targets(voter.uid, voter.sequence, -total)?;
        let prefix = KeyWriter::default().u64(voter.uid).u32(voter.sequence).finish();
        for edge_id in self.tables().witness_votes.ids_with_prefix(vote_idx::BY_VOTER, &prefix) {
            self.store.remove::<WitnessVote>(edge_id)?;
        }
        for edge_id in
            self.tables().committee_member_votes.ids_with_prefix(vote_idx::BY_VOTER, &prefix)
        {
            self.store.remove::<CommitteeMemberVote>(edge_id)?;
        }
        for edge_id in self.tables().platform_votes.ids_with_prefix(vote_idx::BY_VOTER, &prefix) {
            self.store.remove::<PlatformVote>(edge_id)?;
        }
        self.store.modify(voter_id, |v: &mut Voter| {
            v.number_of_witnesses_voted = 0;
            v.number_of_committee_members_voted = 0;
            v.number_of_platforms_voted = 0;
        })?;
        Ok(())
    }

    /// Withdraw the voter's contribution from its proxy chain.
    pub(crate) fn clear_voter_proxy_votes(&mut self, voter_id: u64) -> Result<(), EvalError> {
        let voter = self.store.get::<Voter>(voter_id)?.clone();
        if voter.proxy_uid == PROXY_TO_SELF_UID {
            return Ok(());
        }
        let delta: Vec<i64> = self.proxy_contribution(&voter).iter().map(|d| -d).collect();
        self.adjust_voter_proxy_votes((voter.proxy_uid, voter.proxy_sequence), delta)
    }

    /// Mark a voter invalid: withdraw its influence now, leave the object
    /// for the maintenance pass to erase once dependents are gone.
    pub(crate) fn invalidate_voter(&mut self, voter_id: u64) -> Result<(), EvalError> {
        let voter = self.store.get::<Voter>(voter_id)?.clone();
        if !voter.is_valid {
            return Ok(());
        }
        if voter.proxy_uid == PROXY_TO_SELF_UID {
            self.clear_voter_votes(voter_id)?;
        } else {
            self.clear_voter_proxy_votes(voter_id)?;
            if let Some((proxy_id, _)) = self.find_voter(voter.proxy_uid, voter.proxy_sequence) {
                self.store.modify(proxy_id, |v: &mut Voter| {
                    v.proxied_voters = v.proxied_voters.saturating_sub(1);
                })?;
            }
        }
        self.store.modify(voter_id, |v: &mut Voter| v.is_valid = false)?;
        self.modify_account_statistics(voter.uid, |s| s.is_voter = false)?;
        Ok(())
    }

    /// Detach voters proxying to an invalid voter, then erase it once no
    /// dependents remain. Returns the number of voters processed, bounded
    /// by `budget`.
    pub(crate) fn process_invalid_proxied_voters(
        &mut self,
        invalid_voter_id: u64,
        budget: u32,
    ) -> Result<u32, EvalError> {
        let invalid = self.store.get::<Voter>(invalid_voter_id)?.clone();
        let prefix = KeyWriter::default().u64(invalid.uid).u32(invalid.sequence).finish();
        let dependents = self.tables().voters.ids_with_prefix(voter_idx::BY_PROXY, &prefix);
        let mut processed = 0u32;
        for dependent_id in dependents {
            if processed >= budget {
                return Ok(processed);
            }
            // the dependent's contribution died with the proxy; it votes
            // again by re-proxying or voting directly
            self.store.modify(dependent_id, |v: &mut Voter| {
                v.proxy_uid = PROXY_TO_SELF_UID;
                v.proxy_sequence = 0;
            })?;
            self.store.modify(invalid_voter_id, |v: &mut Voter| {
                v.proxied_voters = v.proxied_voters.saturating_sub(1);
            })?;
            processed += 1;
        }
        let remaining = self.store.get::<Voter>(invalid_voter_id)?.proxied_voters;
        if remaining == 0 {
            info!(
                "erasing invalid voter {} (sequence {})",
                invalid.uid, invalid.sequence
            );
            self.store.remove::<Voter>(invalid_voter_id)?;
        }
        Ok(processed.max(1))
    }

    /// Create a fresh voter object for an account casting its first vote
    /// (or voting again after invalidation).
    pub(crate) fn create_voter(
        &mut self,
        uid: AccountUid,
        proxy: Option<(AccountUid, u32)>,
    ) -> Result<u64, EvalError> {
        let head_num = self.head_block_num();
        let head_time = self.head_block_time();
        let interval = self.params().governance_votes_update_interval;
        let max_level = self.params().max_governance_voting_proxy_level as usize;
        let stats = self.get_account_statistics_by_uid(uid)?.clone();
        let sequence = stats.last_voter_sequence + 1;
        self.modify_account_statistics(uid, |s| {
            s.is_voter = true;
            s.last_voter_sequence = sequence;
        })?;
        let (proxy_uid, proxy_sequence) = proxy.unwrap_or((PROXY_TO_SELF_UID, 0));
        let voter = Voter {
            uid,
            sequence,
            is_valid: true,
            votes: stats.core_balance.max(0) as u64,
            votes_last_update: head_time,
            effective_votes: 0,
            effective_votes_last_update: head_time,
            effective_votes_next_update_block: next_update_block(head_num, interval),
            proxy_uid,
            proxy_sequence,
            proxied_voters: 0,
            proxied_votes: vec![0; max_level],
            proxy_last_vote_block: {
                let mut blocks = vec![0; max_level + 1];
                blocks[0] = head_num;
                blocks
            },
            effective_last_vote_block: head_num,
            number_of_witnesses_voted: 0,
            number_of_committee_members_voted: 0,
            number_of_platforms_voted: 0,
        };
        Ok(self.store.create(voter))
    }
}

fn next_update_block(head: BlockNum, interval: u32) -> BlockNum {
    head + interval
}
