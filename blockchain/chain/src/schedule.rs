// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Witness scheduling: slot math, the three-pool selection (top-voted,
//! rest-voted lottery, by-pledge lottery), the deterministic shuffle seeded
//! from the previous block id, and the by-pledge pay curve.

use crate::errors::Error;
use crate::objects::{witness_idx, Witness};
use crate::Database;
use agora_db::KeyWriter;
use agora_types::{
    AccountUid, BlockNum, ScheduledWitnessKind, Share, Timestamp, COIN_PRECISION, FULL_PERCENT,
    ONE_PERCENT,
};
use log::info;
use std::collections::BTreeMap;

/// Virtual-time increment unit of the lottery pools: a witness with weight
/// `w` advances by `LAP / (w + 1)` per draw, so heavier witnesses are drawn
/// proportionally more often.
const VIRTUAL_LAP: u128 = 1 << 64;

impl Database {
    /// Wall-clock time of the slot `slot_num` past the head block. Slot 0
    /// is the head block itself.
    pub fn get_slot_time(&self, slot_num: u32) -> Timestamp {
        let interval = self.params().block_interval as u32;
        let dpo = self.dpo();
        if dpo.head_block_num == 0 {
            return dpo.genesis_time + slot_num * interval;
        }
        dpo.head_block_time + slot_num * interval
    }

    /// The slot number containing `when`, or 0 when it is at or before the
    /// head block's slot.
    pub fn get_slot_at_time(&self, when: Timestamp) -> u32 {
        let first_slot_time = self.get_slot_time(1);
        if when < first_slot_time {
            return 0;
        }
        (when - first_slot_time) / self.params().block_interval as u32 + 1
    }

    /// The witness assigned to the given future slot.
    pub fn get_scheduled_witness(&self, slot_num: u32) -> AccountUid {
        let wso = self.wso();
        let schedule = &wso.current_shuffled_witnesses;
        debug_assert!(!schedule.is_empty());
        let index = (self.dpo().current_aslot + slot_num as u64) % schedule.len() as u64;
        schedule[index as usize].0
    }

    /// Rebuild the shuffled round once the schedule cursor is reached.
    pub(crate) fn update_witness_schedule(&mut self) -> Result<(), Error> {
        let head_num = self.head_block_num();
        if head_num < self.dpo().next_schedule_block_num {
            return Ok(());
        }
        let params = self.params().clone();
        let top_count = params.by_vote_top_witness_count as usize;
        let rest_count = params.by_vote_rest_witness_count as usize;
        let pledge_count = params.by_pledge_witness_count as usize;

        let mut selected: BTreeMap<AccountUid, ScheduledWitnessKind> = BTreeMap::new();

        // 1. straight from the vote ranking: votes desc, uid asc
        let valid_prefix = KeyWriter::default().bool(true).finish();
        let by_votes = self
            .tables()
            .witnesses
            .ids_with_prefix(witness_idx::BY_VOTES, &valid_prefix);
        for id in by_votes.iter().take(top_count) {
            let witness = self.store.get::<Witness>(*id).map_err(internal)?;
            selected.insert(witness.account, ScheduledWitnessKind::ByVoteTop);
        }

        // 2. the remaining voted witnesses, by virtual-time lottery
        //    weighted 1/votes
        self.run_lottery(
            rest_count,
            witness_idx::BY_VOTE_TIME,
            ScheduledWitnessKind::ByVoteRest,
            &mut selected,
        )?;

        // 3. the pledge lottery, weighted 1/average_pledge
        self.run_lottery(
            pledge_count,
            witness_idx::BY_PLEDGE_TIME,
            ScheduledWitnessKind::ByPledge,
            &mut selected,
        )?;

        // deterministic shuffle seeded from the previous block id
        let mut round: Vec<(AccountUid, ScheduledWitnessKind)> =
            selected.iter().map(|(uid, kind)| (*uid, *kind)).collect();
        let seed_bytes = agora_crypto::sha256(&self.dpo().head_block_id.0);
        let mut rng = ShuffleRng::new(u64::from_le_bytes(
            seed_bytes[..8].try_into().expect("8 bytes"),
        ));
        for i in (1..round.len()).rev() {
            let j = (rng.next() % (i as u64 + 1)) as usize;
            round.swap(i, j);
        }

        let total_witness_pledge = self.sum_valid_witness_pledges();
        let schedule_len = round.len().max(1) as BlockNum;
        self.modify_gpo(|gpo| {
            gpo.active_witnesses = selected;
        });
        self.modify_wso(|wso| {
            wso.current_shuffled_witnesses = round;
        });
        let by_pledge_pay = self.compute_witness_pay_by_pledge(total_witness_pledge);
        self.modify_dpo(|dpo| {
            dpo.total_witness_pledge = total_witness_pledge;
            dpo.by_pledge_witness_pay_per_block = by_pledge_pay;
            dpo.next_schedule_block_num = head_num + schedule_len;
        });
        info!(
            "witness schedule updated on block {head_num}, next update at block {}",
            self.dpo().next_schedule_block_num
        );
        Ok(())
    }

    /// Draw up to `count` witnesses not yet selected, in virtual-time
    /// order; each draw advances the winner's cursor by a weight-scaled
    /// lap. Ties resolve by the index ordering (time, weight desc, uid).
    fn run_lottery(
        &mut self,
        count: usize,
        index: usize,
        kind: ScheduledWitnessKind,
        selected: &mut BTreeMap<AccountUid, ScheduledWitnessKind>,
    ) -> Result<(), Error> {
        let valid_prefix = KeyWriter::default().bool(true).finish();
        for _ in 0..count {
            let candidates = self.tables().witnesses.ids_with_prefix(index, &valid_prefix);
            let winner = candidates.into_iter().find_map(|id| {
                let witness = self.tables().witnesses.get(id)?;
                if selected.contains_key(&witness.account) {
                    None
                } else {
                    Some((id, witness.account, witness.total_votes, witness.average_pledge))
                }
            });
            let Some((winner_id, account, votes, average_pledge)) = winner else {
                break;
            };
            selected.insert(account, kind);
            let weight = match kind {
                ScheduledWitnessKind::ByVoteRest => votes,
                ScheduledWitnessKind::ByPledge => average_pledge.max(0) as u64,
                ScheduledWitnessKind::ByVoteTop => unreachable!("top pool is not a lottery"),
            };
            let lap = VIRTUAL_LAP / (weight as u128 + 1);
            match kind {
                ScheduledWitnessKind::ByVoteRest => {
                    let cursor = self
                        .store
                        .get::<Witness>(winner_id)
                        .map_err(internal)?
                        .by_vote_scheduled_time;
                    self.modify_dpo(|dpo| dpo.current_by_vote_time = cursor);
                    self.store
                        .modify(winner_id, |w: &mut Witness| {
                            w.by_vote_scheduled_time = cursor + lap;
                        })
                        .map_err(internal)?;
                }
                ScheduledWitnessKind::ByPledge => {
                    let cursor = self
                        .store
                        .get::<Witness>(winner_id)
                        .map_err(internal)?
                        .by_pledge_scheduled_time;
                    self.modify_dpo(|dpo| dpo.current_by_pledge_time = cursor);
                    self.store
                        .modify(winner_id, |w: &mut Witness| {
                            w.by_pledge_scheduled_time = cursor + lap;
                        })
                        .map_err(internal)?;
                }
                ScheduledWitnessKind::ByVoteTop => unreachable!("top pool is not a lottery"),
            }
        }
        Ok(())
    }

    pub(crate) fn sum_valid_witness_pledges(&self) -> Share {
        let valid_prefix = KeyWriter::default().bool(true).finish();
        self.tables()
            .witnesses
            .ids_with_prefix(witness_idx::BY_VALID, &valid_prefix)
            .into_iter()
            .filter_map(|id| self.tables().witnesses.get(id))
            .map(|w| w.pledge)
            .sum()
    }

    /// Per-block pay of a by-pledge slot. The annual rate is a piecewise
    /// curve in the total staked pledge `P`, in units of ten million coins:
    ///
    ///   P < 10M coins:            25% of the pledge
    ///   10M <= P < 320M coins:    pledge * (-0.001052 P^3 + 0.06937 P^2
    ///                                       - 1.656 P + 21.12) / 100
    ///   P >= 320M coins:          a flat 15,011,020.8 coins per year
    pub(crate) fn compute_witness_pay_by_pledge(&self, total_pledge: Share) -> Share {
        let params = self.params();
        let by_pledge_count = params.by_pledge_witness_count.max(1) as i128;
        let active_count = self
            .gpo()
            .active_witnesses
            .len()
            .max(1) as i128;

        let lower_point: i128 = COIN_PRECISION as i128 * 10_000_000;
        let upper_point: i128 = COIN_PRECISION as i128 * 320_000_000;
        let pledge = total_pledge.max(0) as i128;

        let pay_per_year: i128 = if pledge < lower_point {
            pledge * (25 * ONE_PERCENT) as i128 / FULL_PERCENT as i128
        } else if pledge < upper_point {
            // thousandths of a 10M-coin unit keep every term inside i128
            let p = pledge * 1_000 / lower_point;
            let rate_scaled = -1_052 * p * p * p
                + 69_370 * p * p * 1_000
                - 1_656 * p * 1_000_000_000
                + 21_120_000_000_000_000;
            // rate_scaled is in units of 1e-17
            pledge * rate_scaled / 100_000_000_000_000_000
        } else {
            150_110_208 * COIN_PRECISION as i128 / 10
        };

        let per_block = pay_per_year * params.block_interval as i128 * active_count
            / (86_400 * 365 * by_pledge_count);
        per_block as Share
    }
}

/// xorshift64*; seeded from the previous block id, so every node shuffles
/// the round identically.
struct ShuffleRng {
    state: u64,
}

impl ShuffleRng {
    fn new(seed: u64) -> Self {
        ShuffleRng { state: seed | 1 }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }
}

fn internal(e: agora_db::Error) -> Error {
    Error::InternalInvariant(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffle_rng_is_deterministic() {
        let mut a = ShuffleRng::new(42);
        let mut b = ShuffleRng::new(42);
        for _ in 0..16 {
            assert_eq!(a.next(), b.next());
        }
        let mut c = ShuffleRng::new(43);
        assert_ne!(a.next(), c.next());
    }
}
