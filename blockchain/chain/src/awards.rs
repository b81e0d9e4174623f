// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The content-award engine. Once per award interval the expiring period is
//! settled: posts earn from the content pool pro-rata by effective CSAF,
//! scorers take their fixed share through a piecewise-linear weighting, and
//! platforms split a separate pool by raw CSAF. A third epoch pays the
//! top-voted platforms. Every payout draws from the budget pool; nothing
//! here mints.

use crate::errors::Error;
use crate::objects::{active_post_idx, platform_idx, ActivePost, Platform, Score};
use crate::Database;
use agora_db::KeyWriter;
use agora_types::{
    AccountUid, Amount, Share, Timestamp, FULL_PERCENT, SCORE_RECEIPT_RATIO,
};
use log::info;
use std::collections::BTreeMap;

/// Settled periods retained for queries before being cleared.
pub(crate) const LATEST_ACTIVE_POST_PERIODS: usize = 4;

const SECONDS_PER_YEAR: u128 = 86_400 * 365;

impl Database {
    pub(crate) fn active_post_retention(&self) -> usize {
        LATEST_ACTIVE_POST_PERIODS
    }

    /// Post/scorer and per-platform content pools, run when the award epoch
    /// rolls over.
    pub(crate) fn process_content_awards(&mut self) -> Result<(), Error> {
        let block_time = self.head_block_time();
        if block_time < self.dpo().next_content_award_time {
            return Ok(());
        }
        let params = self.params().content_award.clone();

        if !params.content_awards_enabled() {
            // engine switched off: close out and clear
            if self.dpo().next_content_award_time != 0 {
                self.clear_expired_active_posts(0)?;
                self.modify_dpo(|dpo| {
                    dpo.last_content_award_time = 0;
                    dpo.next_content_award_time = 0;
                    dpo.content_award_enabled = false;
                });
            }
            return Ok(());
        }

        if self.dpo().next_content_award_time == 0 {
            // engine switched on: open the first period
            self.clear_expired_active_posts(0)?;
            self.modify_dpo(|dpo| {
                dpo.last_content_award_time = block_time;
                dpo.next_content_award_time = block_time + params.content_award_interval;
                dpo.current_active_post_sequence += 1;
                dpo.content_award_enabled = true;
            });
            return Ok(());
        }

        let mut actual_awards: Share = 0;
        let can_award = self.dpo().budget_pool
            >= params.total_content_award_amount + params.total_platform_content_award_amount;

        if can_award {
            let period = self.dpo().current_active_post_sequence;
            let period_seconds =
                (self.dpo().next_content_award_time - self.dpo().last_content_award_time) as u128;

            // collect the period's posts: their effective CSAF and per
            // platform CSAF totals
            let mut total_csaf: Share = 0;
            let mut total_effective_csaf: Share = 0;
            let mut platform_csaf: BTreeMap<AccountUid, Share> = BTreeMap::new();
            // (active post id, effective csaf, signed approval amount)
            let mut post_effective: Vec<(u64, Share, i128)> = Vec::new();

            let period_prefix = KeyWriter::default().u64(period).finish();
            let active_ids = self
                .tables()
                .active_posts
                .ids_with_prefix(active_post_idx::BY_PERIOD, &period_prefix);
            for active_id in &active_ids {
                let active = self.store.get::<ActivePost>(*active_id).map_err(internal)?;
                let active_platform = active.platform;
                let active_total_csaf = active.total_csaf;
                if active_total_csaf >= params.min_effective_csaf {
                    let approval_amount = self.post_approval_amount(active)?;
                    let effective = active_total_csaf + approval_amount as Share;
                    if effective > 0 {
                        total_effective_csaf += effective;
                        post_effective.push((*active_id, effective, approval_amount));
                    }
                }
                *platform_csaf.entry(active_platform).or_insert(0) += active_total_csaf;
                total_csaf += active_total_csaf;
            }

            let mut credits: BTreeMap<AccountUid, Share> = BTreeMap::new();

            if params.total_content_award_amount > 0 && total_effective_csaf > 0 {
                let pool_this_period = params.total_content_award_amount as u128 * period_seconds
                    / SECONDS_PER_YEAR;
                // per platform: (receiptor-side total, platform-only share)
                let mut platform_receiptor_award: BTreeMap<AccountUid, (Share, Share)> =
                    BTreeMap::new();

                for (active_id, effective, approval_amount) in &post_effective {
                    let post_earned = (pool_this_period * *effective as u128
                        / total_effective_csaf as u128) as Share;
                    let score_earned = (post_earned as u128 * SCORE_RECEIPT_RATIO as u128
                        / FULL_PERCENT as u128) as Share;
                    let receiptor_earned = if *approval_amount >= 0 {
                        post_earned - score_earned
                    } else {
                        ((post_earned - score_earned) as u128
                            * params.receiptor_award_modulus as u128
                            / FULL_PERCENT as u128) as Share
                    };

                    let active = self.store.get::<ActivePost>(*active_id).map_err(internal)?;
                    let (platform, poster, post_pid) =
                        (active.platform, active.poster, active.post_pid);
                    let (_, post) = self
                        .find_post(platform, poster, post_pid)
                        .ok_or_else(|| internal_msg("active post without post"))?;
                    let post_receiptors = post.receiptors.clone();
                    let score_settled = post.score_settlement;

                    // receiptor side, platform takes the residue
                    let mut residue = receiptor_earned;
                    let mut receiptor_shares: Vec<(AccountUid, Share)> = Vec::new();
                    for (uid, receiptor) in &post_receiptors {
                        if *uid == platform {
                            continue;
                        }
                        let share = (receiptor_earned as u128 * receiptor.cur_ratio as u128
                            / FULL_PERCENT as u128) as Share;
                        residue -= share;
                        *credits.entry(*uid).or_insert(0) += share;
                        receiptor_shares.push((*uid, share));
                    }
                    *credits.entry(platform).or_insert(0) += residue;
                    receiptor_shares.push((platform, residue));

                    let platform_only = if poster == platform {
                        (receiptor_earned as u128 * agora_types::PLATFORM_RECEIPT_RATIO as u128
                            / FULL_PERCENT as u128) as Share
                    } else {
                        residue
                    };
                    let entry = platform_receiptor_award.entry(platform).or_insert((0, 0));
                    entry.0 += residue;
                    entry.1 += platform_only;

                    let positive = *approval_amount >= 0;
                    self.store
                        .modify(*active_id, |a: &mut ActivePost| {
                            a.positive_win = positive;
                            a.post_award = receiptor_earned;
                            for (uid, share) in &receiptor_shares {
                                a.credit_receiptor_award(*uid, *share);
                            }
                        })
                        .map_err(internal)?;

                    // scorer side is one-shot per post
                    if score_settled {
                        continue;
                    }
                    let actual_score_earned = self.settle_scorers(
                        *active_id,
                        score_earned,
                        *approval_amount < 0,
                        &mut credits,
                    )?;
                    self.store
                        .modify(*active_id, |a: &mut ActivePost| {
                            a.post_award = receiptor_earned + actual_score_earned;
                        })
                        .map_err(internal)?;
                    if let Some((post_id, _)) = self.find_post(platform, poster, post_pid) {
                        self.store
                            .modify(post_id, |p: &mut crate::objects::Post| {
                                p.score_settlement = true;
                            })
                            .map_err(internal)?;
                    }
                }

                for (platform_uid, (receiptor_total, platform_only)) in platform_receiptor_award {
                    if let Some((platform_id, _)) = self.find_platform_by_owner(platform_uid) {
                        self.store
                            .modify(platform_id, |p: &mut Platform| {
                                p.add_period_profits(
                                    period,
                                    LATEST_ACTIVE_POST_PERIODS,
                                    None,
                                    0,
                                    receiptor_total,
                                    platform_only,
                                );
                            })
                            .map_err(internal)?;
                    }
                }
            }

            if params.total_platform_content_award_amount > 0 && total_csaf > 0 {
                let pool_this_period = params.total_platform_content_award_amount as u128
                    * period_seconds
                    / SECONDS_PER_YEAR;
                for (platform_uid, csaf) in &platform_csaf {
                    let share =
                        (pool_this_period * *csaf as u128 / total_csaf as u128) as Share;
                    *credits.entry(*platform_uid).or_insert(0) += share;
                    if let Some((platform_id, _)) = self.find_platform_by_owner(*platform_uid) {
                        self.store
                            .modify(platform_id, |p: &mut Platform| {
                                p.add_period_profits(
                                    period,
                                    LATEST_ACTIVE_POST_PERIODS,
                                    None,
                                    0,
                                    0,
                                    share,
                                );
                            })
                            .map_err(internal)?;
                    }
                }
            }

            for (uid, amount) in credits {
                if amount > 0 {
                    actual_awards += amount;
                    self.adjust_balance(uid, Amount::core(amount)).map_err(internal_eval)?;
                }
            }
        }

        let interval = params.content_award_interval;
        self.modify_dpo(|dpo| {
            dpo.last_content_award_time = block_time;
            dpo.next_content_award_time = block_time + interval;
            dpo.current_active_post_sequence += 1;
            if actual_awards > 0 {
                dpo.budget_pool -= actual_awards;
            }
        });
        if actual_awards > 0 {
            // awards come out of the pool, which was minted into supply as
            // budget; crediting balances keeps the supply identity intact
            info!(
                "content awards settled: {actual_awards} drawn from the budget pool at {block_time}"
            );
        }
        self.clear_expired_active_posts(LATEST_ACTIVE_POST_PERIODS)?;
        Ok(())
    }

    /// `Σ csaf·score·modulus / (5·100%)` over the period's scores, in i128.
    fn post_approval_amount(&self, active: &ActivePost) -> Result<i128, Error> {
        let modulus = self.params().content_award.casf_modulus as i128;
        let mut amount: i128 = 0;
        for score_id in &active.scores {
            let score = self.store.get::<Score>(*score_id).map_err(internal)?;
            amount += score.csaf as i128 * score.score as i128 * modulus
                / (5 * FULL_PERCENT as i128);
        }
        Ok(amount)
    }

    /// Distribute the scorer share of one post by effective-CSAF weight.
    /// Early scorers take full weight, the band between the two turn points
    /// decays linearly to the floor weight, everything beyond sits at the
    /// floor. Disapprovers of a net-negative post are further scaled.
    fn settle_scorers(
        &mut self,
        active_id: u64,
        score_earned: Share,
        negative_post: bool,
        credits: &mut BTreeMap<AccountUid, Share>,
    ) -> Result<Share, Error> {
        let params = self.params().content_award.clone();
        let active = self.store.get::<ActivePost>(active_id).map_err(internal)?.clone();

        let total = active.total_csaf as u128;
        let turn_first = total * params.approval_casf_first_rate as u128 / FULL_PERCENT as u128;
        let turn_second = total * params.approval_casf_second_rate as u128 / FULL_PERCENT as u128;
        let min_weight = params.approval_casf_min_weight as u128;
        let full = FULL_PERCENT as u128;

        // weight of the band [begin, end) within the decay region
        let band_weight = |begin: u128, end: u128| -> u128 {
            if turn_second == turn_first {
                return (end - begin) * min_weight / full;
            }
            let mid = (begin + end) / 2;
            let slope = (turn_second - mid) * (full - min_weight) / (turn_second - turn_first)
                + min_weight;
            (end - begin) * slope / full
        };

        // first pass: per-score effective csaf along the running total
        let mut running: u128 = 0;
        let mut effective: Vec<(u64, u128, bool)> = Vec::with_capacity(active.scores.len());
        let mut total_effective: u128 = 0;
        for score_id in &active.scores {
            let score = self.store.get::<Score>(*score_id).map_err(internal)?;
            let csaf = score.csaf as u128;
            let begin = running;
            let end = running + csaf;
            running = end;
            let weighted = if end <= turn_first {
                csaf
            } else if end <= turn_second {
                if begin < turn_first {
                    (turn_first - begin) + band_weight(turn_first, end)
                } else {
                    band_weight(begin, end)
                }
            } else if begin < turn_first {
                (turn_first - begin)
                    + band_weight(turn_first, turn_second)
                    + (end - turn_second) * min_weight / full
            } else if begin < turn_second {
                band_weight(begin, turn_second) + (end - turn_second) * min_weight / full
            } else {
                csaf * min_weight / full
            };
            total_effective += weighted;
            effective.push((*score_id, weighted, score.score >= 0));
        }

        if total_effective == 0 {
            return Ok(0);
        }

        // second pass: payouts
        let mut paid: Share = 0;
        for (score_id, weighted, approved) in effective {
            let share = if negative_post && !approved {
                (weighted * score_earned as u128 * params.disapprove_award_modulus as u128
                    / (total_effective * full)) as Share
            } else {
                (weighted * score_earned as u128 / total_effective) as Share
            };
            let scorer = self.store.get::<Score>(score_id).map_err(internal)?.from_account_uid;
            self.store
                .modify(score_id, |s: &mut Score| s.profits = share)
                .map_err(internal)?;
            *credits.entry(scorer).or_insert(0) += share;
            paid += share;
        }
        Ok(paid)
    }

    /// The platform-voted award epoch: split the pool between the
    /// top-voted platforms, a basic share equally and the rest by votes.
    pub(crate) fn process_platform_voted_awards(&mut self) -> Result<(), Error> {
        let block_time = self.head_block_time();
        if block_time < self.dpo().next_platform_voted_award_time {
            return Ok(());
        }
        let params = self.params().content_award.clone();
        if !params.platform_voted_awards_enabled() {
            if self.dpo().next_platform_voted_award_time != 0 {
                self.modify_dpo(|dpo| {
                    dpo.last_platform_voted_award_time = 0;
                    dpo.next_platform_voted_award_time = 0;
                });
            }
            return Ok(());
        }

        let mut actual_awards: Share = 0;
        let can_award = self.dpo().next_platform_voted_award_time > 0
            && self.dpo().budget_pool >= params.total_platform_voted_award_amount;
        if can_award {
            // top platforms by votes, floor-gated
            let valid_prefix = KeyWriter::default().bool(true).finish();
            let ranked = self
                .tables()
                .platforms
                .ids_with_prefix(platform_idx::BY_VOTES, &valid_prefix);
            let mut winners: Vec<(u64, AccountUid, u64)> = Vec::new();
            let mut total_votes: u128 = 0;
            for id in ranked.into_iter().take(params.platform_award_requested_rank as usize) {
                let platform = self.store.get::<Platform>(id).map_err(internal)?;
                if platform.total_votes < params.platform_award_min_votes {
                    break;
                }
                total_votes += platform.total_votes as u128;
                winners.push((id, platform.owner, platform.total_votes));
            }

            if !winners.is_empty() {
                let period_seconds = (self.dpo().next_platform_voted_award_time
                    - self.dpo().last_platform_voted_award_time)
                    as u128;
                let pool = params.total_platform_voted_award_amount as u128 * period_seconds
                    / SECONDS_PER_YEAR;
                let basic_pool =
                    pool * params.platform_award_basic_rate as u128 / FULL_PERCENT as u128;
                let basic_each = (basic_pool / winners.len() as u128) as Share;
                let vote_pool = pool - basic_pool;

                let mut payouts: Vec<(u64, AccountUid, Share)> = Vec::new();
                for (id, owner, votes) in &winners {
                    let mut amount = basic_each;
                    if total_votes > 0 {
                        amount += (vote_pool * *votes as u128 / total_votes) as Share;
                    }
                    payouts.push((*id, *owner, amount));
                }
                for (platform_id, owner, amount) in payouts {
                    actual_awards += amount;
                    self.adjust_balance(owner, Amount::core(amount)).map_err(internal_eval)?;
                    self.store
                        .modify(platform_id, |p: &mut Platform| {
                            if p.vote_profits.len() >= LATEST_ACTIVE_POST_PERIODS {
                                if let Some((&oldest, _)) = p.vote_profits.iter().next() {
                                    p.vote_profits.remove(&oldest);
                                }
                            }
                            p.vote_profits.insert(block_time, amount);
                        })
                        .map_err(internal)?;
                }
            }
        }

        let interval = params.platform_award_interval;
        self.modify_dpo(|dpo| {
            dpo.last_platform_voted_award_time = block_time;
            dpo.next_platform_voted_award_time = block_time + interval;
            if actual_awards > 0 {
                dpo.budget_pool -= actual_awards;
            }
        });
        Ok(())
    }

    /// Remove active posts outside the retained period window. With
    /// `retain == 0` everything goes.
    pub(crate) fn clear_expired_active_posts(&mut self, retain: usize) -> Result<(), Error> {
        let current = self.dpo().current_active_post_sequence;
        if retain > 0 && current <= retain as u64 {
            return Ok(());
        }
        let cutoff = if retain == 0 { u64::MAX } else { current - retain as u64 + 1 };
        let ids: Vec<u64> = self
            .tables()
            .active_posts
            .iter()
            .filter(|(_, a)| a.period_sequence < cutoff)
            .map(|(id, _)| id)
            .collect();
        for id in ids {
            let active = self.store.remove::<ActivePost>(id).map_err(internal)?;
            // the period's scores go with it
            for score_id in active.scores {
                if self.tables().scores.contains(score_id) {
                    self.store.remove::<Score>(score_id).map_err(internal)?;
                }
            }
        }
        Ok(())
    }
}

fn internal(e: agora_db::Error) -> Error {
    Error::InternalInvariant(e.to_string())
}

fn internal_eval(e: crate::errors::EvalError) -> Error {
    Error::InternalInvariant(e.to_string())
}

fn internal_msg(msg: &str) -> Error {
    Error::InternalInvariant(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The weighting curve itself is exercised end to end in the scenario
    // suite; here we only pin the band-weight shape at its edges.
    #[test]
    fn score_receipt_ratio_is_one_fifth() {
        assert_eq!(SCORE_RECEIPT_RATIO, FULL_PERCENT / 5);
    }

    #[test]
    fn timestamp_type_fits_award_math() {
        let far: Timestamp = u32::MAX;
        assert!((far as u128) < SECONDS_PER_YEAR * 200);
    }
}
