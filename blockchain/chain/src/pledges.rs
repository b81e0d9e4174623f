// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Pledge bookkeeping shared by the witness, committee and platform
//! evaluators: raising a pledge consumes the releasing queue first, lowering
//! schedules the delta for delayed release.

use crate::errors::EvalError;
use crate::objects::{AccountStatistics, PledgeRole};
use crate::Database;
use agora_types::{AccountUid, BlockNum, Share, NO_RELEASE_BLOCK};

/// Weighted catch-up of a rolling average over `window`; reaching the window
/// snaps to the target.
pub(crate) fn rolling_average(old: i128, target: i128, elapsed: u64, window: u64) -> i128 {
    if window == 0 || elapsed as u128 >= window as u128 {
        return target;
    }
    let w = window as i128;
    let dt = elapsed as i128;
    (old * (w - dt) + target * dt) / w
}

/// Apply a pledge change for one role directly on the statistics row.
/// `new_pledge` is the role's full new pledge amount.
pub(crate) fn apply_pledge_change(
    stats: &mut AccountStatistics,
    role: PledgeRole,
    new_pledge: Share,
    head_block_num: BlockNum,
    release_delay: u32,
) {
    let (total, releasing, release_block) = match role {
        PledgeRole::Witness => (
            &mut stats.total_witness_pledge,
            &mut stats.releasing_witness_pledge,
            &mut stats.witness_pledge_release_block,
        ),
        PledgeRole::Committee => (
            &mut stats.total_committee_member_pledge,
            &mut stats.releasing_committee_member_pledge,
            &mut stats.committee_member_pledge_release_block,
        ),
        PledgeRole::Platform => (
            &mut stats.total_platform_pledge,
            &mut stats.releasing_platform_pledge,
            &mut stats.platform_pledge_release_block,
        ),
    };
    let locked = *total - *releasing;
    let delta = new_pledge - locked;
    if delta >= 0 {
        // raise: reuse the releasing queue before locking new coins
        if *releasing > delta {
            *releasing -= delta;
        } else {
            *total = new_pledge;
            if *releasing > 0 {
                *releasing = 0;
                *release_block = NO_RELEASE_BLOCK;
            }
        }
    } else {
        *releasing -= delta;
        *release_block = head_block_num + release_delay;
    }
}

/// Schedule the role's entire pledge for release (resignation).
pub(crate) fn schedule_full_release(
    stats: &mut AccountStatistics,
    role: PledgeRole,
    release_block: BlockNum,
) {
    match role {
        PledgeRole::Witness => {
            stats.releasing_witness_pledge = stats.total_witness_pledge;
            stats.witness_pledge_release_block = release_block;
        }
        PledgeRole::Committee => {
            stats.releasing_committee_member_pledge = stats.total_committee_member_pledge;
            stats.committee_member_pledge_release_block = release_block;
        }
        PledgeRole::Platform => {
            stats.releasing_platform_pledge = stats.total_platform_pledge;
            stats.platform_pledge_release_block = release_block;
        }
    }
}

impl Database {
    /// Precondition shared by pledge-backed role evaluators: the account can
    /// cover `pledge` with balance not encumbered by other roles.
    pub(crate) fn require_pledge_backing(
        &self,
        account: AccountUid,
        role: PledgeRole,
        pledge: Share,
    ) -> Result<(), EvalError> {
        let stats = self.get_account_statistics_by_uid(account)?;
        let available = stats.available_for_pledge(role);
        if available < pledge {
            return Err(EvalError::InsufficientBalance {
                account,
                required: pledge,
                available,
            });
        }
        Ok(())
    }

    /// Witness pledges also feed the schedule's pay curve input.
    pub(crate) fn note_witness_pledge_delta(&mut self, delta: Share) {
        if delta != 0 {
            self.modify_dpo(|dpo| dpo.total_witness_pledge += delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(balance: Share) -> AccountStatistics {
        let mut s = AccountStatistics::new(7);
        s.core_balance = balance;
        s
    }

    #[test]
    fn lowering_schedules_release() {
        let mut s = stats(10_000);
        apply_pledge_change(&mut s, PledgeRole::Witness, 5_000, 10, 100);
        assert_eq!(s.total_witness_pledge, 5_000);
        apply_pledge_change(&mut s, PledgeRole::Witness, 3_000, 20, 100);
        assert_eq!(s.total_witness_pledge, 5_000);
        assert_eq!(s.releasing_witness_pledge, 2_000);
        assert_eq!(s.witness_pledge_release_block, 120);
    }

    #[test]
    fn raising_consumes_releasing_queue_first() {
        let mut s = stats(10_000);
        apply_pledge_change(&mut s, PledgeRole::Witness, 5_000, 10, 100);
        apply_pledge_change(&mut s, PledgeRole::Witness, 3_000, 20, 100);
        // raise by less than the queue: the queue shrinks, total stands
        apply_pledge_change(&mut s, PledgeRole::Witness, 4_000, 30, 100);
        assert_eq!(s.total_witness_pledge, 5_000);
        assert_eq!(s.releasing_witness_pledge, 1_000);
        // raise past the queue: the queue clears
        apply_pledge_change(&mut s, PledgeRole::Witness, 6_000, 40, 100);
        assert_eq!(s.total_witness_pledge, 6_000);
        assert_eq!(s.releasing_witness_pledge, 0);
        assert_eq!(s.witness_pledge_release_block, NO_RELEASE_BLOCK);
    }

    #[test]
    fn roles_do_not_share_backing() {
        let mut s = stats(10_000);
        s.total_witness_pledge = 6_000;
        s.total_committee_member_pledge = 3_000;
        assert_eq!(s.available_for_pledge(PledgeRole::Witness), 7_000);
        assert_eq!(s.available_for_pledge(PledgeRole::Committee), 4_000);
        assert_eq!(s.available_for_pledge(PledgeRole::Platform), 1_000);
    }

    #[test]
    fn rolling_average_snaps_at_window() {
        assert_eq!(rolling_average(0, 100, 50, 100), 50);
        assert_eq!(rolling_average(0, 100, 100, 100), 100);
        assert_eq!(rolling_average(80, 100, 0, 100), 80);
    }
}
