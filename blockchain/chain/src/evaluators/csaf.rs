// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{Evaluator, OpContext};
use crate::errors::EvalError;
use crate::objects::CsafLease;
use crate::pipeline::OperationResult;
use crate::Database;
use agora_message::operations::{CsafCollect, CsafLease as CsafLeaseOp};
use agora_types::HardforkVersion;

#[derive(Default)]
pub(super) struct CsafCollectEvaluator;

impl Evaluator for CsafCollectEvaluator {
    type Op = CsafCollect;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &CsafCollect) -> Result<(), EvalError> {
        db.get_account_by_uid(op.from)?;
        db.get_account_by_uid(op.to)?;
        let stats = db.get_account_statistics_by_uid(op.from)?;
        let params = db.params();
        let earned = stats.coin_seconds_as_of(
            params.csaf_accumulate_window,
            db.head_block_time(),
            db.dpo().enabled_hardfork_version,
        );
        let needed = op.amount as u128 * params.csaf_rate as u128;
        if earned < needed {
            return Err(EvalError::InsufficientCsaf {
                account: op.from,
                required: op.amount,
                available: (earned / params.csaf_rate as u128) as i64,
            });
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &CsafCollect,
    ) -> Result<OperationResult, EvalError> {
        db.collect_csaf(op.from, op.to, op.amount)?;
        Ok(OperationResult::Void)
    }
}

/// Leasing moves CSAF accrual from lender to lessee without moving coins;
/// an existing lease between the pair is replaced, amount 0 cancels.
#[derive(Default)]
pub(super) struct CsafLeaseEvaluator {
    existing: Option<(u64, CsafLease)>,
}

impl Evaluator for CsafLeaseEvaluator {
    type Op = CsafLeaseOp;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &CsafLeaseOp) -> Result<(), EvalError> {
        db.get_account_by_uid(op.from)?;
        db.get_account_by_uid(op.to)?;
        self.existing = db.find_csaf_lease(op.from, op.to).map(|(id, lease)| (id, *lease));
        if op.amount == 0 && self.existing.is_none() {
            return Err(EvalError::Precondition("no lease to cancel".into()));
        }
        if op.amount > 0 {
            let now = db.head_block_time();
            if op.expiration <= now {
                return Err(EvalError::Precondition("lease expiration is in the past".into()));
            }
            if op.expiration - now > db.params().max_csaf_lease_duration {
                return Err(EvalError::Precondition("lease duration too long".into()));
            }
            let stats = db.get_account_statistics_by_uid(op.from)?;
            let prior = self.existing.map(|(_, l)| l.amount).unwrap_or(0);
            // leased-out coins stay pledge-capable but cannot be re-leased
            let available = stats.core_balance
                - stats.total_witness_pledge
                - stats.total_committee_member_pledge
                - stats.total_platform_pledge
                - (stats.core_leased_out - prior);
            if available < op.amount {
                return Err(EvalError::InsufficientBalance {
                    account: op.from,
                    required: op.amount,
                    available,
                });
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &CsafLeaseOp,
    ) -> Result<OperationResult, EvalError> {
        let prior = self.existing.map(|(_, l)| l.amount).unwrap_or(0);
        let delta = op.amount - prior;

        // settle accrual before the accruing-coin sets change; the pre-05
        // fork path refreshed here, Fork05 defers to the maintenance pass
        let hardfork = db.dpo().enabled_hardfork_version;
        if hardfork < HardforkVersion::Fork05 {
            db.update_coin_seconds_earned(op.from)?;
            db.update_coin_seconds_earned(op.to)?;
        }
        db.modify_account_statistics(op.from, |s| s.core_leased_out += delta)?;
        db.modify_account_statistics(op.to, |s| s.core_leased_in += delta)?;

        let result = match (self.existing, op.amount) {
            (Some((id, _)), 0) => {
                db.store.remove::<CsafLease>(id)?;
                OperationResult::Void
            }
            (Some((id, _)), _) => {
                db.store.modify(id, |l: &mut CsafLease| {
                    l.amount = op.amount;
                    l.expiration = op.expiration;
                })?;
                OperationResult::ObjectId(id)
            }
            (None, _) => {
                let id = db.store.create(CsafLease {
                    from: op.from,
                    to: op.to,
                    amount: op.amount,
                    expiration: op.expiration,
                });
                OperationResult::ObjectId(id)
            }
        };
        Ok(result)
    }
}
