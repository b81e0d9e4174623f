// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{Evaluator, OpContext};
use crate::errors::EvalError;
use crate::pipeline::OperationResult;
use crate::Database;
use agora_message::operations::{OverrideTransfer, Transfer};
use agora_types::CORE_ASSET_AID;

#[derive(Default)]
pub(super) struct TransferEvaluator;

impl Evaluator for TransferEvaluator {
    type Op = Transfer;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &Transfer) -> Result<(), EvalError> {
        let from = db.get_account_by_uid(op.from)?;
        let to = db.get_account_by_uid(op.to)?;
        let asset = db.get_asset_by_aid(op.amount.asset_aid)?;

        if asset.is_transfer_restricted() && op.from != asset.issuer && op.to != asset.issuer {
            return Err(EvalError::Unauthorized(format!(
                "asset {} is transfer restricted; one party must be the issuer",
                asset.aid
            )));
        }
        db.validate_authorized_asset(from, asset)?;
        db.validate_authorized_asset(to, asset)?;

        if op.from_prepaid {
            let prepaid = db.get_account_statistics_by_uid(op.from)?.prepaid;
            if prepaid < op.amount.amount {
                return Err(EvalError::InsufficientPrepaid {
                    account: op.from,
                    required: op.amount.amount,
                    available: prepaid,
                });
            }
        } else if op.amount.asset_aid == CORE_ASSET_AID {
            let available = db.get_account_statistics_by_uid(op.from)?.unencumbered_balance();
            if available < op.amount.amount {
                return Err(EvalError::InsufficientBalance {
                    account: op.from,
                    required: op.amount.amount,
                    available,
                });
            }
        } else {
            let balance = db.get_balance(op.from, op.amount.asset_aid);
            if balance < op.amount.amount {
                return Err(EvalError::InsufficientBalance {
                    account: op.from,
                    required: op.amount.amount,
                    available: balance,
                });
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &Transfer,
    ) -> Result<OperationResult, EvalError> {
        // debit side
        if op.from_prepaid {
            db.modify_account_statistics(op.from, |s| s.prepaid -= op.amount.amount)?;
        } else if op.amount.asset_aid == CORE_ASSET_AID {
            db.spend_core(op.from, op.amount.amount)?;
        } else {
            db.adjust_balance(op.from, -op.amount)?;
        }
        // credit side
        if op.to_prepaid {
            db.modify_account_statistics(op.to, |s| s.prepaid += op.amount.amount)?;
        } else {
            db.adjust_balance(op.to, op.amount)?;
        }
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct OverrideTransferEvaluator;

impl Evaluator for OverrideTransferEvaluator {
    type Op = OverrideTransfer;

    fn evaluate(
        &mut self,
        db: &Database,
        _ctx: &OpContext,
        op: &OverrideTransfer,
    ) -> Result<(), EvalError> {
        db.get_account_by_uid(op.from)?;
        let to = db.get_account_by_uid(op.to)?;
        let asset = db.get_asset_by_aid(op.amount.asset_aid)?;
        if asset.issuer != op.issuer {
            return Err(EvalError::Unauthorized(format!(
                "account {} is not the issuer of asset {}",
                op.issuer, asset.aid
            )));
        }
        if !asset.can_override() {
            return Err(EvalError::Unauthorized(format!(
                "asset {} does not permit issuer overrides",
                asset.aid
            )));
        }
        db.validate_authorized_asset(to, asset)?;
        let balance = db.get_balance(op.from, op.amount.asset_aid);
        if balance < op.amount.amount {
            return Err(EvalError::InsufficientBalance {
                account: op.from,
                required: op.amount.amount,
                available: balance,
            });
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &OverrideTransfer,
    ) -> Result<OperationResult, EvalError> {
        db.adjust_balance(op.from, -op.amount)?;
        db.adjust_balance(op.to, op.amount)?;
        Ok(OperationResult::Void)
    }
}
