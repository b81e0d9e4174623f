// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{Evaluator, OpContext};
use crate::errors::EvalError;
use crate::objects::{Asset, AssetDynamicData};
use crate::pipeline::OperationResult;
use crate::Database;
use agora_message::operations::{
    AssetClaimFees, AssetCreate, AssetIssue, AssetReserve, AssetUpdate,
};
use agora_types::asset_flags;

#[derive(Default)]
pub(super) struct AssetCreateEvaluator;

impl Evaluator for AssetCreateEvaluator {
    type Op = AssetCreate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AssetCreate) -> Result<(), EvalError> {
        db.get_account_by_uid(op.issuer)?;
        if db.find_asset_by_symbol(&op.symbol).is_some() {
            return Err(EvalError::Precondition(format!(
                "asset symbol {:?} already exists",
                op.symbol
            )));
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AssetCreate,
    ) -> Result<OperationResult, EvalError> {
        // aids are allocated densely in creation order
        let aid = db
            .tables()
            .assets
            .iter()
            .map(|(_, a)| a.aid)
            .max()
            .map(|max| max + 1)
            .unwrap_or(0);
        let dynamic_data = db.store.create(AssetDynamicData {
            aid,
            current_supply: op.initial_supply,
            accumulated_fees: 0,
        });
        let id = db.store.create(Asset {
            aid,
            symbol: op.symbol.clone(),
            precision: op.precision,
            issuer: op.issuer,
            max_supply: op.max_supply,
            flags: op.flags,
            permissions: op.permissions,
            description: op.description.clone(),
            dynamic_data,
        });
        if op.initial_supply > 0 {
            db.adjust_balance(op.issuer, agora_types::Amount::new(op.initial_supply, aid))?;
        }
        Ok(OperationResult::ObjectId(id))
    }
}

#[derive(Default)]
pub(super) struct AssetIssueEvaluator;

impl Evaluator for AssetIssueEvaluator {
    type Op = AssetIssue;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AssetIssue) -> Result<(), EvalError> {
        let asset = db.get_asset_by_aid(op.asset_to_issue.asset_aid)?;
        if asset.issuer != op.issuer {
            return Err(EvalError::Unauthorized(format!(
                "account {} is not the issuer of asset {}",
                op.issuer, asset.aid
            )));
        }
        if !asset.can_issue() {
            return Err(EvalError::Unauthorized(format!(
                "asset {} does not permit issuance",
                asset.aid
            )));
        }
        db.get_account_by_uid(op.issue_to_account)?;
        let dynamic = db.get_asset_dynamic(asset.aid)?;
        if dynamic.current_supply + op.asset_to_issue.amount > asset.max_supply {
            return Err(EvalError::Precondition(format!(
                "issuing {} would exceed asset {}'s max supply",
                op.asset_to_issue.amount, asset.aid
            )));
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AssetIssue,
    ) -> Result<OperationResult, EvalError> {
        db.modify_asset_dynamic(op.asset_to_issue.asset_aid, |d| {
            d.current_supply += op.asset_to_issue.amount;
        })?;
        db.adjust_balance(op.issue_to_account, op.asset_to_issue)?;
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct AssetReserveEvaluator;

impl Evaluator for AssetReserveEvaluator {
    type Op = AssetReserve;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AssetReserve) -> Result<(), EvalError> {
        db.get_asset_by_aid(op.amount_to_reserve.asset_aid)?;
        let balance = db.get_balance(op.payer, op.amount_to_reserve.asset_aid);
        if balance < op.amount_to_reserve.amount {
            return Err(EvalError::InsufficientBalance {
                account: op.payer,
                required: op.amount_to_reserve.amount,
                available: balance,
            });
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AssetReserve,
    ) -> Result<OperationResult, EvalError> {
        db.adjust_balance(op.payer, -op.amount_to_reserve)?;
        db.modify_asset_dynamic(op.amount_to_reserve.asset_aid, |d| {
            d.current_supply -= op.amount_to_reserve.amount;
        })?;
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct AssetUpdateEvaluator;

impl Evaluator for AssetUpdateEvaluator {
    type Op = AssetUpdate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AssetUpdate) -> Result<(), EvalError> {
        let asset = db.get_asset_by_aid(op.asset_to_update)?;
        if asset.issuer != op.issuer {
            return Err(EvalError::Unauthorized(format!(
                "account {} is not the issuer of asset {}",
                op.issuer, asset.aid
            )));
        }
        if let Some(new_issuer) = op.new_issuer {
            db.get_account_by_uid(new_issuer)?;
        }
        if let Some(new_flags) = op.new_flags {
            if new_flags & !asset.permissions != 0 {
                return Err(EvalError::Precondition(
                    "new flags exceed the asset's permissions".into(),
                ));
            }
        }
        if let Some(new_max) = op.new_max_supply {
            if !asset.can_change_max_supply() {
                return Err(EvalError::Unauthorized(format!(
                    "asset {} does not permit max supply changes",
                    asset.aid
                )));
            }
            let current = db.get_asset_dynamic(asset.aid)?.current_supply;
            if new_max < current {
                return Err(EvalError::Precondition(
                    "max supply below current supply".into(),
                ));
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AssetUpdate,
    ) -> Result<OperationResult, EvalError> {
        db.modify_asset(op.asset_to_update, |a| {
            if let Some(new_issuer) = op.new_issuer {
                a.issuer = new_issuer;
            }
            if let Some(new_flags) = op.new_flags {
                a.flags = new_flags & asset_flags::ASSET_PERMISSION_MASK;
            }
            if let Some(new_max) = op.new_max_supply {
                a.max_supply = new_max;
            }
            if let Some(description) = &op.new_description {
                a.description = description.clone();
            }
        })?;
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct AssetClaimFeesEvaluator;

impl Evaluator for AssetClaimFeesEvaluator {
    type Op = AssetClaimFees;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AssetClaimFees) -> Result<(), EvalError> {
        let asset = db.get_asset_by_aid(op.amount_to_claim.asset_aid)?;
        if asset.issuer != op.issuer {
            return Err(EvalError::Unauthorized(format!(
                "account {} is not the issuer of asset {}",
                op.issuer, asset.aid
            )));
        }
        let accumulated = db.get_asset_dynamic(asset.aid)?.accumulated_fees;
        if accumulated < op.amount_to_claim.amount {
            return Err(EvalError::Precondition(format!(
                "asset {} has only {} accumulated fees",
                asset.aid, accumulated
            )));
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AssetClaimFees,
    ) -> Result<OperationResult, EvalError> {
        db.modify_asset_dynamic(op.amount_to_claim.asset_aid, |d| {
            d.accumulated_fees -= op.amount_to_claim.amount;
        })?;
        db.adjust_balance(op.issuer, op.amount_to_claim)?;
        Ok(OperationResult::Void)
    }
}
