// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{Evaluator, OpContext};
use crate::errors::EvalError;
use crate::host::{ContractCallContext, CpuBudget, HostContext};
use crate::pipeline::OperationResult;
use crate::Database;
use agora_message::operations::{ContractCall, InlineTransfer};

/// Per-transaction CPU allowance for contract execution, microseconds.
const MAX_TRX_CPU_TIME_US: u64 = 150_000;

#[derive(Default)]
pub(super) struct ContractCallEvaluator;

impl Evaluator for ContractCallEvaluator {
    type Op = ContractCall;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &ContractCall) -> Result<(), EvalError> {
        db.get_account_by_uid(op.sender)?;
        db.get_account_by_uid(op.contract)?;
        if db.host.is_none() {
            return Err(EvalError::WasmExecution(
                "no contract execution engine is registered".into(),
            ));
        }
        if let Some(amount) = op.amount {
            let balance = db.get_balance(op.sender, amount.asset_aid);
            if balance < amount.amount {
                return Err(EvalError::InsufficientBalance {
                    account: op.sender,
                    required: amount.amount,
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
        op: &ContractCall,
    ) -> Result<OperationResult, EvalError> {
        if let Some(amount) = op.amount {
            db.transfer_checked(op.sender, op.contract, amount)?;
        }
        let call = ContractCallContext {
            sender: op.sender,
            contract: op.contract,
            method: op.method.clone(),
            data: op.data.clone(),
            attached: op.amount,
            depth: 0,
        };
        let mut budget = CpuBudget::new(MAX_TRX_CPU_TIME_US);
        // the host is detached while it runs so it can borrow the chain
        let mut host = db.host.take().expect("checked in evaluate");
        let result = host.execute(&call, &mut HostContext::new(db), &mut budget);
        db.host = Some(host);
        result?;
        Ok(OperationResult::Void)
    }
}

/// Contract-originated transfers are applied by the host; a signed
/// transaction may not carry one directly.
#[derive(Default)]
pub(super) struct InlineTransferEvaluator;

impl Evaluator for InlineTransferEvaluator {
    type Op = InlineTransfer;

    fn evaluate(&mut self, db: &Database, ctx: &OpContext, op: &InlineTransfer) -> Result<(), EvalError> {
        if !ctx.from_contract {
            return Err(EvalError::Unauthorized(
                "inline_transfer is only valid from contract execution".into(),
            ));
        }
        db.get_account_by_uid(op.from)?;
        db.get_account_by_uid(op.to)?;
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
        op: &InlineTransfer,
    ) -> Result<OperationResult, EvalError> {
        db.transfer_checked(op.from, op.to, op.amount)?;
        Ok(OperationResult::Void)
    }
}
