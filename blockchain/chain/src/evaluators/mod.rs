// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The operation evaluator framework. Every operation kind has a two-phase
//! evaluator: `evaluate` validates against committed state without mutating,
//! `apply` commits the mutations. The runner wraps each operation in its own
//! undo session and charges the declared fee before dispatch; any error
//! unwinds the session.

mod account;
mod asset;
mod committee;
mod content;
mod contract;
mod csaf;
mod platform;
mod proposal;
mod transfer;
mod voting_common;
mod witness;

pub(crate) use committee::execute_committee_proposal;
pub(crate) use proposal::{execute_proposal, proposal_satisfied};

use crate::errors::EvalError;
use crate::pipeline::OperationResult;
use crate::Database;
use agora_crypto::PublicKey;
use agora_message::{Fee, Operation};

/// Per-transaction context an evaluator may consult.
#[derive(Debug, Clone, Default)]
pub(crate) struct OpContext {
    /// Keys recovered from the transaction's signatures.
    pub signers: Vec<PublicKey>,
    /// True when the operation arrived from contract execution rather than
    /// a signed transaction.
    pub from_contract: bool,
}

/// Two-phase operation evaluator. Implementations cache lookups from
/// `evaluate` as ids, never as references.
pub(crate) trait Evaluator {
    type Op;

    fn evaluate(&mut self, db: &Database, ctx: &OpContext, op: &Self::Op)
        -> Result<(), EvalError>;

    fn apply(
        &mut self,
        db: &mut Database,
        ctx: &OpContext,
        op: &Self::Op,
    ) -> Result<OperationResult, EvalError>;
}

fn run<E: Evaluator<Op = O> + Default, O>(
    db: &mut Database,
    ctx: &OpContext,
    op: &O,
) -> Result<OperationResult, EvalError> {
    let mut evaluator = E::default();
    evaluator.evaluate(db, ctx, op)?;
    evaluator.apply(db, ctx, op)
}

impl Database {
    /// Charge the operation's declared fee from its payer. Balance- and
    /// prepaid-funded components burn supply back into the reserve.
    pub(crate) fn process_fee(&mut self, payer: u64, fee: &Fee) -> Result<(), EvalError> {
        fee.validate()?;
        if fee.from_balance > 0 {
            self.spend_core(payer, fee.from_balance)?;
        }
        if fee.from_prepaid > 0 {
            let prepaid = self.get_account_statistics_by_uid(payer)?.prepaid;
            if prepaid < fee.from_prepaid {
                return Err(EvalError::InsufficientPrepaid {
                    account: payer,
                    required: fee.from_prepaid,
                    available: prepaid,
                });
            }
            self.modify_account_statistics(payer, |s| s.prepaid -= fee.from_prepaid)?;
        }
        if fee.from_csaf > 0 {
            let csaf = self.get_account_statistics_by_uid(payer)?.csaf;
            if csaf < fee.from_csaf {
                return Err(EvalError::InsufficientCsaf {
                    account: payer,
                    required: fee.from_csaf,
                    available: csaf,
                });
            }
            self.modify_account_statistics(payer, |s| s.csaf -= fee.from_csaf)?;
        }
        let burned = fee.from_balance + fee.from_prepaid;
        if burned > 0 {
            self.adjust_core_supply(-burned);
        }
        Ok(())
    }

    /// Dispatch one operation to its evaluator. The caller owns the session.
    pub(crate) fn dispatch_operation(
        &mut self,
        ctx: &OpContext,
        op: &Operation,
    ) -> Result<OperationResult, EvalError> {
        op.validate()?;
        let (base_fee, size_fee) = self.gpo().fee_schedule.calculate_fee(op);
        if op.fee().total() < base_fee + size_fee {
            return Err(EvalError::Precondition(format!(
                "declared fee {} below the required {}",
                op.fee().total(),
                base_fee + size_fee
            )));
        }
        self.process_fee(op.fee_payer(), op.fee())?;
        match op {
            Operation::Transfer(op) => run::<transfer::TransferEvaluator, _>(self, ctx, op),
            Operation::AccountCreate(op) => run::<account::AccountCreateEvaluator, _>(self, ctx, op),
            Operation::AccountManage(op) => run::<account::AccountManageEvaluator, _>(self, ctx, op),
            Operation::AccountUpdateKey(op) => {
                run::<account::AccountUpdateKeyEvaluator, _>(self, ctx, op)
            }
            Operation::AccountUpdateAuth(op) => {
                run::<account::AccountUpdateAuthEvaluator, _>(self, ctx, op)
            }
            Operation::AccountAuthPlatform(op) => {
                run::<account::AccountAuthPlatformEvaluator, _>(self, ctx, op)
            }
            Operation::AccountCancelAuthPlatform(op) => {
                run::<account::AccountCancelAuthPlatformEvaluator, _>(self, ctx, op)
            }
            Operation::AccountUpdateProxy(op) => {
                run::<account::AccountUpdateProxyEvaluator, _>(self, ctx, op)
            }
            Operation::AccountEnableAllowedAssets(op) => {
                run::<account::AccountEnableAllowedAssetsEvaluator, _>(self, ctx, op)
            }
            Operation::AccountUpdateAllowedAssets(op) => {
                run::<account::AccountUpdateAllowedAssetsEvaluator, _>(self, ctx, op)
            }
            Operation::AccountWhitelist(op) => {
                run::<account::AccountWhitelistEvaluator, _>(self, ctx, op)
            }
            Operation::CsafCollect(op) => run::<csaf::CsafCollectEvaluator, _>(self, ctx, op),
            Operation::CsafLease(op) => run::<csaf::CsafLeaseEvaluator, _>(self, ctx, op),
            Operation::CommitteeMemberCreate(op) => {
                run::<committee::CommitteeMemberCreateEvaluator, _>(self, ctx, op)
            }
            Operation::CommitteeMemberUpdate(op) => {
                run::<committee::CommitteeMemberUpdateEvaluator, _>(self, ctx, op)
            }
            Operation::CommitteeMemberVoteUpdate(op) => {
                run::<committee::CommitteeMemberVoteUpdateEvaluator, _>(self, ctx, op)
            }
            Operation::CommitteeProposalCreate(op) => {
                run::<committee::CommitteeProposalCreateEvaluator, _>(self, ctx, op)
            }
            Operation::CommitteeProposalUpdate(op) => {
                run::<committee::CommitteeProposalUpdateEvaluator, _>(self, ctx, op)
            }
            Operation::WitnessCreate(op) => run::<witness::WitnessCreateEvaluator, _>(self, ctx, op),
            Operation::WitnessUpdate(op) => run::<witness::WitnessUpdateEvaluator, _>(self, ctx, op),
            Operation::WitnessVoteUpdate(op) => {
                run::<witness::WitnessVoteUpdateEvaluator, _>(self, ctx, op)
            }
            Operation::WitnessCollectPay(op) => {
                run::<witness::WitnessCollectPayEvaluator, _>(self, ctx, op)
            }
            Operation::WitnessReport(op) => run::<witness::WitnessReportEvaluator, _>(self, ctx, op),
            Operation::PlatformCreate(op) => {
                run::<platform::PlatformCreateEvaluator, _>(self, ctx, op)
            }
            Operation::PlatformUpdate(op) => {
                run::<platform::PlatformUpdateEvaluator, _>(self, ctx, op)
            }
            Operation::PlatformVoteUpdate(op) => {
                run::<platform::PlatformVoteUpdateEvaluator, _>(self, ctx, op)
            }
            Operation::Post(op) => run::<content::PostEvaluator, _>(self, ctx, op),
            Operation::PostUpdate(op) => run::<content::PostUpdateEvaluator, _>(self, ctx, op),
            Operation::ScoreCreate(op) => run::<content::ScoreCreateEvaluator, _>(self, ctx, op),
            Operation::Reward(op) => run::<content::RewardEvaluator, _>(self, ctx, op),
            Operation::RewardProxy(op) => run::<content::RewardProxyEvaluator, _>(self, ctx, op),
            Operation::Buyout(op) => run::<content::BuyoutEvaluator, _>(self, ctx, op),
            Operation::LicenseCreate(op) => run::<content::LicenseCreateEvaluator, _>(self, ctx, op),
            Operation::AssetCreate(op) => run::<asset::AssetCreateEvaluator, _>(self, ctx, op),
            Operation::AssetIssue(op) => run::<asset::AssetIssueEvaluator, _>(self, ctx, op),
            Operation::AssetReserve(op) => run::<asset::AssetReserveEvaluator, _>(self, ctx, op),
            Operation::AssetUpdate(op) => run::<asset::AssetUpdateEvaluator, _>(self, ctx, op),
            Operation::AssetClaimFees(op) => {
                run::<asset::AssetClaimFeesEvaluator, _>(self, ctx, op)
            }
            Operation::OverrideTransfer(op) => {
                run::<transfer::OverrideTransferEvaluator, _>(self, ctx, op)
            }
            Operation::ProposalCreate(op) => {
                run::<proposal::ProposalCreateEvaluator, _>(self, ctx, op)
            }
            Operation::ProposalUpdate(op) => {
                run::<proposal::ProposalUpdateEvaluator, _>(self, ctx, op)
            }
            Operation::ProposalDelete(op) => {
                run::<proposal::ProposalDeleteEvaluator, _>(self, ctx, op)
            }
            Operation::ContractCall(op) => run::<contract::ContractCallEvaluator, _>(self, ctx, op),
            Operation::InlineTransfer(op) => {
                run::<contract::InlineTransferEvaluator, _>(self, ctx, op)
            }
        }
    }
}
