// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{Evaluator, OpContext};
use crate::errors::EvalError;
use crate::objects::Proposal;
use crate::pipeline::OperationResult;
use crate::Database;
use agora_message::operations::{ProposalCreate, ProposalDelete, ProposalUpdate};
use agora_message::AuthClass;
use agora_types::AccountUid;
use log::error;
use std::collections::BTreeSet;

#[derive(Default)]
pub(super) struct ProposalCreateEvaluator;

impl Evaluator for ProposalCreateEvaluator {
    type Op = ProposalCreate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &ProposalCreate) -> Result<(), EvalError> {
        db.get_account_by_uid(op.fee_paying_account)?;
        let now = db.head_block_time();
        if op.expiration_time <= now {
            return Err(EvalError::Precondition("proposal expires in the past".into()));
        }
        if op.expiration_time - now > db.params().maximum_time_until_expiration {
            return Err(EvalError::Precondition("proposal expiration too far out".into()));
        }
        for inner in &op.proposed_ops {
            // every authority the proposal will need must belong to an
            // existing account
            let (account, _) = inner.required_auth();
            db.get_account_by_uid(account)?;
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &ProposalCreate,
    ) -> Result<OperationResult, EvalError> {
        let mut required_approvals: BTreeSet<(AccountUid, AuthClass)> = BTreeSet::new();
        for inner in &op.proposed_ops {
            required_approvals.insert(inner.required_auth());
        }
        let id = db.store.create(Proposal {
            expiration_time: op.expiration_time,
            proposed_ops: op.proposed_ops.clone(),
            required_approvals,
            available_approvals: BTreeSet::new(),
            available_key_approvals: BTreeSet::new(),
        });
        Ok(OperationResult::ObjectId(id))
    }
}

#[derive(Default)]
pub(super) struct ProposalUpdateEvaluator;

impl Evaluator for ProposalUpdateEvaluator {
    type Op = ProposalUpdate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &ProposalUpdate) -> Result<(), EvalError> {
        let proposal = db.store.get::<Proposal>(op.proposal)?;
        for (approvals, class) in [
            (&op.active_approvals_to_add, AuthClass::Active),
            (&op.owner_approvals_to_add, AuthClass::Owner),
            (&op.secondary_approvals_to_add, AuthClass::Secondary),
        ] {
            for uid in approvals {
                db.get_account_by_uid(*uid)?;
                if proposal.available_approvals.contains(&(*uid, class)) {
                    return Err(EvalError::Precondition(format!(
                        "approval of account {uid} already present"
                    )));
                }
            }
        }
        for (approvals, class) in [
            (&op.active_approvals_to_remove, AuthClass::Active),
            (&op.owner_approvals_to_remove, AuthClass::Owner),
            (&op.secondary_approvals_to_remove, AuthClass::Secondary),
        ] {
            for uid in approvals {
                if !proposal.available_approvals.contains(&(*uid, class)) {
                    return Err(EvalError::Precondition(format!(
                        "approval of account {uid} not present, can not remove"
                    )));
                }
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &ProposalUpdate,
    ) -> Result<OperationResult, EvalError> {
        db.store.modify(op.proposal, |p: &mut Proposal| {
            for uid in &op.active_approvals_to_add {
                p.available_approvals.insert((*uid, AuthClass::Active));
            }
            for uid in &op.owner_approvals_to_add {
                p.available_approvals.insert((*uid, AuthClass::Owner));
            }
            for uid in &op.secondary_approvals_to_add {
                p.available_approvals.insert((*uid, AuthClass::Secondary));
            }
            for uid in &op.active_approvals_to_remove {
                p.available_approvals.remove(&(*uid, AuthClass::Active));
            }
            for uid in &op.owner_approvals_to_remove {
                p.available_approvals.remove(&(*uid, AuthClass::Owner));
            }
            for uid in &op.secondary_approvals_to_remove {
                p.available_approvals.remove(&(*uid, AuthClass::Secondary));
            }
            for key in &op.key_approvals_to_add {
                p.available_key_approvals.insert(*key);
            }
            for key in &op.key_approvals_to_remove {
                p.available_key_approvals.remove(key);
            }
        })?;

        // an owner approval also stands in for weaker classes
        let proposal = db.store.get::<Proposal>(op.proposal)?.clone();
        if proposal_satisfied(&proposal) {
            execute_proposal(db, op.proposal, false)?;
        }
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct ProposalDeleteEvaluator;

impl Evaluator for ProposalDeleteEvaluator {
    type Op = ProposalDelete;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &ProposalDelete) -> Result<(), EvalError> {
        let proposal = db.store.get::<Proposal>(op.proposal)?;
        // only a required approver may veto
        let is_party = proposal
            .required_approvals
            .iter()
            .any(|(uid, _)| *uid == op.fee_paying_account);
        if !is_party {
            return Err(EvalError::Unauthorized(
                "only a required approver may delete the proposal".into(),
            ));
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &ProposalDelete,
    ) -> Result<OperationResult, EvalError> {
        db.store.remove::<Proposal>(op.proposal)?;
        Ok(OperationResult::Void)
    }
}

/// Required approvals are covered when the same or a stronger class of the
/// account has approved.
pub(crate) fn proposal_satisfied(proposal: &Proposal) -> bool {
    proposal.required_approvals.iter().all(|(uid, class)| {
        class
            .satisfying_classes()
            .iter()
            .any(|c| proposal.available_approvals.contains(&(*uid, *c)))
    })
}

/// Run a proposal's operations inside one nested session; all or nothing.
pub(crate) fn execute_proposal(
    db: &mut Database,
    proposal_id: u64,
    silent_fail: bool,
) -> Result<(), EvalError> {
    let proposal = db.store.get::<Proposal>(proposal_id)?.clone();
    db.store.begin_session();
    let mut failure = None;
    for op in &proposal.proposed_ops {
        let ctx = super::OpContext::default();
        if let Err(e) = db.dispatch_operation(&ctx, op) {
            failure = Some(e);
            break;
        }
    }
    match failure {
        None => {
            db.store.commit_session();
            db.store.remove::<Proposal>(proposal_id)?;
            Ok(())
        }
        Some(e) => {
            db.store.undo_session();
            if silent_fail {
                error!("failed to apply proposed transaction on execution: {e}; deleting it");
                db.store.remove::<Proposal>(proposal_id)?;
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}
