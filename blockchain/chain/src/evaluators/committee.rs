// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use super::voting_common::{VoteTargetKind, VoteUpdateState};
use super::{Evaluator, OpContext};
use crate::errors::EvalError;
use crate::objects::{
    committee_idx, takeover_idx, vote_idx, CommitteeMember, CommitteeMemberVote,
    CommitteeProposal, GovernanceVote, PledgeRole, RegistrarTakeover, Voter,
};
use crate::pipeline::OperationResult;
use crate::pledges::{apply_pledge_change, schedule_full_release};
use crate::Database;
use agora_db::KeyWriter;
use agora_message::operations::{
    AccountPrivilegeUpdate, CommitteeMemberCreate, CommitteeMemberUpdate,
    CommitteeMemberVoteUpdate, CommitteeProposalCreate, CommitteeProposalItem,
    CommitteeProposalUpdate, ParameterUpdates,
};
use agora_types::{AccountUid, ChainParameters, FULL_PERCENT};
use log::info;

#[derive(Default)]
pub(super) struct CommitteeMemberCreateEvaluator;

impl Evaluator for CommitteeMemberCreateEvaluator {
    type Op = CommitteeMemberCreate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &CommitteeMemberCreate) -> Result<(), EvalError> {
        db.get_account_by_uid(op.account)?;
        // initial committee members are seeded without the pledge floor
        if db.head_block_num() > 0 && op.pledge < db.params().min_committee_member_pledge {
            return Err(EvalError::Precondition(format!(
                "pledge {} below the committee minimum {}",
                op.pledge,
                db.params().min_committee_member_pledge
            )));
        }
        db.require_pledge_backing(op.account, PledgeRole::Committee, op.pledge)?;
        if let Some((_, member)) = db.find_committee_member_by_uid(op.account) {
            if member.is_valid {
                return Err(EvalError::Precondition(
                    "this account is already a committee member".into(),
                ));
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &CommitteeMemberCreate,
    ) -> Result<OperationResult, EvalError> {
        let head_num = db.head_block_num();
        let delay = db.params().committee_member_pledge_release_delay;
        let sequence =
            db.get_account_statistics_by_uid(op.account)?.last_committee_member_sequence + 1;
        let id = db.store.create(CommitteeMember {
            account: op.account,
            sequence,
            is_valid: true,
            pledge: op.pledge,
            total_votes: 0,
            url: op.url.clone(),
        });
        db.modify_account_statistics(op.account, |s| {
            s.last_committee_member_sequence = sequence;
            apply_pledge_change(s, PledgeRole::Committee, op.pledge, head_num, delay);
        })?;
        Ok(OperationResult::ObjectId(id))
    }
}

#[derive(Default)]
pub(super) struct CommitteeMemberUpdateEvaluator {
    member_id: u64,
}

impl Evaluator for CommitteeMemberUpdateEvaluator {
    type Op = CommitteeMemberUpdate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &CommitteeMemberUpdate) -> Result<(), EvalError> {
        let (member_id, member) = db.get_committee_member_by_uid(op.account)?;
        self.member_id = member_id;
        if !member.is_valid {
            return Err(EvalError::Precondition("committee member has resigned".into()));
        }
        let params = db.params();
        match op.new_pledge {
            Some(0) => {
                let valid = db.count_valid_committee_members();
                if valid <= params.committee_size as usize {
                    return Err(EvalError::Precondition(format!(
                        "need at least {} committee members, can not resign now",
                        params.committee_size
                    )));
                }
            }
            Some(new_pledge) => {
                if new_pledge < params.min_committee_member_pledge {
                    return Err(EvalError::Precondition(format!(
                        "pledge {} below the committee minimum {}",
                        new_pledge, params.min_committee_member_pledge
                    )));
                }
                if new_pledge == member.pledge {
                    return Err(EvalError::Precondition("new_pledge did not change".into()));
                }
                db.require_pledge_backing(op.account, PledgeRole::Committee, new_pledge)?;
            }
            None => {}
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &CommitteeMemberUpdate,
    ) -> Result<OperationResult, EvalError> {
        let head_num = db.head_block_num();
        let params = db.params().clone();
        match op.new_pledge {
            Some(0) => {
                // an active member's pledge stays locked until the seat turns over
                let in_active_committee =
                    db.gpo().active_committee_members.contains(&op.account);
                let release_block = if in_active_committee {
                    db.dpo().next_committee_update_block
                        + params.committee_member_pledge_release_delay
                } else {
                    head_num + params.committee_member_pledge_release_delay
                };
                db.modify_account_statistics(op.account, |s| {
                    schedule_full_release(s, PledgeRole::Committee, release_block);
                })?;
                db.store.modify(self.member_id, |m: &mut CommitteeMember| m.is_valid = false)?;
            }
            Some(new_pledge) => {
                db.modify_account_statistics(op.account, |s| {
                    apply_pledge_change(
                        s,
                        PledgeRole::Committee,
                        new_pledge,
                        head_num,
                        params.committee_member_pledge_release_delay,
                    );
                })?;
                db.store.modify(self.member_id, |m: &mut CommitteeMember| m.pledge = new_pledge)?;
            }
            None => {}
        }
        if let Some(url) = &op.new_url {
            db.store.modify(self.member_id, |m: &mut CommitteeMember| m.url = url.clone())?;
        }
        Ok(OperationResult::Void)
    }
}

pub(super) struct CommitteeKind;

impl VoteTargetKind for CommitteeKind {
    const TARGET_NAME: &'static str = "committee_member";

    fn max_voted(params: &ChainParameters) -> u16 {
        params.max_committee_members_voted_per_account
    }

    fn find_target(db: &Database, uid: AccountUid) -> Option<(u32, bool)> {
        db.find_committee_member_by_uid(uid).map(|(_, m)| (m.sequence, m.is_valid))
    }

    fn find_edge(db: &Database, edge: &GovernanceVote) -> Option<u64> {
        db.find_committee_member_vote(
            edge.voter_uid,
            edge.voter_sequence,
            edge.target_uid,
            edge.target_sequence,
        )
    }

    fn create_edge(db: &mut Database, edge: GovernanceVote) {
        db.store.create(CommitteeMemberVote(edge));
    }

    fn remove_edge(db: &mut Database, edge_id: u64) -> Result<(), EvalError> {
        db.store.remove::<CommitteeMemberVote>(edge_id)?;
        Ok(())
    }

    fn adjust_target_votes(
        db: &mut Database,
        uid: AccountUid,
        sequence: u32,
        delta: i64,
    ) -> Result<(), EvalError> {
        if let Some(id) = db.find_committee_member_id(uid, sequence) {
            db.store.modify(id, |m: &mut CommitteeMember| {
                m.total_votes = m.total_votes.saturating_add_signed(delta);
            })?;
        }
        Ok(())
    }

    fn voted_count(voter: &Voter) -> u16 {
        voter.number_of_committee_members_voted
    }

    fn set_voted_count(voter: &mut Voter, count: u16) {
        voter.number_of_committee_members_voted = count;
    }

    fn edges_with_prefix(db: &Database, prefix: &[u8]) -> Vec<(u64, GovernanceVote)> {
        db.tables()
            .committee_member_votes
            .ids_with_prefix(vote_idx::BY_VOTER, prefix)
            .into_iter()
            .filter_map(|id| db.tables().committee_member_votes.get(id).map(|e| (id, e.0)))
            .collect()
    }

    fn edge_by_id(db: &Database, edge_id: u64) -> Result<GovernanceVote, EvalError> {
        Ok(db.store.get::<CommitteeMemberVote>(edge_id)?.0)
    }
}

#[derive(Default)]
pub(super) struct CommitteeMemberVoteUpdateEvaluator {
    state: VoteUpdateState,
}

impl Evaluator for CommitteeMemberVoteUpdateEvaluator {
    type Op = CommitteeMemberVoteUpdate;

    fn evaluate(&mut self, db: &Database, ctx: &OpContext, op: &CommitteeMemberVoteUpdate) -> Result<(), EvalError> {
        self.state.evaluate::<CommitteeKind>(
            db,
            ctx,
            op.voter,
            &op.committee_members_to_add,
            &op.committee_members_to_remove,
        )
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &CommitteeMemberVoteUpdate,
    ) -> Result<OperationResult, EvalError> {
        self.state.apply::<CommitteeKind>(db, op.voter)
    }
}

#[derive(Default)]
pub(super) struct CommitteeProposalCreateEvaluator;

impl Evaluator for CommitteeProposalCreateEvaluator {
    type Op = CommitteeProposalCreate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &CommitteeProposalCreate) -> Result<(), EvalError> {
        let gpo = db.gpo();
        if !gpo.active_committee_members.contains(&op.proposer) {
            return Err(EvalError::Unauthorized(format!(
                "account {} is not an active committee member",
                op.proposer
            )));
        }
        let dpo = db.dpo();
        if op.voting_closing_block_num < db.head_block_num() {
            return Err(EvalError::Precondition(
                "voting closing block is in the past".into(),
            ));
        }
        for block in [
            op.voting_closing_block_num,
            op.execution_block_num,
            op.expiration_block_num,
        ] {
            if block > dpo.next_committee_update_block {
                return Err(EvalError::Precondition(
                    "proposal window extends past the next committee update".into(),
                ));
            }
        }
        for item in &op.items {
            match item {
                CommitteeProposalItem::AccountPrivilegeUpdate(update) => {
                    db.get_account_by_uid(update.account)?;
                    if let Some(takeover) = update.takeover_registrar {
                        db.get_account_by_uid(takeover)?;
                    }
                }
                CommitteeProposalItem::GlobalParametersUpdate(update) => {
                    if let Some(expiration) = update.maximum_time_until_expiration {
                        if expiration <= db.params().block_interval as u32 {
                            return Err(EvalError::Precondition(
                                "expiration window must exceed a block interval".into(),
                            ));
                        }
                    }
                }
                CommitteeProposalItem::FeeScheduleUpdate(_)
                | CommitteeProposalItem::ContentParametersUpdate(_) => {}
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &CommitteeProposalCreate,
    ) -> Result<OperationResult, EvalError> {
        let committee_size = db.gpo().active_committee_members.len().max(1) as u32;
        // each "for" opinion contributes 100% / committee size; approval
        // needs a two-thirds supermajority
        let approve_threshold = 2 * FULL_PERCENT / 3;
        let number = db.dpo().next_committee_proposal_number;

        let mut opinions = std::collections::BTreeMap::new();
        let mut approved_ratio = 0u32;
        if let Some(opinion) = op.proposer_opinion {
            opinions.insert(op.proposer, opinion);
            if opinion {
                approved_ratio = FULL_PERCENT / committee_size;
            }
        }
        let is_approved = approved_ratio >= approve_threshold;
        let id = db.store.create(CommitteeProposal {
            proposal_number: number,
            proposer: op.proposer,
            items: op.items.clone(),
            voting_closing_block_num: op.voting_closing_block_num,
            execution_block_num: op.execution_block_num,
            expiration_block_num: op.expiration_block_num,
            opinions,
            approve_threshold,
            is_approved,
        });
        db.modify_dpo(|dpo| dpo.next_committee_proposal_number += 1);

        if is_approved && db.head_block_num() >= op.execution_block_num {
            execute_committee_proposal(db, id, false)?;
        }
        Ok(OperationResult::ObjectId(id))
    }
}

#[derive(Default)]
pub(super) struct CommitteeProposalUpdateEvaluator {
    proposal_id: u64,
}

impl Evaluator for CommitteeProposalUpdateEvaluator {
    type Op = CommitteeProposalUpdate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &CommitteeProposalUpdate) -> Result<(), EvalError> {
        if !db.gpo().active_committee_members.contains(&op.account) {
            return Err(EvalError::Unauthorized(format!(
                "account {} is not an active committee member",
                op.account
            )));
        }
        let (proposal_id, proposal) =
            db.find_committee_proposal(op.proposal_number).ok_or(EvalError::Missing {
                kind: "committee_proposal",
                detail: format!("number {}", op.proposal_number),
            })?;
        self.proposal_id = proposal_id;
        if db.head_block_num() > proposal.voting_closing_block_num {
            return Err(EvalError::Precondition(format!(
                "voting for proposal {} has closed",
                op.proposal_number
            )));
        }
        if proposal.opinions.get(&op.account) == Some(&op.opinion) {
            return Err(EvalError::Precondition("opinion did not change".into()));
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &CommitteeProposalUpdate,
    ) -> Result<OperationResult, EvalError> {
        let committee_size = db.gpo().active_committee_members.len().max(1) as u32;
        db.store.modify(self.proposal_id, |p: &mut CommitteeProposal| {
            p.opinions.insert(op.account, op.opinion);
            let yeses = p.opinions.values().filter(|o| **o).count() as u32;
            let yes_ratio = yeses * FULL_PERCENT / committee_size;
            p.is_approved = yes_ratio >= p.approve_threshold;
        })?;
        let proposal = db.store.get::<CommitteeProposal>(self.proposal_id)?.clone();
        if proposal.is_approved && db.head_block_num() >= proposal.execution_block_num {
            execute_committee_proposal(db, self.proposal_id, false)?;
        }
        Ok(OperationResult::Void)
    }
}

/// Apply all of an approved proposal's items atomically, then remove it.
/// With `silent_fail`, failures are logged and swallowed (maintenance-path
/// execution must not reject the block).
pub(crate) fn execute_committee_proposal(
    db: &mut Database,
    proposal_id: u64,
    silent_fail: bool,
) -> Result<(), EvalError> {
    let proposal = db.store.get::<CommitteeProposal>(proposal_id)?.clone();
    debug_assert!(proposal.is_approved);

    db.store.begin_session();
    let result = apply_proposal_items(db, &proposal.items);
    match result {
        Ok(()) => {
            db.store.commit_session();
            info!("executed committee proposal #{}", proposal.proposal_number);
            db.store.remove::<CommitteeProposal>(proposal_id)?;
            Ok(())
        }
        Err(e) => {
            db.store.undo_session();
            if silent_fail {
                log::error!(
                    "failed to execute committee proposal #{}: {e}; deleting it",
                    proposal.proposal_number
                );
                db.store.remove::<CommitteeProposal>(proposal_id)?;
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}

fn apply_proposal_items(
    db: &mut Database,
    items: &[CommitteeProposalItem],
) -> Result<(), EvalError> {
    for item in items {
        match item {
            CommitteeProposalItem::AccountPrivilegeUpdate(update) => {
                apply_privilege_update(db, update)?;
            }
            CommitteeProposalItem::FeeScheduleUpdate(schedule) => {
                let schedule = schedule.clone();
                db.modify_gpo(|gpo| gpo.fee_schedule = schedule);
            }
            CommitteeProposalItem::GlobalParametersUpdate(update) => {
                apply_parameter_updates(db, update);
            }
            CommitteeProposalItem::ContentParametersUpdate(content) => {
                let content = content.clone();
                db.modify_gpo(|gpo| gpo.parameters.content_award = content);
            }
        }
    }
    Ok(())
}

fn apply_privilege_update(
    db: &mut Database,
    update: &AccountPrivilegeUpdate,
) -> Result<(), EvalError> {
    db.get_account_by_uid(update.account)?;

    if let Some(can_vote) = update.can_vote {
        db.modify_account_statistics(update.account, |s| s.can_vote = can_vote)?;
        if !can_vote {
            // an account stripped of voting rights loses its voter object
            let stats = db.get_account_statistics_by_uid(update.account)?.clone();
            if stats.is_voter {
                if let Some((voter_id, _)) =
                    db.find_voter(update.account, stats.last_voter_sequence)
                {
                    db.invalidate_voter(voter_id)?;
                }
            }
        }
    }
    if update.is_admin.is_some() || update.is_full_member.is_some() || update.is_registrar.is_some()
    {
        db.modify_account(update.account, |a| {
            if let Some(is_admin) = update.is_admin {
                a.is_admin = is_admin;
            }
            if let Some(is_full_member) = update.is_full_member {
                a.is_full_member = is_full_member;
            }
            if let Some(is_registrar) = update.is_registrar {
                a.is_registrar = is_registrar;
            }
        })?;
    }

    match update.is_registrar {
        Some(false) => {
            let takeover = update.takeover_registrar.ok_or_else(|| {
                EvalError::Precondition("registrar revocation needs a takeover registrar".into())
            })?;
            // keep the takeover closure flat: chains pointing at the demoted
            // registrar are redirected to the new one
            let key = KeyWriter::default().u64(update.account).finish();
            let pointing = db
                .tables()
                .registrar_takeovers
                .ids_with_prefix(takeover_idx::BY_TAKEOVER, &key);
            for id in pointing {
                db.store
                    .modify(id, |t: &mut RegistrarTakeover| t.takeover_registrar = takeover)?;
            }
            match db.find_registrar_takeover(update.account) {
                Some((id, _)) => {
                    db.store
                        .modify(id, |t: &mut RegistrarTakeover| t.takeover_registrar = takeover)?;
                }
                None => {
                    db.store.create(RegistrarTakeover {
                        original_registrar: update.account,
                        takeover_registrar: takeover,
                    });
                }
            }
        }
        Some(true) => {
            // becoming a registrar again dissolves the takeover
            if let Some((id, _)) = db.find_registrar_takeover(update.account) {
                db.store.remove::<RegistrarTakeover>(id)?;
            }
        }
        None => {}
    }
    Ok(())
}

fn apply_parameter_updates(db: &mut Database, update: &ParameterUpdates) {
    db.modify_gpo(|gpo| {
        let p = &mut gpo.parameters;
        if let Some(v) = update.maximum_block_size {
            p.maximum_block_size = v;
        }
        if let Some(v) = update.maximum_transaction_size {
            p.maximum_transaction_size = v;
        }
        if let Some(v) = update.maximum_time_until_expiration {
            p.maximum_time_until_expiration = v;
        }
        if let Some(v) = update.by_vote_top_witness_pay_per_block {
            p.by_vote_top_witness_pay_per_block = v;
        }
        if let Some(v) = update.by_vote_rest_witness_pay_per_block {
            p.by_vote_rest_witness_pay_per_block = v;
        }
        if let Some(v) = update.budget_adjust_target {
            p.budget_adjust_target = v;
        }
        if let Some(v) = update.min_witness_pledge {
            p.min_witness_pledge = v;
        }
        if let Some(v) = update.min_committee_member_pledge {
            p.min_committee_member_pledge = v;
        }
        if let Some(v) = update.min_platform_pledge {
            p.min_platform_pledge = v;
        }
        if let Some(v) = update.max_witness_inactive_blocks {
            p.max_witness_inactive_blocks = v;
        }
        if let Some(v) = update.governance_voting_expiration_blocks {
            p.governance_voting_expiration_blocks = v;
        }
        if let Some(v) = update.csaf_rate {
            p.csaf_rate = v;
        }
    });
}

impl Database {
    pub(crate) fn count_valid_committee_members(&self) -> usize {
        let prefix = KeyWriter::default().bool(true).finish();
        self.tables()
            .committee_members
            .ids_with_prefix(committee_idx::BY_VALID, &prefix)
            .len()
    }
}
