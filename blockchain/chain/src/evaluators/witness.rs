// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use super::voting_common::{VoteTargetKind, VoteUpdateState};
use super::{Evaluator, OpContext};
use crate::errors::EvalError;
use crate::objects::{vote_idx, GovernanceVote, PledgeRole, Voter, Witness, WitnessVote};
use crate::pipeline::OperationResult;
use crate::pledges::{apply_pledge_change, schedule_full_release};
use crate::Database;
use agora_message::operations::{
    WitnessCollectPay, WitnessCreate, WitnessReport, WitnessUpdate, WitnessVoteUpdate,
};
use agora_types::{AccountUid, ChainParameters};

#[derive(Default)]
pub(super) struct WitnessCreateEvaluator;

impl Evaluator for WitnessCreateEvaluator {
    type Op = WitnessCreate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &WitnessCreate) -> Result<(), EvalError> {
        db.get_account_by_uid(op.account)?;
        let params = db.params();
        // genesis seeds witnesses below the floor
        if db.head_block_num() > 0 && op.pledge < params.min_witness_pledge {
            return Err(EvalError::Precondition(format!(
                "pledge {} below the witness minimum {}",
                op.pledge, params.min_witness_pledge
            )));
        }
        db.require_pledge_backing(op.account, PledgeRole::Witness, op.pledge)?;
        if let Some((_, witness)) = db.find_witness_by_uid(op.account) {
            if witness.is_valid {
                return Err(EvalError::Precondition(
                    "this account is already a witness".into(),
                ));
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &WitnessCreate,
    ) -> Result<OperationResult, EvalError> {
        let head_num = db.head_block_num();
        let params = db.params().clone();
        let stats = db.get_account_statistics_by_uid(op.account)?.clone();
        let sequence = stats.last_witness_sequence + 1;

        let dpo = db.dpo();
        let witness = Witness {
            account: op.account,
            sequence,
            is_valid: true,
            signing_key: op.signing_key,
            pledge: op.pledge,
            total_votes: 0,
            url: op.url.clone(),
            last_confirmed_block_num: 0,
            last_aslot: 0,
            total_produced: 0,
            total_missed: 0,
            average_pledge: 0,
            average_pledge_next_update_block: head_num
                + params.witness_avg_pledge_update_interval,
            // join the lotteries at the current cursors
            by_vote_scheduled_time: dpo.current_by_vote_time,
            by_pledge_scheduled_time: dpo.current_by_pledge_time,
        };
        let id = db.store.create(witness);

        let prior_locked = stats.total_witness_pledge - stats.releasing_witness_pledge;
        db.modify_account_statistics(op.account, |s| {
            s.last_witness_sequence = sequence;
            apply_pledge_change(
                s,
                PledgeRole::Witness,
                op.pledge,
                head_num,
                params.witness_pledge_release_delay,
            );
        })?;
        db.note_witness_pledge_delta(op.pledge - prior_locked);
        Ok(OperationResult::ObjectId(id))
    }
}

#[derive(Default)]
pub(super) struct WitnessUpdateEvaluator {
    witness_id: u64,
}

impl Evaluator for WitnessUpdateEvaluator {
    type Op = WitnessUpdate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &WitnessUpdate) -> Result<(), EvalError> {
        let (witness_id, witness) = db.get_witness_by_uid(op.account)?;
        self.witness_id = witness_id;
        if !witness.is_valid {
            return Err(EvalError::Precondition("witness has resigned".into()));
        }
        let params = db.params();
        match op.new_pledge {
            Some(0) => {
                // resigning must keep enough active witnesses to fill a round
                let schedule_size = (params.by_vote_top_witness_count
                    + params.by_vote_rest_witness_count
                    + params.by_pledge_witness_count) as usize;
                let valid = db.count_valid_witnesses();
                if valid <= schedule_size {
                    return Err(EvalError::Precondition(format!(
                        "need at least {schedule_size} witnesses, can not resign now"
                    )));
                }
            }
            Some(new_pledge) => {
                if new_pledge < params.min_witness_pledge {
                    return Err(EvalError::Precondition(format!(
                        "pledge {} below the witness minimum {}",
                        new_pledge, params.min_witness_pledge
                    )));
                }
                if new_pledge == witness.pledge && op.new_signing_key.is_none() && op.new_url.is_none()
                {
                    return Err(EvalError::Precondition("new_pledge did not change".into()));
                }
                db.require_pledge_backing(op.account, PledgeRole::Witness, new_pledge)?;
            }
            None => {}
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &WitnessUpdate,
    ) -> Result<OperationResult, EvalError> {
        let head_num = db.head_block_num();
        let params = db.params().clone();
        let witness = db.store.get::<Witness>(self.witness_id)?.clone();

        match op.new_pledge {
            Some(0) => {
                let release_block = head_num + params.witness_pledge_release_delay;
                db.modify_account_statistics(op.account, |s| {
                    schedule_full_release(s, PledgeRole::Witness, release_block);
                })?;
                db.modify_witness(self.witness_id, |w| w.is_valid = false)?;
                db.note_witness_pledge_delta(-witness.pledge);
            }
            Some(new_pledge) => {
                db.modify_account_statistics(op.account, |s| {
                    apply_pledge_change(
                        s,
                        PledgeRole::Witness,
                        new_pledge,
                        head_num,
                        params.witness_pledge_release_delay,
                    );
                })?;
                db.modify_witness(self.witness_id, |w| w.pledge = new_pledge)?;
                db.note_witness_pledge_delta(new_pledge - witness.pledge);
            }
            None => {}
        }
        if op.new_signing_key.is_some() || op.new_url.is_some() {
            db.modify_witness(self.witness_id, |w| {
                if let Some(key) = op.new_signing_key {
                    w.signing_key = key;
                }
                if let Some(url) = &op.new_url {
                    w.url = url.clone();
                }
            })?;
        }
        Ok(OperationResult::Void)
    }
}

pub(super) struct WitnessKind;

impl VoteTargetKind for WitnessKind {
    const TARGET_NAME: &'static str = "witness";

    fn max_voted(params: &ChainParameters) -> u16 {
        params.max_witnesses_voted_per_account
    }

    fn find_target(db: &Database, uid: AccountUid) -> Option<(u32, bool)> {
        db.find_witness_by_uid(uid).map(|(_, w)| (w.sequence, w.is_valid))
    }

    fn find_edge(db: &Database, edge: &GovernanceVote) -> Option<u64> {
        db.find_witness_vote(
            edge.voter_uid,
            edge.voter_sequence,
            edge.target_uid,
            edge.target_sequence,
        )
    }

    fn create_edge(db: &mut Database, edge: GovernanceVote) {
        db.store.create(WitnessVote(edge));
    }

    fn remove_edge(db: &mut Database, edge_id: u64) -> Result<(), EvalError> {
        db.store.remove::<WitnessVote>(edge_id)?;
        Ok(())
    }

    fn adjust_target_votes(
        db: &mut Database,
        uid: AccountUid,
        sequence: u32,
        delta: i64,
    ) -> Result<(), EvalError> {
        if let Some(id) = db.find_witness_id(uid, sequence) {
            db.adjust_witness_votes(id, delta)?;
        }
        Ok(())
    }

    fn voted_count(voter: &Voter) -> u16 {
        voter.number_of_witnesses_voted
    }

    fn set_voted_count(voter: &mut Voter, count: u16) {
        voter.number_of_witnesses_voted = count;
    }

    fn edges_with_prefix(db: &Database, prefix: &[u8]) -> Vec<(u64, GovernanceVote)> {
        db.tables()
            .witness_votes
            .ids_with_prefix(vote_idx::BY_VOTER, prefix)
            .into_iter()
            .filter_map(|id| db.tables().witness_votes.get(id).map(|e| (id, e.0)))
            .collect()
    }

    fn edge_by_id(db: &Database, edge_id: u64) -> Result<GovernanceVote, EvalError> {
        Ok(db.store.get::<WitnessVote>(edge_id)?.0)
    }
}

#[derive(Default)]
pub(super) struct WitnessVoteUpdateEvaluator {
    state: VoteUpdateState,
}

impl Evaluator for WitnessVoteUpdateEvaluator {
    type Op = WitnessVoteUpdate;

    fn evaluate(&mut self, db: &Database, ctx: &OpContext, op: &WitnessVoteUpdate) -> Result<(), EvalError> {
        self.state.evaluate::<WitnessKind>(
            db,
            ctx,
            op.voter,
            &op.witnesses_to_add,
            &op.witnesses_to_remove,
        )
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &WitnessVoteUpdate,
    ) -> Result<OperationResult, EvalError> {
        self.state.apply::<WitnessKind>(db, op.voter)
    }
}

#[derive(Default)]
pub(super) struct WitnessCollectPayEvaluator;

impl Evaluator for WitnessCollectPayEvaluator {
    type Op = WitnessCollectPay;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &WitnessCollectPay) -> Result<(), EvalError> {
        let stats = db.get_account_statistics_by_uid(op.account)?;
        if stats.uncollected_witness_pay < op.amount {
            return Err(EvalError::Precondition(format!(
                "only {} uncollected pay available",
                stats.uncollected_witness_pay
            )));
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &WitnessCollectPay,
    ) -> Result<OperationResult, EvalError> {
        db.modify_account_statistics(op.account, |s| s.uncollected_witness_pay -= op.amount)?;
        db.adjust_balance(op.account, agora_types::Amount::core(op.amount))?;
        Ok(OperationResult::Void)
    }
}

/// First accepted double-production report forfeits the offender's
/// accumulated pay back into the reserve.
#[derive(Default)]
pub(super) struct WitnessReportEvaluator;

impl Evaluator for WitnessReportEvaluator {
    type Op = WitnessReport;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &WitnessReport) -> Result<(), EvalError> {
        db.get_account_by_uid(op.reporter)?;
        db.get_witness_by_uid(op.witness)?;
        if op.block_num > db.head_block_num() {
            return Err(EvalError::Precondition("reported block is in the future".into()));
        }
        let stats = db.get_account_statistics_by_uid(op.witness)?;
        if stats.witness_last_reported_block_num >= op.block_num {
            return Err(EvalError::Precondition("offense already reported".into()));
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &WitnessReport,
    ) -> Result<OperationResult, EvalError> {
        let forfeited = db.get_account_statistics_by_uid(op.witness)?.uncollected_witness_pay;
        db.modify_account_statistics(op.witness, |s| {
            s.uncollected_witness_pay = 0;
            s.witness_last_reported_block_num = op.block_num;
            s.witness_total_reported += 1;
        })?;
        if forfeited > 0 {
            db.adjust_core_supply(-forfeited);
        }
        Ok(OperationResult::Void)
    }
}

impl Database {
    pub(crate) fn count_valid_witnesses(&self) -> usize {
        let prefix = agora_db::KeyWriter::default().bool(true).finish();
        self.tables()
            .witnesses
            .ids_with_prefix(crate::objects::witness_idx::BY_VALID, &prefix)
            .len()
    }
}
