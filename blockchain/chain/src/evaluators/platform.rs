// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use super::voting_common::{VoteTargetKind, VoteUpdateState};
use super::{Evaluator, OpContext};
use crate::errors::EvalError;
use crate::objects::{vote_idx, GovernanceVote, Platform, PledgeRole, PlatformVote, Voter};
use crate::pipeline::OperationResult;
use crate::pledges::{apply_pledge_change, schedule_full_release};
use crate::Database;
use agora_message::operations::{PlatformCreate, PlatformUpdate, PlatformVoteUpdate};
use agora_types::{AccountUid, ChainParameters};
use std::collections::BTreeMap;

#[derive(Default)]
pub(super) struct PlatformCreateEvaluator;

impl Evaluator for PlatformCreateEvaluator {
    type Op = PlatformCreate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &PlatformCreate) -> Result<(), EvalError> {
        db.get_account_by_uid(op.account)?;
        if db.head_block_num() > 0 && op.pledge < db.params().min_platform_pledge {
            return Err(EvalError::Precondition(format!(
                "pledge {} below the platform minimum {}",
                op.pledge,
                db.params().min_platform_pledge
            )));
        }
        db.require_pledge_backing(op.account, PledgeRole::Platform, op.pledge)?;
        if let Some((_, platform)) = db.find_platform_by_owner(op.account) {
            if platform.is_valid {
                return Err(EvalError::Precondition(
                    "this account already owns a platform".into(),
                ));
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &PlatformCreate,
    ) -> Result<OperationResult, EvalError> {
        let head_num = db.head_block_num();
        let now = db.head_block_time();
        let params = db.params().clone();
        let sequence = db.get_account_statistics_by_uid(op.account)?.last_platform_sequence + 1;
        let id = db.store.create(Platform {
            owner: op.account,
            sequence,
            is_valid: true,
            name: op.name.clone(),
            url: op.url.clone(),
            extra_data: op.extra_data.clone(),
            pledge: op.pledge,
            total_votes: 0,
            average_pledge: 0,
            average_pledge_next_update_block: head_num + params.witness_avg_pledge_update_interval,
            period_profits: BTreeMap::new(),
            vote_profits: BTreeMap::new(),
            create_time: now,
            last_update_time: now,
        });
        db.modify_account_statistics(op.account, |s| {
            s.last_platform_sequence = sequence;
            apply_pledge_change(
                s,
                PledgeRole::Platform,
                op.pledge,
                head_num,
                params.platform_pledge_release_delay,
            );
        })?;
        Ok(OperationResult::ObjectId(id))
    }
}

#[derive(Default)]
pub(super) struct PlatformUpdateEvaluator {
    platform_id: u64,
}

impl Evaluator for PlatformUpdateEvaluator {
    type Op = PlatformUpdate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &PlatformUpdate) -> Result<(), EvalError> {
        let (platform_id, platform) = db.get_platform_by_owner(op.account)?;
        self.platform_id = platform_id;
        if !platform.is_valid {
            return Err(EvalError::Precondition("platform has resigned".into()));
        }
        match op.new_pledge {
            Some(0) => {}
            Some(new_pledge) => {
                if new_pledge < db.params().min_platform_pledge {
                    return Err(EvalError::Precondition(format!(
                        "pledge {} below the platform minimum {}",
                        new_pledge,
                        db.params().min_platform_pledge
                    )));
                }
                db.require_pledge_backing(op.account, PledgeRole::Platform, new_pledge)?;
            }
            None => {}
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &PlatformUpdate,
    ) -> Result<OperationResult, EvalError> {
        let head_num = db.head_block_num();
        let now = db.head_block_time();
        let params = db.params().clone();
        match op.new_pledge {
            Some(0) => {
                let release_block = head_num + params.platform_pledge_release_delay;
                db.modify_account_statistics(op.account, |s| {
                    schedule_full_release(s, PledgeRole::Platform, release_block);
                })?;
                db.store.modify(self.platform_id, |p: &mut Platform| p.is_valid = false)?;
            }
            Some(new_pledge) => {
                db.modify_account_statistics(op.account, |s| {
                    apply_pledge_change(
                        s,
                        PledgeRole::Platform,
                        new_pledge,
                        head_num,
                        params.platform_pledge_release_delay,
                    );
                })?;
                db.store.modify(self.platform_id, |p: &mut Platform| p.pledge = new_pledge)?;
            }
            None => {}
        }
        db.store.modify(self.platform_id, |p: &mut Platform| {
            if let Some(name) = &op.new_name {
                p.name = name.clone();
            }
            if let Some(url) = &op.new_url {
                p.url = url.clone();
            }
            if let Some(extra) = &op.new_extra_data {
                p.extra_data = extra.clone();
            }
            p.last_update_time = now;
        })?;
        Ok(OperationResult::Void)
    }
}

pub(super) struct PlatformKind;

impl VoteTargetKind for PlatformKind {
    const TARGET_NAME: &'static str = "platform";

    fn max_voted(params: &ChainParameters) -> u16 {
        params.max_platforms_voted_per_account
    }

    fn find_target(db: &Database, uid: AccountUid) -> Option<(u32, bool)> {
        db.find_platform_by_owner(uid).map(|(_, p)| (p.sequence, p.is_valid))
    }

    fn find_edge(db: &Database, edge: &GovernanceVote) -> Option<u64> {
        db.find_platform_vote(
            edge.voter_uid,
            edge.voter_sequence,
            edge.target_uid,
            edge.target_sequence,
        )
    }

    fn create_edge(db: &mut Database, edge: GovernanceVote) {
        db.store.create(PlatformVote(edge));
    }

    fn remove_edge(db: &mut Database, edge_id: u64) -> Result<(), EvalError> {
        db.store.remove::<PlatformVote>(edge_id)?;
        Ok(())
    }

    fn adjust_target_votes(
        db: &mut Database,
        uid: AccountUid,
        sequence: u32,
        delta: i64,
    ) -> Result<(), EvalError> {
        if let Some(id) = db.find_platform_id(uid, sequence) {
            db.store.modify(id, |p: &mut Platform| {
                p.total_votes = p.total_votes.saturating_add_signed(delta);
            })?;
        }
        Ok(())
    }

    fn voted_count(voter: &Voter) -> u16 {
        voter.number_of_platforms_voted
    }

    fn set_voted_count(voter: &mut Voter, count: u16) {
        voter.number_of_platforms_voted = count;
    }

    fn edges_with_prefix(db: &Database, prefix: &[u8]) -> Vec<(u64, GovernanceVote)> {
        db.tables()
            .platform_votes
            .ids_with_prefix(vote_idx::BY_VOTER, prefix)
            .into_iter()
            .filter_map(|id| db.tables().platform_votes.get(id).map(|e| (id, e.0)))
            .collect()
    }

    fn edge_by_id(db: &Database, edge_id: u64) -> Result<GovernanceVote, EvalError> {
        Ok(db.store.get::<PlatformVote>(edge_id)?.0)
    }
}

#[derive(Default)]
pub(super) struct PlatformVoteUpdateEvaluator {
    state: VoteUpdateState,
}

impl Evaluator for PlatformVoteUpdateEvaluator {
    type Op = PlatformVoteUpdate;

    fn evaluate(&mut self, db: &Database, ctx: &OpContext, op: &PlatformVoteUpdate) -> Result<(), EvalError> {
        self.state.evaluate::<PlatformKind>(
            db,
            ctx,
            op.voter,
            &op.platforms_to_add,
            &op.platforms_to_remove,
        )
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &PlatformVoteUpdate,
    ) -> Result<OperationResult, EvalError> {
        self.state.apply::<PlatformKind>(db, op.voter)
    }
}
