// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The vote-update machinery shared by the witness, committee-member and
//! platform vote evaluators. The flows differ only in which table holds the
//! target and which edge table links it, so the target kind is a seam.

use super::OpContext;
use crate::errors::EvalError;
use crate::objects::{GovernanceVote, Voter};
use crate::pipeline::OperationResult;
use crate::Database;
use agora_types::{AccountUid, ChainParameters, PROXY_TO_SELF_UID};

/// One vote-target kind: lookup, edge table access and per-voter caps.
pub(super) trait VoteTargetKind {
    const TARGET_NAME: &'static str;

    fn max_voted(params: &ChainParameters) -> u16;

    /// `(target sequence, is_valid)` of the uid's current incarnation.
    fn find_target(db: &Database, uid: AccountUid) -> Option<(u32, bool)>;

    fn find_edge(db: &Database, edge: &GovernanceVote) -> Option<u64>;

    fn create_edge(db: &mut Database, edge: GovernanceVote);

    fn remove_edge(db: &mut Database, edge_id: u64) -> Result<(), EvalError>;

    /// Adjust the current incarnation's vote total.
    fn adjust_target_votes(
        db: &mut Database,
        uid: AccountUid,
        sequence: u32,
        delta: i64,
    ) -> Result<(), EvalError>;

    fn voted_count(voter: &Voter) -> u16;

    fn set_voted_count(voter: &mut Voter, count: u16);

    /// All of a voter's edges, by the (voter, sequence) key prefix.
    fn edges_with_prefix(db: &Database, prefix: &[u8]) -> Vec<(u64, GovernanceVote)>;

    fn edge_by_id(db: &Database, edge_id: u64) -> Result<GovernanceVote, EvalError>;
}

/// Evaluated context carried from `evaluate` to `apply`.
#[derive(Default)]
pub(super) struct VoteUpdateState {
    voter_id: Option<u64>,
    invalid_voter_id: Option<u64>,
    invalid_current_proxy_id: Option<u64>,
    /// (uid, sequence) per target to add.
    add_targets: Vec<(AccountUid, u32)>,
    /// Edge ids to remove on request.
    remove_edges: Vec<u64>,
    /// Stale edges whose target was re-registered or erased.
    cleanup_edges: Vec<u64>,
}

impl VoteUpdateState {
    /// The shared `evaluate` phase.
    pub(super) fn evaluate<K: VoteTargetKind>(
        &mut self,
        db: &Database,
        _ctx: &OpContext,
        voter_uid: AccountUid,
        to_add: &[AccountUid],
        to_remove: &[AccountUid],
    ) -> Result<(), EvalError> {
        let stats = db.get_account_statistics_by_uid(voter_uid)?;
        if !stats.can_vote {
            return Err(EvalError::Unauthorized("this account can not vote".into()));
        }
        let params = db.params();
        if stats.core_balance < params.min_governance_voting_balance {
            return Err(EvalError::InsufficientBalance {
                account: voter_uid,
                required: params.min_governance_voting_balance,
                available: stats.core_balance,
            });
        }
        let max_voted = K::max_voted(params) as usize;
        if to_add.len() > max_voted {
            return Err(EvalError::Precondition(format!(
                "voting for {} {}s, more than the allowed {max_voted}",
                to_add.len(),
                K::TARGET_NAME
            )));
        }
        for uid in to_add {
            let (sequence, is_valid) = K::find_target(db, *uid).ok_or(EvalError::Missing {
                kind: K::TARGET_NAME,
                detail: format!("uid {uid}"),
            })?;
            if !is_valid {
                return Err(EvalError::Precondition(format!(
                    "{} {uid} has resigned",
                    K::TARGET_NAME
                )));
            }
            self.add_targets.push((*uid, sequence));
        }

        let mut live_voter: Option<&Voter> = None;
        if stats.is_voter {
            let (voter_id, voter) = db
                .find_voter(voter_uid, stats.last_voter_sequence)
                .ok_or(EvalError::Missing { kind: "voter", detail: format!("uid {voter_uid}") })?;
            if db.check_voter_valid(voter) {
                self.voter_id = Some(voter_id);
                live_voter = Some(voter);
            } else {
                self.invalid_voter_id = Some(voter_id);
            }
        }

        let Some(voter) = live_voter else {
            if !to_remove.is_empty() {
                return Err(EvalError::Precondition(format!(
                    "not voting for any {}, can not remove",
                    K::TARGET_NAME
                )));
            }
            return Ok(());
        };

        if voter.proxy_uid != PROXY_TO_SELF_UID {
            // voting with a proxy: only proxy-expiry cleanup is permitted
            let (proxy_id, proxy) =
                db.find_voter(voter.proxy_uid, voter.proxy_sequence).ok_or(EvalError::Missing {
                    kind: "voter",
                    detail: format!("proxy uid {}", voter.proxy_uid),
                })?;
            if db.check_voter_valid(proxy) {
                if !to_add.is_empty() || !to_remove.is_empty() {
                    return Err(EvalError::Precondition(
                        "voting with a proxy; can not vote directly".into(),
                    ));
                }
            } else {
                self.invalid_current_proxy_id = Some(proxy_id);
                if !to_remove.is_empty() {
                    return Err(EvalError::Precondition(
                        "proxy expired; no direct votes to remove".into(),
                    ));
                }
            }
            return Ok(());
        }

        // voting by self: reconcile stale edges, then the explicit lists
        let mut still_voted = K::voted_count(voter) as i64;
        let prefix = Database::vote_edge_prefix(voter.uid, voter.sequence);
        for (edge_id, edge) in K::edges_with_prefix(db, &prefix) {
            let current = K::find_target(db, edge.target_uid);
            let stale = match current {
                None => true,
                Some((sequence, _)) => sequence != edge.target_sequence,
            };
            if stale {
                self.cleanup_edges.push(edge_id);
                still_voted -= 1;
            }
        }
        if (to_remove.len() as i64) > still_voted {
            return Err(EvalError::Precondition(format!(
                "removing more {} votes than cast",
                K::TARGET_NAME
            )));
        }
        let new_total = still_voted - to_remove.len() as i64 + to_add.len() as i64;
        if new_total > max_voted as i64 {
            return Err(EvalError::Precondition(format!(
                "would vote for {new_total} {}s, more than the allowed {max_voted}",
                K::TARGET_NAME
            )));
        }
        for uid in to_remove {
            let (sequence, _) = K::find_target(db, *uid).ok_or(EvalError::Missing {
                kind: K::TARGET_NAME,
                detail: format!("uid {uid}"),
            })?;
            let edge = GovernanceVote {
                voter_uid: voter.uid,
                voter_sequence: voter.sequence,
                target_uid: *uid,
                target_sequence: sequence,
            };
            let edge_id = K::find_edge(db, &edge).ok_or_else(|| {
                EvalError::Precondition(format!(
                    "not voting for {} {uid}, can not remove",
                    K::TARGET_NAME
                ))
            })?;
            self.remove_edges.push(edge_id);
        }
        for (uid, sequence) in &self.add_targets {
            let edge = GovernanceVote {
                voter_uid: voter.uid,
                voter_sequence: voter.sequence,
                target_uid: *uid,
                target_sequence: *sequence,
            };
            if K::find_edge(db, &edge).is_some() {
                return Err(EvalError::Precondition(format!(
                    "already voting for {} {uid}",
                    K::TARGET_NAME
                )));
            }
        }
        Ok(())
    }

    /// The shared `apply` phase.
    pub(super) fn apply<K: VoteTargetKind>(
        &mut self,
        db: &mut Database,
        voter_uid: AccountUid,
    ) -> Result<OperationResult, EvalError> {
        if let Some(id) = self.invalid_current_proxy_id {
            db.invalidate_voter(id)?;
        }
        if let Some(id) = self.invalid_voter_id {
            db.invalidate_voter(id)?;
        }

        let voter_id = match self.voter_id {
            Some(id) => id,
            None => db.create_voter(voter_uid, None)?,
        };
        let voter = db.store.get::<Voter>(voter_id)?.clone();
        let total_votes = voter.total_votes();

        // proxy expired mid-flight: the voter falls back to self-voting
        if self.invalid_current_proxy_id.is_some() {
            db.store.modify(voter_id, |v: &mut Voter| {
                v.proxy_uid = PROXY_TO_SELF_UID;
                v.proxy_sequence = 0;
            })?;
        }

        let mut removed = 0i64;
        for edge_id in self.cleanup_edges.drain(..) {
            K::remove_edge(db, edge_id)?;
            removed += 1;
        }
        for edge_id in self.remove_edges.drain(..) {
            let edge = K::edge_by_id(db, edge_id)?;
            K::adjust_target_votes(db, edge.target_uid, edge.target_sequence, -total_votes)?;
            K::remove_edge(db, edge_id)?;
            removed += 1;
        }
        let mut added = 0i64;
        for (uid, sequence) in self.add_targets.drain(..) {
            K::create_edge(
                db,
                GovernanceVote {
                    voter_uid: voter.uid,
                    voter_sequence: voter.sequence,
                    target_uid: uid,
                    target_sequence: sequence,
                },
            );
            if total_votes != 0 {
                K::adjust_target_votes(db, uid, sequence, total_votes)?;
            }
            added += 1;
        }
        let new_count = (K::voted_count(&voter) as i64 - removed + added).max(0) as u16;
        db.store.modify(voter_id, |v: &mut Voter| K::set_voted_count(v, new_count))?;
        db.touch_vote_chain(voter_id)?;
        Ok(OperationResult::Void)
    }
}

impl Database {
    pub(crate) fn vote_edge_prefix(voter_uid: AccountUid, voter_sequence: u32) -> Vec<u8> {
        agora_db::KeyWriter::default().u64(voter_uid).u32(voter_sequence).finish()
    }
}
