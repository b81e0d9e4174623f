// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{Evaluator, OpContext};
use crate::errors::EvalError;
use crate::objects::{Account, AccountAuthPlatformObject, AccountStatistics, Voter};
use crate::pipeline::OperationResult;
use crate::Database;
use agora_message::operations::{
    listing, AccountAuthPlatform, AccountCancelAuthPlatform, AccountCreate,
    AccountEnableAllowedAssets, AccountManage, AccountUpdateAllowedAssets, AccountUpdateAuth,
    AccountUpdateKey, AccountUpdateProxy, AccountWhitelist,
};
use agora_message::{AccountAuthRef, Authority};
use agora_types::{AccountUid, PROXY_TO_SELF_UID};
use std::collections::BTreeSet;

/// Shared by every evaluator that installs authorities: all referenced
/// accounts must exist.
fn verify_authority_accounts(db: &Database, auth: &Authority) -> Result<(), EvalError> {
    for uid in auth.referenced_accounts() {
        if db.find_account_by_uid(uid).is_none() {
            return Err(EvalError::Missing {
                kind: "account",
                detail: format!("authority references missing account {uid}"),
            });
        }
    }
    Ok(())
}

#[derive(Default)]
pub(super) struct AccountCreateEvaluator;

impl Evaluator for AccountCreateEvaluator {
    type Op = AccountCreate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AccountCreate) -> Result<(), EvalError> {
        let registrar = db.get_account_by_uid(op.reg_info.registrar)?;
        if !registrar.is_registrar {
            return Err(EvalError::Unauthorized(
                "only registrars may register an account".into(),
            ));
        }
        let referrer = db.get_account_by_uid(op.reg_info.referrer)?;
        if !referrer.is_full_member {
            return Err(EvalError::Unauthorized(
                "the referrer must be a full member".into(),
            ));
        }
        verify_authority_accounts(db, &op.owner)?;
        verify_authority_accounts(db, &op.active)?;
        verify_authority_accounts(db, &op.secondary)?;
        if db.find_account_by_uid(op.uid).is_some() {
            return Err(EvalError::Precondition(format!("account uid {} already exists", op.uid)));
        }
        if db.find_account_by_name(&op.name).is_some() {
            return Err(EvalError::Precondition(format!(
                "account name {:?} already exists",
                op.name
            )));
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AccountCreate,
    ) -> Result<OperationResult, EvalError> {
        let now = db.head_block_time();
        let register_by_platform = db.find_platform_by_owner(op.reg_info.registrar).is_some();
        let mut stats = AccountStatistics::new(op.uid);
        stats.coin_seconds_earned_last_update = now;
        let statistics = db.store.create(stats);
        let id = db.store.create(Account {
            uid: op.uid,
            name: op.name.clone(),
            owner: op.owner.clone(),
            active: op.active.clone(),
            secondary: op.secondary.clone(),
            memo_key: op.memo_key,
            reg_info: op.reg_info.clone(),
            register_by_platform,
            can_post: true,
            can_reply: false,
            can_rate: false,
            is_full_member: false,
            is_registrar: false,
            is_admin: false,
            whitelisted_accounts: BTreeSet::new(),
            blacklisted_accounts: BTreeSet::new(),
            allowed_assets: None,
            statistics,
            create_time: now,
            last_update_time: now,
        });
        Ok(OperationResult::ObjectId(id))
    }
}

#[derive(Default)]
pub(super) struct AccountManageEvaluator;

impl Evaluator for AccountManageEvaluator {
    type Op = AccountManage;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AccountManage) -> Result<(), EvalError> {
        let account = db.get_account_by_uid(op.account)?;
        let registrar = db.get_account_by_uid(account.reg_info.registrar)?;
        let manager = if registrar.is_registrar {
            registrar.uid
        } else {
            db.effective_registrar(registrar.uid)
        };
        if manager != op.executor {
            return Err(EvalError::Unauthorized(format!(
                "account {} is managed by registrar {manager}",
                op.account
            )));
        }
        if let Some(can_post) = op.can_post {
            if account.can_post == can_post {
                return Err(EvalError::Precondition("can_post specified but did not change".into()));
            }
        }
        if let Some(can_reply) = op.can_reply {
            if account.can_reply == can_reply {
                return Err(EvalError::Precondition("can_reply specified but did not change".into()));
            }
        }
        if let Some(can_rate) = op.can_rate {
            if account.can_rate == can_rate {
                return Err(EvalError::Precondition("can_rate specified but did not change".into()));
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AccountManage,
    ) -> Result<OperationResult, EvalError> {
        let now = db.head_block_time();
        db.modify_account(op.account, |a| {
            if let Some(can_post) = op.can_post {
                a.can_post = can_post;
            }
            if let Some(can_reply) = op.can_reply {
                a.can_reply = can_reply;
            }
            if let Some(can_rate) = op.can_rate {
                a.can_rate = can_rate;
            }
            a.last_update_time = now;
        })?;
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct AccountUpdateKeyEvaluator {
    active_weight: u16,
    secondary_weight: u16,
}

impl Evaluator for AccountUpdateKeyEvaluator {
    type Op = AccountUpdateKey;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AccountUpdateKey) -> Result<(), EvalError> {
        let account = db.get_account_by_uid(op.uid)?;
        if op.update_active {
            if account.active.key_auths.contains_key(&op.new_key) {
                return Err(EvalError::Precondition(
                    "new key is already in active authority".into(),
                ));
            }
            self.active_weight = *account.active.key_auths.get(&op.old_key).ok_or_else(|| {
                EvalError::Precondition("old key is not in active authority".into())
            })?;
        }
        if op.update_secondary {
            if account.secondary.key_auths.contains_key(&op.new_key) {
                return Err(EvalError::Precondition(
                    "new key is already in secondary authority".into(),
                ));
            }
            self.secondary_weight =
                *account.secondary.key_auths.get(&op.old_key).ok_or_else(|| {
                    EvalError::Precondition("old key is not in secondary authority".into())
                })?;
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AccountUpdateKey,
    ) -> Result<OperationResult, EvalError> {
        let now = db.head_block_time();
        let (active_weight, secondary_weight) = (self.active_weight, self.secondary_weight);
        db.modify_account(op.uid, |a| {
            if op.update_active {
                a.active.key_auths.remove(&op.old_key);
                a.active.key_auths.insert(op.new_key, active_weight);
            }
            if op.update_secondary {
                a.secondary.key_auths.remove(&op.old_key);
                a.secondary.key_auths.insert(op.new_key, secondary_weight);
            }
            a.last_update_time = now;
        })?;
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct AccountUpdateAuthEvaluator;

impl Evaluator for AccountUpdateAuthEvaluator {
    type Op = AccountUpdateAuth;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AccountUpdateAuth) -> Result<(), EvalError> {
        db.get_account_by_uid(op.uid)?;
        for auth in [&op.owner, &op.active, &op.secondary].into_iter().flatten() {
            verify_authority_accounts(db, auth)?;
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AccountUpdateAuth,
    ) -> Result<OperationResult, EvalError> {
        let now = db.head_block_time();
        db.modify_account(op.uid, |a| {
            if let Some(owner) = &op.owner {
                a.owner = owner.clone();
            }
            if let Some(active) = &op.active {
                a.active = active.clone();
            }
            if let Some(secondary) = &op.secondary {
                a.secondary = secondary.clone();
            }
            if let Some(memo_key) = op.memo_key {
                a.memo_key = memo_key;
            }
            a.last_update_time = now;
        })?;
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct AccountAuthPlatformEvaluator {
    existing_auth: Option<u64>,
}

impl Evaluator for AccountAuthPlatformEvaluator {
    type Op = AccountAuthPlatform;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AccountAuthPlatform) -> Result<(), EvalError> {
        let account = db.get_account_by_uid(op.uid)?;
        db.get_platform_by_owner(op.platform)?;
        self.existing_auth = db.find_account_auth_platform(op.uid, op.platform).map(|(id, _)| id);

        // adding the platform must keep the secondary authority well formed
        if !account
            .secondary
            .account_auths
            .contains_key(&AccountAuthRef::secondary(op.platform))
        {
            let mut auth = account.secondary.clone();
            let weight = auth.weight_threshold.min(u16::MAX as u32) as u16;
            auth.add_account(AccountAuthRef::secondary(op.platform), weight);
            auth.validate()?;
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AccountAuthPlatform,
    ) -> Result<OperationResult, EvalError> {
        let now = db.head_block_time();
        let platform_ref = AccountAuthRef::secondary(op.platform);
        db.modify_account(op.uid, |a| {
            if !a.secondary.account_auths.contains_key(&platform_ref) {
                let weight = a.secondary.weight_threshold.min(u16::MAX as u32) as u16;
                a.secondary.add_account(platform_ref, weight);
            }
            a.last_update_time = now;
        })?;
        let id = match self.existing_auth {
            Some(id) => {
                db.store.modify(id, |auth: &mut AccountAuthPlatformObject| {
                    auth.max_limit = op.max_limit;
                    auth.permission_flags = op.permission_flags;
                    auth.memo = op.memo.clone();
                })?;
                id
            }
            None => db.store.create(AccountAuthPlatformObject {
                account: op.uid,
                platform: op.platform,
                max_limit: op.max_limit,
                cur_used: 0,
                permission_flags: op.permission_flags,
                memo: op.memo.clone(),
            }),
        };
        Ok(OperationResult::ObjectId(id))
    }
}

#[derive(Default)]
pub(super) struct AccountCancelAuthPlatformEvaluator {
    auth_id: u64,
}

impl Evaluator for AccountCancelAuthPlatformEvaluator {
    type Op = AccountCancelAuthPlatform;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AccountCancelAuthPlatform) -> Result<(), EvalError> {
        let account = db.get_account_by_uid(op.uid)?;
        if !account
            .secondary
            .account_auths
            .contains_key(&AccountAuthRef::secondary(op.platform))
        {
            return Err(EvalError::Precondition(format!(
                "platform {} is not in secondary authority",
                op.platform
            )));
        }
        self.auth_id = db
            .find_account_auth_platform(op.uid, op.platform)
            .map(|(id, _)| id)
            .ok_or(EvalError::Missing {
                kind: "account_auth_platform",
                detail: format!("({}, {})", op.uid, op.platform),
            })?;
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AccountCancelAuthPlatform,
    ) -> Result<OperationResult, EvalError> {
        let now = db.head_block_time();
        db.modify_account(op.uid, |a| {
            a.secondary.remove_account(&AccountAuthRef::secondary(op.platform));
            a.last_update_time = now;
        })?;
        db.store.remove::<AccountAuthPlatformObject>(self.auth_id)?;
        Ok(OperationResult::Void)
    }
}

/// Proxy switching. The level vectors make this the subtlest evaluator:
/// clearing old influence and installing the new proxy must leave every
/// voter's `proxied_votes` consistent with its proxiers.
#[derive(Default)]
pub(super) struct AccountUpdateProxyEvaluator {
    voter_id: Option<u64>,
    invalid_voter_id: Option<u64>,
    current_proxy_id: Option<u64>,
    invalid_current_proxy_id: Option<u64>,
    new_proxy: Option<(AccountUid, u32)>,
}

impl Evaluator for AccountUpdateProxyEvaluator {
    type Op = AccountUpdateProxy;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AccountUpdateProxy) -> Result<(), EvalError> {
        let stats = db.get_account_statistics_by_uid(op.voter)?;
        if !stats.can_vote {
            return Err(EvalError::Unauthorized("this account can not vote".into()));
        }
        let params = db.params();
        if stats.core_balance < params.min_governance_voting_balance {
            return Err(EvalError::InsufficientBalance {
                account: op.voter,
                required: params.min_governance_voting_balance,
                available: stats.core_balance,
            });
        }

        if op.proxy != PROXY_TO_SELF_UID {
            let proxy_stats = db.get_account_statistics_by_uid(op.proxy)?;
            if !proxy_stats.is_voter {
                return Err(EvalError::Precondition("proxy should already be a voter".into()));
            }
            let (proxy_id, proxy_voter) = db
                .find_voter(op.proxy, proxy_stats.last_voter_sequence)
                .ok_or(EvalError::Missing { kind: "voter", detail: format!("uid {}", op.proxy) })?;
            if !db.check_voter_valid(proxy_voter) {
                return Err(EvalError::Precondition("proxy voter is no longer valid".into()));
            }
            self.new_proxy = Some((proxy_voter.uid, proxy_voter.sequence));
            let _ = proxy_id;
        }

        let mut live_voter: Option<(u64, &Voter)> = None;
        if stats.is_voter {
            let (voter_id, voter) = db
                .find_voter(op.voter, stats.last_voter_sequence)
                .ok_or(EvalError::Missing { kind: "voter", detail: format!("uid {}", op.voter) })?;
            if db.check_voter_valid(voter) {
                live_voter = Some((voter_id, voter));
                self.voter_id = Some(voter_id);
            } else {
                self.invalid_voter_id = Some(voter_id);
            }
        }

        match live_voter {
            None => {
                if op.proxy == PROXY_TO_SELF_UID {
                    return Err(EvalError::Precondition(
                        "not proxying; nothing to switch back from".into(),
                    ));
                }
            }
            Some((_, voter)) if voter.proxy_uid == PROXY_TO_SELF_UID => {
                if op.proxy == PROXY_TO_SELF_UID {
                    return Err(EvalError::Precondition("already voting by self".into()));
                }
            }
            Some((_, voter)) => {
                let (proxy_id, current_proxy) = db
                    .find_voter(voter.proxy_uid, voter.proxy_sequence)
                    .ok_or(EvalError::Missing {
                        kind: "voter",
                        detail: format!("proxy uid {}", voter.proxy_uid),
                    })?;
                if db.check_voter_valid(current_proxy) {
                    if op.proxy == voter.proxy_uid {
                        return Err(EvalError::Precondition("proxy did not change".into()));
                    }
                    self.current_proxy_id = Some(proxy_id);
                } else {
                    self.invalid_current_proxy_id = Some(proxy_id);
                }
            }
        }

        // proxy loop detection, bounded by the maximum proxy depth
        if let (Some((_, voter)), Some(mut cursor)) = (live_voter, self.new_proxy) {
            let max_level = db.params().max_governance_voting_proxy_level;
            for _ in 0..max_level {
                let Some((_, next)) = db.find_voter(cursor.0, cursor.1) else { break };
                if next.proxy_uid == PROXY_TO_SELF_UID {
                    break;
                }
                if next.proxy_uid == voter.uid && next.proxy_sequence == voter.sequence {
                    return Err(EvalError::Precondition("proxy loop detected".into()));
                }
                cursor = (next.proxy_uid, next.proxy_sequence);
            }
            if voter.uid == self.new_proxy.expect("checked").0 {
                return Err(EvalError::Precondition("proxy loop detected".into()));
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AccountUpdateProxy,
    ) -> Result<OperationResult, EvalError> {
        let head_num = db.head_block_num();

        if let Some(id) = self.invalid_current_proxy_id {
            db.invalidate_voter(id)?;
        }
        if let Some(id) = self.invalid_voter_id {
            db.invalidate_voter(id)?;
        }

        let voter_id = match self.voter_id {
            Some(voter_id) => {
                // clear influence routed through the old mode
                let voter = db.store.get::<Voter>(voter_id)?.clone();
                if voter.proxy_uid == PROXY_TO_SELF_UID {
                    db.clear_voter_votes(voter_id)?;
                } else {
                    db.clear_voter_proxy_votes(voter_id)?;
                    if let Some(id) = self.current_proxy_id {
                        db.store.modify(id, |v: &mut Voter| {
                            v.proxied_voters = v.proxied_voters.saturating_sub(1);
                        })?;
                    }
                }
                let (proxy_uid, proxy_sequence) = self.new_proxy.unwrap_or((PROXY_TO_SELF_UID, 0));
                db.store.modify(voter_id, |v: &mut Voter| {
                    v.proxy_uid = proxy_uid;
                    v.proxy_sequence = proxy_sequence;
                    v.proxy_last_vote_block[0] = head_num;
                    v.update_effective_last_vote_block();
                })?;
                if let Some(proxy) = self.new_proxy {
                    let voter = db.store.get::<Voter>(voter_id)?.clone();
                    let delta = db.proxy_contribution(&voter);
                    db.adjust_voter_proxy_votes(proxy, delta)?;
                }
                voter_id
            }
            None => db.create_voter(op.voter, self.new_proxy)?,
        };

        if let Some(proxy) = self.new_proxy {
            if let Some((proxy_id, _)) = db.find_voter(proxy.0, proxy.1) {
                db.store.modify(proxy_id, |v: &mut Voter| v.proxied_voters += 1)?;
            }
        }
        db.touch_vote_chain(voter_id)?;
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct AccountEnableAllowedAssetsEvaluator;

impl Evaluator for AccountEnableAllowedAssetsEvaluator {
    type Op = AccountEnableAllowedAssets;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AccountEnableAllowedAssets) -> Result<(), EvalError> {
        let account = db.get_account_by_uid(op.account)?;
        if account.enabled_allowed_assets() == op.enable {
            return Err(EvalError::Precondition(
                "allowed-assets flag specified but did not change".into(),
            ));
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AccountEnableAllowedAssets,
    ) -> Result<OperationResult, EvalError> {
        db.modify_account(op.account, |a| {
            a.allowed_assets = if op.enable {
                // core is always holdable
                Some([agora_types::CORE_ASSET_AID].into_iter().collect())
            } else {
                None
            };
        })?;
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct AccountUpdateAllowedAssetsEvaluator;

impl Evaluator for AccountUpdateAllowedAssetsEvaluator {
    type Op = AccountUpdateAllowedAssets;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AccountUpdateAllowedAssets) -> Result<(), EvalError> {
        let account = db.get_account_by_uid(op.account)?;
        if !account.enabled_allowed_assets() {
            return Err(EvalError::Precondition(
                "allowed-assets restriction is not enabled".into(),
            ));
        }
        for aid in &op.assets_to_add {
            db.get_asset_by_aid(*aid)?;
        }
        for aid in &op.assets_to_remove {
            if *aid == agora_types::CORE_ASSET_AID {
                return Err(EvalError::Precondition("the core asset cannot be disallowed".into()));
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AccountUpdateAllowedAssets,
    ) -> Result<OperationResult, EvalError> {
        db.modify_account(op.account, |a| {
            if let Some(allowed) = &mut a.allowed_assets {
                for aid in &op.assets_to_add {
                    allowed.insert(*aid);
                }
                for aid in &op.assets_to_remove {
                    allowed.remove(aid);
                }
            }
        })?;
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct AccountWhitelistEvaluator;

impl Evaluator for AccountWhitelistEvaluator {
    type Op = AccountWhitelist;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &AccountWhitelist) -> Result<(), EvalError> {
        db.get_account_by_uid(op.authorizing_account)?;
        db.get_account_by_uid(op.account_to_list)?;
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &AccountWhitelist,
    ) -> Result<OperationResult, EvalError> {
        db.modify_account(op.authorizing_account, |a| {
            if op.new_listing & listing::WHITE_LISTED != 0 {
                a.whitelisted_accounts.insert(op.account_to_list);
            } else {
                a.whitelisted_accounts.remove(&op.account_to_list);
            }
            if op.new_listing & listing::BLACK_LISTED != 0 {
                a.blacklisted_accounts.insert(op.account_to_list);
            } else {
                a.blacklisted_accounts.remove(&op.account_to_list);
            }
        })?;
        Ok(OperationResult::Void)
    }
}
