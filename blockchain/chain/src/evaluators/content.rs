// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{Evaluator, OpContext};
use crate::errors::EvalError;
use crate::objects::{
    AccountAuthPlatformObject, ActivePost, License, Post as PostObject, Score,
};
use crate::pipeline::OperationResult;
use crate::Database;
use agora_message::operations::{
    validate_receiptors, Buyout, LicenseCreate, Post, PostType, PostUpdate, Receiptor, Reward,
    RewardProxy, ScoreCreate,
};
use agora_types::{
    post_permission, AccountUid, Amount, PostPid, Share, CORE_ASSET_AID, FULL_PERCENT,
    MAX_PLATFORM_LIMIT_PREPAID, MAX_RECEIPTORS, PLATFORM_RECEIPT_RATIO,
};
use std::collections::BTreeMap;

/// Resolve the (account → platform) authorization, require `permission_bit`,
/// and — when the transaction was signed by the platform rather than the
/// user — require headroom in the metered prepaid grant.
fn check_platform_authorization(
    db: &Database,
    ctx: &OpContext,
    user: AccountUid,
    platform: AccountUid,
    permission_bit: u32,
    needed_prepaid: Share,
) -> Result<bool, EvalError> {
    let (_, auth) = db.find_account_auth_platform(user, platform).ok_or_else(|| {
        EvalError::Unauthorized(format!(
            "platform {platform} is not authorized by account {user}"
        ))
    })?;
    if auth.permission_flags & permission_bit == 0 {
        return Err(EvalError::Unauthorized(format!(
            "account {user}'s authorization of platform {platform} lacks this permission"
        )));
    }
    let platform_signed = db.signed_by_platform(&ctx.signers, user, platform);
    if platform_signed && auth.max_limit < MAX_PLATFORM_LIMIT_PREPAID {
        let usable = auth.usable_prepaid();
        if usable < needed_prepaid {
            return Err(EvalError::InsufficientPrepaid {
                account: user,
                required: needed_prepaid,
                available: usable,
            });
        }
    }
    Ok(platform_signed)
}

/// Charge `amount` from the user's prepaid, metering the platform's grant
/// when the platform submitted the operation.
fn charge_prepaid(
    db: &mut Database,
    user: AccountUid,
    platform: AccountUid,
    amount: Share,
    platform_signed: bool,
) -> Result<(), EvalError> {
    let prepaid = db.get_account_statistics_by_uid(user)?.prepaid;
    if prepaid < amount {
        return Err(EvalError::InsufficientPrepaid {
            account: user,
            required: amount,
            available: prepaid,
        });
    }
    db.modify_account_statistics(user, |s| s.prepaid -= amount)?;
    if platform_signed {
        if let Some((auth_id, _)) = db.find_account_auth_platform(user, platform) {
            db.store
                .modify(auth_id, |a: &mut AccountAuthPlatformObject| a.cur_used += amount)?;
        }
    }
    Ok(())
}

/// Split `amount` across a post's receiptors by current ratio. Non-platform
/// receiptors take `amount * ratio / 100%`; the platform takes the
/// remainder, absorbing every rounding residue. Returns per-account shares.
fn receiptor_split(
    receiptors: &BTreeMap<AccountUid, Receiptor>,
    platform: AccountUid,
    amount: Share,
) -> Vec<(AccountUid, Share)> {
    let total = amount as u128;
    let mut surplus = total;
    let mut shares = Vec::with_capacity(receiptors.len());
    for (uid, receiptor) in receiptors {
        if *uid == platform {
            continue;
        }
        let part = total * receiptor.cur_ratio as u128 / FULL_PERCENT as u128;
        surplus -= part;
        shares.push((*uid, part as Share));
    }
    shares.push((platform, surplus as Share));
    shares
}

/// The period's activity row for a post, created lazily while the post is
/// still within its award window.
fn credit_active_post(
    db: &mut Database,
    platform: AccountUid,
    poster: AccountUid,
    post_pid: PostPid,
    f: impl FnOnce(&mut ActivePost),
) -> Result<Option<u64>, EvalError> {
    let period = db.dpo().current_active_post_sequence;
    if let Some((id, _)) = db.find_active_post(platform, poster, post_pid, period) {
        db.store.modify(id, f)?;
        return Ok(Some(id));
    }
    let (_, post) = db.get_post(platform, poster, post_pid)?;
    let award_window = db.params().content_award.post_award_expiration;
    if post.create_time + award_window < db.head_block_time() {
        return Ok(None);
    }
    let mut active = ActivePost::new(platform, poster, post_pid, period);
    f(&mut active);
    Ok(Some(db.store.create(active)))
}

#[derive(Default)]
pub(super) struct PostEvaluator {
    platform_signed: bool,
}

impl Evaluator for PostEvaluator {
    type Op = Post;

    fn evaluate(&mut self, db: &Database, ctx: &OpContext, op: &Post) -> Result<(), EvalError> {
        db.get_platform_by_owner(op.platform)?;
        let poster = db.get_account_by_uid(op.poster)?;
        if !poster.can_post {
            return Err(EvalError::Unauthorized(format!(
                "poster {} is not allowed to post",
                op.poster
            )));
        }
        let stats = db.get_account_statistics_by_uid(op.poster)?;
        if stats.last_post_sequence + 1 != op.post_pid {
            return Err(EvalError::Precondition(format!(
                "post_pid {} is invalid; expected {}",
                op.post_pid,
                stats.last_post_sequence + 1
            )));
        }
        if let Some(lid) = op.license_lid {
            if db.find_license(op.platform, lid).is_none() {
                return Err(EvalError::Missing {
                    kind: "license",
                    detail: format!("({}, {lid})", op.platform),
                });
            }
        }
        if !op.is_derived() {
            return Ok(());
        }

        // derived posts: the origin must exist and permit this relation
        let origin_platform = op.origin_platform.expect("validated");
        let origin_poster = op.origin_poster.expect("validated");
        let origin_pid = op.origin_post_pid.expect("validated");
        db.get_platform_by_owner(origin_platform)?;
        db.get_account_by_uid(origin_poster)?;
        let (_, origin) = db.get_post(origin_platform, origin_poster, origin_pid)?;
        match op.post_type {
            PostType::Comment => {
                if !origin.allows(post_permission::COMMENT) {
                    return Err(EvalError::Unauthorized("origin post forbids comments".into()));
                }
                if !poster.can_reply {
                    return Err(EvalError::Unauthorized(format!(
                        "poster {} is not allowed to reply",
                        op.poster
                    )));
                }
                self.platform_signed = check_platform_authorization(
                    db,
                    ctx,
                    op.poster,
                    op.platform,
                    agora_types::platform_permission::COMMENT,
                    0,
                )?;
            }
            PostType::Forward | PostType::ForwardAndModify => {
                if !origin.allows(post_permission::FORWARD) {
                    return Err(EvalError::Unauthorized("origin post forbids forwards".into()));
                }
                let price = origin.forward_price.ok_or_else(|| {
                    EvalError::Precondition("origin post has no forward price".into())
                })?;
                self.platform_signed = check_platform_authorization(
                    db,
                    ctx,
                    op.poster,
                    op.platform,
                    agora_types::platform_permission::FORWARD,
                    price,
                )?;
                if stats.prepaid < price {
                    return Err(EvalError::InsufficientPrepaid {
                        account: op.poster,
                        required: price,
                        available: stats.prepaid,
                    });
                }
            }
            PostType::Original => unreachable!("is_derived checked"),
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &Post,
    ) -> Result<OperationResult, EvalError> {
        let now = db.head_block_time();
        db.modify_account_statistics(op.poster, |s| s.last_post_sequence += 1)?;

        if matches!(op.post_type, PostType::Forward | PostType::ForwardAndModify) {
            let origin_platform = op.origin_platform.expect("validated");
            let origin_poster = op.origin_poster.expect("validated");
            let origin_pid = op.origin_post_pid.expect("validated");
            let origin = db.get_post(origin_platform, origin_poster, origin_pid)?.1.clone();
            let price = origin.forward_price.expect("checked in evaluate");

            charge_prepaid(db, op.poster, op.platform, price, self.platform_signed)?;
            let shares = receiptor_split(&origin.receiptors, origin.platform, price);
            for (uid, share) in &shares {
                db.modify_account_statistics(*uid, |s| s.prepaid += share)?;
            }
            credit_active_post(db, origin_platform, origin_poster, origin_pid, |active| {
                active.forward_award += price;
                for (uid, share) in &shares {
                    active.credit_receiptor_forward(*uid, *share);
                }
            })?;
            let retained = db.active_post_retention();
            let period = db.dpo().current_active_post_sequence;
            if let Some((platform_id, _)) = db.find_platform_by_owner(origin_platform) {
                let platform_share =
                    shares.iter().find(|(uid, _)| *uid == origin.platform).map(|(_, s)| *s);
                db.store.modify(platform_id, |p: &mut crate::objects::Platform| {
                    p.add_period_profits(
                        period,
                        retained,
                        None,
                        platform_share.unwrap_or(0),
                        0,
                        0,
                    );
                })?;
            }
        }

        let receiptors = match &op.receiptors {
            Some(receiptors) if !receiptors.is_empty() => receiptors.clone(),
            _ => {
                let mut receiptors = BTreeMap::new();
                receiptors.insert(op.platform, Receiptor::plain(PLATFORM_RECEIPT_RATIO));
                receiptors
                    .insert(op.poster, Receiptor::plain(FULL_PERCENT - PLATFORM_RECEIPT_RATIO));
                receiptors
            }
        };
        let id = db.store.create(PostObject {
            platform: op.platform,
            poster: op.poster,
            post_pid: op.post_pid,
            origin_platform: op.origin_platform,
            origin_poster: op.origin_poster,
            origin_post_pid: op.origin_post_pid,
            hash_value: op.hash_value.clone(),
            title: op.title.clone(),
            body: op.body.clone(),
            extra_data: op.extra_data.clone(),
            receiptors,
            forward_price: op.forward_price,
            license_lid: op.license_lid,
            permission_flags: op.permission_flags,
            score_settlement: false,
            create_time: now,
            last_update_time: now,
        });
        Ok(OperationResult::ObjectId(id))
    }
}

#[derive(Default)]
pub(super) struct PostUpdateEvaluator {
    post_id: u64,
}

impl Evaluator for PostUpdateEvaluator {
    type Op = PostUpdate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &PostUpdate) -> Result<(), EvalError> {
        db.get_platform_by_owner(op.platform)?;
        let poster = db.get_account_by_uid(op.poster)?;
        let (post_id, post) = db.get_post(op.platform, op.poster, op.post_pid)?;
        self.post_id = post_id;

        let content_change = op.hash_value.is_some()
            || op.title.is_some()
            || op.body.is_some()
            || op.extra_data.is_some();
        if content_change && !poster.can_post {
            return Err(EvalError::Unauthorized(format!(
                "poster {} is not allowed to post",
                op.poster
            )));
        }
        if let Some(receiptor) = op.receiptor {
            let entry = post.receiptors.get(&receiptor).ok_or_else(|| {
                EvalError::Precondition(format!("receiptor {receiptor} not found"))
            })?;
            if let Some(ratio) = op.buyout_ratio {
                if ratio > entry.cur_ratio {
                    return Err(EvalError::Precondition(
                        "buyout ratio exceeds the receiptor's current ratio".into(),
                    ));
                }
            }
        }
        if let Some(lid) = op.license_lid {
            if db.find_license(op.platform, lid).is_none() {
                return Err(EvalError::Missing {
                    kind: "license",
                    detail: format!("({}, {lid})", op.platform),
                });
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &PostUpdate,
    ) -> Result<OperationResult, EvalError> {
        let now = db.head_block_time();
        db.store.modify(self.post_id, |post: &mut PostObject| {
            if let Some(hash_value) = &op.hash_value {
                post.hash_value = hash_value.clone();
            }
            if let Some(title) = &op.title {
                post.title = title.clone();
            }
            if let Some(body) = &op.body {
                post.body = body.clone();
            }
            if let Some(extra) = &op.extra_data {
                post.extra_data = extra.clone();
            }
            if let Some(price) = op.forward_price {
                post.forward_price = Some(price);
            }
            if let Some(receiptor) = op.receiptor {
                if let Some(entry) = post.receiptors.get_mut(&receiptor) {
                    if let Some(to_buyout) = op.to_buyout {
                        entry.to_buyout = to_buyout;
                    }
                    if let Some(ratio) = op.buyout_ratio {
                        entry.buyout_ratio = ratio;
                    }
                    if let Some(price) = op.buyout_price {
                        entry.buyout_price = price;
                    }
                    if let Some(expiration) = op.buyout_expiration {
                        entry.buyout_expiration = expiration;
                    }
                }
            }
            if let Some(lid) = op.license_lid {
                post.license_lid = Some(lid);
            }
            if let Some(flags) = op.permission_flags {
                post.permission_flags = flags;
            }
            post.last_update_time = now;
        })?;
        Ok(OperationResult::ObjectId(self.post_id))
    }
}

#[derive(Default)]
pub(super) struct ScoreCreateEvaluator;

impl Evaluator for ScoreCreateEvaluator {
    type Op = ScoreCreate;

    fn evaluate(&mut self, db: &Database, ctx: &OpContext, op: &ScoreCreate) -> Result<(), EvalError> {
        let scorer = db.get_account_by_uid(op.from_account_uid)?;
        if !scorer.can_rate {
            return Err(EvalError::Unauthorized(format!(
                "account {} is not allowed to rate",
                op.from_account_uid
            )));
        }
        let (_, post) = db.get_post(op.platform, op.poster, op.post_pid)?;
        if !post.allows(post_permission::LIKED) {
            return Err(EvalError::Unauthorized("post forbids scoring".into()));
        }
        let award_params = &db.params().content_award;
        if op.csaf > award_params.max_csaf_per_approval {
            return Err(EvalError::Precondition(format!(
                "score csaf above the per-approval maximum {}",
                award_params.max_csaf_per_approval
            )));
        }
        check_platform_authorization(
            db,
            ctx,
            op.from_account_uid,
            op.platform,
            agora_types::platform_permission::LIKED,
            0,
        )?;
        let stats = db.get_account_statistics_by_uid(op.from_account_uid)?;
        if stats.csaf < op.csaf {
            return Err(EvalError::InsufficientCsaf {
                account: op.from_account_uid,
                required: op.csaf,
                available: stats.csaf,
            });
        }
        if db.find_score(op.platform, op.poster, op.post_pid, op.from_account_uid).is_some() {
            return Err(EvalError::Precondition("a post may only be scored once".into()));
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &ScoreCreate,
    ) -> Result<OperationResult, EvalError> {
        db.modify_account_statistics(op.from_account_uid, |s| s.csaf -= op.csaf)?;
        let period = db.dpo().current_active_post_sequence;
        let score_id = db.store.create(Score {
            from_account_uid: op.from_account_uid,
            platform: op.platform,
            poster: op.poster,
            post_pid: op.post_pid,
            score: op.score,
            csaf: op.csaf,
            period_sequence: period,
            profits: 0,
            create_time: db.head_block_time(),
        });
        credit_active_post(db, op.platform, op.poster, op.post_pid, |active| {
            active.total_csaf += op.csaf;
            active.scores.push(score_id);
        })?;
        Ok(OperationResult::ObjectId(score_id))
    }
}

#[derive(Default)]
pub(super) struct RewardEvaluator;

impl Evaluator for RewardEvaluator {
    type Op = Reward;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &Reward) -> Result<(), EvalError> {
        let from = db.get_account_by_uid(op.from_account_uid)?;
        let (_, post) = db.get_post(op.platform, op.poster, op.post_pid)?;
        if !post.allows(post_permission::REWARD) {
            return Err(EvalError::Unauthorized("post forbids rewards".into()));
        }
        let asset = db.get_asset_by_aid(op.amount.asset_aid)?;
        db.validate_authorized_asset(from, asset)?;
        if asset.is_transfer_restricted() && from.uid != asset.issuer {
            return Err(EvalError::Unauthorized(format!(
                "asset {} is transfer restricted",
                asset.aid
            )));
        }
        let balance = db.get_balance(op.from_account_uid, op.amount.asset_aid);
        if balance < op.amount.amount {
            return Err(EvalError::InsufficientBalance {
                account: op.from_account_uid,
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
        op: &Reward,
    ) -> Result<OperationResult, EvalError> {
        let post = db.get_post(op.platform, op.poster, op.post_pid)?.1.clone();
        if op.amount.asset_aid == CORE_ASSET_AID {
            db.spend_core(op.from_account_uid, op.amount.amount)?;
        } else {
            db.adjust_balance(op.from_account_uid, -op.amount)?;
        }
        let shares = receiptor_split(&post.receiptors, post.platform, op.amount.amount);
        for (uid, share) in &shares {
            db.adjust_balance(*uid, Amount::new(*share, op.amount.asset_aid))?;
        }
        credit_active_post(db, op.platform, op.poster, op.post_pid, |active| {
            *active.total_rewards.entry(op.amount.asset_aid).or_insert(0) += op.amount.amount;
            for (uid, share) in &shares {
                active.credit_receiptor_reward(*uid, op.amount.asset_aid, *share);
            }
        })?;
        let retained = db.active_post_retention();
        let period = db.dpo().current_active_post_sequence;
        let platform_share = shares.iter().find(|(uid, _)| *uid == post.platform).map(|(_, s)| *s);
        if let Some((platform_id, _)) = db.find_platform_by_owner(op.platform) {
            db.store.modify(platform_id, |p: &mut crate::objects::Platform| {
                p.add_period_profits(
                    period,
                    retained,
                    Some((op.amount.asset_aid, platform_share.unwrap_or(0))),
                    0,
                    0,
                    0,
                );
            })?;
        }
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct RewardProxyEvaluator {
    platform_signed: bool,
}

impl Evaluator for RewardProxyEvaluator {
    type Op = RewardProxy;

    fn evaluate(&mut self, db: &Database, ctx: &OpContext, op: &RewardProxy) -> Result<(), EvalError> {
        db.get_account_by_uid(op.from_account_uid)?;
        let (_, post) = db.get_post(op.platform, op.poster, op.post_pid)?;
        if !post.allows(post_permission::REWARD) {
            return Err(EvalError::Unauthorized("post forbids rewards".into()));
        }
        self.platform_signed = check_platform_authorization(
            db,
            ctx,
            op.from_account_uid,
            op.platform,
            agora_types::platform_permission::REWARD,
            op.amount,
        )?;
        let prepaid = db.get_account_statistics_by_uid(op.from_account_uid)?.prepaid;
        if prepaid < op.amount {
            return Err(EvalError::InsufficientPrepaid {
                account: op.from_account_uid,
                required: op.amount,
                available: prepaid,
            });
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &RewardProxy,
    ) -> Result<OperationResult, EvalError> {
        let post = db.get_post(op.platform, op.poster, op.post_pid)?.1.clone();
        charge_prepaid(db, op.from_account_uid, op.platform, op.amount, self.platform_signed)?;
        let shares = receiptor_split(&post.receiptors, post.platform, op.amount);
        for (uid, share) in &shares {
            db.modify_account_statistics(*uid, |s| s.prepaid += share)?;
        }
        credit_active_post(db, op.platform, op.poster, op.post_pid, |active| {
            *active.total_rewards.entry(CORE_ASSET_AID).or_insert(0) += op.amount;
            for (uid, share) in &shares {
                active.credit_receiptor_reward(*uid, CORE_ASSET_AID, *share);
            }
        })?;
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct BuyoutEvaluator {
    platform_signed: bool,
}

impl Evaluator for BuyoutEvaluator {
    type Op = Buyout;

    fn evaluate(&mut self, db: &Database, ctx: &OpContext, op: &Buyout) -> Result<(), EvalError> {
        db.get_account_by_uid(op.from_account_uid)?;
        let (_, post) = db.get_post(op.platform, op.poster, op.post_pid)?;
        if !post.allows(post_permission::BUYOUT) {
            return Err(EvalError::Unauthorized("post forbids buyouts".into()));
        }
        validate_receiptors(&post.receiptors, post.platform)?;
        let entry = post.receiptors.get(&op.receiptor_account_uid).ok_or_else(|| {
            EvalError::Precondition(format!(
                "account {} is not a receiptor of this post",
                op.receiptor_account_uid
            ))
        })?;
        if !entry.to_buyout
            || entry.buyout_ratio == 0
            || entry.buyout_ratio > entry.cur_ratio
            || entry.buyout_expiration < db.head_block_time()
        {
            return Err(EvalError::Precondition(
                "the receiptor's buyout offer is not active".into(),
            ));
        }
        if entry.buyout_ratio < entry.cur_ratio
            && !post.receiptors.contains_key(&op.from_account_uid)
            && post.receiptors.len() >= MAX_RECEIPTORS
        {
            return Err(EvalError::Precondition(format!(
                "a post may have at most {MAX_RECEIPTORS} receiptors"
            )));
        }
        self.platform_signed = check_platform_authorization(
            db,
            ctx,
            op.from_account_uid,
            op.platform,
            agora_types::platform_permission::BUYOUT,
            entry.buyout_price,
        )?;
        let prepaid = db.get_account_statistics_by_uid(op.from_account_uid)?.prepaid;
        if prepaid < entry.buyout_price {
            return Err(EvalError::InsufficientPrepaid {
                account: op.from_account_uid,
                required: entry.buyout_price,
                available: prepaid,
            });
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &Buyout,
    ) -> Result<OperationResult, EvalError> {
        let (post_id, post) = db.get_post(op.platform, op.poster, op.post_pid)?;
        let entry = *post.receiptors.get(&op.receiptor_account_uid).expect("checked in evaluate");

        charge_prepaid(
            db,
            op.from_account_uid,
            op.platform,
            entry.buyout_price,
            self.platform_signed,
        )?;
        db.modify_account_statistics(op.receiptor_account_uid, |s| {
            s.prepaid += entry.buyout_price;
        })?;

        db.store.modify(post_id, |post: &mut PostObject| {
            if entry.buyout_ratio < entry.cur_ratio {
                if let Some(seller) = post.receiptors.get_mut(&op.receiptor_account_uid) {
                    seller.cur_ratio = entry.cur_ratio - entry.buyout_ratio;
                    seller.to_buyout = false;
                    seller.buyout_ratio = 0;
                    seller.buyout_price = 0;
                    seller.buyout_expiration = 0;
                }
            } else {
                post.receiptors.remove(&op.receiptor_account_uid);
            }
            let buyer = post
                .receiptors
                .entry(op.from_account_uid)
                .or_insert_with(|| Receiptor::plain(0));
            buyer.cur_ratio += entry.buyout_ratio;
        })?;
        Ok(OperationResult::Void)
    }
}

#[derive(Default)]
pub(super) struct LicenseCreateEvaluator;

impl Evaluator for LicenseCreateEvaluator {
    type Op = LicenseCreate;

    fn evaluate(&mut self, db: &Database, _ctx: &OpContext, op: &LicenseCreate) -> Result<(), EvalError> {
        db.get_platform_by_owner(op.platform)?;
        let stats = db.get_account_statistics_by_uid(op.platform)?;
        if stats.last_license_sequence + 1 != op.license_lid {
            return Err(EvalError::Precondition(format!(
                "license lid {} is invalid; expected {}",
                op.license_lid,
                stats.last_license_sequence + 1
            )));
        }
        if db.find_license(op.platform, op.license_lid).is_some() {
            return Err(EvalError::Precondition(format!(
                "license {} already exists",
                op.license_lid
            )));
        }
        Ok(())
    }

    fn apply(
        &mut self,
        db: &mut Database,
        _ctx: &OpContext,
        op: &LicenseCreate,
    ) -> Result<OperationResult, EvalError> {
        db.modify_account_statistics(op.platform, |s| s.last_license_sequence += 1)?;
        let id = db.store.create(License {
            license_lid: op.license_lid,
            platform: op.platform,
            license_type: op.license_type,
            hash_value: op.hash_value.clone(),
            title: op.title.clone(),
            body: op.body.clone(),
            extra_data: op.extra_data.clone(),
            create_time: db.head_block_time(),
        });
        Ok(OperationResult::ObjectId(id))
    }
}
