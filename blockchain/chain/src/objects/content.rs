// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use agora_db::{ChainObject, IndexKey, KeyWriter};
use agora_message::operations::Receiptor;
use agora_types::{AccountUid, AssetAid, LicenseLid, PostPid, Share, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A post, identified by (platform, poster, pid). Content fields hold
/// hashes and bodies; economic fields drive forwards, rewards and buyouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub platform: AccountUid,
    pub poster: AccountUid,
    pub post_pid: PostPid,

    pub origin_platform: Option<AccountUid>,
    pub origin_poster: Option<AccountUid>,
    pub origin_post_pid: Option<PostPid>,

    pub hash_value: String,
    pub title: String,
    pub body: String,
    pub extra_data: String,

    pub receiptors: BTreeMap<AccountUid, Receiptor>,
    pub forward_price: Option<Share>,
    pub license_lid: Option<LicenseLid>,
    pub permission_flags: u32,
    /// Scorer settlement is one-shot per post.
    pub score_settlement: bool,

    pub create_time: Timestamp,
    pub last_update_time: Timestamp,
}

impl Post {
    pub fn allows(&self, permission_bit: u32) -> bool {
        self.permission_flags & permission_bit != 0
    }
}

pub mod post_idx {
    pub const BY_POST: usize = 0;
}

impl ChainObject for Post {
    const TYPE_NAME: &'static str = "post";
    const INDEX_COUNT: usize = 1;

    fn index_keys(&self, _id: u64) -> Vec<IndexKey> {
        vec![KeyWriter::default()
            .u64(self.platform)
            .u64(self.poster)
            .u64(self.post_pid)
            .finish()]
    }
}

/// Per-receiptor accumulation within one award period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptorDetail {
    pub forward: Share,
    pub post_award: Share,
    pub rewards: BTreeMap<AssetAid, Share>,
}

/// A post's activity within one award period; settled and eventually
/// cleared once the period leaves the retained window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePost {
    pub platform: AccountUid,
    pub poster: AccountUid,
    pub post_pid: PostPid,
    pub period_sequence: u64,

    /// Instance ids of the period's score rows.
    pub scores: Vec<u64>,
    pub total_csaf: Share,
    pub total_rewards: BTreeMap<AssetAid, Share>,

    pub positive_win: bool,
    pub post_award: Share,
    pub forward_award: Share,
    pub receiptor_details: BTreeMap<AccountUid, ReceiptorDetail>,
}

impl ActivePost {
    pub fn new(
        platform: AccountUid,
        poster: AccountUid,
        post_pid: PostPid,
        period_sequence: u64,
    ) -> Self {
        ActivePost {
            platform,
            poster,
            post_pid,
            period_sequence,
            scores: Vec::new(),
            total_csaf: 0,
            total_rewards: BTreeMap::new(),
            positive_win: false,
            post_award: 0,
            forward_award: 0,
            receiptor_details: BTreeMap::new(),
        }
    }

    pub fn credit_receiptor_award(&mut self, uid: AccountUid, post_award: Share) {
        self.receiptor_details.entry(uid).or_default().post_award += post_award;
    }

    pub fn credit_receiptor_forward(&mut self, uid: AccountUid, forward: Share) {
        self.receiptor_details.entry(uid).or_default().forward += forward;
    }

    pub fn credit_receiptor_reward(&mut self, uid: AccountUid, asset: AssetAid, amount: Share) {
        *self
            .receiptor_details
            .entry(uid)
            .or_default()
            .rewards
            .entry(asset)
            .or_insert(0) += amount;
    }
}

pub mod active_post_idx {
    pub const BY_POST_PERIOD: usize = 0;
    pub const BY_PERIOD: usize = 1;
}

impl ChainObject for ActivePost {
    const TYPE_NAME: &'static str = "active_post";
    const INDEX_COUNT: usize = 2;

    fn index_keys(&self, id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default()
                .u64(self.platform)
                .u64(self.poster)
                .u64(self.post_pid)
                .u64(self.period_sequence)
                .finish(),
            KeyWriter::default().u64(self.period_sequence).u64(id).finish(),
        ]
    }
}

/// One account's appraisal of one post. At most one per (scorer, post).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub from_account_uid: AccountUid,
    pub platform: AccountUid,
    pub poster: AccountUid,
    pub post_pid: PostPid,
    /// In [-5, 5]; the sign decides approval.
    pub score: i8,
    pub csaf: Share,
    pub period_sequence: u64,
    /// Payout credited at settlement.
    pub profits: Share,
    pub create_time: Timestamp,
}

pub mod score_idx {
    pub const BY_POST_FROM: usize = 0;
    pub const BY_POST_PERIOD: usize = 1;
    pub const BY_CREATE_TIME: usize = 2;
}

impl ChainObject for Score {
    const TYPE_NAME: &'static str = "score";
    const INDEX_COUNT: usize = 3;

    fn index_keys(&self, id: u64) -> Vec<IndexKey> {
        vec![
            KeyWriter::default()
                .u64(self.platform)
                .u64(self.poster)
                .u64(self.post_pid)
                .u64(self.from_account_uid)
                .finish(),
            KeyWriter::default()
                .u64(self.platform)
                .u64(self.poster)
                .u64(self.post_pid)
                .u64(self.period_sequence)
                .u64(id)
                .finish(),
            KeyWriter::default().u32(self.create_time).u64(id).finish(),
        ]
    }
}

/// A content license published by a platform; posts reference it by lid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub license_lid: LicenseLid,
    pub platform: AccountUid,
    pub license_type: u8,
    pub hash_value: String,
    pub title: String,
    pub body: String,
    pub extra_data: String,
    pub create_time: Timestamp,
}

pub mod license_idx {
    pub const BY_PLATFORM_LID: usize = 0;
}

impl ChainObject for License {
    const TYPE_NAME: &'static str = "license";
    const INDEX_COUNT: usize = 1;

    fn index_keys(&self, _id: u64) -> Vec<IndexKey> {
        vec![KeyWriter::default().u64(self.platform).u64(self.license_lid).finish()]
    }
}
