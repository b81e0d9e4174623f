// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{Error, Fee};
use agora_types::{
    AccountUid, Amount, LicenseLid, PostPid, Share, Timestamp, FULL_PERCENT, MAX_RECEIPTORS,
    PLATFORM_RECEIPT_RATIO,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry of a post's receiptor map: the current revenue share and an
/// optional standing offer to sell part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiptor {
    pub cur_ratio: u32,
    pub to_buyout: bool,
    pub buyout_ratio: u32,
    pub buyout_price: Share,
    pub buyout_expiration: Timestamp,
}

impl Receiptor {
    pub fn plain(cur_ratio: u32) -> Self {
        Receiptor {
            cur_ratio,
            to_buyout: false,
            buyout_ratio: 0,
            buyout_price: 0,
            buyout_expiration: 0,
        }
    }
}

/// Validate a complete receiptor map: the platform holds exactly its fixed
/// ratio, nobody else exceeds the remainder, ratios sum to 100%, buyout
/// offers stay within their holder's share, and the map is bounded.
pub fn validate_receiptors(
    receiptors: &BTreeMap<AccountUid, Receiptor>,
    platform: AccountUid,
) -> Result<(), Error> {
    if receiptors.len() > MAX_RECEIPTORS {
        return Err(Error::InvalidOperation(format!(
            "receiptor map larger than {MAX_RECEIPTORS}"
        )));
    }
    let platform_entry = receiptors
        .get(&platform)
        .ok_or_else(|| Error::InvalidOperation("platform must be a receiptor".into()))?;
    if platform_entry.cur_ratio != PLATFORM_RECEIPT_RATIO {
        return Err(Error::InvalidOperation("platform ratio must be exactly 30%".into()));
    }
    let mut total: u64 = 0;
    for (uid, r) in receiptors {
        if *uid != platform && r.cur_ratio > FULL_PERCENT - PLATFORM_RECEIPT_RATIO {
            return Err(Error::InvalidOperation(
                "non-platform receiptor ratio above 70%".into(),
            ));
        }
        if r.to_buyout && r.buyout_ratio > r.cur_ratio {
            return Err(Error::InvalidOperation(
                "buyout ratio exceeds current ratio".into(),
            ));
        }
        total += r.cur_ratio as u64;
    }
    if total != FULL_PERCENT as u64 {
        return Err(Error::InvalidOperation("receiptor ratios must sum to 100%".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostType {
    Original,
    Comment,
    Forward,
    ForwardAndModify,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub fee: Fee,
    pub platform: AccountUid,
    pub poster: AccountUid,
    /// Must be the poster's `last_post_sequence + 1`.
    pub post_pid: PostPid,
    pub post_type: PostType,
    pub origin_platform: Option<AccountUid>,
    pub origin_poster: Option<AccountUid>,
    pub origin_post_pid: Option<PostPid>,
    pub hash_value: String,
    pub title: String,
    pub body: String,
    pub extra_data: String,
    pub forward_price: Option<Share>,
    pub receiptors: Option<BTreeMap<AccountUid, Receiptor>>,
    pub license_lid: Option<LicenseLid>,
    pub permission_flags: u32,
}

impl Post {
    pub fn is_derived(&self) -> bool {
        !matches!(self.post_type, PostType::Original)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.post_pid == 0 {
            return Err(Error::InvalidOperation("post pids start at 1".into()));
        }
        let origin_complete = self.origin_platform.is_some()
            && self.origin_poster.is_some()
            && self.origin_post_pid.is_some();
        if self.is_derived() && !origin_complete {
            return Err(Error::InvalidOperation(
                "derived posts need a complete origin reference".into(),
            ));
        }
        if !self.is_derived() && (self.origin_platform.is_some() || self.origin_poster.is_some() || self.origin_post_pid.is_some()) {
            return Err(Error::InvalidOperation("original posts carry no origin".into()));
        }
        if let Some(price) = self.forward_price {
            if price < 0 {
                return Err(Error::InvalidOperation("negative forward price".into()));
            }
        }
        if let Some(receiptors) = &self.receiptors {
            validate_receiptors(receiptors, self.platform)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostUpdate {
    pub fee: Fee,
    pub platform: AccountUid,
    pub poster: AccountUid,
    pub post_pid: PostPid,
    pub hash_value: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub extra_data: Option<String>,
    pub forward_price: Option<Share>,
    /// Receiptor whose buyout offer is being edited.
    pub receiptor: Option<AccountUid>,
    pub to_buyout: Option<bool>,
    pub buyout_ratio: Option<u32>,
    pub buyout_price: Option<Share>,
    pub buyout_expiration: Option<Timestamp>,
    pub license_lid: Option<LicenseLid>,
    pub permission_flags: Option<u32>,
}

impl PostUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        let has_content_change = self.hash_value.is_some()
            || self.title.is_some()
            || self.body.is_some()
            || self.extra_data.is_some();
        let has_param_change = self.forward_price.is_some()
            || self.receiptor.is_some()
            || self.license_lid.is_some()
            || self.permission_flags.is_some();
        if !has_content_change && !has_param_change {
            return Err(Error::InvalidOperation("nothing to update".into()));
        }
        if self.receiptor.is_none()
            && (self.to_buyout.is_some()
                || self.buyout_ratio.is_some()
                || self.buyout_price.is_some()
                || self.buyout_expiration.is_some())
        {
            return Err(Error::InvalidOperation(
                "buyout fields require naming the receiptor".into(),
            ));
        }
        if let Some(ratio) = self.buyout_ratio {
            if ratio > FULL_PERCENT {
                return Err(Error::InvalidOperation("buyout ratio above 100%".into()));
            }
        }
        Ok(())
    }
}

/// A signed appraisal of a post, spending the scorer's CSAF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCreate {
    pub fee: Fee,
    pub from_account_uid: AccountUid,
    pub platform: AccountUid,
    pub poster: AccountUid,
    pub post_pid: PostPid,
    /// In [-5, 5]; negative disapproves.
    pub score: i8,
    pub csaf: Share,
}

impl ScoreCreate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.score < -5 || self.score > 5 {
            return Err(Error::InvalidOperation("score outside [-5, 5]".into()));
        }
        if self.csaf <= 0 {
            return Err(Error::InvalidOperation("score must spend positive csaf".into()));
        }
        Ok(())
    }
}

/// Pay a post from the signer's balance; split across receiptors by ratio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub fee: Fee,
    pub from_account_uid: AccountUid,
    pub platform: AccountUid,
    pub poster: AccountUid,
    pub post_pid: PostPid,
    pub amount: Amount,
}

impl Reward {
    pub fn validate(&self) -> Result<(), Error> {
        if self.amount.amount <= 0 {
            return Err(Error::InvalidOperation("reward must be positive".into()));
        }
        Ok(())
    }
}

/// Platform-authorized reward paid from the signer's prepaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardProxy {
    pub fee: Fee,
    pub from_account_uid: AccountUid,
    pub platform: AccountUid,
    pub poster: AccountUid,
    pub post_pid: PostPid,
    pub amount: Share,
}

impl RewardProxy {
    pub fn validate(&self) -> Result<(), Error> {
        if self.amount <= 0 {
            return Err(Error::InvalidOperation("reward must be positive".into()));
        }
        Ok(())
    }
}

/// Accept a receiptor's standing buyout offer, paying from prepaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyout {
    pub fee: Fee,
    pub from_account_uid: AccountUid,
    pub platform: AccountUid,
    pub poster: AccountUid,
    pub post_pid: PostPid,
    pub receiptor_account_uid: AccountUid,
}

impl Buyout {
    pub fn validate(&self) -> Result<(), Error> {
        if self.from_account_uid == self.receiptor_account_uid {
            return Err(Error::InvalidOperation("cannot buy out own share".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseCreate {
    pub fee: Fee,
    pub platform: AccountUid,
    /// Must be the platform's `last_license_sequence + 1`.
    pub license_lid: LicenseLid,
    pub license_type: u8,
    pub hash_value: String,
    pub title: String,
    pub body: String,
    pub extra_data: String,
}

impl LicenseCreate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.license_lid == 0 {
            return Err(Error::InvalidOperation("license lids start at 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_receiptors(platform: AccountUid, poster: AccountUid) -> BTreeMap<AccountUid, Receiptor> {
        let mut m = BTreeMap::new();
        m.insert(platform, Receiptor::plain(PLATFORM_RECEIPT_RATIO));
        m.insert(poster, Receiptor::plain(FULL_PERCENT - PLATFORM_RECEIPT_RATIO));
        m
    }

    #[test]
    fn default_receiptor_map_is_valid() {
        validate_receiptors(&default_receiptors(10, 20), 10).unwrap();
    }

    #[test]
    fn platform_ratio_is_pinned() {
        let mut m = default_receiptors(10, 20);
        m.get_mut(&10).unwrap().cur_ratio = PLATFORM_RECEIPT_RATIO + 1;
        m.get_mut(&20).unwrap().cur_ratio -= 1;
        assert!(validate_receiptors(&m, 10).is_err());
    }

    #[test]
    fn ratios_must_sum_to_one() {
        let mut m = default_receiptors(10, 20);
        m.get_mut(&20).unwrap().cur_ratio -= 5;
        assert!(validate_receiptors(&m, 10).is_err());
    }

    #[test]
    fn receiptor_cap_is_enforced() {
        let mut m = default_receiptors(10, 20);
        m.get_mut(&20).unwrap().cur_ratio = 70 * 100 - 4;
        for uid in 30..34 {
            m.insert(uid, Receiptor::plain(1));
        }
        assert!(m.len() > MAX_RECEIPTORS);
        assert!(validate_receiptors(&m, 10).is_err());
    }

    #[test]
    fn score_range_is_checked() {
        let mut op = ScoreCreate {
            fee: Fee::default(),
            from_account_uid: 1,
            platform: 2,
            poster: 3,
            post_pid: 1,
            score: 6,
            csaf: 1,
        };
        assert!(op.validate().is_err());
        op.score = -5;
        op.validate().unwrap();
    }
}
