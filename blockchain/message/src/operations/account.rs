// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{Authority, Error, Fee};
use agora_crypto::PublicKey;
use agora_types::{AccountUid, AssetAid, Share, FULL_PERCENT, PROXY_TO_SELF_UID};
use serde::{Deserialize, Serialize};

/// Registration lineage of a new account: who registered it, who referred
/// it, and how referral rewards split between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegInfo {
    pub registrar: AccountUid,
    pub referrer: AccountUid,
    pub lifetime_referrer: AccountUid,
    /// Portion of referral rewards going to the referrer; the registrar
    /// keeps the rest.
    pub referrer_rewards_percentage: u32,
}

impl RegInfo {
    pub fn validate(&self) -> Result<(), Error> {
        if self.referrer_rewards_percentage > FULL_PERCENT {
            return Err(Error::InvalidOperation(
                "referrer rewards percentage above 100%".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountCreate {
    pub fee: Fee,
    pub uid: AccountUid,
    pub name: String,
    pub owner: Authority,
    pub active: Authority,
    pub secondary: Authority,
    pub memo_key: PublicKey,
    pub reg_info: RegInfo,
}

impl AccountCreate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() || self.name.len() > 63 {
            return Err(Error::InvalidOperation("account name length out of range".into()));
        }
        if !self
            .name
            .bytes()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'-' || c == b'.')
            || !self.name.as_bytes()[0].is_ascii_lowercase()
        {
            return Err(Error::InvalidOperation(format!("malformed account name {:?}", self.name)));
        }
        self.owner.validate()?;
        self.active.validate()?;
        self.secondary.validate()?;
        self.reg_info.validate()
    }
}

/// Registrar toggles of a managed account's posting permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountManage {
    pub fee: Fee,
    pub executor: AccountUid,
    pub account: AccountUid,
    pub can_post: Option<bool>,
    pub can_reply: Option<bool>,
    pub can_rate: Option<bool>,
}

impl AccountManage {
    pub fn validate(&self) -> Result<(), Error> {
        if self.can_post.is_none() && self.can_reply.is_none() && self.can_rate.is_none() {
            return Err(Error::InvalidOperation("nothing to manage".into()));
        }
        Ok(())
    }
}

/// Replace one key by another within active and/or secondary authority,
/// keeping its weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdateKey {
    pub fee: Fee,
    pub uid: AccountUid,
    pub old_key: PublicKey,
    pub new_key: PublicKey,
    pub update_active: bool,
    pub update_secondary: bool,
}

impl AccountUpdateKey {
    pub fn validate(&self) -> Result<(), Error> {
        if !self.update_active && !self.update_secondary {
            return Err(Error::InvalidOperation("no authority selected".into()));
        }
        if self.old_key == self.new_key {
            return Err(Error::InvalidOperation("new key equals old key".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountUpdateAuth {
    pub fee: Fee,
    pub uid: AccountUid,
    pub owner: Option<Authority>,
    pub active: Option<Authority>,
    pub secondary: Option<Authority>,
    pub memo_key: Option<PublicKey>,
}

impl AccountUpdateAuth {
    pub fn validate(&self) -> Result<(), Error> {
        if self.owner.is_none()
            && self.active.is_none()
            && self.secondary.is_none()
            && self.memo_key.is_none()
        {
            return Err(Error::InvalidOperation("nothing to update".into()));
        }
        for auth in [&self.owner, &self.active, &self.secondary].into_iter().flatten() {
            auth.validate()?;
        }
        Ok(())
    }
}

/// Grant a platform a bounded prepaid draw plus an action bitmask on behalf
/// of the account. Also places the platform into the account's secondary
/// authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAuthPlatform {
    pub fee: Fee,
    pub uid: AccountUid,
    pub platform: AccountUid,
    pub max_limit: Share,
    pub permission_flags: u32,
    pub memo: Option<String>,
}

impl AccountAuthPlatform {
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_limit < 0 {
            return Err(Error::InvalidOperation("negative prepaid limit".into()));
        }
        if self.uid == self.platform {
            return Err(Error::InvalidOperation("cannot authorize self as platform".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCancelAuthPlatform {
    pub fee: Fee,
    pub uid: AccountUid,
    pub platform: AccountUid,
}

impl AccountCancelAuthPlatform {
    pub fn validate(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Route the voter's governance votes through a proxy, or back to self with
/// the [`PROXY_TO_SELF_UID`] sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdateProxy {
    pub fee: Fee,
    pub voter: AccountUid,
    pub proxy: AccountUid,
}

impl AccountUpdateProxy {
    pub fn validate(&self) -> Result<(), Error> {
        if self.voter == self.proxy {
            return Err(Error::InvalidOperation(format!(
                "self-proxy is expressed as uid {PROXY_TO_SELF_UID}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEnableAllowedAssets {
    pub fee: Fee,
    pub account: AccountUid,
    pub enable: bool,
}

impl AccountEnableAllowedAssets {
    pub fn validate(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdateAllowedAssets {
    pub fee: Fee,
    pub account: AccountUid,
    pub assets_to_add: Vec<AssetAid>,
    pub assets_to_remove: Vec<AssetAid>,
}

impl AccountUpdateAllowedAssets {
    pub fn validate(&self) -> Result<(), Error> {
        if self.assets_to_add.is_empty() && self.assets_to_remove.is_empty() {
            return Err(Error::InvalidOperation("no assets listed".into()));
        }
        if self.assets_to_add.iter().any(|a| self.assets_to_remove.contains(a)) {
            return Err(Error::InvalidOperation("asset both added and removed".into()));
        }
        Ok(())
    }
}

pub mod listing {
    pub const NO_LISTING: u8 = 0;
    pub const WHITE_LISTED: u8 = 1;
    pub const BLACK_LISTED: u8 = 2;
}

/// Place `account_to_list` on the authorizing account's white and/or black
/// list, as consulted by whitelist-flagged assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountWhitelist {
    pub fee: Fee,
    pub authorizing_account: AccountUid,
    pub account_to_list: AccountUid,
    pub new_listing: u8,
}

impl AccountWhitelist {
    pub fn validate(&self) -> Result<(), Error> {
        if self.new_listing & !(listing::WHITE_LISTED | listing::BLACK_LISTED) != 0 {
            return Err(Error::InvalidOperation("unknown listing bits".into()));
        }
        if self.new_listing == (listing::WHITE_LISTED | listing::BLACK_LISTED) {
            return Err(Error::InvalidOperation(
                "account cannot be white- and black-listed at once".into(),
            ));
        }
        Ok(())
    }
}
