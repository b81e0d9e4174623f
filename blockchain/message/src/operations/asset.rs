// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{Error, Fee};
use agora_types::{asset_flags, AccountUid, Amount, AssetAid, Share, MAX_SHARE_SUPPLY};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub fee: Fee,
    pub from: AccountUid,
    pub to: AccountUid,
    pub amount: Amount,
    pub memo: Option<String>,
    /// Draw the amount from the sender's prepaid instead of balance
    /// (core asset only).
    pub from_prepaid: bool,
    /// Credit the recipient's prepaid instead of balance (core asset only).
    pub to_prepaid: bool,
}

impl Transfer {
    pub fn validate(&self) -> Result<(), Error> {
        if self.amount.amount <= 0 {
            return Err(Error::InvalidOperation("transfer amount must be positive".into()));
        }
        if self.from == self.to {
            return Err(Error::InvalidOperation("transfer to self".into()));
        }
        if (self.from_prepaid || self.to_prepaid) && !self.amount.is_core() {
            return Err(Error::InvalidOperation("prepaid transfers are core-asset only".into()));
        }
        Ok(())
    }
}

/// Issuer-forced transfer of an override-authority asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideTransfer {
    pub fee: Fee,
    pub issuer: AccountUid,
    pub from: AccountUid,
    pub to: AccountUid,
    pub amount: Amount,
    pub memo: Option<String>,
}

impl OverrideTransfer {
    pub fn validate(&self) -> Result<(), Error> {
        if self.amount.amount <= 0 {
            return Err(Error::InvalidOperation("transfer amount must be positive".into()));
        }
        if self.from == self.to {
            return Err(Error::InvalidOperation("transfer to self".into()));
        }
        if self.issuer == self.from {
            return Err(Error::InvalidOperation("issuer would be overriding itself".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCreate {
    pub fee: Fee,
    pub issuer: AccountUid,
    pub symbol: String,
    pub precision: u8,
    pub max_supply: Share,
    pub flags: u16,
    pub permissions: u16,
    /// Supply credited to the issuer at creation.
    pub initial_supply: Share,
    pub description: String,
}

impl AssetCreate {
    pub fn validate(&self) -> Result<(), Error> {
        let symbol_ok = self.symbol.len() >= 3
            && self.symbol.len() <= 8
            && self.symbol.bytes().all(|c| c.is_ascii_uppercase())
            ;
        if !symbol_ok {
            return Err(Error::InvalidOperation(format!("malformed symbol {:?}", self.symbol)));
        }
        if self.precision > 12 {
            return Err(Error::InvalidOperation("precision above 12".into()));
        }
        if self.max_supply <= 0 || self.max_supply > MAX_SHARE_SUPPLY {
            return Err(Error::InvalidOperation("max supply out of range".into()));
        }
        if self.initial_supply < 0 || self.initial_supply > self.max_supply {
            return Err(Error::InvalidOperation("initial supply out of range".into()));
        }
        if self.permissions & !asset_flags::ASSET_PERMISSION_MASK != 0 {
            return Err(Error::InvalidOperation("unknown permission bits".into()));
        }
        if self.flags & !self.permissions != 0 {
            return Err(Error::InvalidOperation("flags exceed permissions".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetIssue {
    pub fee: Fee,
    pub issuer: AccountUid,
    pub asset_to_issue: Amount,
    pub issue_to_account: AccountUid,
}

impl AssetIssue {
    pub fn validate(&self) -> Result<(), Error> {
        if self.asset_to_issue.amount <= 0 {
            return Err(Error::InvalidOperation("issue amount must be positive".into()));
        }
        if self.asset_to_issue.is_core() {
            return Err(Error::InvalidOperation("core asset cannot be issued".into()));
        }
        Ok(())
    }
}

/// Burn some of the payer's balance back into the unissued reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReserve {
    pub fee: Fee,
    pub payer: AccountUid,
    pub amount_to_reserve: Amount,
}

impl AssetReserve {
    pub fn validate(&self) -> Result<(), Error> {
        if self.amount_to_reserve.amount <= 0 {
            return Err(Error::InvalidOperation("reserve amount must be positive".into()));
        }
        if self.amount_to_reserve.is_core() {
            return Err(Error::InvalidOperation("core asset cannot be reserved".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetUpdate {
    pub fee: Fee,
    pub issuer: AccountUid,
    pub asset_to_update: AssetAid,
    pub new_issuer: Option<AccountUid>,
    pub new_flags: Option<u16>,
    pub new_max_supply: Option<Share>,
    pub new_description: Option<String>,
}

impl AssetUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.new_issuer.is_none()
            && self.new_flags.is_none()
            && self.new_max_supply.is_none()
            && self.new_description.is_none()
        {
            return Err(Error::InvalidOperation("nothing to update".into()));
        }
        if let Some(max) = self.new_max_supply {
            if max <= 0 || max > MAX_SHARE_SUPPLY {
                return Err(Error::InvalidOperation("max supply out of range".into()));
            }
        }
        Ok(())
    }
}

/// Claim fees accumulated in the asset's dynamic data to the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetClaimFees {
    pub fee: Fee,
    pub issuer: AccountUid,
    pub amount_to_claim: Amount,
}

impl AssetClaimFees {
    pub fn validate(&self) -> Result<(), Error> {
        if self.amount_to_claim.amount <= 0 {
            return Err(Error::InvalidOperation("claim amount must be positive".into()));
        }
        Ok(())
    }
}
