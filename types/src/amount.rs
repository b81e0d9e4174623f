// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{AssetAid, CORE_ASSET_AID, FULL_PERCENT};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// A signed 64-bit count of asset satoshis. All consensus arithmetic that can
/// exceed 64 bits goes through the 128-bit helpers below.
pub type Share = i64;

/// An amount of a specific asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub amount: Share,
    pub asset_aid: AssetAid,
}

impl Amount {
    pub fn new(amount: Share, asset_aid: AssetAid) -> Self {
        Amount { amount, asset_aid }
    }

    pub fn core(amount: Share) -> Self {
        Amount { amount, asset_aid: CORE_ASSET_AID }
    }

    pub fn is_core(&self) -> bool {
        self.asset_aid == CORE_ASSET_AID
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount::core(0)
    }
}

impl Neg for Amount {
    type Output = Amount;
    fn neg(self) -> Amount {
        Amount { amount: -self.amount, asset_aid: self.asset_aid }
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        debug_assert_eq!(self.asset_aid, rhs.asset_aid);
        Amount { amount: self.amount + rhs.amount, asset_aid: self.asset_aid }
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        debug_assert_eq!(self.asset_aid, rhs.asset_aid);
        self.amount += rhs.amount;
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Amount) -> Amount {
        debug_assert_eq!(self.asset_aid, rhs.asset_aid);
        Amount { amount: self.amount - rhs.amount, asset_aid: self.asset_aid }
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        debug_assert_eq!(self.asset_aid, rhs.asset_aid);
        self.amount -= rhs.amount;
    }
}

/// `value * num / den` with a 128-bit intermediate, truncating toward zero.
pub fn mul_div(value: Share, num: u64, den: u64) -> Share {
    debug_assert!(den > 0);
    ((value as i128) * (num as i128) / (den as i128)) as Share
}

/// `value * ratio / FULL_PERCENT` with a 128-bit intermediate.
pub fn apply_ratio(value: Share, ratio: u32) -> Share {
    mul_div(value, ratio as u64, FULL_PERCENT as u64)
}

/// Unsigned 128-bit pro-rating used by award distribution:
/// `total * part / whole`, saturating into `Share`.
pub fn prorate_u128(total: u128, part: u128, whole: u128) -> Share {
    debug_assert!(whole > 0);
    let v = total * part / whole;
    if v > i64::MAX as u128 { i64::MAX } else { v as Share }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_uses_wide_intermediate() {
        // would overflow i64 if computed naively
        let v = mul_div(i64::MAX / 2, 4, 2);
        assert_eq!(v, i64::MAX - 1);
    }

    #[test]
    fn ratio_of_full_percent_is_identity() {
        assert_eq!(apply_ratio(123_456_789, FULL_PERCENT), 123_456_789);
        assert_eq!(apply_ratio(1_000, 3_000), 300);
    }

    #[test]
    fn prorate_truncates() {
        assert_eq!(prorate_u128(100, 1, 3), 33);
        assert_eq!(prorate_u128(u128::MAX / 2, 2, 1), i64::MAX);
    }
}
