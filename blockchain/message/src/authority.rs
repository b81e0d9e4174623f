// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::Error;
use agora_crypto::PublicKey;
use agora_types::{AccountUid, MAX_AUTHORITY_MEMBERSHIP};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which of an account's three authorities a reference points at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum AuthClass {
    Owner,
    Active,
    Secondary,
}

impl AuthClass {
    /// Classes that may satisfy a requirement of `self`, strongest first.
    /// Owner subsumes active, active subsumes secondary.
    pub fn satisfying_classes(self) -> &'static [AuthClass] {
        match self {
            AuthClass::Owner => &[AuthClass::Owner],
            AuthClass::Active => &[AuthClass::Active, AuthClass::Owner],
            AuthClass::Secondary => {
                &[AuthClass::Secondary, AuthClass::Active, AuthClass::Owner]
            }
        }
    }
}

/// A weighted reference to another account's authority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AccountAuthRef {
    pub uid: AccountUid,
    pub class: AuthClass,
}

impl AccountAuthRef {
    pub fn secondary(uid: AccountUid) -> Self {
        AccountAuthRef { uid, class: AuthClass::Secondary }
    }

    pub fn active(uid: AccountUid) -> Self {
        AccountAuthRef { uid, class: AuthClass::Active }
    }
}

/// A weight-threshold authority over keys and other accounts. Satisfied when
/// the weights of the signing keys and the satisfied nested account
/// authorities sum to at least the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub weight_threshold: u32,
    pub account_auths: BTreeMap<AccountAuthRef, u16>,
    pub key_auths: BTreeMap<PublicKey, u16>,
}

impl Default for Authority {
    fn default() -> Self {
        Authority {
            weight_threshold: 1,
            account_auths: BTreeMap::new(),
            key_auths: BTreeMap::new(),
        }
    }
}

impl Authority {
    /// Single-key authority with threshold 1.
    pub fn single_key(key: PublicKey) -> Self {
        let mut key_auths = BTreeMap::new();
        key_auths.insert(key, 1);
        Authority { weight_threshold: 1, account_auths: BTreeMap::new(), key_auths }
    }

    pub fn add_account(&mut self, auth: AccountAuthRef, weight: u16) {
        self.account_auths.insert(auth, weight);
    }

    pub fn remove_account(&mut self, auth: &AccountAuthRef) -> bool {
        self.account_auths.remove(auth).is_some()
    }

    pub fn num_auths(&self) -> usize {
        self.account_auths.len() + self.key_auths.len()
    }

    pub fn referenced_accounts(&self) -> impl Iterator<Item = AccountUid> + '_ {
        self.account_auths.keys().map(|a| a.uid)
    }

    /// An authority no combination of signatures can ever satisfy.
    pub fn is_impossible(&self) -> bool {
        let total: u64 = self
            .account_auths
            .values()
            .chain(self.key_auths.values())
            .map(|w| *w as u64)
            .sum();
        total < self.weight_threshold as u64
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.weight_threshold == 0 {
            return Err(Error::InvalidAuthority("threshold may not be zero".into()));
        }
        if self.num_auths() > MAX_AUTHORITY_MEMBERSHIP {
            return Err(Error::InvalidAuthority(format!(
                "authority has {} members, maximum is {}",
                self.num_auths(),
                MAX_AUTHORITY_MEMBERSHIP
            )));
        }
        if self.is_impossible() {
            return Err(Error::InvalidAuthority(
                "total member weight below threshold".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_crypto::PrivateKey;

    #[test]
    fn impossible_authority_detected() {
        let mut auth = Authority::single_key(PrivateKey::from_seed("k").public_key());
        auth.weight_threshold = 2;
        assert!(auth.is_impossible());
        assert!(auth.validate().is_err());
    }

    #[test]
    fn membership_bound_enforced() {
        let mut auth = Authority::default();
        for i in 0..(MAX_AUTHORITY_MEMBERSHIP + 1) {
            auth.add_account(AccountAuthRef::active(100 + i as u64), 1);
        }
        assert!(auth.validate().is_err());
    }

    #[test]
    fn secondary_requirement_satisfiable_by_owner() {
        assert!(AuthClass::Secondary.satisfying_classes().contains(&AuthClass::Owner));
        assert!(!AuthClass::Owner.satisfying_classes().contains(&AuthClass::Active));
    }
}
