// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Signature requirement resolution: given a transaction and the three
//! authority lookup functions, decide which keys must sign, verify that the
//! provided signatures satisfy every operation's declared authority, and
//! enumerate the keys that could ever contribute. Authority graphs may
//! reference other accounts; walks are bounded by `max_depth` so cycles
//! terminate.

use crate::{AuthClass, Authority, Error, SignedTransaction};
use agora_crypto::{PublicKey, Sha256Digest};
use agora_types::AccountUid;
use std::collections::BTreeSet;

/// Resolves `(account, class)` to that account's authority, or `None` for a
/// missing account.
pub type AuthorityLookup<'a> = dyn Fn(AccountUid, AuthClass) -> Option<Authority> + 'a;

struct SignState<'a> {
    available: &'a BTreeSet<PublicKey>,
    used: BTreeSet<PublicKey>,
    approved: BTreeSet<(AccountUid, AuthClass)>,
    lookup: &'a AuthorityLookup<'a>,
    max_depth: u32,
}

impl<'a> SignState<'a> {
    fn new(
        available: &'a BTreeSet<PublicKey>,
        lookup: &'a AuthorityLookup<'a>,
        max_depth: u32,
    ) -> Self {
        SignState { available, used: BTreeSet::new(), approved: BTreeSet::new(), lookup, max_depth }
    }

    /// Greedy threshold check: counts available keys first, then walks
    /// nested account authorities while depth remains.
    fn check_authority(&mut self, auth: &Authority, depth: u32) -> bool {
        let threshold = auth.weight_threshold as u64;
        if threshold == 0 {
            return true;
        }
        let mut weight: u64 = 0;
        for (key, key_weight) in &auth.key_auths {
            if self.available.contains(key) {
                self.used.insert(*key);
                weight += *key_weight as u64;
                if weight >= threshold {
                    return true;
                }
            }
        }
        for (account_ref, ref_weight) in &auth.account_auths {
            let entry = (account_ref.uid, account_ref.class);
            let satisfied = if self.approved.contains(&entry) {
                true
            } else if depth < self.max_depth {
                match (self.lookup)(account_ref.uid, account_ref.class) {
                    Some(nested) => {
                        let ok = self.check_authority(&nested, depth + 1);
                        if ok {
                            self.approved.insert(entry);
                        }
                        ok
                    }
                    None => false,
                }
            } else {
                false
            };
            if satisfied {
                weight += *ref_weight as u64;
                if weight >= threshold {
                    return true;
                }
            }
        }
        false
    }

    /// Check a requirement of `class` on `account`, allowing any stronger
    /// class to satisfy it.
    fn check_account(&mut self, account: AccountUid, class: AuthClass) -> bool {
        for candidate in class.satisfying_classes() {
            if let Some(auth) = (self.lookup)(account, *candidate) {
                if self.check_authority(&auth, 0) {
                    return true;
                }
            }
        }
        false
    }
}

/// The distinct `(account, class)` authority requirements of a transaction.
pub fn required_authorities(tx: &SignedTransaction) -> Vec<(AccountUid, AuthClass)> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for op in &tx.transaction.operations {
        let required = op.required_auth();
        if seen.insert(required) {
            out.push(required);
        }
    }
    out
}

/// Fail unless the transaction's signatures satisfy every operation's
/// authority requirement.
pub fn verify_authority(
    tx: &SignedTransaction,
    chain_id: &Sha256Digest,
    lookup: &AuthorityLookup<'_>,
    max_depth: u32,
) -> Result<(), Error> {
    let provided: BTreeSet<PublicKey> = tx.recovered_signers(chain_id)?.iter().copied().collect();
    let mut state = SignState::new(&provided, lookup, max_depth);
    for (account, class) in required_authorities(tx) {
        if !state.check_account(account, class) {
            return Err(Error::MissingAuthority { account });
        }
    }
    Ok(())
}

/// The minimal subset of `available_keys` that satisfies the transaction,
/// greedily selected, plus the keys of signatures already present.
pub fn get_required_signatures(
    tx: &SignedTransaction,
    chain_id: &Sha256Digest,
    available_keys: &BTreeSet<PublicKey>,
    lookup: &AuthorityLookup<'_>,
    max_depth: u32,
) -> Result<BTreeSet<PublicKey>, Error> {
    let existing: BTreeSet<PublicKey> = tx.recovered_signers(chain_id)?.iter().copied().collect();
    let usable: BTreeSet<PublicKey> = available_keys.union(&existing).copied().collect();
    let mut state = SignState::new(&usable, lookup, max_depth);
    for (account, class) in required_authorities(tx) {
        if !state.check_account(account, class) {
            return Err(Error::MissingAuthority { account });
        }
    }
    // keys already present as signatures are not reported back
    let mut used = state.used;
    for key in &existing {
        used.remove(key);
    }
    Ok(used)
}

/// Every key that could contribute to the transaction's authorities at any
/// depth of the walk.
pub fn get_potential_signatures(
    tx: &SignedTransaction,
    lookup: &AuthorityLookup<'_>,
    max_depth: u32,
) -> BTreeSet<PublicKey> {
    let mut keys = BTreeSet::new();
    let mut visited = BTreeSet::new();
    for (account, class) in required_authorities(tx) {
        for candidate in class.satisfying_classes() {
            collect_keys(account, *candidate, lookup, max_depth, &mut keys, &mut visited, 0);
        }
    }
    keys
}

fn collect_keys(
    account: AccountUid,
    class: AuthClass,
    lookup: &AuthorityLookup<'_>,
    max_depth: u32,
    keys: &mut BTreeSet<PublicKey>,
    visited: &mut BTreeSet<(AccountUid, AuthClass)>,
    depth: u32,
) {
    if !visited.insert((account, class)) {
        return;
    }
    let Some(auth) = lookup(account, class) else {
        return;
    };
    keys.extend(auth.key_auths.keys().copied());
    if depth < max_depth {
        for account_ref in auth.account_auths.keys() {
            collect_keys(
                account_ref.uid,
                account_ref.class,
                lookup,
                max_depth,
                keys,
                visited,
                depth + 1,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::Transfer;
    use crate::{AccountAuthRef, Fee, Operation, Transaction};
    use agora_crypto::PrivateKey;
    use agora_types::Amount;
    use std::collections::BTreeMap;

    const CHAIN_ID: Sha256Digest = [5u8; 32];

    fn transfer_tx(from: AccountUid) -> SignedTransaction {
        SignedTransaction::new(Transaction::new(
            500,
            vec![Operation::Transfer(Transfer {
                fee: Fee::from_balance(1),
                from,
                to: 999,
                amount: Amount::core(5),
                memo: None,
                from_prepaid: false,
                to_prepaid: false,
            })],
        ))
    }

    struct World {
        auths: BTreeMap<(AccountUid, AuthClass), Authority>,
    }

    impl World {
        fn lookup(&self) -> impl Fn(AccountUid, AuthClass) -> Option<Authority> + '_ {
            |uid, class| self.auths.get(&(uid, class)).cloned()
        }
    }

    fn single_key_world(uid: AccountUid, key: &PrivateKey) -> World {
        let mut auths = BTreeMap::new();
        for class in [AuthClass::Owner, AuthClass::Active, AuthClass::Secondary] {
            auths.insert((uid, class), Authority::single_key(key.public_key()));
        }
        World { auths }
    }

    #[test]
    fn direct_key_satisfies() {
        let key = PrivateKey::from_seed("alice");
        let world = single_key_world(100, &key);
        let mut tx = transfer_tx(100);
        tx.sign(&key, &CHAIN_ID);
        verify_authority(&tx, &CHAIN_ID, &world.lookup(), 2).unwrap();
    }

    #[test]
    fn missing_signature_is_rejected() {
        let key = PrivateKey::from_seed("alice");
        let world = single_key_world(100, &key);
        let mut tx = transfer_tx(100);
        tx.sign(&PrivateKey::from_seed("mallory"), &CHAIN_ID);
        assert_eq!(
            verify_authority(&tx, &CHAIN_ID, &world.lookup(), 2),
            Err(Error::MissingAuthority { account: 100 })
        );
    }

    #[test]
    fn nested_account_authority_resolves() {
        let parent_key = PrivateKey::from_seed("parent");
        let mut world = single_key_world(200, &parent_key);
        // account 100's authorities defer to account 200's active authority
        let mut nested = Authority::default();
        nested.add_account(AccountAuthRef::active(200), 1);
        for class in [AuthClass::Owner, AuthClass::Active, AuthClass::Secondary] {
            world.auths.insert((100, class), nested.clone());
        }
        let mut tx = transfer_tx(100);
        tx.sign(&parent_key, &CHAIN_ID);
        verify_authority(&tx, &CHAIN_ID, &world.lookup(), 2).unwrap();
    }

    #[test]
    fn authority_cycles_are_bounded() {
        // 100 -> 200 -> 100 with no keys anywhere: never satisfiable, and
        // must terminate
        let mut auths = BTreeMap::new();
        let mut a = Authority::default();
        a.add_account(AccountAuthRef::active(200), 1);
        let mut b = Authority::default();
        b.add_account(AccountAuthRef::active(100), 1);
        for class in [AuthClass::Owner, AuthClass::Active, AuthClass::Secondary] {
            auths.insert((100, class), a.clone());
            auths.insert((200, class), b.clone());
        }
        let world = World { auths };
        let mut tx = transfer_tx(100);
        tx.sign(&PrivateKey::from_seed("any"), &CHAIN_ID);
        assert!(verify_authority(&tx, &CHAIN_ID, &world.lookup(), 3).is_err());
    }

    #[test]
    fn required_signatures_are_minimal() {
        let key_a = PrivateKey::from_seed("a");
        let key_b = PrivateKey::from_seed("b");
        let mut auth = Authority::single_key(key_a.public_key());
        auth.key_auths.insert(key_b.public_key(), 1);
        // threshold 1: either key works, greedy selection picks one
        let mut auths = BTreeMap::new();
        for class in [AuthClass::Owner, AuthClass::Active, AuthClass::Secondary] {
            auths.insert((100, class), auth.clone());
        }
        let world = World { auths };
        let tx = transfer_tx(100);
        let available: BTreeSet<_> = [key_a.public_key(), key_b.public_key()].into();
        let required =
            get_required_signatures(&tx, &CHAIN_ID, &available, &world.lookup(), 2).unwrap();
        assert_eq!(required.len(), 1);
    }

    #[test]
    fn potential_signatures_cover_nested_keys() {
        let parent_key = PrivateKey::from_seed("parent");
        let mut world = single_key_world(200, &parent_key);
        let own_key = PrivateKey::from_seed("own");
        let mut auth = Authority::single_key(own_key.public_key());
        auth.add_account(AccountAuthRef::active(200), 1);
        for class in [AuthClass::Owner, AuthClass::Active, AuthClass::Secondary] {
            world.auths.insert((100, class), auth.clone());
        }
        let tx = transfer_tx(100);
        let potential = get_potential_signatures(&tx, &world.lookup(), 2);
        assert!(potential.contains(&own_key.public_key()));
        assert!(potential.contains(&parent_key.public_key()));
    }
}
