// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::errors::Error;
use crate::Database;
use agora_message::{AuthClass, Authority, SignedTransaction};
use agora_types::{AccountUid, MAX_AUTHORITY_RECURSION_DEPTH};

impl Database {
    fn authority_lookup(&self) -> impl Fn(AccountUid, AuthClass) -> Option<Authority> + '_ {
        |uid, class| self.find_account_by_uid(uid).map(|a| a.authority(class).clone())
    }

    /// Check that the transaction's signatures satisfy every operation's
    /// declared authority, resolving nested account authorities against the
    /// current state.
    pub fn verify_transaction_authority(&self, tx: &SignedTransaction) -> Result<(), Error> {
        agora_message::verify_authority(
            tx,
            &self.chain_id,
            &self.authority_lookup(),
            MAX_AUTHORITY_RECURSION_DEPTH,
        )?;
        Ok(())
    }

    /// The minimal additional keys from `available_keys` needed to sign.
    pub fn get_required_signatures(
        &self,
        tx: &SignedTransaction,
        available_keys: &std::collections::BTreeSet<agora_crypto::PublicKey>,
    ) -> Result<std::collections::BTreeSet<agora_crypto::PublicKey>, Error> {
        Ok(agora_message::get_required_signatures(
            tx,
            &self.chain_id,
            available_keys,
            &self.authority_lookup(),
            MAX_AUTHORITY_RECURSION_DEPTH,
        )?)
    }

    /// Every key that could contribute a useful signature.
    pub fn get_potential_signatures(
        &self,
        tx: &SignedTransaction,
    ) -> std::collections::BTreeSet<agora_crypto::PublicKey> {
        agora_message::get_potential_signatures(
            tx,
            &self.authority_lookup(),
            MAX_AUTHORITY_RECURSION_DEPTH,
        )
    }
}
