// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Typed lookups over the object tables and the balance-adjustment
//! primitives every evaluator builds on. References returned here are never
//! held across a mutation; callers clone what they need first.

use crate::errors::EvalError;
use crate::objects::*;
use crate::Database;
use agora_crypto::PublicKey;
use agora_db::KeyWriter;
use agora_message::TxId;
use agora_types::{
    AccountUid, Amount, AssetAid, LicenseLid, PostPid, Share, CORE_ASSET_AID,
};

impl Database {
    // ---- accounts -------------------------------------------------------

    pub fn find_account_id_by_uid(&self, uid: AccountUid) -> Option<u64> {
        let key = KeyWriter::default().u64(uid).finish();
        self.tables().accounts.id_by_key(account_idx::BY_UID, &key)
    }

    pub fn find_account_by_uid(&self, uid: AccountUid) -> Option<&Account> {
        self.find_account_id_by_uid(uid).and_then(|id| self.tables().accounts.get(id))
    }

    pub fn get_account_by_uid(&self, uid: AccountUid) -> Result<&Account, EvalError> {
        self.find_account_by_uid(uid)
            .ok_or(EvalError::Missing { kind: "account", detail: format!("uid {uid}") })
    }

    pub fn find_account_by_name(&self, name: &str) -> Option<&Account> {
        let key = KeyWriter::default().str(name).finish();
        self.tables()
            .accounts
            .id_by_key(account_idx::BY_NAME, &key)
            .and_then(|id| self.tables().accounts.get(id))
    }

    pub(crate) fn modify_account(
        &mut self,
        uid: AccountUid,
        f: impl FnOnce(&mut Account),
    ) -> Result<(), EvalError> {
        let id = self
            .find_account_id_by_uid(uid)
            .ok_or(EvalError::Missing { kind: "account", detail: format!("uid {uid}") })?;
        self.store.modify(id, f)?;
        Ok(())
    }

    // ---- account statistics --------------------------------------------

    pub(crate) fn stats_id_by_uid(&self, uid: AccountUid) -> Result<u64, EvalError> {
        let key = KeyWriter::default().u64(uid).finish();
        self.tables()
            .account_statistics
            .id_by_key(account_stats_idx::BY_OWNER, &key)
            .ok_or(EvalError::Missing { kind: "account_statistics", detail: format!("uid {uid}") })
    }

    pub fn get_account_statistics_by_uid(
        &self,
        uid: AccountUid,
    ) -> Result<&AccountStatistics, EvalError> {
        let id = self.stats_id_by_uid(uid)?;
        Ok(self.tables().account_statistics.get(id).expect("statistics row indexed"))
    }

    pub(crate) fn modify_account_statistics(
        &mut self,
        uid: AccountUid,
        f: impl FnOnce(&mut AccountStatistics),
    ) -> Result<(), EvalError> {
        let id = self.stats_id_by_uid(uid)?;
        self.store.modify(id, f)?;
        Ok(())
    }

    // ---- balances -------------------------------------------------------

    pub fn get_balance(&self, owner: AccountUid, asset_aid: AssetAid) -> Share {
        let key = KeyWriter::default().u64(owner).u64(asset_aid).finish();
        self.tables()
            .balances
            .id_by_key(balance_idx::BY_ACCOUNT_ASSET, &key)
            .and_then(|id| self.tables().balances.get(id))
            .map(|b| b.balance)
            .unwrap_or(0)
    }

    /// Apply a signed balance delta. Credits of non-core assets run the
    /// holder's allowed-asset and issuer-whitelist checks; debits below
    /// zero fail. Core deltas keep the statistics mirror in sync.
    pub(crate) fn adjust_balance(
        &mut self,
        owner: AccountUid,
        delta: Amount,
    ) -> Result<(), EvalError> {
        if delta.amount == 0 {
            return Ok(());
        }
        if delta.amount > 0 && delta.asset_aid != CORE_ASSET_AID {
            let account = self.get_account_by_uid(owner)?.clone();
            let asset = self.get_asset_by_aid(delta.asset_aid)?.clone();
            self.validate_authorized_asset(&account, &asset)?;
        }
        let key = KeyWriter::default().u64(owner).u64(delta.asset_aid).finish();
        match self.tables().balances.id_by_key(balance_idx::BY_ACCOUNT_ASSET, &key) {
            Some(id) => {
                let current = self.tables().balances.get(id).expect("row indexed").balance;
                let next = current + delta.amount;
                if next < 0 {
                    return Err(EvalError::InsufficientBalance {
                        account: owner,
                        required: -delta.amount,
                        available: current,
                    });
                }
                self.store.modify(id, |b: &mut AccountBalance| b.balance = next)?;
            }
            None => {
                if delta.amount < 0 {
                    return Err(EvalError::InsufficientBalance {
                        account: owner,
                        required: -delta.amount,
                        available: 0,
                    });
                }
                self.store.create(AccountBalance {
                    owner,
                    asset_aid: delta.asset_aid,
                    balance: delta.amount,
                });
            }
        }
        if delta.asset_aid == CORE_ASSET_AID {
            self.modify_account_statistics(owner, |s| s.core_balance += delta.amount)?;
            self.sync_voter_raw_votes(owner)?;
        }
        Ok(())
    }

    /// A voter's raw votes mirror its core balance; effective votes catch
    /// up on the scheduled update blocks.
    fn sync_voter_raw_votes(&mut self, owner: AccountUid) -> Result<(), EvalError> {
        let stats = self.get_account_statistics_by_uid(owner)?;
        if !stats.is_voter {
            return Ok(());
        }
        let (sequence, balance) = (stats.last_voter_sequence, stats.core_balance.max(0) as u64);
        let now = self.head_block_time();
        if let Some((voter_id, _)) = self.find_voter(owner, sequence) {
            self.store.modify(voter_id, |v: &mut crate::objects::Voter| {
                v.votes = balance;
                v.votes_last_update = now;
            })?;
        }
        Ok(())
    }

    /// Spend core coins, refusing to dip into leases or pledges.
    pub(crate) fn spend_core(&mut self, owner: AccountUid, amount: Share) -> Result<(), EvalError> {
        debug_assert!(amount >= 0);
        let available = self.get_account_statistics_by_uid(owner)?.unencumbered_balance();
        if available < amount {
            return Err(EvalError::InsufficientBalance {
                account: owner,
                required: amount,
                available,
            });
        }
        self.adjust_balance(owner, Amount::core(-amount))
    }

    /// Move an asset amount between accounts, with encumbrance checks on
    /// core debits.
    pub(crate) fn transfer_checked(
        &mut self,
        from: AccountUid,
        to: AccountUid,
        amount: Amount,
    ) -> Result<(), EvalError> {
        if amount.asset_aid == CORE_ASSET_AID {
            self.spend_core(from, amount.amount)?;
        } else {
            self.adjust_balance(from, -amount)?;
        }
        self.adjust_balance(to, amount)
    }

    /// Holder-side checks for whitelist-flagged assets.
    pub(crate) fn validate_authorized_asset(
        &self,
        account: &Account,
        asset: &Asset,
    ) -> Result<(), EvalError> {
        if !account.may_hold(asset.aid) {
            return Err(EvalError::Unauthorized(format!(
                "account {} does not allow asset {}",
                account.uid, asset.aid
            )));
        }
        if asset.uses_whitelist() && asset.issuer != account.uid {
            let issuer = self.get_account_by_uid(asset.issuer)?;
            if issuer.blacklisted_accounts.contains(&account.uid)
                || !issuer.whitelisted_accounts.contains(&account.uid)
            {
                return Err(EvalError::Unauthorized(format!(
                    "account {} is not whitelisted for asset {}",
                    account.uid, asset.aid
                )));
            }
        }
        Ok(())
    }

    // ---- assets ---------------------------------------------------------

    pub fn find_asset_id_by_aid(&self, aid: AssetAid) -> Option<u64> {
        let key = KeyWriter::default().u64(aid).finish();
        self.tables().assets.id_by_key(asset_idx::BY_AID, &key)
    }

    pub fn get_asset_by_aid(&self, aid: AssetAid) -> Result<&Asset, EvalError> {
        self.find_asset_id_by_aid(aid)
            .and_then(|id| self.tables().assets.get(id))
            .ok_or(EvalError::Missing { kind: "asset", detail: format!("aid {aid}") })
    }

    pub fn find_asset_by_symbol(&self, symbol: &str) -> Option<&Asset> {
        let key = KeyWriter::default().str(symbol).finish();
        self.tables()
            .assets
            .id_by_key(asset_idx::BY_SYMBOL, &key)
            .and_then(|id| self.tables().assets.get(id))
    }

    pub(crate) fn modify_asset(
        &mut self,
        aid: AssetAid,
        f: impl FnOnce(&mut Asset),
    ) -> Result<(), EvalError> {
        let id = self
            .find_asset_id_by_aid(aid)
            .ok_or(EvalError::Missing { kind: "asset", detail: format!("aid {aid}") })?;
        self.store.modify(id, f)?;
        Ok(())
    }

    pub fn get_asset_dynamic(&self, aid: AssetAid) -> Result<&AssetDynamicData, EvalError> {
        let key = KeyWriter::default().u64(aid).finish();
        self.tables()
            .asset_dynamic_data
            .id_by_key(asset_dyn_idx::BY_AID, &key)
            .and_then(|id| self.tables().asset_dynamic_data.get(id))
            .ok_or(EvalError::Missing { kind: "asset_dynamic_data", detail: format!("aid {aid}") })
    }

    pub(crate) fn modify_asset_dynamic(
        &mut self,
        aid: AssetAid,
        f: impl FnOnce(&mut AssetDynamicData),
    ) -> Result<(), EvalError> {
        let key = KeyWriter::default().u64(aid).finish();
        let id = self
            .tables()
            .asset_dynamic_data
            .id_by_key(asset_dyn_idx::BY_AID, &key)
            .ok_or(EvalError::Missing { kind: "asset_dynamic_data", detail: format!("aid {aid}") })?;
        self.store.modify(id, f)?;
        Ok(())
    }

    pub fn core_current_supply(&self) -> Share {
        self.get_asset_dynamic(CORE_ASSET_AID).expect("core asset exists").current_supply
    }

    /// Unissued core supply backing the budget.
    pub fn core_reserved(&self) -> Share {
        let max = self.get_asset_by_aid(CORE_ASSET_AID).expect("core asset exists").max_supply;
        self.get_asset_dynamic(CORE_ASSET_AID).expect("core asset exists").reserved(max)
    }

    pub(crate) fn adjust_core_supply(&mut self, delta: Share) {
        self.modify_asset_dynamic(CORE_ASSET_AID, |d| d.current_supply += delta)
            .expect("core asset exists");
    }

    // ---- governance roles ----------------------------------------------

    pub fn find_witness_id(&self, account: AccountUid, sequence: u32) -> Option<u64> {
        let key = KeyWriter::default().u64(account).u32(sequence).finish();
        self.tables().witnesses.id_by_key(witness_idx::BY_ACCOUNT, &key)
    }

    /// The account's current witness incarnation.
    pub fn find_witness_by_uid(&self, account: AccountUid) -> Option<(u64, &Witness)> {
        let sequence = self.get_account_statistics_by_uid(account).ok()?.last_witness_sequence;
        let id = self.find_witness_id(account, sequence)?;
        Some((id, self.tables().witnesses.get(id)?))
    }

    pub fn get_witness_by_uid(&self, account: AccountUid) -> Result<(u64, &Witness), EvalError> {
        self.find_witness_by_uid(account)
            .ok_or(EvalError::Missing { kind: "witness", detail: format!("account {account}") })
    }

    pub(crate) fn modify_witness(
        &mut self,
        id: u64,
        f: impl FnOnce(&mut Witness),
    ) -> Result<(), EvalError> {
        self.store.modify(id, f)?;
        Ok(())
    }

    pub fn find_committee_member_id(&self, account: AccountUid, sequence: u32) -> Option<u64> {
        let key = KeyWriter::default().u64(account).u32(sequence).finish();
        self.tables().committee_members.id_by_key(committee_idx::BY_ACCOUNT, &key)
    }

    pub fn find_committee_member_by_uid(
        &self,
        account: AccountUid,
    ) -> Option<(u64, &CommitteeMember)> {
        let sequence =
            self.get_account_statistics_by_uid(account).ok()?.last_committee_member_sequence;
        let id = self.find_committee_member_id(account, sequence)?;
        Some((id, self.tables().committee_members.get(id)?))
    }

    pub fn get_committee_member_by_uid(
        &self,
        account: AccountUid,
    ) -> Result<(u64, &CommitteeMember), EvalError> {
        self.find_committee_member_by_uid(account).ok_or(EvalError::Missing {
            kind: "committee_member",
            detail: format!("account {account}"),
        })
    }

    pub fn find_platform_id(&self, owner: AccountUid, sequence: u32) -> Option<u64> {
        let key = KeyWriter::default().u64(owner).u32(sequence).finish();
        self.tables().platforms.id_by_key(platform_idx::BY_OWNER, &key)
    }

    pub fn find_platform_by_owner(&self, owner: AccountUid) -> Option<(u64, &Platform)> {
        let sequence = self.get_account_statistics_by_uid(owner).ok()?.last_platform_sequence;
        let id = self.find_platform_id(owner, sequence)?;
        Some((id, self.tables().platforms.get(id)?))
    }

    pub fn get_platform_by_owner(&self, owner: AccountUid) -> Result<(u64, &Platform), EvalError> {
        self.find_platform_by_owner(owner)
            .ok_or(EvalError::Missing { kind: "platform", detail: format!("owner {owner}") })
    }

    // ---- voters and vote edges -----------------------------------------

    pub fn find_voter(&self, uid: AccountUid, sequence: u32) -> Option<(u64, &Voter)> {
        let key = KeyWriter::default().u64(uid).u32(sequence).finish();
        let id = self.tables().voters.id_by_key(voter_idx::BY_UID_SEQ, &key)?;
        Some((id, self.tables().voters.get(id)?))
    }

    pub(crate) fn vote_edge_key(
        voter_uid: AccountUid,
        voter_sequence: u32,
        target_uid: AccountUid,
        target_sequence: u32,
    ) -> Vec<u8> {
        KeyWriter::default()
            .u64(voter_uid)
            .u32(voter_sequence)
            .u64(target_uid)
            .u32(target_sequence)
            .finish()
    }

    pub fn find_witness_vote(
        &self,
        voter_uid: AccountUid,
        voter_sequence: u32,
        witness_uid: AccountUid,
        witness_sequence: u32,
    ) -> Option<u64> {
        let key = Self::vote_edge_key(voter_uid, voter_sequence, witness_uid, witness_sequence);
        self.tables().witness_votes.id_by_key(vote_idx::BY_VOTER, &key)
    }

    pub fn find_committee_member_vote(
        &self,
        voter_uid: AccountUid,
        voter_sequence: u32,
        member_uid: AccountUid,
        member_sequence: u32,
    ) -> Option<u64> {
        let key = Self::vote_edge_key(voter_uid, voter_sequence, member_uid, member_sequence);
        self.tables().committee_member_votes.id_by_key(vote_idx::BY_VOTER, &key)
    }

    pub fn find_platform_vote(
        &self,
        voter_uid: AccountUid,
        voter_sequence: u32,
        owner_uid: AccountUid,
        platform_sequence: u32,
    ) -> Option<u64> {
        let key = Self::vote_edge_key(voter_uid, voter_sequence, owner_uid, platform_sequence);
        self.tables().platform_votes.id_by_key(vote_idx::BY_VOTER, &key)
    }

    pub fn find_csaf_lease(&self, from: AccountUid, to: AccountUid) -> Option<(u64, &CsafLease)> {
        let key = KeyWriter::default().u64(from).u64(to).finish();
        let id = self.tables().csaf_leases.id_by_key(lease_idx::BY_FROM_TO, &key)?;
        Some((id, self.tables().csaf_leases.get(id)?))
    }

    pub fn find_committee_proposal(&self, number: u64) -> Option<(u64, &CommitteeProposal)> {
        let key = KeyWriter::default().u64(number).finish();
        let id = self
            .tables()
            .committee_proposals
            .id_by_key(committee_proposal_idx::BY_NUMBER, &key)?;
        Some((id, self.tables().committee_proposals.get(id)?))
    }

    // ---- content --------------------------------------------------------

    pub fn find_post(
        &self,
        platform: AccountUid,
        poster: AccountUid,
        post_pid: PostPid,
    ) -> Option<(u64, &Post)> {
        let key = KeyWriter::default().u64(platform).u64(poster).u64(post_pid).finish();
        let id = self.tables().posts.id_by_key(post_idx::BY_POST, &key)?;
        Some((id, self.tables().posts.get(id)?))
    }

    pub fn get_post(
        &self,
        platform: AccountUid,
        poster: AccountUid,
        post_pid: PostPid,
    ) -> Result<(u64, &Post), EvalError> {
        self.find_post(platform, poster, post_pid).ok_or(EvalError::Missing {
            kind: "post",
            detail: format!("({platform}, {poster}, {post_pid})"),
        })
    }

    pub fn find_active_post(
        &self,
        platform: AccountUid,
        poster: AccountUid,
        post_pid: PostPid,
        period_sequence: u64,
    ) -> Option<(u64, &ActivePost)> {
        let key = KeyWriter::default()
            .u64(platform)
            .u64(poster)
            .u64(post_pid)
            .u64(period_sequence)
            .finish();
        let id = self.tables().active_posts.id_by_key(active_post_idx::BY_POST_PERIOD, &key)?;
        Some((id, self.tables().active_posts.get(id)?))
    }

    pub fn find_score(
        &self,
        platform: AccountUid,
        poster: AccountUid,
        post_pid: PostPid,
        from_account_uid: AccountUid,
    ) -> Option<(u64, &Score)> {
        let key = KeyWriter::default()
            .u64(platform)
            .u64(poster)
            .u64(post_pid)
            .u64(from_account_uid)
            .finish();
        let id = self.tables().scores.id_by_key(score_idx::BY_POST_FROM, &key)?;
        Some((id, self.tables().scores.get(id)?))
    }

    pub fn find_license(&self, platform: AccountUid, lid: LicenseLid) -> Option<u64> {
        let key = KeyWriter::default().u64(platform).u64(lid).finish();
        self.tables().licenses.id_by_key(license_idx::BY_PLATFORM_LID, &key)
    }

    // ---- authorizations and takeovers ----------------------------------

    pub fn find_account_auth_platform(
        &self,
        account: AccountUid,
        platform: AccountUid,
    ) -> Option<(u64, &AccountAuthPlatformObject)> {
        let key = KeyWriter::default().u64(account).u64(platform).finish();
        let id = self
            .tables()
            .account_auth_platforms
            .id_by_key(auth_platform_idx::BY_ACCOUNT_PLATFORM, &key)?;
        Some((id, self.tables().account_auth_platforms.get(id)?))
    }

    pub fn find_registrar_takeover(
        &self,
        original: AccountUid,
    ) -> Option<(u64, &RegistrarTakeover)> {
        let key = KeyWriter::default().u64(original).finish();
        let id = self.tables().registrar_takeovers.id_by_key(takeover_idx::BY_ORIGINAL, &key)?;
        Some((id, self.tables().registrar_takeovers.get(id)?))
    }

    /// The registrar currently managing accounts registered by `registrar`,
    /// following at most one takeover hop (the takeover table keeps its
    /// transitive closure flattened).
    pub fn effective_registrar(&self, registrar: AccountUid) -> AccountUid {
        match self.find_registrar_takeover(registrar) {
            Some((_, takeover)) => takeover.takeover_registrar,
            None => registrar,
        }
    }

    // ---- dedup and TaPoS ------------------------------------------------

    pub fn find_transaction_record(&self, trx_id: &TxId) -> Option<u64> {
        let key = KeyWriter::default().bytes(&trx_id.0).finish();
        self.tables().transaction_records.id_by_key(tx_record_idx::BY_TRX_ID, &key)
    }

    pub fn block_summary(&self, slot: u64) -> Option<&BlockSummary> {
        self.tables().block_summaries.get(slot)
    }

    // ---- platform signing detection ------------------------------------

    /// True when the providing keys belong to the platform's own
    /// authorities and none belong to the user: the operation was submitted
    /// by the platform under a standing authorization, so its prepaid draw
    /// is metered against the grant.
    pub(crate) fn signed_by_platform(
        &self,
        signers: &[PublicKey],
        user: AccountUid,
        platform: AccountUid,
    ) -> bool {
        let Some(user_account) = self.find_account_by_uid(user) else { return false };
        let Some(platform_account) = self.find_account_by_uid(platform) else { return false };
        let user_owns = |key: &PublicKey| {
            user_account.owner.key_auths.contains_key(key)
                || user_account.active.key_auths.contains_key(key)
                || user_account.secondary.key_auths.contains_key(key)
        };
        let platform_owns = |key: &PublicKey| {
            platform_account.owner.key_auths.contains_key(key)
                || platform_account.active.key_auths.contains_key(key)
                || platform_account.secondary.key_auths.contains_key(key)
        };
        !signers.is_empty()
            && signers.iter().all(|k| !user_owns(k))
            && signers.iter().any(platform_owns)
    }
}
