// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! Genesis bootstrapping. A [`GenesisState`] document (loadable from JSON)
//! seeds the reserved accounts, the core asset, the initial account set and
//! the governance roles; its canonical digest is the chain id. Replaying
//! the block log from this state must reproduce identical state digests.

use crate::errors::Error;
use crate::objects::*;
use crate::Database;
use agora_crypto::{PublicKey, Sha256Digest};
use agora_message::{operations::RegInfo, Authority, FeeSchedule};
use agora_types::{
    AccountUid, Amount, ChainParameters, ScheduledWitnessKind, Share, Timestamp,
    COMMITTEE_ACCOUNT_UID, CORE_ASSET_AID, FULL_PERCENT, MAX_SHARE_SUPPLY, NULL_ACCOUNT_UID,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub uid: AccountUid,
    pub name: String,
    pub key: PublicKey,
    pub core_balance: Share,
    #[serde(default)]
    pub is_registrar: bool,
    #[serde(default)]
    pub is_full_member: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisWitness {
    pub account_uid: AccountUid,
    pub signing_key: PublicKey,
    pub pledge: Share,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisPlatform {
    pub owner_uid: AccountUid,
    pub name: String,
    pub url: String,
    pub pledge: Share,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisState {
    /// Must be divisible by the block interval.
    pub initial_timestamp: Timestamp,
    pub initial_parameters: ChainParameters,
    pub initial_accounts: Vec<GenesisAccount>,
    pub initial_witnesses: Vec<GenesisWitness>,
    pub initial_committee: Vec<AccountUid>,
    #[serde(default)]
    pub initial_platforms: Vec<GenesisPlatform>,
    #[serde(default)]
    pub initial_fee_schedule: FeeSchedule,
}

impl GenesisState {
    /// The chain id is the canonical digest of the genesis document.
    pub fn chain_id(&self) -> Sha256Digest {
        agora_crypto::sha256(
            &agora_encoding::serialize_canonical(self).expect("genesis always serializes"),
        )
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json)
            .map_err(|e| Error::ConsensusViolation(format!("malformed genesis document: {e}")))
    }

    fn validate(&self) -> Result<(), Error> {
        self.initial_parameters
            .validate()
            .map_err(Error::ConsensusViolation)?;
        if self.initial_timestamp % self.initial_parameters.block_interval as u32 != 0 {
            return Err(Error::ConsensusViolation(
                "genesis timestamp must be divisible by the block interval".into(),
            ));
        }
        if self.initial_witnesses.is_empty() {
            return Err(Error::ConsensusViolation("genesis needs at least one witness".into()));
        }
        let mut names = BTreeSet::new();
        let mut uids = BTreeSet::new();
        for account in &self.initial_accounts {
            if !names.insert(account.name.as_str()) || !uids.insert(account.uid) {
                return Err(Error::ConsensusViolation(format!(
                    "duplicate genesis account {:?}",
                    account.name
                )));
            }
            if account.uid <= NULL_ACCOUNT_UID {
                return Err(Error::ConsensusViolation(
                    "genesis account uids collide with reserved uids".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Database {
    /// Build a fresh database from genesis. Runs outside any undo session:
    /// the result is the permanent base state.
    pub fn initialize(genesis: &GenesisState) -> Result<Database, Error> {
        genesis.validate()?;
        let mut db = Database::empty(genesis.chain_id());
        let now = genesis.initial_timestamp;
        let params = genesis.initial_parameters.clone();

        // the core asset and its supply counters
        let dynamic_data = db.store.create(AssetDynamicData {
            aid: CORE_ASSET_AID,
            current_supply: 0,
            accumulated_fees: 0,
        });
        db.store.create(Asset {
            aid: CORE_ASSET_AID,
            symbol: "AGC".into(),
            precision: 5,
            issuer: COMMITTEE_ACCOUNT_UID,
            max_supply: MAX_SHARE_SUPPLY,
            flags: 0,
            permissions: 0,
            description: "Agora core coin".into(),
            dynamic_data,
        });

        // reserved accounts
        create_account_row(
            &mut db,
            COMMITTEE_ACCOUNT_UID,
            "committee-account",
            PublicKey::null(),
            now,
            true,
            true,
        );
        create_account_row(&mut db, NULL_ACCOUNT_UID, "null-account", PublicKey::null(), now, false, false);

        // user accounts and balances
        let mut total_supply: Share = 0;
        for account in &genesis.initial_accounts {
            create_account_row(
                &mut db,
                account.uid,
                &account.name,
                account.key,
                now,
                account.is_registrar,
                account.is_full_member,
            );
            if account.core_balance > 0 {
                db.adjust_balance(account.uid, Amount::core(account.core_balance))
                    .map_err(|e| Error::InternalInvariant(e.to_string()))?;
                total_supply += account.core_balance;
            }
        }
        db.modify_asset_dynamic(CORE_ASSET_AID, |d| d.current_supply = total_supply)
            .map_err(|e| Error::InternalInvariant(e.to_string()))?;

        // governance roles
        let mut total_witness_pledge: Share = 0;
        let mut active_witnesses = BTreeMap::new();
        for witness in &genesis.initial_witnesses {
            db.store.create(Witness {
                account: witness.account_uid,
                sequence: 1,
                is_valid: true,
                signing_key: witness.signing_key,
                pledge: witness.pledge,
                total_votes: 0,
                url: String::new(),
                last_confirmed_block_num: 0,
                last_aslot: 0,
                total_produced: 0,
                total_missed: 0,
                average_pledge: witness.pledge,
                average_pledge_next_update_block: params.witness_avg_pledge_update_interval,
                by_vote_scheduled_time: 0,
                by_pledge_scheduled_time: 0,
            });
            db.modify_account_statistics(witness.account_uid, |s| {
                s.last_witness_sequence = 1;
                s.total_witness_pledge = witness.pledge;
            })
            .map_err(|e| Error::InternalInvariant(e.to_string()))?;
            total_witness_pledge += witness.pledge;
            active_witnesses.insert(witness.account_uid, ScheduledWitnessKind::ByVoteTop);
        }
        for member in &genesis.initial_committee {
            db.store.create(CommitteeMember {
                account: *member,
                sequence: 1,
                is_valid: true,
                pledge: 0,
                total_votes: 0,
                url: String::new(),
            });
            db.modify_account_statistics(*member, |s| s.last_committee_member_sequence = 1)
                .map_err(|e| Error::InternalInvariant(e.to_string()))?;
        }
        for platform in &genesis.initial_platforms {
            db.store.create(Platform {
                owner: platform.owner_uid,
                sequence: 1,
                is_valid: true,
                name: platform.name.clone(),
                url: platform.url.clone(),
                extra_data: "{}".into(),
                pledge: platform.pledge,
                total_votes: 0,
                average_pledge: platform.pledge,
                average_pledge_next_update_block: params.witness_avg_pledge_update_interval,
                period_profits: BTreeMap::new(),
                vote_profits: BTreeMap::new(),
                create_time: now,
                last_update_time: now,
            });
            db.modify_account_statistics(platform.owner_uid, |s| {
                s.last_platform_sequence = 1;
                s.total_platform_pledge = platform.pledge;
            })
            .map_err(|e| Error::InternalInvariant(e.to_string()))?;
        }

        // singletons
        let mut committee = genesis.initial_committee.clone();
        committee.sort_unstable();
        db.store.put(
            0,
            GlobalProperties {
                parameters: params.clone(),
                fee_schedule: genesis.initial_fee_schedule.clone(),
                active_witnesses,
                active_committee_members: committee,
            },
        );
        db.store.put(
            0,
            DynamicGlobalProperties {
                head_block_num: 0,
                head_block_id: Default::default(),
                head_block_time: now,
                genesis_time: now,
                current_witness: 0,
                current_aslot: 0,
                recently_missed_count: 0,
                recent_slots_filled: u128::MAX,
                last_irreversible_block_num: 0,
                budget_pool: 0,
                total_budget_per_block: 0,
                by_pledge_witness_pay_per_block: 0,
                total_witness_pledge,
                next_budget_adjust_block: params.budget_adjust_interval,
                next_committee_update_block: params.committee_update_interval,
                next_committee_proposal_number: 1,
                next_schedule_block_num: 0,
                last_content_award_time: 0,
                next_content_award_time: 0,
                content_award_enabled: false,
                last_platform_voted_award_time: 0,
                next_platform_voted_award_time: 0,
                current_active_post_sequence: 0,
                current_by_vote_time: 0,
                current_by_pledge_time: 0,
                enabled_hardfork_version: Default::default(),
            },
        );
        db.store.put(0, WitnessSchedule::default());

        // the first round's schedule and pay cursor
        db.update_witness_schedule()?;
        db.check_invariants()?;
        Ok(db)
    }
}

fn create_account_row(
    db: &mut Database,
    uid: AccountUid,
    name: &str,
    key: PublicKey,
    now: Timestamp,
    is_registrar: bool,
    is_full_member: bool,
) {
    let mut stats = AccountStatistics::new(uid);
    stats.coin_seconds_earned_last_update = now;
    let statistics = db.store.create(stats);
    let authority = if key.is_null() { Authority::default() } else { Authority::single_key(key) };
    db.store.create(Account {
        uid,
        name: name.into(),
        owner: authority.clone(),
        active: authority.clone(),
        secondary: authority,
        memo_key: key,
        reg_info: RegInfo {
            registrar: uid,
            referrer: uid,
            lifetime_referrer: uid,
            referrer_rewards_percentage: FULL_PERCENT,
        },
        register_by_platform: false,
        can_post: true,
        can_reply: true,
        can_rate: true,
        is_full_member,
        is_registrar,
        is_admin: false,
        whitelisted_accounts: BTreeSet::new(),
        blacklisted_accounts: BTreeSet::new(),
        allowed_assets: None,
        statistics,
        create_time: now,
        last_update_time: now,
    });
}
