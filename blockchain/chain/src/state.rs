// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The struct-of-tables behind [`crate::Database`], and the mapping that
//! lets the generic store find each object's table.

use crate::host::ContractRow;
use crate::objects::*;
use agora_db::{HasTable, Table};

/// Every table of the replicated state. Singletons are single-row tables at
/// instance 0 so the undo machinery covers them uniformly.
#[derive(Default)]
pub struct StateTables {
    pub accounts: Table<Account>,
    pub account_statistics: Table<AccountStatistics>,
    pub balances: Table<AccountBalance>,
    pub voters: Table<Voter>,
    pub registrar_takeovers: Table<RegistrarTakeover>,
    pub account_auth_platforms: Table<AccountAuthPlatformObject>,

    pub assets: Table<Asset>,
    pub asset_dynamic_data: Table<AssetDynamicData>,

    pub witnesses: Table<Witness>,
    pub committee_members: Table<CommitteeMember>,
    pub platforms: Table<Platform>,
    pub witness_votes: Table<WitnessVote>,
    pub committee_member_votes: Table<CommitteeMemberVote>,
    pub platform_votes: Table<PlatformVote>,
    pub csaf_leases: Table<CsafLease>,
    pub proposals: Table<Proposal>,
    pub committee_proposals: Table<CommitteeProposal>,

    pub posts: Table<Post>,
    pub active_posts: Table<ActivePost>,
    pub scores: Table<Score>,
    pub licenses: Table<License>,

    pub contract_rows: Table<ContractRow>,

    pub transaction_records: Table<TransactionRecord>,
    pub block_summaries: Table<BlockSummary>,
    pub global_properties: Table<GlobalProperties>,
    pub dynamic_global_properties: Table<DynamicGlobalProperties>,
    pub witness_schedule: Table<WitnessSchedule>,
}

macro_rules! impl_has_table {
    ($($field:ident: $ty:ty),+ $(,)?) => {
        $(
            impl HasTable<$ty> for StateTables {
                fn table(&self) -> &Table<$ty> {
                    &self.$field
                }
                fn table_mut(&mut self) -> &mut Table<$ty> {
                    &mut self.$field
                }
            }
        )+
    };
}

impl_has_table! {
    accounts: Account,
    account_statistics: AccountStatistics,
    balances: AccountBalance,
    voters: Voter,
    registrar_takeovers: RegistrarTakeover,
    account_auth_platforms: AccountAuthPlatformObject,
    assets: Asset,
    asset_dynamic_data: AssetDynamicData,
    witnesses: Witness,
    committee_members: CommitteeMember,
    platforms: Platform,
    witness_votes: WitnessVote,
    committee_member_votes: CommitteeMemberVote,
    platform_votes: PlatformVote,
    csaf_leases: CsafLease,
    proposals: Proposal,
    committee_proposals: CommitteeProposal,
    posts: Post,
    active_posts: ActivePost,
    scores: Score,
    licenses: License,
    contract_rows: ContractRow,
    transaction_records: TransactionRecord,
    block_summaries: BlockSummary,
    global_properties: GlobalProperties,
    dynamic_global_properties: DynamicGlobalProperties,
    witness_schedule: WitnessSchedule,
}

impl StateTables {
    /// Canonical digest over every table in a fixed order; equal digests
    /// mean bit-identical replicated state.
    pub fn state_digest(&self) -> agora_crypto::Sha256Digest {
        use agora_encoding::serialize_canonical;

        fn feed<T: agora_db::ChainObject + serde::Serialize>(
            out: &mut Vec<u8>,
            table: &Table<T>,
        ) {
            for (id, row) in table.iter() {
                out.extend_from_slice(&id.to_le_bytes());
                out.extend_from_slice(
                    &serialize_canonical(row).expect("state rows always serialize"),
                );
            }
        }

        let mut data = Vec::new();
        feed(&mut data, &self.accounts);
        feed(&mut data, &self.account_statistics);
        feed(&mut data, &self.balances);
        feed(&mut data, &self.voters);
        feed(&mut data, &self.registrar_takeovers);
        feed(&mut data, &self.account_auth_platforms);
        feed(&mut data, &self.assets);
        feed(&mut data, &self.asset_dynamic_data);
        feed(&mut data, &self.witnesses);
        feed(&mut data, &self.committee_members);
        feed(&mut data, &self.platforms);
        feed(&mut data, &self.witness_votes);
        feed(&mut data, &self.committee_member_votes);
        feed(&mut data, &self.platform_votes);
        feed(&mut data, &self.csaf_leases);
        feed(&mut data, &self.proposals);
        feed(&mut data, &self.committee_proposals);
        feed(&mut data, &self.posts);
        feed(&mut data, &self.active_posts);
        feed(&mut data, &self.scores);
        feed(&mut data, &self.licenses);
        feed(&mut data, &self.contract_rows);
        feed(&mut data, &self.transaction_records);
        feed(&mut data, &self.block_summaries);
        feed(&mut data, &self.global_properties);
        feed(&mut data, &self.dynamic_global_properties);
        feed(&mut data, &self.witness_schedule);
        agora_crypto::sha256(&data)
    }
}
