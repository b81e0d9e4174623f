// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! A small single-process chain for the scenario suites: deterministic
//! keys, fast governance intervals, zeroed fees, five seeded witnesses and
//! a seeded content platform.

use agora_chain::{Database, GenesisAccount, GenesisPlatform, GenesisState, GenesisWitness};
use agora_crypto::PrivateKey;
use agora_message::operations::Transfer;
use agora_message::{Fee, FeeParameters, FeeSchedule, Operation, SignedTransaction, Transaction};
use agora_types::{AccountUid, Amount, ChainParameters, Share, Timestamp};

pub const GENESIS_TIME: Timestamp = 1_500_000_000;

pub const REGISTRAR: AccountUid = 10;
pub const ALICE: AccountUid = 100;
pub const BOB: AccountUid = 101;
pub const CAROL: AccountUid = 102;
pub const DAVE: AccountUid = 103;
pub const EVE: AccountUid = 104;
pub const PLATFORM: AccountUid = 300;
pub const WITNESSES: [AccountUid; 5] = [201, 202, 203, 204, 205];
pub const COMMITTEE: [AccountUid; 7] = [211, 212, 213, 214, 215, 216, 217];

pub struct TestChain {
    pub db: Database,
}

pub fn account_key(uid: AccountUid) -> PrivateKey {
    PrivateKey::from_seed(&format!("account-{uid}"))
}

pub fn witness_key(uid: AccountUid) -> PrivateKey {
    PrivateKey::from_seed(&format!("witness-{uid}"))
}

pub fn test_parameters() -> ChainParameters {
    let mut params = ChainParameters::default();
    params.by_vote_top_witness_count = 5;
    params.by_vote_rest_witness_count = 0;
    params.by_pledge_witness_count = 0;
    params.min_witness_pledge = 100;
    params.min_committee_member_pledge = 100;
    params.min_platform_pledge = 100;
    params.min_governance_voting_balance = 1;
    params.governance_votes_update_interval = 5;
    params.committee_size = 7;
    params.csaf_rate = 1;
    params
}

pub fn test_genesis(params: ChainParameters) -> GenesisState {
    let mut accounts = vec![
        genesis_account(REGISTRAR, "registrar", 10_000_000, true, true),
        genesis_account(ALICE, "alice", 1_000_000, false, false),
        genesis_account(BOB, "bob", 0, false, false),
        genesis_account(CAROL, "carol", 1_000, false, false),
        genesis_account(DAVE, "dave", 500, false, false),
        genesis_account(EVE, "eve", 1_000_000, false, false),
        genesis_account(PLATFORM, "platform", 1_000_000, false, true),
    ];
    for uid in WITNESSES {
        accounts.push(genesis_account(uid, &format!("witness{uid}"), 100_000, false, false));
    }
    for uid in COMMITTEE {
        accounts.push(genesis_account(uid, &format!("member{uid}"), 10_000, false, false));
    }

    let mut fee_schedule = FeeSchedule::default();
    for tag in 0..44 {
        fee_schedule.set_params(tag, FeeParameters { fee: 0, price_per_kbyte: 0 });
    }

    GenesisState {
        initial_timestamp: GENESIS_TIME,
        initial_parameters: params,
        initial_accounts: accounts,
        initial_witnesses: WITNESSES
            .iter()
            .map(|uid| GenesisWitness {
                account_uid: *uid,
                signing_key: witness_key(*uid).public_key(),
                pledge: 10_000,
            })
            .collect(),
        initial_committee: COMMITTEE.to_vec(),
        initial_platforms: vec![GenesisPlatform {
            owner_uid: PLATFORM,
            name: "test-platform".into(),
            url: "https://platform.test".into(),
            pledge: 1_000,
        }],
        initial_fee_schedule: fee_schedule,
    }
}

fn genesis_account(
    uid: AccountUid,
    name: &str,
    core_balance: Share,
    is_registrar: bool,
    is_full_member: bool,
) -> GenesisAccount {
    GenesisAccount {
        uid,
        name: name.into(),
        key: account_key(uid).public_key(),
        core_balance,
        is_registrar,
        is_full_member,
    }
}

impl TestChain {
    pub fn new() -> Self {
        Self::with_parameters(test_parameters())
    }

    pub fn with_parameters(params: ChainParameters) -> Self {
        let db = Database::initialize(&test_genesis(params)).expect("genesis initializes");
        TestChain { db }
    }

    /// Produce the next slot's block with the scheduled witness's key.
    pub fn produce_block(&mut self) -> agora_blocks::SignedBlock {
        self.produce_block_with(Vec::new())
    }

    pub fn produce_block_with(
        &mut self,
        transactions: Vec<SignedTransaction>,
    ) -> agora_blocks::SignedBlock {
        let timestamp = self.db.get_slot_time(1);
        let witness = self.db.get_scheduled_witness(1);
        self.db
            .produce_block(timestamp, &witness_key(witness), transactions)
            .expect("scheduled block applies")
    }

    pub fn produce_blocks(&mut self, count: u32) {
        for _ in 0..count {
            self.produce_block();
        }
    }

    /// A transaction over `ops`, TaPoS-pinned to the head block and signed
    /// by each listed account's key.
    pub fn signed_tx(&self, signers: &[AccountUid], ops: Vec<Operation>) -> SignedTransaction {
        let mut tx = Transaction::new(self.db.head_block_time() + 300, ops);
        tx.set_reference_block(self.db.head_block_num(), &self.db.dpo().head_block_id.0);
        let mut signed = SignedTransaction::new(tx);
        for uid in signers {
            signed.sign(&account_key(*uid), self.db.chain_id());
        }
        signed
    }

    /// Push a transaction into pending state.
    pub fn push_ops(
        &mut self,
        signer: AccountUid,
        ops: Vec<Operation>,
    ) -> Result<agora_chain::ProcessedTransaction, agora_chain::Error> {
        let tx = self.signed_tx(&[signer], ops);
        self.db.push_transaction(&tx)
    }

    /// Apply a transaction by producing a block carrying it.
    pub fn apply_ops(&mut self, signer: AccountUid, ops: Vec<Operation>) {
        let tx = self.signed_tx(&[signer], ops);
        self.produce_block_with(vec![tx]);
    }

    pub fn balance(&self, uid: AccountUid) -> Share {
        self.db.get_balance(uid, agora_types::CORE_ASSET_AID)
    }
}

pub fn transfer_op(from: AccountUid, to: AccountUid, amount: Share, fee: Share) -> Operation {
    Operation::Transfer(Transfer {
        fee: Fee::from_balance(fee),
        from,
        to,
        amount: Amount::core(amount),
        memo: None,
        from_prepaid: false,
        to_prepaid: false,
    })
}
