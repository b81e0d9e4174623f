// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::fork::ForkDb;
use crate::host::ContractHost;
use crate::objects::{DynamicGlobalProperties, GlobalProperties, WitnessSchedule};
use crate::state::StateTables;
use agora_blocks::SignedBlock;
use agora_crypto::Sha256Digest;
use agora_db::Store;
use agora_types::{BlockNum, ChainParameters, Timestamp};
use parking_lot::RwLock;
use std::sync::Arc;

/// Validation is complete; used by production paths.
pub const SKIP_NOTHING: u32 = 0;
/// Trust the producer signature (replay from a local archive).
pub const SKIP_WITNESS_SIGNATURE: u32 = 1 << 0;
/// Trust transaction authorities (replay, tests of deeper layers).
pub const SKIP_AUTHORITY_CHECK: u32 = 1 << 1;

/// The deterministic state machine. One writer at a time applies blocks or
/// pending transactions; read-only projections take the committed snapshot
/// through a shared lock around the whole database.
pub struct Database {
    pub(crate) store: Store<StateTables>,
    pub(crate) chain_id: Sha256Digest,
    pub(crate) skip_flags: u32,
    pub(crate) host: Option<Box<dyn ContractHost>>,
    /// Whether the speculative pending-transaction session is open on top
    /// of the last applied block.
    pub(crate) pending_session_open: bool,
    pub(crate) fork_db: ForkDb,
    /// Buffered post-commit observers; never re-enter the writer.
    pub(crate) applied_block_observers: Vec<Box<dyn FnMut(&SignedBlock) + Send>>,
}

/// Committed-state handle shared with read-only projections.
pub type SharedDatabase = Arc<RwLock<Database>>;

impl Database {
    pub(crate) fn empty(chain_id: Sha256Digest) -> Self {
        Database {
            store: Store::new(StateTables::default()),
            chain_id,
            skip_flags: SKIP_NOTHING,
            host: None,
            pending_session_open: false,
            fork_db: ForkDb::default(),
            applied_block_observers: Vec::new(),
        }
    }

    pub fn chain_id(&self) -> &Sha256Digest {
        &self.chain_id
    }

    pub fn set_skip_flags(&mut self, flags: u32) {
        self.skip_flags = flags;
    }

    pub(crate) fn skipping(&self, flag: u32) -> bool {
        self.skip_flags & flag != 0
    }

    /// Register the contract execution engine. Without one, contract calls
    /// fail typed.
    pub fn set_contract_host(&mut self, host: Box<dyn ContractHost>) {
        self.host = Some(host);
    }

    /// Observer called after each block commits, outside any session.
    pub fn on_applied_block(&mut self, f: impl FnMut(&SignedBlock) + Send + 'static) {
        self.applied_block_observers.push(Box::new(f));
    }

    pub fn into_shared(self) -> SharedDatabase {
        Arc::new(RwLock::new(self))
    }

    pub(crate) fn tables(&self) -> &StateTables {
        self.store.tables()
    }

    pub(crate) fn store_mut(&mut self) -> &mut Store<StateTables> {
        &mut self.store
    }

    /// The committee-governed global properties singleton.
    pub fn gpo(&self) -> &GlobalProperties {
        self.store.find::<GlobalProperties>(0).expect("global properties exist after genesis")
    }

    pub fn params(&self) -> &ChainParameters {
        &self.gpo().parameters
    }

    pub fn dpo(&self) -> &DynamicGlobalProperties {
        self.store
            .find::<DynamicGlobalProperties>(0)
            .expect("dynamic global properties exist after genesis")
    }

    pub fn wso(&self) -> &WitnessSchedule {
        self.store.find::<WitnessSchedule>(0).expect("witness schedule exists after genesis")
    }

    pub(crate) fn modify_gpo(&mut self, f: impl FnOnce(&mut GlobalProperties)) {
        self.store.modify(0, f).expect("global properties exist after genesis");
    }

    pub(crate) fn modify_dpo(&mut self, f: impl FnOnce(&mut DynamicGlobalProperties)) {
        self.store.modify(0, f).expect("dynamic global properties exist after genesis");
    }

    pub(crate) fn modify_wso(&mut self, f: impl FnOnce(&mut WitnessSchedule)) {
        self.store.modify(0, f).expect("witness schedule exists after genesis");
    }

    pub fn head_block_num(&self) -> BlockNum {
        self.dpo().head_block_num
    }

    pub fn head_block_time(&self) -> Timestamp {
        self.dpo().head_block_time
    }

    pub fn last_irreversible_block_num(&self) -> BlockNum {
        self.dpo().last_irreversible_block_num
    }

    /// Canonical digest of the whole replicated state; replay from genesis
    /// must reproduce it at every height.
    pub fn state_digest(&self) -> Sha256Digest {
        self.tables().state_digest()
    }

    pub(crate) fn notify_applied_block(&mut self, block: &SignedBlock) {
        let mut observers = std::mem::take(&mut self.applied_block_observers);
        for observer in observers.iter_mut() {
            observer(block);
        }
        self.applied_block_observers = observers;
    }
}
