// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The host-function boundary of the contract sandbox. The execution engine
//! itself lives outside this crate; it reaches chain state only through
//! [`HostContext`], and the chain reaches it only through [`ContractHost`].
//! Everything crossing this boundary is deterministic: keyed table rows,
//! head-block introspection, transfers and bounded inline actions.

use crate::errors::EvalError;
use crate::objects::balance_idx;
use crate::Database;
use agora_db::KeyWriter;
use agora_db::{ChainObject, IndexKey};
use agora_types::{AccountUid, Amount, Timestamp};
use serde::{Deserialize, Serialize};

/// Inline-action recursion bound.
pub const MAX_INLINE_ACTION_DEPTH: u32 = 4;
/// Largest serialized inline action.
pub const MAX_INLINE_ACTION_SIZE: usize = 4096;

/// A row in a contract's keyed table, billed to `payer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRow {
    pub code_account: AccountUid,
    pub scope: u64,
    pub table: u64,
    pub primary_key: u64,
    pub payer: AccountUid,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl ContractRow {
    /// Storage bytes billed to the payer for this row.
    pub fn billable_size(&self) -> u64 {
        // fixed row overhead plus payload
        self.data.len() as u64 + 32
    }

    pub fn key(code_account: AccountUid, scope: u64, table: u64, primary_key: u64) -> IndexKey {
        KeyWriter::default()
            .u64(code_account)
            .u64(scope)
            .u64(table)
            .u64(primary_key)
            .finish()
    }
}

pub mod contract_row_idx {
    pub const BY_KEY: usize = 0;
}

impl ChainObject for ContractRow {
    const TYPE_NAME: &'static str = "contract_row";
    const INDEX_COUNT: usize = 1;

    fn index_keys(&self, _id: u64) -> Vec<IndexKey> {
        vec![Self::key(self.code_account, self.scope, self.table, self.primary_key)]
    }
}

/// Deterministic CPU metering for one transaction's contract calls.
#[derive(Debug, Clone, Copy)]
pub struct CpuBudget {
    remaining_us: u64,
}

impl CpuBudget {
    pub fn new(limit_us: u64) -> Self {
        CpuBudget { remaining_us: limit_us }
    }

    /// Charge `cost_us`; exhaustion aborts the evaluator's session.
    pub fn consume(&mut self, cost_us: u64) -> Result<(), EvalError> {
        if cost_us > self.remaining_us {
            return Err(EvalError::WasmExecution("transaction cpu budget exhausted".into()));
        }
        self.remaining_us -= cost_us;
        Ok(())
    }

    pub fn remaining(&self) -> u64 {
        self.remaining_us
    }
}

/// One contract invocation as handed to the host.
#[derive(Debug, Clone)]
pub struct ContractCallContext {
    pub sender: AccountUid,
    pub contract: AccountUid,
    pub method: String,
    pub data: Vec<u8>,
    pub attached: Option<Amount>,
    pub depth: u32,
}

/// The sandboxed execution engine, registered at node startup. The default
/// node runs without one; `contract_call` then fails typed.
pub trait ContractHost: Send {
    fn execute(
        &mut self,
        ctx: &ContractCallContext,
        chain: &mut HostContext<'_>,
        budget: &mut CpuBudget,
    ) -> Result<(), EvalError>;
}

/// The chain-state window a contract sees. Writes are billed to the row's
/// payer and land on the undo stack like any other mutation.
pub struct HostContext<'a> {
    db: &'a mut Database,
}

impl<'a> HostContext<'a> {
    pub(crate) fn new(db: &'a mut Database) -> Self {
        HostContext { db }
    }

    pub fn head_block_num(&self) -> u32 {
        self.db.head_block_num()
    }

    pub fn head_block_time(&self) -> Timestamp {
        self.db.head_block_time()
    }

    pub fn head_block_id(&self) -> [u8; 20] {
        self.db.dpo().head_block_id.0
    }

    pub fn find_row(
        &self,
        code_account: AccountUid,
        scope: u64,
        table: u64,
        primary_key: u64,
    ) -> Option<&ContractRow> {
        let key = ContractRow::key(code_account, scope, table, primary_key);
        let id = self
            .db
            .tables()
            .contract_rows
            .id_by_key(contract_row_idx::BY_KEY, &key)?;
        self.db.tables().contract_rows.get(id)
    }

    /// Insert or replace a row; the payer is billed for its storage.
    pub fn store_row(&mut self, row: ContractRow) -> Result<(), EvalError> {
        let key = ContractRow::key(row.code_account, row.scope, row.table, row.primary_key);
        let existing = self
            .db
            .tables()
            .contract_rows
            .id_by_key(contract_row_idx::BY_KEY, &key);
        match existing {
            Some(id) => {
                self.db.store_mut().modify(id, |r: &mut ContractRow| *r = row)?;
            }
            None => {
                self.db.store_mut().create(row);
            }
        }
        Ok(())
    }

    pub fn erase_row(
        &mut self,
        code_account: AccountUid,
        scope: u64,
        table: u64,
        primary_key: u64,
    ) -> Result<(), EvalError> {
        let key = ContractRow::key(code_account, scope, table, primary_key);
        let id = self
            .db
            .tables()
            .contract_rows
            .id_by_key(contract_row_idx::BY_KEY, &key)
            .ok_or(EvalError::Missing { kind: "contract_row", detail: "no such row".into() })?;
        self.db.store_mut().remove::<ContractRow>(id)?;
        Ok(())
    }

    /// Asset transfer on behalf of the executing contract.
    pub fn transfer(
        &mut self,
        from: AccountUid,
        to: AccountUid,
        amount: Amount,
    ) -> Result<(), EvalError> {
        self.db.transfer_checked(from, to, amount)
    }

    pub fn balance_of(&self, account: AccountUid, asset: u64) -> i64 {
        let key = KeyWriter::default().u64(account).u64(asset).finish();
        self.db
            .tables()
            .balances
            .id_by_key(balance_idx::BY_ACCOUNT_ASSET, &key)
            .and_then(|id| self.db.tables().balances.get(id))
            .map(|b| b.balance)
            .unwrap_or(0)
    }

    pub fn sha256(&self, data: &[u8]) -> [u8; 32] {
        agora_crypto::sha256(data)
    }

    /// Emit a nested action, bounded by depth and size.
    pub fn inline_call(
        &mut self,
        ctx: ContractCallContext,
        host: &mut dyn ContractHost,
        budget: &mut CpuBudget,
    ) -> Result<(), EvalError> {
        if ctx.depth >= MAX_INLINE_ACTION_DEPTH {
            return Err(EvalError::WasmExecution("inline action recursion too deep".into()));
        }
        if ctx.data.len() > MAX_INLINE_ACTION_SIZE {
            return Err(EvalError::WasmExecution("inline action too large".into()));
        }
        host.execute(&ctx, self, budget)
    }
}
