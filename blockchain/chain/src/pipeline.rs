// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The transaction and block pipelines. A pending transaction runs in a
//! speculative session on top of the head block; a block undoes the
//! speculative state, applies atomically in its own session, and leaves
//! that session on the stack as its revision until it turns irreversible.

use crate::errors::Error;
use crate::evaluators::OpContext;
use crate::objects::{BlockSummary, TransactionRecord, Witness};
use crate::{Database, SKIP_AUTHORITY_CHECK, SKIP_WITNESS_SIGNATURE};
use agora_blocks::SignedBlock;
use agora_crypto::Sha256Digest;
use agora_message::{SignedTransaction, TxId};
use agora_types::{BlockNum, BLOCK_SUMMARY_SLOTS, MAX_UNDO_HISTORY};
use log::warn;
use rayon::prelude::*;

/// Result of one applied operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Void,
    /// Instance id of an object the operation created.
    ObjectId(u64),
}

/// A transaction accepted by the pipeline, with per-operation results.
#[derive(Debug, Clone)]
pub struct ProcessedTransaction {
    pub tx_id: TxId,
    pub operation_results: Vec<OperationResult>,
}

/// Warm signature and id caches for a batch of transactions ahead of the
/// writer; a pure function of the bytes.
pub fn precompute_parallel(
    transactions: &[SignedTransaction],
    chain_id: &Sha256Digest,
) -> Result<(), Error> {
    transactions
        .par_iter()
        .try_for_each(|tx| tx.precompute(chain_id))
        .map_err(Error::from)
}

impl Database {
    /// Admit a transaction into the speculative pending state.
    pub fn push_transaction(
        &mut self,
        tx: &SignedTransaction,
    ) -> Result<ProcessedTransaction, Error> {
        if !self.pending_session_open {
            self.store.begin_session();
            self.pending_session_open = true;
        }
        self.store.begin_session();
        match self.apply_transaction(tx) {
            Ok(processed) => {
                self.store.commit_session();
                Ok(processed)
            }
            Err(e) => {
                self.store.undo_session();
                Err(e)
            }
        }
    }

    /// Drop the speculative pending state, if any.
    pub fn clear_pending(&mut self) {
        if self.pending_session_open {
            self.store.undo_session();
            self.pending_session_open = false;
        }
    }

    fn apply_transaction(&mut self, tx: &SignedTransaction) -> Result<ProcessedTransaction, Error> {
        tx.validate()?;
        let params = self.params();
        let tx_size = agora_encoding::serialize_canonical(tx)
            .map(|b| b.len())
            .unwrap_or(usize::MAX);
        if tx_size > params.maximum_transaction_size as usize {
            return Err(Error::TransactionInvalid(format!(
                "transaction of {tx_size} bytes exceeds the maximum"
            )));
        }

        let now = self.head_block_time();
        let expiration = tx.transaction.expiration;
        if expiration <= now {
            return Err(Error::TransactionInvalid("transaction has expired".into()));
        }
        if expiration - now > params.maximum_time_until_expiration {
            return Err(Error::TransactionInvalid(
                "transaction expiration too far in the future".into(),
            ));
        }

        // TaPoS: the referenced summary slot must carry the claimed prefix
        let summary = self
            .block_summary(tx.transaction.ref_block_num as u64)
            .copied()
            .unwrap_or_default();
        if tx.transaction.ref_block_prefix != summary.block_id.tapos_prefix() {
            return Err(Error::TransactionInvalid(
                "TaPoS prefix does not match the referenced block".into(),
            ));
        }

        let tx_id = tx.id();
        if self.find_transaction_record(&tx_id).is_some() {
            return Err(Error::TransactionInvalid(format!("duplicate transaction {tx_id:?}")));
        }

        if !self.skipping(SKIP_AUTHORITY_CHECK) {
            self.verify_transaction_authority(tx)?;
        }
        let signers = tx.recovered_signers(&self.chain_id)?.to_vec();

        self.store.create(TransactionRecord { trx_id: tx_id, expiration });

        let ctx = OpContext { signers, from_contract: false };
        let mut operation_results = Vec::with_capacity(tx.transaction.operations.len());
        for (index, op) in tx.transaction.operations.iter().enumerate() {
            self.store.begin_session();
            match self.dispatch_operation(&ctx, op) {
                Ok(result) => {
                    self.store.commit_session();
                    operation_results.push(result);
                }
                Err(e) => {
                    self.store.undo_session();
                    return Err(Error::op_failed(index, op.name(), e));
                }
            }
        }
        Ok(ProcessedTransaction { tx_id, operation_results })
    }

    /// Apply a block to the head of the chain. All-or-nothing: a failing
    /// block leaves the state untouched and is rejected with its id.
    pub fn push_block(&mut self, block: &SignedBlock) -> Result<(), Error> {
        self.clear_pending();
        self.fork_db.push(block.signed_header());
        if block.header.previous != self.dpo().head_block_id {
            return Err(Error::ConsensusViolation(format!(
                "block {} does not link to head {}",
                block.id(),
                self.dpo().head_block_id
            )));
        }
        self.store.begin_session();
        match self.apply_block(block) {
            Ok(()) => {
                // the session stays open as this block's undo revision
                let reversible =
                    self.head_block_num() - self.last_irreversible_block_num();
                self.store.trim_sessions(reversible.max(1) as usize);
                self.fork_db.set_max_size(reversible.max(1) as usize + 1);
                self.notify_applied_block(block);
                Ok(())
            }
            Err(e) => {
                warn!("rejecting block {}: {e}", block.id());
                self.store.undo_session();
                Err(e)
            }
        }
    }

    /// Assemble, sign and apply a block at `timestamp`, which must be a
    /// slot assigned to the witness owning `signing_key`. Pending
    /// transactions not passed in are dropped back to the caller's mempool.
    pub fn produce_block(
        &mut self,
        timestamp: agora_types::Timestamp,
        signing_key: &agora_crypto::PrivateKey,
        transactions: Vec<SignedTransaction>,
    ) -> Result<SignedBlock, Error> {
        let slot_num = self.get_slot_at_time(timestamp);
        if slot_num == 0 {
            return Err(Error::ConsensusViolation(
                "production timestamp is not a future slot".into(),
            ));
        }
        let witness = self.get_scheduled_witness(slot_num);
        let block = SignedBlock::produce(
            self.dpo().head_block_id,
            self.get_slot_time(slot_num),
            witness,
            transactions,
            signing_key,
        );
        self.push_block(&block)?;
        Ok(block)
    }

    /// Undo the head block, restoring the previous state. Fails once the
    /// head is irreversible.
    pub fn pop_block(&mut self) -> Result<(), Error> {
        self.clear_pending();
        if self.store.open_sessions() == 0 {
            return Err(Error::ConsensusViolation(
                "no reversible blocks left to pop".into(),
            ));
        }
        self.store.undo_session();
        Ok(())
    }

    fn apply_block(&mut self, block: &SignedBlock) -> Result<(), Error> {
        self.validate_block_header(block)?;
        let signing_witness_id = self
            .find_witness_by_uid(block.header.witness)
            .map(|(id, _)| id)
            .ok_or_else(|| {
                Error::ConsensusViolation(format!("unknown witness {}", block.header.witness))
            })?;

        let block_size = agora_encoding::serialize_canonical(block)
            .map(|b| b.len())
            .unwrap_or(usize::MAX);
        if block_size > self.params().maximum_block_size as usize {
            return Err(Error::ConsensusViolation(format!(
                "block of {block_size} bytes exceeds the maximum"
            )));
        }

        for tx in &block.transactions {
            // a bad transaction is fatal at block scope
            self.store.begin_session();
            match self.apply_transaction(tx) {
                Ok(_) => self.store.commit_session(),
                Err(e) => {
                    self.store.undo_session();
                    return Err(Error::ConsensusViolation(format!(
                        "block {} contains invalid transaction {:?}: {e}",
                        block.id(),
                        tx.id()
                    )));
                }
            }
        }

        self.update_global_dynamic_data(block)?;
        self.update_signing_witness(signing_witness_id, block)?;
        self.update_last_irreversible_block()?;
        self.create_block_summary(block);
        self.perform_block_maintenance()?;
        Ok(())
    }

    fn validate_block_header(&self, block: &SignedBlock) -> Result<(), Error> {
        let header = &block.header;
        if header.timestamp <= self.head_block_time() {
            return Err(Error::ConsensusViolation(
                "block timestamp is not after the head block".into(),
            ));
        }
        let slot_num = self.get_slot_at_time(header.timestamp);
        if slot_num == 0 {
            return Err(Error::ConsensusViolation("block timestamp is not a future slot".into()));
        }
        if self.get_slot_time(slot_num) != header.timestamp {
            return Err(Error::ConsensusViolation(
                "block timestamp is not slot-aligned".into(),
            ));
        }
        let scheduled = self.get_scheduled_witness(slot_num);
        if scheduled != header.witness {
            return Err(Error::ConsensusViolation(format!(
                "witness {} produced at slot {slot_num} scheduled for {scheduled}",
                header.witness
            )));
        }
        block.verify_merkle_root()?;
        if !self.skipping(SKIP_WITNESS_SIGNATURE) {
            let (_, witness) = self
                .find_witness_by_uid(header.witness)
                .ok_or_else(|| {
                    Error::ConsensusViolation(format!("unknown witness {}", header.witness))
                })?;
            block.signed_header().verify_signature(&witness.signing_key)?;
        }
        Ok(())
    }

    /// Head-state bookkeeping: process missed slots, then advance the head
    /// fields and the participation bitfield.
    fn update_global_dynamic_data(&mut self, block: &SignedBlock) -> Result<(), Error> {
        let missed_blocks = self.get_slot_at_time(block.header.timestamp) - 1;
        let max_inactive = self.params().max_witness_inactive_blocks;
        let block_num = block.block_num();

        for i in 0..missed_blocks {
            let missed_witness = self.get_scheduled_witness(i + 1);
            if missed_witness == block.header.witness {
                continue;
            }
            let found = self
                .find_witness_by_uid(missed_witness)
                .map(|(id, w)| (id, w.last_confirmed_block_num));
            if let Some((witness_id, last_confirmed)) = found {
                let inactive = last_confirmed + max_inactive < block_num;
                self.modify_witness(witness_id, |w| {
                    w.total_missed += 1;
                    if inactive {
                        // an absent witness loses its key until it re-registers
                        w.signing_key = agora_crypto::PublicKey::null();
                    }
                })
                .map_err(|e| Error::InternalInvariant(e.to_string()))?;
                self.modify_account_statistics(missed_witness, |s| s.witness_total_missed += 1)
                    .map_err(|e| Error::InternalInvariant(e.to_string()))?;
            }
        }

        let block_id = block.id();
        self.modify_dpo(|dpo| {
            if block_num == 1 {
                dpo.recently_missed_count = 0;
            } else if missed_blocks > 0 {
                dpo.recently_missed_count +=
                    agora_types::RECENTLY_MISSED_COUNT_INCREMENT * missed_blocks;
            } else if dpo.recently_missed_count > agora_types::RECENTLY_MISSED_COUNT_INCREMENT {
                dpo.recently_missed_count -= agora_types::RECENTLY_MISSED_COUNT_DECREMENT;
            } else if dpo.recently_missed_count > 0 {
                dpo.recently_missed_count -= 1;
            }
            dpo.head_block_num = block_num;
            dpo.head_block_id = block_id;
            dpo.head_block_time = block.header.timestamp;
            dpo.current_witness = block.header.witness;
            dpo.recent_slots_filled = ((dpo.recent_slots_filled << 1) | 1) << missed_blocks;
            dpo.current_aslot += missed_blocks as u64 + 1;
        });

        let dpo = self.dpo();
        if dpo.head_block_num - dpo.last_irreversible_block_num >= MAX_UNDO_HISTORY {
            return Err(Error::InternalInvariant(
                "not enough undo history to tolerate this many missed blocks".into(),
            ));
        }
        Ok(())
    }

    /// Pay the producer and roll its production counters.
    fn update_signing_witness(
        &mut self,
        witness_id: u64,
        block: &SignedBlock,
    ) -> Result<(), Error> {
        let witness_uid = block.header.witness;
        let kind = *self
            .gpo()
            .active_witnesses
            .get(&witness_uid)
            .ok_or_else(|| {
                Error::ConsensusViolation(format!("witness {witness_uid} is not active"))
            })?;

        let budget_this_block = self.dpo().total_budget_per_block.min(self.core_reserved());
        let scheduled_pay = match kind {
            agora_types::ScheduledWitnessKind::ByVoteTop => {
                self.params().by_vote_top_witness_pay_per_block
            }
            agora_types::ScheduledWitnessKind::ByVoteRest => {
                self.params().by_vote_rest_witness_pay_per_block
            }
            agora_types::ScheduledWitnessKind::ByPledge => {
                self.dpo().by_pledge_witness_pay_per_block
            }
        };
        let witness_pay = scheduled_pay.min(budget_this_block);
        let budget_remained = budget_this_block - witness_pay;

        if budget_this_block > 0 {
            self.adjust_core_supply(budget_this_block);
        }
        if budget_remained > 0 {
            self.modify_dpo(|dpo| dpo.budget_pool += budget_remained);
        }
        if witness_pay > 0 {
            self.modify_account_statistics(witness_uid, |s| {
                s.uncollected_witness_pay += witness_pay;
            })
            .map_err(|e| Error::InternalInvariant(e.to_string()))?;
        }

        let aslot = self.dpo().current_aslot;
        let block_num = block.block_num();
        self.modify_witness(witness_id, |w| {
            w.last_aslot = aslot;
            w.total_produced += 1;
            w.last_confirmed_block_num = block_num;
        })
        .map_err(|e| Error::InternalInvariant(e.to_string()))?;
        self.modify_account_statistics(witness_uid, |s| {
            s.witness_last_aslot = aslot;
            s.witness_total_produced += 1;
            s.witness_last_confirmed_block_num = block_num;
        })
        .map_err(|e| Error::InternalInvariant(e.to_string()))?;
        Ok(())
    }

    /// The supermajority-confirmed height: sort the active witnesses by
    /// last confirmed block and take the (1 − threshold) percentile.
    fn update_last_irreversible_block(&mut self) -> Result<(), Error> {
        let active: Vec<u64> = self
            .gpo()
            .active_witnesses
            .keys()
            .filter_map(|uid| self.find_witness_by_uid(*uid).map(|(id, _)| id))
            .collect();
        if active.is_empty() {
            return Ok(());
        }
        let mut confirmed: Vec<BlockNum> = active
            .iter()
            .map(|id| {
                self.store
                    .get::<Witness>(*id)
                    .map(|w| w.last_confirmed_block_num)
                    .unwrap_or(0)
            })
            .collect();
        confirmed.sort_unstable();
        let offset = ((agora_types::FULL_PERCENT - agora_types::IRREVERSIBLE_THRESHOLD) as usize
            * confirmed.len())
            / agora_types::FULL_PERCENT as usize;
        let new_last_irreversible = confirmed[offset];
        if new_last_irreversible > self.dpo().last_irreversible_block_num {
            self.modify_dpo(|dpo| dpo.last_irreversible_block_num = new_last_irreversible);
        }
        Ok(())
    }

    fn create_block_summary(&mut self, block: &SignedBlock) {
        let slot = (block.block_num() % BLOCK_SUMMARY_SLOTS) as u64;
        self.store.put(slot, BlockSummary { block_id: block.id() });
    }
}
