// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

mod common;

use common::*;
use std::collections::BTreeMap;

#[test]
fn transfer_moves_funds_and_burns_the_fee() {
    let mut chain = TestChain::new();
    assert_eq!(chain.balance(ALICE), 1_000_000);

    let supply_before = chain.db.core_current_supply();
    let tx = chain.signed_tx(&[ALICE], vec![transfer_op(ALICE, BOB, 100, 1)]);
    chain.produce_block_with(vec![tx.clone()]);

    assert_eq!(chain.balance(ALICE), 999_899);
    assert_eq!(chain.balance(BOB), 100);
    assert_eq!(chain.db.core_current_supply(), supply_before - 1);
    assert_eq!(chain.db.head_block_num(), 1);

    // the id is deduplicated while the original has not expired
    let err = chain.db.push_transaction(&tx).unwrap_err();
    assert!(err.to_string().contains("duplicate"));

    chain.db.check_invariants().unwrap();
}

#[test]
fn unsigned_transfer_is_rejected() {
    let mut chain = TestChain::new();
    let tx = chain.signed_tx(&[BOB], vec![transfer_op(ALICE, BOB, 100, 0)]);
    let err = chain.db.push_transaction(&tx).unwrap_err();
    assert!(err.to_string().contains("authority"), "got: {err}");
    assert_eq!(chain.balance(BOB), 0);
}

#[test]
fn five_witnesses_share_ten_blocks_evenly() {
    let mut chain = TestChain::new();
    let mut produced: BTreeMap<u64, u32> = BTreeMap::new();
    for _ in 0..10 {
        let block = chain.produce_block();
        *produced.entry(block.header.witness).or_insert(0) += 1;
    }
    assert_eq!(produced.len(), 5);
    for (witness, count) in &produced {
        assert_eq!(*count, 2, "witness {witness} signed {count} blocks");
    }
    // with five witnesses and a 67% threshold the irreversible height
    // trails the head by three confirmed blocks
    assert_eq!(chain.db.head_block_num(), 10);
    assert_eq!(chain.db.last_irreversible_block_num(), 7);
}

#[test]
fn irreversibility_is_monotonic() {
    let mut chain = TestChain::new();
    let mut last = 0;
    for _ in 0..20 {
        chain.produce_block();
        let lib = chain.db.last_irreversible_block_num();
        assert!(lib >= last);
        assert!(lib <= chain.db.head_block_num());
        last = lib;
    }
}

#[test]
fn failing_operation_undoes_the_whole_transaction() {
    let mut chain = TestChain::new();
    let alice_before = chain.balance(ALICE);

    let tx = chain.signed_tx(
        &[ALICE],
        vec![
            transfer_op(ALICE, BOB, 100, 0),
            transfer_op(ALICE, BOB, 100_000_000_000, 0),
        ],
    );
    let err = chain.db.push_transaction(&tx).unwrap_err();
    match err {
        agora_chain::Error::OperationFailed { index, name, .. } => {
            assert_eq!(index, 1);
            assert_eq!(name, "transfer");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(chain.balance(ALICE), alice_before);
    assert_eq!(chain.balance(BOB), 0);

    // the mempool is unaffected for the next transaction
    chain
        .db
        .push_transaction(&chain.signed_tx(&[ALICE], vec![transfer_op(ALICE, BOB, 50, 0)]))
        .unwrap();
}

#[test]
fn pending_state_undo_restores_bit_identical_state() {
    let mut chain = TestChain::new();
    chain.produce_blocks(2);
    let digest_before = chain.db.state_digest();

    chain.push_ops(ALICE, vec![transfer_op(ALICE, BOB, 1_000, 0)]).unwrap();
    assert_ne!(chain.db.state_digest(), digest_before);

    chain.db.clear_pending();
    assert_eq!(chain.db.state_digest(), digest_before);
}

#[test]
fn popping_a_block_restores_the_previous_state() {
    let mut chain = TestChain::new();
    chain.produce_blocks(2);
    let digest_before = chain.db.state_digest();
    let head_before = chain.db.head_block_num();

    let tx = chain.signed_tx(&[ALICE], vec![transfer_op(ALICE, BOB, 77, 0)]);
    chain.produce_block_with(vec![tx]);
    assert_eq!(chain.balance(BOB), 77);

    chain.db.pop_block().unwrap();
    assert_eq!(chain.db.head_block_num(), head_before);
    assert_eq!(chain.db.state_digest(), digest_before);
    assert_eq!(chain.balance(BOB), 0);
}

#[test]
fn replaying_the_block_log_reproduces_every_state_digest() {
    let mut source = TestChain::new();
    let mut replica = TestChain::new();
    assert_eq!(source.db.state_digest(), replica.db.state_digest());

    let mut log: Vec<(agora_blocks::SignedBlock, agora_crypto::Sha256Digest)> = Vec::new();
    let tx = source.signed_tx(&[ALICE], vec![transfer_op(ALICE, BOB, 500, 1)]);
    let block = source.produce_block_with(vec![tx]);
    log.push((block, source.db.state_digest()));
    for _ in 0..6 {
        let block = source.produce_block();
        log.push((block, source.db.state_digest()));
    }
    let tx = source.signed_tx(&[BOB], vec![transfer_op(BOB, CAROL, 123, 0)]);
    let block = source.produce_block_with(vec![tx]);
    log.push((block, source.db.state_digest()));

    for (block, digest) in &log {
        replica.db.push_block(block).unwrap();
        assert_eq!(replica.db.state_digest(), *digest);
    }
}

#[test]
fn blocks_from_unscheduled_witnesses_are_rejected() {
    let mut chain = TestChain::new();
    let timestamp = chain.db.get_slot_time(1);
    let scheduled = chain.db.get_scheduled_witness(1);
    let someone_else = WITNESSES.iter().find(|w| **w != scheduled).copied().unwrap();

    let block = agora_blocks::SignedBlock::produce(
        chain.db.dpo().head_block_id,
        timestamp,
        someone_else,
        Vec::new(),
        &witness_key(someone_else),
    );
    let err = chain.db.push_block(&block).unwrap_err();
    assert!(err.to_string().contains("scheduled"), "got: {err}");
    assert_eq!(chain.db.head_block_num(), 0);
}

#[test]
fn wrongly_signed_block_is_rejected() {
    let mut chain = TestChain::new();
    let timestamp = chain.db.get_slot_time(1);
    let scheduled = chain.db.get_scheduled_witness(1);

    let block = agora_blocks::SignedBlock::produce(
        chain.db.dpo().head_block_id,
        timestamp,
        scheduled,
        Vec::new(),
        &witness_key(scheduled + 7),
    );
    assert!(chain.db.push_block(&block).is_err());
}

#[test]
fn missed_slots_are_charged_to_the_absent_witness() {
    let mut chain = TestChain::new();
    chain.produce_blocks(3);

    // skip one slot: produce at slot 2
    let timestamp = chain.db.get_slot_time(2);
    let witness = chain.db.get_scheduled_witness(2);
    let missed = chain.db.get_scheduled_witness(1);
    chain.db.produce_block(timestamp, &witness_key(witness), Vec::new()).unwrap();

    let (_, missed_witness) = chain.db.find_witness_by_uid(missed).unwrap();
    assert_eq!(missed_witness.total_missed, 1);
    assert!(chain.db.dpo().recently_missed_count > 0);
}
