// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

mod common;

use agora_message::operations::{
    AccountUpdateProxy, CommitteeProposalCreate, CommitteeProposalItem, CommitteeProposalUpdate,
    ParameterUpdates, WitnessUpdate, WitnessVoteUpdate,
};
use agora_message::{Fee, Operation};
use common::*;

fn witness_vote_op(voter: u64, add: Vec<u64>, remove: Vec<u64>) -> Operation {
    Operation::WitnessVoteUpdate(WitnessVoteUpdate {
        fee: Fee::default(),
        voter,
        witnesses_to_add: add,
        witnesses_to_remove: remove,
    })
}

#[test]
fn proxy_chain_routes_votes_to_the_proxy() {
    let mut chain = TestChain::new();
    let target = WITNESSES[0];

    // dave votes by himself, then carol proxies to dave
    chain.apply_ops(DAVE, vec![witness_vote_op(DAVE, vec![target], vec![])]);
    chain.apply_ops(
        CAROL,
        vec![Operation::AccountUpdateProxy(AccountUpdateProxy {
            fee: Fee::default(),
            voter: CAROL,
            proxy: DAVE,
        })],
    );

    // one effective-votes rollover later both raw balances count
    chain.produce_blocks(6);

    let carol_seq = chain.db.get_account_statistics_by_uid(CAROL).unwrap().last_voter_sequence;
    let dave_seq = chain.db.get_account_statistics_by_uid(DAVE).unwrap().last_voter_sequence;
    let (_, carol_voter) = chain.db.find_voter(CAROL, carol_seq).unwrap();
    let (_, dave_voter) = chain.db.find_voter(DAVE, dave_seq).unwrap();

    assert_eq!(carol_voter.number_of_witnesses_voted, 0);
    assert_eq!(carol_voter.proxy_uid, DAVE);
    assert_eq!(dave_voter.proxied_voters, 1);
    assert_eq!(dave_voter.proxied_votes[0], 1_000);
    assert_eq!(dave_voter.total_votes(), 1_500);

    let (_, witness) = chain.db.find_witness_by_uid(target).unwrap();
    assert_eq!(witness.total_votes, 1_500);

    chain.db.check_invariants().unwrap();
}

#[test]
fn proxy_loops_are_rejected() {
    let mut chain = TestChain::new();
    chain.apply_ops(DAVE, vec![witness_vote_op(DAVE, vec![WITNESSES[0]], vec![])]);
    chain.apply_ops(
        CAROL,
        vec![Operation::AccountUpdateProxy(AccountUpdateProxy {
            fee: Fee::default(),
            voter: CAROL,
            proxy: DAVE,
        })],
    );
    // dave proxying back to carol would close the loop
    let err = chain
        .push_ops(
            DAVE,
            vec![Operation::AccountUpdateProxy(AccountUpdateProxy {
                fee: Fee::default(),
                voter: DAVE,
                proxy: CAROL,
            })],
        )
        .unwrap_err();
    assert!(err.to_string().contains("loop"), "got: {err}");
}

#[test]
fn removing_a_vote_requires_having_cast_it() {
    let mut chain = TestChain::new();
    let err = chain
        .push_ops(DAVE, vec![witness_vote_op(DAVE, vec![], vec![WITNESSES[0]])])
        .unwrap_err();
    assert!(err.to_string().contains("can not remove"), "got: {err}");
}

#[test]
fn vote_totals_follow_the_voter_balance() {
    let mut chain = TestChain::new();
    let target = WITNESSES[1];
    chain.apply_ops(DAVE, vec![witness_vote_op(DAVE, vec![target], vec![])]);
    chain.produce_blocks(6);
    let (_, witness) = chain.db.find_witness_by_uid(target).unwrap();
    assert_eq!(witness.total_votes, 500);

    // an incoming transfer raises raw votes at once, effective votes only
    // after the next scheduled rollover
    let tx = chain.signed_tx(&[ALICE], vec![transfer_op(ALICE, DAVE, 500, 0)]);
    chain.produce_block_with(vec![tx]);
    let (_, witness) = chain.db.find_witness_by_uid(target).unwrap();
    assert_eq!(witness.total_votes, 500);
    chain.produce_blocks(6);
    let (_, witness) = chain.db.find_witness_by_uid(target).unwrap();
    assert_eq!(witness.total_votes, 1_000);
}

#[test]
fn committee_proposal_executes_after_supermajority() {
    let mut chain = TestChain::new();
    chain.produce_blocks(1);
    let head = chain.db.head_block_num();

    let proposal_op = Operation::CommitteeProposalCreate(CommitteeProposalCreate {
        fee: Fee::default(),
        proposer: COMMITTEE[0],
        items: vec![CommitteeProposalItem::GlobalParametersUpdate(Box::new(ParameterUpdates {
            maximum_block_size: Some(200_000),
            ..Default::default()
        }))],
        voting_closing_block_num: head + 10,
        execution_block_num: head + 10,
        expiration_block_num: head + 20,
        proposer_opinion: Some(true),
    });
    chain.apply_ops(COMMITTEE[0], vec![proposal_op]);
    let number = 1;

    // four more "for" opinions reach 5/7 which clears the two-thirds bar
    for member in &COMMITTEE[1..4] {
        chain.apply_ops(
            *member,
            vec![Operation::CommitteeProposalUpdate(CommitteeProposalUpdate {
                fee: Fee::default(),
                account: *member,
                proposal_number: number,
                opinion: true,
            })],
        );
        let (_, proposal) = chain.db.find_committee_proposal(number).unwrap();
        assert!(!proposal.is_approved, "4/7 must not approve");
    }
    chain.apply_ops(
        COMMITTEE[4],
        vec![Operation::CommitteeProposalUpdate(CommitteeProposalUpdate {
            fee: Fee::default(),
            account: COMMITTEE[4],
            proposal_number: number,
            opinion: true,
        })],
    );
    let (_, proposal) = chain.db.find_committee_proposal(number).unwrap();
    assert!(proposal.is_approved);
    assert_eq!(chain.db.params().maximum_block_size, 2_000_000);

    // reaching the execution block applies the change and removes the
    // proposal object
    while chain.db.head_block_num() < head + 10 {
        chain.produce_block();
    }
    assert_eq!(chain.db.params().maximum_block_size, 200_000);
    assert!(chain.db.find_committee_proposal(number).is_none());

    while chain.db.head_block_num() < head + 21 {
        chain.produce_block();
    }
    assert!(chain.db.find_committee_proposal(number).is_none());
}

#[test]
fn witness_pledge_release_is_delayed() {
    let mut chain = TestChain::new();
    let witness = WITNESSES[0];
    chain.produce_blocks(1);

    // lower the pledge; the delta parks in the releasing queue
    chain.apply_ops(
        witness,
        vec![Operation::WitnessUpdate(WitnessUpdate {
            fee: Fee::default(),
            account: witness,
            new_pledge: Some(5_000),
            new_signing_key: None,
            new_url: None,
        })],
    );
    let stats = chain.db.get_account_statistics_by_uid(witness).unwrap();
    assert_eq!(stats.total_witness_pledge, 10_000);
    assert_eq!(stats.releasing_witness_pledge, 5_000);
    let release_block = stats.witness_pledge_release_block;
    assert!(release_block > chain.db.head_block_num());

    // raising again consumes the queue instead of locking new coins
    chain.apply_ops(
        witness,
        vec![Operation::WitnessUpdate(WitnessUpdate {
            fee: Fee::default(),
            account: witness,
            new_pledge: Some(7_000),
            new_signing_key: None,
            new_url: None,
        })],
    );
    let stats = chain.db.get_account_statistics_by_uid(witness).unwrap();
    assert_eq!(stats.total_witness_pledge, 10_000);
    assert_eq!(stats.releasing_witness_pledge, 3_000);

    chain.db.check_invariants().unwrap();
}

#[test]
fn witness_resignation_respects_the_minimum_set() {
    let mut chain = TestChain::new();
    chain.produce_blocks(1);
    // five witnesses fill exactly one round; nobody may resign
    let err = chain
        .push_ops(
            WITNESSES[0],
            vec![Operation::WitnessUpdate(WitnessUpdate {
                fee: Fee::default(),
                account: WITNESSES[0],
                new_pledge: Some(0),
                new_signing_key: None,
                new_url: None,
            })],
        )
        .unwrap_err();
    assert!(err.to_string().contains("can not resign"), "got: {err}");
}

#[test]
fn voters_expire_and_are_garbage_collected() {
    let mut params = test_parameters();
    params.governance_voting_expiration_blocks = 10;
    let mut chain = TestChain::with_parameters(params);

    chain.apply_ops(DAVE, vec![witness_vote_op(DAVE, vec![WITNESSES[0]], vec![])]);
    let seq = chain.db.get_account_statistics_by_uid(DAVE).unwrap().last_voter_sequence;
    assert!(chain.db.find_voter(DAVE, seq).is_some());

    chain.produce_blocks(16);
    // past the expiration window the voter was invalidated and erased, and
    // its influence withdrawn
    assert!(chain.db.find_voter(DAVE, seq).is_none());
    assert!(!chain.db.get_account_statistics_by_uid(DAVE).unwrap().is_voter);
    chain.db.check_invariants().unwrap();
}
