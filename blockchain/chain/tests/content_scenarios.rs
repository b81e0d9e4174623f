// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

mod common;

use agora_message::operations::{
    AccountAuthPlatform, Buyout, CsafCollect, LicenseCreate, Post, PostType, PostUpdate, Reward,
    ScoreCreate,
};
use agora_message::{Fee, Operation};
use agora_types::{
    platform_permission, post_permission, Amount, FULL_PERCENT, MAX_PLATFORM_LIMIT_PREPAID,
};
use common::*;

fn post_op(poster: u64, pid: u64) -> Operation {
    Operation::Post(Post {
        fee: Fee::default(),
        platform: PLATFORM,
        poster,
        post_pid: pid,
        post_type: PostType::Original,
        origin_platform: None,
        origin_poster: None,
        origin_post_pid: None,
        hash_value: "b8a7".into(),
        title: "hello".into(),
        body: "first post".into(),
        extra_data: "{}".into(),
        forward_price: Some(10),
        receiptors: None,
        license_lid: None,
        permission_flags: post_permission::ALL,
    })
}

fn auth_platform_op(uid: u64) -> Operation {
    Operation::AccountAuthPlatform(AccountAuthPlatform {
        fee: Fee::default(),
        uid,
        platform: PLATFORM,
        max_limit: MAX_PLATFORM_LIMIT_PREPAID,
        permission_flags: platform_permission::ALL,
        memo: None,
    })
}

#[test]
fn score_and_reward_flow_through_the_receiptor_split() {
    let mut chain = TestChain::new();
    chain.produce_blocks(1);

    chain.apply_ops(ALICE, vec![post_op(ALICE, 1)]);

    // carol converts coin-seconds into csaf, authorizes the platform and
    // scores the post
    chain.apply_ops(
        CAROL,
        vec![Operation::CsafCollect(CsafCollect {
            fee: Fee::default(),
            from: CAROL,
            to: CAROL,
            amount: 100,
        })],
    );
    chain.apply_ops(CAROL, vec![auth_platform_op(CAROL)]);
    assert_eq!(chain.db.get_account_statistics_by_uid(CAROL).unwrap().csaf, 100);
    chain.apply_ops(
        CAROL,
        vec![Operation::ScoreCreate(ScoreCreate {
            fee: Fee::default(),
            from_account_uid: CAROL,
            platform: PLATFORM,
            poster: ALICE,
            post_pid: 1,
            score: 5,
            csaf: 100,
        })],
    );
    assert_eq!(chain.db.get_account_statistics_by_uid(CAROL).unwrap().csaf, 0);

    // a second score by the same account is rejected
    let err = chain
        .push_ops(
            CAROL,
            vec![Operation::ScoreCreate(ScoreCreate {
                fee: Fee::default(),
                from_account_uid: CAROL,
                platform: PLATFORM,
                poster: ALICE,
                post_pid: 1,
                score: -2,
                csaf: 1,
            })],
        )
        .unwrap_err();
    assert!(err.to_string().contains("once"), "got: {err}");
    chain.db.clear_pending();

    let alice_before = chain.balance(ALICE);
    let platform_before = chain.balance(PLATFORM);
    chain.apply_ops(
        EVE,
        vec![Operation::Reward(Reward {
            fee: Fee::default(),
            from_account_uid: EVE,
            platform: PLATFORM,
            poster: ALICE,
            post_pid: 1,
            amount: Amount::core(1_000),
        })],
    );

    assert_eq!(chain.balance(ALICE), alice_before + 700);
    assert_eq!(chain.balance(PLATFORM), platform_before + 300);

    let period = chain.db.dpo().current_active_post_sequence;
    let (_, active) = chain.db.find_active_post(PLATFORM, ALICE, 1, period).unwrap();
    assert_eq!(active.total_csaf, 100);
    assert_eq!(active.total_rewards.get(&0), Some(&1_000));
    assert_eq!(active.scores.len(), 1);

    chain.db.check_invariants().unwrap();
}

#[test]
fn forward_pays_the_origin_receiptors_from_prepaid() {
    let mut chain = TestChain::new();
    chain.produce_blocks(1);
    chain.apply_ops(ALICE, vec![post_op(ALICE, 1)]);

    // fund bob's prepaid and authorize the platform
    let tx = chain.signed_tx(&[ALICE], vec![{
        let mut op = transfer_op(ALICE, BOB, 100, 0);
        if let Operation::Transfer(t) = &mut op {
            t.to_prepaid = true;
        }
        op
    }]);
    chain.produce_block_with(vec![tx]);
    chain.apply_ops(BOB, vec![auth_platform_op(BOB)]);

    let alice_prepaid_before = chain.db.get_account_statistics_by_uid(ALICE).unwrap().prepaid;
    let platform_prepaid_before =
        chain.db.get_account_statistics_by_uid(PLATFORM).unwrap().prepaid;

    chain.apply_ops(
        BOB,
        vec![Operation::Post(Post {
            fee: Fee::default(),
            platform: PLATFORM,
            poster: BOB,
            post_pid: 1,
            post_type: PostType::Forward,
            origin_platform: Some(PLATFORM),
            origin_poster: Some(ALICE),
            origin_post_pid: Some(1),
            hash_value: "ff01".into(),
            title: "fwd".into(),
            body: String::new(),
            extra_data: "{}".into(),
            forward_price: None,
            receiptors: None,
            license_lid: None,
            permission_flags: post_permission::ALL,
        })],
    );

    let bob_stats = chain.db.get_account_statistics_by_uid(BOB).unwrap();
    assert_eq!(bob_stats.prepaid, 90);
    assert_eq!(bob_stats.last_post_sequence, 1);
    assert_eq!(
        chain.db.get_account_statistics_by_uid(ALICE).unwrap().prepaid,
        alice_prepaid_before + 7
    );
    assert_eq!(
        chain.db.get_account_statistics_by_uid(PLATFORM).unwrap().prepaid,
        platform_prepaid_before + 3
    );
    chain.db.check_invariants().unwrap();
}

#[test]
fn buyout_transfers_part_of_a_receiptor_share() {
    let mut chain = TestChain::new();
    chain.produce_blocks(1);
    chain.apply_ops(ALICE, vec![post_op(ALICE, 1)]);

    // alice offers 30% of her 70% for 5_000 prepaid
    chain.apply_ops(
        ALICE,
        vec![Operation::PostUpdate(PostUpdate {
            fee: Fee::default(),
            platform: PLATFORM,
            poster: ALICE,
            post_pid: 1,
            hash_value: None,
            title: None,
            body: None,
            extra_data: None,
            forward_price: None,
            receiptor: Some(ALICE),
            to_buyout: Some(true),
            buyout_ratio: Some(30 * 100),
            buyout_price: Some(5_000),
            buyout_expiration: Some(chain.db.head_block_time() + 3_600),
            license_lid: None,
            permission_flags: None,
        })],
    );

    // alice funds eve's prepaid; eve accepts the offer
    let tx = chain.signed_tx(&[ALICE], vec![{
        let mut op = transfer_op(ALICE, EVE, 10_000, 0);
        if let Operation::Transfer(t) = &mut op {
            t.to_prepaid = true;
        }
        op
    }]);
    chain.produce_block_with(vec![tx]);
    chain.apply_ops(EVE, vec![auth_platform_op(EVE)]);

    let alice_prepaid_before = chain.db.get_account_statistics_by_uid(ALICE).unwrap().prepaid;
    chain.apply_ops(
        EVE,
        vec![Operation::Buyout(Buyout {
            fee: Fee::default(),
            from_account_uid: EVE,
            platform: PLATFORM,
            poster: ALICE,
            post_pid: 1,
            receiptor_account_uid: ALICE,
        })],
    );

    let (_, post) = chain.db.find_post(PLATFORM, ALICE, 1).unwrap();
    assert_eq!(post.receiptors.len(), 3);
    assert_eq!(post.receiptors.get(&ALICE).unwrap().cur_ratio, 40 * 100);
    assert!(!post.receiptors.get(&ALICE).unwrap().to_buyout);
    assert_eq!(post.receiptors.get(&EVE).unwrap().cur_ratio, 30 * 100);
    let ratio_total: u64 =
        post.receiptors.values().map(|r| r.cur_ratio as u64).sum();
    assert_eq!(ratio_total, FULL_PERCENT as u64);
    assert_eq!(
        chain.db.get_account_statistics_by_uid(ALICE).unwrap().prepaid,
        alice_prepaid_before + 5_000
    );
    assert_eq!(chain.db.get_account_statistics_by_uid(EVE).unwrap().prepaid, 5_000);
    chain.db.check_invariants().unwrap();
}

#[test]
fn licenses_are_sequenced_per_platform() {
    let mut chain = TestChain::new();
    chain.produce_blocks(1);

    let license = |lid| {
        Operation::LicenseCreate(LicenseCreate {
            fee: Fee::default(),
            platform: PLATFORM,
            license_lid: lid,
            license_type: 1,
            hash_value: "cc00".into(),
            title: "CC".into(),
            body: "terms".into(),
            extra_data: "{}".into(),
        })
    };
    // skipping the sequence is rejected
    let err = chain.push_ops(PLATFORM, vec![license(2)]).unwrap_err();
    assert!(err.to_string().contains("invalid"), "got: {err}");
    chain.db.clear_pending();

    chain.apply_ops(PLATFORM, vec![license(1)]);
    assert!(chain.db.find_license(PLATFORM, 1).is_some());

    // posts can reference it
    chain.apply_ops(
        ALICE,
        vec![{
            let mut op = post_op(ALICE, 1);
            if let Operation::Post(p) = &mut op {
                p.license_lid = Some(1);
            }
            op
        }],
    );
    let (_, post) = chain.db.find_post(PLATFORM, ALICE, 1).unwrap();
    assert_eq!(post.license_lid, Some(1));
}

#[test]
fn content_awards_settle_the_period_and_draw_the_budget_pool() {
    let mut params = test_parameters();
    params.budget_adjust_interval = 1;
    params.budget_adjust_target = FULL_PERCENT;
    params.by_vote_top_witness_pay_per_block = 0;
    params.content_award.content_award_interval = 30;
    params.content_award.total_content_award_amount = 1_051_200_000;
    params.content_award.total_platform_content_award_amount = 1_051_200_000;
    params.content_award.min_effective_csaf = 10;
    params.content_award.casf_modulus = FULL_PERCENT;
    let mut chain = TestChain::with_parameters(params);

    // two empty award periods pass while the budget pool accrues
    chain.produce_blocks(21);
    assert!(chain.db.dpo().content_award_enabled);
    assert_eq!(chain.db.dpo().current_active_post_sequence, 3);

    chain.apply_ops(ALICE, vec![post_op(ALICE, 1)]);
    chain.apply_ops(
        CAROL,
        vec![
            Operation::CsafCollect(CsafCollect {
                fee: Fee::default(),
                from: CAROL,
                to: CAROL,
                amount: 100,
            }),
            auth_platform_op(CAROL),
            Operation::ScoreCreate(ScoreCreate {
                fee: Fee::default(),
                from_account_uid: CAROL,
                platform: PLATFORM,
                poster: ALICE,
                post_pid: 1,
                score: 5,
                csaf: 100,
            }),
        ],
    );

    while chain.db.head_block_num() < 30 {
        chain.produce_block();
    }
    let pool_before = chain.db.dpo().budget_pool;
    let supply_before = chain.db.core_current_supply();
    let alice_before = chain.balance(ALICE);
    let carol_before = chain.balance(CAROL);
    let platform_before = chain.balance(PLATFORM);
    assert!(pool_before >= 2 * 1_051_200_000);

    // block 31 crosses the award epoch
    chain.produce_block();
    assert_eq!(chain.db.dpo().current_active_post_sequence, 4);

    // the per-period pools are 1_000 each: 800 to receiptors (70/30),
    // 200 to the single scorer, 1_000 to the platform pool
    assert_eq!(chain.balance(ALICE), alice_before + 560);
    assert_eq!(chain.balance(CAROL), carol_before + 200);
    assert_eq!(chain.balance(PLATFORM), platform_before + 1_240);

    // conservation: everything credited came out of the pool
    let minted = chain.db.core_current_supply() - supply_before;
    let pool_after = chain.db.dpo().budget_pool;
    assert_eq!(pool_before + minted - pool_after, 2_000);

    let (_, post) = chain.db.find_post(PLATFORM, ALICE, 1).unwrap();
    assert!(post.score_settlement);
    let (_, active) = chain.db.find_active_post(PLATFORM, ALICE, 1, 3).unwrap();
    assert!(active.positive_win);
    assert_eq!(active.post_award, 1_000);

    chain.db.check_invariants().unwrap();
}
