// Byzantine accountability scenarios: allegations, missed votes, slashing
use super::*;

use crate::evidence::{SuspicionReason, ValidatorStatus, VoteChoice};
use crate::governance::EvidenceOptions;
use crate::txs::stake::Stake;
use crate::txs::TxAmount;

fn staked_validator_payload(vk: &SigningKey, dk: &SigningKey, tokens: u64) -> Stake {
    let set = CurrencySet::standard();
    let olt = set.get(STAKING_CURRENCY).unwrap();
    Stake {
        validator_address: addr_of(vk),
        stake_address: addr_of(dk),
        validator_pubkey: pubkey(vk),
        validator_ecdsa_pubkey: PublicKey::ecdsa(vec![7u8; 33]),
        node_name: "accused".into(),
        amount: TxAmount::new(STAKING_CURRENCY, olt.coin_from_int(tokens).amount),
    }
}

#[test]
fn guilty_verdict_penalizes_with_one_block_delay() {
    let (_dir, mut app) = new_app();
    let (_g0k, g0) = genesis_validator(10, 1);
    let (_g1k, g1) = genesis_validator(11, 1);
    let (_g2k, g2) = genesis_validator(12, 1);
    app.init_chain(&[g0.clone(), g1.clone(), g2.clone()], open_fee_option())
        .unwrap();

    let vk = signing_key(1);
    let dk = signing_key(2);
    let accused = addr_of(&vk);
    let olt = app.currencies().get(STAKING_CURRENCY).unwrap().clone();
    app.balances
        .add_to_address(&addr_of(&dk), &olt.coin_from_int(10))
        .unwrap();

    app.begin_block(&begin_info(1, vec![])).unwrap();
    app.deliver_tx(&signed_tx(
        TxType::Stake,
        &staked_validator_payload(&vk, &dk, 10),
        &[&dk, &vk],
    ))
    .unwrap();
    app.end_block(1).unwrap();
    app.commit().unwrap();

    let all_signed = || {
        vec![
            vote(g0.address, true),
            vote(g1.address, true),
            vote(g2.address, true),
            vote(accused, true),
        ]
    };

    // one yes of required two is exactly the threshold: still open
    app.begin_block(&begin_info(2, all_signed())).unwrap();
    app.evidence
        .perform_allegation(g0.address, accused, "alg-1", 2, "conflicting precommits")
        .unwrap();
    app.evidence
        .vote("alg-1", g1.address, VoteChoice::Yes)
        .unwrap();
    app.end_block(2).unwrap();
    assert!(app.evidence.get_allegation_request("alg-1").is_ok());
    app.commit().unwrap();

    // the second yes crosses it
    app.begin_block(&begin_info(3, all_signed())).unwrap();
    app.evidence
        .vote("alg-1", g2.address, VoteChoice::Yes)
        .unwrap();
    let result = app.end_block(3).unwrap();

    let event = result
        .events
        .iter()
        .find(|e| e.kind == "allegation_tracker")
        .expect("verdict event");
    assert!(event
        .attributes
        .iter()
        .any(|a| a.key == "block.status" && a.value == b"Guilty"));
    assert!(app.evidence.get_allegation_request("alg-1").is_err());

    // 30% of 10 tokens, rounded half up
    let penalty = olt.coin_from_int(3).amount;
    assert_eq!(
        app.delegation.validator_total(&accused).unwrap(),
        olt.coin_from_int(7).amount
    );

    // bounty = penalty * 10^18 * 50%
    let bounty_addr = app.governance.get_proposal_options().unwrap().bounty_program_addr;
    assert_eq!(
        app.balances.get_balance(&bounty_addr, STAKING_CURRENCY).unwrap(),
        penalty.mul_pow10(18).mul_div(50, 100)
    );

    // the validator record is untouched this block; the unstake is postponed
    assert_eq!(
        app.validators.get(&accused).unwrap().staked,
        olt.coin_from_int(10).amount
    );
    let delayed = app.validators.get_delay_unstake(3, &accused).expect("postponed");
    assert_eq!(delayed.amount, penalty);

    let lvh = app.evidence.get_suspicious_validator(&accused).unwrap();
    assert_eq!(lvh.reason, SuspicionReason::ByzantineFault);
    assert!(lvh.is_frozen());
    app.commit().unwrap();

    // next block's setup applies the postponed unstake
    app.begin_block(&begin_info(4, all_signed())).unwrap();
    let v = app.validators.get(&accused).unwrap();
    assert_eq!(v.staked, olt.coin_from_int(7).amount);
    assert_eq!(v.power, 7);
    assert!(app.validators.get_delay_unstake(3, &accused).is_none());
}

#[test]
fn innocent_verdict_closes_without_penalty() {
    let (_dir, mut app) = new_app();
    let validators: Vec<_> = (10u8..14).map(|s| genesis_validator(s, 1)).collect();
    let genesis: Vec<_> = validators.iter().map(|(_, gv)| gv.clone()).collect();
    app.init_chain(&genesis, open_fee_option()).unwrap();

    empty_block(&mut app, 1, vec![]);

    let votes: Vec<_> = genesis.iter().map(|gv| vote(gv.address, true)).collect();
    let accused = genesis[3].address;

    app.begin_block(&begin_info(2, votes)).unwrap();
    app.evidence
        .perform_allegation(genesis[0].address, accused, "alg-1", 2, "suspected fork")
        .unwrap();
    app.evidence
        .vote("alg-1", genesis[1].address, VoteChoice::No)
        .unwrap();
    app.evidence
        .vote("alg-1", genesis[2].address, VoteChoice::No)
        .unwrap();
    let result = app.end_block(2).unwrap();

    let event = result
        .events
        .iter()
        .find(|e| e.kind == "allegation_tracker")
        .expect("verdict event");
    assert!(event
        .attributes
        .iter()
        .any(|a| a.key == "block.status" && a.value == b"Innocent"));

    assert!(app.evidence.get_allegation_request("alg-1").is_err());
    assert!(app.evidence.get_allegation_tracker().unwrap().requests.is_empty());
    assert!(app.validators.get_delay_unstake(2, &accused).is_none());
    assert!(app.evidence.get_suspicious_validator(&accused).is_err());
}

#[test]
fn missed_votes_freeze_a_validator() {
    let (_dir, mut app) = new_app();
    let (_gk, good) = genesis_validator(10, 1);
    let (_sk, suspect) = genesis_validator(11, 1);
    app.init_chain(&[good.clone(), suspect.clone()], open_fee_option())
        .unwrap();

    app.governance
        .set_evidence_options(&EvidenceOptions {
            min_votes_required: 3,
            block_votes_diff: 4,
            ..EvidenceOptions::default()
        })
        .unwrap();
    let active = ValidatorStatus {
        is_active: true,
        height: 0,
    };
    app.evidence.set_validator_status(&good.address, &active).unwrap();
    app.evidence
        .set_validator_status(&suspect.address, &active)
        .unwrap();

    // the suspect only signs blocks 3 and 4
    for height in 1..=5u64 {
        let votes = vec![
            vote(good.address, true),
            vote(suspect.address, height == 3 || height == 4),
        ];
        empty_block(&mut app, height, votes);
    }

    // at height 5 the window holds blocks 2..=5: two signed votes, three
    // required
    assert_eq!(app.validators.malicious_count(), 1);
    let lvh = app.evidence.get_suspicious_validator(&suspect.address).unwrap();
    assert_eq!(lvh.reason, SuspicionReason::MissedRequiredVotes);
    assert!(lvh.is_frozen());
    assert!(app.evidence.get_suspicious_validator(&good.address).is_err());
}

#[test]
fn byzantine_validator_is_slashed_immediately() {
    let (_dir, mut app) = new_app();
    let (_g1k, g1) = genesis_validator(10, 5);
    let (_g2k, g2) = genesis_validator(11, 4);
    app.init_chain(&[g1.clone(), g2.clone()], open_fee_option())
        .unwrap();

    empty_block(&mut app, 1, vec![]);

    let mut info = begin_info(2, vec![vote(g1.address, true), vote(g2.address, true)]);
    info.byzantine = vec![g2.address];
    app.begin_block(&info).unwrap();
    assert_eq!(app.validators.get(&g2.address).unwrap().power, 0);
    app.end_block(2).unwrap();
    app.commit().unwrap();

    // the zero power is reported from committed state and the record removed
    app.begin_block(&begin_info(3, vec![vote(g1.address, true)]))
        .unwrap();
    let result = app.end_block(3).unwrap();
    let slashed = result
        .power_updates
        .iter()
        .find(|u| u.pubkey == g2.pubkey)
        .expect("slashed update");
    assert_eq!(slashed.power, 0);
    app.commit().unwrap();
    assert!(!app.validators.exists(&g2.address));
}

#[test]
fn power_updates_are_capped_per_block() {
    let (_dir, mut app) = new_app();
    let genesis: Vec<_> = (1u8..=70)
        .map(|s| genesis_validator(s, s as i64).1)
        .collect();
    app.init_chain(&genesis, open_fee_option()).unwrap();

    empty_block(&mut app, 1, vec![]);

    app.begin_block(&begin_info(2, vec![])).unwrap();
    assert_eq!(app.validators.queue_len(), 70);
    let result = app.end_block(2).unwrap();
    assert_eq!(
        result.power_updates.len(),
        crate::validator::MAX_POWER_UPDATES
    );
    // highest committed power reports first
    assert_eq!(result.power_updates[0].power, 70);
}
