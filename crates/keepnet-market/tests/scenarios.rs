mod common;

use common::*;
use keepnet_market::{
    CapacityDelta, ErrorKind, FieldElement, MarketConfig, MarketError, ProverRole, RawPublicKey,
    RoundStatus, TokenAmount,
};

const RATE: u128 = 1024 * PRICE;

#[test]
fn test_order_fills_with_distinct_providers() {
    let f = MarketFixture::new();
    f.stake(1, 2048);
    f.stake(2, 2048);
    let order_id = f.place(0x10, 1024, 4, 2);

    let order = f.market.order(order_id).unwrap();
    assert_eq!(order.escrow, units(1024 * 4 * PRICE * 2));
    assert_eq!(order.start_period, 100);

    f.market.execute_order(order_id, addr(1)).unwrap();
    let err = f.market.execute_order(order_id, addr(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StatePrecondition);
    assert!(err.to_string().contains("already holds a replica"));

    f.market.execute_order(order_id, addr(2)).unwrap();
    assert_eq!(f.market.order(order_id).unwrap().filled_replicas, 2);
    assert_eq!(f.market.node(&addr(1)).unwrap().used, 1024);
    assert!(f.market.is_valid_node(&addr(1)));
    assert!(f.market.has_capacity(&addr(1), 1024));
    assert!(!f.market.has_capacity(&addr(1), 1025));
    assert!(!f.market.is_valid_node(&addr(9)));
    assert_eq!(f.market.providers_of(order_id), vec![addr(1), addr(2)]);
    assert_eq!(f.market.challengeable_orders(), vec![order_id]);

    f.stake(3, 2048);
    let err = f.market.execute_order(order_id, addr(3)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StatePrecondition);

    assert_eq!(f.events_of("OrderFilled").len(), 2);
    f.assert_conserved();
}

#[test]
fn test_execute_requires_capacity_and_stake() {
    let f = MarketFixture::new();
    let order_id = f.place(0x10, 1024, 4, 2);

    let err = f.market.execute_order(order_id, addr(1)).unwrap_err();
    assert!(matches!(err, MarketError::NodeNotFound(_)));

    f.stake(1, 512);
    let err = f.market.execute_order(order_id, addr(1)).unwrap_err();
    assert!(matches!(err, MarketError::InsufficientCapacity { requested: 1024, available: 512, .. }));
    assert_eq!(err.kind(), ErrorKind::Economic);
}

#[test]
fn test_overpayment_is_queued_for_withdrawal() {
    let f = MarketFixture::new();
    let request = request(1024, 4, 1);
    let cost = request.total_cost().unwrap();
    let extra = units(777);

    f.market
        .place_order(addr(0x10), request.clone(), cost.saturating_add(extra))
        .unwrap();
    // Parked for the owner, never pushed.
    assert!(f.book.balance(&addr(0x10)).is_zero());
    assert_eq!(f.market.refund_owed(&addr(0x10)), extra);
    assert_eq!(f.events_of("RefundQueued").len(), 1);
    f.assert_conserved();

    assert_eq!(f.market.withdraw_refund(addr(0x10)).unwrap(), extra);
    assert_eq!(f.book.balance(&addr(0x10)), extra);

    let short = cost.saturating_sub(units(1));
    let err = f.market.place_order(addr(0x10), request, short).unwrap_err();
    assert!(matches!(err, MarketError::InsufficientPayment { .. }));
    f.assert_conserved();
}

#[test]
fn test_one_period_accrues_one_rate_and_claims_once() {
    let f = MarketFixture::new();
    f.stake(1, 2048);
    f.stake(2, 2048);
    let order_id = f.place(0x10, 1024, 4, 2);
    f.market.execute_order(order_id, addr(1)).unwrap();
    f.market.execute_order(order_id, addr(2)).unwrap();

    f.advance_periods(1);
    let period = f.market.current_period();
    assert_eq!(period, 101);
    for provider in [addr(1), addr(2)] {
        assert_eq!(
            f.market.accrued_up_to(order_id, &provider, period).unwrap(),
            units(RATE)
        );
    }

    let claimed = f.market.claim_rewards(addr(1)).unwrap();
    assert_eq!(claimed, units(RATE));
    assert_eq!(f.book.balance(&addr(1)), units(RATE));
    assert!(f.market.accrued_up_to(order_id, &addr(1), period).unwrap().is_zero());
    assert_eq!(f.market.lifetime_earned(&addr(1)), units(RATE));

    let err = f.market.claim_rewards(addr(1)).unwrap_err();
    assert!(matches!(err, MarketError::NothingToClaim(_)));

    let order = f.market.order(order_id).unwrap();
    assert_eq!(order.escrow_withdrawn, units(RATE));
    f.assert_conserved();
}

#[test]
fn test_accrual_stops_at_order_end() {
    let f = MarketFixture::new();
    f.stake(1, 2048);
    let order_id = f.place(0x10, 1024, 2, 1);
    f.market.execute_order(order_id, addr(1)).unwrap();

    f.advance_periods(5);
    assert_eq!(
        f.market.accrued_up_to(order_id, &addr(1), 105).unwrap(),
        units(2 * RATE)
    );
    let err = f.market.execute_order(order_id, addr(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StatePrecondition);
}

#[test]
fn test_cancel_splits_penalty_and_refunds_owner() {
    let f = MarketFixture::new();
    f.stake(1, 2048);
    let owner = addr(0x10);
    let order_id = f.place(0x10, 1024, 4, 2);
    f.market.execute_order(order_id, addr(1)).unwrap();

    let err = f.market.cancel_order(order_id, addr(0x11)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let remaining = f.market.order(order_id).unwrap().remaining_escrow();
    let penalty = units(remaining.to_base_units() / 10);

    let receipt = f.market.cancel_order(order_id, owner).unwrap();
    assert_eq!(receipt.providers_released, 1);
    assert_eq!(receipt.penalty, penalty);
    assert_eq!(receipt.refunded, remaining.saturating_sub(penalty));

    assert_eq!(f.market.pending_rewards(&addr(1)), penalty);
    assert_eq!(f.market.refund_owed(&owner), remaining.saturating_sub(penalty));
    assert!(f.market.order(order_id).is_none());
    assert!(f.market.orders_of(&addr(1)).is_empty());
    assert_eq!(f.market.node(&addr(1)).unwrap().used, 0);
    f.assert_conserved();

    let withdrawn = f.market.withdraw_refund(owner).unwrap();
    assert_eq!(withdrawn, remaining.saturating_sub(penalty));
    assert_eq!(f.book.balance(&owner), withdrawn);
    assert!(f.market.refund_owed(&owner).is_zero());
    f.assert_conserved();
}

#[test]
fn test_cancel_without_providers_refunds_everything() {
    let f = MarketFixture::new();
    let order_id = f.place(0x10, 1024, 4, 1);
    let escrow = f.market.order(order_id).unwrap().escrow;

    let receipt = f.market.cancel_order(order_id, addr(0x10)).unwrap();
    assert!(receipt.penalty.is_zero());
    assert_eq!(f.market.refund_owed(&addr(0x10)), escrow);
}

#[test]
fn test_heartbeat_auto_slashes_silent_primary() {
    let f = MarketFixture::new();
    f.stake(1, 2048);
    f.stake(2, 2048);
    let order_id = f.place(0x10, 1024, 4, 2);
    f.market.execute_order(order_id, addr(1)).unwrap();
    f.market.execute_order(order_id, addr(2)).unwrap();

    let keeper = addr(0x50);
    let report = f.market.trigger_heartbeat(keeper).unwrap();
    assert_eq!(report.round_id, 1);
    assert_eq!(report.challenged_orders, 1);
    assert_eq!(f.market.round_status(), RoundStatus::ChallengeActive);

    let round = f.market.current_round().unwrap();
    let primary = round.primary.clone().unwrap();
    assert_eq!(primary.provider, addr(1));
    assert_eq!(primary.role, ProverRole::Primary);
    let stake_before = f.market.node(&addr(1)).unwrap().stake;

    let err = f.market.trigger_heartbeat(keeper).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StatePrecondition);

    f.close_window();
    let slashed = units(4 * RATE);
    let reward = slashed.mul_bps(1_000);

    let report = f.market.trigger_heartbeat(keeper).unwrap();
    assert_eq!(report.round_id, 2);
    assert_eq!(report.failures_slashed, 1);
    assert_eq!(report.total_slashed, slashed);
    assert_eq!(report.reporter_reward, reward);

    assert_eq!(f.market.reporter_balance(&keeper), reward);
    let node = f.market.node(&addr(1)).unwrap();
    assert_eq!(node.stake, stake_before.saturating_sub(slashed));
    assert_eq!(node.used, 1024);
    assert_eq!(f.events_of("ProverFailed").len(), 1);
    f.assert_conserved();

    assert_eq!(f.market.claim_reporter_reward(keeper).unwrap(), reward);
    assert_eq!(f.book.balance(&keeper), reward);
    assert!(f.market.claim_reporter_reward(keeper).is_err());
    f.assert_conserved();
}

#[test]
fn test_primary_proof_rotates_round_immediately() {
    let f = MarketFixture::new();
    f.stake(1, 2048);
    let order_id = f.place(0x10, 1024, 4, 1);
    f.market.execute_order(order_id, addr(1)).unwrap();
    f.market.trigger_heartbeat(addr(0x50)).unwrap();
    let round = f.market.current_round().unwrap();

    let commitment = FieldElement::from_u64(42);
    let receipt = f.market.submit_proof(addr(1), proof(), commitment).unwrap();
    assert!(receipt.primary);
    assert_eq!(receipt.round_id, 1);
    assert_eq!(receipt.order_id, order_id);
    assert_eq!(receipt.next_round, Some(2));

    let inputs = f.verifier.last_inputs().unwrap();
    assert_eq!(inputs.randomness, round.randomness);
    assert_eq!(inputs.file_root, FieldElement::from_u64(0xF11E));
    assert_eq!(inputs.commitment, commitment);
    assert_eq!(inputs.key_x, FieldElement::from_u64(1));

    let next = f.market.current_round().unwrap();
    assert_eq!(next.round_id, 2);
    assert_ne!(next.randomness, round.randomness);
    assert!(f.market.lingering_rounds().is_empty());
    assert_eq!(f.events_of("ProofSubmitted").len(), 1);
    assert_eq!(f.events_of("ChallengeIssued").len(), 2);
}

#[test]
fn test_rejected_or_late_proofs_change_nothing() {
    let f = MarketFixture::new();
    f.stake(1, 2048);
    let order_id = f.place(0x10, 1024, 4, 1);
    f.market.execute_order(order_id, addr(1)).unwrap();
    f.market.trigger_heartbeat(addr(0x50)).unwrap();

    f.verifier.reject_all(true);
    let err = f
        .market
        .submit_proof(addr(1), proof(), FieldElement::from_u64(7))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OracleRejection);
    assert_eq!(f.market.rounds_issued(), 1);
    assert!(!f.market.current_round().unwrap().primary.unwrap().submitted);

    let err = f
        .market
        .submit_proof(addr(2), proof(), FieldElement::from_u64(7))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    f.verifier.reject_all(false);
    f.close_window();
    let calls = f.verifier.calls();
    let err = f
        .market
        .submit_proof(addr(1), proof(), FieldElement::from_u64(7))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StatePrecondition);
    assert_eq!(f.verifier.calls(), calls);
    assert_eq!(f.market.round_status(), RoundStatus::ExpiredUnresolved);
}

#[test]
fn test_manual_failure_reports_are_processed_once() {
    let f = MarketFixture::new();
    f.stake(1, 2048);
    let order_id = f.place(0x10, 1024, 4, 1);
    f.market.execute_order(order_id, addr(1)).unwrap();
    f.market.trigger_heartbeat(addr(0x50)).unwrap();

    let err = f.market.report_primary_failure(addr(0x60)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StatePrecondition);

    f.close_window();
    let report = f.market.report_primary_failure(addr(0x60)).unwrap();
    assert_eq!(report.provers_slashed, 1);
    assert_eq!(report.total_slashed, units(4 * RATE));
    assert!(f.market.report_primary_failure(addr(0x60)).is_err());
    assert!(f.market.slash_secondary_failures(addr(0x60)).is_err());

    // The heartbeat finds nothing left to slash in the old round.
    let heartbeat = f.market.trigger_heartbeat(addr(0x50)).unwrap();
    assert_eq!(heartbeat.failures_slashed, 0);
    assert!(f.market.reporter_balance(&addr(0x50)).is_zero());
    f.assert_conserved();
}

#[test]
fn test_heartbeat_completes_expired_orders() {
    let f = MarketFixture::new();
    f.stake(1, 2048);
    let owner = addr(0x10);
    let order_id = f.place(0x10, 1024, 2, 2);
    f.market.execute_order(order_id, addr(1)).unwrap();
    let escrow = f.market.order(order_id).unwrap().escrow;

    let err = f.market.complete_expired_order(order_id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StatePrecondition);

    f.advance_periods(2);
    let report = f.market.trigger_heartbeat(addr(0x50)).unwrap();
    assert_eq!(report.orders_completed, 1);
    assert!(f.market.order(order_id).is_none());
    assert_eq!(f.market.pending_rewards(&addr(1)), units(2 * RATE));
    assert_eq!(f.market.refund_owed(&owner), escrow.saturating_sub(units(2 * RATE)));
    assert_eq!(f.market.node(&addr(1)).unwrap().used, 0);
    assert_eq!(report.provers, 0);
    f.assert_conserved();
}

#[test]
fn test_anyone_can_complete_an_expired_order() {
    let f = MarketFixture::new();
    f.stake(1, 2048);
    let order_id = f.place(0x10, 1024, 1, 1);
    f.market.execute_order(order_id, addr(1)).unwrap();

    f.advance_periods(1);
    let refunded = f.market.complete_expired_order(order_id).unwrap();
    assert!(refunded.is_zero());
    assert_eq!(f.market.claim_rewards(addr(1)).unwrap(), units(RATE));
    assert!(f.market.complete_expired_order(order_id).is_err());
    f.assert_conserved();
}

#[test]
fn test_quit_slashes_capped_periods() {
    let f = MarketFixture::new();
    f.stake(1, 2048);
    let order_id = f.place(0x10, 1024, 4, 1);
    f.market.execute_order(order_id, addr(1)).unwrap();
    let stake_before = f.market.node(&addr(1)).unwrap().stake;

    f.advance_periods(1);
    let outcome = f.market.quit_order(order_id, addr(1)).unwrap();
    assert!(!outcome.forced_exit);
    assert_eq!(outcome.total_slashed, units(3 * RATE));

    let node = f.market.node(&addr(1)).unwrap();
    assert_eq!(node.stake, stake_before.saturating_sub(units(3 * RATE)));
    assert_eq!(node.used, 0);
    assert_eq!(f.market.pending_rewards(&addr(1)), units(RATE));
    assert_eq!(f.market.order(order_id).unwrap().filled_replicas, 0);
    assert_eq!(f.events_of("ReplicaReleased").len(), 1);
    assert!(f.market.quit_order(order_id, addr(1)).is_err());
    f.assert_node_invariants(&addr(1));
    f.assert_conserved();
}

#[test]
fn test_quit_near_the_end_slashes_remaining_periods_only() {
    let f = MarketFixture::new();
    f.stake(1, 2048);
    let order_id = f.place(0x10, 1024, 4, 1);
    f.market.execute_order(order_id, addr(1)).unwrap();

    f.advance_periods(3);
    let outcome = f.market.quit_order(order_id, addr(1)).unwrap();
    assert_eq!(outcome.total_slashed, units(RATE));
    f.assert_conserved();
}

#[test]
fn test_authority_slash_forces_exit_and_cascades() {
    let f = MarketFixture::new();
    let authority = addr(0xA1);
    f.market.set_authority(f.owner, Some(authority)).unwrap();

    f.stake(1, 2048);
    let first = f.place(0x10, 1024, 4, 2);
    let second = f.place(0x11, 1024, 4, 2);
    f.market.execute_order(first, addr(1)).unwrap();
    f.market.execute_order(second, addr(1)).unwrap();
    f.advance_periods(1);

    let one_byte = f.stake_for(1);
    let err = f.market.authority_slash(addr(0x99), addr(1), one_byte).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let outcome = f.market.authority_slash(authority, addr(1), one_byte).unwrap();
    assert!(outcome.forced_exit);
    let penalty = f.stake_for(2047).mul_bps(5_000);
    assert_eq!(outcome.total_slashed, one_byte.saturating_add(penalty));

    assert!(f.market.orders_of(&addr(1)).is_empty());
    assert!(f.market.providers_of(first).is_empty());
    assert_eq!(f.market.order(first).unwrap().filled_replicas, 0);
    assert_eq!(f.market.node(&addr(1)).unwrap().used, 0);
    assert_eq!(f.market.pending_rewards(&addr(1)), units(2 * RATE));
    assert_eq!(f.events_of("OrderUnderReplicated").len(), 2);
    assert_eq!(f.events_of("NodeForcedExit").len(), 1);
    assert!(f.market.reporter_balance(&authority).is_zero());
    f.assert_node_invariants(&addr(1));
    f.assert_conserved();
}

#[test]
fn test_slash_to_zero_closes_account() {
    let f = MarketFixture::new();
    f.market.set_authority(f.owner, Some(addr(0xA1))).unwrap();
    let node = f.stake(1, 1024);
    let order_id = f.place(0x10, 1024, 4, 1);
    f.market.execute_order(order_id, addr(1)).unwrap();

    let outcome = f.market.authority_slash(addr(0xA1), addr(1), node.stake).unwrap();
    assert!(outcome.account_closed);
    assert!(f.market.node(&addr(1)).is_none());
    assert!(f.market.orders_of(&addr(1)).is_empty());
    assert!(f.market.challengeable_orders().is_empty());
    assert_eq!(f.market.ledger_stats().nodes, 0);
    f.assert_conserved();
}

#[test]
fn test_capacity_adjustments_and_unstake() {
    let f = MarketFixture::new();
    f.stake(1, 1024);

    let err = f
        .market
        .adjust_capacity(addr(1), CapacityDelta::Grow(1024), units(1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Economic);
    let change = f
        .market
        .adjust_capacity(addr(1), CapacityDelta::Grow(1024), f.stake_for(1024))
        .unwrap();
    assert_eq!(change.capacity, 2048);

    let order_id = f.place(0x10, 1024, 4, 1);
    f.market.execute_order(order_id, addr(1)).unwrap();

    let err = f
        .market
        .adjust_capacity(addr(1), CapacityDelta::Shrink(2048), TokenAmount::ZERO)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Economic);
    let change = f
        .market
        .adjust_capacity(addr(1), CapacityDelta::Shrink(1024), TokenAmount::ZERO)
        .unwrap();
    assert_eq!(change.released, f.stake_for(1024));
    assert_eq!(f.book.balance(&addr(1)), f.stake_for(1024));

    assert_eq!(f.market.unstake(addr(1)).unwrap_err().kind(), ErrorKind::StatePrecondition);
    f.market.cancel_order(order_id, addr(0x10)).unwrap();
    let returned = f.market.unstake(addr(1)).unwrap();
    assert_eq!(returned, f.stake_for(1024));
    assert!(f.market.node(&addr(1)).is_none());
    assert_eq!(f.events_of("NodeUnstaked").len(), 1);
    f.assert_conserved();
}

#[test]
fn test_stake_validation() {
    let f = MarketFixture::new();
    let err = f.market.stake(addr(1), 0, key(1), TokenAmount::ZERO).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = f.market.stake(addr(1), 1024, key(1), f.stake_for(1023)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Economic);

    let zero_key = RawPublicKey::new([0; 32], key(1).y);
    let err = f
        .market
        .stake(addr(1), 1024, zero_key, f.stake_for(1024))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    f.stake(1, 1024);
    let err = f.market.stake(addr(1), 1024, key(1), f.stake_for(1024)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StatePrecondition);
    assert_eq!(f.market.ledger_stats().nodes, 1);
}

#[test]
fn test_admin_operations_are_owner_only() {
    let f = MarketFixture::new();
    let stranger = addr(0x77);

    assert_eq!(
        f.market.set_reporter_bps(stranger, 100).unwrap_err().kind(),
        ErrorKind::Authorization
    );
    assert_eq!(
        f.market.set_reporter_bps(f.owner, 5_001).unwrap_err().kind(),
        ErrorKind::Validation
    );
    f.market.set_reporter_bps(f.owner, 2_500).unwrap();
    assert_eq!(f.market.reporter_bps(), 2_500);

    f.market.transfer_ownership(f.owner, stranger).unwrap();
    assert_eq!(f.market.owner(), stranger);
    assert!(f.market.set_authority(f.owner, Some(addr(1))).is_err());
    f.market.set_authority(stranger, Some(addr(1))).unwrap();
    assert_eq!(f.market.authority(), Some(addr(1)));

    assert_eq!(f.events_of("OwnershipTransferred").len(), 1);
    assert_eq!(f.events_of("ReporterBpsChanged").len(), 1);
}

#[test]
fn test_subscribers_see_every_event() {
    let f = MarketFixture::new();
    let mut events = f.market.subscribe();
    f.stake(1, 1024);
    f.place(0x10, 1024, 1, 1);

    let first = events.try_recv().unwrap();
    assert_eq!(first.event.event_type(), "NodeStaked");
    let second = events.try_recv().unwrap();
    assert_eq!(second.event.event_type(), "OrderPlaced");
    assert_eq!(second.sequence, first.sequence + 1);
    assert_eq!(second.timestamp, GENESIS);
}

#[test]
fn test_cancel_penalty_is_shared_and_dust_goes_to_owner() {
    let f = MarketFixture::new();
    let owner = addr(0x10);
    for provider in 1..=3 {
        f.stake(provider, 2048);
    }
    let order_id = f.place(0x10, 1000, 1, 4);
    for provider in 1..=3 {
        f.market.execute_order(order_id, addr(provider)).unwrap();
    }

    let remaining = f.market.order(order_id).unwrap().remaining_escrow();
    assert_eq!(remaining, units(4_000 * PRICE));
    // 10% of the escrow does not divide by three.
    let share = units(400 * PRICE / 3);

    let receipt = f.market.cancel_order(order_id, owner).unwrap();
    assert_eq!(receipt.providers_released, 3);
    assert_eq!(receipt.penalty, units(3 * (400 * PRICE / 3)));
    assert_eq!(receipt.refunded.saturating_add(receipt.penalty), remaining);
    assert_eq!(receipt.refunded, units(3_600 * PRICE + 1));

    for provider in 1..=3 {
        assert_eq!(f.market.pending_rewards(&addr(provider)), share);
        assert_eq!(f.market.node(&addr(provider)).unwrap().used, 0);
    }
    assert_eq!(f.market.refund_owed(&owner), receipt.refunded);
    f.assert_conserved();
}

/// Four single-replica orders on four providers: one primary, three secondaries.
fn four_way_market() -> MarketFixture {
    let f = MarketFixture::new();
    for provider in 1..=4 {
        f.stake(provider, 2048);
        let order_id = f.place(0x10 + provider, 1024, 4, 1);
        f.market.execute_order(order_id, addr(provider)).unwrap();
    }
    f
}

#[test]
fn test_secondary_failures_slash_one_period_each() {
    let f = four_way_market();
    let keeper = addr(0x50);
    let report = f.market.trigger_heartbeat(keeper).unwrap();
    assert_eq!(report.challenged_orders, 4);

    let round = f.market.current_round().unwrap();
    let primary = round.primary.clone().unwrap().provider;
    assert_eq!(round.secondaries.len(), 3);
    let prover = round.secondaries[0].provider;
    let silent: Vec<_> = round.secondaries[1..].iter().map(|duty| duty.provider).collect();

    let receipt = f.market.submit_proof(prover, proof(), FieldElement::from_u64(3)).unwrap();
    assert!(!receipt.primary);
    assert_eq!(receipt.next_round, None);
    assert_eq!(f.market.rounds_issued(), 1);
    assert!(f.market.submit_proof(prover, proof(), FieldElement::from_u64(3)).is_err());

    assert_eq!(
        f.market.slash_secondary_failures(keeper).unwrap_err().kind(),
        ErrorKind::StatePrecondition
    );

    f.close_window();
    let stakes: Vec<_> = silent.iter().map(|p| f.market.node(p).unwrap().stake).collect();
    let report = f.market.slash_secondary_failures(keeper).unwrap();
    assert_eq!(report.provers_slashed, 2);
    assert_eq!(report.total_slashed, units(2 * RATE));
    assert_eq!(report.reporter_reward, units(2 * RATE / 10));
    assert_eq!(f.market.reporter_balance(&keeper), units(2 * RATE / 10));
    for (provider, before) in silent.iter().zip(stakes) {
        assert_eq!(f.market.node(provider).unwrap().stake, before.saturating_sub(units(RATE)));
    }
    assert_eq!(f.market.node(&prover).unwrap().stake, f.stake_for(2048));
    assert!(f.market.slash_secondary_failures(keeper).is_err());

    let report = f.market.report_primary_failure(keeper).unwrap();
    assert_eq!(report.total_slashed, units(4 * RATE));
    assert_eq!(
        f.market.node(&primary).unwrap().stake,
        f.stake_for(2048).saturating_sub(units(4 * RATE))
    );
    assert_eq!(f.events_of("ProverFailed").len(), 3);
    f.assert_conserved();
}

#[test]
fn test_lingering_round_is_resolved_by_heartbeat() {
    let f = four_way_market();
    let keeper = addr(0x50);
    f.market.trigger_heartbeat(keeper).unwrap();
    let first = f.market.current_round().unwrap();
    let primary = first.primary.clone().unwrap().provider;

    let receipt = f.market.submit_proof(primary, proof(), FieldElement::from_u64(8)).unwrap();
    assert_eq!(receipt.next_round, Some(2));

    let lingering = f.market.lingering_rounds();
    assert_eq!(lingering.len(), 1);
    assert_eq!(lingering[0].round_id, 1);

    // Every secondary is still busy in round 1, so only the primary is drawn again.
    let second = f.market.current_round().unwrap();
    assert_eq!(second.primary.clone().unwrap().provider, primary);
    assert!(second.secondaries.is_empty());

    f.close_window();
    let report = f.market.trigger_heartbeat(keeper).unwrap();
    assert_eq!(report.round_id, 3);
    assert_eq!(report.failures_slashed, 4);
    assert_eq!(report.total_slashed, units(7 * RATE));
    assert_eq!(report.reporter_reward, units(7 * RATE / 10));
    assert!(f.market.lingering_rounds().is_empty());
    for duty in &first.secondaries {
        assert_eq!(
            f.market.node(&duty.provider).unwrap().stake,
            f.stake_for(2048).saturating_sub(units(RATE))
        );
    }
    f.assert_conserved();
}

#[test]
fn test_failure_slash_can_force_an_exit() {
    let f = MarketFixture::new();
    let keeper = addr(0x50);
    f.stake(1, 1024);
    let order_id = f.place(0x10, 1024, 4, 2);
    f.market.execute_order(order_id, addr(1)).unwrap();

    f.market.trigger_heartbeat(keeper).unwrap();
    f.close_window();
    let report = f.market.trigger_heartbeat(keeper).unwrap();

    // 4 periods slashed, then half of what is left.
    let after_slash = f.stake_for(1024).saturating_sub(units(4 * RATE));
    let penalty = after_slash.mul_bps(5_000);
    assert_eq!(report.failures_slashed, 1);
    assert_eq!(report.total_slashed, units(4 * RATE).saturating_add(penalty));
    assert_eq!(report.reporter_reward, report.total_slashed.mul_bps(1_000));

    let node = f.market.node(&addr(1)).unwrap();
    assert_eq!(node.stake, after_slash.saturating_sub(penalty));
    assert_eq!(node.used, 0);
    assert!(f.market.orders_of(&addr(1)).is_empty());
    assert_eq!(f.market.order(order_id).unwrap().filled_replicas, 0);
    assert_eq!(f.events_of("NodeForcedExit").len(), 1);
    assert_eq!(f.events_of("OrderUnderReplicated").len(), 1);
    f.assert_node_invariants(&addr(1));
    f.assert_conserved();
}

#[test]
fn test_expired_orders_awaiting_cleanup_are_not_challenged() {
    let f = MarketFixture::with_config(MarketConfig {
        cleanup_scan_limit: 1,
        max_cleanup_per_heartbeat: 1,
        ..config()
    });
    for provider in 1..=3 {
        f.stake(provider, 2048);
    }
    let first = f.place(0x10, 1024, 1, 1);
    let second = f.place(0x11, 1024, 1, 1);
    let live = f.place(0x12, 1024, 4, 1);
    f.market.execute_order(first, addr(1)).unwrap();
    f.market.execute_order(second, addr(2)).unwrap();
    f.market.execute_order(live, addr(3)).unwrap();

    f.advance_periods(1);
    let report = f.market.trigger_heartbeat(addr(0x50)).unwrap();
    assert_eq!(report.orders_completed, 1);
    assert!(f.market.order(second).is_some());

    let round = f.market.current_round().unwrap();
    assert_eq!(round.challenged_orders, vec![live]);
    assert_eq!(round.primary.unwrap().provider, addr(3));
    assert!(round.secondaries.is_empty());
}

#[test]
fn test_missed_proof_on_an_order_that_ran_out_is_void() {
    let f = MarketFixture::new();
    f.stake(1, 2048);
    let order_id = f.place(0x10, 1024, 1, 1);
    f.market.execute_order(order_id, addr(1)).unwrap();
    f.market.trigger_heartbeat(addr(0x50)).unwrap();
    assert_eq!(
        f.market.current_round().unwrap().primary.unwrap().order_id,
        order_id
    );

    f.advance_periods(1);
    let report = f.market.trigger_heartbeat(addr(0x50)).unwrap();
    assert_eq!(report.failures_slashed, 0);
    assert!(report.total_slashed.is_zero());
    assert_eq!(report.orders_completed, 1);
    assert_eq!(f.market.node(&addr(1)).unwrap().stake, f.stake_for(2048));
    assert!(f.events_of("ProverFailed").is_empty());
    assert!(f.market.current_round().unwrap().primary.is_none());
    f.assert_conserved();
}
