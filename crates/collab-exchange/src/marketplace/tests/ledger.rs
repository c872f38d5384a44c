use super::common::*;
use crate::marketplace::domain::UserId;
use crate::marketplace::ledger::{EscrowPolicy, HistoryScope, LedgerError, LedgerReason, Operator};
use crate::marketplace::ErrorKind;
use std::sync::Barrier;

#[test]
fn debit_records_balance_after_snapshot() {
    let harness = harness(EscrowPolicy::ClampAtZero);
    let ledger = &harness.engine.ledger;
    let alice = UserId::new("alice");

    let receipt = ledger
        .debit(&alice, 800, LedgerReason::EscrowDebit, Operator::System)
        .expect("debit succeeds");

    assert_eq!(receipt.new_balance, 200);
    assert_eq!(receipt.change_amount, -800);
    assert_eq!(receipt.shortfall, 0);
    assert_eq!(ledger.balance_of(&alice).expect("balance"), 200);

    let history = ledger
        .history(&HistoryScope::Member(alice.clone()), &super::common::alice())
        .expect("own history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].balance_after, 200);
    assert_eq!(history[0].reason, LedgerReason::EscrowDebit);
    assert_eq!(history[0].operator, Operator::System);
}

#[test]
fn clamp_policy_floors_at_zero_and_records_shortfall() {
    let harness = harness(EscrowPolicy::ClampAtZero);
    let carol = UserId::new("carol");

    let receipt = harness
        .engine
        .ledger
        .debit(&carol, 800, LedgerReason::EscrowDebit, Operator::System)
        .expect("clamped debit succeeds");

    assert_eq!(receipt.new_balance, 0);
    assert_eq!(receipt.change_amount, -500);
    assert_eq!(receipt.shortfall, 300);
}

#[test]
fn clamped_debit_on_an_empty_balance_is_still_logged() {
    let harness = harness(EscrowPolicy::ClampAtZero);
    let ledger = &harness.engine.ledger;
    let carol = UserId::new("carol");
    ledger
        .debit(&carol, 500, LedgerReason::EscrowDebit, Operator::System)
        .expect("drain balance");

    let receipt = ledger
        .debit(&carol, 120, LedgerReason::EscrowDebit, Operator::System)
        .expect("clamped debit succeeds");
    assert_eq!(receipt.change_amount, 0);
    assert_eq!(receipt.new_balance, 0);
    assert_eq!(receipt.shortfall, 120);

    let history = ledger
        .history(&HistoryScope::Member(carol), &admin())
        .expect("carol's history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].sequence, 2);
    assert_eq!(history[1].change_amount, 0);
    assert_eq!(history[1].shortfall, 120);
}

#[test]
fn strict_policy_refuses_overdraw_without_writing() {
    let harness = harness(EscrowPolicy::StrictRefusal);
    let carol = UserId::new("carol");

    let error = harness
        .engine
        .ledger
        .debit(&carol, 800, LedgerReason::EscrowDebit, Operator::System)
        .expect_err("strict policy refuses");

    assert_eq!(error.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(harness.engine.ledger.balance_of(&carol).expect("balance"), 500);
    assert!(harness
        .engine
        .ledger
        .history(&HistoryScope::All, &admin())
        .expect("full log")
        .is_empty());
}

#[test]
fn zero_amounts_are_rejected() {
    let harness = harness(EscrowPolicy::ClampAtZero);
    let ledger = &harness.engine.ledger;
    let bob = UserId::new("bob");

    assert!(matches!(
        ledger.debit(&bob, 0, LedgerReason::EscrowDebit, Operator::System),
        Err(LedgerError::ZeroAmount)
    ));
    assert!(matches!(
        ledger.credit(&bob, 0, LedgerReason::SettlementCredit, Operator::System),
        Err(LedgerError::ZeroAmount)
    ));
    assert!(matches!(
        ledger.adjust(&bob, 0, LedgerReason::ManualAdjustment, &admin()),
        Err(LedgerError::ZeroAdjustment)
    ));
}

#[test]
fn adjust_requires_admin_and_never_clamps() {
    let harness = harness(EscrowPolicy::ClampAtZero);
    let ledger = &harness.engine.ledger;
    let bob = UserId::new("bob");

    let forbidden = ledger
        .adjust(&bob, 50, LedgerReason::ManualAdjustment, &alice())
        .expect_err("employees cannot adjust");
    assert_eq!(forbidden.kind(), ErrorKind::Forbidden);

    let overdraw = ledger
        .adjust(&bob, -301, LedgerReason::ManualAdjustment, &admin())
        .expect_err("adjust never clamps");
    assert_eq!(overdraw.kind(), ErrorKind::InsufficientFunds);

    let receipt = ledger
        .adjust(&bob, -300, LedgerReason::ManualAdjustment, &admin())
        .expect("exact adjustment");
    assert_eq!(receipt.new_balance, 0);

    let entries = ledger
        .history(&HistoryScope::Member(bob.clone()), &admin())
        .expect("admin reads any member");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operator, Operator::Admin(UserId::new("admin")));
}

#[test]
fn history_is_scoped_to_the_caller() {
    let harness = harness(EscrowPolicy::ClampAtZero);
    let ledger = &harness.engine.ledger;
    ledger
        .credit(&UserId::new("alice"), 10, LedgerReason::SettlementCredit, Operator::System)
        .expect("credit alice");
    ledger
        .credit(&UserId::new("bob"), 20, LedgerReason::SettlementCredit, Operator::System)
        .expect("credit bob");

    let own = ledger
        .history(&HistoryScope::All, &alice())
        .expect("non-admin all falls back to own");
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].user_id, UserId::new("alice"));

    let denied = ledger
        .history(&HistoryScope::Member(UserId::new("bob")), &alice())
        .expect_err("cannot read another member");
    assert_eq!(denied.kind(), ErrorKind::Forbidden);

    let everything = ledger
        .history(&HistoryScope::All, &admin())
        .expect("admin reads the full log");
    assert_eq!(everything.len(), 2);
}

#[test]
fn balance_reads_are_idempotent_and_unknown_members_are_not_found() {
    let harness = harness(EscrowPolicy::ClampAtZero);
    let ledger = &harness.engine.ledger;
    let alice = UserId::new("alice");

    assert_eq!(ledger.balance_of(&alice).expect("opening"), 1_000);
    assert_eq!(ledger.balance_of(&alice).expect("opening again"), 1_000);

    let missing = ledger
        .balance_of(&UserId::new("nobody"))
        .expect_err("unknown member");
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[test]
fn cached_member_points_follow_the_log() {
    let harness = harness(EscrowPolicy::ClampAtZero);
    let alice = UserId::new("alice");
    harness
        .engine
        .ledger
        .debit(&alice, 250, LedgerReason::EscrowDebit, Operator::System)
        .expect("debit");

    let member = harness
        .engine
        .members
        .fetch(&alice)
        .expect("fetch")
        .expect("present");
    assert_eq!(member.points, 750);
    assert_eq!(member.opening_points, 1_000);
}

#[test]
fn concurrent_debits_on_one_member_serialize() {
    let harness = harness(EscrowPolicy::ClampAtZero);
    let ledger = &harness.engine.ledger;
    let alice = UserId::new("alice");
    let barrier = Barrier::new(8);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                barrier.wait();
                ledger
                    .debit(&alice, 300, LedgerReason::EscrowDebit, Operator::System)
                    .expect("clamped debit never fails");
            });
        }
    });

    let entries = ledger
        .history(&HistoryScope::Member(alice.clone()), &admin())
        .expect("history");
    assert_eq!(entries.len(), 8);
    let sequences: Vec<u64> = entries.iter().map(|entry| entry.sequence).collect();
    assert_eq!(sequences, (1..=8).collect::<Vec<u64>>());
    let withheld: i64 = entries.iter().map(|entry| entry.change_amount).sum();
    assert_eq!(withheld, -1_000);
    assert_eq!(ledger.balance_of(&alice).expect("balance"), 0);
}
