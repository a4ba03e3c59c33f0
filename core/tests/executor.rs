//! Integration tests for the transaction executor.
//!
//! Tests verify:
//! 1. Approved transfers move money and write one EXECUTED entry
//! 2. Rejections leave balances untouched and write REJECTED
//! 3. A transfer whose credit leg fails is reversed and audited as FAILED,
//!    insurance cover drawn by the debit included
//! 4. History only holds executed transactions

use ledger_core::{
    account::Account,
    approval::{ApprovalChain, ApprovalDecision, ApprovalStage},
    clock::ManualClock,
    AuditLog, Ledger, LedgerConfig, Transaction, TransactionExecutor,
};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn build() -> Ledger {
    let _ = env_logger::builder().is_test(true).try_init();
    Ledger::with_clock(LedgerConfig::default(), Arc::new(ManualClock::starting_now()))
}

fn open_pair(ledger: &Ledger) -> (Arc<Account>, Arc<Account>) {
    let a = Arc::new(Account::savings("acc-a", "Alice", dec!(1000)));
    let b = Arc::new(Account::savings("acc-b", "Bob", dec!(0)));
    ledger.accounts().insert(Arc::clone(&a)).expect("insert a");
    ledger.accounts().insert(Arc::clone(&b)).expect("insert b");
    (a, b)
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: happy paths
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn auto_approved_transfer_moves_money() {
    let ledger = build();
    let (a, b) = open_pair(&ledger);

    assert!(ledger.process(&Transaction::transfer(&a, &b, dec!(300))));
    assert_eq!(a.balance(), dec!(700));
    assert_eq!(b.balance(), dec!(300));
    assert_eq!(ledger.audit_log().count_action("EXECUTED"), 1);
    assert_eq!(ledger.audit_log().entries_count(), 1);
}

#[test]
fn manager_tier_approves_what_auto_declines() {
    let ledger = build();
    let a = Arc::new(Account::savings("acc-a", "Alice", dec!(5000)));
    let b = Arc::new(Account::savings("acc-b", "Bob", dec!(0)));

    assert!(ledger.process(&Transaction::transfer(&a, &b, dec!(1500))));
    assert_eq!(a.balance(), dec!(3500));
    assert_eq!(b.balance(), dec!(1500));
}

#[test]
fn deposit_and_withdraw_touch_one_side() {
    let ledger = build();
    let (a, _) = open_pair(&ledger);

    assert!(ledger.process(&Transaction::deposit(&a, dec!(50))));
    assert!(ledger.process(&Transaction::withdraw(&a, dec!(20))));
    assert_eq!(a.balance(), dec!(1030));

    let entries = ledger.audit_log().entries();
    assert_eq!(entries[0].source_id, None);
    assert_eq!(entries[0].destination_id.as_deref(), Some("acc-a"));
    assert!(entries[0].to_string().contains("external -> acc-a"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: rejections
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn frozen_withdraw_is_rejected_without_touching_balance() {
    let ledger = build();
    let (a, _) = open_pair(&ledger);
    a.freeze();

    assert!(!ledger.process(&Transaction::withdraw(&a, dec!(10))));
    assert_eq!(a.balance(), dec!(1000));
    assert_eq!(ledger.audit_log().count_action("REJECTED"), 1);
    assert_eq!(ledger.audit_log().count_action("EXECUTED"), 0);
}

#[test]
fn non_positive_amount_never_executes() {
    let ledger = build();
    let (a, b) = open_pair(&ledger);

    for amount in [dec!(0), dec!(-25)] {
        assert!(!ledger.process(&Transaction::transfer(&a, &b, amount)));
    }
    assert_eq!(a.balance(), dec!(1000));
    assert_eq!(b.balance(), dec!(0));
    assert_eq!(ledger.audit_log().count_action("EXECUTED"), 0);
    assert_eq!(ledger.audit_log().count_action("REJECTED"), 2);

    let note = ledger.audit_log().entries()[0].note.clone().unwrap_or_default();
    assert!(note.starts_with("validation:"), "note should name the stage: {note}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: credit leg failure
// ─────────────────────────────────────────────────────────────────────────────

/// Approves everything, freezing the destination on the way so the credit
/// leg fails after the debit has gone through.
struct FreezeDestinationThenApprove;

impl ApprovalStage for FreezeDestinationThenApprove {
    fn name(&self) -> &'static str {
        "freeze_then_approve"
    }

    fn evaluate(&self, tx: &Transaction) -> ApprovalDecision {
        if let Some(destination) = tx.destination() {
            destination.freeze();
        }
        ApprovalDecision::Approve
    }
}

#[test]
fn failed_credit_reverses_debit_and_audits_failure() {
    let audit = Arc::new(AuditLog::new());
    let chain = Arc::new(ApprovalChain::new().then(FreezeDestinationThenApprove));
    let executor = TransactionExecutor::new(chain, Arc::clone(&audit));

    let a = Arc::new(Account::savings("acc-a", "Alice", dec!(100)));
    let b = Arc::new(Account::savings("acc-b", "Bob", dec!(0)));

    assert!(!executor.process(&Transaction::transfer(&a, &b, dec!(60))));
    assert_eq!(a.balance(), dec!(100), "debit must be put back");
    assert_eq!(b.balance(), dec!(0));

    let entries = audit.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].action.starts_with("FAILED: "), "action: {}", entries[0].action);
    assert_eq!(entries[0].note.as_deref(), Some("debit reversed"));
    assert!(executor.history().is_empty());
}

#[test]
fn reversed_debit_gives_back_insurance_cover() {
    let audit = Arc::new(AuditLog::new());
    let chain = Arc::new(ApprovalChain::new().then(FreezeDestinationThenApprove));
    let executor = TransactionExecutor::new(chain, Arc::clone(&audit));

    let a = Arc::new(Account::savings("acc-a", "Alice", dec!(0)).with_insurance(dec!(100)));
    let b = Arc::new(Account::savings("acc-b", "Bob", dec!(0)));

    assert!(!executor.process(&Transaction::transfer(&a, &b, dec!(100))));
    assert_eq!(a.balance(), dec!(0));
    assert_eq!(a.remaining_insurance(), dec!(100), "cover used by the debit must be restored");
    assert_eq!(a.available_balance(), dec!(100));
    assert_eq!(audit.entries()[0].note.as_deref(), Some("debit reversed"));
}

#[test]
fn reversed_partly_insured_debit_restores_balance_and_cover() {
    let audit = Arc::new(AuditLog::new());
    let chain = Arc::new(ApprovalChain::new().then(FreezeDestinationThenApprove));
    let executor = TransactionExecutor::new(chain, audit);

    let a = Arc::new(Account::savings("acc-a", "Alice", dec!(40)).with_insurance(dec!(100)));
    let b = Arc::new(Account::savings("acc-b", "Bob", dec!(0)));

    assert!(!executor.process(&Transaction::transfer(&a, &b, dec!(100))));
    assert_eq!(a.balance(), dec!(40));
    assert_eq!(a.remaining_insurance(), dec!(100));
    assert_eq!(b.balance(), dec!(0));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: history
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn history_keeps_executed_transactions_in_order() {
    let ledger = build();
    let (a, b) = open_pair(&ledger);

    let first = Transaction::transfer(&a, &b, dec!(10));
    let refused = Transaction::transfer(&a, &b, dec!(99999));
    let second = Transaction::deposit(&b, dec!(5));
    ledger.process(&first);
    ledger.process(&refused);
    ledger.process(&second);

    let records: Vec<_> = ledger.executor().history().iter().map(|tx| tx.record()).collect();
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![first.id(), second.id()]);

    let json = serde_json::to_value(&records[1]).expect("serialize record");
    assert_eq!(json["kind"], "DEPOSIT");
    assert!(json["source_id"].is_null());
    assert_eq!(json["destination_id"], "acc-b");
}
