//! Integration tests for account groups.
//!
//! 1. Balance and state aggregate over members
//! 2. Deposit splits: even and single target
//! 3. Sequential withdrawal and its all-or-nothing failure
//! 4. Lifecycle and observers fan out to members
//! 5. Groups in the registry

use ledger_core::{
    account::Account,
    directory::AccountRegistry,
    observer::{AccountObserver, RecordingObserver},
    AccountGroup, AccountKind, AccountState, DepositSplit, LedgerError,
};
use rust_decimal_macros::dec;
use std::sync::Arc;

fn group_of(balances: &[rust_decimal::Decimal]) -> (AccountGroup, Vec<Arc<Account>>) {
    let group = AccountGroup::new("grp-1", "Household");
    let members: Vec<_> = balances
        .iter()
        .enumerate()
        .map(|(i, b)| Arc::new(Account::savings(format!("acc-{i}"), format!("Owner {i}"), *b)))
        .collect();
    for member in &members {
        group.add_member(Arc::clone(member)).expect("add member");
    }
    (group, members)
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: aggregates
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn balance_is_the_sum_of_members() {
    let (group, _) = group_of(&[dec!(100), dec!(250.50), dec!(0)]);
    assert_eq!(group.balance(), dec!(350.50));
    assert_eq!(group.len(), 3);
}

#[test]
fn state_reports_the_most_restrictive_member() {
    let (group, members) = group_of(&[dec!(0), dec!(0), dec!(0)]);
    assert_eq!(group.state(), AccountState::Active);

    members[0].suspend();
    assert_eq!(group.state(), AccountState::Suspended);
    members[1].freeze();
    assert_eq!(group.state(), AccountState::Frozen);
    members[2].close();
    assert_eq!(group.state(), AccountState::Closed);

    assert_eq!(AccountGroup::new("empty", "Empty").state(), AccountState::Active);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: deposit splits
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn even_split_gives_leftover_cents_to_the_last_member() {
    let (group, members) = group_of(&[dec!(0), dec!(0), dec!(0)]);

    group.deposit(dec!(100)).expect("deposit");
    assert_eq!(members[0].balance(), dec!(33.33));
    assert_eq!(members[1].balance(), dec!(33.33));
    assert_eq!(members[2].balance(), dec!(33.34));
    assert_eq!(group.balance(), dec!(100));
}

#[test]
fn single_target_split_credits_one_member() {
    let group = AccountGroup::new("grp-1", "Household")
        .with_deposit_split(DepositSplit::SingleTarget("acc-b".to_string()));
    let a = Arc::new(Account::savings("acc-a", "Alice", dec!(0)));
    let b = Arc::new(Account::savings("acc-b", "Bob", dec!(0)));
    group.add_member(Arc::clone(&a)).expect("add a");
    group.add_member(Arc::clone(&b)).expect("add b");

    group.deposit(dec!(80)).expect("deposit");
    assert_eq!(a.balance(), dec!(0));
    assert_eq!(b.balance(), dec!(80));

    group.remove_member("acc-b").expect("b was a member");
    assert!(matches!(group.deposit(dec!(10)), Err(LedgerError::InvalidArgument { .. })));
}

#[test]
fn deposit_into_empty_group_or_of_nothing_is_refused() {
    let empty = AccountGroup::new("grp-0", "Empty");
    assert!(matches!(empty.deposit(dec!(10)), Err(LedgerError::InvalidArgument { .. })));

    let (group, _) = group_of(&[dec!(0)]);
    assert!(group.deposit(dec!(0)).is_err());
    assert!(group.withdraw(dec!(-1)).is_err());
}

#[test]
fn failed_deposit_leg_undoes_earlier_legs() {
    let (group, members) = group_of(&[dec!(10), dec!(10), dec!(10)]);
    members[2].freeze();

    let result = group.deposit(dec!(90));
    assert!(matches!(result, Err(LedgerError::InvalidState { .. })), "got {result:?}");
    for member in &members {
        assert_eq!(member.balance(), dec!(10), "{} keeps its balance", member.id());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: sequential withdrawal
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn withdrawal_drains_members_in_order() {
    let (group, members) = group_of(&[dec!(30), dec!(0), dec!(50), dec!(100)]);

    group.withdraw(dec!(70)).expect("withdraw");
    assert_eq!(members[0].balance(), dec!(0));
    assert_eq!(members[1].balance(), dec!(0));
    assert_eq!(members[2].balance(), dec!(10));
    assert_eq!(members[3].balance(), dec!(100), "untouched once the amount is covered");
}

#[test]
fn shortfall_across_the_group_changes_nothing() {
    let (group, members) = group_of(&[dec!(30), dec!(20)]);

    match group.withdraw(dec!(60)) {
        Err(LedgerError::InsufficientFunds { account_id, requested, available }) => {
            assert_eq!(account_id, "grp-1");
            assert_eq!(requested, dec!(60));
            assert_eq!(available, dec!(50));
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }
    assert_eq!(members[0].balance(), dec!(30));
    assert_eq!(members[1].balance(), dec!(20));
}

#[test]
fn blocked_members_and_loans_are_passed_over() {
    let (group, members) = group_of(&[dec!(40), dec!(40)]);
    let loan = Arc::new(Account::loan("loan-1", "Car", dec!(900)));
    group.add_member(Arc::clone(&loan)).expect("add loan");
    members[0].suspend();

    group.withdraw(dec!(25)).expect("withdraw");
    assert_eq!(members[0].balance(), dec!(40));
    assert_eq!(members[1].balance(), dec!(15));
    assert_eq!(loan.balance(), dec!(900));
    assert_eq!(loan.kind(), AccountKind::Loan);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: fan-out
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn transitions_and_observers_reach_every_member() {
    let (group, members) = group_of(&[dec!(10), dec!(10)]);
    let observer = Arc::new(RecordingObserver::new());
    let as_dyn: Arc<dyn AccountObserver> = observer.clone();
    group.add_observer(Arc::clone(&as_dyn));

    group.deposit(dec!(20)).expect("deposit");
    assert_eq!(observer.count_event("deposit"), 2);

    group.freeze();
    assert!(members.iter().all(|m| m.state() == AccountState::Frozen));
    group.reopen();
    assert!(members.iter().all(|m| m.state() == AccountState::Active));

    group.remove_observer(&as_dyn);
    members[0].deposit(dec!(1)).expect("deposit");
    assert_eq!(observer.count_event("deposit"), 2);
}

#[test]
fn duplicate_members_are_refused() {
    let (group, members) = group_of(&[dec!(0)]);
    let again = group.add_member(Arc::clone(&members[0]));
    assert!(matches!(again, Err(LedgerError::InvalidArgument { .. })));
    assert_eq!(group.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: registry
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn registry_creates_groups_and_manages_membership() {
    let registry = AccountRegistry::default();
    registry
        .open(Some("acc-a"), "Alice", AccountKind::Savings, dec!(10))
        .expect("open a");
    registry
        .open(Some("acc-b"), "Bob", AccountKind::Savings, dec!(20))
        .expect("open b");

    let group = registry
        .create_group(Some("grp-1"), "Family", DepositSplit::Even)
        .expect("create group");
    registry.add_to_group("grp-1", "acc-a").expect("add a");
    registry.add_to_group("grp-1", "acc-b").expect("add b");
    assert_eq!(group.balance(), dec!(30));

    assert!(registry.add_to_group("grp-1", "missing").is_err());
    assert!(registry.add_to_group("missing", "acc-a").is_err());
    assert!(registry.create_group(Some("acc-a"), "Clash", DepositSplit::Even).is_err());

    assert!(registry.remove_from_group("grp-1", "acc-a").expect("remove"));
    assert!(!registry.remove_from_group("grp-1", "acc-a").expect("remove again"));
    assert_eq!(registry.group("grp-1").expect("group exists").balance(), dec!(20));
    assert_eq!(registry.groups().len(), 1);
}
