//! Integration tests for the audit log.
//!
//! 1. Concurrent writers never lose an entry, and timestamps follow
//!    insertion order
//! 2. Timestamps come from the injected clock
//! 3. Snapshots do not see later appends
//! 4. Entries serialize with decimal amounts as strings

use ledger_core::{
    account::Account,
    clock::{Clock, ManualClock},
    AuditAction, AuditLog, Transaction,
};
use rust_decimal_macros::dec;
use chrono::{DateTime, Utc};
use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    thread,
};

/// Moves forward one millisecond every time it is read.
struct TickingClock {
    start: DateTime<Utc>,
    reads: AtomicI64,
}

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Utc> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        self.start + chrono::Duration::milliseconds(n)
    }
}

#[test]
fn concurrent_appends_are_all_kept() {
    let log = Arc::new(AuditLog::new());
    let account = Arc::new(Account::savings("acc-a", "Alice", dec!(0)));

    let writers: Vec<_> = (0..8)
        .map(|_| {
            let log = Arc::clone(&log);
            let account = Arc::clone(&account);
            thread::spawn(move || {
                for _ in 0..250 {
                    log.record(&Transaction::deposit(&account, dec!(1)), AuditAction::Executed, None);
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer thread panicked");
    }

    assert_eq!(log.entries_count(), 2000);
    assert_eq!(log.count_action("EXECUTED"), 2000);
}

#[test]
fn concurrent_appends_keep_timestamps_in_insertion_order() {
    let clock = Arc::new(TickingClock { start: Utc::now(), reads: AtomicI64::new(0) });
    let log = Arc::new(AuditLog::with_clock(clock));

    let writers: Vec<_> = (0..8)
        .map(|w| {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for i in 0..250 {
                    let id = format!("w{w}-{i}");
                    log.record_raw("EXECUTED", None, Some(&id), dec!(1), None);
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer thread panicked");
    }

    let entries = log.entries();
    assert_eq!(entries.len(), 2000);
    for (i, pair) in entries.windows(2).enumerate() {
        assert!(
            pair[0].timestamp < pair[1].timestamp,
            "entry {} is stamped {} but entry {} before it is stamped {}",
            i + 1,
            pair[1].timestamp,
            i,
            pair[0].timestamp
        );
    }
}

#[test]
fn timestamps_follow_the_injected_clock() {
    let clock = Arc::new(ManualClock::starting_now());
    let log = AuditLog::with_clock(clock.clone());
    let t0 = clock.now();

    log.record_raw("EXECUTED", Some("a"), Some("b"), dec!(1), None);
    clock.advance(chrono::Duration::minutes(5));
    log.record_raw("REJECTED", Some("a"), Some("b"), dec!(2), Some("validation: nope"));

    let entries = log.entries();
    assert_eq!(entries[0].timestamp, t0);
    assert_eq!(entries[1].timestamp - entries[0].timestamp, chrono::Duration::minutes(5));
    assert!(entries[1].to_string().ends_with("REJECTED - a -> b : 2.00 - validation: nope"));
}

#[test]
fn snapshot_is_not_affected_by_later_appends() {
    let log = AuditLog::new();
    log.record_raw("EXECUTED", None, Some("b"), dec!(1), None);
    let snapshot = log.entries();
    log.record_raw("EXECUTED", None, Some("b"), dec!(2), None);

    assert_eq!(snapshot.len(), 1);
    assert_eq!(log.entries_count(), 2);
    assert_eq!(log.recent(0).len(), 0);
    assert_eq!(log.recent(10).len(), 2);
}

#[test]
fn prefix_counts_group_tag_families() {
    let log = AuditLog::new();
    log.record_raw("SKIPPED_INSUFFICIENT_FUNDS", Some("a"), Some("b"), dec!(1), None);
    log.record_raw("SKIPPED_SOURCE_BLOCKED", Some("a"), Some("b"), dec!(1), None);
    log.record_raw("CANCELLED: by caller", Some("a"), Some("b"), dec!(1), None);

    assert_eq!(log.count_prefix("SKIPPED_"), 2);
    assert_eq!(log.count_action("SKIPPED_SOURCE_BLOCKED"), 1);
    assert_eq!(log.count_prefix("CANCELLED"), 1);
}

#[test]
fn entries_serialize_to_json() {
    let log = AuditLog::new();
    log.record_raw("EXECUTED", None, Some("acc-b"), dec!(12.50), None);

    let json = serde_json::to_value(&log.entries()[0]).expect("serialize entry");
    assert_eq!(json["action"], "EXECUTED");
    assert_eq!(json["amount"], "12.50");
    assert!(json["source_id"].is_null());
}
