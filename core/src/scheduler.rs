//! Recurring scheduler: re-materializes transaction templates on a fixed
//! cadence and drives them through the normal pipeline.
//!
//! Every tick ends in exactly one of three ways:
//!   - cancel permanently  (the template can never succeed again)
//!   - skip this tick      (the condition may clear by a later tick)
//!   - execute             (pre-checks pass; the executor re-validates)
//!
//! TICK ORDER (fixed, evaluated top to bottom):
//!   1. Materialize a fresh transaction from the template.
//!   2. Destination CLOSED                      → cancel
//!   3. Destination FROZEN                      → skip DESTINATION_FROZEN
//!   4. Required source / destination missing   → cancel
//!   5. Source CLOSED or a loan account         → cancel
//!   6. Source SUSPENDED or FROZEN              → skip SOURCE_BLOCKED
//!   7. Source available balance < amount       → skip INSUFFICIENT_FUNDS
//!   8. Approval chain pre-check rejects        → skip REJECTED_BY_CHAIN
//!      otherwise                               → executor.process()
//!
//! SKIP DEDUP: a skip is audited and notified only when the same
//! (recurring id, reason) pair has not been reported within the cooldown.
//! A different reason, or a successful execution, forgets the earlier
//! reports for that recurring id.
//!
//! Each job runs on its own thread. A panic inside a tick is audited and
//! the job keeps its cadence. Cancelled jobs whose thread has exited are
//! dropped from the job table the next time it is consulted.

use crate::{
    account::AccountKind,
    account_state::AccountState,
    approval::ApprovalOutcome,
    audit::AuditAction,
    clock::Clock,
    error::{LedgerError, LedgerResult},
    executor::TransactionExecutor,
    transaction::{RecurringTransaction, Transaction},
    types::{Money, RecurringId},
};
use chrono::{DateTime, Duration as CooldownWindow, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    any::Any,
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

// ── Outcomes ─────────────────────────────────────────────────────────────────

/// Transient conditions. The schedule stays alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    DestinationFrozen,
    SourceBlocked,
    InsufficientFunds,
    RejectedByChain,
}

impl SkipReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::DestinationFrozen => "DESTINATION_FROZEN",
            Self::SourceBlocked     => "SOURCE_BLOCKED",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::RejectedByChain   => "REJECTED_BY_CHAIN",
        }
    }
}

/// Permanent conditions. The schedule stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    DestinationClosed,
    NoSourceAccount,
    NoDestinationAccount,
    SourceClosed,
    SourceIsLoan,
    ByCaller,
}

impl CancelReason {
    pub fn describe(self) -> &'static str {
        match self {
            Self::DestinationClosed    => "destination closed",
            Self::NoSourceAccount      => "no source account",
            Self::NoDestinationAccount => "no destination account",
            Self::SourceClosed         => "source closed",
            Self::SourceIsLoan         => "source is a loan account",
            Self::ByCaller             => "by caller",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Executed,
    /// Pre-checks passed but the executor refused or failed the transaction.
    Failed,
    Skipped { reason: SkipReason, reported: bool },
    Cancelled(CancelReason),
    /// The job was already cancelled; nothing was evaluated.
    Inactive,
    Errored(String),
}

enum Verdict {
    Proceed,
    Skip(SkipReason),
    Cancel(CancelReason),
}

/// Steps 2–7 of the tick order. Reads account state and balances live.
fn pre_check(tx: &Transaction) -> Verdict {
    if let Some(destination) = tx.destination() {
        match destination.state() {
            AccountState::Closed => return Verdict::Cancel(CancelReason::DestinationClosed),
            AccountState::Frozen => return Verdict::Skip(SkipReason::DestinationFrozen),
            AccountState::Active | AccountState::Suspended => {}
        }
    }

    if tx.kind().requires_source() && tx.source().is_none() {
        return Verdict::Cancel(CancelReason::NoSourceAccount);
    }
    if tx.kind().requires_destination() && tx.destination().is_none() {
        return Verdict::Cancel(CancelReason::NoDestinationAccount);
    }

    if let Some(source) = tx.source() {
        if source.kind() == AccountKind::Loan {
            return Verdict::Cancel(CancelReason::SourceIsLoan);
        }
        match source.state() {
            AccountState::Closed => return Verdict::Cancel(CancelReason::SourceClosed),
            AccountState::Suspended | AccountState::Frozen => {
                return Verdict::Skip(SkipReason::SourceBlocked)
            }
            AccountState::Active => {}
        }
        if source.available_balance() < tx.amount() {
            return Verdict::Skip(SkipReason::InsufficientFunds);
        }
    }

    Verdict::Proceed
}

// ── Skip dedup ───────────────────────────────────────────────────────────────

/// Last time each (recurring id, reason) pair was reported.
#[derive(Debug, Default)]
pub struct SkipTracker {
    last_reported: HashMap<(RecurringId, SkipReason), DateTime<Utc>>,
}

impl SkipTracker {
    /// Decide whether a skip should be reported, and remember it if so.
    ///
    /// Reports for other reasons of the same recurring id are dropped first.
    pub fn should_report(
        &mut self,
        id: &str,
        reason: SkipReason,
        now: DateTime<Utc>,
        cooldown: CooldownWindow,
    ) -> bool {
        self.last_reported
            .retain(|(rid, r), _| rid.as_str() != id || *r == reason);

        let key = (id.to_string(), reason);
        match self.last_reported.get(&key) {
            Some(last) if now <= *last + cooldown => false,
            _ => {
                self.last_reported.insert(key, now);
                true
            }
        }
    }

    pub fn clear(&mut self, id: &str) {
        self.last_reported.retain(|(rid, _), _| rid.as_str() != id);
    }

    pub fn last_reported(&self, id: &str, reason: SkipReason) -> Option<DateTime<Utc>> {
        self.last_reported.get(&(id.to_string(), reason)).copied()
    }

    pub fn tracked(&self, id: &str) -> usize {
        self.last_reported.keys().filter(|(rid, _)| rid.as_str() == id).count()
    }
}

// ── Jobs ─────────────────────────────────────────────────────────────────────

struct SchedulerShared {
    executor: Arc<TransactionExecutor>,
    clock:    Arc<dyn Clock>,
    cooldown: CooldownWindow,
    skips:    Mutex<SkipTracker>,
}

struct JobControl {
    template:  RecurringTransaction,
    cancelled: AtomicBool,
    wake:      Sender<()>,
}

impl JobControl {
    /// Flag the job as cancelled and wake its worker. True if this call
    /// did the cancelling.
    fn stop(&self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::SeqCst);
        if first {
            let _ = self.wake.try_send(());
        }
        first
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancellable handle to a scheduled recurring transaction.
#[derive(Clone)]
pub struct RecurringHandle {
    control: Arc<JobControl>,
    shared:  Arc<SchedulerShared>,
}

impl RecurringHandle {
    pub fn id(&self) -> &str {
        self.control.template.id()
    }

    pub fn template(&self) -> &RecurringTransaction {
        &self.control.template
    }

    /// Stop the schedule. A tick already running is allowed to finish.
    /// Returns false if the job was already cancelled.
    pub fn cancel(&self) -> bool {
        if !self.control.stop() {
            return false;
        }
        self.shared.skips.lock().clear(self.id());
        let tx = self.control.template.materialize();
        self.shared
            .executor
            .audit_log()
            .record(&tx, AuditAction::Cancelled(CancelReason::ByCaller), None);
        log::info!("recurring {} cancelled by caller", self.id());
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }
}

impl std::fmt::Debug for RecurringHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecurringHandle")
            .field("template", &self.control.template.to_string())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl SchedulerShared {
    fn tick(&self, control: &JobControl) -> TickOutcome {
        if control.is_cancelled() {
            return TickOutcome::Inactive;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| self.evaluate(control))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                let tx = control.template.materialize();
                self.executor
                    .audit_log()
                    .record(&tx, AuditAction::TaskError(message.clone()), None);
                TickOutcome::Errored(message)
            }
        }
    }

    fn evaluate(&self, control: &JobControl) -> TickOutcome {
        let template = &control.template;
        let tx = template.materialize();
        log::debug!("tick {template}");

        match pre_check(&tx) {
            Verdict::Cancel(reason) => return self.cancel_permanently(control, &tx, reason),
            Verdict::Skip(reason) => return self.skip(template.id(), &tx, reason, None),
            Verdict::Proceed => {}
        }

        // Pre-check only. The executor runs the chain again on process().
        if let ApprovalOutcome::Rejected { reason, .. } = self.executor.chain().evaluate(&tx) {
            return self.skip(template.id(), &tx, SkipReason::RejectedByChain, Some(reason));
        }

        if self.executor.process(&tx) {
            self.skips.lock().clear(template.id());
            TickOutcome::Executed
        } else {
            TickOutcome::Failed
        }
    }

    fn skip(
        &self,
        id: &str,
        tx: &Transaction,
        reason: SkipReason,
        detail: Option<String>,
    ) -> TickOutcome {
        let now = self.clock.now();
        let reported = self
            .skips
            .lock()
            .should_report(id, reason, now, self.cooldown);

        if reported {
            let message = skip_message(tx, reason, detail.as_deref());
            self.executor
                .audit_log()
                .record(tx, AuditAction::Skipped(reason), Some(&message));
            if let Some(owner) = tx.source().or(tx.destination()) {
                owner.notify("recurring", &message);
            }
        } else {
            log::debug!("recurring {id}: repeat skip {} suppressed", reason.code());
        }

        TickOutcome::Skipped { reason, reported }
    }

    fn cancel_permanently(
        &self,
        control: &JobControl,
        tx: &Transaction,
        reason: CancelReason,
    ) -> TickOutcome {
        let id = control.template.id();
        // Concurrent ticks may both reach here; only the one that stops
        // the job reports it.
        if !control.stop() {
            return TickOutcome::Inactive;
        }
        self.skips.lock().clear(id);
        self.executor
            .audit_log()
            .record(tx, AuditAction::Cancelled(reason), None);
        if let Some(owner) = tx.source().or(tx.destination()) {
            owner.notify(
                "recurring_cancelled",
                &format!("Recurring payment {id} cancelled: {}", reason.describe()),
            );
        }
        log::warn!("recurring {id} cancelled: {}", reason.describe());
        TickOutcome::Cancelled(reason)
    }
}

fn skip_message(tx: &Transaction, reason: SkipReason, detail: Option<&str>) -> String {
    let amount = tx.amount();
    match reason {
        SkipReason::InsufficientFunds => {
            let available = tx
                .source()
                .map(|s| s.available_balance())
                .unwrap_or(Money::ZERO);
            format!(
                "Recurring payment of {amount:.2} skipped due to insufficient funds. Available: {available:.2}"
            )
        }
        SkipReason::DestinationFrozen => {
            format!("Recurring payment of {amount:.2} skipped: destination account is frozen")
        }
        SkipReason::SourceBlocked => {
            format!("Recurring payment of {amount:.2} skipped: outgoing payments are blocked")
        }
        SkipReason::RejectedByChain => format!(
            "Recurring payment of {amount:.2} skipped: rejected by approval chain ({})",
            detail.unwrap_or("no reason given")
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ── Scheduler ────────────────────────────────────────────────────────────────

struct JobEntry {
    control: Arc<JobControl>,
    worker:  Option<JoinHandle<()>>,
}

pub struct RecurringScheduler {
    shared: Arc<SchedulerShared>,
    jobs:   Mutex<HashMap<RecurringId, JobEntry>>,
}

impl RecurringScheduler {
    pub fn new(
        executor: Arc<TransactionExecutor>,
        clock: Arc<dyn Clock>,
        cooldown: CooldownWindow,
    ) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                executor,
                clock,
                cooldown,
                skips: Mutex::new(SkipTracker::default()),
            }),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Start ticking `template` after `initial_delay`, then every `period`.
    pub fn schedule_recurring(
        &self,
        template: RecurringTransaction,
        initial_delay: Duration,
        period: Duration,
    ) -> LedgerResult<RecurringHandle> {
        if template.amount() <= Money::ZERO {
            return Err(LedgerError::invalid_argument(format!(
                "recurring amount must be positive, got {}",
                template.amount()
            )));
        }
        if period.is_zero() {
            return Err(LedgerError::invalid_argument("recurring period must be non-zero"));
        }
        let representable = Instant::now()
            .checked_add(initial_delay)
            .and_then(|first| first.checked_add(period))
            .is_some();
        if !representable {
            return Err(LedgerError::invalid_argument(format!(
                "recurring delay {initial_delay:?} / period {period:?} out of range"
            )));
        }

        let (wake_tx, wake_rx) = bounded(1);
        let control = Arc::new(JobControl {
            template,
            cancelled: AtomicBool::new(false),
            wake: wake_tx,
        });
        let handle = RecurringHandle {
            control: Arc::clone(&control),
            shared:  Arc::clone(&self.shared),
        };

        let id = handle.id().to_string();
        let worker = {
            let shared = Arc::clone(&self.shared);
            let control = Arc::clone(&control);
            thread::Builder::new()
                .name(format!("recurring-{}", &id[..8.min(id.len())]))
                .spawn(move || run_worker(shared, control, wake_rx, initial_delay, period))
                .map_err(|e| anyhow::anyhow!("cannot spawn recurring worker: {e}"))?
        };

        log::info!(
            "scheduled {} (initial delay {initial_delay:?}, period {period:?})",
            control.template
        );
        let mut jobs = self.jobs.lock();
        prune_finished(&mut jobs);
        jobs.insert(
            id,
            JobEntry {
                control,
                worker: Some(worker),
            },
        );
        Ok(handle)
    }

    /// Evaluate one tick for `handle` on the calling thread.
    pub fn run_tick(&self, handle: &RecurringHandle) -> TickOutcome {
        self.shared.tick(&handle.control)
    }

    pub fn cancel(&self, id: &str) -> bool {
        let control = {
            let mut jobs = self.jobs.lock();
            prune_finished(&mut jobs);
            jobs.get(id).map(|job| Arc::clone(&job.control))
        };
        match control {
            Some(control) => RecurringHandle {
                control,
                shared: Arc::clone(&self.shared),
            }
            .cancel(),
            None => false,
        }
    }

    /// Jobs that have not been cancelled.
    pub fn active_count(&self) -> usize {
        let mut jobs = self.jobs.lock();
        prune_finished(&mut jobs);
        jobs.values().filter(|job| !job.control.is_cancelled()).count()
    }

    /// Jobs still held in the job table, cancelled ones whose worker has
    /// not exited yet included.
    pub fn tracked_jobs(&self) -> usize {
        let mut jobs = self.jobs.lock();
        prune_finished(&mut jobs);
        jobs.len()
    }

    /// Skip reasons currently remembered for a recurring id.
    pub fn tracked_skips(&self, id: &str) -> usize {
        self.shared.skips.lock().tracked(id)
    }

    pub fn cooldown(&self) -> CooldownWindow {
        self.shared.cooldown
    }

    /// Stop every job and wait for the worker threads to exit.
    pub fn shutdown(&self) {
        let workers: Vec<_> = {
            let mut jobs = self.jobs.lock();
            jobs.values_mut()
                .filter_map(|job| {
                    job.control.stop();
                    job.worker.take()
                })
                .collect()
        };
        for worker in workers {
            if worker.join().is_err() {
                log::error!("recurring worker exited with a panic");
            }
        }
    }
}

/// Drop cancelled jobs whose worker thread has exited.
fn prune_finished(jobs: &mut HashMap<RecurringId, JobEntry>) {
    jobs.retain(|id, job| {
        let finished = job.control.is_cancelled()
            && job.worker.as_ref().map_or(true, JoinHandle::is_finished);
        if finished {
            if let Some(worker) = job.worker.take() {
                if worker.join().is_err() {
                    log::error!("recurring worker {id} exited with a panic");
                }
            }
            log::debug!("recurring {id} removed from job table");
        }
        !finished
    });
}

impl Drop for RecurringScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    shared: Arc<SchedulerShared>,
    control: Arc<JobControl>,
    wake: Receiver<()>,
    initial_delay: Duration,
    period: Duration,
) {
    let id = control.template.id();
    let Some(mut next) = Instant::now().checked_add(initial_delay) else {
        log::error!("recurring {id}: initial delay {initial_delay:?} out of range");
        return;
    };
    loop {
        let wait = next.saturating_duration_since(Instant::now());
        match wake.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if control.is_cancelled() {
            break;
        }

        match shared.tick(&control) {
            TickOutcome::Cancelled(_) | TickOutcome::Inactive => break,
            outcome => log::debug!("recurring {id}: {outcome:?}"),
        }

        // Fixed rate. Slots missed while a tick overran are dropped.
        let now = Instant::now();
        loop {
            match next.checked_add(period) {
                Some(slot) => next = slot,
                None => {
                    log::error!("recurring {id}: next slot out of range, stopping");
                    return;
                }
            }
            if next > now {
                break;
            }
        }
    }
    log::debug!("recurring worker {id} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn repeat_inside_cooldown_is_suppressed() {
        let mut tracker = SkipTracker::default();
        let day = CooldownWindow::hours(24);
        assert!(tracker.should_report("r1", SkipReason::InsufficientFunds, t0(), day));
        assert!(!tracker.should_report(
            "r1",
            SkipReason::InsufficientFunds,
            t0() + CooldownWindow::hours(23),
            day
        ));
        assert!(tracker.should_report(
            "r1",
            SkipReason::InsufficientFunds,
            t0() + CooldownWindow::hours(25),
            day
        ));
    }

    #[test]
    fn different_reason_forgets_previous_one() {
        let mut tracker = SkipTracker::default();
        let day = CooldownWindow::hours(24);
        assert!(tracker.should_report("r1", SkipReason::InsufficientFunds, t0(), day));
        assert!(tracker.should_report("r1", SkipReason::SourceBlocked, t0(), day));
        assert_eq!(tracker.last_reported("r1", SkipReason::InsufficientFunds), None);
        // The original reason is fresh again.
        assert!(tracker.should_report("r1", SkipReason::InsufficientFunds, t0(), day));
    }

    #[test]
    fn ids_are_tracked_independently() {
        let mut tracker = SkipTracker::default();
        let day = CooldownWindow::hours(24);
        assert!(tracker.should_report("r1", SkipReason::InsufficientFunds, t0(), day));
        assert!(tracker.should_report("r2", SkipReason::InsufficientFunds, t0(), day));
        tracker.clear("r1");
        assert_eq!(tracker.tracked("r1"), 0);
        assert_eq!(tracker.tracked("r2"), 1);
    }
}
