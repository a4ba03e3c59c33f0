//! The ledger facade: builds a fully wired pipeline from a config.
//!
//! WIRING (one instance of each, shared by every path):
//!   clock ─┬─ audit log ─┐
//!          │             ├─ executor ── scheduler
//!          │   approval chain ┘
//!          └────────────────────────────┘
//!
//! Ad-hoc `process` calls and scheduler threads share the same accounts,
//! the same chain and the same audit log.

use crate::{
    approval::ApprovalChain,
    audit::AuditLog,
    clock::{Clock, SystemClock},
    config::LedgerConfig,
    directory::AccountRegistry,
    error::LedgerResult,
    executor::TransactionExecutor,
    scheduler::{RecurringHandle, RecurringScheduler},
    transaction::{RecurringTransaction, Transaction},
};
use std::{sync::Arc, time::Duration};

pub struct Ledger {
    pub config: LedgerConfig,
    clock:      Arc<dyn Clock>,
    accounts:   AccountRegistry,
    executor:   Arc<TransactionExecutor>,
    scheduler:  RecurringScheduler,
}

impl Ledger {
    pub fn build(config: LedgerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        let chain = Arc::new(ApprovalChain::standard(
            config.approval.auto_limit,
            config.approval.manager_limit,
        ));
        let audit = Arc::new(AuditLog::with_clock(Arc::clone(&clock)));
        let executor = Arc::new(TransactionExecutor::new(chain, audit));
        let scheduler = RecurringScheduler::new(
            Arc::clone(&executor),
            Arc::clone(&clock),
            config.scheduler.cooldown(),
        );
        log::debug!(
            "ledger built: auto_limit={} manager_limit={} cooldown={}s",
            config.approval.auto_limit,
            config.approval.manager_limit,
            config.scheduler.skip_cooldown_secs
        );
        Self {
            accounts: AccountRegistry::new(config.accounts.clone()),
            config,
            clock,
            executor,
            scheduler,
        }
    }

    pub fn process(&self, tx: &Transaction) -> bool {
        self.executor.process(tx)
    }

    pub fn schedule_recurring(
        &self,
        template: RecurringTransaction,
        initial_delay: Duration,
        period: Duration,
    ) -> LedgerResult<RecurringHandle> {
        self.scheduler.schedule_recurring(template, initial_delay, period)
    }

    pub fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        self.executor.audit_log()
    }

    pub fn executor(&self) -> &Arc<TransactionExecutor> {
        &self.executor
    }

    pub fn scheduler(&self) -> &RecurringScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
