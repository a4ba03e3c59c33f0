//! Transaction executor: approval, balance effects, history and audit.
//!
//! `process` is a failure boundary: every error raised while moving money
//! becomes a `FAILED: <reason>` audit entry and a `false` return. Callers
//! inspect the audit log, they never handle an error from `process`.

use crate::{
    approval::{ApprovalChain, ApprovalOutcome},
    audit::{AuditAction, AuditLog},
    error::LedgerError,
    transaction::{Transaction, TransactionType},
};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct TransactionExecutor {
    chain:   Arc<ApprovalChain>,
    audit:   Arc<AuditLog>,
    history: Mutex<Vec<Transaction>>,
}

impl TransactionExecutor {
    pub fn new(chain: Arc<ApprovalChain>, audit: Arc<AuditLog>) -> Self {
        Self {
            chain,
            audit,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn process(&self, tx: &Transaction) -> bool {
        if let ApprovalOutcome::Rejected { stage, reason } = self.chain.evaluate(tx) {
            let note = match stage {
                Some(stage) => format!("{stage}: {reason}"),
                None => reason,
            };
            self.audit.record(tx, AuditAction::Rejected, Some(&note));
            return false;
        }

        match self.apply(tx) {
            Ok(()) => {
                self.history.lock().push(tx.clone());
                self.audit.record(tx, AuditAction::Executed, None);
                log::info!("executed {tx}");
                true
            }
            Err(failure) => {
                self.audit.record(
                    tx,
                    AuditAction::Failed(failure.error.to_string()),
                    failure.note.as_deref(),
                );
                false
            }
        }
    }

    fn apply(&self, tx: &Transaction) -> Result<(), ApplyFailure> {
        tx.check_shape()?;
        let amount = tx.amount();
        match tx.kind() {
            TransactionType::Deposit => {
                let destination = tx.destination().ok_or_else(missing_endpoint)?;
                destination.deposit(amount)?;
            }
            TransactionType::Withdraw => {
                let source = tx.source().ok_or_else(missing_endpoint)?;
                source.withdraw(amount)?;
            }
            TransactionType::Transfer => {
                let source = tx.source().ok_or_else(missing_endpoint)?;
                let destination = tx.destination().ok_or_else(missing_endpoint)?;
                let insured = source.withdraw_tracked(amount)?;
                if let Err(credit_error) = destination.deposit(amount) {
                    // Put the debit back, insurance cover included.
                    source.reverse_debit(amount, insured);
                    log::warn!("credit leg of {} failed, debit on {} reversed", tx.id(), source.id());
                    return Err(ApplyFailure {
                        error: credit_error,
                        note:  Some("debit reversed".to_string()),
                    });
                }
            }
        }
        Ok(())
    }

    /// Executed transactions, in execution order.
    pub fn history(&self) -> Vec<Transaction> {
        self.history.lock().clone()
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn chain(&self) -> &Arc<ApprovalChain> {
        &self.chain
    }
}

struct ApplyFailure {
    error: LedgerError,
    note:  Option<String>,
}

impl From<LedgerError> for ApplyFailure {
    fn from(error: LedgerError) -> Self {
        Self { error, note: None }
    }
}

fn missing_endpoint() -> LedgerError {
    LedgerError::configuration("transaction endpoint missing")
}

