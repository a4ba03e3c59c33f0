//! Approval chain: ordered policy stages deciding whether a transaction
//! may execute.
//!
//! Standard order: Validation → Auto-Approval(limit) → Manager-Approval(limit).
//!
//! RULES:
//!   - Stages run in the order they were added, and the first stage that
//!     approves or rejects ends the evaluation.
//!   - Limits are inclusive: `amount == limit` approves at that tier.
//!   - A chain that runs out of stages rejects. Nothing is approved by
//!     default.
//!   - Stages read account state and balances live; no decision is cached.

use crate::{account::AccountKind, transaction::Transaction, types::Money};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    /// Pass the transaction on to the next stage.
    Defer,
    Reject(String),
}

impl ApprovalDecision {
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject(reason.into())
    }
}

pub trait ApprovalStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, tx: &Transaction) -> ApprovalDecision;
}

/// Result of running a transaction through the whole chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved { stage: &'static str },
    Rejected { stage: Option<&'static str>, reason: String },
}

impl ApprovalOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

// ── Stages ─────────────────────────────────────────────────────────

/// Sanity and eligibility checks. Never approves on its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidationStage;

impl ApprovalStage for ValidationStage {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn evaluate(&self, tx: &Transaction) -> ApprovalDecision {
        if tx.amount() <= Money::ZERO {
            return ApprovalDecision::reject(format!("invalid amount {}", tx.amount()));
        }
        if let Err(e) = tx.check_shape() {
            return ApprovalDecision::reject(e.to_string());
        }

        if let Some(source) = tx.source() {
            if source.kind() == AccountKind::Loan {
                return ApprovalDecision::reject(format!(
                    "source account {} is a loan account",
                    source.id()
                ));
            }
            let state = source.state();
            if !state.can_be_source() {
                return ApprovalDecision::reject(format!(
                    "source account {} status={state}",
                    source.id()
                ));
            }
        }

        if let Some(destination) = tx.destination() {
            let state = destination.state();
            if !state.can_receive() {
                return ApprovalDecision::reject(format!(
                    "destination account {} status={state}",
                    destination.id()
                ));
            }
        }

        if tx.kind().requires_source() {
            // Presence was checked by check_shape.
            if let Some(source) = tx.source() {
                let available = source.available_balance();
                if available < tx.amount() {
                    return ApprovalDecision::reject(format!(
                        "insufficient funds: available={available:.2}, required={:.2}",
                        tx.amount()
                    ));
                }
            }
        }

        ApprovalDecision::Defer
    }
}

/// Approves anything at or below `limit`.
#[derive(Debug, Clone, Copy)]
pub struct AutoApproval {
    pub limit: Money,
}

impl ApprovalStage for AutoApproval {
    fn name(&self) -> &'static str {
        "auto_approval"
    }

    fn evaluate(&self, tx: &Transaction) -> ApprovalDecision {
        approve_up_to(self.limit, tx)
    }
}

/// Same policy as `AutoApproval`, one tier higher.
#[derive(Debug, Clone, Copy)]
pub struct ManagerApproval {
    pub limit: Money,
}

impl ApprovalStage for ManagerApproval {
    fn name(&self) -> &'static str {
        "manager_approval"
    }

    fn evaluate(&self, tx: &Transaction) -> ApprovalDecision {
        approve_up_to(self.limit, tx)
    }
}

fn approve_up_to(limit: Money, tx: &Transaction) -> ApprovalDecision {
    if tx.amount() <= limit {
        ApprovalDecision::Approve
    } else {
        ApprovalDecision::Defer
    }
}

// ── Chain ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ApprovalChain {
    stages: Vec<Box<dyn ApprovalStage>>,
}

impl ApprovalChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validation → Auto-Approval(auto_limit) → Manager-Approval(manager_limit).
    pub fn standard(auto_limit: Money, manager_limit: Money) -> Self {
        Self::new()
            .then(ValidationStage)
            .then(AutoApproval { limit: auto_limit })
            .then(ManagerApproval { limit: manager_limit })
    }

    /// Append a stage at the end of the chain.
    pub fn then(mut self, stage: impl ApprovalStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn evaluate(&self, tx: &Transaction) -> ApprovalOutcome {
        for stage in &self.stages {
            match stage.evaluate(tx) {
                ApprovalDecision::Approve => {
                    log::debug!("[{}] approved {} {:.2}", stage.name(), tx.kind(), tx.amount());
                    return ApprovalOutcome::Approved { stage: stage.name() };
                }
                ApprovalDecision::Reject(reason) => {
                    log::debug!("[{}] rejected {}: {reason}", stage.name(), tx.id());
                    return ApprovalOutcome::Rejected { stage: Some(stage.name()), reason };
                }
                ApprovalDecision::Defer => {
                    log::debug!("[{}] escalating {:.2}", stage.name(), tx.amount());
                }
            }
        }
        ApprovalOutcome::Rejected {
            stage:  None,
            reason: "no stage approved the transaction".to_string(),
        }
    }

    pub fn handle(&self, tx: &Transaction) -> bool {
        self.evaluate(tx).is_approved()
    }
}

