//! Transactions and recurring transaction templates.
//!
//! Endpoints are live `Arc<Account>` references: every read of state or
//! balance through a transaction sees the account as it is right now.

use crate::{
    account::Account,
    error::{LedgerError, LedgerResult},
    types::{AccountId, Money, RecurringId},
};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Transfer,
}

impl TransactionType {
    pub fn requires_source(self) -> bool {
        matches!(self, Self::Withdraw | Self::Transfer)
    }

    pub fn requires_destination(self) -> bool {
        matches!(self, Self::Deposit | Self::Transfer)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Deposit  => "DEPOSIT",
            Self::Withdraw => "WITHDRAW",
            Self::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    id:          String,
    kind:        TransactionType,
    source:      Option<Arc<Account>>,
    destination: Option<Arc<Account>>,
    amount:      Money,
}

impl Transaction {
    pub fn new(
        kind: TransactionType,
        source: Option<Arc<Account>>,
        destination: Option<Arc<Account>>,
        amount: Money,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            source,
            destination,
            amount,
        }
    }

    pub fn deposit(destination: &Arc<Account>, amount: Money) -> Self {
        Self::new(TransactionType::Deposit, None, Some(Arc::clone(destination)), amount)
    }

    pub fn withdraw(source: &Arc<Account>, amount: Money) -> Self {
        Self::new(TransactionType::Withdraw, Some(Arc::clone(source)), None, amount)
    }

    pub fn transfer(source: &Arc<Account>, destination: &Arc<Account>, amount: Money) -> Self {
        Self::new(
            TransactionType::Transfer,
            Some(Arc::clone(source)),
            Some(Arc::clone(destination)),
            amount,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TransactionType {
        self.kind
    }

    pub fn source(&self) -> Option<&Arc<Account>> {
        self.source.as_ref()
    }

    pub fn destination(&self) -> Option<&Arc<Account>> {
        self.destination.as_ref()
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source.as_deref().map(Account::id)
    }

    pub fn destination_id(&self) -> Option<&str> {
        self.destination.as_deref().map(Account::id)
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    /// Check that the endpoints match the type and the amount is positive.
    pub fn check_shape(&self) -> LedgerResult<()> {
        if self.amount <= Money::ZERO {
            return Err(LedgerError::invalid_argument(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.kind.requires_source() && self.source.is_none() {
            return Err(LedgerError::configuration(format!("{} requires a source account", self.kind)));
        }
        if self.kind.requires_destination() && self.destination.is_none() {
            return Err(LedgerError::configuration(format!(
                "{} requires a destination account",
                self.kind
            )));
        }
        Ok(())
    }

    pub fn record(&self) -> TransactionRecord {
        TransactionRecord {
            id:             self.id.clone(),
            kind:           self.kind,
            source_id:      self.source_id().map(str::to_string),
            destination_id: self.destination_id().map(str::to_string),
            amount:         self.amount,
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TX[{}] {} {}->{} {:.2}",
            self.id,
            self.kind,
            crate::types::display_id(self.source_id()),
            crate::types::display_id(self.destination_id()),
            self.amount
        )
    }
}

/// Serializable, account-free view of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id:             String,
    pub kind:           TransactionType,
    pub source_id:      Option<AccountId>,
    pub destination_id: Option<AccountId>,
    pub amount:         Money,
}

// ── Recurring template ────────────────────────────────────────────

/// A transaction template that materializes a fresh `Transaction` each tick.
#[derive(Debug, Clone)]
pub struct RecurringTransaction {
    id:          RecurringId,
    kind:        TransactionType,
    source:      Option<Arc<Account>>,
    destination: Option<Arc<Account>>,
    amount:      Money,
}

impl RecurringTransaction {
    pub fn new(
        kind: TransactionType,
        source: Option<Arc<Account>>,
        destination: Option<Arc<Account>>,
        amount: Money,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            source,
            destination,
            amount,
        }
    }

    pub fn transfer(source: &Arc<Account>, destination: &Arc<Account>, amount: Money) -> Self {
        Self::new(
            TransactionType::Transfer,
            Some(Arc::clone(source)),
            Some(Arc::clone(destination)),
            amount,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TransactionType {
        self.kind
    }

    pub fn source(&self) -> Option<&Arc<Account>> {
        self.source.as_ref()
    }

    pub fn destination(&self) -> Option<&Arc<Account>> {
        self.destination.as_ref()
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn materialize(&self) -> Transaction {
        Transaction::new(self.kind, self.source.clone(), self.destination.clone(), self.amount)
    }
}

impl fmt::Display for RecurringTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTX[{}] {} {}->{} {:.2}",
            self.id,
            self.kind,
            crate::types::display_id(self.source.as_deref().map(Account::id)),
            crate::types::display_id(self.destination.as_deref().map(Account::id)),
            self.amount
        )
    }
}
