//! Ledger core: account lifecycle, account groups, interest, approval
//! chain, transaction executor, audit log and recurring transaction
//! scheduler.

pub mod account;
pub mod account_state;
pub mod approval;
pub mod audit;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod executor;
pub mod group;
pub mod interest;
pub mod ledger;
pub mod observer;
pub mod scheduler;
pub mod transaction;
pub mod types;

pub use account::{Account, AccountKind, AccountSnapshot, Capabilities};
pub use account_state::AccountState;
pub use approval::{ApprovalChain, ApprovalDecision, ApprovalOutcome, ApprovalStage};
pub use audit::{AuditAction, AuditEntry, AuditLog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use executor::TransactionExecutor;
pub use group::{AccountGroup, DepositSplit};
pub use interest::InterestPolicy;
pub use ledger::Ledger;
pub use scheduler::{CancelReason, RecurringHandle, RecurringScheduler, SkipReason, TickOutcome};
pub use transaction::{RecurringTransaction, Transaction, TransactionType};
