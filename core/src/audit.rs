//! Audit log: append-only record of every attempted, executed, rejected,
//! skipped, cancelled or failed transaction.
//!
//! RULES:
//!   - `record` never fails and never panics on missing data.
//!   - Entries are never removed or mutated after insertion.
//!   - Readers see insertion order, and timestamps never go backwards
//!     along it. `entries()` returns a snapshot; later appends do not show
//!     up in it.

use crate::{
    clock::{Clock, SystemClock},
    scheduler::{CancelReason, SkipReason},
    transaction::Transaction,
    types::{display_id, AccountId, Money},
};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

pub const TAG_EXECUTED: &str = "EXECUTED";
pub const TAG_REJECTED: &str = "REJECTED";

/// What happened to a transaction. Rendered to a stable tag string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditAction {
    Executed,
    Rejected,
    Failed(String),
    Skipped(SkipReason),
    Cancelled(CancelReason),
    TaskError(String),
}

impl AuditAction {
    pub fn tag(&self) -> String {
        match self {
            Self::Executed          => TAG_EXECUTED.to_string(),
            Self::Rejected          => TAG_REJECTED.to_string(),
            Self::Failed(reason)    => format!("FAILED: {reason}"),
            Self::Skipped(reason)   => format!("SKIPPED_{}", reason.code()),
            Self::Cancelled(reason) => format!("CANCELLED: {}", reason.describe()),
            Self::TaskError(msg)    => format!("ERROR in recurring task: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp:      DateTime<Utc>,
    pub action:         String,
    pub source_id:      Option<AccountId>,
    pub destination_id: Option<AccountId>,
    pub amount:         Money,
    pub note:           Option<String>,
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} - {} -> {} : {:.2}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.action,
            display_id(self.source_id.as_deref()),
            display_id(self.destination_id.as_deref()),
            self.amount,
        )?;
        match self.note.as_deref() {
            Some(note) if !note.is_empty() => write!(f, " - {note}"),
            _ => Ok(()),
        }
    }
}

pub struct AuditLog {
    clock:   Arc<dyn Clock>,
    entries: RwLock<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn record(&self, tx: &Transaction, action: AuditAction, note: Option<&str>) {
        self.record_raw(
            &action.tag(),
            tx.source_id(),
            tx.destination_id(),
            tx.amount(),
            note,
        );
    }

    /// Low-level append for callers that have no `Transaction` value.
    pub fn record_raw(
        &self,
        action: &str,
        source_id: Option<&str>,
        destination_id: Option<&str>,
        amount: Money,
        note: Option<&str>,
    ) {
        // Stamp under the write lock so timestamps follow insertion order.
        let line = {
            let mut entries = self.entries.write();
            let entry = AuditEntry {
                timestamp:      self.clock.now(),
                action:         action.to_string(),
                source_id:      source_id.map(str::to_string),
                destination_id: destination_id.map(str::to_string),
                amount,
                note:           note.map(str::to_string),
            };
            let line = entry.to_string();
            entries.push(entry);
            line
        };
        if action == TAG_EXECUTED {
            log::info!("audit {line}");
        } else {
            log::warn!("audit {line}");
        }
    }

    pub fn entries_count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    /// Number of entries whose tag equals `action` exactly.
    pub fn count_action(&self, action: &str) -> usize {
        self.entries.read().iter().filter(|e| e.action == action).count()
    }

    /// Number of entries whose tag starts with `prefix`.
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| e.action.starts_with(prefix))
            .count()
    }

    /// The last `n` entries, most recent first.
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        self.entries.read().iter().rev().take(n).cloned().collect()
    }

    /// Print the last `n` entries (10 when `n` is 0), most recent first.
    pub fn print_recent(&self, n: usize) {
        let n = if n == 0 { 10 } else { n };
        for entry in self.recent(n) {
            println!("{entry}");
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuditLog{{entries={}}}", self.entries_count())
    }
}
