//! Account observers: the boundary to notification delivery.
//!
//! Rendering and delivering email/SMS is somebody else's job. The ledger
//! only hands each registered observer a `Notification` value.

use crate::types::AccountId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub account_id:   AccountId,
    pub account_name: String,
    pub event:        String,
    pub message:      String,
}

pub trait AccountObserver: Send + Sync {
    fn update(&self, notification: &Notification);
}

/// Compare observers by allocation, ignoring vtable identity.
pub(crate) fn same_observer(a: &Arc<dyn AccountObserver>, b: &Arc<dyn AccountObserver>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Forwards every notification to the `log` facade.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl AccountObserver for LogNotifier {
    fn update(&self, n: &Notification) {
        log::info!(
            "notify account={} ({}): {} - {}",
            n.account_name, n.account_id, n.event, n.message
        );
    }
}

/// Keeps every notification in memory, in delivery order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    received: Mutex<Vec<Notification>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().clone()
    }

    pub fn count_event(&self, event: &str) -> usize {
        self.received.lock().iter().filter(|n| n.event == event).count()
    }

    pub fn len(&self) -> usize {
        self.received.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.received.lock().is_empty()
    }
}

impl AccountObserver for RecordingObserver {
    fn update(&self, notification: &Notification) {
        self.received.lock().push(notification.clone());
    }
}
