//! Account lifecycle states.
//!
//! A state is a policy, not account data: it decides whether a deposit
//! or withdrawal attempt is forwarded to the real balance mutation or
//! refused. The account consults its current state on every attempt, and
//! so do the approval chain and the recurring scheduler.
//!
//! ```text
//!              deposit   withdraw
//!   ACTIVE      allow     allow
//!   SUSPENDED   allow     block
//!   FROZEN      block     block
//!   CLOSED      block     block
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountState {
    #[default]
    Active,
    Frozen,
    Suspended,
    Closed,
}

/// Outcome of consulting a state's operation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Allow,
    Block(&'static str),
}

impl Gate {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Gate::Allow)
    }
}

impl AccountState {
    pub fn on_deposit(self) -> Gate {
        match self {
            Self::Active | Self::Suspended => Gate::Allow,
            Self::Frozen => Gate::Block("account is frozen; deposits not allowed"),
            Self::Closed => Gate::Block("account is closed; no operations allowed"),
        }
    }

    pub fn on_withdraw(self) -> Gate {
        match self {
            Self::Active => Gate::Allow,
            Self::Suspended => Gate::Block("account is suspended; outgoing blocked"),
            Self::Frozen => Gate::Block("account is frozen; withdrawals not allowed"),
            Self::Closed => Gate::Block("account is closed; no operations allowed"),
        }
    }

    /// May this account be debited?
    pub fn can_be_source(self) -> bool {
        self.on_withdraw().is_allowed()
    }

    /// May this account be credited?
    pub fn can_receive(self) -> bool {
        self.on_deposit().is_allowed()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Active    => "ACTIVE",
            Self::Frozen    => "FROZEN",
            Self::Suspended => "SUSPENDED",
            Self::Closed    => "CLOSED",
        }
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspended_is_asymmetric() {
        assert!(AccountState::Suspended.can_receive());
        assert!(!AccountState::Suspended.can_be_source());
    }

    #[test]
    fn frozen_and_closed_block_both_directions() {
        for state in [AccountState::Frozen, AccountState::Closed] {
            assert!(!state.can_receive(), "{state} should not receive");
            assert!(!state.can_be_source(), "{state} should not be a source");
        }
    }
}
