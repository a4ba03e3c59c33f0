//! Accounts: identity, balance, lifecycle state and observers.
//!
//! RULE: The balance is only ever changed while holding the account's
//! book lock, by `credit_locked` / `debit_locked` or by the crate-private
//! reversals that undo them.
//! Public `deposit` / `withdraw` consult the lifecycle state first, under
//! the same lock, so an operator freezing the account mid-flight is either
//! seen entirely before or entirely after the mutation.
//!
//! A loan account's balance is the outstanding principal. Deposits pay
//! it down and withdrawals are refused.
//!
//! Observer notifications are collected while the lock is held and
//! dispatched after it is released, so an observer may read the account
//! it is being told about.

use crate::{
    account_state::{AccountState, Gate},
    error::{LedgerError, LedgerResult},
    interest::InterestPolicy,
    observer::{same_observer, AccountObserver, Notification},
    types::{AccountId, Money},
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// Overdraft granted to checking accounts unless configured otherwise.
pub const DEFAULT_CHECKING_OVERDRAFT: Money = Money::from_parts(500, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Checking,
    Savings,
    Investment,
    Loan,
}

/// Optional account features. These sit on the account record itself
/// instead of wrapping it, so an account keeps one identity everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// How far below zero a withdrawal may take the balance.
    pub overdraft_limit: Option<Money>,
    /// Total coverage that may top up a withdrawal shortfall.
    pub insurance_cover: Option<Money>,
    pub interest:        Option<InterestPolicy>,
}

#[derive(Debug)]
struct AccountBook {
    balance:        Money,
    state:          AccountState,
    insurance_used: Money,
}

/// Point-in-time view of an account, for summaries and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id:                AccountId,
    pub name:              String,
    pub kind:              AccountKind,
    pub state:             AccountState,
    pub balance:           Money,
    pub available_balance: Money,
}

pub struct Account {
    id:           AccountId,
    name:         String,
    kind:         AccountKind,
    capabilities: Capabilities,
    book:         Mutex<AccountBook>,
    observers:    RwLock<Vec<Arc<dyn AccountObserver>>>,
}

impl Account {
    pub fn new(
        id: impl Into<AccountId>,
        name: impl Into<String>,
        kind: AccountKind,
        opening_balance: Money,
    ) -> Self {
        Self {
            id:           id.into(),
            name:         name.into(),
            kind,
            capabilities: Capabilities::default(),
            book:         Mutex::new(AccountBook {
                balance:        opening_balance,
                state:          AccountState::Active,
                insurance_used: Money::ZERO,
            }),
            observers:    RwLock::new(Vec::new()),
        }
    }

    /// Checking account with the default overdraft.
    pub fn checking(id: impl Into<AccountId>, name: impl Into<String>, opening_balance: Money) -> Self {
        Self::new(id, name, AccountKind::Checking, opening_balance)
            .with_overdraft(DEFAULT_CHECKING_OVERDRAFT)
    }

    pub fn savings(id: impl Into<AccountId>, name: impl Into<String>, opening_balance: Money) -> Self {
        Self::new(id, name, AccountKind::Savings, opening_balance)
    }

    pub fn investment(id: impl Into<AccountId>, name: impl Into<String>, opening_balance: Money) -> Self {
        Self::new(id, name, AccountKind::Investment, opening_balance)
    }

    /// Loan with `principal` outstanding.
    pub fn loan(id: impl Into<AccountId>, name: impl Into<String>, principal: Money) -> Self {
        Self::new(id, name, AccountKind::Loan, principal)
    }

    /// Set the overdraft allowance. Negative limits count as none.
    pub fn with_overdraft(mut self, limit: Money) -> Self {
        self.capabilities.overdraft_limit = Some(limit.max(Money::ZERO));
        self
    }

    pub fn with_insurance(mut self, cover: Money) -> Self {
        self.capabilities.insurance_cover = Some(cover.max(Money::ZERO));
        self
    }

    pub fn with_interest(mut self, policy: InterestPolicy) -> Self {
        self.capabilities.interest = Some(policy);
        self
    }

    // ── Identity ──────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    // ── Balances ──────────────────────────────────────────────────

    pub fn balance(&self) -> Money {
        self.book.lock().balance
    }

    /// Balance plus overdraft allowance plus unused insurance cover.
    /// Nothing can be drawn from a loan.
    pub fn available_balance(&self) -> Money {
        let book = self.book.lock();
        self.available_locked(&book)
    }

    pub fn remaining_insurance(&self) -> Money {
        let book = self.book.lock();
        self.remaining_cover(&book)
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        let book = self.book.lock();
        AccountSnapshot {
            id:                self.id.clone(),
            name:              self.name.clone(),
            kind:              self.kind,
            state:             book.state,
            balance:           book.balance,
            available_balance: self.available_locked(&book),
        }
    }

    fn available_locked(&self, book: &AccountBook) -> Money {
        match self.kind {
            AccountKind::Loan => Money::ZERO,
            _ => book.balance + self.overdraft() + self.remaining_cover(book),
        }
    }

    fn overdraft(&self) -> Money {
        self.capabilities.overdraft_limit.unwrap_or(Money::ZERO)
    }

    fn remaining_cover(&self, book: &AccountBook) -> Money {
        let cover = self.capabilities.insurance_cover.unwrap_or(Money::ZERO);
        (cover - book.insurance_used).max(Money::ZERO)
    }

    // ── Public, state-gated operations ────────────────────────────

    pub fn deposit(&self, amount: Money) -> LedgerResult<()> {
        let pending = {
            let mut book = self.book.lock();
            match book.state.on_deposit() {
                Gate::Allow => self.credit_locked(&mut book, amount, "deposit")?,
                Gate::Block(reason) => return Err(self.blocked(reason)),
            }
        };
        self.dispatch(&pending);
        Ok(())
    }

    pub fn withdraw(&self, amount: Money) -> LedgerResult<()> {
        self.withdraw_tracked(amount).map(|_| ())
    }

    /// Withdraw and report how much of `amount` was drawn from insurance
    /// cover, so a caller that has to undo the debit can hand it back.
    pub(crate) fn withdraw_tracked(&self, amount: Money) -> LedgerResult<Money> {
        let (pending, insured) = {
            let mut book = self.book.lock();
            match book.state.on_withdraw() {
                Gate::Allow => self.debit_locked(&mut book, amount)?,
                Gate::Block(reason) => return Err(self.blocked(reason)),
            }
        };
        self.dispatch(&pending);
        Ok(insured)
    }

    /// Ungated undo of a `withdraw_tracked` that returned `insured`.
    /// Balance and insurance usage are restored together.
    pub(crate) fn reverse_debit(&self, amount: Money, insured: Money) {
        let pending = {
            let mut book = self.book.lock();
            let old = book.balance;
            book.balance += amount - insured;
            book.insurance_used = (book.insurance_used - insured).max(Money::ZERO);
            self.notification(
                "reversal",
                format!("Reversed debit {amount:.2} (old: {old:.2} -> new: {:.2})", book.balance),
            )
        };
        self.dispatch(&[pending]);
    }

    /// Ungated undo of a successful `deposit`.
    pub(crate) fn reverse_credit(&self, amount: Money) {
        let pending = {
            let mut book = self.book.lock();
            let old = book.balance;
            match self.kind {
                AccountKind::Loan => book.balance += amount,
                _ => book.balance -= amount,
            }
            self.notification(
                "reversal",
                format!("Reversed credit {amount:.2} (old: {old:.2} -> new: {:.2})", book.balance),
            )
        };
        self.dispatch(&[pending]);
    }

    /// Apply `months` of interest under the account's policy and return
    /// what was added. On a loan the outstanding principal grows. Accounts
    /// that refuse deposits do not accrue.
    pub fn accrue_interest(&self, months: u32) -> LedgerResult<Money> {
        let Some(policy) = self.capabilities.interest else {
            return Ok(Money::ZERO);
        };
        let (pending, interest) = {
            let mut book = self.book.lock();
            if let Gate::Block(reason) = book.state.on_deposit() {
                return Err(self.blocked(reason));
            }
            let interest = policy.interest_on(book.balance, months)?;
            if interest.is_zero() {
                return Ok(Money::ZERO);
            }
            let old = book.balance;
            book.balance += interest;
            let note = self.notification(
                "interest",
                format!("Interest {interest:.2} (old: {old:.2} -> new: {:.2})", book.balance),
            );
            (note, interest)
        };
        self.dispatch(&[pending]);
        Ok(interest)
    }

    fn credit_locked(
        &self,
        book: &mut AccountBook,
        amount: Money,
        event: &str,
    ) -> LedgerResult<Vec<Notification>> {
        ensure_positive(amount)?;
        let old = book.balance;
        if self.kind == AccountKind::Loan {
            book.balance -= amount;
            return Ok(vec![self.notification(
                "loan_payment",
                format!("Payment {amount:.2} (old: {old:.2} -> new: {:.2})", book.balance),
            )]);
        }
        book.balance += amount;
        Ok(vec![self.notification(
            event,
            format!("Deposit {amount:.2} (old: {old:.2} -> new: {:.2})", book.balance),
        )])
    }

    /// Returns the notifications to send and how much insurance covered.
    fn debit_locked(
        &self,
        book: &mut AccountBook,
        amount: Money,
    ) -> LedgerResult<(Vec<Notification>, Money)> {
        ensure_positive(amount)?;
        if self.kind == AccountKind::Loan {
            return Err(self.blocked("cannot withdraw from a loan account"));
        }
        let mut pending = Vec::new();
        let mut insured = Money::ZERO;

        let spendable = book.balance + self.overdraft();
        if amount > spendable {
            let deficit = amount - spendable;
            let remaining = self.remaining_cover(book);
            if remaining < deficit {
                return Err(LedgerError::InsufficientFunds {
                    account_id: self.id.clone(),
                    requested:  amount,
                    available:  spendable + remaining,
                });
            }
            book.balance += deficit;
            book.insurance_used += deficit;
            insured = deficit;
            pending.push(self.notification(
                "insurance_cover",
                format!("Insurance covered {deficit:.2} for account {}", self.id),
            ));
        }

        let old = book.balance;
        book.balance -= amount;
        pending.push(self.notification(
            "withdraw",
            format!("Withdraw {amount:.2} (old: {old:.2} -> new: {:.2})", book.balance),
        ));
        Ok((pending, insured))
    }

    fn blocked(&self, reason: &str) -> LedgerError {
        LedgerError::InvalidState {
            account_id: self.id.clone(),
            reason:     reason.to_string(),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────
    // Administrative transitions always succeed.

    pub fn state(&self) -> AccountState {
        self.book.lock().state
    }

    pub fn set_state(&self, state: AccountState) {
        let previous = std::mem::replace(&mut self.book.lock().state, state);
        if previous != state {
            log::info!("account {}: {previous} -> {state}", self.id);
        }
    }

    pub fn freeze(&self)  { self.set_state(AccountState::Frozen);    }
    pub fn suspend(&self) { self.set_state(AccountState::Suspended); }
    pub fn close(&self)   { self.set_state(AccountState::Closed);    }
    pub fn reopen(&self)  { self.set_state(AccountState::Active);    }

    // ── Observers ─────────────────────────────────────────────────

    /// Register an observer. Registering the same observer twice is a no-op.
    pub fn add_observer(&self, observer: Arc<dyn AccountObserver>) {
        let mut observers = self.observers.write();
        if !observers.iter().any(|o| same_observer(o, &observer)) {
            observers.push(observer);
        }
    }

    pub fn remove_observer(&self, observer: &Arc<dyn AccountObserver>) {
        self.observers.write().retain(|o| !same_observer(o, observer));
    }

    pub fn notify(&self, event: &str, message: &str) {
        self.dispatch(&[self.notification(event, message.to_string())]);
    }

    fn notification(&self, event: &str, message: String) -> Notification {
        Notification {
            account_id:   self.id.clone(),
            account_name: self.name.clone(),
            event:        event.to_string(),
            message,
        }
    }

    fn dispatch(&self, pending: &[Notification]) {
        if pending.is_empty() {
            return;
        }
        // Snapshot so an observer may (un)register observers while notified.
        let observers: Vec<_> = self.observers.read().iter().cloned().collect();
        for notification in pending {
            for observer in &observers {
                observer.update(notification);
            }
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let book = self.book.lock();
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &book.state)
            .field("balance", &book.balance)
            .field("capabilities", &self.capabilities)
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

fn ensure_positive(amount: Money) -> LedgerResult<()> {
    if amount <= Money::ZERO {
        return Err(LedgerError::invalid_argument(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}
