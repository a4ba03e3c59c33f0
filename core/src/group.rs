//! Account groups: several accounts handled as one.
//!
//! A group owns no money. Its balance is the sum of its members', and
//! deposits and withdrawals are split across members:
//!
//! ```text
//!   deposit   Even           amount / n per member, remainder cents to the last
//!             SingleTarget   the whole amount to one named member
//!   withdraw  sequential     drain members in insertion order, each up to its
//!                            balance; loans and blocked members are passed over
//! ```
//!
//! A split either lands completely or not at all. Legs already applied are
//! reversed when a later leg fails.
//!
//! Groups are not transaction endpoints. The executor and the scheduler
//! only ever see single accounts.

use crate::{
    account::{Account, AccountKind},
    account_state::AccountState,
    error::{LedgerError, LedgerResult},
    observer::AccountObserver,
    types::{AccountId, Money},
};
use parking_lot::RwLock;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositSplit {
    #[default]
    Even,
    SingleTarget(AccountId),
}

pub struct AccountGroup {
    id:            AccountId,
    name:          String,
    deposit_split: DepositSplit,
    members:       RwLock<Vec<Arc<Account>>>,
}

impl AccountGroup {
    pub fn new(id: impl Into<AccountId>, name: impl Into<String>) -> Self {
        Self {
            id:            id.into(),
            name:          name.into(),
            deposit_split: DepositSplit::default(),
            members:       RwLock::new(Vec::new()),
        }
    }

    pub fn with_deposit_split(mut self, split: DepositSplit) -> Self {
        self.deposit_split = split;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deposit_split(&self) -> &DepositSplit {
        &self.deposit_split
    }

    // ── Membership ────────────────────────────────────────────────

    pub fn add_member(&self, account: Arc<Account>) -> LedgerResult<()> {
        let mut members = self.members.write();
        if members.iter().any(|m| m.id() == account.id()) {
            return Err(LedgerError::invalid_argument(format!(
                "account {} is already in group {}",
                account.id(),
                self.id
            )));
        }
        log::info!("group {}: added {}", self.id, account.id());
        members.push(account);
        Ok(())
    }

    pub fn remove_member(&self, account_id: &str) -> Option<Arc<Account>> {
        let mut members = self.members.write();
        let index = members.iter().position(|m| m.id() == account_id)?;
        log::info!("group {}: removed {account_id}", self.id);
        Some(members.remove(index))
    }

    /// Members in insertion order.
    pub fn members(&self) -> Vec<Arc<Account>> {
        self.members.read().clone()
    }

    pub fn contains(&self, account_id: &str) -> bool {
        self.members.read().iter().any(|m| m.id() == account_id)
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    // ── Aggregates ────────────────────────────────────────────────

    pub fn balance(&self) -> Money {
        self.members.read().iter().map(|m| m.balance()).sum()
    }

    /// Most restrictive member state: CLOSED, then FROZEN, then SUSPENDED.
    /// An empty group is ACTIVE.
    pub fn state(&self) -> AccountState {
        let states: Vec<AccountState> = self.members.read().iter().map(|m| m.state()).collect();
        [AccountState::Closed, AccountState::Frozen, AccountState::Suspended]
            .into_iter()
            .find(|s| states.contains(s))
            .unwrap_or(AccountState::Active)
    }

    // ── Money movement ────────────────────────────────────────────

    pub fn deposit(&self, amount: Money) -> LedgerResult<()> {
        ensure_positive(amount)?;
        let members = self.members();
        let legs = self.deposit_legs(&members, amount)?;

        let mut applied: Vec<(&Arc<Account>, Money)> = Vec::with_capacity(legs.len());
        for (member, part) in legs {
            if let Err(e) = member.deposit(part) {
                for (done, done_part) in applied.iter().rev() {
                    done.reverse_credit(*done_part);
                }
                log::warn!("group {}: deposit leg on {} failed, split undone: {e}", self.id, member.id());
                return Err(e);
            }
            applied.push((member, part));
        }
        log::info!("group {}: deposited {amount:.2} over {} member(s)", self.id, applied.len());
        Ok(())
    }

    pub fn withdraw(&self, amount: Money) -> LedgerResult<()> {
        ensure_positive(amount)?;
        let members = self.members();

        let mut remaining = amount;
        let mut legs = Vec::new();
        for member in &members {
            if remaining.is_zero() {
                break;
            }
            if member.kind() == AccountKind::Loan || !member.state().can_be_source() {
                continue;
            }
            let balance = member.balance();
            if balance <= Money::ZERO {
                continue;
            }
            let take = balance.min(remaining);
            legs.push((member, take));
            remaining -= take;
        }
        if remaining > Money::ZERO {
            return Err(LedgerError::InsufficientFunds {
                account_id: self.id.clone(),
                requested:  amount,
                available:  amount - remaining,
            });
        }

        let mut applied: Vec<(&Arc<Account>, Money, Money)> = Vec::with_capacity(legs.len());
        for (member, part) in legs {
            match member.withdraw_tracked(part) {
                Ok(insured) => applied.push((member, part, insured)),
                Err(e) => {
                    for (done, done_part, insured) in applied.iter().rev() {
                        done.reverse_debit(*done_part, *insured);
                    }
                    log::warn!("group {}: withdraw leg on {} failed, split undone: {e}", self.id, member.id());
                    return Err(e);
                }
            }
        }
        log::info!("group {}: withdrew {amount:.2} from {} member(s)", self.id, applied.len());
        Ok(())
    }

    fn deposit_legs<'a>(
        &self,
        members: &'a [Arc<Account>],
        amount: Money,
    ) -> LedgerResult<Vec<(&'a Arc<Account>, Money)>> {
        match &self.deposit_split {
            DepositSplit::Even => {
                let Some((last, rest)) = members.split_last() else {
                    return Err(LedgerError::invalid_argument(format!(
                        "group {} has no members",
                        self.id
                    )));
                };
                let share = (amount / Money::from(members.len()))
                    .round_dp_with_strategy(2, RoundingStrategy::ToZero);
                let remainder = amount - share * Money::from(rest.len());
                Ok(rest
                    .iter()
                    .map(|m| (m, share))
                    .chain(std::iter::once((last, remainder)))
                    .filter(|(_, part)| *part > Money::ZERO)
                    .collect())
            }
            DepositSplit::SingleTarget(target) => members
                .iter()
                .find(|m| m.id() == target.as_str())
                .map(|m| vec![(m, amount)])
                .ok_or_else(|| {
                    LedgerError::invalid_argument(format!(
                        "deposit target {target} is not a member of group {}",
                        self.id
                    ))
                }),
        }
    }

    // ── Fan-out ───────────────────────────────────────────────────

    pub fn set_state(&self, state: AccountState) {
        for member in self.members() {
            member.set_state(state);
        }
    }

    pub fn freeze(&self)  { self.set_state(AccountState::Frozen);    }
    pub fn suspend(&self) { self.set_state(AccountState::Suspended); }
    pub fn close(&self)   { self.set_state(AccountState::Closed);    }
    pub fn reopen(&self)  { self.set_state(AccountState::Active);    }

    pub fn add_observer(&self, observer: Arc<dyn AccountObserver>) {
        for member in self.members() {
            member.add_observer(Arc::clone(&observer));
        }
    }

    pub fn remove_observer(&self, observer: &Arc<dyn AccountObserver>) {
        for member in self.members() {
            member.remove_observer(observer);
        }
    }
}

impl fmt::Debug for AccountGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.members.read().iter().map(|m| m.id().to_string()).collect();
        f.debug_struct("AccountGroup")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("deposit_split", &self.deposit_split)
            .field("members", &ids)
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
