//! Collaborators the ledger consumes but does not own: account and group
//! lookup, and caller authorization.
//!
//! The ledger never authenticates anyone. Callers check `Authorizer`
//! before they call `process` or `schedule_recurring`.

use crate::{
    account::{Account, AccountKind},
    config::AccountDefaults,
    error::{LedgerError, LedgerResult},
    group::{AccountGroup, DepositSplit},
    types::{AccountId, Money},
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use uuid::Uuid;

pub trait AccountLookup: Send + Sync {
    fn find(&self, id: &str) -> Option<Arc<Account>>;
}

/// In-memory account directory keyed by id.
///
/// Ids are generated when the caller does not ask for one. Owner names
/// are unique, compared case-insensitively after trimming.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    defaults: AccountDefaults,
    inner:    RwLock<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    accounts: HashMap<AccountId, Arc<Account>>,
    owners:   HashSet<String>,
    groups:   HashMap<AccountId, Arc<AccountGroup>>,
}

impl AccountRegistry {
    pub fn new(defaults: AccountDefaults) -> Self {
        Self {
            defaults,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Open a new ACTIVE account.
    pub fn open(
        &self,
        requested_id: Option<&str>,
        owner: &str,
        kind: AccountKind,
        opening_balance: Money,
    ) -> LedgerResult<Arc<Account>> {
        let owner_key = owner.trim().to_lowercase();
        if owner_key.is_empty() {
            return Err(LedgerError::invalid_argument("owner name must not be blank"));
        }

        let id = match requested_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let mut inner = self.inner.write();
        if inner.owners.contains(&owner_key) {
            return Err(LedgerError::invalid_argument(format!(
                "account owner name already exists: {owner}"
            )));
        }
        if inner.accounts.contains_key(&id) {
            return Err(LedgerError::invalid_argument(format!("account id already exists: {id}")));
        }

        let account = Account::new(id.clone(), owner.trim(), kind, opening_balance);
        let account = match kind {
            AccountKind::Checking => account.with_overdraft(self.defaults.checking_overdraft),
            AccountKind::Savings | AccountKind::Investment | AccountKind::Loan => account,
        };
        let account = Arc::new(account);

        inner.owners.insert(owner_key);
        inner.accounts.insert(id.clone(), Arc::clone(&account));
        log::info!("opened {kind:?} account {id} for {}", owner.trim());
        Ok(account)
    }

    /// Register an account built elsewhere.
    pub fn insert(&self, account: Arc<Account>) -> LedgerResult<()> {
        let owner_key = account.name().trim().to_lowercase();
        let mut inner = self.inner.write();
        if inner.accounts.contains_key(account.id()) {
            return Err(LedgerError::invalid_argument(format!(
                "account id already exists: {}",
                account.id()
            )));
        }
        if inner.owners.contains(&owner_key) {
            return Err(LedgerError::invalid_argument(format!(
                "account owner name already exists: {}",
                account.name()
            )));
        }
        inner.owners.insert(owner_key);
        inner.accounts.insert(account.id().to_string(), account);
        Ok(())
    }

    pub fn exists_by_id(&self, id: &str) -> bool {
        self.inner.read().accounts.contains_key(id)
    }

    pub fn exists_by_owner(&self, owner: &str) -> bool {
        self.inner.read().owners.contains(&owner.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.inner.read().accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().accounts.is_empty()
    }

    /// All accounts, ordered by id.
    pub fn all(&self) -> Vec<Arc<Account>> {
        let mut accounts: Vec<_> = self.inner.read().accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.id().cmp(b.id()));
        accounts
    }

    // ── Groups ────────────────────────────────────────────────────

    /// Create an empty group. Group ids share a namespace with account ids.
    pub fn create_group(
        &self,
        requested_id: Option<&str>,
        name: &str,
        split: DepositSplit,
    ) -> LedgerResult<Arc<AccountGroup>> {
        let id = match requested_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let mut inner = self.inner.write();
        if inner.groups.contains_key(&id) || inner.accounts.contains_key(&id) {
            return Err(LedgerError::invalid_argument(format!("id already exists: {id}")));
        }
        let group = Arc::new(AccountGroup::new(id.clone(), name.trim()).with_deposit_split(split));
        inner.groups.insert(id.clone(), Arc::clone(&group));
        log::info!("created group {id} ({})", name.trim());
        Ok(group)
    }

    pub fn group(&self, id: &str) -> Option<Arc<AccountGroup>> {
        self.inner.read().groups.get(id).cloned()
    }

    /// All groups, ordered by id.
    pub fn groups(&self) -> Vec<Arc<AccountGroup>> {
        let mut groups: Vec<_> = self.inner.read().groups.values().cloned().collect();
        groups.sort_by(|a, b| a.id().cmp(b.id()));
        groups
    }

    pub fn add_to_group(&self, group_id: &str, account_id: &str) -> LedgerResult<()> {
        let (group, account) = {
            let inner = self.inner.read();
            (inner.groups.get(group_id).cloned(), inner.accounts.get(account_id).cloned())
        };
        let group = group
            .ok_or_else(|| LedgerError::invalid_argument(format!("no such group: {group_id}")))?;
        let account = account
            .ok_or_else(|| LedgerError::invalid_argument(format!("no such account: {account_id}")))?;
        group.add_member(account)
    }

    /// Returns whether the account was a member.
    pub fn remove_from_group(&self, group_id: &str, account_id: &str) -> LedgerResult<bool> {
        let group = self
            .group(group_id)
            .ok_or_else(|| LedgerError::invalid_argument(format!("no such group: {group_id}")))?;
        Ok(group.remove_member(account_id).is_some())
    }
}

impl AccountLookup for AccountRegistry {
    fn find(&self, id: &str) -> Option<Arc<Account>> {
        self.inner.read().accounts.get(id).cloned()
    }
}

// ── Authorization ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Teller,
    Manager,
    Admin,
}

pub trait Authorizer: Send + Sync {
    fn authorize(&self, user_id: &str, required: Role) -> bool;
}

/// Static user → role table.
///
/// ADMIN passes everything. Any known user passes CUSTOMER. TELLER needs
/// TELLER or MANAGER. MANAGER needs MANAGER. Unknown users pass nothing.
#[derive(Debug, Default)]
pub struct RoleTable {
    users: RwLock<HashMap<String, Role>>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: impl Into<String>, role: Role) {
        self.users.write().insert(user_id.into(), role);
    }
}

impl Authorizer for RoleTable {
    fn authorize(&self, user_id: &str, required: Role) -> bool {
        let Some(role) = self.users.read().get(user_id).copied() else {
            return false;
        };
        match (role, required) {
            (Role::Admin, _) => true,
            (_, Role::Customer) => true,
            (Role::Teller | Role::Manager, Role::Teller) => true,
            (Role::Manager, Role::Manager) => true,
            _ => false,
        }
    }
}
