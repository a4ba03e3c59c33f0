//! Ledger configuration, read from a single JSON file.
//!
//! Every field has a default, so `{}` is a valid config file.

use crate::{account::DEFAULT_CHECKING_OVERDRAFT, types::Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub auto_limit:    Money,
    pub manager_limit: Money,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            auto_limit:    Decimal::from(500),
            manager_limit: Decimal::from(2000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum gap between two reports of the same skip reason.
    pub skip_cooldown_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { skip_cooldown_secs: 24 * 60 * 60 }
    }
}

impl SchedulerConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.skip_cooldown_secs).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountDefaults {
    pub checking_overdraft: Money,
}

impl Default for AccountDefaults {
    fn default() -> Self {
        Self { checking_overdraft: DEFAULT_CHECKING_OVERDRAFT }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub approval:  ApprovalConfig,
    pub scheduler: SchedulerConfig,
    pub accounts:  AccountDefaults,
}

impl LedgerConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let config: LedgerConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let ApprovalConfig { auto_limit, manager_limit } = &self.approval;
        if *auto_limit < Money::ZERO || *manager_limit < Money::ZERO {
            anyhow::bail!("approval limits must not be negative");
        }
        if auto_limit > manager_limit {
            log::warn!(
                "auto-approval limit {auto_limit} exceeds manager limit {manager_limit}; \
                 manager approval will never be reached"
            );
        }
        if self.accounts.checking_overdraft < Money::ZERO {
            anyhow::bail!("checking overdraft must not be negative");
        }
        Ok(())
    }
}
