//! Shared primitive types used across the entire ledger.

use rust_decimal::Decimal;

/// Amounts and balances. Single currency, signed.
pub type Money = Decimal;

/// A stable, unique identifier for an account.
pub type AccountId = String;

/// Identifier of a recurring transaction template.
pub type RecurringId = String;

/// Render an optional account id the way audit lines show it.
pub fn display_id(id: Option<&str>) -> &str {
    id.unwrap_or("external")
}
