//! Interest policies. Pure arithmetic on `Money`; accounts decide when to
//! apply them.

use crate::{
    error::{LedgerError, LedgerResult},
    types::Money,
};
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};

const MONTHS_PER_YEAR: u64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterestPolicy {
    /// `principal × rate × months / 12`.
    Simple { yearly_rate_pct: Money },
    /// `principal × ((1 + rate / n)^(n × months / 12) − 1)`.
    Compound { yearly_rate_pct: Money, compounds_per_year: u32 },
}

impl InterestPolicy {
    pub fn simple(yearly_rate_pct: Money) -> Self {
        Self::Simple { yearly_rate_pct }
    }

    pub fn compound(yearly_rate_pct: Money, compounds_per_year: u32) -> Self {
        Self::Compound { yearly_rate_pct, compounds_per_year }
    }

    pub fn yearly_rate_pct(&self) -> Money {
        match *self {
            Self::Simple { yearly_rate_pct } | Self::Compound { yearly_rate_pct, .. } => yearly_rate_pct,
        }
    }

    /// Interest earned by `principal` over `months`, rounded to cents.
    /// A principal of zero or less earns nothing.
    pub fn interest_on(&self, principal: Money, months: u32) -> LedgerResult<Money> {
        let rate = self.yearly_rate_pct();
        if rate < Money::ZERO {
            return Err(LedgerError::invalid_argument(format!(
                "interest rate must not be negative, got {rate}"
            )));
        }
        if principal <= Money::ZERO || months == 0 {
            return Ok(Money::ZERO);
        }

        let yearly = rate / Money::ONE_HUNDRED;
        let interest = match *self {
            Self::Simple { .. } => {
                principal * yearly * Money::from(months) / Money::from(MONTHS_PER_YEAR)
            }
            Self::Compound { compounds_per_year, .. } => {
                if compounds_per_year == 0 {
                    return Err(LedgerError::invalid_argument(
                        "compounds per year must be at least 1",
                    ));
                }
                let base = Money::ONE + yearly / Money::from(compounds_per_year);
                let periods = u64::from(compounds_per_year) * u64::from(months);
                let factor = if periods % MONTHS_PER_YEAR == 0 {
                    base.checked_powu(periods / MONTHS_PER_YEAR)
                } else {
                    base.checked_powd(Money::from(periods) / Money::from(MONTHS_PER_YEAR))
                };
                let factor = factor
                    .ok_or_else(|| LedgerError::invalid_argument("interest computation overflowed"))?;
                principal * (factor - Money::ONE)
            }
        };
        Ok(interest.round_dp(2))
    }
}
