use crate::types::{AccountId, Money};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Account {account_id}: {reason}")]
    InvalidState { account_id: AccountId, reason: String },

    #[error("Insufficient funds on {account_id}: requested {requested}, available {available}")]
    InsufficientFunds {
        account_id: AccountId,
        requested:  Money,
        available:  Money,
    },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument { reason: reason.into() }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration { reason: reason.into() }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
