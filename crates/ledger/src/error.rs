use thiserror::Error;

use accrual_core::{DomainError, HolderId};

use crate::rate::Rate;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("rate change rejected: {requested} is not below the current global rate {current}")]
    RateIncreaseRejected { current: Rate, requested: Rate },

    #[error("insufficient balance for {holder}: available {available}, requested {requested}")]
    InsufficientBalance {
        holder: HolderId,
        available: u128,
        requested: u128,
    },

    #[error("insufficient allowance: {spender} may move {allowance} of {owner}'s units, requested {requested}")]
    InsufficientAllowance {
        owner: HolderId,
        spender: HolderId,
        allowance: u128,
        requested: u128,
    },

    #[error("arithmetic overflow computing {0}")]
    ArithmeticOverflow(&'static str),

    #[error("ledger is not initialized")]
    NotInitialized,

    #[error("ledger is already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::validation(msg))
    }
}
