use crate::types::{Amount, UserId};
use crate::withdrawal::WithdrawalStatus;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Already recorded: {0}")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: Amount, available: Amount },

    #[error("User {0} is banned")]
    Banned(UserId),

    #[error("User {0} already has a pending withdrawal")]
    WithdrawalPending(UserId),

    #[error("Invalid withdrawal transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
