use crate::domain::account::{AccountId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("account {0} not found")]
    AccountNotFound(AccountId),
    #[error("user {0} has no bank account")]
    NoAccountForUser(UserId),
    #[error("user {0} already has a bank account")]
    AccountExists(UserId),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("description is {0} characters long, the limit is 255")]
    InvalidDescription(usize),
    #[error("insufficient funds in account {account_id}: need {required}, have {available}")]
    InsufficientFunds {
        account_id: AccountId,
        required: Decimal,
        available: Decimal,
    },
    #[error("account {0} was modified concurrently")]
    ConcurrentModification(AccountId),
    #[error("persistence failure: {0}")]
    Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid bid: {0}")]
    InvalidBid(String),
    #[error("unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },
    #[error("job '{0}' is already running")]
    JobAlreadyRunning(&'static str),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn persistence(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Persistence(message.into())
    }

    pub fn not_found(entity: &'static str, id: u64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Failures the caller may retry after rolling back.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::ConcurrentModification(_)
        )
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(error: serde_json::Error) -> Self {
        Self::Persistence(Box::new(error))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(error: rocksdb::Error) -> Self {
        Self::Persistence(Box::new(error))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
