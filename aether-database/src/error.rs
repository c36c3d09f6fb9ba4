use thiserror::Error;

/// Failures surfaced by a ledger store.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("invalid user id `{0}`")]
    InvalidUser(String),

    #[error("stored {0} is out of range")]
    OutOfRange(&'static str),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
