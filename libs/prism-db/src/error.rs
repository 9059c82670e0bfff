use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The idempotency key was already processed to completion. Benign under
    /// webhook redelivery; callers treat it as "stop, nothing to do".
    #[error("payment key already completed")]
    DuplicateKey,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("account not found")]
    AccountNotFound,

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
