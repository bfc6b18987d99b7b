use thiserror::Error;
use tracing::error;

/// Errors reported by a [`crate::store::RewardsStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record changed (or appeared) since it was read.
    #[error("write conflict on rewards record for {0}")]
    Conflict(String),

    /// The idempotency key was already applied for this user.
    #[error("award key {key} already applied for {user_id}")]
    DuplicateKey { user_id: String, key: String },

    #[error("rewards store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

/// Errors surfaced by the rewards ledger to its callers.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no rewards record for {0}")]
    NotFound(String),

    #[error("gave up on {user_id} after {attempts} conflicting writes")]
    Conflict { user_id: String, attempts: u32 },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Stored data breaks an invariant. Retrying will not help.
    #[error("corrupt rewards data: {0}")]
    Corrupt(String),
}

impl LedgerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        LedgerError::InvalidInput(msg.into())
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(user_id) => LedgerError::Conflict { user_id, attempts: 1 },
            StoreError::DuplicateKey { user_id, key } => {
                LedgerError::InvalidInput(format!("award key {key} already applied for {user_id}"))
            }
            StoreError::Unavailable(msg) => LedgerError::StoreUnavailable(msg),
            StoreError::Database(e) => LedgerError::StoreUnavailable(e.to_string()),
            StoreError::Corrupt(msg) => {
                error!(%msg, "corrupt rewards data");
                LedgerError::Corrupt(msg)
            }
        }
    }
}
