//! Account Store Errors

use uuid::Uuid;

/// Errors that can occur in the account store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Account or other row does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Conditional debit refused
    #[error("Insufficient funds on account {account_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account_id: Uuid,
        balance: i64,
        requested: i64,
    },

    /// Unique constraint violated (e.g. username taken)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A unit of work touched an account it did not lock
    #[error("Account {0} is not enlisted in this unit of work")]
    NotEnlisted(Uuid),

    /// Balance or quantity would leave the representable range
    #[error("Arithmetic overflow on account {0}")]
    Overflow(Uuid),

    /// Row data violates a domain invariant
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn account_not_found(account_id: Uuid) -> Self {
        StoreError::NotFound {
            entity: "account",
            key: account_id.to_string(),
        }
    }

    /// Check if this error is a unique-constraint conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Map sqlx errors, surfacing unique violations as `Conflict`
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Conflict(db_err.message().to_string());
        }
    }
    StoreError::Database(err)
}
