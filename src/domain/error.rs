//! Ledger Error Types
//!
//! Errors returned by the ledger engine and history aggregator.
//! They are independent of the web/infrastructure layer.

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced to ledger callers.
///
/// Every variant except `Internal` is raised before any state is mutated.
/// `Internal` keeps the storage detail for logging; its `Display` stays generic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Account, recipient or other entity does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Transfer amount is zero or negative
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Sender and recipient are the same account
    #[error("Cannot transfer coins to yourself")]
    SelfTransferNotAllowed,

    /// Balance does not cover the debit
    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: i64, required: i64 },

    /// Item key is not in the catalog
    #[error("Unknown item: {0}")]
    UnknownItem(String),

    /// Storage or transport failure
    #[error("Internal error")]
    Internal(String),
}

impl LedgerError {
    /// Recipient name could not be resolved
    pub fn recipient_not_found(username: &str) -> Self {
        Self::NotFound {
            entity: "recipient",
            key: username.to_string(),
        }
    }

    /// Account id could not be resolved
    pub fn account_not_found(account_id: uuid::Uuid) -> Self {
        Self::NotFound {
            entity: "account",
            key: account_id.to_string(),
        }
    }

    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::SelfTransferNotAllowed => "self_transfer_not_allowed",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::UnknownItem(_) => "unknown_item",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, key } => Self::NotFound { entity, key },
            StoreError::InsufficientFunds {
                balance, requested, ..
            } => Self::InsufficientFunds {
                balance,
                required: requested,
            },
            other => {
                tracing::error!(error = %other, "Storage failure");
                Self::Internal(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_insufficient_funds_error() {
        let err = LedgerError::InsufficientFunds {
            balance: 20,
            required: 80,
        };

        assert!(err.is_client_error());
        assert_eq!(err.code(), "insufficient_funds");
        assert!(err.to_string().contains("20"));
        assert!(err.to_string().contains("80"));
    }

    #[test]
    fn test_internal_error_hides_detail() {
        let err = LedgerError::Internal("connection reset by peer".to_string());

        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "Internal error");
    }

    #[test]
    fn test_store_error_conversion() {
        let account_id = Uuid::new_v4();
        let err: LedgerError = StoreError::InsufficientFunds {
            account_id,
            balance: 5,
            requested: 10,
        }
        .into();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                balance: 5,
                required: 10
            }
        );

        let err: LedgerError = StoreError::NotEnlisted(account_id).into();
        assert_eq!(err.code(), "internal_error");
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            LedgerError::recipient_not_found("bob"),
            LedgerError::InvalidAmount(0),
            LedgerError::SelfTransferNotAllowed,
            LedgerError::InsufficientFunds {
                balance: 0,
                required: 1,
            },
            LedgerError::UnknownItem("yacht".to_string()),
            LedgerError::Internal(String::new()),
        ];
        let mut codes: Vec<_> = errors.iter().map(LedgerError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
