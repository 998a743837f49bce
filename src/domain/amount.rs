//! Amount type
//!
//! Domain primitives for coin amounts and balances.
//! Coins are whole numbers; amounts are validated at construction time, so an
//! invalid value cannot reach the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum allowed amount or balance (1 trillion coins)
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Amount represents a validated, positive number of coins.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum value is 1 trillion coins
///
/// # Example
/// ```
/// use coin_shop::domain::Amount;
///
/// let amount = Amount::new(100).unwrap();
/// assert_eq!(amount.value(), 100);
/// assert!(Amount::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount or moving a Balance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(i64),

    #[error("Balance cannot be negative (got {0})")]
    Negative(i64),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::Overflow` if value > 1 trillion
    pub fn new(value: i64) -> Result<Self, AmountError> {
        if value <= 0 {
            return Err(AmountError::NotPositive(value));
        }
        if value > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }
        Ok(Self(value))
    }

    /// Get the underlying coin count.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// The signed delta that removes this amount from a balance.
    pub fn as_debit(&self) -> i64 {
        -self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Balance represents an account balance (zero or positive).
/// Unlike Amount, Balance can be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Balance(i64);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(value: i64) -> Result<Self, AmountError> {
        if value < 0 {
            return Err(AmountError::Negative(value));
        }
        if value > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }
        Ok(Self(value))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(0)
    }

    /// Get the underlying value
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Apply a signed delta. Fails instead of producing a negative or
    /// out-of-range balance.
    pub fn apply_delta(&self, delta: i64) -> Result<Balance, AmountError> {
        let next = self.0.checked_add(delta).ok_or(AmountError::Overflow)?;
        Balance::new(next)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<i64> for Balance {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Balance::new(value)
    }
}

impl From<Balance> for i64 {
    fn from(balance: Balance) -> Self {
        balance.0
    }
}
