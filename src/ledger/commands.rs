//! Command definitions
//!
//! Commands represent intentions to change balances.

use serde::{Deserialize, Serialize};

use crate::domain::AccountId;

/// Command to move coins from one account to another
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    /// Authenticated sender
    pub from_account_id: AccountId,
    /// Recipient username, resolved by the engine
    pub to_username: String,
    /// Raw amount; validated by the engine
    pub amount: i64,
}

impl TransferCommand {
    pub fn new(from_account_id: AccountId, to_username: impl Into<String>, amount: i64) -> Self {
        Self {
            from_account_id,
            to_username: to_username.into(),
            amount,
        }
    }
}

/// Command to buy one catalog item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseCommand {
    pub account_id: AccountId,
    pub item_key: String,
}

impl PurchaseCommand {
    pub fn new(account_id: AccountId, item_key: impl Into<String>) -> Self {
        Self {
            account_id,
            item_key: item_key.into(),
        }
    }
}
