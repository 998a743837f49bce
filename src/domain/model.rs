//! Ledger data model
//!
//! Accounts, owned items and the append-only ledger records, plus the
//! read-side user view assembled by the history aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Amount, Balance};

/// Opaque account identifier
pub type AccountId = Uuid;

/// A user account with its coin balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub balance: Balance,
    /// Coins granted at provisioning; the starting point for reconciliation
    pub initial_balance: Balance,
    pub created_at: DateTime<Utc>,
}

/// Data required to provision an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: AccountId,
    pub username: String,
    pub password_hash: String,
    pub initial_balance: Balance,
}

impl NewAccount {
    pub fn new(username: String, password_hash: String, initial_balance: Balance) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            password_hash,
            initial_balance,
        }
    }
}

/// Quantity of one catalog item held by an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedItem {
    pub account_id: AccountId,
    pub item_id: i64,
    pub quantity: i64,
}

/// Kind of a ledger record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Transfer,
    Purchase,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Transfer => "transfer",
            RecordKind::Purchase => "purchase",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transfer" => Ok(RecordKind::Transfer),
            "purchase" => Ok(RecordKind::Purchase),
            other => Err(format!("unknown record kind: {other}")),
        }
    }
}

/// Immutable audit entry for one balance-affecting event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Monotonic, assigned at insert
    pub id: i64,
    pub kind: RecordKind,
    pub from_account_id: AccountId,
    /// Present only for transfers
    pub to_account_id: Option<AccountId>,
    pub amount: Amount,
    /// Present only for purchases
    pub item_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A ledger record before the store has assigned its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerRecord {
    pub kind: RecordKind,
    pub from_account_id: AccountId,
    pub to_account_id: Option<AccountId>,
    pub amount: Amount,
    pub item_key: Option<String>,
}

impl NewLedgerRecord {
    pub fn transfer(from: AccountId, to: AccountId, amount: Amount) -> Self {
        Self {
            kind: RecordKind::Transfer,
            from_account_id: from,
            to_account_id: Some(to),
            amount,
            item_key: None,
        }
    }

    pub fn purchase(account_id: AccountId, price: Amount, item_key: &str) -> Self {
        Self {
            kind: RecordKind::Purchase,
            from_account_id: account_id,
            to_account_id: None,
            amount: price,
            item_key: Some(item_key.to_string()),
        }
    }

    /// Accounts this record touches
    pub fn accounts(&self) -> impl Iterator<Item = AccountId> {
        std::iter::once(self.from_account_id).chain(self.to_account_id)
    }
}

/// Owned item resolved to its catalog name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryEntry {
    pub name: String,
    pub quantity: i64,
}

/// One side of a transfer as seen by the viewing account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferEntry {
    pub record_id: i64,
    /// Username of the other party, or the "unknown" sentinel
    pub counterparty: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// User-facing view of balance, inventory and transfer history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub account_id: AccountId,
    pub balance: Balance,
    pub inventory: Vec<InventoryEntry>,
    /// Newest first
    pub received: Vec<TransferEntry>,
    /// Newest first
    pub sent: Vec<TransferEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_parse() {
        assert_eq!("transfer".parse::<RecordKind>(), Ok(RecordKind::Transfer));
        assert_eq!("purchase".parse::<RecordKind>(), Ok(RecordKind::Purchase));
        assert!("refund".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_record_kind_serialization() {
        let json = serde_json::to_string(&RecordKind::Purchase).unwrap();
        assert_eq!(json, r#""purchase""#);
    }

    #[test]
    fn test_new_records_shape() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let amount = Amount::new(10).unwrap();

        let transfer = NewLedgerRecord::transfer(a, b, amount);
        assert_eq!(transfer.to_account_id, Some(b));
        assert!(transfer.item_key.is_none());
        assert_eq!(transfer.accounts().collect::<Vec<_>>(), vec![a, b]);

        let purchase = NewLedgerRecord::purchase(a, amount, "cup");
        assert!(purchase.to_account_id.is_none());
        assert_eq!(purchase.item_key.as_deref(), Some("cup"));
        assert_eq!(purchase.accounts().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn test_account_never_serializes_password_hash() {
        let account = Account {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            balance: Balance::new(10).unwrap(),
            initial_balance: Balance::new(10).unwrap(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("secret"));
    }
}
