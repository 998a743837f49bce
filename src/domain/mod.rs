//! Domain module
//!
//! Core domain types: coin amounts, the catalog, ledger records and errors.

pub mod amount;
pub mod catalog;
pub mod error;
pub mod model;

pub use amount::{Amount, AmountError, Balance, MAX_AMOUNT};
pub use catalog::{Catalog, CatalogError, CatalogItem};
pub use error::LedgerError;
pub use model::{
    Account, AccountId, InventoryEntry, LedgerRecord, NewAccount, NewLedgerRecord, OwnedItem,
    RecordKind, TransferEntry, UserView,
};
