//! Ledger module
//!
//! The transaction engine (transfers, purchases) and the read-only history
//! aggregator built on top of the account store.

mod commands;
mod engine;
mod history;


pub use commands::{PurchaseCommand, TransferCommand};
pub use engine::LedgerEngine;
pub use history::{HistoryService, UNKNOWN_COUNTERPARTY};
