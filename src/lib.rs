//! coin_shop Library
//!
//! Coin ledger and purchase engine for a merch shop, with the HTTP
//! surface, identity and storage backends around it.
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod store;

pub use config::Config;
pub use domain::{Amount, AmountError, Balance, Catalog, LedgerError, LedgerRecord, UserView};
pub use error::{AppError, AppResult};
pub use ledger::{HistoryService, LedgerEngine, PurchaseCommand, TransferCommand};
