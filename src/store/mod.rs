//! Account Store
//!
//! Persistence for accounts, owned items and ledger records.
//! Two interchangeable backends implement the same contract:
//! PostgreSQL (`PgStore`) and an in-process store (`MemoryStore`).
//!
//! Multi-step mutations go through a [`UnitOfWork`]: `begin` locks every
//! account the unit will touch, in ascending id order, so two units can
//! never deadlock. Dropping an unfinished unit rolls it back.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;

use crate::domain::{
    Account, AccountId, Balance, LedgerRecord, NewAccount, NewLedgerRecord, OwnedItem, RecordKind,
};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Single-account operations
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account. Fails with `Conflict` when the username is taken.
    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError>;

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError>;

    async fn find_account_by_username(&self, username: &str)
        -> Result<Option<Account>, StoreError>;

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    async fn get_balance(&self, id: AccountId) -> Result<Balance, StoreError>;

    /// Atomic conditional adjust: a negative delta applies only when the
    /// balance covers it.
    async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<Balance, StoreError>;

    /// Owned items ordered by catalog id; empty when the account owns nothing.
    /// Fails with `NotFound` for an unknown account.
    async fn owned_items(&self, id: AccountId) -> Result<Vec<OwnedItem>, StoreError>;
}

/// Transactional ledger operations
#[async_trait]
pub trait LedgerStore: AccountStore {
    /// Open a unit of work holding exclusive locks on `accounts`.
    /// Unknown accounts fail with `NotFound` before anything is locked for long.
    async fn begin(&self, accounts: &[AccountId]) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Records where the account is source or destination, newest first
    async fn records_for(
        &self,
        id: AccountId,
        kind: Option<RecordKind>,
    ) -> Result<Vec<LedgerRecord>, StoreError>;
}

/// An atomic group of ledger mutations
#[async_trait]
pub trait UnitOfWork: Send {
    async fn adjust_balance(&mut self, id: AccountId, delta: i64) -> Result<Balance, StoreError>;

    /// Insert the item with quantity 1 or increment it; returns the new quantity
    async fn add_owned_item(&mut self, id: AccountId, item_id: i64) -> Result<i64, StoreError>;

    async fn append_record(&mut self, record: NewLedgerRecord)
        -> Result<LedgerRecord, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Sorted, de-duplicated lock order
pub(crate) fn lock_order(accounts: &[AccountId]) -> Vec<AccountId> {
    let mut ids = accounts.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}
