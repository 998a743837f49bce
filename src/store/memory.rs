//! In-memory Account Store
//!
//! Used for tests and for running without a database. Each account has its
//! own async mutex; a unit of work takes them in ascending id order, stages
//! its changes and publishes them under a single write lock on commit, so
//! readers only ever observe committed state.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::domain::{
    Account, AccountId, AmountError, Balance, LedgerRecord, NewAccount, NewLedgerRecord,
    OwnedItem, RecordKind,
};

use super::{lock_order, AccountStore, LedgerStore, StoreError, UnitOfWork};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    usernames: HashMap<String, AccountId>,
    owned_items: BTreeMap<(AccountId, i64), i64>,
    records: Vec<LedgerRecord>,
}

#[derive(Debug, Default)]
struct Shared {
    state: RwLock<MemoryState>,
    locks: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
    next_record_id: AtomicI64,
}

/// Process-local store with the same atomicity guarantees as `PgStore`
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed record, oldest first
    pub async fn all_records(&self) -> Vec<LedgerRecord> {
        let state = self.shared.state.read().await;
        let mut records = state.records.clone();
        records.sort_by_key(|r| r.id);
        records
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        let mut state = self.shared.state.write().await;

        if state.usernames.contains_key(&new.username) {
            return Err(StoreError::Conflict(format!(
                "username already taken: {}",
                new.username
            )));
        }
        if state.accounts.contains_key(&new.id) {
            return Err(StoreError::Conflict(format!("account id already used: {}", new.id)));
        }

        let account = Account {
            id: new.id,
            username: new.username,
            password_hash: new.password_hash,
            balance: new.initial_balance,
            initial_balance: new.initial_balance,
            created_at: Utc::now(),
        };

        self.shared
            .locks
            .lock()
            .await
            .insert(account.id, Arc::new(Mutex::new(())));
        state.usernames.insert(account.username.clone(), account.id);
        state.accounts.insert(account.id, account.clone());

        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError> {
        let state = self.shared.state.read().await;
        state
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::account_not_found(id))
    }

    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, StoreError> {
        let state = self.shared.state.read().await;
        Ok(state
            .usernames
            .get(username)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let state = self.shared.state.read().await;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(accounts)
    }

    async fn get_balance(&self, id: AccountId) -> Result<Balance, StoreError> {
        let state = self.shared.state.read().await;
        state
            .accounts
            .get(&id)
            .map(|a| a.balance)
            .ok_or_else(|| StoreError::account_not_found(id))
    }

    async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<Balance, StoreError> {
        let mut unit = self.begin(&[id]).await?;
        let balance = unit.adjust_balance(id, delta).await?;
        unit.commit().await?;
        Ok(balance)
    }

    async fn owned_items(&self, id: AccountId) -> Result<Vec<OwnedItem>, StoreError> {
        let state = self.shared.state.read().await;
        if !state.accounts.contains_key(&id) {
            return Err(StoreError::account_not_found(id));
        }

        Ok(state
            .owned_items
            .range((id, i64::MIN)..=(id, i64::MAX))
            .map(|(&(account_id, item_id), &quantity)| OwnedItem {
                account_id,
                item_id,
                quantity,
            })
            .collect())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self, accounts: &[AccountId]) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let ids = lock_order(accounts);

        let handles = {
            let locks = self.shared.locks.lock().await;
            ids.iter()
                .map(|id| {
                    locks
                        .get(id)
                        .cloned()
                        .ok_or_else(|| StoreError::account_not_found(*id))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }

        Ok(Box::new(MemoryUnitOfWork {
            shared: Arc::clone(&self.shared),
            _guards: guards,
            enlisted: ids,
            balances: HashMap::new(),
            items: HashMap::new(),
            records: Vec::new(),
        }))
    }

    async fn records_for(
        &self,
        id: AccountId,
        kind: Option<RecordKind>,
    ) -> Result<Vec<LedgerRecord>, StoreError> {
        let state = self.shared.state.read().await;
        let mut records: Vec<LedgerRecord> = state
            .records
            .iter()
            .filter(|r| r.from_account_id == id || r.to_account_id == Some(id))
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(records)
    }
}

/// Staged changes plus the account locks that protect them.
/// Dropping the unit discards the stage and releases the locks.
struct MemoryUnitOfWork {
    shared: Arc<Shared>,
    _guards: Vec<OwnedMutexGuard<()>>,
    enlisted: Vec<AccountId>,
    balances: HashMap<AccountId, Balance>,
    items: HashMap<(AccountId, i64), i64>,
    records: Vec<LedgerRecord>,
}

impl MemoryUnitOfWork {
    fn ensure_enlisted(&self, id: AccountId) -> Result<(), StoreError> {
        if self.enlisted.binary_search(&id).is_ok() {
            Ok(())
        } else {
            Err(StoreError::NotEnlisted(id))
        }
    }

    async fn current_balance(&self, id: AccountId) -> Result<Balance, StoreError> {
        if let Some(staged) = self.balances.get(&id) {
            return Ok(*staged);
        }
        let state = self.shared.state.read().await;
        state
            .accounts
            .get(&id)
            .map(|a| a.balance)
            .ok_or_else(|| StoreError::account_not_found(id))
    }

    async fn current_quantity(&self, key: (AccountId, i64)) -> i64 {
        if let Some(staged) = self.items.get(&key) {
            return *staged;
        }
        let state = self.shared.state.read().await;
        state.owned_items.get(&key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn adjust_balance(&mut self, id: AccountId, delta: i64) -> Result<Balance, StoreError> {
        self.ensure_enlisted(id)?;
        let current = self.current_balance(id).await?;

        let next = current.apply_delta(delta).map_err(|e| match e {
            AmountError::Negative(_) => StoreError::InsufficientFunds {
                account_id: id,
                balance: current.value(),
                requested: delta.saturating_neg(),
            },
            _ => StoreError::Overflow(id),
        })?;

        self.balances.insert(id, next);
        Ok(next)
    }

    async fn add_owned_item(&mut self, id: AccountId, item_id: i64) -> Result<i64, StoreError> {
        self.ensure_enlisted(id)?;
        let key = (id, item_id);
        let quantity = self
            .current_quantity(key)
            .await
            .checked_add(1)
            .ok_or(StoreError::Overflow(id))?;

        self.items.insert(key, quantity);
        Ok(quantity)
    }

    async fn append_record(
        &mut self,
        record: NewLedgerRecord,
    ) -> Result<LedgerRecord, StoreError> {
        for id in record.accounts() {
            self.ensure_enlisted(id)?;
        }

        let id = self.shared.next_record_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = LedgerRecord {
            id,
            kind: record.kind,
            from_account_id: record.from_account_id,
            to_account_id: record.to_account_id,
            amount: record.amount,
            item_key: record.item_key,
            created_at: Utc::now(),
        };

        self.records.push(record.clone());
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let unit = *self;
        let mut state = unit.shared.state.write().await;

        for id in unit.balances.keys() {
            if !state.accounts.contains_key(id) {
                return Err(StoreError::account_not_found(*id));
            }
        }
        for (id, balance) in unit.balances {
            if let Some(account) = state.accounts.get_mut(&id) {
                account.balance = balance;
            }
        }
        state.owned_items.extend(unit.items);
        state.records.extend(unit.records);

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
