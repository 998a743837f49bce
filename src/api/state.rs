//! Shared application state

use std::sync::Arc;

use crate::auth::{AuthService, PasswordHasher, TokenManager};
use crate::domain::{Balance, Catalog};
use crate::ledger::{HistoryService, LedgerEngine};
use crate::store::{AccountStore, LedgerStore};

/// Services shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub engine: LedgerEngine,
    pub history: HistoryService,
    pub auth: AuthService,
    pub tokens: Arc<TokenManager>,
}

impl AppState {
    /// Wire the services over one store
    pub fn new<S>(
        store: Arc<S>,
        catalog: Arc<Catalog>,
        tokens: Arc<TokenManager>,
        hasher: PasswordHasher,
        initial_coins: Balance,
    ) -> Self
    where
        S: LedgerStore + 'static,
    {
        let ledger: Arc<dyn LedgerStore> = store.clone();
        let accounts: Arc<dyn AccountStore> = store;

        Self {
            engine: LedgerEngine::new(Arc::clone(&ledger), Arc::clone(&catalog)),
            history: HistoryService::new(ledger, catalog),
            auth: AuthService::new(accounts, hasher, Arc::clone(&tokens), initial_coins),
            tokens,
        }
    }
}
