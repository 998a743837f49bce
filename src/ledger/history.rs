//! History Aggregator
//!
//! Read-only reconstruction of a user's balance, inventory and transfer
//! history from the account store, the ledger and the catalog.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{
    AccountId, Catalog, InventoryEntry, LedgerError, LedgerRecord, RecordKind, TransferEntry,
    UserView,
};
use crate::store::LedgerStore;

/// Display name used when a counterparty cannot be resolved
pub const UNKNOWN_COUNTERPARTY: &str = "unknown";

#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn LedgerStore>,
    catalog: Arc<Catalog>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn LedgerStore>, catalog: Arc<Catalog>) -> Self {
        Self { store, catalog }
    }

    /// Build the user-facing view for one account.
    ///
    /// Fails only when the account itself is missing or storage fails;
    /// counterparties that cannot be resolved render as `"unknown"`.
    pub async fn user_view(&self, account_id: AccountId) -> Result<UserView, LedgerError> {
        let account = self.store.get_account(account_id).await?;

        let inventory = self
            .store
            .owned_items(account_id)
            .await?
            .into_iter()
            .map(|item| InventoryEntry {
                name: self.catalog.display_name(item.item_id),
                quantity: item.quantity,
            })
            .collect();

        let records = self
            .store
            .records_for(account_id, Some(RecordKind::Transfer))
            .await?;

        let mut names: HashMap<AccountId, String> = HashMap::new();
        names.insert(account.id, account.username.clone());

        let mut received = Vec::new();
        let mut sent = Vec::new();

        for record in records {
            if record.kind != RecordKind::Transfer {
                continue;
            }

            if record.from_account_id == account_id {
                let counterparty = match record.to_account_id {
                    Some(to) => self.resolve_name(&mut names, to).await,
                    None => UNKNOWN_COUNTERPARTY.to_string(),
                };
                sent.push(entry(&record, counterparty));
            } else if record.to_account_id == Some(account_id) {
                let counterparty = self.resolve_name(&mut names, record.from_account_id).await;
                received.push(entry(&record, counterparty));
            }
        }

        received.sort_by(|a: &TransferEntry, b| b.record_id.cmp(&a.record_id));
        sent.sort_by(|a: &TransferEntry, b| b.record_id.cmp(&a.record_id));

        Ok(UserView {
            account_id,
            balance: account.balance,
            inventory,
            received,
            sent,
        })
    }

    async fn resolve_name(&self, cache: &mut HashMap<AccountId, String>, id: AccountId) -> String {
        if let Some(name) = cache.get(&id) {
            return name.clone();
        }

        let name = match self.store.get_account(id).await {
            Ok(account) => account.username,
            Err(e) => {
                tracing::warn!(account_id = %id, error = %e, "Counterparty lookup failed");
                UNKNOWN_COUNTERPARTY.to_string()
            }
        };

        cache.insert(id, name.clone());
        name
    }
}

fn entry(record: &LedgerRecord, counterparty: String) -> TransferEntry {
    TransferEntry {
        record_id: record.id,
        counterparty,
        amount: record.amount.value(),
        created_at: record.created_at,
    }
}
