//! Ledger Engine
//!
//! Runs transfers and purchases as single units of work: preconditions are
//! validated up front, then the balance changes and the ledger record are
//! committed or rolled back together.

use std::sync::Arc;

use crate::domain::{Amount, AmountError, Catalog, LedgerError, LedgerRecord, NewLedgerRecord};
use crate::store::{LedgerStore, StoreError, UnitOfWork};

use super::{PurchaseCommand, TransferCommand};

/// Executes balance-changing commands against a `LedgerStore`
#[derive(Clone)]
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    catalog: Arc<Catalog>,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn LedgerStore>, catalog: Arc<Catalog>) -> Self {
        Self { store, catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    // =========================================================================
    // Transfer
    // =========================================================================

    /// Move `amount` coins from the sender to the named recipient.
    pub async fn transfer(&self, command: TransferCommand) -> Result<LedgerRecord, LedgerError> {
        let result = self.try_transfer(&command).await;

        match &result {
            Ok(record) => tracing::info!(
                record_id = record.id,
                from = %command.from_account_id,
                to_user = %command.to_username,
                amount = command.amount,
                "Transfer committed"
            ),
            Err(e) if e.is_client_error() => tracing::debug!(
                from = %command.from_account_id,
                to_user = %command.to_username,
                amount = command.amount,
                error_code = e.code(),
                "Transfer rejected: {}",
                e
            ),
            Err(_) => {}
        }

        result
    }

    async fn try_transfer(&self, command: &TransferCommand) -> Result<LedgerRecord, LedgerError> {
        // Resolve the recipient before any lock is taken
        let recipient = self
            .store
            .find_account_by_username(&command.to_username)
            .await?
            .ok_or_else(|| LedgerError::recipient_not_found(&command.to_username))?;

        if recipient.id == command.from_account_id {
            return Err(LedgerError::SelfTransferNotAllowed);
        }

        let amount = match Amount::new(command.amount) {
            Ok(amount) => amount,
            Err(AmountError::Overflow) => {
                // Above MAX_AMOUNT, so no balance can cover it
                let balance = self.store.get_balance(command.from_account_id).await?;
                return Err(LedgerError::InsufficientFunds {
                    balance: balance.value(),
                    required: command.amount,
                });
            }
            Err(_) => return Err(LedgerError::InvalidAmount(command.amount)),
        };

        let mut unit = self
            .store
            .begin(&[command.from_account_id, recipient.id])
            .await?;

        let outcome = async {
            unit.adjust_balance(command.from_account_id, amount.as_debit())
                .await?;
            unit.adjust_balance(recipient.id, amount.value()).await?;
            unit.append_record(NewLedgerRecord::transfer(
                command.from_account_id,
                recipient.id,
                amount,
            ))
            .await
        }
        .await;

        finish(unit, outcome).await
    }

    // =========================================================================
    // Purchase
    // =========================================================================

    /// Buy one unit of a catalog item.
    pub async fn purchase(&self, command: PurchaseCommand) -> Result<LedgerRecord, LedgerError> {
        let result = self.try_purchase(&command).await;

        match &result {
            Ok(record) => tracing::info!(
                record_id = record.id,
                account_id = %command.account_id,
                item = %command.item_key,
                price = %record.amount,
                "Purchase committed"
            ),
            Err(e) if e.is_client_error() => tracing::debug!(
                account_id = %command.account_id,
                item = %command.item_key,
                error_code = e.code(),
                "Purchase rejected: {}",
                e
            ),
            Err(_) => {}
        }

        result
    }

    async fn try_purchase(&self, command: &PurchaseCommand) -> Result<LedgerRecord, LedgerError> {
        let item = self
            .catalog
            .get(&command.item_key)
            .ok_or_else(|| LedgerError::UnknownItem(command.item_key.clone()))?;

        let mut unit = self.store.begin(&[command.account_id]).await?;

        let outcome = async {
            unit.adjust_balance(command.account_id, item.price.as_debit())
                .await?;
            unit.add_owned_item(command.account_id, item.id).await?;
            unit.append_record(NewLedgerRecord::purchase(
                command.account_id,
                item.price,
                &item.key,
            ))
            .await
        }
        .await;

        finish(unit, outcome).await
    }
}

/// Commit on success, roll back on any failure inside the unit.
async fn finish(
    unit: Box<dyn UnitOfWork>,
    outcome: Result<LedgerRecord, StoreError>,
) -> Result<LedgerRecord, LedgerError> {
    match outcome {
        Ok(record) => {
            unit.commit().await?;
            Ok(record)
        }
        Err(e) => {
            if let Err(rollback_err) = unit.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(e.into())
        }
    }
}
