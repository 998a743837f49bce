//! Scheduled Jobs
//!
//! Background ledger reconciliation: every stored balance must equal the
//! provisioning grant plus received transfers minus everything the account
//! sent or spent.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::domain::{Account, AccountId, RecordKind};
use crate::store::{LedgerStore, StoreError};

// =========================================================================
// Balance reconciliation
// =========================================================================

/// A stored balance that disagrees with the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    pub account_id: AccountId,
    pub username: String,
    /// Balance implied by the ledger
    pub expected: i64,
    /// Balance held by the store
    pub actual: i64,
}

/// Report from one reconciliation pass
#[derive(Debug, Clone)]
pub struct ReconciliationReport {
    pub accounts_checked: usize,
    pub discrepancies: Vec<Discrepancy>,
    pub completed_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Compare every account's stored balance with its ledger history
pub async fn reconcile_balances(
    store: &dyn LedgerStore,
) -> Result<ReconciliationReport, JobError> {
    let accounts = store.list_accounts().await?;
    let mut discrepancies = Vec::new();

    for account in &accounts {
        if let Some(discrepancy) = check_account(store, account).await? {
            tracing::error!(
                account_id = %discrepancy.account_id,
                username = %discrepancy.username,
                expected = discrepancy.expected,
                actual = discrepancy.actual,
                "Balance does not match ledger"
            );
            discrepancies.push(discrepancy);
        }
    }

    Ok(ReconciliationReport {
        accounts_checked: accounts.len(),
        discrepancies,
        completed_at: Utc::now(),
    })
}

/// A mismatch is re-checked once, since a commit may land between
/// reading the records and reading the balance.
async fn check_account(
    store: &dyn LedgerStore,
    account: &Account,
) -> Result<Option<Discrepancy>, JobError> {
    let mut last = None;

    for _ in 0..2 {
        let expected = expected_balance(store, account).await?;
        let actual = store.get_balance(account.id).await?.value();
        if expected == actual {
            return Ok(None);
        }
        last = Some(Discrepancy {
            account_id: account.id,
            username: account.username.clone(),
            expected,
            actual,
        });
    }

    Ok(last)
}

async fn expected_balance(store: &dyn LedgerStore, account: &Account) -> Result<i64, JobError> {
    let records = store.records_for(account.id, None).await?;

    let mut balance = account.initial_balance.value();
    for record in records {
        let amount = record.amount.value();
        if record.from_account_id == account.id {
            balance -= amount;
        } else if record.kind == RecordKind::Transfer && record.to_account_id == Some(account.id) {
            balance += amount;
        }
    }

    Ok(balance)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Runs reconciliation on a fixed period
pub struct ReconciliationJob {
    store: Arc<dyn LedgerStore>,
    period: Duration,
}

impl ReconciliationJob {
    pub fn new(store: Arc<dyn LedgerStore>, period: Duration) -> Self {
        Self { store, period }
    }

    /// Start the job in the background
    /// Returns a handle that can be used to abort it
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!(period_secs = self.period.as_secs(), "Reconciliation job started");

        let mut ticker = interval(self.period);
        loop {
            ticker.tick().await;
            match reconcile_balances(self.store.as_ref()).await {
                Ok(report) if report.is_clean() => tracing::debug!(
                    accounts_checked = report.accounts_checked,
                    "Ledger reconciled"
                ),
                Ok(report) => tracing::error!(
                    accounts_checked = report.accounts_checked,
                    discrepancies = report.discrepancies.len(),
                    "Ledger reconciliation found discrepancies"
                ),
                Err(e) => tracing::error!(error = %e, "Ledger reconciliation failed"),
            }
        }
    }
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// =========================================================================
// Tests
// =========================================================================
