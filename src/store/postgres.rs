//! PostgreSQL Account Store
//!
//! One database transaction per unit of work. Rows are locked with
//! `SELECT ... ORDER BY id FOR UPDATE`, and every debit is a conditional
//! `UPDATE` so the balance check and the decrement cannot be separated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, Amount, Balance, LedgerRecord, NewAccount, NewLedgerRecord, OwnedItem,
    RecordKind, MAX_AMOUNT,
};

use super::error::map_sqlx_error;
use super::{lock_order, AccountStore, LedgerStore, StoreError, UnitOfWork};

type AccountRow = (Uuid, String, String, i64, i64, DateTime<Utc>);
type RecordRow = (
    i64,
    String,
    Uuid,
    Option<Uuid>,
    i64,
    Option<String>,
    DateTime<Utc>,
);

const ACCOUNT_COLUMNS: &str = "id, username, password_hash, balance, initial_balance, created_at";

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PgStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let row: AccountRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO accounts (id, username, password_hash, balance, initial_balance)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(account.id)
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(account.initial_balance.value())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        account_from_row(row)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, StoreError> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(account_from_row)
            .unwrap_or_else(|| Err(StoreError::account_not_found(id)))
    }

    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(account_from_row).collect()
    }

    async fn get_balance(&self, id: AccountId) -> Result<Balance, StoreError> {
        let balance: Option<i64> = sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match balance {
            Some(value) => to_balance(value),
            None => Err(StoreError::account_not_found(id)),
        }
    }

    async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<Balance, StoreError> {
        let mut conn = self.pool.acquire().await?;
        conditional_adjust(&mut conn, id, delta).await
    }

    async fn owned_items(&self, id: AccountId) -> Result<Vec<OwnedItem>, StoreError> {
        // One row with NULL item columns when the account owns nothing,
        // no rows when the account does not exist
        let rows: Vec<(Uuid, Option<i64>, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT a.id, o.item_id, o.quantity
            FROM accounts a
            LEFT JOIN owned_items o ON o.account_id = a.id
            WHERE a.id = $1
            ORDER BY o.item_id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(StoreError::account_not_found(id));
        }

        Ok(rows
            .into_iter()
            .filter_map(|(account_id, item_id, quantity)| {
                Some(OwnedItem {
                    account_id,
                    item_id: item_id?,
                    quantity: quantity?,
                })
            })
            .collect())
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self, accounts: &[AccountId]) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let ids = lock_order(accounts);
        let mut tx = self.pool.begin().await?;

        let locked: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM accounts
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&mut *tx)
        .await?;

        if let Some(missing) = ids.iter().find(|id| !locked.contains(id)) {
            // tx is dropped here, which rolls it back
            return Err(StoreError::account_not_found(*missing));
        }

        Ok(Box::new(PgUnitOfWork { tx, enlisted: ids }))
    }

    async fn records_for(
        &self,
        id: AccountId,
        kind: Option<RecordKind>,
    ) -> Result<Vec<LedgerRecord>, StoreError> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            r#"
            SELECT id, kind, from_account_id, to_account_id, amount, item_key, created_at
            FROM ledger_records
            WHERE (from_account_id = $1 OR to_account_id = $1)
              AND ($2::TEXT IS NULL OR kind = $2)
            ORDER BY id DESC
            "#,
        )
        .bind(id)
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }
}

/// Unit of work backed by one database transaction
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    enlisted: Vec<AccountId>,
}

impl PgUnitOfWork {
    fn ensure_enlisted(&self, id: AccountId) -> Result<(), StoreError> {
        if self.enlisted.binary_search(&id).is_ok() {
            Ok(())
        } else {
            Err(StoreError::NotEnlisted(id))
        }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn adjust_balance(&mut self, id: AccountId, delta: i64) -> Result<Balance, StoreError> {
        self.ensure_enlisted(id)?;
        conditional_adjust(&mut self.tx, id, delta).await
    }

    async fn add_owned_item(&mut self, id: AccountId, item_id: i64) -> Result<i64, StoreError> {
        self.ensure_enlisted(id)?;

        let quantity: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO owned_items (account_id, item_id, quantity)
            VALUES ($1, $2, 1)
            ON CONFLICT (account_id, item_id)
            DO UPDATE SET quantity = owned_items.quantity + 1, updated_at = NOW()
            RETURNING quantity
            "#,
        )
        .bind(id)
        .bind(item_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(quantity)
    }

    async fn append_record(
        &mut self,
        record: NewLedgerRecord,
    ) -> Result<LedgerRecord, StoreError> {
        for id in record.accounts() {
            self.ensure_enlisted(id)?;
        }

        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO ledger_records (kind, from_account_id, to_account_id, amount, item_key)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, created_at
            "#,
        )
        .bind(record.kind.as_str())
        .bind(record.from_account_id)
        .bind(record.to_account_id)
        .bind(record.amount.value())
        .bind(record.item_key.as_deref())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(LedgerRecord {
            id,
            kind: record.kind,
            from_account_id: record.from_account_id,
            to_account_id: record.to_account_id,
            amount: record.amount,
            item_key: record.item_key,
            created_at,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Conditional adjust: the row is updated only when the result stays in
/// `0..=MAX_AMOUNT`; otherwise the current balance tells us why it was refused.
async fn conditional_adjust(
    conn: &mut PgConnection,
    id: AccountId,
    delta: i64,
) -> Result<Balance, StoreError> {
    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE accounts
        SET balance = balance + $2, updated_at = NOW()
        WHERE id = $1 AND balance + $2 >= 0 AND balance + $2 <= $3
        RETURNING balance
        "#,
    )
    .bind(id)
    .bind(delta)
    .bind(MAX_AMOUNT)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(balance) = updated {
        return to_balance(balance);
    }

    let current: Option<i64> = sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match current {
        None => Err(StoreError::account_not_found(id)),
        Some(balance) if delta < 0 => Err(StoreError::InsufficientFunds {
            account_id: id,
            balance,
            requested: delta.saturating_neg(),
        }),
        Some(_) => Err(StoreError::Overflow(id)),
    }
}

fn to_balance(value: i64) -> Result<Balance, StoreError> {
    Balance::new(value).map_err(|e| StoreError::InvalidData(e.to_string()))
}

fn account_from_row(row: AccountRow) -> Result<Account, StoreError> {
    let (id, username, password_hash, balance, initial_balance, created_at) = row;
    Ok(Account {
        id,
        username,
        password_hash,
        balance: to_balance(balance)?,
        initial_balance: to_balance(initial_balance)?,
        created_at,
    })
}

fn record_from_row(row: RecordRow) -> Result<LedgerRecord, StoreError> {
    let (id, kind, from_account_id, to_account_id, amount, item_key, created_at) = row;
    Ok(LedgerRecord {
        id,
        kind: kind.parse().map_err(StoreError::InvalidData)?,
        from_account_id,
        to_account_id,
        amount: Amount::new(amount).map_err(|e| StoreError::InvalidData(e.to_string()))?,
        item_key,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_row() {
        let from = Uuid::new_v4();
        let record = record_from_row((
            7,
            "purchase".to_string(),
            from,
            None,
            80,
            Some("t-shirt".to_string()),
            Utc::now(),
        ))
        .unwrap();

        assert_eq!(record.kind, RecordKind::Purchase);
        assert_eq!(record.amount.value(), 80);
        assert_eq!(record.item_key.as_deref(), Some("t-shirt"));
    }

    #[test]
    fn test_corrupt_rows_rejected() {
        let bad_kind = record_from_row((
            1,
            "refund".to_string(),
            Uuid::new_v4(),
            None,
            5,
            None,
            Utc::now(),
        ));
        assert!(matches!(bad_kind, Err(StoreError::InvalidData(_))));

        let negative = account_from_row((
            Uuid::new_v4(),
            "alice".to_string(),
            String::new(),
            -1,
            0,
            Utc::now(),
        ));
        assert!(matches!(negative, Err(StoreError::InvalidData(_))));
    }
}
