//! PostgreSQL store
//!
//! Multi-process implementation of the ledger store. The balance update and
//! the transaction insert share one database transaction, and the update is a
//! compare-and-set on the balance, so writers in other processes can never
//! cause a lost update. The same update bumps the account's `ledger_seq`, and
//! history is read back in that order rather than by writer timestamps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::{
    Account, AccountStatus, Amount, Balance, CardId, NewAccount, Transaction, TransactionSource,
};

use super::{AccountStore, HistoryWindow, LedgerStore, StoreError, TransactionLog};

const ACCOUNT_COLUMNS: &str = r#"
    id, card_id, name, email, phone, balance, initial_balance, status, created_at, updated_at
"#;

const TRANSACTION_COLUMNS: &str = r#"
    id, account_id, kind, amount, balance_before, balance_after,
    source, actor_id, description, created_at
"#;

type AccountRow = (
    Uuid,
    String,
    String,
    Option<String>,
    Option<String>,
    Decimal,
    Decimal,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

type TransactionRow = (
    Uuid,
    Uuid,
    String,
    Decimal,
    Decimal,
    Decimal,
    String,
    Option<Uuid>,
    String,
    DateTime<Utc>,
);

fn corrupt(what: &str, id: Uuid, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{} {}: {}", what, id, detail))
}

fn account_from_row(row: AccountRow) -> Result<Account, StoreError> {
    let (id, card_id, name, email, phone, balance, initial_balance, status, created_at, updated_at) =
        row;

    Ok(Account {
        id,
        card_id: CardId::new(card_id),
        name,
        email,
        phone,
        balance: Balance::new(balance).map_err(|e| corrupt("account", id, e))?,
        initial_balance: Balance::new(initial_balance).map_err(|e| corrupt("account", id, e))?,
        status: status
            .parse::<AccountStatus>()
            .map_err(|e| corrupt("account", id, e))?,
        created_at,
        updated_at,
    })
}

fn transaction_from_row(row: TransactionRow) -> Result<Transaction, StoreError> {
    let (id, account_id, kind, amount, before, after, source, actor_id, description, created_at) =
        row;

    Ok(Transaction {
        id,
        account_id,
        kind: kind.parse().map_err(|e: String| corrupt("transaction", id, e))?,
        amount: Amount::new(amount).map_err(|e| corrupt("transaction", id, e))?,
        balance_before: Balance::new(before).map_err(|e| corrupt("transaction", id, e))?,
        balance_after: Balance::new(after).map_err(|e| corrupt("transaction", id, e))?,
        source: source
            .parse()
            .map_err(|e: String| corrupt("transaction", id, e))?,
        actor_id,
        description,
        created_at,
    })
}

/// Bare compare-and-set on the balance column; leaves `ledger_seq` alone
async fn cas_balance(
    conn: &mut PgConnection,
    id: Uuid,
    expected: Balance,
    new: Balance,
) -> Result<bool, StoreError> {
    let rows_affected = sqlx::query(
        r#"
        UPDATE accounts
        SET balance = $3, updated_at = NOW()
        WHERE id = $1 AND balance = $2
        "#,
    )
    .bind(id)
    .bind(expected.value())
    .bind(new.value())
    .execute(conn)
    .await?
    .rows_affected();

    Ok(rows_affected == 1)
}

/// PostgreSQL-backed ledger store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PgStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn account_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(account_from_row)
            .transpose()?
            .ok_or(StoreError::AccountNotFound(id))
    }

    async fn get_by_card(&self, card_id: &CardId) -> Result<Account, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE card_id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(card_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(account_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::CardNotFound(card_id.to_string()))
    }

    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        let account = account.into_account(Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO accounts (
                id, card_id, name, email, phone,
                balance, initial_balance, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(account.id)
        .bind(account.card_id.as_str())
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.phone)
        .bind(account.balance.value())
        .bind(account.initial_balance.value())
        .bind(account.status.as_str())
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(account),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateCard(account.card_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<Account, StoreError> {
        let target = AccountStatus::from_active(active);

        // Only touch the row when the status actually changes
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            r#"
            UPDATE accounts
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status <> $2
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .bind(target.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => account_from_row(row),
            None => self.get_by_id(id).await,
        }
    }

    async fn compare_and_set_balance(
        &self,
        id: Uuid,
        expected: Balance,
        new: Balance,
    ) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        if cas_balance(&mut *conn, id, expected, new).await? {
            return Ok(true);
        }
        if !self.account_exists(id).await? {
            return Err(StoreError::AccountNotFound(id));
        }
        Ok(false)
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM accounts ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

#[async_trait]
impl TransactionLog for PgStore {
    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(transaction_from_row).transpose()
    }

    async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE account_id = $1
            ORDER BY seq ASC
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(transaction_from_row).collect()
    }

    async fn list_by_source(
        &self,
        source: TransactionSource,
        window: HistoryWindow,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE source = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(source.as_str())
        .bind(window.from)
        .bind(window.to)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(transaction_from_row).collect()
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn commit(&self, expected: Balance, record: &Transaction) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // The winning CAS also claims the next slot in the account's chain
        let seq: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET balance = $3, ledger_seq = ledger_seq + 1, updated_at = NOW()
            WHERE id = $1 AND balance = $2
            RETURNING ledger_seq
            "#,
        )
        .bind(record.account_id)
        .bind(expected.value())
        .bind(record.balance_after.value())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(seq) = seq else {
            // Dropping `tx` rolls back; nothing was written
            return Err(StoreError::BalanceMismatch {
                account_id: record.account_id,
                expected: expected.value(),
            });
        };

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, account_id, kind, amount, balance_before, balance_after,
                source, actor_id, description, created_at, seq
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(record.account_id)
        .bind(record.kind.as_str())
        .bind(record.amount.value())
        .bind(record.balance_before.value())
        .bind(record.balance_after.value())
        .bind(record.source.as_str())
        .bind(record.actor_id)
        .bind(&record.description)
        .bind(record.created_at)
        .bind(seq)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            transaction_id = %record.id,
            account_id = %record.account_id,
            seq,
            "Balance and transaction committed"
        );

        Ok(())
    }
}
