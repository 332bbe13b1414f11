//! Store module
//!
//! Persistence seam for accounts and the append-only transaction log.
//!
//! - [`AccountStore`]: accounts and their current balance
//! - [`TransactionLog`]: immutable record of every applied operation
//! - [`LedgerStore`]: both, plus the atomic balance+record commit the engine
//!   relies on
//!
//! Two implementations ship with the crate: [`InMemoryStore`] for
//! single-process deployments and tests, and [`PgStore`] for deployments that
//! share one PostgreSQL database between processes.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Account, Balance, CardId, NewAccount, Transaction, TransactionSource};

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Inclusive creation-time bounds for history reads; `None` is open-ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl HistoryWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

/// Durable record of accounts and their current balance
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch an account by identifier
    async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError>;

    /// Fetch an account by card identifier, active or not
    async fn get_by_card(&self, card_id: &CardId) -> Result<Account, StoreError>;

    /// Insert a new account; fails with `DuplicateCard` if the card is taken
    async fn create(&self, account: NewAccount) -> Result<Account, StoreError>;

    /// Activate or deactivate an account
    async fn set_active(&self, id: Uuid, active: bool) -> Result<Account, StoreError>;

    /// Conditionally replace the balance. Returns `false` if the stored
    /// balance no longer equals `expected`.
    async fn compare_and_set_balance(
        &self,
        id: Uuid,
        expected: Balance,
        new: Balance,
    ) -> Result<bool, StoreError>;

    /// Identifiers of every account, oldest first
    async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError>;
}

/// Append-only transaction record. Reads need no locking.
#[async_trait]
pub trait TransactionLog: Send + Sync {
    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError>;

    /// All transactions for an account in application order
    async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>, StoreError>;

    /// Most recent transactions from one source inside `window`, newest first
    async fn list_by_source(
        &self,
        source: TransactionSource,
        window: HistoryWindow,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError>;
}

/// Combined store used by the ledger engine
#[async_trait]
pub trait LedgerStore: AccountStore + TransactionLog {
    /// Atomically move the account balance from `expected` to
    /// `record.balance_after` and append `record`.
    ///
    /// Either both become durable or neither does. A stale `expected` yields
    /// `StoreError::BalanceMismatch` with nothing written.
    async fn commit(&self, expected: Balance, record: &Transaction) -> Result<(), StoreError>;
}
