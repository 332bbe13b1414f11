//! In-memory store
//!
//! Single-process implementation of the ledger store. All state sits behind
//! one mutex, so a commit is trivially atomic.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{
    Account, AccountStatus, Balance, CardId, NewAccount, Transaction, TransactionSource,
};

use super::{AccountStore, HistoryWindow, LedgerStore, StoreError, TransactionLog};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    /// Creation order, for `list_ids`
    account_order: Vec<Uuid>,
    cards: HashMap<CardId, Uuid>,
    transactions: Vec<Transaction>,
    by_account: HashMap<Uuid, Vec<usize>>,
    by_id: HashMap<Uuid, usize>,
}

impl MemoryState {
    fn account_mut(&mut self, id: Uuid) -> Result<&mut Account, StoreError> {
        self.accounts
            .get_mut(&id)
            .ok_or(StoreError::AccountNotFound(id))
    }

    fn compare_and_set(&mut self, id: Uuid, expected: Balance, new: Balance) -> Result<bool, StoreError> {
        let account = self.account_mut(id)?;
        if account.balance != expected {
            return Ok(false);
        }
        account.balance = new;
        account.updated_at = Utc::now();
        Ok(true)
    }
}

/// In-memory ledger store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
        let state = self.state()?;
        state
            .accounts
            .get(&id)
            .cloned()
            .ok_or(StoreError::AccountNotFound(id))
    }

    async fn get_by_card(&self, card_id: &CardId) -> Result<Account, StoreError> {
        let state = self.state()?;
        state
            .cards
            .get(card_id)
            .and_then(|id| state.accounts.get(id))
            .cloned()
            .ok_or_else(|| StoreError::CardNotFound(card_id.to_string()))
    }

    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut state = self.state()?;
        if state.cards.contains_key(&account.card_id) {
            return Err(StoreError::DuplicateCard(account.card_id.to_string()));
        }

        let account = account.into_account(Utc::now());
        state.cards.insert(account.card_id.clone(), account.id);
        state.account_order.push(account.id);
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<Account, StoreError> {
        let mut state = self.state()?;
        let account = state.account_mut(id)?;
        if let Some(status) = account.status.transition_to(AccountStatus::from_active(active)) {
            account.status = status;
            account.updated_at = Utc::now();
        }
        Ok(account.clone())
    }

    async fn compare_and_set_balance(
        &self,
        id: Uuid,
        expected: Balance,
        new: Balance,
    ) -> Result<bool, StoreError> {
        self.state()?.compare_and_set(id, expected, new)
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.state()?.account_order.clone())
    }
}

#[async_trait]
impl TransactionLog for InMemoryStore {
    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        let state = self.state()?;
        Ok(state.by_id.get(&id).map(|&idx| state.transactions[idx].clone()))
    }

    async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state()?;
        Ok(state
            .by_account
            .get(&account_id)
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&idx| state.transactions[idx].clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_by_source(
        &self,
        source: TransactionSource,
        window: HistoryWindow,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state()?;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.source == source && window.contains(tx.created_at))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn commit(&self, expected: Balance, record: &Transaction) -> Result<(), StoreError> {
        let mut state = self.state()?;

        if state.by_id.contains_key(&record.id) {
            return Err(StoreError::Corrupt(format!(
                "transaction {} already recorded",
                record.id
            )));
        }

        if !state.compare_and_set(record.account_id, expected, record.balance_after)? {
            return Err(StoreError::BalanceMismatch {
                account_id: record.account_id,
                expected: expected.value(),
            });
        }

        let idx = state.transactions.len();
        state.transactions.push(record.clone());
        state.by_id.insert(record.id, idx);
        state.by_account.entry(record.account_id).or_default().push(idx);
        Ok(())
    }
}
