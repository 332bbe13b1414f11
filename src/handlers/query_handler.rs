//! Query Handler
//!
//! Read-only views. Nothing here takes an account lock.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{CardId, LedgerError, Transaction, TransactionSource};
use crate::error::{AppError, AppResult};
use crate::store::{HistoryWindow, LedgerStore, StoreError};

use super::{AutomationHistoryQuery, BalanceQuery, BalanceResponse};

/// Automation history is capped like the device dashboard expects
pub const AUTOMATION_HISTORY_LIMIT: usize = 200;

pub struct QueryHandler<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> QueryHandler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Balance by card. Inactive accounts are still reported.
    pub async fn balance(&self, query: BalanceQuery) -> AppResult<BalanceResponse> {
        let card_id = CardId::new(query.card_id);
        match self.store.get_by_card(&card_id).await {
            Ok(account) => Ok(BalanceResponse::from(&account)),
            Err(StoreError::CardNotFound(card_id)) => {
                Err(LedgerError::CardUnknown { card_id }.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every transaction of one account, oldest first
    pub async fn account_history(&self, account_id: Uuid) -> AppResult<Vec<Transaction>> {
        // Distinguish an unknown account from one with no history
        self.store
            .get_by_id(account_id)
            .await
            .map_err(LedgerError::from)?;
        Ok(self.store.list_for_account(account_id).await?)
    }

    pub async fn transaction(&self, transaction_id: Uuid) -> AppResult<Transaction> {
        self.store
            .get_transaction(transaction_id)
            .await?
            .ok_or(AppError::TransactionNotFound(transaction_id))
    }

    /// Latest automation transactions, newest first, optionally within a
    /// creation-time range
    pub async fn automation_history(
        &self,
        query: AutomationHistoryQuery,
    ) -> AppResult<Vec<Transaction>> {
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(AppError::InvalidRequest(
                    "history range starts after it ends".to_string(),
                ));
            }
        }
        let window = HistoryWindow {
            from: query.from,
            to: query.to,
        };
        let limit = query
            .limit
            .unwrap_or(AUTOMATION_HISTORY_LIMIT)
            .min(AUTOMATION_HISTORY_LIMIT);
        Ok(self
            .store
            .list_by_source(TransactionSource::Automation, window, limit)
            .await?)
    }
}
