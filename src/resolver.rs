//! Account resolution
//!
//! Maps an RFID card to its account. Resolution is read-only: a denied card
//! never takes a lock and never reaches the transaction log.

use std::sync::Arc;

use crate::domain::{Account, CardId, LedgerError};
use crate::store::{AccountStore, StoreError};

#[derive(Debug)]
pub struct AccountResolver<S> {
    store: Arc<S>,
}

impl<S> Clone for AccountResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AccountStore> AccountResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve a card to an active account.
    ///
    /// # Errors
    /// - `CardUnknown` if no account carries the card
    /// - `AccountInactive` if the account is deactivated
    /// - `Storage` if the lookup itself failed
    pub async fn resolve_by_card(&self, card_id: &CardId) -> Result<Account, LedgerError> {
        if card_id.is_empty() {
            return Err(LedgerError::CardUnknown {
                card_id: String::new(),
            });
        }

        let account = match self.store.get_by_card(card_id).await {
            Ok(account) => account,
            Err(StoreError::CardNotFound(_)) => {
                tracing::info!(card_id = %card_id, "Card not registered");
                return Err(LedgerError::CardUnknown {
                    card_id: card_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if !account.is_active() {
            tracing::info!(card_id = %card_id, account_id = %account.id, "Card belongs to inactive account");
            return Err(LedgerError::AccountInactive {
                account_id: account.id,
            });
        }

        Ok(account)
    }
}
