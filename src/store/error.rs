//! Store Errors
//!
//! Error types for account and transaction storage.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::LedgerError;

/// Errors that can occur in the account store or transaction log
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("No account for card: {0}")]
    CardNotFound(String),

    #[error("Card already assigned: {0}")]
    DuplicateCard(String),

    /// Compare-and-set lost: the stored balance no longer matches
    #[error("Balance mismatch for account {account_id}: expected {expected}")]
    BalanceMismatch { account_id: Uuid, expected: Decimal },

    /// A stored row violates a domain invariant
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::BalanceMismatch { .. } | StoreError::Unavailable(_) | StoreError::Database(_)
        )
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => LedgerError::AccountNotFound(id),
            StoreError::CardNotFound(card_id) => LedgerError::CardUnknown { card_id },
            StoreError::DuplicateCard(card_id) => LedgerError::DuplicateCard { card_id },
            StoreError::BalanceMismatch { account_id, .. } => LedgerError::ConcurrencyConflict {
                account_id,
                attempts: 1,
            },
            other => LedgerError::Storage(other.to_string()),
        }
    }
}
