//! Ledger Error Types
//!
//! Rejection reasons produced by the ledger engine. Every variant carries a
//! machine-checkable reason code.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::AmountError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    /// Amount is zero, negative, non-finite or out of range
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// No account carries this card identifier
    #[error("Card is not registered: {card_id}")]
    CardUnknown { card_id: String },

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Account is inactive: {account_id}")]
    AccountInactive { account_id: Uuid },

    /// Debit would take the balance below zero. A business outcome, not a fault.
    #[error("Insufficient balance: required {required}, current {current}, deficit {deficit}")]
    InsufficientBalance {
        required: Decimal,
        current: Decimal,
        deficit: Decimal,
    },

    /// Stored balance changed underneath the serialized section
    #[error("Concurrency conflict on account {account_id} after {attempts} attempt(s)")]
    ConcurrencyConflict { account_id: Uuid, attempts: u32 },

    /// Deadline expired while waiting for the account's serialization unit
    #[error("Timed out waiting for account {account_id}")]
    LockTimeout { account_id: Uuid },

    /// Storage failure; nothing was persisted
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Card is already assigned to another account: {card_id}")]
    DuplicateCard { card_id: String },
}

impl LedgerError {
    /// Create an insufficient balance error from the requested amount and the
    /// balance observed under serialization.
    pub fn insufficient_balance(required: Decimal, current: Decimal) -> Self {
        Self::InsufficientBalance {
            required,
            current,
            deficit: required - current,
        }
    }

    /// Stable reason code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::CardUnknown { .. } => "card_unknown",
            Self::AccountNotFound(_) => "account_not_found",
            Self::AccountInactive { .. } => "account_inactive",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::LockTimeout { .. } => "lock_timeout",
            Self::Storage(_) => "storage_error",
            Self::DuplicateCard { .. } => "duplicate_card",
        }
    }

    /// Check if this is a client error (caller's input or account state)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_)
                | Self::CardUnknown { .. }
                | Self::AccountNotFound(_)
                | Self::AccountInactive { .. }
                | Self::InsufficientBalance { .. }
                | Self::DuplicateCard { .. }
        )
    }

    /// Check if the identical operation may be retried; nothing partial was persisted
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::LockTimeout { .. } | Self::Storage(_)
        )
    }
}

impl From<AmountError> for LedgerError {
    fn from(err: AmountError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}
