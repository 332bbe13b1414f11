//! Command definitions
//!
//! Request and response shapes a transport hands to and receives from the
//! handlers. Amounts travel as strings to keep decimal precision.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Account, LedgerError, Transaction, TransactionKind};

// =========================================================================
// Scan
// =========================================================================

/// A device scanned a card and asks for a service to be paid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCommand {
    pub card_id: String,
    /// Service cost
    pub amount: String,
    pub description: Option<String>,
}

impl ScanCommand {
    pub fn new(card_id: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            card_id: card_id.into(),
            amount: amount.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Scan outcome shown on the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_before: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deficit: Option<Decimal>,
    pub message: String,
}

pub const MSG_APPROVED: &str = "Service approved";
pub const MSG_DENIED: &str = "Card is not registered or the account is inactive";
pub const MSG_INSUFFICIENT: &str = "Insufficient balance. Please contact an administrator.";

impl ScanResponse {
    fn empty(approved: bool, message: &str) -> Self {
        Self {
            approved,
            account_id: None,
            account_name: None,
            balance_before: None,
            balance_after: None,
            transaction_id: None,
            current_balance: None,
            required_amount: None,
            deficit: None,
            message: message.to_string(),
        }
    }

    pub fn approved(account: &Account, tx: &Transaction) -> Self {
        Self {
            account_id: Some(account.id),
            account_name: Some(account.name.clone()),
            balance_before: Some(tx.balance_before.value()),
            balance_after: Some(tx.balance_after.value()),
            transaction_id: Some(tx.id),
            ..Self::empty(true, MSG_APPROVED)
        }
    }

    /// Unknown card or inactive account; nothing else is disclosed
    pub fn denied() -> Self {
        Self::empty(false, MSG_DENIED)
    }

    pub fn insufficient(
        account: Option<&Account>,
        required: Decimal,
        current: Decimal,
        deficit: Decimal,
    ) -> Self {
        Self {
            account_id: account.map(|a| a.id),
            account_name: account.map(|a| a.name.clone()),
            current_balance: Some(current),
            required_amount: Some(required),
            deficit: Some(deficit),
            ..Self::empty(false, MSG_INSUFFICIENT)
        }
    }
}

// =========================================================================
// Admin adjustment
// =========================================================================

/// An admin credits, debits or refunds an account directly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustBalanceCommand {
    pub account_id: Uuid,
    pub kind: TransactionKind,
    pub amount: String,
    pub description: Option<String>,
    pub actor_id: Uuid,
}

impl AdjustBalanceCommand {
    pub fn new(account_id: Uuid, kind: TransactionKind, amount: impl Into<String>, actor_id: Uuid) -> Self {
        Self {
            account_id,
            kind,
            amount: amount.into(),
            description: None,
            actor_id,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// =========================================================================
// Balance query
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceQuery {
    pub card_id: String,
}

/// Automation history, optionally bounded by creation time (inclusive)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationHistoryQuery {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl AutomationHistoryQuery {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub name: String,
    pub balance: Decimal,
    pub is_active: bool,
}

impl From<&Account> for BalanceResponse {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            name: account.name.clone(),
            balance: account.balance.value(),
            is_active: account.is_active(),
        }
    }
}

// =========================================================================
// Account lifecycle
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountCommand {
    pub card_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Opening balance, zero when absent
    pub initial_balance: Option<String>,
}

impl CreateAccountCommand {
    pub fn new(card_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            card_id: card_id.into(),
            name: name.into(),
            email: None,
            phone: None,
            initial_balance: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_initial_balance(mut self, initial_balance: impl Into<String>) -> Self {
        self.initial_balance = Some(initial_balance.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetActiveCommand {
    pub account_id: Uuid,
    pub active: bool,
}

/// Parse a decimal amount field; the engine applies the range rules
pub(crate) fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, LedgerError> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|e| LedgerError::InvalidAmount(format!("{} '{}': {}", field, raw, e)))
}
