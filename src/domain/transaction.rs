//! Transaction model
//!
//! A transaction is one immutable, atomically-applied balance mutation with
//! its before/after state recorded.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Amount, Balance, CardId, LedgerError};

/// Operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Credit,
    Debit,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Refund => "refund",
        }
    }

    /// Whether this kind increases the balance
    pub fn is_inflow(&self) -> bool {
        matches!(self, Self::Credit | Self::Refund)
    }

    /// Compute the balance after applying `amount` to `before`.
    ///
    /// A debit that would go below zero is `InsufficientBalance`; a credit past
    /// the representable maximum is `InvalidAmount`.
    pub fn settle(&self, before: Balance, amount: &Amount) -> Result<Balance, LedgerError> {
        if self.is_inflow() {
            before.credit(amount).map_err(|e| {
                LedgerError::InvalidAmount(format!("resulting balance out of range: {}", e))
            })
        } else if !before.is_sufficient_for(amount) {
            Err(LedgerError::insufficient_balance(amount.value(), before.value()))
        } else {
            Ok(before.debit(amount)?)
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            "refund" => Ok(Self::Refund),
            other => Err(format!("unknown transaction kind '{}'", other)),
        }
    }
}

/// Who originated the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    Admin,
    Automation,
    System,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Automation => "automation",
            Self::System => "system",
        }
    }
}

impl fmt::Display for TransactionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "automation" => Ok(Self::Automation),
            "system" => Ok(Self::System),
            other => Err(format!("unknown transaction source '{}'", other)),
        }
    }
}

/// Immutable ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// UUIDv7, orderable by creation time
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Amount,
    pub balance_before: Balance,
    pub balance_after: Balance,
    pub source: TransactionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Amount with the sign it contributes to the balance
    pub fn signed_amount(&self) -> Decimal {
        if self.kind.is_inflow() {
            self.amount.value()
        } else {
            -self.amount.value()
        }
    }
}

/// Reference to the account an operation targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountRef {
    Id(Uuid),
    Card(CardId),
}

impl From<Uuid> for AccountRef {
    fn from(id: Uuid) -> Self {
        Self::Id(id)
    }
}

impl From<CardId> for AccountRef {
    fn from(card: CardId) -> Self {
        Self::Card(card)
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "account:{}", id),
            Self::Card(card) => write!(f, "card:{}", card),
        }
    }
}

/// Operation descriptor handed to the engine.
///
/// The amount is carried unvalidated; the engine validates it before doing
/// anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
    pub source: TransactionSource,
    pub actor_id: Option<Uuid>,
}

impl Operation {
    pub fn new(kind: TransactionKind, amount: Decimal, source: TransactionSource) -> Self {
        Self {
            kind,
            amount,
            description: String::new(),
            source,
            actor_id: None,
        }
    }

    pub fn credit(amount: Decimal, source: TransactionSource) -> Self {
        Self::new(TransactionKind::Credit, amount, source)
    }

    pub fn debit(amount: Decimal, source: TransactionSource) -> Self {
        Self::new(TransactionKind::Debit, amount, source)
    }

    pub fn refund(amount: Decimal, source: TransactionSource) -> Self {
        Self::new(TransactionKind::Refund, amount, source)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn by_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }
}
