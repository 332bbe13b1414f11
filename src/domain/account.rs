//! Account model
//!
//! The balance-holding entity referenced by an RFID card.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Balance;

/// External RFID card identifier.
///
/// Surrounding whitespace is stripped so that readers which pad their
/// output resolve to the same card.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(String);

impl CardId {
    pub fn new(value: impl Into<String>) -> Self {
        let value: String = value.into();
        Self(value.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CardId {
    fn from(value: &str) -> Self {
        CardId::new(value)
    }
}

/// Account status
///
/// Accounts are never deleted while transactions reference them; they are
/// deactivated instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
}

impl AccountStatus {
    pub fn from_active(active: bool) -> Self {
        if active {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// The single transition guard: returns the new status, or `None` when
    /// the account is already in the requested state.
    pub fn transition_to(self, target: AccountStatus) -> Option<AccountStatus> {
        (self != target).then_some(target)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl Default for AccountStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown account status '{}'", other)),
        }
    }
}

/// Account snapshot as stored by the account store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub card_id: CardId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Current balance, mutated only by the ledger engine
    pub balance: Balance,
    /// Balance at creation; the start of the transaction chain
    pub initial_balance: Balance,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Data needed to open a new account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub card_id: CardId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub initial_balance: Balance,
}

impl NewAccount {
    pub fn new(card_id: impl Into<CardId>, name: impl Into<String>) -> Self {
        Self {
            card_id: card_id.into(),
            name: name.into(),
            email: None,
            phone: None,
            initial_balance: Balance::zero(),
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

    pub fn with_initial_balance(mut self, balance: Balance) -> Self {
        self.initial_balance = balance;
        self
    }

    /// Materialize the account with a fresh identifier.
    pub fn into_account(self, now: DateTime<Utc>) -> Account {
        Account {
            id: Uuid::new_v4(),
            card_id: self.card_id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            balance: self.initial_balance,
            initial_balance: self.initial_balance,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}
