//! Domain module
//!
//! Core ledger types and business rules.

pub mod account;
pub mod amount;
pub mod context;
pub mod error;
pub mod transaction;

pub use account::{Account, AccountStatus, CardId, NewAccount};
pub use amount::{Amount, AmountError, Balance};
pub use context::OperationContext;
pub use error::LedgerError;
pub use transaction::{AccountRef, Operation, Transaction, TransactionKind, TransactionSource};
