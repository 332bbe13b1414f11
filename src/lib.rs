//! card_ledger Library
//!
//! Balance ledger and transaction engine for RFID card accounts. Re-exports
//! modules for the binaries, integration tests and external use.

pub mod audit;
pub mod concurrency;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod handlers;
pub mod integrity;
pub mod resolver;
pub mod store;
pub mod telemetry;

mod error;

pub use config::{AuditConfig, Config, EngineConfig};
pub use domain::{
    Account, AccountRef, Amount, Balance, CardId, LedgerError, NewAccount, Operation,
    OperationContext, Transaction, TransactionKind, TransactionSource,
};
pub use engine::LedgerEngine;
pub use error::{AppError, AppResult, ErrorResponse};
pub use store::{InMemoryStore, LedgerStore, PgStore, StoreError};
