//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use card_ledger::domain::Balance;
use card_ledger::{Account, EngineConfig, InMemoryStore, LedgerEngine, NewAccount};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// Connect to the test database and bring its schema up to date.
///
/// Tests never truncate; each one works on accounts with fresh card ids.
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    card_ledger::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Card id no other test run will collide with
pub fn unique_card(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

pub fn new_account(prefix: &str, opening: Decimal) -> NewAccount {
    NewAccount::new(unique_card(prefix).as_str(), "Test Holder")
        .with_initial_balance(Balance::new(opening).expect("valid opening balance"))
}

/// In-memory engine with one account at the given opening balance
pub async fn memory_engine(opening: Decimal) -> (LedgerEngine<InMemoryStore>, Account) {
    use card_ledger::store::AccountStore;

    let store = Arc::new(InMemoryStore::new());
    let account = store
        .create(new_account("MEM", opening))
        .await
        .expect("Failed to create account");
    let config = EngineConfig {
        retry_backoff: std::time::Duration::from_millis(1),
        ..EngineConfig::default()
    };
    (LedgerEngine::new(store, config), account)
}
