//! card_ledger - ledger maintenance entry point
//!
//! Connects to the database, applies migrations, verifies the schema and
//! checks every account's ledger. Exits non-zero if any account fails.

use card_ledger::integrity;
use card_ledger::telemetry::init_tracing;
use card_ledger::{db, Config, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing("card_ledger=debug");

    let config = Config::from_env()?;

    tracing::info!(environment = %config.environment, "Starting card_ledger");
    tracing::info!("Connecting to database...");

    let pool = db::connect(&config).await?;
    db::verify_connection(&pool).await?;
    db::run_migrations(&pool).await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let store = PgStore::new(pool.clone());
    let failures = integrity::verify_all(&store).await?;

    for report in &failures {
        for violation in &report.violations {
            tracing::error!(account_id = %report.account_id, ?violation, "Integrity violation");
        }
    }

    pool.close().await;

    if !failures.is_empty() {
        return Err(anyhow::anyhow!(
            "{} account(s) failed ledger verification",
            failures.len()
        ));
    }

    tracing::info!("All accounts verified");
    Ok(())
}
