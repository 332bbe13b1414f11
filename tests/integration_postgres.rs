//! Integration tests for the PostgreSQL store
//!
//! These need a disposable database:
//! DATABASE_URL=postgres://... cargo test --test integration_postgres -- --ignored

use std::sync::Arc;

use card_ledger::audit::{AuditAction, AuditLogBuilder, AuditSink, PgAuditSink};
use card_ledger::integrity;
use card_ledger::store::{AccountStore, LedgerStore, StoreError, TransactionLog};
use card_ledger::{
    Amount, CardId, EngineConfig, LedgerEngine, LedgerError, NewAccount, Operation,
    OperationContext, PgStore, Transaction, TransactionKind, TransactionSource,
};
use futures::future::join_all;
use rust_decimal_macros::dec;
use uuid::Uuid;

mod common;

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_schema_is_complete() {
    let pool = common::setup_test_db().await;
    assert!(card_ledger::db::check_schema(&pool).await.unwrap());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_create_and_lookup_account() {
    let pool = common::setup_test_db().await;
    let store = PgStore::new(pool);

    let new_account = common::new_account("PG", dec!(12.50)).with_email("holder@example.com");
    let card = new_account.card_id.clone();
    let created = store.create(new_account).await.unwrap();

    let by_card = store.get_by_card(&card).await.unwrap();
    assert_eq!(by_card.id, created.id);
    assert_eq!(by_card.balance.value(), dec!(12.50));
    assert_eq!(by_card.initial_balance.value(), dec!(12.50));
    assert_eq!(by_card.email.as_deref(), Some("holder@example.com"));

    let dup = store.create(NewAccount::new(card.clone(), "Other")).await;
    assert!(matches!(dup, Err(StoreError::DuplicateCard(_))));

    let missing = store.get_by_card(&CardId::new("definitely-missing")).await;
    assert!(matches!(missing, Err(StoreError::CardNotFound(_))));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_commit_rejects_stale_balance() {
    let pool = common::setup_test_db().await;
    let store = Arc::new(PgStore::new(pool));
    let account = store.create(common::new_account("PG-CAS", dec!(100))).await.unwrap();

    let engine = LedgerEngine::new(Arc::clone(&store), EngineConfig::default());
    let tx = engine
        .apply(account.id, Operation::debit(dec!(30), TransactionSource::Admin))
        .await
        .unwrap();

    // Replaying the same expected balance must fail and write nothing
    let mut replay = tx.clone();
    replay.id = Uuid::now_v7();
    let err = store.commit(tx.balance_before, &replay).await.unwrap_err();
    assert!(matches!(err, StoreError::BalanceMismatch { .. }));

    let history = store.list_for_account(account.id).await.unwrap();
    assert_eq!(history, vec![tx]);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_two_engines_share_one_account() {
    // Two engines model two processes: their in-process locks do not see
    // each other, so only the compare-and-set keeps the ledger consistent.
    let pool = common::setup_test_db().await;
    let store = Arc::new(PgStore::new(pool));
    let account = store.create(common::new_account("PG-MP", dec!(200))).await.unwrap();

    let config = EngineConfig {
        max_conflict_retries: 20,
        retry_backoff: std::time::Duration::from_millis(5),
        lock_timeout: None,
    };
    let first = LedgerEngine::new(Arc::clone(&store), config);
    let second = LedgerEngine::new(Arc::clone(&store), config);

    let results = join_all((0..20).map(|i| {
        let engine = if i % 2 == 0 { first.clone() } else { second.clone() };
        async move {
            engine
                .apply(account.id, Operation::debit(dec!(10), TransactionSource::Automation))
                .await
        }
    }))
    .await;

    let applied = results.iter().filter(|r| r.is_ok()).count();
    for result in &results {
        if let Err(e) = result {
            assert!(matches!(e, LedgerError::ConcurrencyConflict { .. }), "{:?}", e);
        }
    }

    let stored = store.get_by_id(account.id).await.unwrap();
    assert_eq!(stored.balance.value(), dec!(200) - dec!(10) * rust_decimal::Decimal::from(applied));

    let report = integrity::verify_account(store.as_ref(), account.id).await.unwrap();
    assert!(report.is_valid(), "{:?}", report.violations);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_history_follows_commit_order_not_writer_clock() {
    let pool = common::setup_test_db().await;
    let store = Arc::new(PgStore::new(pool));
    let account = store.create(common::new_account("PG-SEQ", dec!(100))).await.unwrap();

    let engine = LedgerEngine::new(Arc::clone(&store), EngineConfig::default());
    let first = engine
        .apply(account.id, Operation::debit(dec!(10), TransactionSource::Automation))
        .await
        .unwrap();

    // A writer whose clock runs an hour behind commits second
    let amount = Amount::new(dec!(10)).unwrap();
    let second = Transaction {
        id: Uuid::now_v7(),
        account_id: account.id,
        kind: TransactionKind::Debit,
        amount,
        balance_before: first.balance_after,
        balance_after: first.balance_after.debit(&amount).unwrap(),
        source: TransactionSource::Automation,
        actor_id: None,
        description: "skewed writer".to_string(),
        created_at: first.created_at - chrono::Duration::hours(1),
    };
    store.commit(first.balance_after, &second).await.unwrap();

    let history = store.list_for_account(account.id).await.unwrap();
    assert_eq!(
        history.iter().map(|tx| tx.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );

    let report = integrity::verify_account(store.as_ref(), account.id).await.unwrap();
    assert!(report.is_valid(), "{:?}", report.violations);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_transactions_are_append_only() {
    let pool = common::setup_test_db().await;
    let store = Arc::new(PgStore::new(pool.clone()));
    let account = store.create(common::new_account("PG-AO", dec!(10))).await.unwrap();
    let engine = LedgerEngine::new(Arc::clone(&store), EngineConfig::default());
    let tx = engine
        .apply(account.id, Operation::credit(dec!(1), TransactionSource::System))
        .await
        .unwrap();

    let update = sqlx::query("UPDATE transactions SET description = 'edited' WHERE id = $1")
        .bind(tx.id)
        .execute(&pool)
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM transactions WHERE id = $1")
        .bind(tx.id)
        .execute(&pool)
        .await;
    assert!(delete.is_err());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_audit_sink_writes_entry() {
    let pool = common::setup_test_db().await;
    let sink = PgAuditSink::new(pool.clone());

    let entry = AuditLogBuilder::new(AuditAction::ScanDenied)
        .resource_type("card")
        .build(&OperationContext::new().with_correlation_id(Uuid::new_v4()));
    sink.write(&entry).await.unwrap();
    // Same id again is a no-op
    sink.write(&entry).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE id = $1")
        .bind(entry.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}
