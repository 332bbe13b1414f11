//! Handler tests against the in-memory store

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::audit::{AuditQueue, AuditWorker, MemoryAuditSink};
    use crate::config::{AuditConfig, EngineConfig};
    use crate::domain::{
        Account, Balance, CardId, NewAccount, OperationContext, Transaction, TransactionKind,
        TransactionSource,
    };
    use crate::engine::LedgerEngine;
    use crate::error::AppError;
    use crate::handlers::{
        AccountHandler, AdjustBalanceCommand, AdjustmentHandler, AutomationHistoryQuery, BalanceQuery,
        CreateAccountCommand, QueryHandler, ScanCommand, ScanHandler, SetActiveCommand,
        MSG_DENIED, MSG_INSUFFICIENT,
    };
    use crate::store::{
        AccountStore, HistoryWindow, InMemoryStore, LedgerStore, StoreError, TransactionLog,
    };

    struct Fixture {
        store: Arc<InMemoryStore>,
        sink: Arc<MemoryAuditSink>,
        worker: AuditWorker,
        scan: ScanHandler<InMemoryStore>,
        adjust: AdjustmentHandler<InMemoryStore>,
        accounts: AccountHandler<InMemoryStore>,
        queries: QueryHandler<InMemoryStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let sink = Arc::new(MemoryAuditSink::new());
            let (audit, worker) = AuditQueue::start(sink.clone(), AuditConfig::default());
            let engine = LedgerEngine::new(Arc::clone(&store), EngineConfig::default());

            Self {
                scan: ScanHandler::new(engine.clone(), audit.clone()),
                adjust: AdjustmentHandler::new(engine.clone(), audit.clone()),
                accounts: AccountHandler::new(engine, audit),
                queries: QueryHandler::new(Arc::clone(&store)),
                store,
                sink,
                worker,
            }
        }

        /// Drop the handlers so the audit writer drains, then return what it wrote
        async fn audit_actions(self) -> Vec<String> {
            let Fixture {
                sink,
                worker,
                scan,
                adjust,
                accounts,
                ..
            } = self;
            drop((scan, adjust, accounts));
            worker.join().await.unwrap();
            sink.entries().into_iter().map(|e| e.action).collect()
        }
    }

    fn ctx() -> OperationContext {
        OperationContext::new().with_correlation_id(Uuid::new_v4())
    }

    // =========================================================================
    // Scan
    // =========================================================================

    #[tokio::test]
    async fn test_scan_approved() {
        let fx = Fixture::new();
        let account = fx
            .accounts
            .create(
                CreateAccountCommand::new("04:A1:B2", "Ayse").with_initial_balance("500"),
                &ctx(),
            )
            .await
            .unwrap();

        let response = fx
            .scan
            .execute(
                ScanCommand::new("04:A1:B2", "150").with_description("Wash"),
                &ctx(),
            )
            .await
            .unwrap();

        assert!(response.approved);
        assert_eq!(response.account_id, Some(account.id));
        assert_eq!(response.account_name.as_deref(), Some("Ayse"));
        assert_eq!(response.balance_before, Some(dec!(500)));
        assert_eq!(response.balance_after, Some(dec!(350)));
        assert!(response.transaction_id.is_some());
        assert!(response.deficit.is_none());

        let history = fx.store.list_for_account(account.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::Debit);
        assert_eq!(history[0].source, TransactionSource::Automation);
    }

    #[tokio::test]
    async fn test_scan_insufficient_balance() {
        let fx = Fixture::new();
        let account = fx
            .accounts
            .create(
                CreateAccountCommand::new("CARD-LOW", "Mehmet").with_initial_balance("20"),
                &ctx(),
            )
            .await
            .unwrap();

        let response = fx
            .scan
            .execute(ScanCommand::new("CARD-LOW", "80"), &ctx())
            .await
            .unwrap();

        assert!(!response.approved);
        assert_eq!(response.message, MSG_INSUFFICIENT);
        assert_eq!(response.account_id, Some(account.id));
        assert_eq!(response.current_balance, Some(dec!(20)));
        assert_eq!(response.required_amount, Some(dec!(80)));
        assert_eq!(response.deficit, Some(dec!(60)));
        assert!(response.transaction_id.is_none());

        assert!(fx.store.list_for_account(account.id).await.unwrap().is_empty());
        assert_eq!(
            fx.audit_actions().await,
            vec!["account.created", "ledger.rejected"]
        );
    }

    #[tokio::test]
    async fn test_scan_unknown_and_inactive_cards_are_denied() {
        let fx = Fixture::new();
        let account = fx
            .accounts
            .create(
                CreateAccountCommand::new("CARD-OFF", "Zeynep").with_initial_balance("100"),
                &ctx(),
            )
            .await
            .unwrap();
        fx.accounts
            .set_active(
                SetActiveCommand {
                    account_id: account.id,
                    active: false,
                },
                &ctx(),
            )
            .await
            .unwrap();

        for card in ["CARD-OFF", "NO-SUCH-CARD"] {
            let response = fx
                .scan
                .execute(ScanCommand::new(card, "10"), &OperationContext::for_device("reader-1"))
                .await
                .unwrap();
            assert!(!response.approved);
            assert_eq!(response.message, MSG_DENIED);
            assert!(response.account_id.is_none());
            assert!(response.current_balance.is_none());
        }

        let stored = fx.queries.balance(BalanceQuery { card_id: "CARD-OFF".into() }).await.unwrap();
        assert_eq!(stored.balance, dec!(100));
        assert!(!stored.is_active);

        assert_eq!(
            fx.audit_actions().await,
            vec![
                "account.created",
                "account.deactivated",
                "scan.denied",
                "scan.denied"
            ]
        );
    }

    #[tokio::test]
    async fn test_scan_rejects_malformed_amount() {
        let fx = Fixture::new();
        fx.accounts
            .create(CreateAccountCommand::new("CARD-X", "Ali"), &ctx())
            .await
            .unwrap();

        for raw in ["abc", "0", "-3", "1.234"] {
            let err = fx
                .scan
                .execute(ScanCommand::new("CARD-X", raw), &ctx())
                .await
                .unwrap_err();
            assert_eq!(err.error_code(), "invalid_amount", "amount {}", raw);
        }
    }

    // =========================================================================
    // Adjustments
    // =========================================================================

    #[tokio::test]
    async fn test_admin_credit_then_debit_round_trip() {
        let fx = Fixture::new();
        let admin = Uuid::new_v4();
        let account = fx
            .accounts
            .create(
                CreateAccountCommand::new("CARD-RT", "Can").with_initial_balance("40"),
                &ctx(),
            )
            .await
            .unwrap();

        let credit = fx
            .adjust
            .execute(
                AdjustBalanceCommand::new(account.id, TransactionKind::Credit, "100", admin)
                    .with_description("Top up"),
                &ctx(),
            )
            .await
            .unwrap();
        let debit = fx
            .adjust
            .execute(
                AdjustBalanceCommand::new(account.id, TransactionKind::Debit, "100", admin),
                &ctx(),
            )
            .await
            .unwrap();

        assert_eq!(credit.actor_id, Some(admin));
        assert_eq!(credit.balance_after, debit.balance_before);
        assert_eq!(debit.balance_after.value(), dec!(40));

        let history = fx.queries.account_history(account.id).await.unwrap();
        assert_eq!(history, vec![credit, debit]);
    }

    #[tokio::test]
    async fn test_admin_adjustment_errors() {
        let fx = Fixture::new();
        let account = fx
            .accounts
            .create(CreateAccountCommand::new("CARD-E", "Ece"), &ctx())
            .await
            .unwrap();

        let err = fx
            .adjust
            .execute(
                AdjustBalanceCommand::new(account.id, TransactionKind::Credit, "5", Uuid::nil()),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let err = fx
            .adjust
            .execute(
                AdjustBalanceCommand::new(account.id, TransactionKind::Debit, "5", Uuid::new_v4()),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "insufficient_balance");

        let err = fx
            .adjust
            .execute(
                AdjustBalanceCommand::new(Uuid::new_v4(), TransactionKind::Credit, "5", Uuid::new_v4()),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "account_not_found");
    }

    // =========================================================================
    // Accounts and queries
    // =========================================================================

    #[tokio::test]
    async fn test_create_account_validation() {
        let fx = Fixture::new();
        fx.accounts
            .create(
                CreateAccountCommand::new("DUP", "First")
                    .with_email("first@example.com")
                    .with_phone("+90 555 000 0000"),
                &ctx(),
            )
            .await
            .unwrap();

        let err = fx
            .accounts
            .create(CreateAccountCommand::new("DUP", "Second"), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "duplicate_card");

        let err = fx
            .accounts
            .create(
                CreateAccountCommand::new("NEG", "Neg").with_initial_balance("-1"),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_amount");

        let err = fx
            .accounts
            .create(CreateAccountCommand::new("  ", "Blank"), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_queries() {
        let fx = Fixture::new();
        let account = fx
            .accounts
            .create(
                CreateAccountCommand::new("Q-1", "Deniz").with_initial_balance("30"),
                &ctx(),
            )
            .await
            .unwrap();
        let scan = fx
            .scan
            .execute(ScanCommand::new("Q-1", "10"), &ctx())
            .await
            .unwrap();

        let balance = fx
            .queries
            .balance(BalanceQuery { card_id: "Q-1".into() })
            .await
            .unwrap();
        assert_eq!(balance.account_id, account.id);
        assert_eq!(balance.balance, dec!(20));
        assert!(balance.is_active);

        let tx_id = scan.transaction_id.unwrap();
        assert_eq!(fx.queries.transaction(tx_id).await.unwrap().id, tx_id);
        assert!(matches!(
            fx.queries.transaction(Uuid::new_v4()).await,
            Err(AppError::TransactionNotFound(_))
        ));

        let automation = fx
            .queries
            .automation_history(AutomationHistoryQuery::default().with_limit(1000))
            .await
            .unwrap();
        assert_eq!(automation.len(), 1);

        let err = fx
            .queries
            .balance(BalanceQuery { card_id: "nope".into() })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "card_unknown");
        assert_eq!(
            fx.queries.account_history(Uuid::new_v4()).await.unwrap_err().error_code(),
            "account_not_found"
        );
    }

    #[tokio::test]
    async fn test_automation_history_range() {
        let fx = Fixture::new();
        fx.accounts
            .create(
                CreateAccountCommand::new("R-1", "Elif").with_initial_balance("100"),
                &ctx(),
            )
            .await
            .unwrap();
        let scan = fx
            .scan
            .execute(ScanCommand::new("R-1", "5"), &ctx())
            .await
            .unwrap();
        let tx = fx
            .queries
            .transaction(scan.transaction_id.unwrap())
            .await
            .unwrap();

        let around = AutomationHistoryQuery::between(
            tx.created_at - Duration::minutes(1),
            tx.created_at + Duration::minutes(1),
        );
        assert_eq!(fx.queries.automation_history(around).await.unwrap(), vec![tx.clone()]);

        let later = AutomationHistoryQuery {
            from: Some(tx.created_at + Duration::seconds(1)),
            ..AutomationHistoryQuery::default()
        };
        assert!(fx.queries.automation_history(later).await.unwrap().is_empty());

        let inverted = AutomationHistoryQuery::between(
            tx.created_at,
            tx.created_at - Duration::seconds(1),
        );
        assert!(matches!(
            fx.queries.automation_history(inverted).await,
            Err(AppError::InvalidRequest(_))
        ));
    }

    // =========================================================================
    // Reads after commit
    // =========================================================================

    /// In-memory store whose first account read after a commit fails
    struct ReadFailsAfterCommit {
        inner: InMemoryStore,
        armed: AtomicBool,
    }

    #[async_trait]
    impl AccountStore for ReadFailsAfterCommit {
        async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Unavailable("replica lagging".to_string()));
            }
            self.inner.get_by_id(id).await
        }

        async fn get_by_card(&self, card_id: &CardId) -> Result<Account, StoreError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Unavailable("replica lagging".to_string()));
            }
            self.inner.get_by_card(card_id).await
        }

        async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
            self.inner.create(account).await
        }

        async fn set_active(&self, id: Uuid, active: bool) -> Result<Account, StoreError> {
            self.inner.set_active(id, active).await
        }

        async fn compare_and_set_balance(
            &self,
            id: Uuid,
            expected: Balance,
            new: Balance,
        ) -> Result<bool, StoreError> {
            self.inner.compare_and_set_balance(id, expected, new).await
        }

        async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError> {
            self.inner.list_ids().await
        }
    }

    #[async_trait]
    impl TransactionLog for ReadFailsAfterCommit {
        async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
            self.inner.get_transaction(id).await
        }

        async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
            self.inner.list_for_account(account_id).await
        }

        async fn list_by_source(
            &self,
            source: TransactionSource,
            window: HistoryWindow,
            limit: usize,
        ) -> Result<Vec<Transaction>, StoreError> {
            self.inner.list_by_source(source, window, limit).await
        }
    }

    #[async_trait]
    impl LedgerStore for ReadFailsAfterCommit {
        async fn commit(&self, expected: Balance, record: &Transaction) -> Result<(), StoreError> {
            self.inner.commit(expected, record).await?;
            self.armed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_committed_scan_is_approved_even_if_reads_fail() {
        let store = Arc::new(ReadFailsAfterCommit {
            inner: InMemoryStore::new(),
            armed: AtomicBool::new(false),
        });
        let account = store
            .create(
                NewAccount::new("CARD-FLAKY", "Deniz")
                    .with_initial_balance(Balance::new(dec!(100)).unwrap()),
            )
            .await
            .unwrap();
        let (audit, _worker) =
            AuditQueue::start(Arc::new(MemoryAuditSink::new()), AuditConfig::default());
        let engine = LedgerEngine::new(Arc::clone(&store), EngineConfig::default());
        let scan = ScanHandler::new(engine, audit);

        let response = scan
            .execute(ScanCommand::new("CARD-FLAKY", "30"), &ctx())
            .await
            .unwrap();

        assert!(response.approved);
        assert_eq!(response.account_name.as_deref(), Some("Deniz"));
        assert_eq!(response.balance_after, Some(dec!(70)));

        // The failing read is still armed: the handler never read after commit
        assert!(store.armed.load(Ordering::SeqCst));
        let history = store.inner.list_for_account(account.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(store.inner.get_by_id(account.id).await.unwrap().balance.value(), dec!(70));
    }
}
