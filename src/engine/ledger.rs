//! Ledger engine
//!
//! Orchestrates validate -> resolve -> serialize -> compute -> commit for one
//! balance mutation. The serialized section runs in its own task: once the
//! account is held, dropping the caller's future cannot stop the apply
//! half-way.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::concurrency::{AccountGuard, ConcurrencyController};
use crate::config::EngineConfig;
use crate::domain::{Account, AccountRef, Amount, LedgerError, Operation, Transaction};
use crate::resolver::AccountResolver;
use crate::store::LedgerStore;

use super::state::{ApplyPhase, PhaseTracker};

/// A committed operation and the account state it produced.
///
/// `account` is the row read under the hold with the new balance applied, so
/// callers never need a second read after the commit.
#[derive(Debug, Clone)]
pub struct Applied {
    pub account: Account,
    pub transaction: Transaction,
}

struct EngineInner<S> {
    store: Arc<S>,
    resolver: AccountResolver<S>,
    controller: ConcurrencyController,
    config: EngineConfig,
}

/// Balance ledger and transaction engine
pub struct LedgerEngine<S> {
    inner: Arc<EngineInner<S>>,
}

impl<S> Clone for LedgerEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: LedgerStore + 'static> LedgerEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                resolver: AccountResolver::new(Arc::clone(&store)),
                store,
                controller: ConcurrencyController::new(),
                config,
            }),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Accounts currently held or waited on
    pub fn accounts_in_flight(&self) -> usize {
        self.inner.controller.tracked_accounts()
    }

    // =========================================================================
    // apply
    // =========================================================================

    /// Apply one operation using the configured lock deadline
    pub async fn apply(
        &self,
        account: impl Into<AccountRef>,
        operation: Operation,
    ) -> Result<Transaction, LedgerError> {
        self.apply_with_deadline(account, operation, self.inner.config.lock_timeout)
            .await
    }

    /// Like [`apply`](Self::apply), also returning the updated account
    pub async fn apply_detailed(
        &self,
        account: impl Into<AccountRef>,
        operation: Operation,
    ) -> Result<Applied, LedgerError> {
        self.run(account.into(), operation, self.inner.config.lock_timeout)
            .await
    }

    /// Apply one operation, waiting at most `deadline` for the account.
    ///
    /// The deadline only bounds the wait for serialization. A rejected apply
    /// leaves no record and no balance change.
    pub async fn apply_with_deadline(
        &self,
        account: impl Into<AccountRef>,
        operation: Operation,
        deadline: Option<Duration>,
    ) -> Result<Transaction, LedgerError> {
        self.run(account.into(), operation, deadline)
            .await
            .map(|applied| applied.transaction)
    }

    async fn run(
        &self,
        account_ref: AccountRef,
        operation: Operation,
        deadline: Option<Duration>,
    ) -> Result<Applied, LedgerError> {
        let mut phase = PhaseTracker::new(account_ref.to_string());

        let amount = match Amount::new(operation.amount) {
            Ok(amount) => amount,
            Err(e) => {
                phase.reject();
                tracing::info!(account = %account_ref, amount = %operation.amount, "Rejected invalid amount");
                return Err(e.into());
            }
        };
        phase.advance(ApplyPhase::Validated);

        let account = match self.resolve(&account_ref).await {
            Ok(account) => account,
            Err(e) => {
                phase.reject();
                return Err(e);
            }
        };
        phase.advance(ApplyPhase::Resolved);

        let account_id = account.id;
        let max_attempts = self.inner.config.max_attempts();
        let mut attempt = 1;

        loop {
            let guard = match self.inner.controller.acquire(account_id, deadline).await {
                Ok(guard) => guard,
                Err(e) => {
                    phase.reject();
                    return Err(e);
                }
            };
            phase.advance(ApplyPhase::Serialized);

            let inner = Arc::clone(&self.inner);
            let op = operation.clone();
            let section = tokio::spawn(async move {
                let result = inner.serialized_section(guard, amount, &op, &mut phase).await;
                (result, phase)
            });

            let result = match section.await {
                Ok((result, returned)) => {
                    phase = returned;
                    result
                }
                Err(join_err) => {
                    tracing::error!(account_id = %account_id, error = %join_err, "Serialized section aborted");
                    return Err(LedgerError::Storage(format!(
                        "serialized section aborted: {}",
                        join_err
                    )));
                }
            };

            match result {
                Err(LedgerError::ConcurrencyConflict { .. }) if attempt < max_attempts => {
                    let delay = self.inner.config.backoff_for(attempt);
                    tracing::warn!(
                        account_id = %account_id,
                        attempt,
                        max_attempts,
                        "Balance changed underneath apply, retrying (attempt {}/{})",
                        attempt,
                        max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(LedgerError::ConcurrencyConflict { .. }) => {
                    tracing::error!(account_id = %account_id, attempts = attempt, "Conflict retries exhausted");
                    return Err(LedgerError::ConcurrencyConflict {
                        account_id,
                        attempts: attempt,
                    });
                }
                other => return other,
            }
        }
    }

    /// Activate or deactivate an account, serialized with in-flight applies
    pub async fn set_active(&self, account_id: Uuid, active: bool) -> Result<Account, LedgerError> {
        let _guard = self
            .inner
            .controller
            .acquire(account_id, self.inner.config.lock_timeout)
            .await?;
        let account = self.inner.store.set_active(account_id, active).await?;
        tracing::info!(account_id = %account_id, status = %account.status.as_str(), "Account status set");
        Ok(account)
    }

    async fn resolve(&self, account_ref: &AccountRef) -> Result<Account, LedgerError> {
        match account_ref {
            AccountRef::Card(card_id) => self.inner.resolver.resolve_by_card(card_id).await,
            AccountRef::Id(id) => {
                let account = self.inner.store.get_by_id(*id).await?;
                if !account.is_active() {
                    return Err(LedgerError::AccountInactive {
                        account_id: account.id,
                    });
                }
                Ok(account)
            }
        }
    }
}

impl<S: LedgerStore> EngineInner<S> {
    /// Everything between acquire and release. The guard is dropped here on
    /// every path.
    async fn serialized_section(
        &self,
        guard: AccountGuard,
        amount: Amount,
        operation: &Operation,
        phase: &mut PhaseTracker,
    ) -> Result<Applied, LedgerError> {
        let result = self
            .settle_and_commit(guard.account_id(), amount, operation, phase)
            .await;

        match &result {
            Ok(_) => phase.advance(ApplyPhase::Persisted),
            Err(_) => phase.reject(),
        }
        drop(guard);
        phase.advance(ApplyPhase::Released);

        result
    }

    async fn settle_and_commit(
        &self,
        account_id: Uuid,
        amount: Amount,
        operation: &Operation,
        phase: &mut PhaseTracker,
    ) -> Result<Applied, LedgerError> {
        // Fresh read under the hold; the pre-lock read may be stale
        let mut account = self.store.get_by_id(account_id).await?;
        if !account.is_active() {
            tracing::info!(account_id = %account_id, "Account deactivated before apply");
            return Err(LedgerError::AccountInactive { account_id });
        }

        let before = account.balance;
        let after = match operation.kind.settle(before, &amount) {
            Ok(after) => after,
            Err(e) => {
                tracing::info!(
                    account_id = %account_id,
                    kind = %operation.kind,
                    amount = %amount,
                    balance = %before.value(),
                    code = e.code(),
                    "Operation rejected"
                );
                return Err(e);
            }
        };
        phase.advance(ApplyPhase::Computed);

        let record = Transaction {
            id: Uuid::now_v7(),
            account_id,
            kind: operation.kind,
            amount,
            balance_before: before,
            balance_after: after,
            source: operation.source,
            actor_id: operation.actor_id,
            description: operation.description.clone(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.commit(before, &record).await {
            let err = LedgerError::from(e);
            if !matches!(err, LedgerError::ConcurrencyConflict { .. }) {
                tracing::error!(account_id = %account_id, error = %err, "Commit failed; nothing applied");
            }
            return Err(err);
        }

        tracing::info!(
            transaction_id = %record.id,
            account_id = %account_id,
            kind = %record.kind,
            source = %record.source,
            amount = %record.amount,
            balance_after = %record.balance_after.value(),
            "Transaction applied"
        );

        account.balance = record.balance_after;
        Ok(Applied {
            account,
            transaction: record,
        })
    }
}
