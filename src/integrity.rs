//! Ledger integrity verification
//!
//! Checks, from storage alone, that every account's history is arithmetically
//! sound, forms an unbroken chain from the initial balance, and ends at the
//! stored balance.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Account, Transaction};
use crate::store::{LedgerStore, StoreError};

/// One broken invariant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Violation {
    /// `balance_after` is not `balance_before` +/- `amount`
    Arithmetic { transaction_id: Uuid },
    /// A transaction does not start where the previous one ended
    BrokenChain {
        transaction_id: Uuid,
        expected_before: Decimal,
        actual_before: Decimal,
    },
    /// Stored balance differs from what the history adds up to
    BalanceMismatch { stored: Decimal, computed: Decimal },
    /// A record filed under another account
    ForeignRecord { transaction_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityReport {
    pub account_id: Uuid,
    pub transactions_checked: usize,
    pub violations: Vec<Violation>,
}

impl IntegrityReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check one account against its chronologically ordered history
pub fn check_chain(account: &Account, transactions: &[Transaction]) -> IntegrityReport {
    let mut violations = Vec::new();
    let mut running = account.initial_balance.value();

    for tx in transactions {
        if tx.account_id != account.id {
            violations.push(Violation::ForeignRecord {
                transaction_id: tx.id,
            });
            continue;
        }

        if tx.balance_before.value() != running {
            violations.push(Violation::BrokenChain {
                transaction_id: tx.id,
                expected_before: running,
                actual_before: tx.balance_before.value(),
            });
        }

        if tx.balance_before.value() + tx.signed_amount() != tx.balance_after.value() {
            violations.push(Violation::Arithmetic {
                transaction_id: tx.id,
            });
        }

        running += tx.signed_amount();
    }

    if running != account.balance.value() {
        violations.push(Violation::BalanceMismatch {
            stored: account.balance.value(),
            computed: running,
        });
    }

    IntegrityReport {
        account_id: account.id,
        transactions_checked: transactions.len(),
        violations,
    }
}

/// Verify one account as currently stored
pub async fn verify_account<S: LedgerStore + ?Sized>(
    store: &S,
    account_id: Uuid,
) -> Result<IntegrityReport, StoreError> {
    let account = store.get_by_id(account_id).await?;
    let transactions = store.list_for_account(account_id).await?;
    let report = check_chain(&account, &transactions);

    if !report.is_valid() {
        tracing::error!(
            account_id = %account_id,
            violations = report.violations.len(),
            "Ledger integrity violation"
        );
    }

    Ok(report)
}

/// Verify every account; returns only the reports with violations
pub async fn verify_all<S: LedgerStore + ?Sized>(
    store: &S,
) -> Result<Vec<IntegrityReport>, StoreError> {
    let ids = store.list_ids().await?;
    let mut failures = Vec::new();

    for id in &ids {
        let report = verify_account(store, *id).await?;
        if !report.is_valid() {
            failures.push(report);
        }
    }

    tracing::info!(
        accounts = ids.len(),
        failed = failures.len(),
        "Ledger integrity verified"
    );

    Ok(failures)
}
