//! Per-account serialization
//!
//! At most one apply may hold a given account at a time; distinct accounts
//! never contend. Lock entries live only while someone holds or waits for
//! them.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::LedgerError;

type LockTable = DashMap<Uuid, Arc<Mutex<()>>>;

/// Drop the table entry if nobody but the table references it
fn prune(locks: &LockTable, account_id: Uuid) {
    locks.remove_if(&account_id, |_, lock| Arc::strong_count(lock) == 1);
}

/// Prunes the entry when `acquire` exits, including when its future is
/// dropped mid-wait. Declared before the waiting future so it drops after it.
struct PruneOnExit<'a> {
    locks: &'a LockTable,
    account_id: Uuid,
}

impl Drop for PruneOnExit<'_> {
    fn drop(&mut self) {
        prune(self.locks, self.account_id);
    }
}

/// Exclusive hold on one account. Released on drop, on every exit path.
#[derive(Debug)]
pub struct AccountGuard {
    account_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockTable>,
}

impl AccountGuard {
    pub fn account_id(&self) -> Uuid {
        self.account_id
    }
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        // Release the mutex before pruning so the entry's count can reach one
        drop(self.guard.take());
        prune(&self.locks, self.account_id);
        tracing::trace!(account_id = %self.account_id, "Account serialization released");
    }
}

/// Hands out per-account exclusive holds
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyController {
    locks: Arc<LockTable>,
}

impl ConcurrencyController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `account_id`.
    ///
    /// The deadline bounds only the wait. Once this returns, the caller owns
    /// the account until the guard is dropped.
    pub async fn acquire(
        &self,
        account_id: Uuid,
        deadline: Option<Duration>,
    ) -> Result<AccountGuard, LedgerError> {
        let _prune = PruneOnExit {
            locks: &self.locks,
            account_id,
        };

        let lock = self
            .locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        let waited = match deadline {
            Some(limit) => tokio::time::timeout(limit, lock.lock_owned()).await.ok(),
            None => Some(lock.lock_owned().await),
        };

        let Some(guard) = waited else {
            tracing::warn!(
                account_id = %account_id,
                timeout_ms = deadline.map(|d| d.as_millis() as u64).unwrap_or_default(),
                "Timed out waiting for account serialization"
            );
            return Err(LedgerError::LockTimeout { account_id });
        };

        tracing::trace!(account_id = %account_id, "Account serialization acquired");

        Ok(AccountGuard {
            account_id,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        })
    }

    /// Number of accounts currently held or waited on
    pub fn tracked_accounts(&self) -> usize {
        self.locks.len()
    }
}
