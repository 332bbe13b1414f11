//! Bounded audit queue
//!
//! Producers never wait: `record` either enqueues or drops. A single writer
//! task drains the queue in order, so entries reach the sink in the order
//! they were accepted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::config::AuditConfig;

use super::{AuditEntry, AuditError, AuditSink};

const WRITE_BACKOFF_MS: u64 = 10;

/// Outcome counters for one writer's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditStats {
    /// Entries the sink accepted
    pub written: u64,
    /// Entries given up after exhausting write attempts
    pub failed: u64,
    /// Entries refused because the queue was full
    pub dropped: u64,
}

/// Producer side of the audit queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuditQueue {
    tx: mpsc::Sender<AuditEntry>,
    dropped: Arc<AtomicU64>,
}

/// Handle on the writer task
#[derive(Debug)]
pub struct AuditWorker {
    handle: JoinHandle<AuditStats>,
}

impl AuditQueue {
    /// Spawn the writer task and return both ends.
    ///
    /// The writer exits once every `AuditQueue` clone is dropped and the
    /// remaining entries are written.
    pub fn start(sink: Arc<dyn AuditSink>, config: AuditConfig) -> (Self, AuditWorker) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(run_writer(
            rx,
            sink,
            config.max_write_attempts.max(1),
            Arc::clone(&dropped),
        ));

        (Self { tx, dropped }, AuditWorker { handle })
    }

    /// Enqueue an entry without waiting. Returns `false` if it was dropped.
    pub fn record(&self, entry: AuditEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(TrySendError::Full(entry)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    audit_id = %entry.id,
                    action = %entry.action,
                    dropped_total = total,
                    "Audit queue full, entry dropped"
                );
                false
            }
            Err(TrySendError::Closed(entry)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::error!(
                    audit_id = %entry.id,
                    action = %entry.action,
                    dropped_total = total,
                    "Audit writer stopped, entry dropped"
                );
                false
            }
        }
    }

    /// Entries dropped so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditWorker {
    /// Wait for the writer to drain and stop. Drop every `AuditQueue` first.
    pub async fn join(self) -> Result<AuditStats, AuditError> {
        self.handle
            .await
            .map_err(|e| AuditError::WorkerStopped(e.to_string()))
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<AuditEntry>,
    sink: Arc<dyn AuditSink>,
    max_attempts: u32,
    dropped: Arc<AtomicU64>,
) -> AuditStats {
    let mut stats = AuditStats::default();

    while let Some(entry) = rx.recv().await {
        if write_with_retry(sink.as_ref(), &entry, max_attempts).await {
            stats.written += 1;
        } else {
            stats.failed += 1;
        }
    }

    stats.dropped = dropped.load(Ordering::Relaxed);
    tracing::debug!(
        written = stats.written,
        failed = stats.failed,
        dropped = stats.dropped,
        "Audit writer stopped"
    );
    stats
}

async fn write_with_retry(sink: &dyn AuditSink, entry: &AuditEntry, max_attempts: u32) -> bool {
    for attempt in 1..=max_attempts {
        match sink.write(entry).await {
            Ok(()) => return true,
            Err(e) if attempt < max_attempts => {
                tracing::warn!(
                    audit_id = %entry.id,
                    error = %e,
                    "Audit write failed, retrying (attempt {}/{})",
                    attempt,
                    max_attempts
                );
                tokio::time::sleep(Duration::from_millis(WRITE_BACKOFF_MS * attempt as u64)).await;
            }
            Err(e) => {
                tracing::error!(
                    audit_id = %entry.id,
                    action = %entry.action,
                    error = %e,
                    "Audit entry given up after {} attempts",
                    max_attempts
                );
            }
        }
    }
    false
}
