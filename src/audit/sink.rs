//! Audit sinks
//!
//! Where queued audit entries end up.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::AuditEntry;

/// Audit log error types
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("Audit writer stopped: {0}")]
    WorkerStopped(String),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Writes entries to the `audit_logs` table
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn write(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        // Idempotent on id, so a retry after an ambiguous failure is harmless
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, action, resource_type, resource_id,
                actor_id, correlation_id, client_ip, details, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(entry.resource_id)
        .bind(entry.actor_id)
        .bind(entry.correlation_id)
        .bind(entry.client_ip.map(|ip| ip.to_string()))
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            audit_id = %entry.id,
            action = %entry.action,
            "Audit log entry created"
        );

        Ok(())
    }
}

/// Keeps entries in memory. Used by single-process deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    failures: AtomicU32,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Snapshot of everything written so far, in write order
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AuditError::Unavailable("injected failure".to_string()));
        }

        self.entries
            .lock()
            .map_err(|_| AuditError::Unavailable("audit sink lock poisoned".to_string()))?
            .push(entry.clone());
        Ok(())
    }
}
