//! Audit Log
//!
//! Side logging for events that happen outside the atomic ledger unit:
//! denied scans, rejected operations and account lifecycle changes. Ledger
//! transactions themselves are their own audit trail and never pass through
//! here.
//!
//! Entries go through a bounded, ordered [`AuditQueue`]. When the queue is
//! full new entries are dropped and counted; each queued entry gets a bounded
//! number of write attempts.

mod queue;
mod sink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use crate::domain::OperationContext;

pub use queue::{AuditQueue, AuditStats, AuditWorker};
pub use sink::{AuditError, AuditSink, MemoryAuditSink, PgAuditSink};

/// Audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
    pub client_ip: Option<IpAddr>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    ScanDenied,
    LedgerRejected,
    AccountCreated,
    AccountActivated,
    AccountDeactivated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ScanDenied => "scan.denied",
            AuditAction::LedgerRejected => "ledger.rejected",
            AuditAction::AccountCreated => "account.created",
            AuditAction::AccountActivated => "account.activated",
            AuditAction::AccountDeactivated => "account.deactivated",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builder for creating audit log entries
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    action: AuditAction,
    resource_type: Option<String>,
    resource_id: Option<Uuid>,
    details: Option<serde_json::Value>,
}

impl AuditLogBuilder {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            resource_type: None,
            resource_id: None,
            details: None,
        }
    }

    pub fn resource_type(mut self, resource_type: &str) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self
    }

    pub fn resource_id(mut self, resource_id: Uuid) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    /// Attach a serializable payload; one that fails to serialize is omitted
    pub fn details<T: Serialize>(mut self, details: &T) -> Self {
        self.details = serde_json::to_value(details).ok();
        self
    }

    pub fn build(self, context: &OperationContext) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            action: self.action.as_str().to_string(),
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            actor_id: context.actor_id,
            correlation_id: context.correlation_id,
            client_ip: context.client_ip,
            details: self.details,
            created_at: Utc::now(),
        }
    }
}
