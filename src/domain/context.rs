//! Operation Context
//!
//! Who or what triggered a ledger call. Handed in by the transport layer;
//! never consulted for business decisions.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::Span;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationContext {
    /// Authenticated admin, absent for automation devices
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,

    /// Reader that produced a scan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a call coming from an automation reader
    pub fn for_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            correlation_id: Some(Uuid::new_v4()),
            ..Self::default()
        }
    }

    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Span carrying the caller identity, for instrumenting a handler call
    pub fn span(&self, operation: &'static str) -> Span {
        tracing::info_span!(
            "ledger_call",
            operation,
            actor = ?self.actor_id,
            device = self.device_id.as_deref().unwrap_or("-"),
            correlation_id = ?self.correlation_id,
        )
    }
}
