//! Adjustment Handler
//!
//! Admin-initiated credit, debit or refund on an account.

use serde_json::json;
use tracing::Instrument;

use crate::audit::{AuditAction, AuditLogBuilder, AuditQueue};
use crate::domain::{Operation, OperationContext, Transaction, TransactionSource};
use crate::engine::LedgerEngine;
use crate::error::{AppError, AppResult};
use crate::store::LedgerStore;

use super::commands::parse_decimal;
use super::AdjustBalanceCommand;

/// Handler for admin balance adjustments
pub struct AdjustmentHandler<S> {
    engine: LedgerEngine<S>,
    audit: AuditQueue,
}

impl<S: LedgerStore + 'static> AdjustmentHandler<S> {
    pub fn new(engine: LedgerEngine<S>, audit: AuditQueue) -> Self {
        Self { engine, audit }
    }

    /// Execute the adjustment. Every rejection is returned as an error.
    pub async fn execute(
        &self,
        command: AdjustBalanceCommand,
        context: &OperationContext,
    ) -> AppResult<Transaction> {
        if command.actor_id.is_nil() {
            return Err(AppError::InvalidRequest(
                "admin adjustments require an actor".to_string(),
            ));
        }
        let amount = parse_decimal("amount", &command.amount)?;

        let operation = Operation::new(command.kind, amount, TransactionSource::Admin)
            .with_description(command.description.unwrap_or_default())
            .by_actor(command.actor_id);

        match self
            .engine
            .apply(command.account_id, operation)
            .instrument(context.span("adjust"))
            .await
        {
            Ok(tx) => Ok(tx),
            Err(e) => {
                if e.is_client_error() {
                    self.audit.record(
                        AuditLogBuilder::new(AuditAction::LedgerRejected)
                            .resource_type("account")
                            .resource_id(command.account_id)
                            .details(&json!({
                                "kind": command.kind,
                                "amount": command.amount,
                                "reason": e.code(),
                            }))
                            .build(context),
                    );
                }
                Err(e.into())
            }
        }
    }
}
