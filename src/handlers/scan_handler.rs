//! Scan Handler
//!
//! Pays for an automation service with the scanned card's balance.

use serde_json::json;
use tracing::Instrument;

use crate::audit::{AuditAction, AuditLogBuilder, AuditQueue};
use crate::domain::{CardId, LedgerError, Operation, OperationContext, TransactionSource};
use crate::engine::LedgerEngine;
use crate::error::AppResult;
use crate::store::LedgerStore;

use super::commands::parse_decimal;
use super::{ScanCommand, ScanResponse};

/// Handler for automation scans
pub struct ScanHandler<S> {
    engine: LedgerEngine<S>,
    audit: AuditQueue,
}

impl<S: LedgerStore + 'static> ScanHandler<S> {
    pub fn new(engine: LedgerEngine<S>, audit: AuditQueue) -> Self {
        Self { engine, audit }
    }

    /// Execute the scan command.
    ///
    /// Business denials (unknown card, inactive account, insufficient
    /// balance) come back as an unapproved response. Invalid input and
    /// system failures are errors.
    pub async fn execute(
        &self,
        command: ScanCommand,
        context: &OperationContext,
    ) -> AppResult<ScanResponse> {
        let card_id = CardId::new(command.card_id);
        let amount = parse_decimal("amount", &command.amount)?;

        let operation = Operation::debit(amount, TransactionSource::Automation)
            .with_description(command.description.unwrap_or_default());

        match self
            .engine
            .apply_detailed(card_id.clone(), operation)
            .instrument(context.span("scan"))
            .await
        {
            // Built from the apply itself: once committed, nothing may turn
            // the scan into an error a device would retry
            Ok(applied) => Ok(ScanResponse::approved(&applied.account, &applied.transaction)),
            Err(e @ (LedgerError::CardUnknown { .. } | LedgerError::AccountInactive { .. })) => {
                self.audit.record(
                    AuditLogBuilder::new(AuditAction::ScanDenied)
                        .resource_type("card")
                        .details(&json!({
                            "card_id": card_id.as_str(),
                            "device_id": context.device_id,
                            "reason": e.code(),
                        }))
                        .build(context),
                );
                Ok(ScanResponse::denied())
            }
            Err(LedgerError::InsufficientBalance {
                required,
                current,
                deficit,
            }) => {
                // Read-only lookup for the device display
                let account = self.engine.store().get_by_card(&card_id).await.ok();
                let mut entry = AuditLogBuilder::new(AuditAction::LedgerRejected)
                    .resource_type("account")
                    .details(&json!({
                        "card_id": card_id.as_str(),
                        "reason": "insufficient_balance",
                        "required": required,
                        "current": current,
                    }));
                if let Some(account) = &account {
                    entry = entry.resource_id(account.id);
                }
                self.audit.record(entry.build(context));

                Ok(ScanResponse::insufficient(
                    account.as_ref(),
                    required,
                    current,
                    deficit,
                ))
            }
            Err(e) => Err(e.into()),
        }
    }
}
