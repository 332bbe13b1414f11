//! Account Handler
//!
//! Account creation and activation. Balances are never touched here beyond
//! the opening balance.

use crate::audit::{AuditAction, AuditLogBuilder, AuditQueue};
use crate::domain::{Account, Balance, LedgerError, NewAccount, OperationContext};
use crate::engine::LedgerEngine;
use crate::error::{AppError, AppResult};
use crate::store::LedgerStore;

use super::commands::parse_decimal;
use super::{CreateAccountCommand, SetActiveCommand};

/// Handler for account lifecycle commands
pub struct AccountHandler<S> {
    engine: LedgerEngine<S>,
    audit: AuditQueue,
}

impl<S: LedgerStore + 'static> AccountHandler<S> {
    pub fn new(engine: LedgerEngine<S>, audit: AuditQueue) -> Self {
        Self { engine, audit }
    }

    /// Register a card holder
    pub async fn create(
        &self,
        command: CreateAccountCommand,
        context: &OperationContext,
    ) -> AppResult<Account> {
        let name = command.name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidRequest("name must not be empty".to_string()));
        }

        let mut new_account = NewAccount::new(command.card_id.as_str(), name);
        if new_account.card_id.is_empty() {
            return Err(AppError::InvalidRequest("card_id must not be empty".to_string()));
        }

        if let Some(raw) = &command.initial_balance {
            let value = parse_decimal("initial_balance", raw)?;
            let balance = Balance::new(value).map_err(LedgerError::from)?;
            new_account = new_account.with_initial_balance(balance);
        }
        if let Some(email) = command.email {
            new_account = new_account.with_email(email);
        }
        if let Some(phone) = command.phone {
            new_account = new_account.with_phone(phone);
        }

        let account = self
            .engine
            .store()
            .create(new_account)
            .await
            .map_err(LedgerError::from)?;

        tracing::info!(
            account_id = %account.id,
            card_id = %account.card_id,
            initial_balance = %account.initial_balance.value(),
            "Account created"
        );

        self.audit.record(
            AuditLogBuilder::new(AuditAction::AccountCreated)
                .resource_type("account")
                .resource_id(account.id)
                .details(&account)
                .build(context),
        );

        Ok(account)
    }

    /// Activate or deactivate an account
    pub async fn set_active(
        &self,
        command: SetActiveCommand,
        context: &OperationContext,
    ) -> AppResult<Account> {
        let account = self
            .engine
            .set_active(command.account_id, command.active)
            .await?;

        let action = if command.active {
            AuditAction::AccountActivated
        } else {
            AuditAction::AccountDeactivated
        };
        self.audit.record(
            AuditLogBuilder::new(action)
                .resource_type("account")
                .resource_id(account.id)
                .build(context),
        );

        Ok(account)
    }
}
