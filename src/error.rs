//! Error handling module
//!
//! Centralized error type for the command handlers and binaries, plus the
//! serializable body a transport layer can hand back to its caller.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::LedgerError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    // Ledger rejections carry their own reason code
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // Server errors
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    /// Stable, machine-checkable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::TransactionNotFound(_) => "transaction_not_found",
            AppError::Ledger(e) => e.code(),
            AppError::Store(_) => "storage_error",
        }
    }

    /// Check if the caller, not the system, is at fault
    pub fn is_client_error(&self) -> bool {
        match self {
            AppError::InvalidRequest(_) | AppError::TransactionNotFound(_) => true,
            AppError::Ledger(e) => e.is_client_error(),
            AppError::Store(_) => false,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        // Server-side details stay in the logs
        let details = if err.is_client_error() {
            Some(err.to_string())
        } else {
            tracing::error!(error = ?err, code = err.error_code(), "Request failed");
            None
        };

        Self {
            error: if err.is_client_error() {
                err.to_string()
            } else {
                "Internal error".to_string()
            },
            error_code: err.error_code().to_string(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ledger_error_code_passes_through() {
        let err: AppError = LedgerError::insufficient_balance(dec!(80), dec!(20)).into();
        assert_eq!(err.error_code(), "insufficient_balance");
        assert!(err.is_client_error());

        let body = ErrorResponse::from(&err);
        assert_eq!(body.error_code, "insufficient_balance");
        assert!(body.details.unwrap().contains("deficit 60"));
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err: AppError = StoreError::Unavailable("pool timed out".to_string()).into();
        assert!(!err.is_client_error());

        let body = ErrorResponse::from(&err);
        assert_eq!(body.error_code, "storage_error");
        assert_eq!(body.error, "Internal error");
        assert!(body.details.is_none());
    }
}
