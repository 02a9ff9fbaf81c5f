//! Audit errors

use foureyes_core::GovernanceError;
use thiserror::Error;

/// Errors from the audit ledger
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;

impl From<AuditError> for GovernanceError {
    fn from(err: AuditError) -> Self {
        GovernanceError::ExternalStoreUnavailable(err.to_string())
    }
}
