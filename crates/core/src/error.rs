//! Governance errors
//!
//! Business-rule failures are recovered into a structured result and always
//! audited. Infrastructure failures propagate to the caller unaudited and are
//! reported through logging only.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::access::Action;

/// Kind of a single field validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    RequiredFieldMissing,
    FieldTypeMismatch,
    FieldConstraintViolation,
    DuplicateValue,
    UnknownField,
    InactiveField,
}

/// A validation failure for one user-defined field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, kind: FieldErrorKind, message: String) -> Self {
        Self {
            field: field.to_string(),
            kind,
            message,
        }
    }

    pub fn required(field: &str) -> Self {
        Self::new(
            field,
            FieldErrorKind::RequiredFieldMissing,
            format!("{} is required", field),
        )
    }

    pub fn type_mismatch(field: &str, expected: &str) -> Self {
        Self::new(
            field,
            FieldErrorKind::FieldTypeMismatch,
            format!("{} expects a {} value", field, expected),
        )
    }

    pub fn constraint(field: &str, detail: impl Into<String>) -> Self {
        Self::new(field, FieldErrorKind::FieldConstraintViolation, detail.into())
    }

    pub fn duplicate(field: &str, held_by: &str) -> Self {
        Self::new(
            field,
            FieldErrorKind::DuplicateValue,
            format!("{} value is already used by {}", field, held_by),
        )
    }

    pub fn unknown(field: &str, entity_type: &str) -> Self {
        Self::new(
            field,
            FieldErrorKind::UnknownField,
            format!("{} is not defined for {}", field, entity_type),
        )
    }

    pub fn inactive(field: &str) -> Self {
        Self::new(
            field,
            FieldErrorKind::InactiveField,
            format!("{} has been deactivated", field),
        )
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by the governance core
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GovernanceError {
    #[error("Identity unresolved: no identity source yielded a value")]
    IdentityUnresolved,

    #[error("Access denied: {actor} may not {action} {resource} ({reason})")]
    UnauthorizedAction {
        actor: String,
        resource: String,
        action: Action,
        reason: String,
    },

    #[error("Invalid state transition: cannot {transition} {entity_id} while {from}")]
    InvalidStateTransition {
        entity_id: String,
        from: String,
        transition: String,
    },

    #[error("Self-approval violation: {actor} cannot {transition} {entity_id} because they authored or submitted it")]
    SelfApprovalViolation {
        actor: String,
        entity_id: String,
        transition: String,
    },

    #[error("Concurrent modification of {entity_id}: re-read the entity and retry")]
    ConcurrentModification { entity_id: String },

    #[error("Validation failed: {}", summarize(.0))]
    ValidationFailed(Vec<FieldError>),

    #[error("{operation} requires non-empty comments")]
    MissingComments { operation: String },

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("External store unavailable: {0}")]
    ExternalStoreUnavailable(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for governance operations
pub type GovernanceResult<T> = Result<T, GovernanceError>;

impl GovernanceError {
    /// Business-rule failures are audited; infrastructure failures are not
    pub fn is_business_rule(&self) -> bool {
        !matches!(
            self,
            GovernanceError::ExternalStoreUnavailable(_) | GovernanceError::Timeout(_)
        )
    }

    /// Whether the caller may retry (after re-reading state where relevant)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GovernanceError::ConcurrentModification { .. }
                | GovernanceError::ExternalStoreUnavailable(_)
                | GovernanceError::Timeout(_)
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            GovernanceError::IdentityUnresolved => "IDENTITY_UNRESOLVED",
            GovernanceError::UnauthorizedAction { .. } => "UNAUTHORIZED_ACTION",
            GovernanceError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            GovernanceError::SelfApprovalViolation { .. } => "SELF_APPROVAL_VIOLATION",
            GovernanceError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            GovernanceError::ValidationFailed(_) => "VALIDATION_FAILED",
            GovernanceError::MissingComments { .. } => "MISSING_COMMENTS",
            GovernanceError::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            GovernanceError::ExternalStoreUnavailable(_) => "EXTERNAL_STORE_UNAVAILABLE",
            GovernanceError::Timeout(_) => "TIMEOUT",
        }
    }

    /// Field errors carried by a validation failure
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            GovernanceError::ValidationFailed(errors) => errors,
            _ => &[],
        }
    }
}
