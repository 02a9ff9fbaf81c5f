//! Audit records

use chrono::{DateTime, Utc};
use foureyes_core::{Actor, GovernanceError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of an action attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "SUCCESS",
            AuditOutcome::Failure => "FAILURE",
        }
    }
}

/// An action attempt before it is sealed into the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: AuditOutcome,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub error_code: Option<String>,
    pub error_detail: Option<String>,
}

impl AuditEntry {
    fn new(actor: &Actor, action: &str, entity_type: &str, entity_id: &str, outcome: AuditOutcome) -> Self {
        Self {
            actor: actor.login().to_string(),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            timestamp: Utc::now(),
            outcome,
            before: None,
            after: None,
            error_code: None,
            error_detail: None,
        }
    }

    /// A successful action
    pub fn success(actor: &Actor, action: &str, entity_type: &str, entity_id: &str) -> Self {
        Self::new(actor, action, entity_type, entity_id, AuditOutcome::Success)
    }

    /// A failed action, carrying the error code and detail
    pub fn failure(
        actor: &Actor,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        error: &GovernanceError,
    ) -> Self {
        let mut entry = Self::new(actor, action, entity_type, entity_id, AuditOutcome::Failure);
        entry.error_code = Some(error.code().to_string());
        entry.error_detail = Some(error.to_string());
        entry
    }

    /// Snapshot before the action
    pub fn with_before(mut self, before: Option<Value>) -> Self {
        self.before = before;
        self
    }

    /// Snapshot after the action
    pub fn with_after(mut self, after: Option<Value>) -> Self {
        self.after = after;
        self
    }
}

/// A sealed, immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub sequence: u64,
    #[serde(flatten)]
    pub entry: AuditEntry,
    pub prev_hash: String,
    pub hash: String,
}

impl AuditRecord {
    pub fn actor(&self) -> &str {
        &self.entry.actor
    }

    pub fn action(&self) -> &str {
        &self.entry.action
    }

    pub fn entity_type(&self) -> &str {
        &self.entry.entity_type
    }

    pub fn entity_id(&self) -> &str {
        &self.entry.entity_id
    }

    pub fn outcome(&self) -> AuditOutcome {
        self.entry.outcome
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.entry.timestamp
    }

    pub fn is_failure(&self) -> bool {
        self.entry.outcome == AuditOutcome::Failure
    }
}
