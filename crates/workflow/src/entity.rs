//! Governed entities and their transition history

use chrono::{DateTime, Utc};
use foureyes_core::Actor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::WorkflowStatus;

/// A business record under dual control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernedEntity {
    /// Unique identifier
    pub id: String,

    /// Entity kind (e.g. `portfolio`), mapped to a resource name
    pub kind: String,

    pub status: WorkflowStatus,

    /// Business content proposed by the maker
    pub payload: Value,

    /// Login of the creator; never changes after creation
    pub created_by: String,
    pub created_at: DateTime<Utc>,

    pub last_modified_by: String,
    pub last_modified_at: DateTime<Utc>,

    /// Login of whoever last submitted the entity for approval
    pub submitted_by: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,

    /// Checker comments, or the reactivation justification
    pub review_comments: Option<String>,

    /// Bumped on every change; used for compare-and-swap
    pub version: u64,
}

impl GovernedEntity {
    /// A new draft authored by `actor`
    pub fn draft(kind: &str, payload: Value, actor: &Actor) -> Self {
        let id = format!(
            "{}-{}",
            kind.to_uppercase(),
            uuid::Uuid::new_v4().simple().to_string()[..12].to_uppercase()
        );
        let now = Utc::now();

        Self {
            id,
            kind: kind.to_string(),
            status: WorkflowStatus::Draft,
            payload,
            created_by: actor.login().to_string(),
            created_at: now,
            last_modified_by: actor.login().to_string(),
            last_modified_at: now,
            submitted_by: None,
            submitted_at: None,
            review_comments: None,
            version: 1,
        }
    }

    /// Whether `actor` authored this entity
    pub fn is_created_by(&self, actor: &Actor) -> bool {
        actor.is(&self.created_by)
    }

    /// Whether `actor` submitted this entity for approval
    pub fn is_submitted_by(&self, actor: &Actor) -> bool {
        self.submitted_by.as_deref().map_or(false, |s| actor.is(s))
    }

    /// Next version of this entity, modified by `actor`
    pub fn successor(&self, actor: &Actor) -> Self {
        let mut next = self.clone();
        next.last_modified_by = actor.login().to_string();
        next.last_modified_at = Utc::now();
        next.version = self.version + 1;
        next
    }

    /// JSON snapshot for audit before/after values
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// One successful status transition; immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowHistoryRecord {
    pub id: String,
    pub entity_id: String,
    pub from_status: WorkflowStatus,
    pub to_status: WorkflowStatus,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub comments: Option<String>,
}

impl WorkflowHistoryRecord {
    pub fn new(
        entity_id: &str,
        from_status: WorkflowStatus,
        to_status: WorkflowStatus,
        actor: &Actor,
        comments: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity_id.to_string(),
            from_status,
            to_status,
            actor: actor.login().to_string(),
            timestamp: Utc::now(),
            comments,
        }
    }
}
