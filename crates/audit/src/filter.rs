//! Audit query filter

use crate::record::{AuditOutcome, AuditRecord};
use chrono::{DateTime, Utc};

/// Criteria for reading audit records; unset criteria match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor: Option<String>,
    pub action: Option<String>,
    pub outcome: Option<AuditOutcome>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records for one entity
    pub fn for_entity(entity_type: &str, entity_id: &str) -> Self {
        Self::new()
            .with_entity_type(entity_type)
            .with_entity_id(entity_id)
    }

    pub fn with_entity_type(mut self, entity_type: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self
    }

    pub fn with_entity_id(mut self, entity_id: &str) -> Self {
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Inclusive time range
    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        fn eq(want: &Option<String>, have: &str) -> bool {
            want.as_deref().map_or(true, |w| w == have)
        }

        eq(&self.entity_type, record.entity_type())
            && eq(&self.entity_id, record.entity_id())
            && eq(&self.actor, record.actor())
            && eq(&self.action, record.action())
            && self.outcome.map_or(true, |o| o == record.outcome())
            && self.from.map_or(true, |from| record.timestamp() >= from)
            && self.to.map_or(true, |to| record.timestamp() <= to)
    }
}
