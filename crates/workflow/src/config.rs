//! Workflow configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::entity::GovernedEntity;
use foureyes_core::Actor;

/// Who is barred from reviewing an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfApprovalPolicy {
    /// Only the creator is barred
    Creator,
    /// Both the creator and the most recent submitter are barred
    CreatorOrSubmitter,
}

impl SelfApprovalPolicy {
    /// Whether `actor` is barred from reviewing `entity`
    pub fn bars(&self, entity: &GovernedEntity, actor: &Actor) -> bool {
        match self {
            SelfApprovalPolicy::Creator => entity.is_created_by(actor),
            SelfApprovalPolicy::CreatorOrSubmitter => {
                entity.is_created_by(actor) || entity.is_submitted_by(actor)
            }
        }
    }
}

fn default_policy() -> SelfApprovalPolicy {
    SelfApprovalPolicy::CreatorOrSubmitter
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// Workflow engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_policy")]
    pub self_approval_policy: SelfApprovalPolicy,

    /// Approval lands in ACTIVE instead of APPROVED
    #[serde(default)]
    pub approved_alias_active: bool,

    /// Deadline applied when the caller does not supply one
    #[serde(default = "default_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            self_approval_policy: default_policy(),
            approved_alias_active: false,
            operation_timeout_ms: default_timeout_ms(),
        }
    }
}

impl WorkflowConfig {
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn with_policy(mut self, policy: SelfApprovalPolicy) -> Self {
        self.self_approval_policy = policy;
        self
    }
}
