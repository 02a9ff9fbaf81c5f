//! Workflow states and transitions

use foureyes_core::Action;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a governed entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// Initial state, editable by the maker
    Draft,
    /// Awaiting a checker
    PendingApproval,
    /// Approved by a checker
    Approved,
    /// Effective (approved alias, or reactivated)
    Active,
    /// Sent back to the maker
    Rejected,
    /// Retired; retained for audit
    Closed,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 6] = [
        WorkflowStatus::Draft,
        WorkflowStatus::PendingApproval,
        WorkflowStatus::Approved,
        WorkflowStatus::Active,
        WorkflowStatus::Rejected,
        WorkflowStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "DRAFT",
            WorkflowStatus::PendingApproval => "PENDING_APPROVAL",
            WorkflowStatus::Approved => "APPROVED",
            WorkflowStatus::Active => "ACTIVE",
            WorkflowStatus::Rejected => "REJECTED",
            WorkflowStatus::Closed => "CLOSED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Some(WorkflowStatus::Draft),
            "PENDING_APPROVAL" => Some(WorkflowStatus::PendingApproval),
            "APPROVED" => Some(WorkflowStatus::Approved),
            "ACTIVE" => Some(WorkflowStatus::Active),
            "REJECTED" => Some(WorkflowStatus::Rejected),
            "CLOSED" => Some(WorkflowStatus::Closed),
            _ => None,
        }
    }

    /// Editable by the maker
    pub fn is_editable(&self) -> bool {
        matches!(self, WorkflowStatus::Draft | WorkflowStatus::Rejected)
    }

    /// Approved and in effect
    pub fn is_effective(&self) -> bool {
        matches!(self, WorkflowStatus::Approved | WorkflowStatus::Active)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation applied to a governed entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Create,
    Edit,
    Submit,
    Approve,
    Reject,
    Close,
    Reactivate,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Create => "create",
            Transition::Edit => "edit",
            Transition::Submit => "submit",
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::Close => "close",
            Transition::Reactivate => "reactivate",
        }
    }

    /// Capability the actor needs on the entity's resource
    pub fn required_action(&self) -> Action {
        match self {
            Transition::Create => Action::Create,
            Transition::Edit | Transition::Submit => Action::Edit,
            Transition::Approve | Transition::Reject => Action::Approve,
            Transition::Close => Action::Close,
            Transition::Reactivate => Action::Reactivate,
        }
    }

    /// Whether the entity may undergo this transition from `status`
    pub fn allowed_from(&self, status: WorkflowStatus) -> bool {
        match self {
            Transition::Create => false,
            Transition::Edit | Transition::Submit => status.is_editable(),
            Transition::Approve | Transition::Reject => status == WorkflowStatus::PendingApproval,
            Transition::Close => status.is_effective(),
            Transition::Reactivate => status == WorkflowStatus::Closed,
        }
    }

    /// Checker transitions subject to the self-approval ban
    pub fn is_review(&self) -> bool {
        matches!(self, Transition::Approve | Transition::Reject)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
