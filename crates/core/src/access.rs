//! Access vocabulary - grant modes and requested actions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing access vocabulary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseAccessError {
    #[error("Unknown access mode: {0}")]
    UnknownMode(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

/// Access mode carried by a permission grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "READ",
            AccessMode::Write => "WRITE",
            AccessMode::ReadWrite => "READ_WRITE",
        }
    }

    /// Whether this mode grants read access
    pub fn allows_read(&self) -> bool {
        matches!(self, AccessMode::Read | AccessMode::ReadWrite)
    }

    /// Whether this mode grants write access
    pub fn allows_write(&self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::ReadWrite)
    }

    /// Union of two modes (grants are additive)
    pub fn union(self, other: AccessMode) -> AccessMode {
        if self == other {
            self
        } else {
            AccessMode::ReadWrite
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = ParseAccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "READ" => Ok(AccessMode::Read),
            "WRITE" => Ok(AccessMode::Write),
            "READ_WRITE" | "READWRITE" => Ok(AccessMode::ReadWrite),
            other => Err(ParseAccessError::UnknownMode(other.to_string())),
        }
    }
}

/// Action requested on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    Approve,
    Close,
    Reactivate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Approve => "approve",
            Action::Close => "close",
            Action::Reactivate => "reactivate",
        }
    }

    /// Suffix of the dedicated action resource (`portfolio.approve`)
    ///
    /// Actions without a suffix are checked against the base resource's
    /// access mode.
    pub fn resource_suffix(&self) -> Option<&'static str> {
        match self {
            Action::Approve => Some("approve"),
            Action::Close => Some("close"),
            Action::Reactivate => Some("reactivate"),
            Action::View | Action::Create | Action::Edit | Action::Delete => None,
        }
    }

    /// Whether the action mutates state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Action::View)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseAccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "view" => Ok(Action::View),
            "create" => Ok(Action::Create),
            "edit" => Ok(Action::Edit),
            "delete" => Ok(Action::Delete),
            "approve" => Ok(Action::Approve),
            "close" => Ok(Action::Close),
            "reactivate" => Ok(Action::Reactivate),
            other => Err(ParseAccessError::UnknownAction(other.to_string())),
        }
    }
}
