//! Permission grants and the effective permission set of an actor

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use foureyes_core::{AccessMode, Action};
use serde::{Deserialize, Serialize};

/// Identifier of a group in the external store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `(group, resource, access mode)` assignment
///
/// Approval rights are granted on a dedicated action resource such as
/// `portfolio.approve`, independently of write rights on `portfolio`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub group_id: GroupId,
    pub resource_name: String,
    pub access_mode: AccessMode,
    /// Inactive grants are retained by the store but excluded from lookups
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl PermissionGrant {
    pub fn new(group_id: GroupId, resource_name: impl Into<String>, access_mode: AccessMode) -> Self {
        Self {
            group_id,
            resource_name: resource_name.into(),
            access_mode,
            is_active: true,
        }
    }

    /// Mark the grant inactive
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Effective capability map of one actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissions {
    pub login: String,
    pub group: Option<GroupId>,
    pub modes: BTreeMap<String, AccessMode>,
}

impl EffectivePermissions {
    /// An actor with no group: every request is denied
    pub fn none(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            group: None,
            modes: BTreeMap::new(),
        }
    }

    /// Union active grants into one map keyed by resource name
    ///
    /// When a catalogue of known resources is supplied, grants naming an
    /// unknown resource are skipped.
    pub fn from_grants(
        login: impl Into<String>,
        group: GroupId,
        grants: &[PermissionGrant],
        known_resources: Option<&HashSet<String>>,
    ) -> Self {
        let login = login.into();
        let mut modes: BTreeMap<String, AccessMode> = BTreeMap::new();

        for grant in grants.iter().filter(|g| g.is_active) {
            if let Some(known) = known_resources {
                if !known.contains(&grant.resource_name) {
                    tracing::warn!(
                        group = %grant.group_id,
                        resource = %grant.resource_name,
                        "Ignoring grant on unknown resource"
                    );
                    continue;
                }
            }
            modes
                .entry(grant.resource_name.clone())
                .and_modify(|mode| *mode = mode.union(grant.access_mode))
                .or_insert(grant.access_mode);
        }

        Self {
            login,
            group: Some(group),
            modes,
        }
    }

    /// Access mode on a resource, if any
    pub fn mode_for(&self, resource: &str) -> Option<AccessMode> {
        self.modes.get(resource).copied()
    }

    /// Name of the resource a request is checked against
    pub fn required_resource(resource: &str, action: Action) -> String {
        match action.resource_suffix() {
            Some(suffix) => format!("{}.{}", resource, suffix),
            None => resource.to_string(),
        }
    }

    /// Check an action against the grants
    ///
    /// - view requires READ or READ_WRITE on the resource
    /// - create/edit/delete require WRITE or READ_WRITE on the resource
    /// - approve/close/reactivate require WRITE or READ_WRITE on the
    ///   dedicated action resource (`<resource>.approve`, ...)
    pub fn check(&self, resource: &str, action: Action) -> Result<(), String> {
        let required = Self::required_resource(resource, action);
        let mode = match self.mode_for(&required) {
            Some(mode) => mode,
            None => return Err(format!("no grant on {}", required)),
        };

        let allowed = match action {
            Action::View => mode.allows_read(),
            _ => mode.allows_write(),
        };

        if allowed {
            Ok(())
        } else {
            Err(format!("{} grant on {} does not permit {}", mode, required, action))
        }
    }

    pub fn allows(&self, resource: &str, action: Action) -> bool {
        self.check(resource, action).is_ok()
    }
}
