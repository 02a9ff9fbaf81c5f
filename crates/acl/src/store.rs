//! Permission Store Adapter - read-only view of group membership and grants
//!
//! The core never writes group or grant data; the adapter is a keyed lookup
//! surface over an external relational store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use foureyes_core::{normalize_login, AccessMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grant::{GroupId, PermissionGrant};

/// Errors from a permission store
#[derive(Debug, Error)]
pub enum PermissionStoreError {
    #[error("Permission store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Read-only adapter over the external group/grant store
///
/// Both lookups are case-insensitive on login.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Group the login currently belongs to, if any
    async fn find_group_for_login(&self, login: &str) -> Result<Option<GroupId>, PermissionStoreError>;

    /// All grants (active and inactive) held by a group
    async fn find_grants_for_group(&self, group: &GroupId) -> Result<Vec<PermissionGrant>, PermissionStoreError>;
}

/// On-disk layout of a static permission file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionFile {
    /// login → group
    #[serde(default)]
    pub memberships: HashMap<String, GroupId>,

    #[serde(default)]
    pub grants: Vec<PermissionGrant>,
}

/// In-memory permission store
///
/// Backs tests and the CLI (loaded from `permissions.json`). Counts lookups
/// and can be switched to "unavailable" to exercise infrastructure failures.
#[derive(Debug, Default)]
pub struct StaticPermissionStore {
    memberships: RwLock<HashMap<String, GroupId>>,
    grants: RwLock<HashMap<GroupId, Vec<PermissionGrant>>>,
    unavailable: AtomicBool,
    lookups: AtomicUsize,
}

impl StaticPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a permission file structure
    pub fn from_permission_file(file: PermissionFile) -> Self {
        let store = Self::new();
        for (login, group) in file.memberships {
            store.add_member(&login, group);
        }
        for grant in file.grants {
            store.insert_grant(grant);
        }
        store
    }

    /// Load a store from a JSON permission file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PermissionStoreError> {
        let content = std::fs::read_to_string(path)?;
        let file: PermissionFile = serde_json::from_str(&content)?;
        Ok(Self::from_permission_file(file))
    }

    /// Put a login into a group (replacing any previous membership)
    pub fn add_member(&self, login: &str, group: GroupId) {
        let mut memberships = self.memberships.write().unwrap_or_else(|e| e.into_inner());
        memberships.insert(normalize_login(login), group);
    }

    /// Remove a login from its group
    pub fn remove_member(&self, login: &str) {
        let mut memberships = self.memberships.write().unwrap_or_else(|e| e.into_inner());
        memberships.remove(&normalize_login(login));
    }

    /// Grant an access mode on a resource to a group
    pub fn grant(&self, group: &GroupId, resource: &str, mode: AccessMode) {
        self.insert_grant(PermissionGrant::new(group.clone(), resource, mode));
    }

    /// Soft-revoke every grant of a group on a resource
    pub fn revoke(&self, group: &GroupId, resource: &str) {
        let mut grants = self.grants.write().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = grants.get_mut(group) {
            for grant in list.iter_mut().filter(|g| g.resource_name == resource) {
                grant.is_active = false;
            }
        }
    }

    fn insert_grant(&self, grant: PermissionGrant) {
        let mut grants = self.grants.write().unwrap_or_else(|e| e.into_inner());
        grants.entry(grant.group_id.clone()).or_default().push(grant);
    }

    /// Simulate the store becoming (un)reachable
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of lookups served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn begin_lookup(&self) -> Result<(), PermissionStoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PermissionStoreError::Unavailable(
                "static store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for StaticPermissionStore {
    async fn find_group_for_login(&self, login: &str) -> Result<Option<GroupId>, PermissionStoreError> {
        self.begin_lookup()?;
        let memberships = self.memberships.read().unwrap_or_else(|e| e.into_inner());
        Ok(memberships.get(&normalize_login(login)).cloned())
    }

    async fn find_grants_for_group(&self, group: &GroupId) -> Result<Vec<PermissionGrant>, PermissionStoreError> {
        self.begin_lookup()?;
        let grants = self.grants.read().unwrap_or_else(|e| e.into_inner());
        Ok(grants.get(group).cloned().unwrap_or_default())
    }
}
