//! Permission Resolver - actor → effective permissions → decision

use std::collections::HashSet;
use std::sync::Arc;

use foureyes_core::{Action, Actor, GovernanceError, GovernanceResult};

use crate::cache::PermissionCache;
use crate::config::AclConfig;
use crate::grant::{EffectivePermissions, GroupId};
use crate::pipeline::{AuthorizationPipeline, AuthorizationRequest, Decision, SuspendedActorStage};
use crate::store::{PermissionStore, PermissionStoreError};

/// Change notification from the external store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionChange {
    /// Group membership of a login changed
    Membership { login: String },
    /// Grants of a group changed
    Grants { group: GroupId },
    /// Anything may have changed
    All,
}

/// Resolves and caches permissions, then runs the authorization pipeline
pub struct PermissionResolver {
    store: Arc<dyn PermissionStore>,
    cache: PermissionCache,
    pipeline: AuthorizationPipeline,
    known_resources: Option<HashSet<String>>,
}

impl PermissionResolver {
    /// Create a resolver with the standard pipeline
    pub fn new(store: Arc<dyn PermissionStore>, config: &AclConfig) -> Self {
        let mut pipeline = AuthorizationPipeline::standard();
        if !config.suspended_logins.is_empty() {
            let stage = SuspendedActorStage::new(10);
            for login in &config.suspended_logins {
                stage.suspend(login);
            }
            pipeline.register(Arc::new(stage));
        }

        Self {
            store,
            cache: PermissionCache::new(config.cache_ttl()),
            pipeline,
            known_resources: config.resource_catalogue(),
        }
    }

    /// Replace the authorization pipeline
    pub fn with_pipeline(mut self, pipeline: AuthorizationPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn pipeline(&self) -> &AuthorizationPipeline {
        &self.pipeline
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    /// Effective capability map of an actor
    ///
    /// Served from the cache when fresh; otherwise looked up in the store.
    /// A login without a group resolves to an empty map. A lookup overtaken
    /// by a change notification is returned to its caller but not cached.
    pub async fn effective_permissions(&self, actor: &Actor) -> GovernanceResult<Arc<EffectivePermissions>> {
        if let Some(cached) = self.cache.get(actor.login()) {
            tracing::debug!(actor = %actor, "Permission cache hit");
            return Ok(cached);
        }

        tracing::debug!(actor = %actor, "Permission cache miss");
        let generation = self.cache.generation();
        let permissions = Arc::new(self.lookup(actor).await.map_err(|e| {
            tracing::error!(actor = %actor, error = %e, "Permission store lookup failed");
            GovernanceError::ExternalStoreUnavailable(e.to_string())
        })?);

        // An invalidation during the lookup may have made this result stale
        if !self.cache.insert_if_current(Arc::clone(&permissions), generation) {
            tracing::debug!(actor = %actor, "Permissions changed during lookup; not caching");
        }
        Ok(permissions)
    }

    async fn lookup(&self, actor: &Actor) -> Result<EffectivePermissions, PermissionStoreError> {
        let group = match self.store.find_group_for_login(actor.login()).await? {
            Some(group) => group,
            None => return Ok(EffectivePermissions::none(actor.login())),
        };

        let grants = self.store.find_grants_for_group(&group).await?;
        Ok(EffectivePermissions::from_grants(
            actor.login(),
            group,
            &grants,
            self.known_resources.as_ref(),
        ))
    }

    /// Decide whether an actor may perform an action on a resource
    pub async fn authorize(&self, actor: &Actor, resource: &str, action: Action) -> GovernanceResult<Decision> {
        let permissions = self.effective_permissions(actor).await?;
        let request = AuthorizationRequest::new(actor, resource, action);
        Ok(self.pipeline.evaluate(&request, &permissions))
    }

    /// Like `authorize`, but a denial becomes `UnauthorizedAction`
    pub async fn require(&self, actor: &Actor, resource: &str, action: Action) -> GovernanceResult<()> {
        match self.authorize(actor, resource, action).await? {
            Decision::Allow => Ok(()),
            Decision::Deny { reason, .. } => Err(GovernanceError::UnauthorizedAction {
                actor: actor.login().to_string(),
                resource: resource.to_string(),
                action,
                reason,
            }),
        }
    }

    /// Apply a change notification from the external store
    pub fn notify(&self, change: &PermissionChange) {
        tracing::debug!(change = ?change, "Invalidating permission cache");
        match change {
            PermissionChange::Membership { login } => {
                self.cache.invalidate(&foureyes_core::normalize_login(login))
            }
            PermissionChange::Grants { group } => self.cache.invalidate_group(group),
            PermissionChange::All => self.cache.invalidate_all(),
        }
    }
}
