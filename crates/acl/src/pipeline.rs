//! Authorization pipeline - explicit ordered stages composed by the caller
//!
//! Stages are pure functions of the request and the resolved permission set,
//! so tests can run the pipeline directly without a request stack.
//!
//! ```text
//! request ──► stage (priority 10) ──► stage (priority 100) ──► ...
//!                 │ Deny                  │ Deny
//!                 ▼                       ▼
//!              Decision::Deny (first Deny wins)
//!
//! no Deny and at least one Allow ──► Decision::Allow
//! otherwise                      ──► Decision::Deny (deny-by-default)
//! ```

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use foureyes_core::{normalize_login, Action, Actor};

use crate::grant::EffectivePermissions;

/// A single authorization question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub actor: Actor,
    pub resource: String,
    pub action: Action,
}

impl AuthorizationRequest {
    pub fn new(actor: &Actor, resource: impl Into<String>, action: Action) -> Self {
        Self {
            actor: actor.clone(),
            resource: resource.into(),
            action,
        }
    }
}

/// Verdict of one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageVerdict {
    Allow,
    Deny { reason: String },
    /// The stage has no opinion on this request
    Abstain,
}

impl StageVerdict {
    pub fn deny(reason: impl Into<String>) -> Self {
        StageVerdict::Deny {
            reason: reason.into(),
        }
    }
}

/// Final decision of the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { stage: String, reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn is_denied(&self) -> bool {
        !self.is_allowed()
    }
}

/// One stage of the pipeline
pub trait AuthorizationStage: Send + Sync {
    /// Stage name for logging/debugging
    fn name(&self) -> &str;

    /// Priority (lower = runs first)
    fn priority(&self) -> u32 {
        100
    }

    fn evaluate(&self, request: &AuthorizationRequest, permissions: &EffectivePermissions) -> StageVerdict;
}

/// Ordered set of authorization stages
#[derive(Clone)]
pub struct AuthorizationPipeline {
    stages: Vec<Arc<dyn AuthorizationStage>>,
}

impl Default for AuthorizationPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl AuthorizationPipeline {
    /// A pipeline with no stages (denies everything)
    pub fn empty() -> Self {
        Self { stages: Vec::new() }
    }

    /// A pipeline with the grant check only
    pub fn standard() -> Self {
        let mut pipeline = Self::empty();
        pipeline.register(Arc::new(GrantStage));
        pipeline
    }

    /// Register a stage
    pub fn register(&mut self, stage: Arc<dyn AuthorizationStage>) {
        self.stages.push(stage);
        // Stable sort keeps registration order among equal priorities
        self.stages.sort_by_key(|s| s.priority());
    }

    /// Builder-style registration
    pub fn with_stage(mut self, stage: Arc<dyn AuthorizationStage>) -> Self {
        self.register(stage);
        self
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Stage names in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order
    pub fn evaluate(&self, request: &AuthorizationRequest, permissions: &EffectivePermissions) -> Decision {
        let mut allowed = false;

        for stage in &self.stages {
            match stage.evaluate(request, permissions) {
                StageVerdict::Allow => {
                    allowed = true;
                }
                StageVerdict::Deny { reason } => {
                    tracing::warn!(
                        stage = stage.name(),
                        actor = %request.actor,
                        resource = %request.resource,
                        action = %request.action,
                        reason = %reason,
                        "Authorization denied"
                    );
                    return Decision::Deny {
                        stage: stage.name().to_string(),
                        reason,
                    };
                }
                StageVerdict::Abstain => {}
            }
        }

        if allowed {
            tracing::debug!(
                actor = %request.actor,
                resource = %request.resource,
                action = %request.action,
                "Authorization allowed"
            );
            Decision::Allow
        } else {
            Decision::Deny {
                stage: "pipeline".to_string(),
                reason: "no stage granted access".to_string(),
            }
        }
    }
}

// =============================================================================
// GrantStage - maps the requested action onto the union of group grants
// =============================================================================

/// Allows exactly what the actor's grants permit, denies everything else
pub struct GrantStage;

impl AuthorizationStage for GrantStage {
    fn name(&self) -> &str {
        "grant_stage"
    }

    fn evaluate(&self, request: &AuthorizationRequest, permissions: &EffectivePermissions) -> StageVerdict {
        match permissions.check(&request.resource, request.action) {
            Ok(()) => StageVerdict::Allow,
            Err(reason) => StageVerdict::deny(reason),
        }
    }
}

// =============================================================================
// SuspendedActorStage - explicit deny list
// =============================================================================

/// Denies suspended logins before any grant is considered
pub struct SuspendedActorStage {
    priority: u32,
    suspended: RwLock<HashSet<String>>,
}

impl SuspendedActorStage {
    pub fn new(priority: u32) -> Self {
        Self {
            priority,
            suspended: RwLock::new(HashSet::new()),
        }
    }

    pub fn suspend(&self, login: &str) {
        let mut suspended = self.suspended.write().unwrap_or_else(|e| e.into_inner());
        suspended.insert(normalize_login(login));
    }

    pub fn reinstate(&self, login: &str) {
        let mut suspended = self.suspended.write().unwrap_or_else(|e| e.into_inner());
        suspended.remove(&normalize_login(login));
    }

    pub fn is_suspended(&self, login: &str) -> bool {
        let suspended = self.suspended.read().unwrap_or_else(|e| e.into_inner());
        suspended.contains(&normalize_login(login))
    }
}

impl AuthorizationStage for SuspendedActorStage {
    fn name(&self) -> &str {
        "suspended_actor_stage"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn evaluate(&self, request: &AuthorizationRequest, _permissions: &EffectivePermissions) -> StageVerdict {
        if self.is_suspended(request.actor.login()) {
            return StageVerdict::deny(format!("{} is suspended", request.actor));
        }
        StageVerdict::Abstain
    }
}
