//! Maker-checker workflow engine
//!
//! Every operation follows the same pipeline:
//!
//! 1. load the entity (under the caller's deadline)
//! 2. self-approval ban for review transitions
//! 3. source-state check
//! 4. authorization on the entity kind's resource
//! 5. compare-and-swap of the new state together with its history record
//! 6. exactly one audit record for the attempt, under its own budget
//!
//! Business-rule failures are audited and returned. Infrastructure failures
//! (store unavailable, deadline exceeded) are logged and propagated without
//! an audit record. A failed audit write is logged and never turns a
//! committed transition into an error.

use std::sync::Arc;

use foureyes_acl::PermissionResolver;
use foureyes_audit::{AuditEntry, AuditSink};
use foureyes_core::{Actor, Deadline, GovernanceError, GovernanceResult};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::WorkflowConfig;
use crate::entity::{GovernedEntity, WorkflowHistoryRecord};
use crate::resource::ResourceMap;
use crate::status::{Transition, WorkflowStatus};
use crate::store::{EntityStore, SwapOutcome};

/// Entity type recorded when the target entity could not be loaded
const UNKNOWN_KIND: &str = "unknown";

/// Counts of entities per status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowStats {
    pub draft: usize,
    pub pending_approval: usize,
    pub approved: usize,
    pub active: usize,
    pub rejected: usize,
    pub closed: usize,
}

impl WorkflowStats {
    pub fn total(&self) -> usize {
        self.draft + self.pending_approval + self.approved + self.active + self.rejected + self.closed
    }
}

/// Dual-control state machine over governed entities
pub struct WorkflowEngine {
    store: Arc<dyn EntityStore>,
    permissions: Arc<PermissionResolver>,
    audit: Arc<dyn AuditSink>,
    resources: ResourceMap,
    config: WorkflowConfig,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn EntityStore>,
        permissions: Arc<PermissionResolver>,
        audit: Arc<dyn AuditSink>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            permissions,
            audit,
            resources: ResourceMap::default(),
            config,
        }
    }

    /// Use a custom kind-to-resource mapping
    pub fn with_resources(mut self, resources: ResourceMap) -> Self {
        self.resources = resources;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn resources(&self) -> &ResourceMap {
        &self.resources
    }

    /// Operations bound to a caller-supplied deadline
    pub fn within(&self, deadline: Deadline) -> ScopedWorkflow<'_> {
        ScopedWorkflow {
            engine: self,
            deadline,
        }
    }

    fn scoped(&self) -> ScopedWorkflow<'_> {
        self.within(Deadline::after(self.config.operation_timeout()))
    }

    /// Create a draft (requires `create` on the kind's resource)
    pub async fn create(&self, kind: &str, payload: Value, actor: &Actor) -> GovernanceResult<GovernedEntity> {
        self.scoped().create(kind, payload, actor).await
    }

    /// Replace the payload of a DRAFT or REJECTED entity
    pub async fn edit(&self, id: &str, payload: Value, actor: &Actor) -> GovernanceResult<GovernedEntity> {
        self.scoped().edit(id, payload, actor).await
    }

    /// DRAFT/REJECTED -> PENDING_APPROVAL
    pub async fn submit(&self, id: &str, actor: &Actor) -> GovernanceResult<GovernedEntity> {
        self.scoped().submit(id, actor).await
    }

    /// PENDING_APPROVAL -> APPROVED (or ACTIVE)
    pub async fn approve(&self, id: &str, actor: &Actor, comments: Option<&str>) -> GovernanceResult<GovernedEntity> {
        self.scoped().approve(id, actor, comments).await
    }

    /// PENDING_APPROVAL -> REJECTED; comments are mandatory
    pub async fn reject(&self, id: &str, actor: &Actor, comments: &str) -> GovernanceResult<GovernedEntity> {
        self.scoped().reject(id, actor, comments).await
    }

    /// APPROVED/ACTIVE -> CLOSED
    pub async fn close(&self, id: &str, actor: &Actor) -> GovernanceResult<GovernedEntity> {
        self.scoped().close(id, actor).await
    }

    /// CLOSED -> ACTIVE; justification is mandatory
    pub async fn reactivate(&self, id: &str, actor: &Actor, justification: &str) -> GovernanceResult<GovernedEntity> {
        self.scoped().reactivate(id, actor, justification).await
    }

    /// Load an entity without an authorization check
    pub async fn get(&self, id: &str) -> GovernanceResult<GovernedEntity> {
        self.scoped().load(id).await
    }

    /// Load an entity on behalf of an actor (requires `view`)
    pub async fn view(&self, id: &str, actor: &Actor) -> GovernanceResult<GovernedEntity> {
        let scoped = self.scoped();
        let entity = scoped.load(id).await?;
        let resource = self.resources.resource_for(&entity.kind);
        scoped
            .deadline
            .run(
                "authorize",
                self.permissions.require(actor, &resource, foureyes_core::Action::View),
            )
            .await?;
        Ok(entity)
    }

    /// Transition history of an entity, oldest first
    pub async fn history(&self, id: &str) -> GovernanceResult<Vec<WorkflowHistoryRecord>> {
        let deadline = Deadline::after(self.config.operation_timeout());
        deadline
            .run("load history", async {
                self.store.history(id).await.map_err(GovernanceError::from)
            })
            .await
    }

    /// Entities filtered by kind and/or status
    pub async fn list(&self, kind: Option<&str>, status: Option<WorkflowStatus>) -> GovernanceResult<Vec<GovernedEntity>> {
        let deadline = Deadline::after(self.config.operation_timeout());
        deadline
            .run("list entities", async {
                self.store.list(kind, status).await.map_err(GovernanceError::from)
            })
            .await
    }

    /// Counts of entities per status
    pub async fn stats(&self) -> GovernanceResult<WorkflowStats> {
        let deadline = Deadline::after(self.config.operation_timeout());
        let mut stats = WorkflowStats::default();
        for status in WorkflowStatus::ALL {
            let count = deadline
                .run("count entities", async {
                    self.store.count_by_status(status).await.map_err(GovernanceError::from)
                })
                .await?;
            match status {
                WorkflowStatus::Draft => stats.draft = count,
                WorkflowStatus::PendingApproval => stats.pending_approval = count,
                WorkflowStatus::Approved => stats.approved = count,
                WorkflowStatus::Active => stats.active = count,
                WorkflowStatus::Rejected => stats.rejected = count,
                WorkflowStatus::Closed => stats.closed = count,
            }
        }
        Ok(stats)
    }
}

/// Workflow operations under one deadline
pub struct ScopedWorkflow<'a> {
    engine: &'a WorkflowEngine,
    deadline: Deadline,
}

impl ScopedWorkflow<'_> {
    pub async fn create(&self, kind: &str, payload: Value, actor: &Actor) -> GovernanceResult<GovernedEntity> {
        let entity = GovernedEntity::draft(kind, payload, actor);
        let outcome = self.try_create(&entity, actor).await.map(|_| entity.clone());
        self.finish(actor, Transition::Create, kind, &entity.id, None, outcome)
            .await
    }

    pub async fn edit(&self, id: &str, payload: Value, actor: &Actor) -> GovernanceResult<GovernedEntity> {
        self.transition(id, actor, Transition::Edit, None, Some(payload))
            .await
    }

    pub async fn submit(&self, id: &str, actor: &Actor) -> GovernanceResult<GovernedEntity> {
        self.transition(id, actor, Transition::Submit, None, None).await
    }

    pub async fn approve(&self, id: &str, actor: &Actor, comments: Option<&str>) -> GovernanceResult<GovernedEntity> {
        self.transition(id, actor, Transition::Approve, comments, None)
            .await
    }

    pub async fn reject(&self, id: &str, actor: &Actor, comments: &str) -> GovernanceResult<GovernedEntity> {
        self.transition(id, actor, Transition::Reject, Some(comments), None)
            .await
    }

    pub async fn close(&self, id: &str, actor: &Actor) -> GovernanceResult<GovernedEntity> {
        self.transition(id, actor, Transition::Close, None, None).await
    }

    pub async fn reactivate(&self, id: &str, actor: &Actor, justification: &str) -> GovernanceResult<GovernedEntity> {
        self.transition(id, actor, Transition::Reactivate, Some(justification), None)
            .await
    }

    async fn try_create(&self, entity: &GovernedEntity, actor: &Actor) -> GovernanceResult<()> {
        let resource = self.engine.resources.resource_for(&entity.kind);
        self.authorize(actor, &resource, Transition::Create).await?;
        self.deadline
            .run("insert entity", async {
                self.engine.store.insert(entity).await.map_err(GovernanceError::from)
            })
            .await
    }

    async fn transition(
        &self,
        id: &str,
        actor: &Actor,
        transition: Transition,
        comments: Option<&str>,
        payload: Option<Value>,
    ) -> GovernanceResult<GovernedEntity> {
        let current = match self.load(id).await {
            Ok(entity) => entity,
            Err(err) => {
                return self
                    .finish(actor, transition, UNKNOWN_KIND, id, None, Err(err))
                    .await
            }
        };

        let before = Some(current.snapshot());
        let outcome = self
            .apply(&current, actor, transition, comments, payload)
            .await;
        self.finish(actor, transition, &current.kind, id, before, outcome)
            .await
    }

    async fn apply(
        &self,
        current: &GovernedEntity,
        actor: &Actor,
        transition: Transition,
        comments: Option<&str>,
        payload: Option<Value>,
    ) -> GovernanceResult<GovernedEntity> {
        let config = &self.engine.config;

        // Applies regardless of grants or current state
        if transition.is_review() && config.self_approval_policy.bars(current, actor) {
            return Err(GovernanceError::SelfApprovalViolation {
                actor: actor.login().to_string(),
                entity_id: current.id.clone(),
                transition: transition.as_str().to_string(),
            });
        }

        if !transition.allowed_from(current.status) {
            return Err(GovernanceError::InvalidStateTransition {
                entity_id: current.id.clone(),
                from: current.status.as_str().to_string(),
                transition: transition.as_str().to_string(),
            });
        }

        let resource = self.engine.resources.resource_for(&current.kind);
        self.authorize(actor, &resource, transition).await?;

        let comments = comments
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let mut next = current.successor(actor);

        match transition {
            Transition::Edit => {
                if let Some(payload) = payload {
                    next.payload = payload;
                }
            }
            Transition::Submit => {
                next.status = WorkflowStatus::PendingApproval;
                next.submitted_by = Some(actor.login().to_string());
                next.submitted_at = Some(next.last_modified_at);
            }
            Transition::Approve => {
                next.status = if config.approved_alias_active {
                    WorkflowStatus::Active
                } else {
                    WorkflowStatus::Approved
                };
                if comments.is_some() {
                    next.review_comments = comments.clone();
                }
            }
            Transition::Reject => {
                next.status = WorkflowStatus::Rejected;
                next.review_comments = Some(require_text(&comments, transition)?);
            }
            Transition::Close => {
                next.status = WorkflowStatus::Closed;
            }
            Transition::Reactivate => {
                next.status = WorkflowStatus::Active;
                next.review_comments = Some(require_text(&comments, transition)?);
            }
            Transition::Create => {
                return Err(GovernanceError::InvalidStateTransition {
                    entity_id: current.id.clone(),
                    from: current.status.as_str().to_string(),
                    transition: transition.as_str().to_string(),
                })
            }
        }

        let history = (next.status != current.status).then(|| {
            WorkflowHistoryRecord::new(&current.id, current.status, next.status, actor, comments)
        });
        self.swap(current, &next, history.as_ref()).await?;

        Ok(next)
    }

    async fn load(&self, id: &str) -> GovernanceResult<GovernedEntity> {
        let found = self
            .deadline
            .run("load entity", async {
                self.engine.store.load(id).await.map_err(GovernanceError::from)
            })
            .await?;
        found.ok_or_else(|| GovernanceError::EntityNotFound(id.to_string()))
    }

    async fn authorize(&self, actor: &Actor, resource: &str, transition: Transition) -> GovernanceResult<()> {
        self.deadline
            .run(
                "authorize",
                self.engine
                    .permissions
                    .require(actor, resource, transition.required_action()),
            )
            .await
    }

    async fn swap(
        &self,
        current: &GovernedEntity,
        next: &GovernedEntity,
        history: Option<&WorkflowHistoryRecord>,
    ) -> GovernanceResult<()> {
        let outcome = self
            .deadline
            .run("compare-and-swap", async {
                self.engine
                    .store
                    .compare_and_swap(current.status, current.version, next, history)
                    .await
                    .map_err(GovernanceError::from)
            })
            .await?;

        match outcome {
            SwapOutcome::Applied => Ok(()),
            SwapOutcome::Conflict => Err(GovernanceError::ConcurrentModification {
                entity_id: current.id.clone(),
            }),
        }
    }

    /// Audit the attempt and hand the outcome back to the caller
    async fn finish(
        &self,
        actor: &Actor,
        transition: Transition,
        entity_type: &str,
        entity_id: &str,
        before: Option<Value>,
        outcome: GovernanceResult<GovernedEntity>,
    ) -> GovernanceResult<GovernedEntity> {
        match outcome {
            Ok(entity) => {
                info!(
                    actor = %actor,
                    entity_id = %entity_id,
                    transition = %transition,
                    status = %entity.status,
                    "Workflow transition applied"
                );
                let entry = AuditEntry::success(actor, transition.as_str(), entity_type, entity_id)
                    .with_before(before)
                    .with_after(Some(entity.snapshot()));
                self.record(entry).await;
                Ok(entity)
            }
            Err(err) if err.is_business_rule() => {
                warn!(
                    actor = %actor,
                    entity_id = %entity_id,
                    transition = %transition,
                    code = err.code(),
                    error = %err,
                    "Workflow transition refused"
                );
                let entry = AuditEntry::failure(actor, transition.as_str(), entity_type, entity_id, &err)
                    .with_before(before);
                self.record(entry).await;
                Err(err)
            }
            Err(err) => {
                error!(
                    actor = %actor,
                    entity_id = %entity_id,
                    transition = %transition,
                    error = %err,
                    "Workflow transition failed"
                );
                Err(err)
            }
        }
    }

    /// Audit an outcome that is already final
    ///
    /// The caller's deadline may be spent by the mutation, so the write gets
    /// a fresh budget. A failure is logged only.
    async fn record(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        let entity_id = entry.entity_id.clone();
        let written = Deadline::after(self.engine.config.operation_timeout())
            .run("audit", async {
                self.engine
                    .audit
                    .record(entry)
                    .await
                    .map(|_| ())
                    .map_err(GovernanceError::from)
            })
            .await;
        if let Err(err) = written {
            error!(action = %action, entity_id = %entity_id, error = %err, "Audit write failed");
        }
    }
}

fn require_text(text: &Option<String>, transition: Transition) -> GovernanceResult<String> {
    text.clone().ok_or_else(|| GovernanceError::MissingComments {
        operation: transition.as_str().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelfApprovalPolicy;
    use crate::store::MemoryEntityStore;
    use foureyes_acl::{AclConfig, GroupId, StaticPermissionStore};
    use foureyes_audit::{AuditFilter, AuditLedger, AuditOutcome, AuditReader};
    use foureyes_core::AccessMode;
    use serde_json::json;

    struct Fixture {
        engine: WorkflowEngine,
        ledger: Arc<AuditLedger>,
        permissions: Arc<StaticPermissionStore>,
    }

    fn fixture(config: WorkflowConfig) -> Fixture {
        let permissions = Arc::new(StaticPermissionStore::new());
        let makers = GroupId::new("makers");
        let checkers = GroupId::new("checkers");
        permissions.add_member("maker1", makers.clone());
        permissions.add_member("maker2", makers.clone());
        permissions.add_member("checker1", checkers.clone());
        permissions.grant(&makers, "portfolio", AccessMode::ReadWrite);
        // Makers can approve too: the self-approval ban must not depend on grants
        permissions.grant(&makers, "portfolio.approve", AccessMode::Write);
        permissions.grant(&checkers, "portfolio", AccessMode::Read);
        permissions.grant(&checkers, "portfolio.approve", AccessMode::Write);
        permissions.grant(&checkers, "portfolio.close", AccessMode::Write);
        permissions.grant(&checkers, "portfolio.reactivate", AccessMode::Write);

        let resolver = Arc::new(PermissionResolver::new(
            permissions.clone(),
            &AclConfig::default(),
        ));
        let ledger = Arc::new(AuditLedger::in_memory());
        let engine = WorkflowEngine::new(
            Arc::new(MemoryEntityStore::new()),
            resolver,
            ledger.clone(),
            config,
        );

        Fixture {
            engine,
            ledger,
            permissions,
        }
    }

    fn actor(login: &str) -> Actor {
        Actor::new(login).unwrap()
    }

    #[tokio::test]
    async fn test_create_requires_grant() {
        let f = fixture(WorkflowConfig::default());

        let err = f
            .engine
            .create("portfolio", json!({}), &actor("checker1"))
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::UnauthorizedAction { .. }));

        let failures = f
            .ledger
            .query(&AuditFilter::new().with_outcome(AuditOutcome::Failure))
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].action(), "create");
    }

    #[tokio::test]
    async fn test_edit_keeps_creator() {
        let f = fixture(WorkflowConfig::default());
        let entity = f
            .engine
            .create("portfolio", json!({"name": "Growth"}), &actor("maker1"))
            .await
            .unwrap();

        let edited = f
            .engine
            .edit(&entity.id, json!({"name": "Income"}), &actor("maker2"))
            .await
            .unwrap();

        assert_eq!(edited.created_by, "maker1");
        assert_eq!(edited.last_modified_by, "maker2");
        assert_eq!(edited.payload["name"], "Income");
        assert_eq!(edited.version, 2);
        assert!(f.engine.history(&entity.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reject_requires_comments() {
        let f = fixture(WorkflowConfig::default());
        let entity = f
            .engine
            .create("portfolio", json!({}), &actor("maker1"))
            .await
            .unwrap();
        f.engine.submit(&entity.id, &actor("maker1")).await.unwrap();

        let err = f
            .engine
            .reject(&entity.id, &actor("checker1"), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::MissingComments { .. }));
        assert_eq!(
            f.engine.get(&entity.id).await.unwrap().status,
            WorkflowStatus::PendingApproval
        );
    }

    #[tokio::test]
    async fn test_submitter_barred_under_default_policy() {
        let f = fixture(WorkflowConfig::default());
        let entity = f
            .engine
            .create("portfolio", json!({}), &actor("maker1"))
            .await
            .unwrap();
        f.engine.submit(&entity.id, &actor("maker2")).await.unwrap();

        let err = f
            .engine
            .approve(&entity.id, &actor("maker2"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::SelfApprovalViolation { .. }));
    }

    #[tokio::test]
    async fn test_submitter_allowed_under_creator_policy() {
        let f = fixture(WorkflowConfig::default().with_policy(SelfApprovalPolicy::Creator));
        let entity = f
            .engine
            .create("portfolio", json!({}), &actor("maker1"))
            .await
            .unwrap();
        f.engine.submit(&entity.id, &actor("maker2")).await.unwrap();

        let approved = f
            .engine
            .approve(&entity.id, &actor("maker2"), Some("ok"))
            .await
            .unwrap();
        assert_eq!(approved.status, WorkflowStatus::Approved);

        // The creator stays barred
        let second = f
            .engine
            .create("portfolio", json!({}), &actor("maker1"))
            .await
            .unwrap();
        f.engine.submit(&second.id, &actor("maker1")).await.unwrap();
        let err = f
            .engine
            .approve(&second.id, &actor("maker1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::SelfApprovalViolation { .. }));
    }

    #[tokio::test]
    async fn test_close_and_reactivate() {
        let config = WorkflowConfig {
            approved_alias_active: true,
            ..WorkflowConfig::default()
        };
        let f = fixture(config);
        let id = f
            .engine
            .create("portfolio", json!({}), &actor("maker1"))
            .await
            .unwrap()
            .id;
        f.engine.submit(&id, &actor("maker1")).await.unwrap();
        let approved = f.engine.approve(&id, &actor("checker1"), None).await.unwrap();
        assert_eq!(approved.status, WorkflowStatus::Active);

        // Makers hold no close grant
        let err = f.engine.close(&id, &actor("maker1")).await.unwrap_err();
        assert!(matches!(err, GovernanceError::UnauthorizedAction { .. }));

        let closed = f.engine.close(&id, &actor("checker1")).await.unwrap();
        assert_eq!(closed.status, WorkflowStatus::Closed);

        let err = f
            .engine
            .reactivate(&id, &actor("checker1"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::MissingComments { .. }));

        let reactivated = f
            .engine
            .reactivate(&id, &actor("checker1"), "client re-onboarded")
            .await
            .unwrap();
        assert_eq!(reactivated.status, WorkflowStatus::Active);
        assert_eq!(reactivated.review_comments.as_deref(), Some("client re-onboarded"));

        let history = f.engine.history(&id).await.unwrap();
        let edges: Vec<_> = history.iter().map(|h| (h.from_status, h.to_status)).collect();
        assert_eq!(
            edges,
            vec![
                (WorkflowStatus::Draft, WorkflowStatus::PendingApproval),
                (WorkflowStatus::PendingApproval, WorkflowStatus::Active),
                (WorkflowStatus::Active, WorkflowStatus::Closed),
                (WorkflowStatus::Closed, WorkflowStatus::Active),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_entity_is_audited() {
        let f = fixture(WorkflowConfig::default());

        let err = f
            .engine
            .approve("PORTFOLIO-MISSING", &actor("checker1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::EntityNotFound(_)));
        assert_eq!(f.ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_store_outage_is_not_audited() {
        let f = fixture(WorkflowConfig::default());
        let id = f
            .engine
            .create("portfolio", json!({}), &actor("maker1"))
            .await
            .unwrap()
            .id;
        let audited = f.ledger.len();

        // maker2 has no cached permissions, so authorization reaches the store
        f.permissions.set_available(false);
        let err = f.engine.submit(&id, &actor("maker2")).await.unwrap_err();

        assert!(matches!(err, GovernanceError::ExternalStoreUnavailable(_)));
        assert!(err.is_retryable());
        assert_eq!(f.ledger.len(), audited);
        assert_eq!(f.engine.get(&id).await.unwrap().status, WorkflowStatus::Draft);
    }

    #[tokio::test]
    async fn test_view_requires_read() {
        let f = fixture(WorkflowConfig::default());
        let id = f
            .engine
            .create("portfolio", json!({}), &actor("maker1"))
            .await
            .unwrap()
            .id;

        assert!(f.engine.view(&id, &actor("checker1")).await.is_ok());
        let err = f.engine.view(&id, &actor("outsider")).await.unwrap_err();
        assert!(matches!(err, GovernanceError::UnauthorizedAction { .. }));
    }

    #[tokio::test]
    async fn test_stats() {
        let f = fixture(WorkflowConfig::default());
        let maker = actor("maker1");
        let a = f.engine.create("portfolio", json!({}), &maker).await.unwrap();
        f.engine.create("portfolio", json!({}), &maker).await.unwrap();
        f.engine.submit(&a.id, &maker).await.unwrap();

        let stats = f.engine.stats().await.unwrap();
        assert_eq!(stats.draft, 1);
        assert_eq!(stats.pending_approval, 1);
        assert_eq!(stats.total(), 2);
    }
}
