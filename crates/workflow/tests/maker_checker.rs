//! End-to-end maker-checker behavior over memory and SQLite stores

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use foureyes_acl::{AclConfig, GroupId, PermissionResolver, StaticPermissionStore};
use foureyes_audit::{
    AuditEntry, AuditFilter, AuditLedger, AuditOutcome, AuditReader, AuditRecord, AuditResult,
    AuditSink,
};
use foureyes_core::{AccessMode, Actor, Deadline, GovernanceError};
use foureyes_workflow::{
    EntityStore, GovernedEntity, MemoryEntityStore, SelfApprovalPolicy, SqliteEntityStore,
    StoreError, SwapOutcome, WorkflowConfig, WorkflowEngine, WorkflowHistoryRecord,
    WorkflowStatus,
};
use serde_json::json;
use tokio::sync::Barrier;

// ============================================================================
// Fixtures
// ============================================================================

fn permission_store(maker_approve: Option<AccessMode>) -> Arc<StaticPermissionStore> {
    let store = Arc::new(StaticPermissionStore::new());
    let makers = GroupId::new("makers");
    let checkers = GroupId::new("checkers");

    store.add_member("maker1", makers.clone());
    store.add_member("checker1", checkers.clone());
    store.add_member("checker2", checkers.clone());

    store.grant(&makers, "portfolio", AccessMode::ReadWrite);
    if let Some(mode) = maker_approve {
        store.grant(&makers, "portfolio.approve", mode);
    }
    store.grant(&checkers, "portfolio", AccessMode::Read);
    store.grant(&checkers, "portfolio.approve", AccessMode::ReadWrite);
    store
}

fn engine_with(
    store: Arc<dyn EntityStore>,
    permissions: Arc<StaticPermissionStore>,
    config: WorkflowConfig,
) -> (WorkflowEngine, Arc<AuditLedger>) {
    let resolver = Arc::new(PermissionResolver::new(permissions, &AclConfig::default()));
    let ledger = Arc::new(AuditLedger::in_memory());
    let engine = WorkflowEngine::new(store, resolver, ledger.clone(), config);
    (engine, ledger)
}

fn actor(login: &str) -> Actor {
    Actor::new(login).unwrap()
}

async fn pending_entity(engine: &WorkflowEngine) -> GovernedEntity {
    let maker = actor("maker1");
    let entity = engine
        .create("portfolio", json!({"name": "Growth"}), &maker)
        .await
        .unwrap();
    engine.submit(&entity.id, &maker).await.unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_a_submit_and_approve() {
    let (engine, ledger) = engine_with(
        Arc::new(MemoryEntityStore::new()),
        permission_store(None),
        WorkflowConfig::default(),
    );

    let maker = actor("maker1");
    let e1 = engine.create("portfolio", json!({"name": "E1"}), &maker).await.unwrap();
    assert_eq!(e1.status, WorkflowStatus::Draft);

    let submitted = engine.submit(&e1.id, &maker).await.unwrap();
    assert_eq!(submitted.status, WorkflowStatus::PendingApproval);
    assert_eq!(submitted.submitted_by.as_deref(), Some("maker1"));

    let approved = engine
        .approve(&e1.id, &actor("checker1"), Some("approved"))
        .await
        .unwrap();
    assert_eq!(approved.status, WorkflowStatus::Approved);
    assert_eq!(approved.review_comments.as_deref(), Some("approved"));

    let history = engine.history(&e1.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].from_status, WorkflowStatus::Draft);
    assert_eq!(history[0].to_status, WorkflowStatus::PendingApproval);
    assert_eq!(history[1].from_status, WorkflowStatus::PendingApproval);
    assert_eq!(history[1].to_status, WorkflowStatus::Approved);
    assert_eq!(history[1].actor, "checker1");

    // create + submit + approve
    let records = ledger.query(&AuditFilter::for_entity("portfolio", &e1.id)).await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.outcome() == AuditOutcome::Success));
    assert_eq!(ledger.verify().unwrap(), Ok(3));
}

#[tokio::test]
async fn test_scenario_b_self_approval_rejected() {
    let (engine, ledger) = engine_with(
        Arc::new(MemoryEntityStore::new()),
        permission_store(Some(AccessMode::Write)),
        WorkflowConfig::default(),
    );
    let e1 = pending_entity(&engine).await;
    let audited = ledger.len();

    let err = engine
        .approve(&e1.id, &actor("maker1"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::SelfApprovalViolation { .. }));
    assert!(err.to_string().contains("maker1"));

    let entity = engine.get(&e1.id).await.unwrap();
    assert_eq!(entity.status, WorkflowStatus::PendingApproval);
    assert_eq!(entity.version, e1.version);

    assert_eq!(ledger.len(), audited + 1);
    let failures = ledger
        .query(&AuditFilter::for_entity("portfolio", &e1.id).with_outcome(AuditOutcome::Failure))
        .await
        .unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].actor(), "maker1");
    assert_eq!(failures[0].entry.error_code.as_deref(), Some("SELF_APPROVAL_VIOLATION"));
    assert_eq!(engine.history(&e1.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_creator_never_approves_regardless_of_grants() {
    let grants = [
        None,
        Some(AccessMode::Read),
        Some(AccessMode::Write),
        Some(AccessMode::ReadWrite),
    ];
    let policies = [SelfApprovalPolicy::Creator, SelfApprovalPolicy::CreatorOrSubmitter];

    for grant in grants {
        for policy in policies {
            let (engine, _ledger) = engine_with(
                Arc::new(MemoryEntityStore::new()),
                permission_store(grant),
                WorkflowConfig::default().with_policy(policy),
            );
            let entity = pending_entity(&engine).await;

            // Login variants all normalize to the creator
            for raw in ["maker1", "MAKER1", r"CORP\maker1", "maker1@corp.example"] {
                let err = engine.approve(&entity.id, &actor(raw), None).await.unwrap_err();
                assert!(
                    matches!(err, GovernanceError::SelfApprovalViolation { .. }),
                    "grant {:?}, policy {:?}, login {}: {:?}",
                    grant,
                    policy,
                    raw,
                    err
                );

                let err = engine
                    .reject(&entity.id, &actor(raw), "looks wrong")
                    .await
                    .unwrap_err();
                assert!(matches!(err, GovernanceError::SelfApprovalViolation { .. }));
            }

            assert_eq!(
                engine.get(&entity.id).await.unwrap().status,
                WorkflowStatus::PendingApproval
            );
        }
    }
}

#[tokio::test]
async fn test_reject_twice_is_invalid_transition() {
    let (engine, ledger) = engine_with(
        Arc::new(MemoryEntityStore::new()),
        permission_store(None),
        WorkflowConfig::default(),
    );
    let entity = pending_entity(&engine).await;
    let checker = actor("checker1");

    let rejected = engine.reject(&entity.id, &checker, "missing limits").await.unwrap();
    assert_eq!(rejected.status, WorkflowStatus::Rejected);
    assert_eq!(rejected.review_comments.as_deref(), Some("missing limits"));

    let err = engine
        .reject(&entity.id, &checker, "still missing")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::InvalidStateTransition { ref from, .. } if from == "REJECTED"
    ));

    let unchanged = engine.get(&entity.id).await.unwrap();
    assert_eq!(unchanged.version, rejected.version);
    assert_eq!(unchanged.review_comments.as_deref(), Some("missing limits"));

    let failures = ledger
        .query(&AuditFilter::new().with_outcome(AuditOutcome::Failure))
        .await
        .unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].entry.error_code.as_deref(), Some("INVALID_STATE_TRANSITION"));
}

#[tokio::test]
async fn test_rejected_entity_can_be_edited_and_resubmitted() {
    let (engine, _ledger) = engine_with(
        Arc::new(MemoryEntityStore::new()),
        permission_store(None),
        WorkflowConfig::default(),
    );
    let entity = pending_entity(&engine).await;
    let maker = actor("maker1");

    engine.reject(&entity.id, &actor("checker1"), "fix name").await.unwrap();
    engine.edit(&entity.id, json!({"name": "Growth II"}), &maker).await.unwrap();
    let resubmitted = engine.submit(&entity.id, &maker).await.unwrap();
    assert_eq!(resubmitted.status, WorkflowStatus::PendingApproval);

    let approved = engine.approve(&entity.id, &actor("checker2"), None).await.unwrap();
    assert_eq!(approved.status, WorkflowStatus::Approved);
    assert_eq!(approved.payload["name"], "Growth II");
    assert_eq!(engine.history(&entity.id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_scenarios_over_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteEntityStore::new(dir.path().join("foureyes.db")).unwrap());
    let (engine, _ledger) = engine_with(store, permission_store(None), WorkflowConfig::default());

    let entity = pending_entity(&engine).await;
    let err = engine.approve(&entity.id, &actor("maker1"), None).await.unwrap_err();
    assert!(matches!(err, GovernanceError::SelfApprovalViolation { .. }));

    engine.approve(&entity.id, &actor("checker1"), None).await.unwrap();
    let history = engine.history(&entity.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].to_status, WorkflowStatus::Approved);
}

// ============================================================================
// Concurrency and deadlines
// ============================================================================

/// Holds every armed compare-and-swap until both racers have reached it
struct RendezvousStore {
    inner: MemoryEntityStore,
    barrier: Barrier,
    armed: AtomicBool,
}

#[async_trait]
impl EntityStore for RendezvousStore {
    async fn insert(&self, entity: &GovernedEntity) -> Result<(), StoreError> {
        self.inner.insert(entity).await
    }

    async fn load(&self, id: &str) -> Result<Option<GovernedEntity>, StoreError> {
        self.inner.load(id).await
    }

    async fn compare_and_swap(
        &self,
        expected_status: WorkflowStatus,
        expected_version: u64,
        updated: &GovernedEntity,
        history: Option<&WorkflowHistoryRecord>,
    ) -> Result<SwapOutcome, StoreError> {
        if self.armed.load(Ordering::SeqCst) {
            self.barrier.wait().await;
        }
        self.inner
            .compare_and_swap(expected_status, expected_version, updated, history)
            .await
    }

    async fn history(&self, entity_id: &str) -> Result<Vec<WorkflowHistoryRecord>, StoreError> {
        self.inner.history(entity_id).await
    }

    async fn list(
        &self,
        kind: Option<&str>,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<GovernedEntity>, StoreError> {
        self.inner.list(kind, status).await
    }

    async fn count_by_status(&self, status: WorkflowStatus) -> Result<usize, StoreError> {
        self.inner.count_by_status(status).await
    }
}

#[tokio::test]
async fn test_concurrent_approvals_have_one_winner() {
    let store = Arc::new(RendezvousStore {
        inner: MemoryEntityStore::new(),
        barrier: Barrier::new(2),
        armed: AtomicBool::new(false),
    });
    let (engine, ledger) = engine_with(store.clone(), permission_store(None), WorkflowConfig::default());
    let entity = pending_entity(&engine).await;

    store.armed.store(true, Ordering::SeqCst);
    let (c1, c2) = (actor("checker1"), actor("checker2"));
    let (first, second) = tokio::join!(
        engine.approve(&entity.id, &c1, Some("ok")),
        engine.approve(&entity.id, &c2, Some("ok")),
    );

    let outcomes = [first, second];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(GovernanceError::ConcurrentModification { .. })))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 1);

    assert_eq!(engine.get(&entity.id).await.unwrap().status, WorkflowStatus::Approved);

    let history = engine.history(&entity.id).await.unwrap();
    let approvals = history
        .iter()
        .filter(|h| h.to_status == WorkflowStatus::Approved)
        .count();
    assert_eq!(approvals, 1);

    let approve_attempts = ledger
        .query(&AuditFilter::for_entity("portfolio", &entity.id).with_action("approve"))
        .await
        .unwrap();
    assert_eq!(approve_attempts.len(), 2);
    assert_eq!(
        approve_attempts.iter().filter(|r| r.is_failure()).count(),
        1
    );
}

/// Entity store whose reads stall
struct StallingStore {
    inner: MemoryEntityStore,
    stall: Duration,
}

#[async_trait]
impl EntityStore for StallingStore {
    async fn insert(&self, entity: &GovernedEntity) -> Result<(), StoreError> {
        self.inner.insert(entity).await
    }

    async fn load(&self, id: &str) -> Result<Option<GovernedEntity>, StoreError> {
        tokio::time::sleep(self.stall).await;
        self.inner.load(id).await
    }

    async fn compare_and_swap(
        &self,
        expected_status: WorkflowStatus,
        expected_version: u64,
        updated: &GovernedEntity,
        history: Option<&WorkflowHistoryRecord>,
    ) -> Result<SwapOutcome, StoreError> {
        self.inner
            .compare_and_swap(expected_status, expected_version, updated, history)
            .await
    }

    async fn history(&self, entity_id: &str) -> Result<Vec<WorkflowHistoryRecord>, StoreError> {
        self.inner.history(entity_id).await
    }

    async fn list(
        &self,
        kind: Option<&str>,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<GovernedEntity>, StoreError> {
        self.inner.list(kind, status).await
    }

    async fn count_by_status(&self, status: WorkflowStatus) -> Result<usize, StoreError> {
        tokio::time::sleep(self.stall).await;
        self.inner.count_by_status(status).await
    }
}

#[tokio::test]
async fn test_deadline_expiry_is_timeout_and_unaudited() {
    let store = Arc::new(StallingStore {
        inner: MemoryEntityStore::new(),
        stall: Duration::from_millis(300),
    });
    let (engine, ledger) = engine_with(store, permission_store(None), WorkflowConfig::default());

    let entity = engine
        .create("portfolio", json!({}), &actor("maker1"))
        .await
        .unwrap();
    let audited = ledger.len();

    let err = engine
        .within(Deadline::after(Duration::from_millis(20)))
        .submit(&entity.id, &actor("maker1"))
        .await
        .unwrap_err();

    assert!(matches!(err, GovernanceError::Timeout(_)));
    assert!(!err.is_business_rule());
    assert_eq!(ledger.len(), audited);
}

#[tokio::test]
async fn test_stats_respect_the_operation_timeout() {
    let store = Arc::new(StallingStore {
        inner: MemoryEntityStore::new(),
        stall: Duration::from_millis(300),
    });
    let config = WorkflowConfig {
        operation_timeout_ms: 50,
        ..WorkflowConfig::default()
    };
    let (engine, _) = engine_with(store, permission_store(None), config);

    let err = engine.stats().await.unwrap_err();
    assert!(matches!(err, GovernanceError::Timeout(_)));
}

/// Audit sink that takes its time
struct SlowSink {
    inner: AuditLedger,
    delay: Duration,
}

#[async_trait]
impl AuditSink for SlowSink {
    async fn record(&self, entry: AuditEntry) -> AuditResult<AuditRecord> {
        tokio::time::sleep(self.delay).await;
        self.inner.record(entry).await
    }
}

#[tokio::test]
async fn test_slow_audit_does_not_fail_a_committed_transition() {
    let resolver = Arc::new(PermissionResolver::new(permission_store(None), &AclConfig::default()));
    let sink = Arc::new(SlowSink {
        inner: AuditLedger::in_memory(),
        delay: Duration::from_millis(200),
    });
    let engine = WorkflowEngine::new(
        Arc::new(MemoryEntityStore::new()),
        resolver,
        sink.clone(),
        WorkflowConfig::default(),
    );
    let maker = actor("maker1");
    let entity = engine.create("portfolio", json!({}), &maker).await.unwrap();

    let submitted = engine
        .within(Deadline::after(Duration::from_millis(50)))
        .submit(&entity.id, &maker)
        .await
        .unwrap();
    assert_eq!(submitted.status, WorkflowStatus::PendingApproval);
    assert_eq!(
        engine.get(&entity.id).await.unwrap().status,
        WorkflowStatus::PendingApproval
    );

    let audit = sink
        .inner
        .query(&AuditFilter::for_entity("portfolio", &entity.id).with_action("submit"))
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].outcome(), AuditOutcome::Success);
}
