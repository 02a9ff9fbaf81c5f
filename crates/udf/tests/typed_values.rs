//! Typed value store behavior over memory and SQLite backends

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use foureyes_acl::{AclConfig, GroupId, PermissionResolver, StaticPermissionStore};
use foureyes_audit::{
    AuditEntry, AuditFilter, AuditLedger, AuditOutcome, AuditReader, AuditRecord, AuditResult,
    AuditSink,
};
use foureyes_core::{AccessMode, Actor, Deadline, FieldErrorKind, GovernanceError};
use foureyes_udf::{
    FieldDefinition, FieldType, FieldValue, MemoryUdfStore, NumericBounds, SqliteUdfStore,
    StoreError, UdfConfig, UdfEngine, UdfStore, ValueHistoryRecord,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

// ============================================================================
// Fixtures
// ============================================================================

fn engine_over(store: Arc<dyn UdfStore>) -> (UdfEngine, Arc<AuditLedger>) {
    let permissions = Arc::new(StaticPermissionStore::new());
    let admins = GroupId::new("admins");
    let analysts = GroupId::new("analysts");
    permissions.add_member("admin1", admins.clone());
    permissions.add_member("analyst1", analysts.clone());
    permissions.grant(&admins, "udf_definition", AccessMode::ReadWrite);
    permissions.grant(&admins, "portfolio", AccessMode::ReadWrite);
    permissions.grant(&analysts, "portfolio", AccessMode::Read);

    let resolver = Arc::new(PermissionResolver::new(permissions, &AclConfig::default()));
    let ledger = Arc::new(AuditLedger::in_memory());
    let engine = UdfEngine::new(store, resolver, ledger.clone(), UdfConfig::default());
    (engine, ledger)
}

fn admin() -> Actor {
    Actor::new("admin1").unwrap()
}

fn batch(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn risk_rating() -> FieldDefinition {
    FieldDefinition::new(
        "portfolio",
        "risk_rating",
        FieldType::Number {
            bounds: NumericBounds::new(Some(dec!(1)), Some(dec!(10))),
        },
    )
}

fn every_type() -> Vec<FieldDefinition> {
    let bounds = NumericBounds::new(None, None);
    vec![
        FieldDefinition::new("portfolio", "name", FieldType::Text { max_length: Some(40) }),
        FieldDefinition::new("portfolio", "score", FieldType::Number { bounds }),
        FieldDefinition::new("portfolio", "aum", FieldType::Currency { bounds }),
        FieldDefinition::new("portfolio", "fee", FieldType::Percentage { bounds }),
        FieldDefinition::new("portfolio", "active", FieldType::Boolean),
        FieldDefinition::new("portfolio", "inception", FieldType::Date),
        FieldDefinition::new("portfolio", "rebalanced_at", FieldType::DateTime),
        FieldDefinition::new(
            "portfolio",
            "tier",
            FieldType::Dropdown {
                options: vec!["GOLD".into(), "SILVER".into()],
            },
        ),
        FieldDefinition::new(
            "portfolio",
            "asset_classes",
            FieldType::MultiSelect {
                options: vec!["EQ".into(), "FI".into(), "FX".into()],
            },
        ),
    ]
}

async fn round_trip_every_type(engine: &UdfEngine) {
    for def in every_type() {
        engine.define_field(def, &admin()).await.unwrap();
    }

    let raw = batch(&[
        ("name", json!("Growth")),
        ("score", json!(7)),
        ("aum", json!("1250000.50")),
        ("fee", json!(0.75)),
        ("active", json!(true)),
        ("inception", json!("2024-03-31")),
        ("rebalanced_at", json!("2024-03-31T09:30:00Z")),
        ("tier", json!("GOLD")),
        ("asset_classes", json!(["FI", "EQ"])),
    ]);
    let changes = engine.set_values("portfolio", "P-1", &raw, &admin()).await.unwrap();
    assert_eq!(changes.len(), 9);

    let values = engine.get_values("portfolio", "P-1").await.unwrap();
    assert_eq!(values["name"], FieldValue::Text("Growth".into()));
    assert_eq!(values["score"], FieldValue::Number(dec!(7)));
    assert_eq!(values["aum"], FieldValue::Currency(dec!(1250000.50)));
    assert_eq!(values["fee"], FieldValue::Percentage(dec!(0.75)));
    assert_eq!(values["active"], FieldValue::Boolean(true));
    assert_eq!(
        values["inception"],
        FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
    );
    assert_eq!(
        values["rebalanced_at"],
        FieldValue::DateTime(Utc.with_ymd_and_hms(2024, 3, 31, 9, 30, 0).unwrap())
    );
    assert_eq!(values["tier"], FieldValue::Choice("GOLD".into()));
    assert_eq!(
        values["asset_classes"],
        FieldValue::MultiChoice(["EQ".to_string(), "FI".to_string()].into_iter().collect())
    );
}

/// Memory store whose writes can be made to fail
struct FlakyStore {
    inner: MemoryUdfStore,
    fail_writes: AtomicBool,
}

#[async_trait]
impl UdfStore for FlakyStore {
    async fn insert_definition(&self, def: &FieldDefinition) -> Result<(), StoreError> {
        self.inner.insert_definition(def).await
    }

    async fn set_definition_active(&self, id: &str, active: bool) -> Result<bool, StoreError> {
        self.inner.set_definition_active(id, active).await
    }

    async fn definitions(
        &self,
        entity_type: &str,
        include_inactive: bool,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        self.inner.definitions(entity_type, include_inactive).await
    }

    async fn values(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<BTreeMap<String, FieldValue>, StoreError> {
        self.inner.values(entity_type, entity_id).await
    }

    async fn find_entities_with_value(
        &self,
        entity_type: &str,
        field_name: &str,
        value: &FieldValue,
    ) -> Result<Vec<String>, StoreError> {
        self.inner.find_entities_with_value(entity_type, field_name, value).await
    }

    async fn apply_changes(&self, changes: &[ValueHistoryRecord]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("write rejected".into()));
        }
        self.inner.apply_changes(changes).await
    }

    async fn value_history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<ValueHistoryRecord>, StoreError> {
        self.inner.value_history(entity_type, entity_id).await
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_c_out_of_range_number() {
    let (engine, ledger) = engine_over(Arc::new(MemoryUdfStore::new()));
    engine.define_field(risk_rating(), &admin()).await.unwrap();

    let err = engine
        .set_values("portfolio", "P-1", &batch(&[("risk_rating", json!(15))]), &admin())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION_FAILED");
    let errors = err.field_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "risk_rating");
    assert_eq!(errors[0].kind, FieldErrorKind::FieldConstraintViolation);

    assert!(engine.get_values("portfolio", "P-1").await.unwrap().is_empty());
    assert!(engine.value_history("portfolio", "P-1").await.unwrap().is_empty());

    let audit = ledger
        .query(&AuditFilter::for_entity("portfolio", "P-1"))
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].outcome(), AuditOutcome::Failure);
}

#[tokio::test]
async fn test_bounds_are_inclusive() {
    let (engine, _) = engine_over(Arc::new(MemoryUdfStore::new()));
    engine.define_field(risk_rating(), &admin()).await.unwrap();

    for (entity, rating) in [("P-1", 1), ("P-2", 10)] {
        engine
            .set_values("portfolio", entity, &batch(&[("risk_rating", json!(rating))]), &admin())
            .await
            .unwrap();
    }
    let err = engine
        .set_values("portfolio", "P-3", &batch(&[("risk_rating", json!("0.99"))]), &admin())
        .await
        .unwrap_err();
    assert_eq!(err.field_errors()[0].kind, FieldErrorKind::FieldConstraintViolation);
}

#[tokio::test]
async fn test_round_trip_every_type_in_memory() {
    let (engine, _) = engine_over(Arc::new(MemoryUdfStore::new()));
    round_trip_every_type(&engine).await;
}

#[tokio::test]
async fn test_round_trip_every_type_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("udf.db");

    {
        let (engine, _) = engine_over(Arc::new(SqliteUdfStore::new(&path).unwrap()));
        round_trip_every_type(&engine).await;
    }

    // Values survive reopening the database
    let (engine, _) = engine_over(Arc::new(SqliteUdfStore::new(&path).unwrap()));
    let values = engine.get_values("portfolio", "P-1").await.unwrap();
    assert_eq!(values.len(), 9);
    assert_eq!(values["aum"], FieldValue::Currency(dec!(1250000.5)));
}

#[tokio::test]
async fn test_batch_is_all_or_nothing() {
    let (engine, _) = engine_over(Arc::new(MemoryUdfStore::new()));
    engine.define_field(risk_rating(), &admin()).await.unwrap();
    engine
        .define_field(FieldDefinition::new("portfolio", "active", FieldType::Boolean), &admin())
        .await
        .unwrap();

    let err = engine
        .set_values(
            "portfolio",
            "P-1",
            &batch(&[("active", json!(true)), ("risk_rating", json!("high"))]),
            &admin(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.field_errors()[0].kind, FieldErrorKind::FieldTypeMismatch);

    assert!(engine.get_values("portfolio", "P-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_every_error_reported_together() {
    let (engine, _) = engine_over(Arc::new(MemoryUdfStore::new()));
    engine.define_field(risk_rating().required(), &admin()).await.unwrap();
    engine
        .define_field(
            FieldDefinition::new("portfolio", "name", FieldType::Text { max_length: Some(4) }),
            &admin(),
        )
        .await
        .unwrap();
    engine
        .define_field(FieldDefinition::new("portfolio", "inception", FieldType::Date), &admin())
        .await
        .unwrap();

    let err = engine
        .set_values(
            "portfolio",
            "P-1",
            &batch(&[
                ("name", json!("Growth")),
                ("inception", json!("31/03/2024")),
                ("benchmark", json!("MSCI")),
            ]),
            &admin(),
        )
        .await
        .unwrap_err();

    let kinds: Vec<_> = err.field_errors().iter().map(|e| (e.field.as_str(), e.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            ("benchmark", FieldErrorKind::UnknownField),
            ("inception", FieldErrorKind::FieldTypeMismatch),
            ("name", FieldErrorKind::FieldConstraintViolation),
            ("risk_rating", FieldErrorKind::RequiredFieldMissing),
        ]
    );
}

#[tokio::test]
async fn test_unique_value_held_by_another_entity() {
    let (engine, _) = engine_over(Arc::new(MemoryUdfStore::new()));
    let isin = FieldDefinition::new("portfolio", "isin", FieldType::Text { max_length: None }).unique();
    engine.define_field(isin, &admin()).await.unwrap();
    engine.define_field(risk_rating(), &admin()).await.unwrap();

    engine
        .set_values("portfolio", "P-1", &batch(&[("isin", json!("US0378331005"))]), &admin())
        .await
        .unwrap();

    let err = engine
        .set_values("portfolio", "P-2", &batch(&[("isin", json!("US0378331005"))]), &admin())
        .await
        .unwrap_err();
    let error = &err.field_errors()[0];
    assert_eq!(error.kind, FieldErrorKind::DuplicateValue);
    assert!(error.message.contains("P-1"));

    // Re-submitting its own value is not a conflict
    engine
        .set_values(
            "portfolio",
            "P-1",
            &batch(&[("isin", json!("US0378331005")), ("risk_rating", json!(3))]),
            &admin(),
        )
        .await
        .unwrap();

    // Once released the value may be taken
    engine
        .set_values("portfolio", "P-1", &batch(&[("isin", Value::Null)]), &admin())
        .await
        .unwrap();
    engine
        .set_values("portfolio", "P-2", &batch(&[("isin", json!("US0378331005"))]), &admin())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unique_numbers_compare_by_value() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteUdfStore::new(dir.path().join("udf.db")).unwrap());
    let (engine, _) = engine_over(store);
    engine.define_field(risk_rating().unique(), &admin()).await.unwrap();

    engine
        .set_values("portfolio", "P-1", &batch(&[("risk_rating", json!("5.0"))]), &admin())
        .await
        .unwrap();
    let err = engine
        .set_values("portfolio", "P-2", &batch(&[("risk_rating", json!(5))]), &admin())
        .await
        .unwrap_err();
    assert_eq!(err.field_errors()[0].kind, FieldErrorKind::DuplicateValue);
}

#[tokio::test]
async fn test_one_audit_record_per_changed_field() {
    let (engine, ledger) = engine_over(Arc::new(MemoryUdfStore::new()));
    engine.define_field(risk_rating(), &admin()).await.unwrap();
    engine
        .define_field(FieldDefinition::new("portfolio", "active", FieldType::Boolean), &admin())
        .await
        .unwrap();

    engine
        .set_values(
            "portfolio",
            "P-1",
            &batch(&[("active", json!(true)), ("risk_rating", json!(4))]),
            &admin(),
        )
        .await
        .unwrap();
    engine
        .set_values(
            "portfolio",
            "P-1",
            &batch(&[("active", json!(true)), ("risk_rating", json!(6))]),
            &admin(),
        )
        .await
        .unwrap();

    let audit = ledger
        .query(&AuditFilter::for_entity("portfolio", "P-1").with_action("set_value"))
        .await
        .unwrap();
    assert_eq!(audit.len(), 3);

    let last = audit.last().unwrap();
    assert_eq!(last.entry.before, Some(json!({"risk_rating": "4"})));
    assert_eq!(last.entry.after, Some(json!({"risk_rating": "6"})));

    let history = engine.value_history("portfolio", "P-1").await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].old_value, Some(FieldValue::Number(dec!(4))));
    assert_eq!(history[2].actor, "admin1");
}

#[tokio::test]
async fn test_read_only_grant_cannot_write() {
    let (engine, ledger) = engine_over(Arc::new(MemoryUdfStore::new()));
    engine.define_field(risk_rating(), &admin()).await.unwrap();

    let analyst = Actor::new("analyst1").unwrap();
    let err = engine
        .set_values("portfolio", "P-1", &batch(&[("risk_rating", json!(2))]), &analyst)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::UnauthorizedAction { .. }));

    let audit = ledger
        .query(&AuditFilter::for_entity("portfolio", "P-1").with_actor("analyst1"))
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].outcome(), AuditOutcome::Failure);
}

#[tokio::test]
async fn test_store_failure_is_not_audited() {
    let store = Arc::new(FlakyStore {
        inner: MemoryUdfStore::new(),
        fail_writes: AtomicBool::new(false),
    });
    let (engine, ledger) = engine_over(store.clone());
    engine.define_field(risk_rating(), &admin()).await.unwrap();
    let recorded = ledger.len();

    store.fail_writes.store(true, Ordering::SeqCst);
    let err = engine
        .set_values("portfolio", "P-1", &batch(&[("risk_rating", json!(2))]), &admin())
        .await
        .unwrap_err();

    assert!(matches!(err, GovernanceError::ExternalStoreUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(ledger.len(), recorded);

    store.fail_writes.store(false, Ordering::SeqCst);
    assert!(engine.get_values("portfolio", "P-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_redefined_field_starts_empty() {
    for store in [
        Arc::new(MemoryUdfStore::new()) as Arc<dyn UdfStore>,
        Arc::new(SqliteUdfStore::in_memory().unwrap()),
    ] {
        let (engine, _) = engine_over(store);
        let mut risk = risk_rating();
        risk.is_unique = true;
        engine.define_field(risk, &admin()).await.unwrap();
        engine
            .set_values("portfolio", "P1", &batch(&[("risk_rating", json!(5))]), &admin())
            .await
            .unwrap();
        engine
            .deactivate_field("portfolio", "risk_rating", &admin())
            .await
            .unwrap();

        let mut redefined = FieldDefinition::new(
            "portfolio",
            "risk_rating",
            FieldType::Number {
                bounds: NumericBounds::new(Some(dec!(1)), Some(dec!(200))),
            },
        );
        redefined.is_required = true;
        redefined.is_unique = true;
        engine.define_field(redefined, &admin()).await.unwrap();

        assert!(engine.get_values("portfolio", "P1").await.unwrap().is_empty());

        // The old value neither satisfies the new required field
        let err = engine
            .set_values("portfolio", "P1", &batch(&[]), &admin())
            .await
            .unwrap_err();
        let GovernanceError::ValidationFailed(errors) = err else {
            panic!("expected validation failure, got {:?}", err);
        };
        assert_eq!(errors[0].kind, FieldErrorKind::RequiredFieldMissing);

        // nor holds the new unique field
        engine
            .set_values("portfolio", "P2", &batch(&[("risk_rating", json!(5))]), &admin())
            .await
            .unwrap();
        assert_eq!(
            engine.get_values("portfolio", "P2").await.unwrap()["risk_rating"],
            FieldValue::Number(dec!(5))
        );

        let history = engine.value_history("portfolio", "P1").await.unwrap();
        assert_eq!(history.len(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_defines_admit_one() {
    for store in [
        Arc::new(MemoryUdfStore::new()) as Arc<dyn UdfStore>,
        Arc::new(SqliteUdfStore::in_memory().unwrap()),
    ] {
        let (engine, _) = engine_over(store);
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.define_field(risk_rating(), &admin()).await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(GovernanceError::ValidationFailed(errors)) => {
                    assert_eq!(errors[0].kind, FieldErrorKind::DuplicateValue);
                }
                Err(other) => panic!("unexpected error {:?}", other),
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(engine.definitions("portfolio").await.unwrap().len(), 1);
    }
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
async fn test_slow_audit_does_not_fail_a_committed_write() {
    let permissions = Arc::new(StaticPermissionStore::new());
    let admins = GroupId::new("admins");
    permissions.add_member("admin1", admins.clone());
    permissions.grant(&admins, "udf_definition", AccessMode::ReadWrite);
    permissions.grant(&admins, "portfolio", AccessMode::ReadWrite);
    let resolver = Arc::new(PermissionResolver::new(permissions, &AclConfig::default()));
    let sink = Arc::new(SlowSink {
        inner: AuditLedger::in_memory(),
        delay: Duration::from_millis(200),
    });
    let engine = UdfEngine::new(
        Arc::new(MemoryUdfStore::new()),
        resolver,
        sink.clone(),
        UdfConfig::default(),
    );
    engine.define_field(risk_rating(), &admin()).await.unwrap();

    let changes = engine
        .set_values_within(
            Deadline::after(Duration::from_millis(50)),
            "portfolio",
            "P-1",
            &batch(&[("risk_rating", json!(3))]),
            &admin(),
        )
        .await
        .unwrap();
    assert_eq!(changes.len(), 1);

    let audit = sink
        .inner
        .query(&AuditFilter::for_entity("portfolio", "P-1").with_action("set_value"))
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].outcome(), AuditOutcome::Success);
}
