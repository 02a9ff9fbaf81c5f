//! UDF engine: definitions, validated batch writes, typed reads

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use foureyes_acl::PermissionResolver;
use foureyes_audit::{AuditEntry, AuditSink};
use foureyes_core::{
    Action, Actor, Deadline, FieldError, FieldErrorKind, GovernanceError, GovernanceResult,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::UdfConfig;
use crate::definition::FieldDefinition;
use crate::history::ValueHistoryRecord;
use crate::store::{StoreError, UdfStore};
use crate::validation::{check_constraints, check_definition};
use crate::value::FieldValue;

/// A checked field of a batch; `value == None` clears the field
struct ParsedField {
    def: FieldDefinition,
    value: Option<FieldValue>,
}

type ParsedBatch = BTreeMap<String, ParsedField>;

fn normalize_entity_type(entity_type: &str) -> String {
    entity_type.trim().to_ascii_lowercase()
}

fn duplicate_definition(def: &FieldDefinition) -> GovernanceError {
    GovernanceError::ValidationFailed(vec![FieldError {
        field: def.field_name.clone(),
        kind: FieldErrorKind::DuplicateValue,
        message: format!("{} is already defined for {}", def.field_name, def.entity_type),
    }])
}

/// Typed value store over user-defined fields
pub struct UdfEngine {
    store: Arc<dyn UdfStore>,
    permissions: Arc<PermissionResolver>,
    audit: Arc<dyn AuditSink>,
    config: UdfConfig,
}

impl UdfEngine {
    pub fn new(
        store: Arc<dyn UdfStore>,
        permissions: Arc<PermissionResolver>,
        audit: Arc<dyn AuditSink>,
        config: UdfConfig,
    ) -> Self {
        Self {
            store,
            permissions,
            audit,
            config,
        }
    }

    pub fn config(&self) -> &UdfConfig {
        &self.config
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.config.operation_timeout())
    }

    // ========================================================================
    // Definitions
    // ========================================================================

    /// Register a new field (requires `create` on the definition resource)
    ///
    /// Fails with `DuplicateValue` when an active field of the same name
    /// already exists on the entity type.
    pub async fn define_field(&self, def: FieldDefinition, actor: &Actor) -> GovernanceResult<FieldDefinition> {
        let deadline = self.deadline();
        let audit_id = format!("{}.{}", def.entity_type, def.field_name);

        let outcome = self.try_define(&deadline, def, actor).await;
        let entry = match &outcome {
            Ok(def) => AuditEntry::success(actor, "define_field", &self.config.definition_resource, &audit_id)
                .with_after(serde_json::to_value(def).ok()),
            Err(err) => AuditEntry::failure(actor, "define_field", &self.config.definition_resource, &audit_id, err),
        };
        self.finish(entry, outcome).await
    }

    async fn try_define(
        &self,
        deadline: &Deadline,
        mut def: FieldDefinition,
        actor: &Actor,
    ) -> GovernanceResult<FieldDefinition> {
        self.authorize(deadline, actor, &self.config.definition_resource, Action::Create)
            .await?;

        def.entity_type = normalize_entity_type(&def.entity_type);
        def.field_name = def.field_name.trim().to_string();

        let errors = check_definition(&def);
        if !errors.is_empty() {
            return Err(GovernanceError::ValidationFailed(errors));
        }

        let existing = self.load_definitions(deadline, &def.entity_type, false).await?;
        if existing.iter().any(|d| d.field_name == def.field_name) {
            return Err(duplicate_definition(&def));
        }

        def.created_by = actor.login().to_string();
        def.created_at = chrono::Utc::now();
        def.is_active = true;

        deadline
            .run("insert definition", async {
                // The store re-checks atomically against a concurrent define
                self.store.insert_definition(&def).await.map_err(|err| match err {
                    StoreError::DuplicateDefinition(_) => duplicate_definition(&def),
                    other => GovernanceError::from(other),
                })
            })
            .await?;

        Ok(def)
    }

    /// Soft-delete a field (requires `delete` on the definition resource)
    ///
    /// Existing values and history are retained; the field stops appearing
    /// in reads and rejects new writes. Its values stay bound to the old
    /// definition and are not visible through a redefined field.
    pub async fn deactivate_field(
        &self,
        entity_type: &str,
        field_name: &str,
        actor: &Actor,
    ) -> GovernanceResult<FieldDefinition> {
        let deadline = self.deadline();
        let entity_type = normalize_entity_type(entity_type);
        let audit_id = format!("{}.{}", entity_type, field_name);

        let outcome = self
            .try_deactivate(&deadline, &entity_type, field_name, actor)
            .await;
        let entry = match &outcome {
            Ok(def) => {
                let mut before = def.clone();
                before.is_active = true;
                AuditEntry::success(actor, "deactivate_field", &self.config.definition_resource, &audit_id)
                    .with_before(serde_json::to_value(&before).ok())
                    .with_after(serde_json::to_value(def).ok())
            }
            Err(err) => AuditEntry::failure(actor, "deactivate_field", &self.config.definition_resource, &audit_id, err),
        };
        self.finish(entry, outcome).await
    }

    async fn try_deactivate(
        &self,
        deadline: &Deadline,
        entity_type: &str,
        field_name: &str,
        actor: &Actor,
    ) -> GovernanceResult<FieldDefinition> {
        self.authorize(deadline, actor, &self.config.definition_resource, Action::Delete)
            .await?;

        let mut def = self
            .load_definitions(deadline, entity_type, false)
            .await?
            .into_iter()
            .find(|d| d.field_name == field_name)
            .ok_or_else(|| GovernanceError::EntityNotFound(format!("{}.{}", entity_type, field_name)))?;

        let found = deadline
            .run("deactivate definition", async {
                self.store
                    .set_definition_active(&def.id, false)
                    .await
                    .map_err(GovernanceError::from)
            })
            .await?;
        if !found {
            return Err(GovernanceError::EntityNotFound(format!("{}.{}", entity_type, field_name)));
        }

        def.is_active = false;
        Ok(def)
    }

    /// Active definitions of an entity type
    pub async fn definitions(&self, entity_type: &str) -> GovernanceResult<Vec<FieldDefinition>> {
        self.load_definitions(&self.deadline(), &normalize_entity_type(entity_type), false)
            .await
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Validate and write a batch of raw values for one entity
    ///
    /// Requires `edit` on the entity type's resource. A JSON `null` clears a
    /// field. Either every field is written or none is. Returns the changes
    /// actually applied; unchanged fields produce no change and no audit.
    pub async fn set_values(
        &self,
        entity_type: &str,
        entity_id: &str,
        values: &BTreeMap<String, Value>,
        actor: &Actor,
    ) -> GovernanceResult<Vec<ValueHistoryRecord>> {
        self.set_values_within(self.deadline(), entity_type, entity_id, values, actor)
            .await
    }

    /// `set_values` under a caller-supplied deadline
    pub async fn set_values_within(
        &self,
        deadline: Deadline,
        entity_type: &str,
        entity_id: &str,
        values: &BTreeMap<String, Value>,
        actor: &Actor,
    ) -> GovernanceResult<Vec<ValueHistoryRecord>> {
        let entity_type = normalize_entity_type(entity_type);
        let entity_id = entity_id.trim();

        match self
            .try_set_values(&deadline, &entity_type, entity_id, values, actor)
            .await
        {
            Ok(changes) => {
                for change in &changes {
                    let field = change.field_name.as_str();
                    let old = change.old_value.as_ref().map_or(Value::Null, FieldValue::to_json);
                    let new = change.new_value.as_ref().map_or(Value::Null, FieldValue::to_json);
                    let entry = AuditEntry::success(actor, "set_value", &entity_type, entity_id)
                        .with_before(Some(json!({ field: old })))
                        .with_after(Some(json!({ field: new })));
                    self.record(entry).await;
                }
                info!(
                    actor = %actor,
                    entity_type = %entity_type,
                    entity_id = %entity_id,
                    changed = changes.len(),
                    "UDF values written"
                );
                Ok(changes)
            }
            Err(err) if err.is_business_rule() => {
                warn!(
                    actor = %actor,
                    entity_type = %entity_type,
                    entity_id = %entity_id,
                    code = err.code(),
                    error = %err,
                    "UDF write refused"
                );
                let attempted: serde_json::Map<String, Value> =
                    values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                let entry = AuditEntry::failure(actor, "set_values", &entity_type, entity_id, &err)
                    .with_after(Some(Value::Object(attempted)));
                self.record(entry).await;
                Err(err)
            }
            Err(err) => {
                error!(
                    actor = %actor,
                    entity_type = %entity_type,
                    entity_id = %entity_id,
                    error = %err,
                    "UDF write failed"
                );
                Err(err)
            }
        }
    }

    async fn try_set_values(
        &self,
        deadline: &Deadline,
        entity_type: &str,
        entity_id: &str,
        values: &BTreeMap<String, Value>,
        actor: &Actor,
    ) -> GovernanceResult<Vec<ValueHistoryRecord>> {
        self.authorize(deadline, actor, entity_type, Action::Edit).await?;

        let existing = deadline
            .run("load values", async {
                self.store
                    .values(entity_type, entity_id)
                    .await
                    .map_err(GovernanceError::from)
            })
            .await?;

        let (parsed, errors) = self
            .check_batch(deadline, entity_type, Some(entity_id), values, &existing)
            .await?;
        if !errors.is_empty() {
            return Err(GovernanceError::ValidationFailed(errors));
        }

        let changes: Vec<ValueHistoryRecord> = parsed
            .into_iter()
            .filter(|(field, parsed)| existing.get(field) != parsed.value.as_ref())
            .map(|(field, parsed)| {
                let old = existing.get(&field).cloned();
                ValueHistoryRecord::new(&parsed.def, entity_id, old, parsed.value, actor)
            })
            .collect();

        if !changes.is_empty() {
            deadline
                .run("apply values", async {
                    self.store
                        .apply_changes(&changes)
                        .await
                        .map_err(GovernanceError::from)
                })
                .await?;
        }

        Ok(changes)
    }

    /// Current typed values of an entity, restricted to active fields
    pub async fn get_values(&self, entity_type: &str, entity_id: &str) -> GovernanceResult<BTreeMap<String, FieldValue>> {
        let deadline = self.deadline();
        let entity_type = normalize_entity_type(entity_type);
        let entity_id = entity_id.trim();

        let active: HashMap<String, FieldDefinition> = self
            .load_definitions(&deadline, &entity_type, false)
            .await?
            .into_iter()
            .map(|d| (d.field_name.clone(), d))
            .collect();

        let stored = deadline
            .run("load values", async {
                self.store
                    .values(&entity_type, entity_id)
                    .await
                    .map_err(GovernanceError::from)
            })
            .await?;

        Ok(stored
            .into_iter()
            .filter(|(field, value)| {
                active
                    .get(field)
                    .map_or(false, |def| value.matches_type(&def.field_type))
            })
            .collect())
    }

    /// Validate a complete set of raw values without writing
    ///
    /// Absent required fields are reported as missing; unique fields are
    /// checked against every entity of the type.
    pub async fn validate(&self, entity_type: &str, values: &BTreeMap<String, Value>) -> GovernanceResult<Vec<FieldError>> {
        let deadline = self.deadline();
        let entity_type = normalize_entity_type(entity_type);
        let (_, errors) = self
            .check_batch(&deadline, &entity_type, None, values, &BTreeMap::new())
            .await?;
        Ok(errors)
    }

    /// Value change trail of an entity, oldest first
    pub async fn value_history(&self, entity_type: &str, entity_id: &str) -> GovernanceResult<Vec<ValueHistoryRecord>> {
        let entity_type = normalize_entity_type(entity_type);
        self.deadline()
            .run("load value history", async {
                self.store
                    .value_history(&entity_type, entity_id.trim())
                    .await
                    .map_err(GovernanceError::from)
            })
            .await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Parse and check every field, collecting all errors
    async fn check_batch(
        &self,
        deadline: &Deadline,
        entity_type: &str,
        entity_id: Option<&str>,
        values: &BTreeMap<String, Value>,
        existing: &BTreeMap<String, FieldValue>,
    ) -> GovernanceResult<(ParsedBatch, Vec<FieldError>)> {
        let definitions = self.load_definitions(deadline, entity_type, true).await?;
        let active: HashMap<&str, &FieldDefinition> = definitions
            .iter()
            .filter(|d| d.is_active)
            .map(|d| (d.field_name.as_str(), d))
            .collect();
        let inactive: HashSet<&str> = definitions
            .iter()
            .filter(|d| !d.is_active)
            .map(|d| d.field_name.as_str())
            .collect();

        let mut parsed = ParsedBatch::new();
        let mut errors = Vec::new();
        let mut failed = HashSet::new();

        for (field, raw) in values {
            let def = match active.get(field.as_str()) {
                Some(def) => *def,
                None if inactive.contains(field.as_str()) => {
                    errors.push(FieldError::inactive(field));
                    continue;
                }
                None => {
                    errors.push(FieldError::unknown(field, entity_type));
                    continue;
                }
            };

            if raw.is_null() {
                parsed.insert(
                    field.clone(),
                    ParsedField {
                        def: def.clone(),
                        value: None,
                    },
                );
                continue;
            }

            let checked = FieldValue::parse(field, &def.field_type, raw).and_then(|value| {
                match check_constraints(def, &value) {
                    Some(err) => Err(err),
                    None => Ok(value),
                }
            });
            match checked {
                Ok(value) => {
                    parsed.insert(
                        field.clone(),
                        ParsedField {
                            def: def.clone(),
                            value: Some(value),
                        },
                    );
                }
                Err(err) => {
                    failed.insert(field.as_str());
                    errors.push(err);
                }
            }
        }

        // Required fields are judged on the state after the batch
        for def in active.values().filter(|d| d.is_required) {
            let name = def.field_name.as_str();
            if failed.contains(name) {
                continue;
            }
            let present = match parsed.get(name) {
                Some(new) => new.value.is_some(),
                None => existing.contains_key(name),
            };
            if !present {
                errors.push(FieldError::required(name));
            }
        }

        for (field, entry) in &parsed {
            let Some(value) = &entry.value else {
                continue;
            };
            if !entry.def.is_unique {
                continue;
            }

            let holders = deadline
                .run("uniqueness check", async {
                    self.store
                        .find_entities_with_value(entity_type, field, value)
                        .await
                        .map_err(GovernanceError::from)
                })
                .await?;
            if let Some(holder) = holders.iter().find(|h| Some(h.as_str()) != entity_id) {
                errors.push(FieldError::duplicate(field, holder));
            }
        }

        errors.sort_by(|a, b| a.field.cmp(&b.field));
        Ok((parsed, errors))
    }

    async fn load_definitions(
        &self,
        deadline: &Deadline,
        entity_type: &str,
        include_inactive: bool,
    ) -> GovernanceResult<Vec<FieldDefinition>> {
        deadline
            .run("load definitions", async {
                self.store
                    .definitions(entity_type, include_inactive)
                    .await
                    .map_err(GovernanceError::from)
            })
            .await
    }

    async fn authorize(&self, deadline: &Deadline, actor: &Actor, resource: &str, action: Action) -> GovernanceResult<()> {
        deadline
            .run("authorize", self.permissions.require(actor, resource, action))
            .await
    }

    /// Write an audit entry for an outcome that is already final
    ///
    /// Runs under its own budget, not the operation's. A failure is logged
    /// and does not change the outcome reported to the caller.
    async fn record(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        let entity_id = entry.entity_id.clone();
        let written = self
            .deadline()
            .run("audit", async {
                self.audit
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

    /// Audit a definition change and hand the outcome back
    async fn finish(
        &self,
        entry: AuditEntry,
        outcome: GovernanceResult<FieldDefinition>,
    ) -> GovernanceResult<FieldDefinition> {
        match &outcome {
            Err(err) if !err.is_business_rule() => {
                error!(action = %entry.action, entity_id = %entry.entity_id, error = %err, "UDF definition change failed");
                return outcome;
            }
            Err(err) => {
                warn!(action = %entry.action, entity_id = %entry.entity_id, code = err.code(), "UDF definition change refused");
            }
            Ok(_) => {
                info!(action = %entry.action, entity_id = %entry.entity_id, "UDF definition changed");
            }
        }
        self.record(entry).await;
        outcome
    }
}
