//! CLI commands

use std::collections::BTreeMap;

use foureyes_audit::{AuditFilter, AuditRecord};
use foureyes_core::{Actor, GovernanceError};
use foureyes_udf::{FieldDefinition, FieldType, FieldValue, NumericBounds};
use foureyes_workflow::{GovernedEntity, WorkflowHistoryRecord, WorkflowStats};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::context::AppContext;

/// Print field-level detail for validation failures before handing the error up
fn report(err: GovernanceError) -> anyhow::Error {
    for field_error in err.field_errors() {
        println!("   ❌ {}: {}", field_error.field, field_error.message);
    }
    anyhow::anyhow!("{} ({})", err, err.code())
}

fn print_entity(entity: &GovernedEntity) {
    println!("   {} [{}] v{}", entity.id, entity.status, entity.version);
}

// ============================================================================
// Identity & permissions
// ============================================================================

/// Show the resolved actor
pub fn whoami(actor: &Actor) {
    println!("👤 {}", actor);
}

/// Show the actor's effective permissions
pub async fn permissions(ctx: &AppContext, actor: &Actor) -> Result<(), anyhow::Error> {
    let effective = ctx.permissions.effective_permissions(actor).await.map_err(report)?;

    match &effective.group {
        Some(group) => println!("👤 {} (group: {})", actor, group),
        None => println!("👤 {} (no group)", actor),
    }
    if effective.modes.is_empty() {
        println!("   No permissions");
    }
    for (resource, mode) in &effective.modes {
        println!("   {:<32} {}", resource, mode);
    }
    Ok(())
}

// ============================================================================
// Workflow
// ============================================================================

/// Create a draft entity
pub async fn create(ctx: &AppContext, actor: &Actor, kind: &str, payload: &str) -> Result<GovernedEntity, anyhow::Error> {
    let payload: Value = serde_json::from_str(payload)?;
    let entity = ctx.workflow.create(kind, payload, actor).await.map_err(report)?;

    println!("✅ Created {}", entity.id);
    print_entity(&entity);
    Ok(entity)
}

/// Replace the payload of a draft or rejected entity
pub async fn edit(ctx: &AppContext, actor: &Actor, id: &str, payload: &str) -> Result<GovernedEntity, anyhow::Error> {
    let payload: Value = serde_json::from_str(payload)?;
    let entity = ctx.workflow.edit(id, payload, actor).await.map_err(report)?;

    println!("✅ Edited {}", entity.id);
    print_entity(&entity);
    Ok(entity)
}

/// Submit an entity for approval
pub async fn submit(ctx: &AppContext, actor: &Actor, id: &str) -> Result<GovernedEntity, anyhow::Error> {
    let entity = ctx.workflow.submit(id, actor).await.map_err(report)?;

    println!("📨 Submitted {} for approval", entity.id);
    print_entity(&entity);
    Ok(entity)
}

/// Approve a pending entity
pub async fn approve(
    ctx: &AppContext,
    actor: &Actor,
    id: &str,
    comments: Option<&str>,
) -> Result<GovernedEntity, anyhow::Error> {
    let entity = ctx.workflow.approve(id, actor, comments).await.map_err(report)?;

    println!("✅ Approved {}", entity.id);
    print_entity(&entity);
    Ok(entity)
}

/// Reject a pending entity
pub async fn reject(ctx: &AppContext, actor: &Actor, id: &str, comments: &str) -> Result<GovernedEntity, anyhow::Error> {
    let entity = ctx.workflow.reject(id, actor, comments).await.map_err(report)?;

    println!("↩️  Rejected {}", entity.id);
    print_entity(&entity);
    Ok(entity)
}

/// Close an effective entity
pub async fn close(ctx: &AppContext, actor: &Actor, id: &str) -> Result<GovernedEntity, anyhow::Error> {
    let entity = ctx.workflow.close(id, actor).await.map_err(report)?;

    println!("🔒 Closed {}", entity.id);
    print_entity(&entity);
    Ok(entity)
}

/// Reactivate a closed entity
pub async fn reactivate(
    ctx: &AppContext,
    actor: &Actor,
    id: &str,
    justification: &str,
) -> Result<GovernedEntity, anyhow::Error> {
    let entity = ctx
        .workflow
        .reactivate(id, actor, justification)
        .await
        .map_err(report)?;

    println!("🔓 Reactivated {}", entity.id);
    print_entity(&entity);
    Ok(entity)
}

/// Show an entity with its UDF values
pub async fn show(ctx: &AppContext, actor: &Actor, id: &str) -> Result<GovernedEntity, anyhow::Error> {
    let entity = ctx.workflow.view(id, actor).await.map_err(report)?;
    let values = ctx
        .udf
        .get_values(&entity.kind, &entity.id)
        .await
        .map_err(report)?;

    println!("{} ({})", entity.id, entity.kind);
    println!("   Status:      {}", entity.status);
    println!("   Version:     {}", entity.version);
    println!("   Created by:  {} at {}", entity.created_by, entity.created_at);
    println!(
        "   Modified by: {} at {}",
        entity.last_modified_by, entity.last_modified_at
    );
    if let Some(submitter) = &entity.submitted_by {
        println!("   Submitted by: {}", submitter);
    }
    if let Some(comments) = &entity.review_comments {
        println!("   Comments:    {}", comments);
    }
    println!("   Payload:     {}", entity.payload);
    for (field, value) in &values {
        println!("   {:<16} {}", field, value);
    }
    Ok(entity)
}

/// Show the workflow history of an entity
pub async fn history(ctx: &AppContext, actor: &Actor, id: &str) -> Result<Vec<WorkflowHistoryRecord>, anyhow::Error> {
    // Viewing requires the same grant as `show`
    ctx.workflow.view(id, actor).await.map_err(report)?;
    let records = ctx.workflow.history(id).await.map_err(report)?;

    if records.is_empty() {
        println!("No transitions recorded for {}", id);
    }
    for record in &records {
        println!(
            "{} {} → {} by {}{}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.from_status,
            record.to_status,
            record.actor,
            record
                .comments
                .as_deref()
                .map(|c| format!(" ({})", c))
                .unwrap_or_default()
        );
    }
    Ok(records)
}

/// Entity counts per status
pub async fn stats(ctx: &AppContext) -> Result<WorkflowStats, anyhow::Error> {
    let stats = ctx.workflow.stats().await.map_err(report)?;

    println!("📊 Workflow ({} entities)", stats.total());
    println!("   DRAFT:            {}", stats.draft);
    println!("   PENDING_APPROVAL: {}", stats.pending_approval);
    println!("   APPROVED:         {}", stats.approved);
    println!("   ACTIVE:           {}", stats.active);
    println!("   REJECTED:         {}", stats.rejected);
    println!("   CLOSED:           {}", stats.closed);
    Ok(stats)
}

// ============================================================================
// Audit
// ============================================================================

/// List audit records, optionally verifying the hash chain first
pub fn audit(ctx: &AppContext, filter: &AuditFilter, limit: usize, verify: bool) -> Result<Vec<AuditRecord>, anyhow::Error> {
    if verify {
        match ctx.ledger.verify()? {
            Ok(count) => println!("✅ Hash chain verified ({} records)", count),
            Err(e) => anyhow::bail!("Hash chain broken: {}", e),
        }
    }

    let records = ctx.ledger.read_filtered(filter)?;
    let skip = records.len().saturating_sub(limit);
    let shown: Vec<AuditRecord> = records.into_iter().skip(skip).collect();

    for record in &shown {
        let marker = if record.is_failure() { "❌" } else { "✅" };
        println!(
            "{} #{} {} {} {} {}/{}{}",
            marker,
            record.sequence,
            record.timestamp().format("%Y-%m-%d %H:%M:%S"),
            record.actor(),
            record.action(),
            record.entity_type(),
            record.entity_id(),
            record
                .entry
                .error_code
                .as_deref()
                .map(|c| format!(" [{}]", c))
                .unwrap_or_default()
        );
    }
    Ok(shown)
}

// ============================================================================
// UDF
// ============================================================================

/// Field definition options gathered from the command line
#[derive(Debug, Clone, Default)]
pub struct FieldSpec {
    pub field_type: String,
    pub label: Option<String>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub max_length: Option<usize>,
    pub options: Vec<String>,
    pub required: bool,
    pub unique: bool,
}

impl FieldSpec {
    pub fn new(field_type: &str) -> Self {
        Self {
            field_type: field_type.to_string(),
            ..Self::default()
        }
    }

    /// Build a definition; type names follow the wire names (`NUMBER`, `MULTI_SELECT`, ...)
    pub fn to_definition(&self, entity_type: &str, field_name: &str) -> Result<FieldDefinition, anyhow::Error> {
        let bounds = NumericBounds::new(self.min, self.max);
        let options = self.options.clone();

        let field_type = match self.field_type.to_ascii_uppercase().replace('-', "_").as_str() {
            "TEXT" => FieldType::Text {
                max_length: self.max_length,
            },
            "NUMBER" => FieldType::Number { bounds },
            "CURRENCY" => FieldType::Currency { bounds },
            "PERCENTAGE" => FieldType::Percentage { bounds },
            "BOOLEAN" => FieldType::Boolean,
            "DATE" => FieldType::Date,
            "DATETIME" => FieldType::DateTime,
            "DROPDOWN" => FieldType::Dropdown { options },
            "MULTI_SELECT" => FieldType::MultiSelect { options },
            other => anyhow::bail!("Unknown field type: {}", other),
        };

        let mut def = FieldDefinition::new(entity_type, field_name, field_type);
        if let Some(label) = &self.label {
            def = def.with_label(label);
        }
        if self.required {
            def = def.required();
        }
        if self.unique {
            def = def.unique();
        }
        Ok(def)
    }
}

/// Parse `name=value` assignments; values are JSON when they parse, text otherwise
///
/// `name=` (empty value) clears the field.
pub fn parse_assignments(assignments: &[String]) -> Result<BTreeMap<String, Value>, anyhow::Error> {
    assignments
        .iter()
        .map(|assignment| {
            let (name, raw) = assignment
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Expected name=value, got {}", assignment))?;
            let value = if raw.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
            };
            Ok((name.trim().to_string(), value))
        })
        .collect()
}

/// Define a new field on an entity type
pub async fn udf_define(
    ctx: &AppContext,
    actor: &Actor,
    entity_type: &str,
    field_name: &str,
    spec: &FieldSpec,
) -> Result<FieldDefinition, anyhow::Error> {
    let def = spec.to_definition(entity_type, field_name)?;
    let def = ctx.udf.define_field(def, actor).await.map_err(report)?;

    println!(
        "✅ Defined {}.{} ({})",
        def.entity_type,
        def.field_name,
        def.field_type.as_str()
    );
    Ok(def)
}

/// Deactivate a field
pub async fn udf_deactivate(
    ctx: &AppContext,
    actor: &Actor,
    entity_type: &str,
    field_name: &str,
) -> Result<(), anyhow::Error> {
    let def = ctx
        .udf
        .deactivate_field(entity_type, field_name, actor)
        .await
        .map_err(report)?;

    println!("🗑️  Deactivated {}.{}", def.entity_type, def.field_name);
    Ok(())
}

/// Validate and write field values for one entity
pub async fn udf_set(
    ctx: &AppContext,
    actor: &Actor,
    entity_type: &str,
    entity_id: &str,
    assignments: &[String],
) -> Result<usize, anyhow::Error> {
    let values = parse_assignments(assignments)?;
    let changes = ctx
        .udf
        .set_values(entity_type, entity_id, &values, actor)
        .await
        .map_err(report)?;

    if changes.is_empty() {
        println!("No changes for {}", entity_id);
    } else {
        println!("✅ Updated {} field(s) on {}", changes.len(), entity_id);
    }
    for change in &changes {
        println!(
            "   {}: {} → {}",
            change.field_name,
            change.old_value.as_ref().map_or("∅".to_string(), FieldValue::to_string),
            change.new_value.as_ref().map_or("∅".to_string(), FieldValue::to_string)
        );
    }
    Ok(changes.len())
}

/// Show field values of one entity, or the definitions when no id is given
pub async fn udf_get(
    ctx: &AppContext,
    entity_type: &str,
    entity_id: Option<&str>,
) -> Result<(), anyhow::Error> {
    match entity_id {
        Some(id) => {
            let values = ctx.udf.get_values(entity_type, id).await.map_err(report)?;
            if values.is_empty() {
                println!("No values for {}", id);
            }
            for (field, value) in &values {
                println!("   {:<16} {}", field, value);
            }
        }
        None => {
            let defs = ctx.udf.definitions(entity_type).await.map_err(report)?;
            if defs.is_empty() {
                println!("No fields defined for {}", entity_type);
            }
            for def in &defs {
                println!(
                    "   {:<16} {:<12}{}{}",
                    def.field_name,
                    def.field_type.as_str(),
                    if def.is_required { " required" } else { "" },
                    if def.is_unique { " unique" } else { "" }
                );
            }
        }
    }
    Ok(())
}
