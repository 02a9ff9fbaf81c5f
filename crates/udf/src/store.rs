//! UDF persistence

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use foureyes_core::GovernanceError;
use thiserror::Error;

use crate::definition::FieldDefinition;
use crate::history::ValueHistoryRecord;
use crate::value::FieldValue;

/// Errors from a UDF store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Active definition already exists: {0}")]
    DuplicateDefinition(String),
}

impl From<StoreError> for GovernanceError {
    fn from(err: StoreError) -> Self {
        GovernanceError::ExternalStoreUnavailable(err.to_string())
    }
}

/// Persistence for definitions, values and value history
#[async_trait]
pub trait UdfStore: Send + Sync {
    /// Insert a definition; `DuplicateDefinition` if an active one of the
    /// same entity type and name exists
    async fn insert_definition(&self, def: &FieldDefinition) -> Result<(), StoreError>;

    /// Flip a definition's active flag; false if no such definition
    async fn set_definition_active(&self, id: &str, active: bool) -> Result<bool, StoreError>;

    /// Definitions of an entity type, in creation order
    async fn definitions(
        &self,
        entity_type: &str,
        include_inactive: bool,
    ) -> Result<Vec<FieldDefinition>, StoreError>;

    /// Stored values of one entity written under active definitions
    async fn values(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<BTreeMap<String, FieldValue>, StoreError>;

    /// Entities of a type holding `value` in `field_name` under its active definition
    async fn find_entities_with_value(
        &self,
        entity_type: &str,
        field_name: &str,
        value: &FieldValue,
    ) -> Result<Vec<String>, StoreError>;

    /// Apply every change and append its history record, all or nothing
    async fn apply_changes(&self, changes: &[ValueHistoryRecord]) -> Result<(), StoreError>;

    /// Value history of one entity, oldest first
    async fn value_history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<ValueHistoryRecord>, StoreError>;
}

type EntityKey = (String, String);

struct StoredValue {
    definition_id: String,
    value: FieldValue,
}

#[derive(Default)]
struct MemoryState {
    definitions: Vec<FieldDefinition>,
    values: HashMap<EntityKey, BTreeMap<String, StoredValue>>,
    history: Vec<ValueHistoryRecord>,
}

impl MemoryState {
    fn is_active(&self, definition_id: &str) -> bool {
        self.definitions
            .iter()
            .any(|d| d.id == definition_id && d.is_active)
    }
}

/// In-memory UDF store
#[derive(Default)]
pub struct MemoryUdfStore {
    state: Mutex<MemoryState>,
}

impl MemoryUdfStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UdfStore for MemoryUdfStore {
    async fn insert_definition(&self, def: &FieldDefinition) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let taken = def.is_active
            && state.definitions.iter().any(|d| {
                d.is_active && d.entity_type == def.entity_type && d.field_name == def.field_name
            });
        if taken {
            return Err(StoreError::DuplicateDefinition(format!(
                "{}.{}",
                def.entity_type, def.field_name
            )));
        }
        state.definitions.push(def.clone());
        Ok(())
    }

    async fn set_definition_active(&self, id: &str, active: bool) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.definitions.iter_mut().find(|d| d.id == id) {
            Some(def) => {
                def.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn definitions(
        &self,
        entity_type: &str,
        include_inactive: bool,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .definitions
            .iter()
            .filter(|d| d.entity_type == entity_type && (include_inactive || d.is_active))
            .cloned()
            .collect())
    }

    async fn values(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<BTreeMap<String, FieldValue>, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let key = (entity_type.to_string(), entity_id.to_string());
        let Some(fields) = state.values.get(&key) else {
            return Ok(BTreeMap::new());
        };
        Ok(fields
            .iter()
            .filter(|(_, stored)| state.is_active(&stored.definition_id))
            .map(|(field, stored)| (field.clone(), stored.value.clone()))
            .collect())
    }

    async fn find_entities_with_value(
        &self,
        entity_type: &str,
        field_name: &str,
        value: &FieldValue,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let wanted = value.canonical_key();
        let mut holders: Vec<String> = state
            .values
            .iter()
            .filter(|((etype, _), _)| etype == entity_type)
            .filter(|(_, fields)| {
                fields.get(field_name).map_or(false, |stored| {
                    stored.value.canonical_key() == wanted && state.is_active(&stored.definition_id)
                })
            })
            .map(|((_, entity_id), _)| entity_id.clone())
            .collect();
        holders.sort();
        Ok(holders)
    }

    async fn apply_changes(&self, changes: &[ValueHistoryRecord]) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for change in changes {
            let key = (change.entity_type.clone(), change.entity_id.clone());
            let fields = state.values.entry(key).or_default();
            match &change.new_value {
                Some(value) => {
                    fields.insert(
                        change.field_name.clone(),
                        StoredValue {
                            definition_id: change.definition_id.clone(),
                            value: value.clone(),
                        },
                    );
                }
                None => {
                    fields.remove(&change.field_name);
                }
            }
        }
        state.history.extend(changes.iter().cloned());
        Ok(())
    }

    async fn value_history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<ValueHistoryRecord>, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .history
            .iter()
            .filter(|r| r.entity_type == entity_type && r.entity_id == entity_id)
            .cloned()
            .collect())
    }
}
