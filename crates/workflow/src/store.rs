//! Entity persistence
//!
//! Stores never hold entity-level locks across I/O. Concurrent writers are
//! serialized by `compare_and_swap`: the update applies only if the stored
//! status and version still match what the writer observed.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use foureyes_core::GovernanceError;
use thiserror::Error;

use crate::entity::{GovernedEntity, WorkflowHistoryRecord};
use crate::status::WorkflowStatus;

/// Errors from an entity store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),
}

impl From<StoreError> for GovernanceError {
    fn from(err: StoreError) -> Self {
        GovernanceError::ExternalStoreUnavailable(err.to_string())
    }
}

/// Result of a compare-and-swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// Entity updated and history appended
    Applied,
    /// Stored status or version no longer matched
    Conflict,
}

/// Persistence for governed entities and their history
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Persist a newly created entity
    async fn insert(&self, entity: &GovernedEntity) -> Result<(), StoreError>;

    async fn load(&self, id: &str) -> Result<Option<GovernedEntity>, StoreError>;

    /// Atomically replace the entity and append `history`, if the stored
    /// entity still has `expected_status` and `expected_version`
    async fn compare_and_swap(
        &self,
        expected_status: WorkflowStatus,
        expected_version: u64,
        updated: &GovernedEntity,
        history: Option<&WorkflowHistoryRecord>,
    ) -> Result<SwapOutcome, StoreError>;

    /// Transition history of an entity, oldest first
    async fn history(&self, entity_id: &str) -> Result<Vec<WorkflowHistoryRecord>, StoreError>;

    /// Entities filtered by kind and/or status, newest first
    async fn list(
        &self,
        kind: Option<&str>,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<GovernedEntity>, StoreError>;

    async fn count_by_status(&self, status: WorkflowStatus) -> Result<usize, StoreError>;
}

#[derive(Default)]
struct MemoryState {
    entities: HashMap<String, GovernedEntity>,
    history: Vec<WorkflowHistoryRecord>,
}

/// In-memory entity store
#[derive(Default)]
pub struct MemoryEntityStore {
    state: Mutex<MemoryState>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn insert(&self, entity: &GovernedEntity) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.entities.contains_key(&entity.id) {
            return Err(StoreError::Duplicate(entity.id.clone()));
        }
        state.entities.insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<GovernedEntity>, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.entities.get(id).cloned())
    }

    async fn compare_and_swap(
        &self,
        expected_status: WorkflowStatus,
        expected_version: u64,
        updated: &GovernedEntity,
        history: Option<&WorkflowHistoryRecord>,
    ) -> Result<SwapOutcome, StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let matches = state
            .entities
            .get(&updated.id)
            .map_or(false, |current| {
                current.status == expected_status && current.version == expected_version
            });
        if !matches {
            return Ok(SwapOutcome::Conflict);
        }

        state.entities.insert(updated.id.clone(), updated.clone());
        if let Some(record) = history {
            state.history.push(record.clone());
        }
        Ok(SwapOutcome::Applied)
    }

    async fn history(&self, entity_id: &str) -> Result<Vec<WorkflowHistoryRecord>, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .history
            .iter()
            .filter(|r| r.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        kind: Option<&str>,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<GovernedEntity>, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut entities: Vec<GovernedEntity> = state
            .entities
            .values()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        entities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entities)
    }

    async fn count_by_status(&self, status: WorkflowStatus) -> Result<usize, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.entities.values().filter(|e| e.status == status).count())
    }
}
