//! SQLite storage for UDF definitions, values and history

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};

use crate::definition::FieldDefinition;
use crate::history::ValueHistoryRecord;
use crate::store::{StoreError, UdfStore};
use crate::value::FieldValue;

/// SQLite-backed UDF store
pub struct SqliteUdfStore {
    conn: Mutex<Connection>,
}

impl SqliteUdfStore {
    /// Open (or create) a store at the given database path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store
    pub fn in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS udf_definitions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                entity_type TEXT NOT NULL,
                field_name TEXT NOT NULL,
                definition_json TEXT NOT NULL,
                is_active INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_udf_definitions_entity_type
                ON udf_definitions(entity_type);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_udf_definitions_active_name
                ON udf_definitions(entity_type, field_name) WHERE is_active = 1;
            CREATE TABLE IF NOT EXISTS udf_values (
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                field_name TEXT NOT NULL,
                definition_id TEXT NOT NULL,
                value_json TEXT NOT NULL,
                value_key TEXT NOT NULL,
                PRIMARY KEY (entity_type, entity_id, field_name)
            );
            CREATE INDEX IF NOT EXISTS idx_udf_values_lookup
                ON udf_values(entity_type, field_name, value_key);
            CREATE TABLE IF NOT EXISTS udf_value_history (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                definition_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                field_name TEXT NOT NULL,
                old_value_json TEXT,
                new_value_json TEXT,
                actor TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_udf_value_history_entity
                ON udf_value_history(entity_type, entity_id);",
        )?;
        Ok(())
    }
}

fn to_json(value: &Option<FieldValue>) -> Result<Option<String>, StoreError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StoreError::from)
}

fn from_json(text: Option<String>) -> Result<Option<FieldValue>, StoreError> {
    text.as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(StoreError::from)
}

#[async_trait]
impl UdfStore for SqliteUdfStore {
    async fn insert_definition(&self, def: &FieldDefinition) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO udf_definitions (id, entity_type, field_name, definition_json, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                def.id,
                def.entity_type,
                def.field_name,
                serde_json::to_string(def)?,
                def.is_active,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _) if err.code == ErrorCode::ConstraintViolation => {
                StoreError::DuplicateDefinition(format!("{}.{}", def.entity_type, def.field_name))
            }
            other => StoreError::Database(other),
        })?;
        Ok(())
    }

    async fn set_definition_active(&self, id: &str, active: bool) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let rows = conn.execute(
            "UPDATE udf_definitions SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(rows > 0)
    }

    async fn definitions(
        &self,
        entity_type: &str,
        include_inactive: bool,
    ) -> Result<Vec<FieldDefinition>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT definition_json, is_active FROM udf_definitions
             WHERE entity_type = ?1 AND (?2 OR is_active)
             ORDER BY seq ASC",
        )?;

        let rows = stmt
            .query_map(params![entity_type, include_inactive], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(json, active)| {
                let mut def: FieldDefinition = serde_json::from_str(&json)?;
                def.is_active = active;
                Ok(def)
            })
            .collect()
    }

    async fn values(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<BTreeMap<String, FieldValue>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT v.field_name, v.value_json FROM udf_values v
             JOIN udf_definitions d ON d.id = v.definition_id AND d.is_active = 1
             WHERE v.entity_type = ?1 AND v.entity_id = ?2",
        )?;

        let rows = stmt
            .query_map(params![entity_type, entity_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(field, json)| Ok((field, serde_json::from_str(&json)?)))
            .collect()
    }

    async fn find_entities_with_value(
        &self,
        entity_type: &str,
        field_name: &str,
        value: &FieldValue,
    ) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT v.entity_id FROM udf_values v
             JOIN udf_definitions d ON d.id = v.definition_id AND d.is_active = 1
             WHERE v.entity_type = ?1 AND v.field_name = ?2 AND v.value_key = ?3
             ORDER BY v.entity_id ASC",
        )?;

        let holders = stmt
            .query_map(params![entity_type, field_name, value.canonical_key()], |row| {
                row.get(0)
            })?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(holders)
    }

    async fn apply_changes(&self, changes: &[ValueHistoryRecord]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;

        for change in changes {
            match &change.new_value {
                Some(value) => {
                    tx.execute(
                        "INSERT OR REPLACE INTO udf_values
                         (entity_type, entity_id, field_name, definition_id, value_json, value_key)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            change.entity_type,
                            change.entity_id,
                            change.field_name,
                            change.definition_id,
                            serde_json::to_string(value)?,
                            value.canonical_key(),
                        ],
                    )?;
                }
                None => {
                    tx.execute(
                        "DELETE FROM udf_values
                         WHERE entity_type = ?1 AND entity_id = ?2 AND field_name = ?3",
                        params![change.entity_type, change.entity_id, change.field_name],
                    )?;
                }
            }

            tx.execute(
                "INSERT INTO udf_value_history
                 (id, definition_id, entity_type, entity_id, field_name,
                  old_value_json, new_value_json, actor, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    change.id,
                    change.definition_id,
                    change.entity_type,
                    change.entity_id,
                    change.field_name,
                    to_json(&change.old_value)?,
                    to_json(&change.new_value)?,
                    change.actor,
                    change.timestamp.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn value_history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<ValueHistoryRecord>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT id, definition_id, field_name, old_value_json, new_value_json, actor, timestamp
             FROM udf_value_history
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY seq ASC",
        )?;

        let rows = stmt
            .query_map(params![entity_type, entity_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|r| {
                Ok(ValueHistoryRecord {
                    id: r.0,
                    definition_id: r.1,
                    entity_type: entity_type.to_string(),
                    entity_id: entity_id.to_string(),
                    field_name: r.2,
                    old_value: from_json(r.3)?,
                    new_value: from_json(r.4)?,
                    actor: r.5,
                    timestamp: DateTime::parse_from_rfc3339(&r.6)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(|_| StoreError::Corrupt(format!("invalid timestamp {}", r.6)))?,
                })
            })
            .collect()
    }
}
