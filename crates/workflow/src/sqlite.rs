//! SQLite storage for governed entities

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::entity::{GovernedEntity, WorkflowHistoryRecord};
use crate::status::WorkflowStatus;
use crate::store::{EntityStore, StoreError, SwapOutcome};

const ENTITY_COLUMNS: &str = "id, kind, status, payload_json, created_by, created_at,
    last_modified_by, last_modified_at, submitted_by, submitted_at, review_comments, version";

/// SQLite-backed entity store
pub struct SqliteEntityStore {
    conn: Mutex<Connection>,
}

impl SqliteEntityStore {
    /// Open (or create) a store at the given database path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS governed_entities (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_modified_by TEXT NOT NULL,
                last_modified_at TEXT NOT NULL,
                submitted_by TEXT,
                submitted_at TEXT,
                review_comments TEXT,
                version INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_governed_entities_status
                ON governed_entities(status);
            CREATE TABLE IF NOT EXISTS workflow_history (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                entity_id TEXT NOT NULL,
                from_status TEXT NOT NULL,
                to_status TEXT NOT NULL,
                actor TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                comments TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_workflow_history_entity
                ON workflow_history(entity_id);",
        )?;
        Ok(())
    }
}

/// Raw entity row, converted outside the rusqlite closure
struct EntityRow {
    id: String,
    kind: String,
    status: String,
    payload_json: String,
    created_by: String,
    created_at: String,
    last_modified_by: String,
    last_modified_at: String,
    submitted_by: Option<String>,
    submitted_at: Option<String>,
    review_comments: Option<String>,
    version: i64,
}

impl EntityRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            status: row.get(2)?,
            payload_json: row.get(3)?,
            created_by: row.get(4)?,
            created_at: row.get(5)?,
            last_modified_by: row.get(6)?,
            last_modified_at: row.get(7)?,
            submitted_by: row.get(8)?,
            submitted_at: row.get(9)?,
            review_comments: row.get(10)?,
            version: row.get(11)?,
        })
    }

    fn into_entity(self) -> Result<GovernedEntity, StoreError> {
        Ok(GovernedEntity {
            status: parse_status(&self.status)?,
            payload: serde_json::from_str(&self.payload_json)?,
            created_at: parse_time(&self.created_at)?,
            last_modified_at: parse_time(&self.last_modified_at)?,
            submitted_at: self.submitted_at.as_deref().map(parse_time).transpose()?,
            id: self.id,
            kind: self.kind,
            created_by: self.created_by,
            last_modified_by: self.last_modified_by,
            submitted_by: self.submitted_by,
            review_comments: self.review_comments,
            version: self.version as u64,
        })
    }
}

fn parse_status(s: &str) -> Result<WorkflowStatus, StoreError> {
    WorkflowStatus::from_str(s).ok_or_else(|| StoreError::Corrupt(format!("invalid status {}", s)))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt(format!("invalid timestamp {}", s)))
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn insert(&self, entity: &GovernedEntity) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let payload_json = serde_json::to_string(&entity.payload)?;

        conn.execute(
            "INSERT INTO governed_entities
             (id, kind, status, payload_json, created_by, created_at,
              last_modified_by, last_modified_at, submitted_by, submitted_at,
              review_comments, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entity.id,
                entity.kind,
                entity.status.as_str(),
                payload_json,
                entity.created_by,
                entity.created_at.to_rfc3339(),
                entity.last_modified_by,
                entity.last_modified_at.to_rfc3339(),
                entity.submitted_by,
                entity.submitted_at.map(|t| t.to_rfc3339()),
                entity.review_comments,
                entity.version as i64,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Duplicate(entity.id.clone())
            }
            other => StoreError::Database(other),
        })?;

        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<GovernedEntity>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let sql = format!("SELECT {} FROM governed_entities WHERE id = ?1", ENTITY_COLUMNS);

        let row = conn
            .query_row(&sql, params![id], EntityRow::read)
            .optional()?;

        row.map(EntityRow::into_entity).transpose()
    }

    async fn compare_and_swap(
        &self,
        expected_status: WorkflowStatus,
        expected_version: u64,
        updated: &GovernedEntity,
        history: Option<&WorkflowHistoryRecord>,
    ) -> Result<SwapOutcome, StoreError> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let payload_json = serde_json::to_string(&updated.payload)?;
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "UPDATE governed_entities
             SET status = ?1, payload_json = ?2, last_modified_by = ?3, last_modified_at = ?4,
                 submitted_by = ?5, submitted_at = ?6, review_comments = ?7, version = ?8
             WHERE id = ?9 AND status = ?10 AND version = ?11",
            params![
                updated.status.as_str(),
                payload_json,
                updated.last_modified_by,
                updated.last_modified_at.to_rfc3339(),
                updated.submitted_by,
                updated.submitted_at.map(|t| t.to_rfc3339()),
                updated.review_comments,
                updated.version as i64,
                updated.id,
                expected_status.as_str(),
                expected_version as i64,
            ],
        )?;

        if rows == 0 {
            // Dropping the transaction rolls it back
            return Ok(SwapOutcome::Conflict);
        }

        if let Some(record) = history {
            tx.execute(
                "INSERT INTO workflow_history
                 (id, entity_id, from_status, to_status, actor, timestamp, comments)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.entity_id,
                    record.from_status.as_str(),
                    record.to_status.as_str(),
                    record.actor,
                    record.timestamp.to_rfc3339(),
                    record.comments,
                ],
            )?;
        }

        tx.commit()?;
        Ok(SwapOutcome::Applied)
    }

    async fn history(&self, entity_id: &str) -> Result<Vec<WorkflowHistoryRecord>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT id, entity_id, from_status, to_status, actor, timestamp, comments
             FROM workflow_history WHERE entity_id = ?1 ORDER BY seq ASC",
        )?;

        let rows = stmt
            .query_map(params![entity_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|r| {
                Ok(WorkflowHistoryRecord {
                    id: r.0,
                    entity_id: r.1,
                    from_status: parse_status(&r.2)?,
                    to_status: parse_status(&r.3)?,
                    actor: r.4,
                    timestamp: parse_time(&r.5)?,
                    comments: r.6,
                })
            })
            .collect()
    }

    async fn list(
        &self,
        kind: Option<&str>,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<GovernedEntity>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let sql = format!(
            "SELECT {} FROM governed_entities
             WHERE (?1 IS NULL OR kind = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC",
            ENTITY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt
            .query_map(params![kind, status.map(|s| s.as_str())], EntityRow::read)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(EntityRow::into_entity).collect()
    }

    async fn count_by_status(&self, status: WorkflowStatus) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM governed_entities WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }
}
