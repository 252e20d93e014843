//! SQLite-backed audit trail.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row, ToSql};

use super::{AuditError, AuditEvent, AuditFilter, AuditRecord, AuditStore};
use crate::media::MediaKind;

const COLUMNS: &str = "id, timestamp, event_type, media_id, kind, user_id, data";

pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Open (or create) the audit table in the database at `path`.
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        Self::with_connection(Connection::open(path)?)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, AuditError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, AuditError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                media_id INTEGER,
                kind TEXT,
                user_id TEXT,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_media ON audit_events(media_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_type ON audit_events(event_type, timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_events(timestamp);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn
            .lock()
            .map_err(|_| AuditError::Database("audit connection lock poisoned".to_string()))
    }

    fn where_clause(filter: &AuditFilter) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(media_id) = filter.media_id {
            conditions.push("media_id = ?".to_string());
            params.push(Box::new(media_id));
        }
        if !filter.event_types.is_empty() {
            let slots = vec!["?"; filter.event_types.len()].join(", ");
            conditions.push(format!("event_type IN ({})", slots));
            for event_type in &filter.event_types {
                params.push(Box::new(event_type.clone()));
            }
        }
        if let Some(kind) = filter.kind {
            conditions.push("kind = ?".to_string());
            params.push(Box::new(kind.as_str()));
        }
        if let Some(user_id) = &filter.user_id {
            conditions.push("user_id = ?".to_string());
            params.push(Box::new(user_id.clone()));
        }
        if let Some(since) = filter.since {
            conditions.push("timestamp >= ?".to_string());
            params.push(Box::new(since.to_rfc3339()));
        }
        if let Some(until) = filter.until {
            conditions.push("timestamp <= ?".to_string());
            params.push(Box::new(until.to_rfc3339()));
        }

        if conditions.is_empty() {
            (String::new(), params)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), params)
        }
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
        Ok(RawRecord {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            event_type: row.get(2)?,
            media_id: row.get(3)?,
            kind: row.get(4)?,
            user_id: row.get(5)?,
            data: row.get(6)?,
        })
    }
}

/// Columns as stored, before the timestamp and payload are decoded.
struct RawRecord {
    id: i64,
    timestamp: String,
    event_type: String,
    media_id: Option<i64>,
    kind: Option<String>,
    user_id: Option<String>,
    data: String,
}

impl TryFrom<RawRecord> for AuditRecord {
    type Error = AuditError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let timestamp = DateTime::parse_from_rfc3339(&raw.timestamp)
            .map_err(|e| AuditError::Database(format!("invalid timestamp {}: {}", raw.timestamp, e)))?
            .with_timezone(&Utc);
        let kind = raw
            .kind
            .as_deref()
            .map(|k| k.parse::<MediaKind>())
            .transpose()
            .map_err(|e| AuditError::Database(format!("invalid kind: {}", e)))?;
        let data: AuditEvent = serde_json::from_str(&raw.data)?;

        Ok(AuditRecord {
            id: raw.id,
            timestamp,
            event_type: raw.event_type,
            media_id: raw.media_id,
            kind,
            user_id: raw.user_id,
            data,
        })
    }
}

impl AuditStore for SqliteAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        let data = serde_json::to_string(&record.data)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO audit_events (timestamp, event_type, media_id, kind, user_id, data) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.event_type,
                record.media_id,
                record.kind.map(|k| k.as_str()),
                record.user_id,
                data,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let (where_clause, mut params) = Self::where_clause(filter);
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));
        let sql = format!(
            "SELECT {} FROM audit_events {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            COLUMNS, where_clause
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(refs.as_slice(), Self::read_row)?;

        rows.map(|row| AuditRecord::try_from(row?)).collect()
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let (where_clause, params) = Self::where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM audit_events {}", where_clause);
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let conn = self.conn()?;
        Ok(conn.query_row(&sql, refs.as_slice(), |row| row.get(0))?)
    }
}
