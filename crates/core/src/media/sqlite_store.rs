//! SQLite-backed media record store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    ExternalIds, MediaError, MediaFilter, MediaKind, MediaRecord, MediaStatus, MediaStore,
    UpstreamIds,
};
use crate::ledger::ShowLedger;
use crate::retry::RetryState;

const COLUMNS: &str = "id, provider_id, kind, title, year, imdb_id, tvdb_id, trakt_id, \
    upstream_request_id, upstream_media_id, status, processing_stage, error_count, \
    last_error_at, error_message, attempt_count, next_eligible_at, request_count, \
    first_requested_at, last_requested_at, requested_by, subscription_active, \
    subscription_last_checked, requested_seasons, seasons, processing_started_at, \
    processing_completed_at, created_at, updated_at";

/// SQLite-backed media store.
pub struct SqliteMediaStore {
    conn: Mutex<Connection>,
}

impl SqliteMediaStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, MediaError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, MediaError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), MediaError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS media_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                provider_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                year INTEGER,
                imdb_id TEXT,
                tvdb_id INTEGER,
                trakt_id TEXT,
                upstream_request_id INTEGER,
                upstream_media_id INTEGER,
                status TEXT NOT NULL,
                processing_stage TEXT,
                error_count INTEGER NOT NULL DEFAULT 0,
                last_error_at TEXT,
                error_message TEXT,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                next_eligible_at TEXT,
                request_count INTEGER NOT NULL DEFAULT 1,
                first_requested_at TEXT NOT NULL,
                last_requested_at TEXT NOT NULL,
                requested_by TEXT,
                subscription_active INTEGER NOT NULL DEFAULT 0,
                subscription_last_checked TEXT,
                requested_seasons TEXT NOT NULL DEFAULT '[]',
                seasons TEXT NOT NULL DEFAULT '{}',
                processing_started_at TEXT,
                processing_completed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(provider_id, kind)
            );

            CREATE INDEX IF NOT EXISTS idx_media_status ON media_records(status);
            CREATE INDEX IF NOT EXISTS idx_media_kind ON media_records(kind);
            CREATE INDEX IF NOT EXISTS idx_media_last_error ON media_records(last_error_at);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, MediaError> {
        self.conn
            .lock()
            .map_err(|_| MediaError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &MediaFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(kind) = filter.kind {
            conditions.push("kind = ?");
            params.push(Box::new(kind.as_str()));
        }

        if let Some(subscribed) = filter.subscribed {
            conditions.push("subscription_active = ?");
            params.push(Box::new(subscribed));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<MediaRecord> {
        let kind: String = row.get("kind")?;
        let status: String = row.get("status")?;
        let requested_seasons: String = row.get("requested_seasons")?;
        let seasons: String = row.get("seasons")?;

        Ok(MediaRecord {
            id: row.get("id")?,
            provider_id: row.get::<_, i64>("provider_id")? as u64,
            kind: kind.parse().map_err(|e: String| text_error("kind", e))?,
            title: row.get("title")?,
            year: row.get("year")?,
            external_ids: ExternalIds {
                imdb: row.get("imdb_id")?,
                tvdb: row.get::<_, Option<i64>>("tvdb_id")?.map(|v| v as u64),
                trakt: row.get("trakt_id")?,
            },
            upstream: UpstreamIds {
                request_id: row
                    .get::<_, Option<i64>>("upstream_request_id")?
                    .map(|v| v as u64),
                media_id: row
                    .get::<_, Option<i64>>("upstream_media_id")?
                    .map(|v| v as u64),
            },
            status: status
                .parse::<MediaStatus>()
                .map_err(|e| text_error("status", e))?,
            processing_stage: row.get("processing_stage")?,
            error_count: row.get("error_count")?,
            last_error_at: parse_opt_ts("last_error_at", row.get("last_error_at")?)?,
            error_message: row.get("error_message")?,
            retry: RetryState {
                attempt_count: row.get("attempt_count")?,
                next_eligible_at: parse_opt_ts("next_eligible_at", row.get("next_eligible_at")?)?,
            },
            request_count: row.get("request_count")?,
            first_requested_at: parse_ts("first_requested_at", row.get("first_requested_at")?)?,
            last_requested_at: parse_ts("last_requested_at", row.get("last_requested_at")?)?,
            requested_by: row.get("requested_by")?,
            subscription_active: row.get("subscription_active")?,
            subscription_last_checked: parse_opt_ts(
                "subscription_last_checked",
                row.get("subscription_last_checked")?,
            )?,
            requested_seasons: serde_json::from_str(&requested_seasons)
                .map_err(|e| text_error("requested_seasons", e.to_string()))?,
            seasons: serde_json::from_str::<ShowLedger>(&seasons)
                .map_err(|e| text_error("seasons", e.to_string()))?,
            processing_started_at: parse_opt_ts(
                "processing_started_at",
                row.get("processing_started_at")?,
            )?,
            processing_completed_at: parse_opt_ts(
                "processing_completed_at",
                row.get("processing_completed_at")?,
            )?,
            created_at: parse_ts("created_at", row.get("created_at")?)?,
            updated_at: parse_ts("updated_at", row.get("updated_at")?)?,
        })
    }
}

fn text_error(column: &str, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("{}: {}", column, msg).into(),
    )
}

fn parse_ts(column: &str, s: String) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| text_error(column, format!("{:?}: {}", s, e)))
}

fn parse_opt_ts(
    column: &str,
    s: Option<String>,
) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    s.map(|s| parse_ts(column, s)).transpose()
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn opt_ts(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(ts)
}

impl MediaStore for SqliteMediaStore {
    fn insert(&self, record: &MediaRecord) -> Result<MediaRecord, MediaError> {
        let conn = self.conn()?;
        let requested_seasons = serde_json::to_string(&record.requested_seasons)?;
        let seasons = serde_json::to_string(&record.seasons)?;

        let result = conn.execute(
            "INSERT INTO media_records (provider_id, kind, title, year, imdb_id, tvdb_id, trakt_id, \
             upstream_request_id, upstream_media_id, status, processing_stage, error_count, \
             last_error_at, error_message, attempt_count, next_eligible_at, request_count, \
             first_requested_at, last_requested_at, requested_by, subscription_active, \
             subscription_last_checked, requested_seasons, seasons, processing_started_at, \
             processing_completed_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.provider_id as i64,
                record.kind.as_str(),
                record.title,
                record.year,
                record.external_ids.imdb,
                record.external_ids.tvdb.map(|v| v as i64),
                record.external_ids.trakt,
                record.upstream.request_id.map(|v| v as i64),
                record.upstream.media_id.map(|v| v as i64),
                record.status.as_str(),
                record.processing_stage,
                record.error_count,
                opt_ts(&record.last_error_at),
                record.error_message,
                record.retry.attempt_count,
                opt_ts(&record.retry.next_eligible_at),
                record.request_count,
                ts(&record.first_requested_at),
                ts(&record.last_requested_at),
                record.requested_by,
                record.subscription_active,
                opt_ts(&record.subscription_last_checked),
                requested_seasons,
                seasons,
                opt_ts(&record.processing_started_at),
                opt_ts(&record.processing_completed_at),
                ts(&record.created_at),
                ts(&record.updated_at),
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(MediaError::Duplicate {
                    provider_id: record.provider_id,
                    kind: record.kind,
                });
            }
            Err(e) => return Err(e.into()),
        }

        let mut stored = record.clone();
        stored.id = conn.last_insert_rowid();
        Ok(stored)
    }

    fn get(&self, id: i64) -> Result<Option<MediaRecord>, MediaError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM media_records WHERE id = ?", COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_record)
            .optional()?)
    }

    fn find_by_provider(
        &self,
        provider_id: u64,
        kind: MediaKind,
    ) -> Result<Option<MediaRecord>, MediaError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM media_records WHERE provider_id = ? AND kind = ?",
            COLUMNS
        );
        Ok(conn
            .query_row(
                &sql,
                params![provider_id as i64, kind.as_str()],
                Self::row_to_record,
            )
            .optional()?)
    }

    fn list(&self, filter: &MediaFilter) -> Result<Vec<MediaRecord>, MediaError> {
        let conn = self.conn()?;
        let (where_clause, mut params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM media_records {} ORDER BY first_requested_at ASC, id ASC LIMIT ? OFFSET ?",
            COLUMNS, where_clause
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let records = stmt
            .query_map(param_refs.as_slice(), Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn count(&self, filter: &MediaFilter) -> Result<i64, MediaError> {
        let conn = self.conn()?;
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM media_records {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        Ok(conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?)
    }

    fn update(&self, record: &MediaRecord) -> Result<(), MediaError> {
        let conn = self.conn()?;
        let requested_seasons = serde_json::to_string(&record.requested_seasons)?;
        let seasons = serde_json::to_string(&record.seasons)?;

        let changed = conn.execute(
            "UPDATE media_records SET title = ?, year = ?, imdb_id = ?, tvdb_id = ?, trakt_id = ?, \
             upstream_request_id = ?, upstream_media_id = ?, status = ?, processing_stage = ?, \
             error_count = ?, last_error_at = ?, error_message = ?, attempt_count = ?, \
             next_eligible_at = ?, request_count = ?, last_requested_at = ?, requested_by = ?, \
             subscription_active = ?, subscription_last_checked = ?, requested_seasons = ?, \
             seasons = ?, processing_started_at = ?, processing_completed_at = ?, updated_at = ? \
             WHERE id = ?",
            params![
                record.title,
                record.year,
                record.external_ids.imdb,
                record.external_ids.tvdb.map(|v| v as i64),
                record.external_ids.trakt,
                record.upstream.request_id.map(|v| v as i64),
                record.upstream.media_id.map(|v| v as i64),
                record.status.as_str(),
                record.processing_stage,
                record.error_count,
                opt_ts(&record.last_error_at),
                record.error_message,
                record.retry.attempt_count,
                opt_ts(&record.retry.next_eligible_at),
                record.request_count,
                ts(&record.last_requested_at),
                record.requested_by,
                record.subscription_active,
                opt_ts(&record.subscription_last_checked),
                requested_seasons,
                seasons,
                opt_ts(&record.processing_started_at),
                opt_ts(&record.processing_completed_at),
                ts(&record.updated_at),
                record.id,
            ],
        )?;

        if changed == 0 {
            return Err(MediaError::NotFound(record.id));
        }
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<MediaRecord, MediaError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM media_records WHERE id = ?", COLUMNS);
        let record = conn
            .query_row(&sql, params![id], Self::row_to_record)
            .optional()?
            .ok_or(MediaError::NotFound(id))?;
        conn.execute("DELETE FROM media_records WHERE id = ?", params![id])?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::EpisodeOutcome;

    fn store() -> SqliteMediaStore {
        SqliteMediaStore::in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let store = store();
        let mut record = MediaRecord::new(603, MediaKind::Movie, "The Matrix");
        record.year = Some(1999);
        record.external_ids.imdb = Some("tt0133093".to_string());

        let stored = store.insert(&record).unwrap();
        assert!(stored.id > 0);

        let fetched = store.get(stored.id).unwrap().unwrap();
        assert_eq!(fetched.title, "The Matrix");
        assert_eq!(fetched.year, Some(1999));
        assert_eq!(fetched.kind, MediaKind::Movie);
        assert_eq!(fetched.status, MediaStatus::Pending);
        assert_eq!(fetched.external_ids.imdb.as_deref(), Some("tt0133093"));
        assert_eq!(fetched.request_count, 1);
    }

    #[test]
    fn test_get_missing_returns_none() {
        assert!(store().get(42).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_provider_and_kind_rejected() {
        let store = store();
        store
            .insert(&MediaRecord::new(1, MediaKind::Show, "A"))
            .unwrap();
        let err = store
            .insert(&MediaRecord::new(1, MediaKind::Show, "A again"))
            .unwrap_err();
        assert!(matches!(err, MediaError::Duplicate { provider_id: 1, .. }));

        // Same provider id, different kind is a different title.
        store
            .insert(&MediaRecord::new(1, MediaKind::Movie, "A movie"))
            .unwrap();
    }

    #[test]
    fn test_find_by_provider() {
        let store = store();
        let stored = store
            .insert(&MediaRecord::new(1399, MediaKind::Show, "Game of Thrones"))
            .unwrap();
        let found = store
            .find_by_provider(1399, MediaKind::Show)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, stored.id);
        assert!(store
            .find_by_provider(1399, MediaKind::Movie)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_update_persists_ledgers_and_retry() {
        let store = store();
        let mut record = store
            .insert(&MediaRecord::new(1, MediaKind::Show, "Show"))
            .unwrap();
        record.seasons.reconcile_with_provider(1, 10, 4);
        record
            .seasons
            .mark_episodes(1, &[1, 2], EpisodeOutcome::Confirmed)
            .unwrap();
        record.requested_seasons = vec![1];
        record.status = MediaStatus::Failed;
        record.retry.attempt_count = 2;
        record.last_error_at = Some(Utc::now());
        record.subscription_active = true;
        store.update(&record).unwrap();

        let fetched = store.get(record.id).unwrap().unwrap();
        assert_eq!(fetched.seasons, record.seasons);
        assert_eq!(fetched.requested_seasons, vec![1]);
        assert_eq!(fetched.status, MediaStatus::Failed);
        assert_eq!(fetched.retry.attempt_count, 2);
        assert!(fetched.last_error_at.is_some());
        assert!(fetched.subscription_active);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let mut record = MediaRecord::new(1, MediaKind::Movie, "Ghost");
        record.id = 999;
        assert!(matches!(
            store().update(&record),
            Err(MediaError::NotFound(999))
        ));
    }

    #[test]
    fn test_list_and_count_with_filter() {
        let store = store();
        for i in 0..5 {
            let mut record = MediaRecord::new(i, MediaKind::Movie, format!("Movie {}", i));
            if i % 2 == 0 {
                record.status = MediaStatus::Failed;
            }
            store.insert(&record).unwrap();
        }
        store
            .insert(&MediaRecord::new(100, MediaKind::Show, "Show"))
            .unwrap();

        let failed = MediaFilter::new().with_status(MediaStatus::Failed);
        assert_eq!(store.count(&failed).unwrap(), 3);
        assert_eq!(store.list(&failed).unwrap().len(), 3);

        let shows = MediaFilter::new().with_kind(MediaKind::Show);
        assert_eq!(store.count(&shows).unwrap(), 1);

        let page = store
            .list(&MediaFilter::new().with_limit(2).with_offset(1))
            .unwrap();
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn test_list_keeps_first_request_order() {
        let store = store();
        let first = store
            .insert(&MediaRecord::new(1, MediaKind::Movie, "First"))
            .unwrap();
        let second = store
            .insert(&MediaRecord::new(2, MediaKind::Movie, "Second"))
            .unwrap();

        let mut repeated = store.get(first.id).unwrap().unwrap();
        repeated.record_request(None, Utc::now() + chrono::Duration::hours(1));
        store.update(&repeated).unwrap();

        let ids: Vec<i64> = store
            .list(&MediaFilter::new())
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[test]
    fn test_corrupt_timestamp_is_an_error() {
        let store = store();
        let stored = store
            .insert(&MediaRecord::new(9, MediaKind::Movie, "Nine"))
            .unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "UPDATE media_records SET first_requested_at = 'yesterday' WHERE id = ?",
                params![stored.id],
            )
            .unwrap();

        assert!(store.get(stored.id).is_err());
    }

    #[test]
    fn test_delete() {
        let store = store();
        let stored = store
            .insert(&MediaRecord::new(7, MediaKind::Movie, "Seven"))
            .unwrap();
        let deleted = store.delete(stored.id).unwrap();
        assert_eq!(deleted.title, "Seven");
        assert!(store.get(stored.id).unwrap().is_none());
        assert!(matches!(
            store.delete(stored.id),
            Err(MediaError::NotFound(_))
        ));
    }

    #[test]
    fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media.db");
        let id = {
            let store = SqliteMediaStore::new(&path).unwrap();
            store
                .insert(&MediaRecord::new(5, MediaKind::Movie, "Persisted"))
                .unwrap()
                .id
        };
        let store = SqliteMediaStore::new(&path).unwrap();
        assert_eq!(store.get(id).unwrap().unwrap().title, "Persisted");
    }
}
