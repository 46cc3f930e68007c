// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Durable schedule store backed by SQLite.
//
// Jobs flagged `persistent` are written here when they are scheduled so they
// survive process restarts.  Each row holds the job's flat record (JSON), the
// wall-clock time it is due, and the run attempt it is on.  Rows are removed
// when the backend finishes the job.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use jobwerk_core::JobInfo;
use jobwerk_core::error::{JobwerkError, Result};

use crate::traits::TicketId;

/// SQLite schema for the scheduled jobs table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS scheduled_jobs (
        ticket TEXT PRIMARY KEY,
        dedup_key TEXT NOT NULL,
        record TEXT NOT NULL,
        due_at_ms INTEGER NOT NULL,
        run_attempt INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

/// A job as persisted in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredJob {
    pub ticket: TicketId,
    pub job: JobInfo,
    /// Wall-clock due time in milliseconds since the epoch.
    pub due_at_ms: i64,
    pub run_attempt: u32,
    pub created_at: DateTime<Utc>,
}

impl StoredJob {
    pub fn new(ticket: TicketId, job: JobInfo, due_at_ms: i64) -> Self {
        Self {
            ticket,
            job,
            due_at_ms,
            run_attempt: 0,
            created_at: Utc::now(),
        }
    }
}

/// Persistent schedule backed by a SQLite database.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively.  Every call is a single short statement.
pub struct ScheduleStore {
    conn: Connection,
}

impl ScheduleStore {
    /// Open (or create) the store at the given path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| JobwerkError::Database(format!("open: {e}")))?;

        // WAL survives unclean shutdowns more gracefully.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| JobwerkError::Database(format!("WAL pragma: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| JobwerkError::Database(format!("create table: {e}")))?;

        let store = Self { conn };
        info!(stored_jobs = store.count()?, "schedule store opened");
        Ok(store)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| JobwerkError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| JobwerkError::Database(format!("create table: {e}")))?;

        debug!("in-memory schedule store opened");
        Ok(Self { conn })
    }

    /// Insert or overwrite a stored job.
    #[instrument(skip(self, stored), fields(ticket = %stored.ticket, job = %stored.job))]
    pub fn save(&self, stored: &StoredJob) -> Result<()> {
        let record = serde_json::to_string(&stored.job.to_record())?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT OR REPLACE INTO scheduled_jobs
                 (ticket, dedup_key, record, due_at_ms, run_attempt, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    stored.ticket.to_string(),
                    stored.job.dedup_key(),
                    record,
                    stored.due_at_ms,
                    stored.run_attempt,
                    stored.created_at.to_rfc3339(),
                    now,
                ],
            )
            .map_err(|e| JobwerkError::Database(format!("save job: {e}")))?;

        debug!("job persisted");
        Ok(())
    }

    /// Move a stored job to a new due time and run attempt.
    #[instrument(skip(self), fields(ticket = %ticket))]
    pub fn reschedule(&self, ticket: &TicketId, due_at_ms: i64, run_attempt: u32) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE scheduled_jobs SET due_at_ms = ?1, run_attempt = ?2, updated_at = ?3
                 WHERE ticket = ?4",
                params![
                    due_at_ms,
                    run_attempt,
                    Utc::now().to_rfc3339(),
                    ticket.to_string()
                ],
            )
            .map_err(|e| JobwerkError::Database(format!("reschedule: {e}")))?;

        if rows == 0 {
            return Err(JobwerkError::Database(format!("ticket {ticket} not found")));
        }
        Ok(())
    }

    /// Remove a stored job. Idempotent.
    #[instrument(skip(self), fields(ticket = %ticket))]
    pub fn delete(&self, ticket: &TicketId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM scheduled_jobs WHERE ticket = ?1",
                params![ticket.to_string()],
            )
            .map_err(|e| JobwerkError::Database(format!("delete job: {e}")))?;
        Ok(())
    }

    /// All stored jobs, earliest due first.
    #[instrument(skip(self))]
    pub fn load_all(&self) -> Result<Vec<StoredJob>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT ticket, record, due_at_ms, run_attempt, created_at
                 FROM scheduled_jobs ORDER BY due_at_ms ASC",
            )
            .map_err(|e| JobwerkError::Database(format!("prepare load_all: {e}")))?;

        let jobs = stmt
            .query_map([], row_to_stored_job)
            .map_err(|e| JobwerkError::Database(format!("query load_all: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| JobwerkError::Database(format!("collect rows: {e}")))?;

        debug!(count = jobs.len(), "loaded stored jobs");
        Ok(jobs)
    }

    /// Number of stored jobs.
    pub fn count(&self) -> Result<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM scheduled_jobs", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(|e| JobwerkError::Database(format!("count: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Column indices must match the SELECT order in `load_all`.
fn row_to_stored_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredJob> {
    let ticket_str: String = row.get(0)?;
    let record_json: String = row.get(1)?;
    let due_at_ms: i64 = row.get(2)?;
    let run_attempt: u32 = row.get::<_, i64>(3).unwrap_or(0).max(0) as u32;
    let created_at_str: String = row.get(4)?;

    let uuid = Uuid::parse_str(&ticket_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let record = serde_json::from_str(&record_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let job = JobInfo::from_record(&record).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(StoredJob {
        ticket: TicketId(uuid),
        job,
        due_at_ms,
        run_attempt,
        created_at,
    })
}
