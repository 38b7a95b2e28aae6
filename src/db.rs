//! Database module
//!
//! Provides persistence for session documents and household data.

mod household;
mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Household not found: {0}")]
    HouseholdNotFound(String),
    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // ==================== Session Documents ====================

    pub fn get_session(&self, session_id: &str) -> DbResult<Option<SessionRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT version, document, updated_at FROM sessions WHERE id = ?1",
            params![session_id],
            |row| {
                Ok(SessionRow {
                    version: row.get(0)?,
                    document: row.get(1)?,
                    updated_at: parse_datetime(&row.get::<_, String>(2)?),
                })
            },
        )
        .optional()
        .map_err(DbError::from)
    }

    /// Write a session document if the stored version still matches.
    ///
    /// Rewriting a byte-identical document is a no-op regardless of version.
    /// The read and the write happen in one transaction, so a reader sees
    /// either the old or the new document.
    pub fn put_session(
        &self,
        session_id: &str,
        household_id: Option<&str>,
        user_id: Option<&str>,
        expected_version: u64,
        document: &str,
    ) -> DbResult<DocumentWrite> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current: Option<(u64, String)> = tx
            .query_row(
                "SELECT version, document FROM sessions WHERE id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let outcome = match current {
            Some((version, stored)) if stored == document => DocumentWrite::Unchanged { version },
            Some((version, _)) if version != expected_version => {
                DocumentWrite::Conflict { found: version }
            }
            None if expected_version != 0 => DocumentWrite::Conflict { found: 0 },
            Some(_) | None => {
                let next = expected_version + 1;
                tx.execute(
                    "INSERT INTO sessions (id, household_id, user_id, version, document, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                        household_id = excluded.household_id,
                        user_id = excluded.user_id,
                        version = excluded.version,
                        document = excluded.document,
                        updated_at = excluded.updated_at",
                    params![
                        session_id,
                        household_id,
                        user_id,
                        next,
                        document,
                        Utc::now().to_rfc3339()
                    ],
                )?;
                DocumentWrite::Written { version: next }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
