//! Ledger trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::error::StateError;
use super::schema;
use super::types::{LedgerSummary, PendingRegistration, SyncRunStats};

/// Ledger operations.
///
/// Object-safe so the pipeline can hold an `Arc<dyn Ledger>` across tasks.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Start a new sync run and return its ID.
    async fn start_sync_run(&self) -> Result<i64, StateError>;

    /// Complete a sync run with statistics.
    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats)
        -> Result<(), StateError>;

    /// Remember an upload token whose registration failed.
    ///
    /// Recording the same token again only refreshes its error text.
    async fn record_orphan(&self, orphan: &PendingRegistration) -> Result<(), StateError>;

    /// All unresolved orphans, oldest first.
    async fn pending_registrations(&self) -> Result<Vec<PendingRegistration>, StateError>;

    /// Drop an orphan once it is registered or known to be unrecoverable.
    ///
    /// Returns whether a row was removed.
    async fn resolve_orphan(&self, upload_token: &str) -> Result<bool, StateError>;

    async fn summary(&self) -> Result<LedgerSummary, StateError>;
}

/// SQLite implementation of the ledger.
pub struct SqliteLedger {
    /// rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLedger")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteLedger {
    /// Open or create a ledger at the given path.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StateError::Schema)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StateError::Schema)?;

            schema::migrate(&mut conn)?;

            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory ledger (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let mut conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StateError> {
        self.conn
            .lock()
            .map_err(|_| StateError::Poisoned)
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn start_sync_run(&self) -> Result<i64, StateError> {
        let started_at = Utc::now().timestamp();
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO sync_runs (started_at) VALUES (?1)",
            [started_at],
        )
        .map_err(StateError::query("start run"))?;

        Ok(conn.last_insert_rowid())
    }

    async fn complete_sync_run(
        &self,
        run_id: i64,
        stats: &SyncRunStats,
    ) -> Result<(), StateError> {
        let completed_at = Utc::now().timestamp();
        let interrupted = if stats.interrupted { 1 } else { 0 };
        let conn = self.lock()?;

        conn.execute(
            "UPDATE sync_runs SET completed_at = ?1, remote_items = ?2, uploaded = ?3, failed = ?4, orphaned = ?5, interrupted = ?6 WHERE id = ?7",
            rusqlite::params![
                completed_at,
                stats.remote_items as i64,
                stats.uploaded as i64,
                stats.failed as i64,
                stats.orphaned as i64,
                interrupted,
                run_id
            ],
        )
        .map_err(StateError::query("complete run"))?;

        Ok(())
    }

    async fn record_orphan(&self, orphan: &PendingRegistration) -> Result<(), StateError> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO pending_registrations (upload_token, local_path, filename, uploaded_at, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(upload_token) DO UPDATE SET last_error = excluded.last_error",
            rusqlite::params![
                orphan.upload_token,
                orphan.local_path.to_string_lossy(),
                orphan.filename,
                orphan.uploaded_at.timestamp(),
                orphan.last_error,
            ],
        )
        .map_err(StateError::query("record orphan"))?;

        Ok(())
    }

    async fn pending_registrations(&self) -> Result<Vec<PendingRegistration>, StateError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                "SELECT upload_token, local_path, filename, uploaded_at, last_error FROM pending_registrations ORDER BY uploaded_at, rowid",
            )
            .map_err(StateError::query("list pending registrations"))?;

        let records = stmt
            .query_map([], |row| Ok(row_to_pending(row)))
            .map_err(StateError::query("list pending registrations"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query("list pending registrations"))?;

        Ok(records)
    }

    async fn resolve_orphan(&self, upload_token: &str) -> Result<bool, StateError> {
        let conn = self.lock()?;

        let rows = conn
            .execute(
                "DELETE FROM pending_registrations WHERE upload_token = ?1",
                [upload_token],
            )
            .map_err(StateError::query("resolve orphan"))?;

        Ok(rows > 0)
    }

    async fn summary(&self) -> Result<LedgerSummary, StateError> {
        let conn = self.lock()?;

        let total_runs = conn
            .query_row("SELECT COUNT(*) FROM sync_runs", [], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(StateError::query("summary"))? as u64;

        let pending_registrations = conn
            .query_row("SELECT COUNT(*) FROM pending_registrations", [], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(StateError::query("summary"))? as u64;

        let last_sync: Option<(i64, Option<i64>)> = conn
            .query_row(
                "SELECT started_at, completed_at FROM sync_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StateError::query("summary"))?;

        let last_run = conn
            .query_row(
                "SELECT remote_items, uploaded, failed, orphaned, interrupted FROM sync_runs
                 WHERE completed_at IS NOT NULL ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(SyncRunStats {
                        remote_items: row.get::<_, i64>(0)? as u64,
                        uploaded: row.get::<_, i64>(1)? as u64,
                        failed: row.get::<_, i64>(2)? as u64,
                        orphaned: row.get::<_, i64>(3)? as u64,
                        interrupted: row.get::<_, i64>(4)? != 0,
                    })
                },
            )
            .optional()
            .map_err(StateError::query("summary"))?;

        let (last_sync_started, last_sync_completed) = match last_sync {
            Some((started, completed)) => (
                timestamp_to_datetime(started),
                completed.and_then(timestamp_to_datetime),
            ),
            None => (None, None),
        };

        Ok(LedgerSummary {
            total_runs,
            pending_registrations,
            last_sync_started,
            last_sync_completed,
            last_run,
        })
    }
}

fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

fn row_to_pending(row: &rusqlite::Row<'_>) -> PendingRegistration {
    let local_path: String = row.get(1).unwrap_or_default();
    let uploaded_at: i64 = row.get(3).unwrap_or(0);
    PendingRegistration {
        upload_token: row.get(0).unwrap_or_default(),
        local_path: PathBuf::from(local_path),
        filename: row.get(2).unwrap_or_default(),
        uploaded_at: timestamp_to_datetime(uploaded_at).unwrap_or_default(),
        last_error: row.get(4).unwrap_or(None),
    }
}
