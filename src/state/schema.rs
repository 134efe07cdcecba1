//! Ledger schema and migrations.

use rusqlite::Connection;

use super::error::StateError;

/// Current schema version. Increment when making schema changes.
pub const SCHEMA_VERSION: i32 = 2;

/// Base schema: sync run history.
const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at INTEGER NOT NULL,
    completed_at INTEGER,
    remote_items INTEGER DEFAULT 0,
    uploaded INTEGER DEFAULT 0,
    failed INTEGER DEFAULT 0,
    interrupted INTEGER DEFAULT 0
);
"#;

/// Version 2: orphaned upload tokens and the per-run orphan count.
const SCHEMA_V2: &str = r#"
CREATE TABLE IF NOT EXISTS pending_registrations (
    upload_token TEXT PRIMARY KEY NOT NULL,
    local_path TEXT NOT NULL,
    filename TEXT NOT NULL,
    uploaded_at INTEGER NOT NULL,
    last_error TEXT
);

CREATE INDEX IF NOT EXISTS idx_pending_filename ON pending_registrations(filename);

ALTER TABLE sync_runs ADD COLUMN orphaned INTEGER DEFAULT 0;
"#;

pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, StateError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StateError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Initialize or migrate the ledger schema.
///
/// Idempotent; each step runs inside its own transaction.
pub(crate) fn migrate(conn: &mut Connection) -> Result<(), StateError> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(StateError::TooNew {
            found: current_version,
            supported: SCHEMA_VERSION,
        });
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        let tx = conn.transaction()?;
        migrate_to_version(&tx, version)?;
        set_schema_version(&tx, version)?;
        tx.commit()?;
        if current_version == 0 {
            tracing::debug!("Applied ledger schema version {}", version);
        } else {
            tracing::info!("Migrated ledger to schema version {}", version);
        }
    }

    Ok(())
}

fn migrate_to_version(conn: &Connection, version: i32) -> Result<(), StateError> {
    match version {
        1 => conn.execute_batch(SCHEMA_V1)?,
        2 => conn.execute_batch(SCHEMA_V2)?,
        other => tracing::warn!("No migration defined for ledger version {}", other),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_db_migration() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_idempotent_migration() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_unsupported_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        let result = migrate(&mut conn);
        assert!(matches!(
            result,
            Err(StateError::TooNew { .. })
        ));
    }

    #[test]
    fn test_v1_database_upgrades_and_keeps_runs() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_V1).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();
        conn.execute(
            "INSERT INTO sync_runs (started_at, uploaded) VALUES (100, 7)",
            [],
        )
        .unwrap();

        migrate(&mut conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), 2);
        let (uploaded, orphaned): (i64, i64) = conn
            .query_row("SELECT uploaded, orphaned FROM sync_runs", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(uploaded, 7);
        assert_eq!(orphaned, 0);
    }

    #[test]
    fn test_tables_created() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        for table in ["sync_runs", "pending_registrations"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(count, 0, "{table}");
        }
    }
}
