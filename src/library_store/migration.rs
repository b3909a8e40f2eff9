//! Open-time schema management: create, validate, migrate.

use super::schema::{
    create_triggers, create_views, drop_triggers_and_views, seed_rows, LIBRARY_SCHEMA_VERSION,
    LIBRARY_VERSIONED_SCHEMAS, TAG_RESCAN_THRESHOLD,
};
use crate::sqlite_persistence::{
    read_schema_version, write_schema_version, ScopedConnection, TransactionMode,
};
use anyhow::Context;
use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("database schema version {found} is newer than the supported version {supported}")]
    NewerThanSupported { found: usize, supported: usize },

    #[error("database schema version {0} is unknown")]
    UnknownVersion(usize),

    #[error("database has tables but no library schema version")]
    Unversioned,

    #[error("schema validation failed for version {version}: {message}")]
    Validation { version: usize, message: String },

    #[error("migration to version {version} failed: {message}")]
    Step { version: usize, message: String },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What [`prepare_database`] did to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Created,
    UpToDate,
    Migrated { from: usize },
}

fn has_user_tables(conn: &Connection) -> Result<bool, MigrationError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Brings the database to the current schema version. Must run before any
/// repository operation; every failure is fatal for the open sequence.
pub fn prepare_database(conn: &ScopedConnection) -> Result<OpenOutcome, MigrationError> {
    conn.execute("PRAGMA foreign_keys = ON;", [])?;

    let outcome = match read_schema_version(conn)? {
        None => {
            if has_user_tables(conn)? {
                return Err(MigrationError::Unversioned);
            }
            create_schema(conn)?;
            OpenOutcome::Created
        }
        Some(version) if version > LIBRARY_SCHEMA_VERSION => {
            return Err(MigrationError::NewerThanSupported {
                found: version,
                supported: LIBRARY_SCHEMA_VERSION,
            });
        }
        Some(version) => {
            let schema = LIBRARY_VERSIONED_SCHEMAS
                .iter()
                .find(|s| s.version == version)
                .ok_or(MigrationError::UnknownVersion(version))?;
            validate(conn, schema.version)?;
            if version < LIBRARY_SCHEMA_VERSION {
                migrate(conn, version)?;
                OpenOutcome::Migrated { from: version }
            } else {
                // Views or triggers may be missing if a previous run was interrupted
                conn.transaction(TransactionMode::Immediate, |conn| {
                    create_triggers(conn)?;
                    create_views(conn)?;
                    seed_rows(conn)
                })?;
                OpenOutcome::UpToDate
            }
        }
    };
    Ok(outcome)
}

#[cfg(not(feature = "no_checks"))]
fn validate(conn: &Connection, version: usize) -> Result<(), MigrationError> {
    let schema = LIBRARY_VERSIONED_SCHEMAS
        .iter()
        .find(|s| s.version == version)
        .ok_or(MigrationError::UnknownVersion(version))?;
    schema
        .validate(conn)
        .map_err(|e| MigrationError::Validation {
            version,
            message: format!("{:#}", e),
        })
}

#[cfg(feature = "no_checks")]
fn validate(_conn: &Connection, version: usize) -> Result<(), MigrationError> {
    debug!("Skipping schema validation for version {}", version);
    Ok(())
}

/// Creates the current schema, triggers, views and seed rows on an empty database.
pub fn create_schema(conn: &ScopedConnection) -> Result<(), MigrationError> {
    let Some(latest) = LIBRARY_VERSIONED_SCHEMAS.last() else {
        return Err(MigrationError::UnknownVersion(0));
    };
    info!("Creating library schema version {}", latest.version);
    conn.transaction(TransactionMode::Immediate, |conn| {
        latest.create(conn)?;
        create_triggers(conn)?;
        create_views(conn)?;
        seed_rows(conn)
    })?;
    Ok(())
}

/// Applies every migration step above `from_version` in a single transaction.
/// On failure nothing is changed and the failing version is reported.
pub fn migrate(conn: &ScopedConnection, from_version: usize) -> Result<usize, MigrationError> {
    let scope = conn.scope(TransactionMode::Immediate)?;

    drop_triggers_and_views(conn)?;
    let mut reached = from_version;
    for schema in LIBRARY_VERSIONED_SCHEMAS
        .iter()
        .filter(|s| s.version > from_version)
    {
        info!(
            "Running library migration from version {} to {}",
            reached, schema.version
        );
        if let Some(migration_fn) = schema.migration {
            migration_fn(conn).map_err(|e| MigrationError::Step {
                version: schema.version,
                message: format!("{:#}", e),
            })?;
        }
        reached = schema.version;
    }

    write_schema_version(conn, reached)?;
    create_triggers(conn).context("Failed to rebuild triggers")?;
    create_views(conn).context("Failed to rebuild views")?;
    seed_rows(conn)?;

    if from_version < TAG_RESCAN_THRESHOLD {
        debug!(
            "Version {} is below tag rescan threshold {}, flagging rescan",
            from_version, TAG_RESCAN_THRESHOLD
        );
        conn.execute(
            "UPDATE version_tag_scan SET needs_scan = ?1 WHERE id = 1",
            params![reached as i64],
        )?;
    }

    scope.commit()?;
    Ok(reached)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scoped() -> ScopedConnection {
        ScopedConnection::new(Connection::open_in_memory().unwrap())
    }

    #[test]
    fn test_fresh_database_is_created_at_latest_version() {
        let conn = scoped();
        assert_eq!(prepare_database(&conn).unwrap(), OpenOutcome::Created);
        assert_eq!(
            read_schema_version(&conn).unwrap(),
            Some(LIBRARY_SCHEMA_VERSION)
        );
        assert_eq!(prepare_database(&conn).unwrap(), OpenOutcome::UpToDate);
    }

    #[test]
    fn test_newer_database_is_rejected() {
        let conn = scoped();
        prepare_database(&conn).unwrap();
        write_schema_version(&conn, LIBRARY_SCHEMA_VERSION + 1).unwrap();
        assert!(matches!(
            prepare_database(&conn),
            Err(MigrationError::NewerThanSupported { .. })
        ));
    }

    #[test]
    fn test_foreign_database_is_rejected() {
        let conn = scoped();
        conn.execute("CREATE TABLE something (id INTEGER)", [])
            .unwrap();
        assert!(matches!(
            prepare_database(&conn),
            Err(MigrationError::Unversioned)
        ));
    }

    #[test]
    fn test_failed_step_leaves_database_untouched() {
        let conn = scoped();
        LIBRARY_VERSIONED_SCHEMAS[3].create(&conn).unwrap();
        // An index on the column makes DROP COLUMN fail
        conn.execute("CREATE INDEX idx_song_play_count ON song(play_count)", [])
            .unwrap();

        let result = migrate(&conn, 4);
        assert!(matches!(
            result,
            Err(MigrationError::Step { version: 5, .. })
        ));
        assert_eq!(read_schema_version(&conn).unwrap(), Some(4));
        assert_eq!(conn.depth(), 0);
        assert!(conn.is_autocommit());
        LIBRARY_VERSIONED_SCHEMAS[3].validate(&conn).unwrap();
        assert!(!crate::sqlite_persistence::column_exists(&conn, "file", "play_count").unwrap());
    }
}
