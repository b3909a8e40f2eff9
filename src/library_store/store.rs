//! SQLite-backed music library store.
//!
//! One connection is shared behind a coarse mutex. Public operations take
//! the lock, open a transaction scope and call the `*_in` helpers of the
//! repository modules, which accept the locked connection and compose
//! freely inside the same transaction. Failures stop at the public
//! boundary: they are logged with the operation name and key and turned
//! into `None`, `false` or an empty result.

use super::migration::{prepare_database, MigrationError, OpenOutcome};
use super::models::TagScanState;
use crate::cache::{ResultCache, StringSource};
use crate::config::LibrarySettings;
use crate::sqlite_persistence::{read_schema_version, ScopedConnection, TransactionMode};
use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info};

#[derive(Clone)]
pub struct SqliteLibraryStore {
    db: Arc<Mutex<ScopedConnection>>,
    pub(super) cache: Arc<ResultCache>,
    /// Normalized path string to path id, kept for one scanning session.
    pub(super) path_memo: Arc<Mutex<HashMap<String, i64>>>,
    pub(super) settings: LibrarySettings,
    pub(super) strings: Option<Arc<dyn StringSource>>,
    open_outcome: OpenOutcome,
}

pub(super) fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl SqliteLibraryStore {
    pub fn open<P: AsRef<Path>>(
        db_path: P,
        settings: LibrarySettings,
    ) -> Result<Self, MigrationError> {
        let path = db_path.as_ref();
        info!("Opening music library at {:?}", path);
        let conn = Connection::open(path)?;
        Self::from_connection(conn, settings)
    }

    pub fn open_in_memory(settings: LibrarySettings) -> Result<Self, MigrationError> {
        Self::from_connection(Connection::open_in_memory()?, settings)
    }

    fn from_connection(conn: Connection, settings: LibrarySettings) -> Result<Self, MigrationError> {
        let conn = ScopedConnection::new(conn);
        let open_outcome = prepare_database(&conn)?;
        match open_outcome {
            OpenOutcome::Created => info!("Created new music library database"),
            OpenOutcome::Migrated { from } => {
                info!("Migrated music library database from version {}", from)
            }
            OpenOutcome::UpToDate => {}
        }

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            cache: Arc::new(ResultCache::new(settings.cache_enabled)),
            path_memo: Arc::new(Mutex::new(HashMap::new())),
            settings,
            strings: None,
            open_outcome,
        })
    }

    /// Attaches the source used to translate placeholder labels.
    pub fn with_string_source(mut self, source: Arc<dyn StringSource>) -> Self {
        self.strings = Some(source);
        self
    }

    pub fn open_outcome(&self) -> OpenOutcome {
        self.open_outcome
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn settings(&self) -> &LibrarySettings {
        &self.settings
    }

    pub(super) fn lock_db(&self) -> MutexGuard<'_, ScopedConnection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn lock_memo(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        self.path_memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` inside a write transaction. Errors are logged and become `None`.
    pub(super) fn write<T>(
        &self,
        op: &str,
        key: impl Debug,
        f: impl FnOnce(&ScopedConnection) -> Result<T>,
    ) -> Option<T> {
        let db = self.lock_db();
        match db.transaction(TransactionMode::Immediate, f) {
            Ok(value) => Some(value),
            Err(e) => {
                error!("{} failed for {:?}: {:#}", op, key, e);
                // Ids memoized during the rolled back transaction are gone
                self.lock_memo().clear();
                None
            }
        }
    }

    /// Runs `f` inside a read transaction. Errors are logged and become `None`.
    pub(super) fn read<T>(
        &self,
        op: &str,
        key: impl Debug,
        f: impl FnOnce(&ScopedConnection) -> Result<T>,
    ) -> Option<T> {
        let db = self.lock_db();
        match db.transaction(TransactionMode::Deferred, f) {
            Ok(value) => Some(value),
            Err(e) => {
                error!("{} failed for {:?}: {:#}", op, key, e);
                None
            }
        }
    }

    /// Runs `f` with the locked connection and no boundary conversion, for
    /// pipelines that report their own errors.
    pub(super) fn with_connection<T>(&self, f: impl FnOnce(&ScopedConnection) -> T) -> T {
        let db = self.lock_db();
        f(&db)
    }

    // =========================================================================
    // Versioning signals
    // =========================================================================

    pub fn schema_version(&self) -> Option<usize> {
        self.read("schema_version", (), |conn| read_schema_version(conn))
            .flatten()
    }

    pub fn get_tag_scan_state(&self) -> Option<TagScanState> {
        self.read("get_tag_scan_state", (), |conn| {
            let state = conn.query_row(
                "SELECT needs_scan, last_scan, artist_links_updated, genres_updated
                 FROM version_tag_scan WHERE id = 1",
                [],
                |r| {
                    let needs_scan: i64 = r.get(0)?;
                    Ok(TagScanState {
                        needs_scan: (needs_scan > 0).then_some(needs_scan as usize),
                        last_scan: r.get(1)?,
                        artist_links_updated: r.get(2)?,
                        genres_updated: r.get(3)?,
                    })
                },
            )?;
            Ok(state)
        })
    }

    /// Schema version that requested a full tag rescan, if still pending.
    pub fn needs_tag_scan(&self) -> Option<usize> {
        self.get_tag_scan_state().and_then(|s| s.needs_scan)
    }

    pub fn set_tag_scan_done(&self) -> bool {
        self.write("set_tag_scan_done", (), |conn| {
            conn.execute(
                "UPDATE version_tag_scan SET needs_scan = 0, last_scan = ?1 WHERE id = 1",
                params![now_timestamp()],
            )?;
            Ok(())
        })
        .is_some()
    }

    /// Records that artist links were rebuilt by an external pass.
    pub fn set_artist_links_updated(&self) -> bool {
        self.write("set_artist_links_updated", (), |conn| {
            conn.execute(
                "UPDATE version_tag_scan SET artist_links_updated = ?1 WHERE id = 1",
                params![now_timestamp()],
            )?;
            Ok(())
        })
        .is_some()
    }

    /// Records that genre links were rebuilt by an external pass.
    pub fn set_genres_updated(&self) -> bool {
        self.write("set_genres_updated", (), |conn| {
            conn.execute(
                "UPDATE version_tag_scan SET genres_updated = ?1 WHERE id = 1",
                params![now_timestamp()],
            )?;
            Ok(())
        })
        .is_some()
    }

    /// Row counts of the main entity tables, for status output.
    pub fn counts(&self) -> Option<HashMap<&'static str, i64>> {
        self.read("counts", (), |conn| {
            let mut counts = HashMap::new();
            for table in ["artist", "album", "song", "genre", "source", "playlist"] {
                let count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {}", table),
                    [],
                    |r| r.get(0),
                )?;
                counts.insert(table, count);
            }
            Ok(counts)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_store::{LIBRARY_SCHEMA_VERSION, SENTINEL_ARTIST_ID};
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_and_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("library.db");

        let store = SqliteLibraryStore::open(&db_path, LibrarySettings::default()).unwrap();
        assert_eq!(store.open_outcome(), OpenOutcome::Created);
        assert_eq!(store.schema_version(), Some(LIBRARY_SCHEMA_VERSION));
        assert_eq!(store.needs_tag_scan(), None);
        drop(store);

        let store = SqliteLibraryStore::open(&db_path, LibrarySettings::default()).unwrap();
        assert_eq!(store.open_outcome(), OpenOutcome::UpToDate);
        assert!(store.get_artist(SENTINEL_ARTIST_ID, crate::library_store::DetailLevel::Basic)
            .is_some());
    }

    #[test]
    fn test_tag_scan_done_clears_flag() {
        let store = SqliteLibraryStore::open_in_memory(LibrarySettings::default()).unwrap();
        store.with_connection(|conn| {
            conn.execute("UPDATE version_tag_scan SET needs_scan = 7 WHERE id = 1", [])
                .unwrap();
        });
        assert_eq!(store.needs_tag_scan(), Some(7));
        assert!(store.set_tag_scan_done());
        let state = store.get_tag_scan_state().unwrap();
        assert_eq!(state.needs_scan, None);
        assert!(state.last_scan.is_some());
    }

    #[test]
    fn test_counts_start_with_sentinel_only() {
        let store = SqliteLibraryStore::open_in_memory(LibrarySettings::default()).unwrap();
        let counts = store.counts().unwrap();
        assert_eq!(counts["artist"], 1);
        assert_eq!(counts["song"], 0);
    }
}
