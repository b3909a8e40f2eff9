//! Path / File registry: folder and file rows, change-detection hashes and
//! per-file play statistics.

use super::models::{DateAddedPolicy, FileRecord};
use super::store::{now_timestamp, SqliteLibraryStore};
use crate::sqlite_persistence::{ScopedConnection, TransactionMode};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Appends a trailing separator unless the path already ends with one.
/// Windows-style paths keep their backslash separator.
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() || path.ends_with('/') || path.ends_with('\\') {
        return path.to_string();
    }
    let separator = if path.contains('\\') && !path.contains('/') {
        '\\'
    } else {
        '/'
    };
    format!("{}{}", path, separator)
}

/// Splits a full file path into its normalized folder and file name.
pub(super) fn split_file_path(full_path: &str) -> (String, String) {
    match full_path.rfind(['/', '\\']) {
        Some(index) => (
            full_path[..=index].to_string(),
            full_path[index + 1..].to_string(),
        ),
        None => (String::new(), full_path.to_string()),
    }
}

fn format_system_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn date_added_for(full_path: &str, policy: DateAddedPolicy) -> String {
    if policy == DateAddedPolicy::Now {
        return now_timestamp();
    }
    let metadata = match std::fs::metadata(full_path) {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("No metadata for {}, using now: {}", full_path, e);
            return now_timestamp();
        }
    };
    let modified = metadata.modified().ok();
    let chosen = match policy {
        DateAddedPolicy::Modified => modified,
        DateAddedPolicy::NewestOfModifiedAndCreated => {
            match (modified, metadata.created().ok()) {
                (Some(m), Some(c)) => Some(m.max(c)),
                (m, c) => m.or(c),
            }
        }
        DateAddedPolicy::Now => None,
    };
    chosen
        .map(format_system_time)
        .unwrap_or_else(now_timestamp)
}

impl SqliteLibraryStore {
    // =========================================================================
    // Paths
    // =========================================================================

    pub(super) fn add_path_in(&self, conn: &ScopedConnection, path: &str) -> Result<i64> {
        let normalized = normalize_path(path);
        if let Some(id) = self.lock_memo().get(&normalized) {
            return Ok(*id);
        }

        let existing: Option<i64> = conn
            .prepare_cached("SELECT path_id FROM path WHERE path = ?1")?
            .query_row(params![normalized], |r| r.get(0))
            .optional()?;
        let id = match existing {
            Some(id) => id,
            None => {
                conn.execute("INSERT INTO path (path) VALUES (?1)", params![normalized])?;
                conn.last_insert_rowid()
            }
        };
        self.lock_memo().insert(normalized, id);
        Ok(id)
    }

    /// Gets or creates the path row for `path`, normalizing the trailing separator.
    pub fn add_path(&self, path: &str) -> Option<i64> {
        self.write("add_path", path, |conn| self.add_path_in(conn, path))
    }

    pub fn get_path_id(&self, path: &str) -> Option<i64> {
        let normalized = normalize_path(path);
        self.read("get_path_id", path, |conn| {
            Ok(conn
                .query_row(
                    "SELECT path_id FROM path WHERE path = ?1",
                    params![normalized],
                    |r| r.get(0),
                )
                .optional()?)
        })
        .flatten()
    }

    /// Ends a scanning session by forgetting memoized path ids.
    pub fn clear_path_cache(&self) {
        self.lock_memo().clear();
    }

    pub fn set_path_hash(&self, path: &str, hash: &str) -> bool {
        self.write("set_path_hash", path, |conn| {
            let path_id = self.add_path_in(conn, path)?;
            conn.execute(
                "UPDATE path SET hash = ?1 WHERE path_id = ?2",
                params![hash, path_id],
            )?;
            Ok(())
        })
        .is_some()
    }

    pub fn get_path_hash(&self, path: &str) -> Option<String> {
        let normalized = normalize_path(path);
        self.read("get_path_hash", path, |conn| {
            Ok(conn
                .query_row(
                    "SELECT hash FROM path WHERE path = ?1",
                    params![normalized],
                    |r| r.get::<_, Option<String>>(0),
                )
                .optional()?
                .flatten())
        })
        .flatten()
    }

    /// Hashes the immediate entries of a folder (name, size, modification
    /// time), in a stable order, for use with [`Self::set_path_hash`].
    pub fn compute_folder_hash(&self, dir: &Path) -> Option<String> {
        let compute = || -> Result<String> {
            let entries: Vec<_> = WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .collect::<Result<_, _>>()
                .with_context(|| format!("Failed to list {:?}", dir))?;

            let mut hasher = Sha256::new();
            for entry in entries {
                let metadata = entry.metadata()?;
                let modified = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                hasher.update(entry.file_name().to_string_lossy().as_bytes());
                hasher.update(metadata.len().to_le_bytes());
                hasher.update(modified.to_le_bytes());
            }
            Ok(format!("{:x}", hasher.finalize()))
        };
        match compute() {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("compute_folder_hash failed for {:?}: {:#}", dir, e);
                None
            }
        }
    }

    // =========================================================================
    // Files
    // =========================================================================

    pub(super) fn add_file_in(
        &self,
        conn: &ScopedConnection,
        filename: &str,
        path: &str,
    ) -> Result<i64> {
        let path_id = self.add_path_in(conn, path)?;
        let existing: Option<i64> = conn
            .prepare_cached("SELECT file_id FROM file WHERE path_id = ?1 AND filename = ?2")?
            .query_row(params![path_id, filename], |r| r.get(0))
            .optional()?;
        match existing {
            Some(id) => Ok(id),
            None => {
                conn.execute(
                    "INSERT INTO file (path_id, filename) VALUES (?1, ?2)",
                    params![path_id, filename],
                )?;
                Ok(conn.last_insert_rowid())
            }
        }
    }

    /// Gets or creates the file row for (`path`, `filename`).
    pub fn add_file(&self, filename: &str, path: &str) -> Option<i64> {
        self.write("add_file", (path, filename), |conn| {
            self.add_file_in(conn, filename, path)
        })
    }

    pub fn get_file(&self, file_id: i64) -> Option<FileRecord> {
        self.read("get_file", file_id, |conn| {
            Ok(conn
                .query_row(
                    "SELECT file.file_id, file.path_id, path.path, file.filename,
                            file.play_count, file.last_played, file.date_added
                     FROM file JOIN path ON path.path_id = file.path_id
                     WHERE file.file_id = ?1",
                    params![file_id],
                    |r| {
                        Ok(FileRecord {
                            id: r.get(0)?,
                            path_id: r.get(1)?,
                            path: r.get(2)?,
                            filename: r.get(3)?,
                            play_count: r.get(4)?,
                            last_played: r.get(5)?,
                            date_added: r.get(6)?,
                        })
                    },
                )
                .optional()?)
        })
        .flatten()
    }

    /// Sets the date-added of a file from the filesystem, per the configured
    /// policy. Files that already have a date keep it.
    pub(super) fn update_file_date_added_in(
        &self,
        conn: &ScopedConnection,
        file_id: i64,
        full_path: &str,
    ) -> Result<bool> {
        let current: Option<Option<String>> = conn
            .query_row(
                "SELECT date_added FROM file WHERE file_id = ?1",
                params![file_id],
                |r| r.get(0),
            )
            .optional()?;
        match current {
            Some(None) => {
                let date_added = date_added_for(full_path, self.settings.date_added_policy);
                conn.execute(
                    "UPDATE file SET date_added = ?1 WHERE file_id = ?2",
                    params![date_added, file_id],
                )?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn update_file_date_added(&self, file_id: i64, full_path: &str) -> bool {
        self.write("update_file_date_added", file_id, |conn| {
            self.update_file_date_added_in(conn, file_id, full_path)
        })
        .unwrap_or(false)
    }

    /// Bumps the play count and last-played time of a song's file.
    pub fn increment_play_count(&self, song_id: i64) -> bool {
        let album_id = self.write("increment_play_count", song_id, |conn| {
            let album_id: Option<i64> = conn
                .query_row(
                    "SELECT album_id FROM song WHERE song_id = ?1",
                    params![song_id],
                    |r| r.get(0),
                )
                .optional()?;
            if album_id.is_some() {
                conn.execute(
                    "UPDATE file SET play_count = play_count + 1, last_played = ?1
                     WHERE file_id = (SELECT file_id FROM song WHERE song_id = ?2)",
                    params![now_timestamp(), song_id],
                )?;
            }
            Ok(album_id)
        });
        match album_id.flatten() {
            Some(album_id) => {
                self.cache.remove_song_and_album(song_id, album_id);
                true
            }
            None => false,
        }
    }

    /// Deletes every song whose file lives in `path` (and below it when
    /// `recursive`). Returns the number of songs removed.
    pub fn remove_songs_from_path(&self, path: &str, recursive: bool) -> Option<usize> {
        let normalized = normalize_path(path);
        let removed = self.write("remove_songs_from_path", path, |conn| {
            let scope = conn.scope(TransactionMode::Immediate)?;
            let song_filter = if recursive {
                "SELECT song.song_id FROM song
                 JOIN file ON file.file_id = song.file_id
                 JOIN path ON path.path_id = file.path_id
                 WHERE substr(path.path, 1, length(?1)) = ?1"
            } else {
                "SELECT song.song_id FROM song
                 JOIN file ON file.file_id = song.file_id
                 JOIN path ON path.path_id = file.path_id
                 WHERE path.path = ?1"
            };
            let removed = conn.execute(
                &format!("DELETE FROM song WHERE song_id IN ({})", song_filter),
                params![normalized],
            )?;
            scope.commit()?;
            Ok(removed)
        });
        if removed.is_some() {
            self.cache.clear_songs();
            self.cache.clear_albums();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibrarySettings;
    use std::io::Write;
    use tempfile::TempDir;

    fn store() -> SqliteLibraryStore {
        SqliteLibraryStore::open_in_memory(LibrarySettings::default()).unwrap()
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/music/rock"), "/music/rock/");
        assert_eq!(normalize_path("/music/rock/"), "/music/rock/");
        assert_eq!(normalize_path("C:\\Music"), "C:\\Music\\");
        assert_eq!(normalize_path("smb://host/share"), "smb://host/share/");
    }

    #[test]
    fn test_split_file_path() {
        assert_eq!(
            split_file_path("/music/rock/a.flac"),
            ("/music/rock/".to_string(), "a.flac".to_string())
        );
        assert_eq!(
            split_file_path("a.flac"),
            (String::new(), "a.flac".to_string())
        );
    }

    #[test]
    fn test_add_path_normalizes() {
        let store = store();
        let first = store.add_path("/music/rock").unwrap();
        let second = store.add_path("/music/rock/").unwrap();
        assert_eq!(first, second);

        // Also without the session memo
        store.clear_path_cache();
        assert_eq!(store.add_path("/music/rock").unwrap(), first);
        assert_eq!(store.get_path_id("/music/rock/"), Some(first));
    }

    #[test]
    fn test_add_file_is_unique_per_path() {
        let store = store();
        let a = store.add_file("a.flac", "/music/").unwrap();
        assert_eq!(store.add_file("a.flac", "/music").unwrap(), a);
        assert_ne!(store.add_file("a.flac", "/other/").unwrap(), a);

        let file = store.get_file(a).unwrap();
        assert_eq!(file.path, "/music/");
        assert_eq!(file.filename, "a.flac");
        assert_eq!(file.play_count, 0);
    }

    #[test]
    fn test_path_hash_round_trip() {
        let store = store();
        assert_eq!(store.get_path_hash("/music/"), None);
        assert!(store.set_path_hash("/music", "abc"));
        assert_eq!(store.get_path_hash("/music/").as_deref(), Some("abc"));
    }

    #[test]
    fn test_date_added_applied_once() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("a.flac");
        std::fs::File::create(&file_path)
            .unwrap()
            .write_all(b"x")
            .unwrap();
        let full_path = file_path.to_string_lossy().to_string();
        let (folder, filename) = split_file_path(&full_path);

        let store = store();
        let file_id = store.add_file(&filename, &folder).unwrap();
        assert!(store.update_file_date_added(file_id, &full_path));
        let first = store.get_file(file_id).unwrap().date_added;
        assert!(first.is_some());
        assert!(!store.update_file_date_added(file_id, &full_path));
        assert_eq!(store.get_file(file_id).unwrap().date_added, first);
    }

    #[test]
    fn test_folder_hash_changes_with_contents() {
        let temp_dir = TempDir::new().unwrap();
        let store = store();
        std::fs::write(temp_dir.path().join("a.flac"), b"one").unwrap();
        let first = store.compute_folder_hash(temp_dir.path()).unwrap();
        assert_eq!(store.compute_folder_hash(temp_dir.path()).unwrap(), first);

        std::fs::write(temp_dir.path().join("b.flac"), b"two").unwrap();
        assert_ne!(store.compute_folder_hash(temp_dir.path()).unwrap(), first);
        assert!(store
            .compute_folder_hash(&temp_dir.path().join("missing"))
            .is_none());
    }
}
