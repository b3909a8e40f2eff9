//! Orphan cleanup: removes songs whose files are gone and every row left
//! unreferenced by that, in one transaction.
//!
//! Stages run in order (songs, albums, paths, artists, other). A failing
//! stage aborts the pass, rolls back everything done so far and reports
//! which stage failed.

use super::models::{MediaType, PRIMARY_ROLE_ID, SENTINEL_ARTIST_ID};
use super::progress::ProgressMonitor;
use super::store::SqliteLibraryStore;
use crate::sqlite_persistence::{ScopedConnection, TransactionMode};
use anyhow::Result;
use rusqlite::params;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CleanupError {
    #[error("song cleanup failed: {0}")]
    Songs(String),
    #[error("album cleanup failed: {0}")]
    Albums(String),
    #[error("path cleanup failed: {0}")]
    Paths(String),
    #[error("artist cleanup failed: {0}")]
    Artists(String),
    #[error("cleanup failed: {0}")]
    Other(String),
    #[error("cleanup cancelled")]
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub songs: usize,
    pub albums: usize,
    pub paths: usize,
    pub artists: usize,
    pub genres: usize,
    pub roles: usize,
    pub files: usize,
    pub art: usize,
}

fn stage_error(wrap: fn(String) -> CleanupError) -> impl Fn(anyhow::Error) -> CleanupError {
    move |e| wrap(format!("{:#}", e))
}

/// Only local files can be checked; anything with a URL scheme is kept.
fn is_missing_local_file(full_path: &str) -> bool {
    !full_path.contains("://") && !Path::new(full_path).exists()
}

impl SqliteLibraryStore {
    /// Removes orphaned rows. The placeholder artist always survives.
    pub fn cleanup(
        &self,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<CleanupReport, CleanupError> {
        info!("Starting library cleanup");
        let result = self.with_connection(|conn| {
            let scope = conn
                .scope(TransactionMode::Immediate)
                .map_err(stage_error(CleanupError::Other))?;
            let mut report = CleanupReport::default();

            report.songs = self.cleanup_songs_in(conn, monitor)?;
            monitor.on_progress("albums", 0, 1);
            report.albums = self
                .cleanup_albums_in(conn)
                .map_err(stage_error(CleanupError::Albums))?;
            monitor.on_progress("paths", 0, 1);
            report.paths = self
                .cleanup_paths_in(conn)
                .map_err(stage_error(CleanupError::Paths))?;
            monitor.on_progress("artists", 0, 1);
            report.artists = self
                .cleanup_artists_in(conn)
                .map_err(stage_error(CleanupError::Artists))?;
            if monitor.is_cancelled() {
                return Err(CleanupError::Cancelled);
            }
            monitor.on_progress("other", 0, 1);
            self.cleanup_other_in(conn, &mut report)
                .map_err(stage_error(CleanupError::Other))?;

            scope.commit().map_err(stage_error(CleanupError::Other))?;
            monitor.on_progress("done", 1, 1);
            Ok(report)
        });

        // Rows may be gone either way, and ids memoized during a rolled back
        // pass are stale
        self.cache.clear();
        self.lock_memo().clear();
        match &result {
            Ok(report) => info!("Library cleanup finished: {:?}", report),
            Err(e) => error!("Library cleanup aborted: {}", e),
        }
        result
    }

    fn cleanup_songs_in(
        &self,
        conn: &ScopedConnection,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<usize, CleanupError> {
        let to_error = stage_error(CleanupError::Songs);
        let songs: Vec<(i64, String)> = conn
            .prepare(
                "SELECT song.song_id, path.path || file.filename FROM song
                 JOIN file ON file.file_id = song.file_id
                 JOIN path ON path.path_id = file.path_id
                 ORDER BY song.song_id",
            )
            .and_then(|mut stmt| {
                let rows = stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>();
                rows
            })
            .map_err(|e| to_error(e.into()))?;

        let total = songs.len() as u64;
        let batch_size = self.settings.cleanup_batch_size.max(1);
        let mut removed = 0;
        let mut done = 0;
        for batch in songs.chunks(batch_size) {
            if monitor.is_cancelled() {
                info!("Library cleanup cancelled after {} of {} songs", done, total);
                return Err(CleanupError::Cancelled);
            }
            for (song_id, full_path) in batch {
                if is_missing_local_file(full_path) {
                    removed += conn
                        .execute("DELETE FROM song WHERE song_id = ?1", params![song_id])
                        .map_err(|e| to_error(e.into()))?;
                }
            }
            done += batch.len() as u64;
            monitor.on_progress("songs", done, total);
        }
        Ok(removed)
    }

    fn cleanup_albums_in(&self, conn: &ScopedConnection) -> Result<usize> {
        Ok(conn.execute(
            "DELETE FROM album WHERE NOT EXISTS
                (SELECT 1 FROM song WHERE song.album_id = album.album_id)",
            [],
        )?)
    }

    /// Removes folders none of whose files belong to a song. Their files go
    /// with them.
    fn cleanup_paths_in(&self, conn: &ScopedConnection) -> Result<usize> {
        Ok(conn.execute(
            "DELETE FROM path WHERE NOT EXISTS
                (SELECT 1 FROM file JOIN song ON song.file_id = file.file_id
                 WHERE file.path_id = path.path_id)",
            [],
        )?)
    }

    fn cleanup_artists_in(&self, conn: &ScopedConnection) -> Result<usize> {
        Ok(conn.execute(
            "DELETE FROM artist WHERE artist_id <> ?1 AND NOT EXISTS
                (SELECT 1 FROM artist_credit WHERE artist_credit.artist_id = artist.artist_id)",
            params![SENTINEL_ARTIST_ID],
        )?)
    }

    fn cleanup_other_in(&self, conn: &ScopedConnection, report: &mut CleanupReport) -> Result<()> {
        report.genres = conn.execute(
            "DELETE FROM genre WHERE
                NOT EXISTS (SELECT 1 FROM song_genre WHERE song_genre.genre_id = genre.genre_id)
                AND NOT EXISTS (SELECT 1 FROM album_genre WHERE album_genre.genre_id = genre.genre_id)",
            [],
        )?;
        report.roles = conn.execute(
            "DELETE FROM role WHERE role_id <> ?1 AND NOT EXISTS
                (SELECT 1 FROM artist_credit WHERE artist_credit.role_id = role.role_id)",
            params![PRIMARY_ROLE_ID],
        )?;
        report.files = conn.execute(
            "DELETE FROM file WHERE NOT EXISTS
                (SELECT 1 FROM song WHERE song.file_id = file.file_id)",
            [],
        )?;

        let owners = [
            (MediaType::Artist, "artist", "artist_id"),
            (MediaType::Album, "album", "album_id"),
            (MediaType::Song, "song", "song_id"),
            (MediaType::Playlist, "playlist", "playlist_id"),
        ];
        for (media_type, table, id_column) in owners {
            report.art += conn.execute(
                &format!(
                    "DELETE FROM art WHERE media_type = ?1 AND NOT EXISTS
                        (SELECT 1 FROM {table} WHERE {table}.{id_column} = art.media_id)"
                ),
                params![media_type.to_db_str()],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibrarySettings;
    use crate::library_store::{CreditInput, DetailLevel, NewAlbum, NewSong, NoProgress};
    use std::fs;
    use tempfile::TempDir;

    fn store_with_batch(batch: usize) -> SqliteLibraryStore {
        SqliteLibraryStore::open_in_memory(LibrarySettings {
            cleanup_batch_size: batch,
            ..Default::default()
        })
        .unwrap()
    }

    struct Recorder {
        stages: Vec<(String, u64, u64)>,
        cancel: bool,
    }

    impl ProgressMonitor for Recorder {
        fn on_progress(&mut self, stage: &str, done: u64, total: u64) {
            self.stages.push((stage.to_string(), done, total));
        }

        fn is_cancelled(&self) -> bool {
            self.cancel
        }
    }

    /// Two albums in `dir`: one whose file exists, one whose file is gone.
    fn populate(store: &SqliteLibraryStore, dir: &TempDir) -> (i64, i64) {
        let kept_path = dir.path().join("kept.flac");
        fs::write(&kept_path, b"audio").unwrap();
        let gone_path = dir.path().join("gone.flac");

        let kept_album = store
            .add_album(&NewAlbum {
                title: "Kept".to_string(),
                artist_display: "Stays".to_string(),
                credits: vec![CreditInput::artist("Stays")],
                ..Default::default()
            })
            .unwrap();
        let gone_album = store
            .add_album(&NewAlbum {
                title: "Gone".to_string(),
                artist_display: "Leaves".to_string(),
                credits: vec![CreditInput::artist("Leaves")],
                ..Default::default()
            })
            .unwrap();
        let kept = store
            .add_song(&NewSong {
                album_id: kept_album,
                title: "kept".to_string(),
                path: kept_path.to_string_lossy().into_owned(),
                genres: vec!["Rock".to_string()],
                ..Default::default()
            })
            .unwrap();
        store
            .add_song(&NewSong {
                album_id: gone_album,
                title: "gone".to_string(),
                path: gone_path.to_string_lossy().into_owned(),
                genres: vec!["Polka".to_string()],
                credits: vec![CreditInput::artist("Leaves").with_role("composer")],
                ..Default::default()
            })
            .unwrap();
        (kept, gone_album)
    }

    #[test]
    fn test_cleanup_removes_missing_and_orphans() {
        let dir = TempDir::new().unwrap();
        let store = store_with_batch(1);
        let (kept, gone_album) = populate(&store, &dir);
        let leaves = store.add_artist("Leaves", None, None).unwrap();

        let mut recorder = Recorder {
            stages: Vec::new(),
            cancel: false,
        };
        let report = store.cleanup(&mut recorder).unwrap();
        assert_eq!(report.songs, 1);
        assert_eq!(report.albums, 1);
        assert_eq!(report.artists, 1);
        assert_eq!(report.genres, 1);
        assert_eq!(report.roles, 1);

        assert!(store.get_song(kept).is_some());
        assert!(store.get_album(gone_album, false).is_none());
        assert!(store.get_artist(leaves, DetailLevel::Basic).is_none());
        assert!(store
            .get_artist(SENTINEL_ARTIST_ID, DetailLevel::Basic)
            .is_some());
        assert_eq!(store.get_genres().len(), 1);

        // One progress call per song batch
        let song_batches = recorder
            .stages
            .iter()
            .filter(|(stage, _, _)| stage == "songs")
            .count();
        assert_eq!(song_batches, 2);
        assert_eq!(recorder.stages.last().unwrap().0, "done");
    }

    #[test]
    fn test_cancelled_cleanup_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store_with_batch(1000);
        let (_, gone_album) = populate(&store, &dir);

        let mut recorder = Recorder {
            stages: Vec::new(),
            cancel: true,
        };
        assert_eq!(store.cleanup(&mut recorder), Err(CleanupError::Cancelled));
        assert!(store.get_album(gone_album, false).is_some());
    }

    #[test]
    fn test_failing_stage_rolls_back_and_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = store_with_batch(1000);
        populate(&store, &dir);
        store.with_connection(|conn| {
            conn.execute("DROP TABLE album_genre", []).unwrap();
        });

        let result = store.cleanup(&mut NoProgress);
        assert!(matches!(result, Err(CleanupError::Other(_))));
        let counts = store.counts().unwrap();
        assert_eq!(counts["album"], 2);
        assert_eq!(counts["song"], 2);
    }

    #[test]
    fn test_remote_files_are_kept() {
        assert!(!is_missing_local_file("smb://host/share/a.flac"));
        assert!(is_missing_local_file("/definitely/not/here.flac"));
    }
}
