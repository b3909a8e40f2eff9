//! End-to-end tests for opening libraries written by older versions

use music_library_db::config::LibrarySettings;
use music_library_db::library_store::{
    DetailLevel, MigrationError, OpenOutcome, SqliteLibraryStore, LIBRARY_SCHEMA_VERSION,
    LIBRARY_VERSIONED_SCHEMAS, SENTINEL_ARTIST_ID, TAG_RESCAN_THRESHOLD,
};
use rusqlite::Connection;
use std::path::Path;
use tempfile::TempDir;

/// Writes a version 1 library with one album, one song and one artist.
fn create_v1_library(path: &Path) {
    let conn = Connection::open(path).unwrap();
    LIBRARY_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
    conn.execute_batch(
        "INSERT INTO path (path_id, path) VALUES (1, '/music/band/');
         INSERT INTO file (file_id, path_id, filename) VALUES (1, 1, 'one.flac');
         INSERT INTO artist (artist_id, name, mbid) VALUES (2, 'Band', 'mbid-band');
         INSERT INTO artist_info (artist_id) VALUES (2);
         INSERT INTO album (album_id, title, artist_display) VALUES (1, 'Debut', 'Band');
         INSERT INTO song (song_id, album_id, file_id, title, track, duration, play_count)
             VALUES (1, 1, 1, 'One', 1, 200, 3);
         INSERT INTO song_artist (artist_id, song_id, ordinal) VALUES (2, 1, 0);
         INSERT INTO album_artist (artist_id, album_id, ordinal) VALUES (2, 1, 0);",
    )
    .unwrap();
}

#[test]
fn test_v1_library_migrates_and_keeps_data() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("library.db");
    create_v1_library(&db_path);

    let store = SqliteLibraryStore::open(&db_path, LibrarySettings::default()).unwrap();
    assert_eq!(store.open_outcome(), OpenOutcome::Migrated { from: 1 });
    assert_eq!(store.schema_version(), Some(LIBRARY_SCHEMA_VERSION));

    let song = store.get_song(1).unwrap();
    assert_eq!(song.title, "One");
    assert_eq!(song.duration, 200);
    assert_eq!(song.play_count, 3);
    assert_eq!(song.full_path(), "/music/band/one.flac");
    assert_eq!(song.credits.len(), 1);
    assert_eq!(song.credits[0].name, "Band");
    assert_eq!(song.credits[0].role_id, 1);

    let album = store.get_album(1, false).unwrap();
    assert_eq!(album.credits.len(), 1);
    assert_eq!(album.credits[0].artist_id, 2);

    // Rows every library carries are seeded on upgrade
    assert!(store.get_artist(SENTINEL_ARTIST_ID, DetailLevel::Basic).is_some());
    assert_eq!(store.get_role_id("artist"), Some(1));
}

#[test]
fn test_v1_library_flags_tag_rescan() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("library.db");
    create_v1_library(&db_path);
    assert!(1 < TAG_RESCAN_THRESHOLD);

    let store = SqliteLibraryStore::open(&db_path, LibrarySettings::default()).unwrap();
    assert_eq!(store.needs_tag_scan(), Some(LIBRARY_SCHEMA_VERSION));

    assert!(store.set_tag_scan_done());
    assert_eq!(store.needs_tag_scan(), None);
    drop(store);

    let reopened = SqliteLibraryStore::open(&db_path, LibrarySettings::default()).unwrap();
    assert_eq!(reopened.open_outcome(), OpenOutcome::UpToDate);
    assert_eq!(reopened.needs_tag_scan(), None);
}

#[test]
fn test_fresh_library_needs_no_rescan() {
    let dir = TempDir::new().unwrap();
    let store =
        SqliteLibraryStore::open(dir.path().join("library.db"), LibrarySettings::default())
            .unwrap();
    assert_eq!(store.open_outcome(), OpenOutcome::Created);
    assert_eq!(store.needs_tag_scan(), None);
}

#[test]
fn test_newer_library_is_refused() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("library.db");
    drop(SqliteLibraryStore::open(&db_path, LibrarySettings::default()).unwrap());

    let conn = Connection::open(&db_path).unwrap();
    music_library_db::sqlite_persistence::write_schema_version(&conn, LIBRARY_SCHEMA_VERSION + 1)
        .unwrap();
    drop(conn);

    let result = SqliteLibraryStore::open(&db_path, LibrarySettings::default());
    assert!(matches!(
        result,
        Err(MigrationError::NewerThanSupported { .. })
    ));
}
