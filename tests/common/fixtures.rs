//! Test library creation
//!
//! Every library lives in its own temporary directory together with the
//! audio files its songs point at, so cleanup sees them as present.

use super::constants::*;
use music_library_db::config::LibrarySettings;
use music_library_db::library_store::{CreditInput, NewAlbum, NewSong, SqliteLibraryStore};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestLibrary {
    pub dir: TempDir,
    pub db_path: PathBuf,
    pub store: SqliteLibraryStore,
    pub album_1: i64,
    pub album_2: i64,
    /// Songs of album 1, in insertion order.
    pub album_1_songs: Vec<i64>,
    pub album_2_songs: Vec<i64>,
}

/// A song under `folder` with the given credits and genres.
pub fn new_song(
    album_id: i64,
    folder: &str,
    title: &str,
    track: i64,
    credits: &[&str],
    genres: &[&str],
) -> NewSong {
    NewSong {
        album_id,
        title: title.to_string(),
        path: format!("{}{}.flac", folder, title),
        artist_display: credits.join(" / "),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        track,
        duration: 180 + track,
        credits: credits.iter().map(|name| CreditInput::artist(name)).collect(),
        ..Default::default()
    }
}

impl TestLibrary {
    /// An empty library in a fresh directory.
    pub fn empty() -> Self {
        Self::empty_with(LibrarySettings::default())
    }

    pub fn empty_with(settings: LibrarySettings) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = dir.path().join("library.db");
        let store = SqliteLibraryStore::open(&db_path, settings).expect("Failed to open library");
        Self {
            dir,
            db_path,
            store,
            album_1: 0,
            album_2: 0,
            album_1_songs: Vec::new(),
            album_2_songs: Vec::new(),
        }
    }

    /// Folder under the library directory, created on disk, with a trailing
    /// separator.
    pub fn folder(&self, name: &str) -> String {
        let path = self.dir.path().join(name);
        fs::create_dir_all(&path).expect("Failed to create folder");
        format!("{}/", path.display())
    }

    /// Adds a song and writes its audio file.
    pub fn add_song(&self, song: &NewSong) -> i64 {
        fs::write(&song.path, b"audio").expect("Failed to write audio file");
        self.store.add_song(song).expect("Failed to add song")
    }

    /// Two albums:
    /// - album 1 by the band: "Sunrise" (rock), "Noon" (rock, jazz, with a
    ///   composer credit)
    /// - album 2 by the singer: "Breeze" (jazz)
    pub fn seeded() -> Self {
        let mut library = Self::empty();
        let store = &library.store;

        library.album_1 = store
            .add_album(&NewAlbum {
                title: ALBUM_1_TITLE.to_string(),
                artist_display: BAND_NAME.to_string(),
                genre_display: ROCK_GENRE.to_string(),
                year: Some(2001),
                credits: vec![CreditInput::artist(BAND_NAME).with_mbid(BAND_MBID)],
                ..Default::default()
            })
            .expect("Failed to add album 1");
        library.album_2 = store
            .add_album(&NewAlbum {
                title: ALBUM_2_TITLE.to_string(),
                artist_display: SINGER_NAME.to_string(),
                genre_display: JAZZ_GENRE.to_string(),
                year: Some(2010),
                credits: vec![CreditInput::artist(SINGER_NAME)],
                ..Default::default()
            })
            .expect("Failed to add album 2");

        let folder_1 = library.folder("first");
        let folder_2 = library.folder("second");
        let sunrise = library.add_song(&new_song(
            library.album_1,
            &folder_1,
            "Sunrise",
            1,
            &[BAND_NAME],
            &[ROCK_GENRE],
        ));
        let noon = library.add_song(&new_song(
            library.album_1,
            &folder_1,
            "Noon",
            2,
            &[BAND_NAME],
            &[ROCK_GENRE, JAZZ_GENRE],
        ));
        assert!(library
            .store
            .add_song_contributor(noon, COMPOSER_ROLE, COMPOSER_NAME, None));
        let breeze = library.add_song(&new_song(
            library.album_2,
            &folder_2,
            "Breeze",
            1,
            &[SINGER_NAME],
            &[JAZZ_GENRE],
        ));

        library.album_1_songs = vec![sunrise, noon];
        library.album_2_songs = vec![breeze];
        library
    }
}
