//! Song repository.
//!
//! A song is identified by (album, track, identifier) when it has an
//! identifier and by (album, filename, title, track) otherwise, so that
//! identically titled recordings on one album stay apart.

use super::models::{DetailLevel, Genre, NewSong, OwnerKind, Song};
use super::paths::split_file_path;
use super::store::SqliteLibraryStore;
use crate::sqlite_persistence::ScopedConnection;
use anyhow::{bail, Result};
use rusqlite::{params, OptionalExtension, Row};

const GENRE_SEPARATOR: &str = " / ";

fn parse_song_row(r: &Row) -> rusqlite::Result<Song> {
    Ok(Song {
        id: r.get("song_id")?,
        album_id: r.get("album_id")?,
        album_title: r.get("album_title")?,
        title: r.get("title")?,
        track: r.get("track")?,
        duration: r.get("duration")?,
        year: r.get("year")?,
        file_id: r.get("file_id")?,
        path: r.get("path")?,
        filename: r.get("filename")?,
        mbid: r.get("mbid")?,
        artist_display: r.get("artist_display")?,
        artist_sort: r.get("artist_sort")?,
        genre_display: r.get("genre_display")?,
        comment: r.get("comment")?,
        mood: r.get("mood")?,
        start_offset: r.get("start_offset")?,
        end_offset: r.get("end_offset")?,
        replay_gain: r.get("replay_gain")?,
        rating: r.get("rating")?,
        votes: r.get("votes")?,
        user_rating: r.get("user_rating")?,
        play_count: r.get("play_count")?,
        last_played: r.get("last_played")?,
        date_added: r.get("date_added")?,
        genres: Vec::new(),
        credits: Vec::new(),
    })
}

fn clean_genres(genres: &[String]) -> Vec<&str> {
    let mut cleaned: Vec<&str> = Vec::new();
    for genre in genres.iter().map(|g| g.trim()).filter(|g| !g.is_empty()) {
        if !cleaned.contains(&genre) {
            cleaned.push(genre);
        }
    }
    cleaned
}

impl SqliteLibraryStore {
    // =========================================================================
    // Ingestion
    // =========================================================================

    fn match_song_in(
        &self,
        conn: &ScopedConnection,
        song: &NewSong,
        filename: &str,
    ) -> Result<Option<i64>> {
        let found = match song.mbid.as_deref().filter(|m| !m.is_empty()) {
            Some(mbid) => conn
                .prepare_cached(
                    "SELECT song_id FROM song WHERE album_id = ?1 AND track = ?2 AND mbid = ?3
                     ORDER BY song_id LIMIT 1",
                )?
                .query_row(params![song.album_id, song.track, mbid], |r| r.get(0))
                .optional()?,
            None => conn
                .prepare_cached(
                    "SELECT song.song_id FROM song JOIN file ON file.file_id = song.file_id
                     WHERE song.album_id = ?1 AND file.filename = ?2 AND song.title = ?3
                       AND song.track = ?4
                     ORDER BY song.song_id LIMIT 1",
                )?
                .query_row(
                    params![song.album_id, filename, song.title.trim(), song.track],
                    |r| r.get(0),
                )
                .optional()?,
        };
        Ok(found)
    }

    /// Writes the scanned fields of a song row, its file statistics and its
    /// genre links. Album ownership is not touched.
    fn store_song_fields_in(
        &self,
        conn: &ScopedConnection,
        song_id: i64,
        file_id: i64,
        album_id: i64,
        song: &NewSong,
    ) -> Result<()> {
        let genres = clean_genres(&song.genres);
        conn.execute(
            "UPDATE song SET
                file_id = ?1, title = ?2, track = ?3, duration = ?4, year = ?5,
                mbid = COALESCE(?6, mbid),
                artist_display = ?7, artist_sort = ?8, genre_display = ?9, comment = ?10,
                mood = ?11, start_offset = ?12, end_offset = ?13, rating = ?14, votes = ?15,
                user_rating = ?16, replay_gain = ?17
             WHERE song_id = ?18",
            params![
                file_id,
                song.title.trim(),
                song.track,
                song.duration,
                song.year,
                song.mbid.as_deref().filter(|m| !m.is_empty()),
                song.artist_display,
                song.artist_sort,
                genres.join(GENRE_SEPARATOR),
                song.comment,
                song.mood,
                song.start_offset,
                song.end_offset,
                song.rating,
                song.votes,
                song.user_rating,
                song.replay_gain,
                song_id,
            ],
        )?;

        conn.execute(
            "UPDATE file SET play_count = MAX(play_count, ?1),
                last_played = COALESCE(?2, last_played)
             WHERE file_id = ?3",
            params![song.play_count, song.last_played, file_id],
        )?;
        self.update_file_date_added_in(conn, file_id, &song.path)?;

        conn.execute("DELETE FROM song_genre WHERE song_id = ?1", params![song_id])?;
        for (ordinal, genre) in genres.iter().enumerate() {
            let genre_id = self.add_genre_in(conn, genre)?;
            conn.prepare_cached(
                "INSERT OR IGNORE INTO song_genre (song_id, genre_id, ordinal) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![song_id, genre_id, ordinal as i64])?;
            self.link_album_genre_in(conn, album_id, genre_id)?;
        }
        Ok(())
    }

    pub(super) fn add_song_in(&self, conn: &ScopedConnection, song: &NewSong) -> Result<i64> {
        if song.title.trim().is_empty() {
            bail!("Song title is empty");
        }
        let album_exists: Option<i64> = conn
            .query_row(
                "SELECT album_id FROM album WHERE album_id = ?1",
                params![song.album_id],
                |r| r.get(0),
            )
            .optional()?;
        if album_exists.is_none() {
            bail!("Album {} does not exist", song.album_id);
        }

        let (folder, filename) = split_file_path(&song.path);
        let file_id = self.add_file_in(conn, &filename, &folder)?;

        let id = match self.match_song_in(conn, song, &filename)? {
            Some(id) => id,
            None => {
                conn.execute(
                    "INSERT INTO song (album_id, file_id, title) VALUES (?1, ?2, ?3)",
                    params![song.album_id, file_id, song.title.trim()],
                )?;
                conn.last_insert_rowid()
            }
        };
        self.store_song_fields_in(conn, id, file_id, song.album_id, song)?;
        self.add_credits_in(conn, OwnerKind::Song, id, &song.credits)?;
        self.associate_album_sources_in(conn, song.album_id, &folder)?;
        Ok(id)
    }

    /// Resolves or creates a song together with its file, genres, credits
    /// and the album's source links.
    pub fn add_song(&self, song: &NewSong) -> Option<i64> {
        let id = self.write("add_song", (&song.path, &song.title), |conn| {
            self.add_song_in(conn, song)
        })?;
        self.cache.remove_song_and_album(id, song.album_id);
        Some(id)
    }

    /// Patches a song from freshly scanned data and re-links its file. The
    /// owning album is kept; `song.album_id` is ignored. Credits are
    /// replaced only when some are supplied.
    pub fn update_song(&self, id: i64, song: &NewSong) -> bool {
        let album_id = self
            .write("update_song", id, |conn| {
                let album_id: Option<i64> = conn
                    .query_row(
                        "SELECT album_id FROM song WHERE song_id = ?1",
                        params![id],
                        |r| r.get(0),
                    )
                    .optional()?;
                let Some(album_id) = album_id else {
                    return Ok(None);
                };
                let (folder, filename) = split_file_path(&song.path);
                let file_id = self.add_file_in(conn, &filename, &folder)?;
                self.store_song_fields_in(conn, id, file_id, album_id, song)?;
                if !song.credits.is_empty() {
                    self.clear_credits_in(conn, OwnerKind::Song, id)?;
                    self.add_credits_in(conn, OwnerKind::Song, id, &song.credits)?;
                }
                Ok(Some(album_id))
            })
            .flatten();
        match album_id {
            Some(album_id) => {
                self.cache.remove_song_and_album(id, album_id);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Credits
    // =========================================================================

    fn song_album_in(&self, conn: &ScopedConnection, song_id: i64) -> Result<i64> {
        let album_id: Option<i64> = conn
            .query_row(
                "SELECT album_id FROM song WHERE song_id = ?1",
                params![song_id],
                |r| r.get(0),
            )
            .optional()?;
        match album_id {
            Some(album_id) => Ok(album_id),
            None => bail!("Song {} does not exist", song_id),
        }
    }

    pub fn add_song_artist(
        &self,
        artist_id: i64,
        song_id: i64,
        role_id: i64,
        ordinal: Option<i64>,
    ) -> bool {
        let album_id = self.write("add_song_artist", (artist_id, song_id), |conn| {
            let album_id = self.song_album_in(conn, song_id)?;
            self.add_credit_in(
                conn,
                OwnerKind::Song,
                song_id,
                artist_id,
                role_id,
                ordinal,
                None,
            )?;
            Ok(album_id)
        });
        match album_id {
            Some(album_id) => {
                self.cache.remove_song_and_album(song_id, album_id);
                true
            }
            None => false,
        }
    }

    /// Credits a contributor (composer, conductor, ...) to a song. An artist
    /// already credited to the song under that name is reused. The sort name
    /// override is stored on the credit only.
    pub fn add_song_contributor(
        &self,
        song_id: i64,
        role: &str,
        name: &str,
        sort_override: Option<&str>,
    ) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let album_id = self.write("add_song_contributor", (song_id, role, name), |conn| {
            let album_id = self.song_album_in(conn, song_id)?;
            let role_id = self.add_role_in(conn, role)?;
            let credited: Option<i64> = conn
                .prepare_cached(
                    "SELECT artist.artist_id FROM artist_credit
                     JOIN artist ON artist.artist_id = artist_credit.artist_id
                     WHERE artist_credit.owner_kind = 'song' AND artist_credit.owner_id = ?1
                       AND artist.name = ?2
                     ORDER BY artist_credit.ordinal LIMIT 1",
                )?
                .query_row(params![song_id, name], |r| r.get(0))
                .optional()?;
            let artist_id = match credited {
                Some(id) => id,
                None => self.add_artist_in(conn, name, None, None)?,
            };
            self.add_credit_in(
                conn,
                OwnerKind::Song,
                song_id,
                artist_id,
                role_id,
                None,
                sort_override,
            )?;
            Ok(album_id)
        });
        match album_id {
            Some(album_id) => {
                self.cache.remove_song_and_album(song_id, album_id);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    fn get_song_genres_in(&self, conn: &ScopedConnection, song_id: i64) -> Result<Vec<Genre>> {
        let mut stmt = conn.prepare_cached(
            "SELECT genre.genre_id, genre.name FROM song_genre
             JOIN genre ON genre.genre_id = song_genre.genre_id
             WHERE song_genre.song_id = ?1 ORDER BY song_genre.ordinal",
        )?;
        let genres = stmt
            .query_map(params![song_id], |r| {
                Ok(Genre {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(genres)
    }

    fn fill_song_detail_in(&self, conn: &ScopedConnection, song: &mut Song) -> Result<()> {
        song.genres = self.get_song_genres_in(conn, song.id)?;
        song.credits = self.get_artist_credits_in(conn, OwnerKind::Song, song.id)?;
        Ok(())
    }

    pub(super) fn get_song_in(
        &self,
        conn: &ScopedConnection,
        id: i64,
        level: DetailLevel,
    ) -> Result<Option<Song>> {
        let song = conn
            .prepare_cached("SELECT * FROM song_view WHERE song_id = ?1")?
            .query_row(params![id], parse_song_row)
            .optional()?;
        let Some(mut song) = song else {
            return Ok(None);
        };
        if level >= DetailLevel::Full {
            self.fill_song_detail_in(conn, &mut song)?;
        }
        Ok(Some(song))
    }

    pub(super) fn get_songs_by_album_in(
        &self,
        conn: &ScopedConnection,
        album_id: i64,
        level: DetailLevel,
    ) -> Result<Vec<Song>> {
        let mut stmt = conn.prepare_cached(
            "SELECT * FROM song_view WHERE album_id = ?1 ORDER BY track, song_id",
        )?;
        let mut songs = stmt
            .query_map(params![album_id], parse_song_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if level >= DetailLevel::Full {
            for song in songs.iter_mut() {
                self.fill_song_detail_in(conn, song)?;
            }
        }
        Ok(songs)
    }

    pub fn get_song_with_detail(&self, id: i64, level: DetailLevel) -> Option<Song> {
        if let Some(song) = self.cache.get_song(id, level) {
            return Some(song);
        }
        self.read("get_song", id, |conn| {
            let song = self.get_song_in(conn, id, level)?;
            if let Some(song) = &song {
                self.cache.put_song(song, level);
            }
            Ok(song)
        })
        .flatten()
    }

    /// Full song record with genres and credits.
    pub fn get_song(&self, id: i64) -> Option<Song> {
        self.get_song_with_detail(id, DetailLevel::Full)
    }

    /// Song playing from `full_path`, as reported by a player.
    pub fn get_song_by_path(&self, full_path: &str) -> Option<Song> {
        let (folder, filename) = split_file_path(full_path);
        let id = self
            .read("get_song_by_path", full_path, |conn| {
                Ok(conn
                    .query_row(
                        "SELECT song_id FROM song_view WHERE path = ?1 AND filename = ?2
                         ORDER BY song_id LIMIT 1",
                        params![folder, filename],
                        |r| r.get::<_, i64>(0),
                    )
                    .optional()?)
            })
            .flatten()?;
        self.get_song(id)
    }

    pub fn get_songs_by_album(&self, album_id: i64) -> Vec<Song> {
        self.read("get_songs_by_album", album_id, |conn| {
            self.get_songs_by_album_in(conn, album_id, DetailLevel::Full)
        })
        .unwrap_or_default()
    }

    /// Deletes a song with its credits, genre links and art. The album and
    /// the file stay until the next cleanup.
    pub fn delete_song(&self, id: i64) -> bool {
        let album_id = self
            .write("delete_song", id, |conn| {
                let album_id: Option<i64> = conn
                    .query_row(
                        "SELECT album_id FROM song WHERE song_id = ?1",
                        params![id],
                        |r| r.get(0),
                    )
                    .optional()?;
                conn.execute("DELETE FROM song WHERE song_id = ?1", params![id])?;
                Ok(album_id)
            })
            .flatten();
        match album_id {
            Some(album_id) => {
                self.cache.remove_song_and_album(id, album_id);
                true
            }
            None => false,
        }
    }

    pub fn set_song_user_rating(&self, id: i64, rating: i64) -> bool {
        let album_id = self
            .write("set_song_user_rating", (id, rating), |conn| {
                conn.execute(
                    "UPDATE song SET user_rating = ?1 WHERE song_id = ?2",
                    params![rating, id],
                )?;
                Ok(conn
                    .query_row(
                        "SELECT album_id FROM song WHERE song_id = ?1",
                        params![id],
                        |r| r.get::<_, i64>(0),
                    )
                    .optional()?)
            })
            .flatten();
        match album_id {
            Some(album_id) => {
                self.cache.remove_song_and_album(id, album_id);
                true
            }
            None => false,
        }
    }
}
