//! Album repository.
//!
//! Albums resolve like artists: the release identifier first, otherwise the
//! (artist display string, title) pair, promoting an identifier-less match
//! in place. The album aggregate (credits, genres, art and optionally every
//! song) is the main caching target.

use super::models::{
    Album, CreditInput, DetailLevel, Genre, MediaType, NewAlbum, OwnerKind, ReleaseType,
};
use super::store::{now_timestamp, SqliteLibraryStore};
use crate::sqlite_persistence::ScopedConnection;
use anyhow::{bail, Result};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

fn parse_album_row(r: &Row) -> rusqlite::Result<Album> {
    let release_type: String = r.get("release_type")?;
    Ok(Album {
        id: r.get("album_id")?,
        title: r.get("title")?,
        mbid: r.get("mbid")?,
        release_group_mbid: r.get("release_group_mbid")?,
        artist_display: r.get("artist_display")?,
        artist_sort: r.get("artist_sort")?,
        genre_display: r.get("genre_display")?,
        year: r.get("year")?,
        compilation: r.get("compilation")?,
        release_type: ReleaseType::from_db_str(&release_type),
        label: r.get("label")?,
        album_type: r.get("album_type")?,
        moods: r.get("moods")?,
        styles: r.get("styles")?,
        themes: r.get("themes")?,
        review: r.get("review")?,
        rating: r.get("rating")?,
        votes: r.get("votes")?,
        user_rating: r.get("user_rating")?,
        last_scraped: r.get("last_scraped")?,
        date_added: r.get("date_added")?,
        ..Default::default()
    })
}

impl SqliteLibraryStore {
    // =========================================================================
    // Resolution
    // =========================================================================

    pub(super) fn match_album_in(
        &self,
        conn: &ScopedConnection,
        title: &str,
        artist_display: &str,
        mbid: Option<&str>,
        promote: bool,
    ) -> Result<Option<i64>> {
        if let Some(mbid) = mbid {
            let found: Option<i64> = conn
                .prepare_cached("SELECT album_id FROM album WHERE mbid = ?1 ORDER BY album_id")?
                .query_row(params![mbid], |r| r.get(0))
                .optional()?;
            if found.is_some() {
                return Ok(found);
            }
            let unidentified: Option<i64> = conn
                .prepare_cached(
                    "SELECT album_id FROM album
                     WHERE artist_display = ?1 AND title = ?2 AND mbid IS NULL
                     ORDER BY album_id LIMIT 1",
                )?
                .query_row(params![artist_display, title], |r| r.get(0))
                .optional()?;
            if let (Some(id), true) = (unidentified, promote) {
                debug!("Promoting album {} '{}' to identifier {}", id, title, mbid);
                conn.execute(
                    "UPDATE album SET mbid = ?1 WHERE album_id = ?2",
                    params![mbid, id],
                )?;
            }
            return Ok(unidentified);
        }

        Ok(conn
            .prepare_cached(
                "SELECT album_id FROM album WHERE artist_display = ?1 AND title = ?2
                 ORDER BY mbid IS NOT NULL, album_id LIMIT 1",
            )?
            .query_row(params![artist_display, title], |r| r.get(0))
            .optional()?)
    }

    pub(super) fn add_album_in(&self, conn: &ScopedConnection, album: &NewAlbum) -> Result<i64> {
        let title = album.title.trim();
        if title.is_empty() {
            bail!("Album title is empty");
        }
        let mbid = album.mbid.as_deref().filter(|m| !m.is_empty());
        let artist_display = album.artist_display.trim();

        let id = match self.match_album_in(conn, title, artist_display, mbid, true)? {
            Some(id) => id,
            None => {
                conn.execute(
                    "INSERT INTO album (
                        title, mbid, release_group_mbid, artist_display, artist_sort,
                        genre_display, year, label, album_type, compilation, release_type,
                        date_added
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        title,
                        mbid,
                        album.release_group_mbid,
                        artist_display,
                        album.artist_sort,
                        album.genre_display,
                        album.year,
                        album.label,
                        album.album_type,
                        album.compilation,
                        album.release_type.to_db_str(),
                        now_timestamp(),
                    ],
                )?;
                conn.last_insert_rowid()
            }
        };
        self.add_credits_in(conn, OwnerKind::Album, id, &album.credits)?;
        Ok(id)
    }

    /// Resolves or creates an album and links its credits, falling back to
    /// the placeholder artist when none are supplied.
    pub fn add_album(&self, album: &NewAlbum) -> Option<i64> {
        let id = self.write("add_album", (&album.title, &album.artist_display), |conn| {
            self.add_album_in(conn, album)
        })?;
        self.cache.remove_album(id);
        Some(id)
    }

    /// Looks up an album without creating or promoting anything.
    pub fn get_album_id_by_name(
        &self,
        title: &str,
        artist_display: &str,
        mbid: Option<&str>,
    ) -> Option<i64> {
        let mbid = mbid.filter(|m| !m.is_empty());
        self.read("get_album_id_by_name", (title, artist_display), |conn| {
            self.match_album_in(conn, title.trim(), artist_display.trim(), mbid, false)
        })
        .flatten()
    }

    pub fn add_album_artist(
        &self,
        artist_id: i64,
        album_id: i64,
        role_id: i64,
        ordinal: Option<i64>,
    ) -> bool {
        let added = self
            .write("add_album_artist", (artist_id, album_id), |conn| {
                self.add_credit_in(
                    conn,
                    OwnerKind::Album,
                    album_id,
                    artist_id,
                    role_id,
                    ordinal,
                    None,
                )
            })
            .is_some();
        self.cache.remove_album(album_id);
        added
    }

    // =========================================================================
    // Genres
    // =========================================================================

    pub(super) fn link_album_genre_in(
        &self,
        conn: &ScopedConnection,
        album_id: i64,
        genre_id: i64,
    ) -> Result<()> {
        conn.prepare_cached(
            "INSERT OR IGNORE INTO album_genre (album_id, genre_id, ordinal)
             SELECT ?1, ?2, COALESCE(MAX(ordinal) + 1, 0) FROM album_genre WHERE album_id = ?1",
        )?
        .execute(params![album_id, genre_id])?;
        Ok(())
    }

    fn get_album_genres_in(&self, conn: &ScopedConnection, album_id: i64) -> Result<Vec<Genre>> {
        let mut stmt = conn.prepare_cached(
            "SELECT genre.genre_id, genre.name FROM album_genre
             JOIN genre ON genre.genre_id = album_genre.genre_id
             WHERE album_genre.album_id = ?1 ORDER BY album_genre.ordinal",
        )?;
        let genres = stmt
            .query_map(params![album_id], |r| {
                Ok(Genre {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(genres)
    }

    // =========================================================================
    // Aggregate
    // =========================================================================

    pub(super) fn get_album_in(
        &self,
        conn: &ScopedConnection,
        id: i64,
        include_songs: bool,
    ) -> Result<Option<Album>> {
        let album = conn
            .prepare_cached("SELECT * FROM album WHERE album_id = ?1")?
            .query_row(params![id], parse_album_row)
            .optional()?;
        let Some(mut album) = album else {
            return Ok(None);
        };
        album.genres = self.get_album_genres_in(conn, id)?;
        album.credits = self.get_artist_credits_in(conn, OwnerKind::Album, id)?;
        album.art = self.get_art_in(conn, id, MediaType::Album)?;
        if include_songs {
            album.songs = self.get_songs_by_album_in(conn, id, DetailLevel::Full)?;
        }
        Ok(Some(album))
    }

    /// Reads the album aggregate. Songs (each with credits and genres) are
    /// included on request, which is what the `Full` cache level holds.
    pub fn get_album(&self, id: i64, include_songs: bool) -> Option<Album> {
        let level = if include_songs {
            DetailLevel::Full
        } else {
            DetailLevel::Basic
        };
        if let Some(mut album) = self.cache.get_album(id, level) {
            if !include_songs {
                album.songs.clear();
            }
            return Some(album);
        }
        self.read("get_album", id, |conn| {
            let album = self.get_album_in(conn, id, include_songs)?;
            if let Some(album) = &album {
                self.cache.put_album(album, level);
            }
            Ok(album)
        })
        .flatten()
    }

    /// Patches the descriptive fields, genres and art of an album. With
    /// `merge`, the album credits and the credits of every song in
    /// `album.songs` are rebuilt from the aggregate.
    pub(super) fn update_album_in(
        &self,
        conn: &ScopedConnection,
        album: &Album,
        merge: bool,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE album SET
                title = ?1, mbid = ?2, release_group_mbid = ?3, artist_display = ?4,
                artist_sort = ?5, genre_display = ?6, year = ?7, compilation = ?8,
                release_type = ?9, label = ?10, album_type = ?11, moods = ?12, styles = ?13,
                themes = ?14, review = ?15, rating = ?16, votes = ?17, user_rating = ?18,
                last_scraped = ?19
             WHERE album_id = ?20",
            params![
                album.title,
                album.mbid.as_deref().filter(|m| !m.is_empty()),
                album.release_group_mbid,
                album.artist_display,
                album.artist_sort,
                album.genre_display,
                album.year,
                album.compilation,
                album.release_type.to_db_str(),
                album.label,
                album.album_type,
                album.moods,
                album.styles,
                album.themes,
                album.review,
                album.rating,
                album.votes,
                album.user_rating,
                album.last_scraped,
                album.id,
            ],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        conn.execute(
            "DELETE FROM album_genre WHERE album_id = ?1",
            params![album.id],
        )?;
        for genre in &album.genres {
            let genre_id = self.add_genre_in(conn, &genre.name)?;
            self.link_album_genre_in(conn, album.id, genre_id)?;
        }

        for (slot, url) in &album.art {
            self.set_art_in(conn, album.id, MediaType::Album, slot, url)?;
        }

        if merge {
            self.clear_credits_in(conn, OwnerKind::Album, album.id)?;
            let credits: Vec<CreditInput> = album.credits.iter().map(CreditInput::from).collect();
            self.add_credits_in(conn, OwnerKind::Album, album.id, &credits)?;

            for song in &album.songs {
                let owned: Option<i64> = conn
                    .query_row(
                        "SELECT song_id FROM song WHERE song_id = ?1 AND album_id = ?2",
                        params![song.id, album.id],
                        |r| r.get(0),
                    )
                    .optional()?;
                if owned.is_none() {
                    debug!("Song {} is not on album {}, skipping", song.id, album.id);
                    continue;
                }
                self.clear_credits_in(conn, OwnerKind::Song, song.id)?;
                let credits: Vec<CreditInput> =
                    song.credits.iter().map(CreditInput::from).collect();
                self.add_credits_in(conn, OwnerKind::Song, song.id, &credits)?;
            }
        }
        Ok(true)
    }

    pub fn update_album(&self, album: &Album, merge: bool) -> bool {
        let updated = self
            .write("update_album", album.id, |conn| {
                self.update_album_in(conn, album, merge)
            })
            .unwrap_or(false);
        self.cache.invalidate_art(album.id, MediaType::Album);
        for song in &album.songs {
            self.cache.remove_song(song.id);
        }
        updated
    }

    /// Deletes an album together with its songs, credits, genre links,
    /// source links and art.
    pub fn delete_album(&self, id: i64) -> bool {
        let deleted = self
            .write("delete_album", id, |conn| {
                Ok(conn.execute("DELETE FROM album WHERE album_id = ?1", params![id])? > 0)
            })
            .unwrap_or(false);
        if deleted {
            self.cache.invalidate_art(id, MediaType::Album);
            self.cache.clear_songs();
        }
        deleted
    }
}
