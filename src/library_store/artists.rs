//! Artist repository, the artist identity resolver and artist credits.
//!
//! An external identifier, when present, is the only matching key. Artists
//! without one match by exact name and are promoted in place once an
//! identifier shows up, so repeated scans never duplicate a person.

use super::models::{
    Artist, ArtistCandidate, ArtistCredit, ArtistDetail, ArtistUpdate, CreditInput,
    DetailLevel, DiscographyEntry, MediaType, OwnerKind, PRIMARY_ROLE_ID, SENTINEL_ARTIST_ID,
};
use super::store::SqliteLibraryStore;
use crate::sqlite_persistence::ScopedConnection;
use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_detail(r: &Row) -> rusqlite::Result<ArtistDetail> {
    Ok(ArtistDetail {
        born: r.get("born")?,
        formed: r.get("formed")?,
        died: r.get("died")?,
        disbanded: r.get("disbanded")?,
        years_active: r.get("years_active")?,
        genres: r.get("genres")?,
        moods: r.get("moods")?,
        styles: r.get("styles")?,
        instruments: r.get("instruments")?,
        biography: r.get("biography")?,
        disambiguation: r.get("disambiguation")?,
        artist_type: r.get("artist_type")?,
        gender: r.get("gender")?,
        last_scraped: r.get("last_scraped")?,
        mbid_confirmed: r.get::<_, Option<bool>>("mbid_confirmed")?.unwrap_or(false),
    })
}

impl SqliteLibraryStore {
    // =========================================================================
    // Identity resolution
    // =========================================================================

    pub(super) fn add_artist_in(
        &self,
        conn: &ScopedConnection,
        name: &str,
        mbid: Option<&str>,
        sort_name: Option<&str>,
    ) -> Result<i64> {
        let name = name.trim();
        let mbid = non_empty(mbid);
        let sort_name = non_empty(sort_name).filter(|s| *s != name);

        let id = match mbid {
            None if name.is_empty() => return Ok(SENTINEL_ARTIST_ID),
            Some(mbid) => match self.match_by_mbid_in(conn, name, mbid)? {
                Some(id) => Some(id),
                None => {
                    let unidentified = self.match_unidentified_in(conn, name)?;
                    if let Some(id) = unidentified {
                        debug!("Promoting artist {} '{}' to identifier {}", id, name, mbid);
                        conn.execute(
                            "UPDATE artist SET mbid = ?1 WHERE artist_id = ?2",
                            params![mbid, id],
                        )?;
                    }
                    unidentified
                }
            },
            None => self.match_any_by_name_in(conn, name)?,
        };

        let id = match id {
            Some(id) => id,
            None => {
                let stored_name = if name.is_empty() { mbid.unwrap_or(name) } else { name };
                conn.execute(
                    "INSERT INTO artist (name, mbid, sort_name) VALUES (?1, ?2, ?3)",
                    params![stored_name, mbid, sort_name],
                )?;
                let id = conn.last_insert_rowid();
                conn.execute(
                    "INSERT INTO artist_info (artist_id) VALUES (?1)",
                    params![id],
                )?;
                return Ok(id);
            }
        };

        if let Some(sort_name) = sort_name {
            conn.execute(
                "UPDATE artist SET sort_name = ?1 WHERE artist_id = ?2 AND sort_name IS NULL",
                params![sort_name, id],
            )?;
        }
        Ok(id)
    }

    /// Identifier match. A stored name that is just the identifier was a
    /// placeholder and is replaced by the real name.
    fn match_by_mbid_in(
        &self,
        conn: &ScopedConnection,
        name: &str,
        mbid: &str,
    ) -> Result<Option<i64>> {
        let found: Option<(i64, String)> = conn
            .prepare_cached("SELECT artist_id, name FROM artist WHERE mbid = ?1")?
            .query_row(params![mbid], |r| Ok((r.get(0)?, r.get(1)?)))
            .optional()?;
        if let Some((id, stored_name)) = &found {
            if stored_name == mbid && !name.is_empty() && name != mbid {
                conn.execute(
                    "UPDATE artist SET name = ?1 WHERE artist_id = ?2",
                    params![name, id],
                )?;
                // Song and album aggregates embed credited artist names
                self.cache.remove_artist(*id);
                self.cache.clear_songs();
                self.cache.clear_albums();
            }
        }
        Ok(found.map(|(id, _)| id))
    }

    fn match_unidentified_in(&self, conn: &ScopedConnection, name: &str) -> Result<Option<i64>> {
        if name.is_empty() {
            return Ok(None);
        }
        Ok(conn
            .prepare_cached(
                "SELECT artist_id FROM artist WHERE name = ?1 AND mbid IS NULL
                 ORDER BY artist_id LIMIT 1",
            )?
            .query_row(params![name], |r| r.get(0))
            .optional()?)
    }

    /// Same-named artist, identifier-less ones first, then the oldest.
    fn match_any_by_name_in(&self, conn: &ScopedConnection, name: &str) -> Result<Option<i64>> {
        Ok(conn
            .prepare_cached(
                "SELECT artist_id FROM artist WHERE name = ?1
                 ORDER BY mbid IS NOT NULL, artist_id LIMIT 1",
            )?
            .query_row(params![name], |r| r.get(0))
            .optional()?)
    }

    /// Resolves an artist, creating it when nothing matches.
    pub fn add_artist(&self, name: &str, mbid: Option<&str>, sort_name: Option<&str>) -> Option<i64> {
        let id = self.write("add_artist", (name, mbid), |conn| {
            self.add_artist_in(conn, name, mbid, sort_name)
        })?;
        self.cache.remove_artist(id);
        Some(id)
    }

    /// Read-only resolution, used to merge imported metadata without
    /// creating anything.
    pub fn get_artist_by_match(&self, candidate: &ArtistCandidate) -> Option<i64> {
        self.read("get_artist_by_match", candidate, |conn| {
            self.match_artist_in(conn, candidate)
        })
        .flatten()
    }

    pub(super) fn match_artist_in(
        &self,
        conn: &ScopedConnection,
        candidate: &ArtistCandidate,
    ) -> Result<Option<i64>> {
        let name = candidate.name.trim();
        let mbid = non_empty(candidate.mbid.as_deref());
        match mbid {
            Some(mbid) => {
                let found: Option<i64> = conn
                    .query_row(
                        "SELECT artist_id FROM artist WHERE mbid = ?1",
                        params![mbid],
                        |r| r.get(0),
                    )
                    .optional()?;
                match found {
                    Some(id) => Ok(Some(id)),
                    None => self.match_unidentified_in(conn, name),
                }
            }
            None if name.is_empty() => Ok(None),
            None => self.match_any_by_name_in(conn, name),
        }
    }

    // =========================================================================
    // Artist aggregate
    // =========================================================================

    pub(super) fn get_artist_in(
        &self,
        conn: &ScopedConnection,
        id: i64,
        level: DetailLevel,
    ) -> Result<Option<Artist>> {
        let row = conn
            .prepare_cached("SELECT * FROM artist_view WHERE artist_id = ?1")?
            .query_row(params![id], |r| {
                let artist = Artist {
                    id: r.get("artist_id")?,
                    name: r.get("name")?,
                    sort_name: r.get("sort_name")?,
                    mbid: r.get("mbid")?,
                    detail: None,
                    discography: Vec::new(),
                    art: Default::default(),
                };
                Ok((artist, parse_detail(r)?))
            })
            .optional()?;
        let Some((mut artist, detail)) = row else {
            return Ok(None);
        };

        artist.art = self.get_art_in(conn, id, MediaType::Artist)?;
        if level >= DetailLevel::Full {
            artist.detail = Some(detail);
            let mut stmt = conn.prepare_cached(
                "SELECT title, year, release_group_mbid FROM discography
                 WHERE artist_id = ?1 ORDER BY year, discography_id",
            )?;
            artist.discography = stmt
                .query_map(params![id], |r| {
                    Ok(DiscographyEntry {
                        title: r.get(0)?,
                        year: r.get(1)?,
                        release_group_mbid: r.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
        }
        Ok(Some(artist))
    }

    pub fn get_artist(&self, id: i64, level: DetailLevel) -> Option<Artist> {
        if let Some(artist) = self.cache.get_artist(id, level) {
            return Some(artist);
        }
        // Filled under the connection lock; writers invalidate after releasing it
        self.read("get_artist", id, |conn| {
            let artist = self.get_artist_in(conn, id, level)?;
            if let Some(artist) = &artist {
                self.cache.put_artist(artist, level);
            }
            Ok(artist)
        })
        .flatten()
    }

    /// Replaces the extended detail, discography and artwork of an artist.
    /// Matching keys (name, identifier) are left alone.
    pub(super) fn update_artist_in(
        &self,
        conn: &ScopedConnection,
        id: i64,
        update: &ArtistUpdate,
    ) -> Result<bool> {
        let sort_name = non_empty(update.sort_name.as_deref());
        let changed = conn.execute(
            "UPDATE artist SET sort_name = ?1 WHERE artist_id = ?2",
            params![sort_name, id],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        let d = &update.detail;
        conn.execute(
            "INSERT OR REPLACE INTO artist_info (
                artist_id, born, formed, died, disbanded, years_active, genres, moods, styles,
                instruments, biography, disambiguation, artist_type, gender, last_scraped,
                mbid_confirmed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                id,
                d.born,
                d.formed,
                d.died,
                d.disbanded,
                d.years_active,
                d.genres,
                d.moods,
                d.styles,
                d.instruments,
                d.biography,
                d.disambiguation,
                d.artist_type,
                d.gender,
                d.last_scraped,
                d.mbid_confirmed,
            ],
        )?;

        conn.execute("DELETE FROM discography WHERE artist_id = ?1", params![id])?;
        let mut insert = conn.prepare_cached(
            "INSERT INTO discography (artist_id, title, year, release_group_mbid)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for entry in &update.discography {
            insert.execute(params![id, entry.title, entry.year, entry.release_group_mbid])?;
        }

        self.replace_art_in(conn, id, MediaType::Artist, &update.art)?;
        Ok(true)
    }

    pub fn update_artist(&self, id: i64, update: &ArtistUpdate) -> bool {
        let updated = self
            .write("update_artist", id, |conn| self.update_artist_in(conn, id, update))
            .unwrap_or(false);
        self.cache.invalidate_art(id, MediaType::Artist);
        updated
    }

    /// Deletes an artist nothing is credited to. The placeholder artist is
    /// never deleted.
    pub fn delete_artist(&self, id: i64) -> bool {
        if id == SENTINEL_ARTIST_ID {
            return false;
        }
        let deleted = self
            .write("delete_artist", id, |conn| {
                let credits: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM artist_credit WHERE artist_id = ?1",
                    params![id],
                    |r| r.get(0),
                )?;
                if credits > 0 {
                    debug!("Not deleting artist {}: {} credits remain", id, credits);
                    return Ok(false);
                }
                Ok(conn.execute("DELETE FROM artist WHERE artist_id = ?1", params![id])? > 0)
            })
            .unwrap_or(false);
        if deleted {
            self.cache.invalidate_art(id, MediaType::Artist);
        }
        deleted
    }

    // =========================================================================
    // Credits
    // =========================================================================

    pub(super) fn get_artist_credits_in(
        &self,
        conn: &ScopedConnection,
        owner_kind: OwnerKind,
        owner_id: i64,
    ) -> Result<Vec<ArtistCredit>> {
        let mut stmt = conn.prepare_cached(
            "SELECT artist.artist_id, artist.name, artist.mbid,
                    COALESCE(artist_credit.sort_name, artist.sort_name),
                    role.role_id, role.name, artist_credit.ordinal
             FROM artist_credit
             JOIN artist ON artist.artist_id = artist_credit.artist_id
             JOIN role ON role.role_id = artist_credit.role_id
             WHERE artist_credit.owner_kind = ?1 AND artist_credit.owner_id = ?2
             ORDER BY artist_credit.role_id <> 1, artist_credit.role_id,
                      artist_credit.ordinal, artist_credit.credit_id",
        )?;
        let credits = stmt
            .query_map(params![owner_kind.to_db_str(), owner_id], |r| {
                Ok(ArtistCredit {
                    artist_id: r.get(0)?,
                    name: r.get(1)?,
                    mbid: r.get(2)?,
                    sort_name: r.get(3)?,
                    role_id: r.get(4)?,
                    role: r.get(5)?,
                    ordinal: r.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(credits)
    }

    /// Links an artist to a song or album. Attaching an existing credit is a
    /// no-op. A real primary artist replaces the placeholder credit, and the
    /// placeholder is never added next to a real primary artist.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn add_credit_in(
        &self,
        conn: &ScopedConnection,
        owner_kind: OwnerKind,
        owner_id: i64,
        artist_id: i64,
        role_id: i64,
        ordinal: Option<i64>,
        sort_name: Option<&str>,
    ) -> Result<bool> {
        let kind = owner_kind.to_db_str();
        let exists: Option<i64> = conn
            .prepare_cached(
                "SELECT credit_id FROM artist_credit
                 WHERE artist_id = ?1 AND owner_id = ?2 AND owner_kind = ?3 AND role_id = ?4",
            )?
            .query_row(params![artist_id, owner_id, kind, role_id], |r| r.get(0))
            .optional()?;
        if exists.is_some() {
            return Ok(false);
        }

        if role_id == PRIMARY_ROLE_ID {
            if artist_id == SENTINEL_ARTIST_ID {
                let primaries: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM artist_credit
                     WHERE owner_id = ?1 AND owner_kind = ?2 AND role_id = ?3",
                    params![owner_id, kind, PRIMARY_ROLE_ID],
                    |r| r.get(0),
                )?;
                if primaries > 0 {
                    return Ok(false);
                }
            } else {
                conn.execute(
                    "DELETE FROM artist_credit
                     WHERE owner_id = ?1 AND owner_kind = ?2 AND role_id = ?3 AND artist_id = ?4",
                    params![owner_id, kind, PRIMARY_ROLE_ID, SENTINEL_ARTIST_ID],
                )?;
            }
        }

        let ordinal = match ordinal {
            Some(ordinal) => ordinal,
            None => conn.query_row(
                "SELECT COALESCE(MAX(ordinal) + 1, 0) FROM artist_credit
                 WHERE owner_id = ?1 AND owner_kind = ?2 AND role_id = ?3",
                params![owner_id, kind, role_id],
                |r| r.get(0),
            )?,
        };
        conn.prepare_cached(
            "INSERT INTO artist_credit (artist_id, owner_id, owner_kind, role_id, ordinal, sort_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?
        .execute(params![
            artist_id,
            owner_id,
            kind,
            role_id,
            ordinal,
            non_empty(sort_name)
        ])?;
        Ok(true)
    }

    /// Links the placeholder artist when an owner has no primary credit.
    pub(super) fn ensure_primary_credit_in(
        &self,
        conn: &ScopedConnection,
        owner_kind: OwnerKind,
        owner_id: i64,
    ) -> Result<()> {
        self.add_credit_in(
            conn,
            owner_kind,
            owner_id,
            SENTINEL_ARTIST_ID,
            PRIMARY_ROLE_ID,
            Some(0),
            None,
        )?;
        Ok(())
    }

    /// Resolves every supplied credit to an artist and links it, then makes
    /// sure the owner has a primary credit.
    pub(super) fn add_credits_in(
        &self,
        conn: &ScopedConnection,
        owner_kind: OwnerKind,
        owner_id: i64,
        credits: &[CreditInput],
    ) -> Result<()> {
        for credit in credits {
            let role_id = match credit.role.as_deref() {
                Some(role) => self.add_role_in(conn, role)?,
                None => PRIMARY_ROLE_ID,
            };
            let artist_sort = if role_id == PRIMARY_ROLE_ID {
                credit.sort_name.as_deref()
            } else {
                None
            };
            let artist_id =
                self.add_artist_in(conn, &credit.name, credit.mbid.as_deref(), artist_sort)?;
            self.add_credit_in(
                conn,
                owner_kind,
                owner_id,
                artist_id,
                role_id,
                None,
                credit.sort_name.as_deref(),
            )?;
        }
        self.ensure_primary_credit_in(conn, owner_kind, owner_id)
    }

    pub(super) fn clear_credits_in(
        &self,
        conn: &ScopedConnection,
        owner_kind: OwnerKind,
        owner_id: i64,
    ) -> Result<()> {
        conn.execute(
            "DELETE FROM artist_credit WHERE owner_kind = ?1 AND owner_id = ?2",
            params![owner_kind.to_db_str(), owner_id],
        )?;
        Ok(())
    }

    pub fn get_artist_credits_for_song(&self, song_id: i64) -> Vec<ArtistCredit> {
        self.read("get_artist_credits_for_song", song_id, |conn| {
            self.get_artist_credits_in(conn, OwnerKind::Song, song_id)
        })
        .unwrap_or_default()
    }

    pub fn get_artist_credits_for_album(&self, album_id: i64) -> Vec<ArtistCredit> {
        self.read("get_artist_credits_for_album", album_id, |conn| {
            self.get_artist_credits_in(conn, OwnerKind::Album, album_id)
        })
        .unwrap_or_default()
    }
}
