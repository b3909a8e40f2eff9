//! Artwork store: one URL per (entity, kind, slot).

use super::models::{ArtMap, MediaType, OwnerKind, PRIMARY_ROLE_ID};
use super::store::SqliteLibraryStore;
use crate::cache::ThumbKey;
use crate::sqlite_persistence::ScopedConnection;
use anyhow::Result;
use rusqlite::{params, OptionalExtension};

const THUMB_SLOT: &str = "thumb";

impl SqliteLibraryStore {
    pub(super) fn set_art_in(
        &self,
        conn: &ScopedConnection,
        media_id: i64,
        media_type: MediaType,
        slot: &str,
        url: &str,
    ) -> Result<()> {
        conn.prepare_cached(
            "INSERT INTO art (media_id, media_type, art_type, url) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (media_id, media_type, art_type) DO UPDATE SET url = excluded.url",
        )?
        .execute(params![media_id, media_type.to_db_str(), slot, url])?;
        Ok(())
    }

    /// Replaces every slot of an entity with `art`.
    pub(super) fn replace_art_in(
        &self,
        conn: &ScopedConnection,
        media_id: i64,
        media_type: MediaType,
        art: &ArtMap,
    ) -> Result<()> {
        conn.execute(
            "DELETE FROM art WHERE media_id = ?1 AND media_type = ?2",
            params![media_id, media_type.to_db_str()],
        )?;
        for (slot, url) in art {
            self.set_art_in(conn, media_id, media_type, slot, url)?;
        }
        Ok(())
    }

    pub(super) fn get_art_in(
        &self,
        conn: &ScopedConnection,
        media_id: i64,
        media_type: MediaType,
    ) -> Result<ArtMap> {
        let mut stmt = conn.prepare_cached(
            "SELECT art_type, url FROM art WHERE media_id = ?1 AND media_type = ?2",
        )?;
        let art = stmt
            .query_map(params![media_id, media_type.to_db_str()], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<ArtMap>>()?;
        Ok(art)
    }

    fn get_art_slot_in(
        &self,
        conn: &ScopedConnection,
        media_id: i64,
        media_type: MediaType,
        slot: &str,
    ) -> Result<Option<String>> {
        Ok(conn
            .prepare_cached(
                "SELECT url FROM art WHERE media_id = ?1 AND media_type = ?2 AND art_type = ?3",
            )?
            .query_row(params![media_id, media_type.to_db_str(), slot], |r| {
                r.get(0)
            })
            .optional()?)
    }

    /// Sets (or replaces) one art slot.
    pub fn set_art(&self, media_id: i64, media_type: MediaType, slot: &str, url: &str) -> bool {
        let done = self
            .write("set_art", (media_id, media_type, slot), |conn| {
                self.set_art_in(conn, media_id, media_type, slot, url)
            })
            .is_some();
        self.cache.invalidate_art(media_id, media_type);
        done
    }

    /// Sets every slot in `art`, leaving other slots untouched.
    pub fn set_art_map(&self, media_id: i64, media_type: MediaType, art: &ArtMap) -> bool {
        let done = self
            .write("set_art_map", (media_id, media_type), |conn| {
                for (slot, url) in art {
                    self.set_art_in(conn, media_id, media_type, slot, url)?;
                }
                Ok(())
            })
            .is_some();
        self.cache.invalidate_art(media_id, media_type);
        done
    }

    pub fn get_art_for_item(&self, media_id: i64, media_type: MediaType, slot: &str) -> Option<String> {
        if let Some(url) = self.cache.get_art(media_id, media_type, slot) {
            return Some(url);
        }
        self.read("get_art_for_item", (media_id, media_type, slot), |conn| {
            let url = self.get_art_slot_in(conn, media_id, media_type, slot)?;
            if let Some(url) = &url {
                self.cache.put_art(media_id, media_type, slot, url);
            }
            Ok(url)
        })
        .flatten()
    }

    /// Slot to URL map of an entity. Empty when it has no art.
    pub fn get_art(&self, media_id: i64, media_type: MediaType) -> ArtMap {
        if let Some(art) = self.cache.get_art_map(media_id, media_type) {
            return art;
        }
        self.read("get_art", (media_id, media_type), |conn| {
            let art = self.get_art_in(conn, media_id, media_type)?;
            self.cache.put_art_map(media_id, media_type, &art);
            Ok(art)
        })
        .unwrap_or_default()
    }

    pub fn remove_art(&self, media_id: i64, media_type: MediaType, slot: &str) -> bool {
        let removed = self
            .write("remove_art", (media_id, media_type, slot), |conn| {
                Ok(conn.execute(
                    "DELETE FROM art WHERE media_id = ?1 AND media_type = ?2 AND art_type = ?3",
                    params![media_id, media_type.to_db_str(), slot],
                )?)
            })
            .unwrap_or(0);
        self.cache.invalidate_art(media_id, media_type);
        removed > 0
    }

    // =========================================================================
    // Thumbnail fallback
    // =========================================================================

    fn credited_artist_in(
        &self,
        conn: &ScopedConnection,
        owner_kind: OwnerKind,
        owner_id: i64,
        primary_only: bool,
    ) -> Result<Option<i64>> {
        let artist_id = if primary_only {
            conn.prepare_cached(
                "SELECT artist_id FROM artist_credit
                 WHERE owner_kind = ?1 AND owner_id = ?2 AND role_id = ?3
                 ORDER BY ordinal LIMIT 1",
            )?
            .query_row(
                params![owner_kind.to_db_str(), owner_id, PRIMARY_ROLE_ID],
                |r| r.get(0),
            )
            .optional()?
        } else {
            conn.prepare_cached(
                "SELECT artist_id FROM artist_credit
                 WHERE owner_kind = ?1 AND owner_id = ?2
                 ORDER BY role_id <> 1, ordinal LIMIT 1",
            )?
            .query_row(params![owner_kind.to_db_str(), owner_id], |r| r.get(0))
            .optional()?
        };
        Ok(artist_id)
    }

    fn find_thumb_in(&self, conn: &ScopedConnection, key: &ThumbKey) -> Result<Option<String>> {
        let mut album_id = key.album_id;
        if let Some(song_id) = key.song_id {
            if let Some(url) = self.get_art_slot_in(conn, song_id, MediaType::Song, THUMB_SLOT)? {
                return Ok(Some(url));
            }
            if album_id.is_none() {
                album_id = conn
                    .query_row(
                        "SELECT album_id FROM song WHERE song_id = ?1",
                        params![song_id],
                        |r| r.get(0),
                    )
                    .optional()?;
            }
        }
        if let Some(album_id) = album_id {
            if let Some(url) = self.get_art_slot_in(conn, album_id, MediaType::Album, THUMB_SLOT)? {
                return Ok(Some(url));
            }
        }

        let mut artist_id = key.artist_id;
        if artist_id.is_none() {
            if let Some(song_id) = key.song_id {
                artist_id = self.credited_artist_in(conn, OwnerKind::Song, song_id, key.primary_only)?;
            }
        }
        if artist_id.is_none() {
            if let Some(album_id) = album_id {
                artist_id =
                    self.credited_artist_in(conn, OwnerKind::Album, album_id, key.primary_only)?;
            }
        }
        if let Some(artist_id) = artist_id {
            if let Some(url) = self.get_art_slot_in(conn, artist_id, MediaType::Artist, THUMB_SLOT)? {
                return Ok(Some(url));
            }
        }

        if let Some(playlist_id) = key.playlist_id {
            return self.get_art_slot_in(conn, playlist_id, MediaType::Playlist, THUMB_SLOT);
        }
        Ok(None)
    }

    /// Thumbnail for a browse item, falling back from the song to its album,
    /// then to the credited artist, then to the playlist.
    pub fn get_thumb(&self, key: &ThumbKey) -> Option<String> {
        if let Some(cached) = self.cache.get_thumb(key) {
            return cached;
        }
        self.read("get_thumb", key, |conn| {
            let url = self.find_thumb_in(conn, key)?;
            self.cache.put_thumb(key.clone(), url.clone());
            Ok(url)
        })
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibrarySettings;

    fn store() -> SqliteLibraryStore {
        SqliteLibraryStore::open_in_memory(LibrarySettings::default()).unwrap()
    }

    #[test]
    fn test_set_art_replaces_slot() {
        let store = store();
        assert!(store.set_art(5, MediaType::Artist, "thumb", "a.jpg"));
        assert!(store.set_art(5, MediaType::Artist, "fanart", "f.jpg"));
        assert_eq!(
            store.get_art_for_item(5, MediaType::Artist, "thumb").as_deref(),
            Some("a.jpg")
        );

        assert!(store.set_art(5, MediaType::Artist, "thumb", "b.jpg"));
        assert_eq!(
            store.get_art_for_item(5, MediaType::Artist, "thumb").as_deref(),
            Some("b.jpg")
        );
        let art = store.get_art(5, MediaType::Artist);
        assert_eq!(art.len(), 2);
        assert_eq!(art["fanart"], "f.jpg");
        assert!(store.get_art(5, MediaType::Album).is_empty());
    }

    #[test]
    fn test_remove_art() {
        let store = store();
        store.set_art(1, MediaType::Playlist, "thumb", "p.jpg");
        assert!(store.remove_art(1, MediaType::Playlist, "thumb"));
        assert!(!store.remove_art(1, MediaType::Playlist, "thumb"));
        assert!(store.get_art_for_item(1, MediaType::Playlist, "thumb").is_none());
    }

    #[test]
    fn test_thumb_falls_back_to_playlist() {
        let store = store();
        store.set_art(3, MediaType::Playlist, "thumb", "p.jpg");
        let key = ThumbKey {
            album_id: Some(42),
            playlist_id: Some(3),
            ..Default::default()
        };
        assert_eq!(store.get_thumb(&key).as_deref(), Some("p.jpg"));

        // The album gets art: cached thumbs are dropped and the album wins
        store.set_art(42, MediaType::Album, "thumb", "album.jpg");
        assert_eq!(store.get_thumb(&key).as_deref(), Some("album.jpg"));
    }
}
