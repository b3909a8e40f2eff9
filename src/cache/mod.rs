//! In-process read-through cache in front of the library repositories.
//!
//! The cache is owned by the store it accelerates and is never the system
//! of record. Every map sits behind one coarse lock. Entries carry the
//! [`DetailLevel`] they were loaded at; asking for more than that evicts the
//! entry so the caller reloads it. Invalidation removes entries eagerly.

mod localized;

pub use localized::{LocalizedStringCache, StringSource};

use crate::library_store::{Album, ArtMap, Artist, DetailLevel, MediaType, Song};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Per-kind map of cached aggregates tagged with their detail level.
pub struct EntityCache<T> {
    entries: HashMap<i64, (DetailLevel, T)>,
}

impl<T> Default for EntityCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Clone> EntityCache<T> {
    /// Returns the entry if it was cached at `level` or richer. A poorer
    /// entry is removed.
    pub fn get(&mut self, id: i64, level: DetailLevel) -> Option<T> {
        match self.entries.get(&id) {
            Some((cached_level, value)) if *cached_level >= level => Some(value.clone()),
            Some(_) => {
                self.entries.remove(&id);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, id: i64, level: DetailLevel, value: T) {
        self.entries.insert(id, (level, value));
    }

    pub fn remove(&mut self, id: i64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Composite key of a thumbnail lookup that falls back across related
/// entities (song, then album, then artist, then playlist).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ThumbKey {
    pub song_id: Option<i64>,
    pub album_id: Option<i64>,
    pub artist_id: Option<i64>,
    pub playlist_id: Option<i64>,
    /// Only consider the primary artist when falling back to artist art.
    pub primary_only: bool,
}

#[derive(Default)]
struct CacheMaps {
    artists: EntityCache<Artist>,
    albums: EntityCache<Album>,
    songs: EntityCache<Song>,
    art_slots: HashMap<(i64, MediaType, String), String>,
    art_maps: HashMap<(i64, MediaType), ArtMap>,
    thumbs: HashMap<ThumbKey, Option<String>>,
}

pub struct ResultCache {
    enabled: bool,
    maps: Mutex<CacheMaps>,
    localized: LocalizedStringCache,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ResultCache {
    /// A disabled cache accepts inserts but never returns anything.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            maps: Mutex::new(CacheMaps::default()),
            localized: LocalizedStringCache::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn maps(&self) -> MutexGuard<'_, CacheMaps> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Entities
    // =========================================================================

    pub fn get_artist(&self, id: i64, level: DetailLevel) -> Option<Artist> {
        if !self.enabled {
            return None;
        }
        self.maps().artists.get(id, level)
    }

    pub fn put_artist(&self, artist: &Artist, level: DetailLevel) {
        if self.enabled {
            self.maps().artists.insert(artist.id, level, artist.clone());
        }
    }

    pub fn remove_artist(&self, id: i64) {
        self.maps().artists.remove(id);
    }

    pub fn get_album(&self, id: i64, level: DetailLevel) -> Option<Album> {
        if !self.enabled {
            return None;
        }
        self.maps().albums.get(id, level)
    }

    pub fn put_album(&self, album: &Album, level: DetailLevel) {
        if self.enabled {
            self.maps().albums.insert(album.id, level, album.clone());
        }
    }

    pub fn remove_album(&self, id: i64) {
        self.maps().albums.remove(id);
    }

    pub fn get_song(&self, id: i64, level: DetailLevel) -> Option<Song> {
        if !self.enabled {
            return None;
        }
        self.maps().songs.get(id, level)
    }

    pub fn put_song(&self, song: &Song, level: DetailLevel) {
        if self.enabled {
            self.maps().songs.insert(song.id, level, song.clone());
        }
    }

    pub fn remove_song(&self, id: i64) {
        self.maps().songs.remove(id);
    }

    /// Drops a song together with its owning album, whose aggregate embeds it.
    pub fn remove_song_and_album(&self, song_id: i64, album_id: i64) {
        let mut maps = self.maps();
        maps.songs.remove(song_id);
        maps.albums.remove(album_id);
    }

    pub fn clear_songs(&self) {
        self.maps().songs.clear();
    }

    pub fn clear_albums(&self) {
        self.maps().albums.clear();
    }

    // =========================================================================
    // Artwork
    // =========================================================================

    pub fn get_art(&self, media_id: i64, media_type: MediaType, slot: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        self.maps()
            .art_slots
            .get(&(media_id, media_type, slot.to_string()))
            .cloned()
    }

    pub fn put_art(&self, media_id: i64, media_type: MediaType, slot: &str, url: &str) {
        if self.enabled {
            self.maps()
                .art_slots
                .insert((media_id, media_type, slot.to_string()), url.to_string());
        }
    }

    pub fn get_art_map(&self, media_id: i64, media_type: MediaType) -> Option<ArtMap> {
        if !self.enabled {
            return None;
        }
        self.maps().art_maps.get(&(media_id, media_type)).cloned()
    }

    pub fn put_art_map(&self, media_id: i64, media_type: MediaType, art: &ArtMap) {
        if self.enabled {
            self.maps()
                .art_maps
                .insert((media_id, media_type), art.clone());
        }
    }

    /// `Some(None)` records that the lookup found nothing.
    pub fn get_thumb(&self, key: &ThumbKey) -> Option<Option<String>> {
        if !self.enabled {
            return None;
        }
        self.maps().thumbs.get(key).cloned()
    }

    pub fn put_thumb(&self, key: ThumbKey, url: Option<String>) {
        if self.enabled {
            self.maps().thumbs.insert(key, url);
        }
    }

    /// Removes every art entry that may depend on the given entity. Thumb
    /// lookups fall back across entities, so all of them are dropped.
    pub fn invalidate_art(&self, media_id: i64, media_type: MediaType) {
        let mut maps = self.maps();
        maps.art_slots
            .retain(|(id, kind, _), _| !(*id == media_id && *kind == media_type));
        maps.art_maps.remove(&(media_id, media_type));
        maps.thumbs.clear();
        match media_type {
            MediaType::Artist => {
                maps.artists.remove(media_id);
            }
            MediaType::Album => {
                maps.albums.remove(media_id);
            }
            MediaType::Song | MediaType::Playlist => {}
        }
    }

    // =========================================================================
    // Localized strings
    // =========================================================================

    pub fn localized(&self) -> &LocalizedStringCache {
        &self.localized
    }

    /// Drops everything except localized strings.
    pub fn clear(&self) {
        let mut maps = self.maps();
        *maps = CacheMaps::default();
    }

    pub fn len(&self) -> usize {
        let maps = self.maps();
        maps.artists.len()
            + maps.albums.len()
            + maps.songs.len()
            + maps.art_slots.len()
            + maps.art_maps.len()
            + maps.thumbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
