//! Entity models for the SQLite-backed music library.
//!
//! Ids are SQLite integer rowids. Aggregates are plain owned values; the
//! repository decides how much of them is populated based on the requested
//! [`DetailLevel`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Well-known rows
// =============================================================================

/// The artist linked to songs and albums that carry no artist tag.
pub const SENTINEL_ARTIST_ID: i64 = 1;
pub const SENTINEL_ARTIST_NAME: &str = "[Missing Tag]";
/// Never produced by a tagger, so no real artist can collide with it.
pub const SENTINEL_ARTIST_MBID: &str = "Artist Tag Missing";

/// The primary contribution role.
pub const PRIMARY_ROLE_ID: i64 = 1;
pub const PRIMARY_ROLE_NAME: &str = "artist";

/// Art maps are keyed by slot name ("thumb", "fanart", ...).
pub type ArtMap = BTreeMap<String, String>;

// =============================================================================
// Enumerations
// =============================================================================

/// What an artist credit is attached to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum OwnerKind {
    Song,
    Album,
}

impl OwnerKind {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OwnerKind::Song => "song",
            OwnerKind::Album => "album",
        }
    }
}

/// Entity kinds that can own artwork.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Artist,
    Album,
    Song,
    Playlist,
}

impl MediaType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            MediaType::Artist => "artist",
            MediaType::Album => "album",
            MediaType::Song => "song",
            MediaType::Playlist => "playlist",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "artist" => Some(MediaType::Artist),
            "album" => Some(MediaType::Album),
            "song" => Some(MediaType::Song),
            "playlist" => Some(MediaType::Playlist),
            _ => None,
        }
    }
}

/// Release classification of an album.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ReleaseType {
    #[default]
    Album,
    Single,
    Other(String),
}

impl ReleaseType {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "album" => ReleaseType::Album,
            "single" => ReleaseType::Single,
            other => ReleaseType::Other(other.to_string()),
        }
    }

    pub fn to_db_str(&self) -> &str {
        match self {
            ReleaseType::Album => "album",
            ReleaseType::Single => "single",
            ReleaseType::Other(s) => s.as_str(),
        }
    }
}

/// How the "date added" of a file is derived from the filesystem.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DateAddedPolicy {
    #[default]
    Modified,
    NewestOfModifiedAndCreated,
    Now,
}

impl DateAddedPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mtime" | "modified" => Some(DateAddedPolicy::Modified),
            "newest" => Some(DateAddedPolicy::NewestOfModifiedAndCreated),
            "now" => Some(DateAddedPolicy::Now),
            _ => None,
        }
    }
}

/// Minimum richness of an aggregate read. Levels are ordered, so a cached
/// `Full` value satisfies a `Basic` request but not the other way around.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum DetailLevel {
    Basic = 1,
    Full = 2,
}

// =============================================================================
// Registry records
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct FileRecord {
    pub id: i64,
    pub path_id: i64,
    pub path: String,
    pub filename: String,
    pub play_count: i64,
    pub last_played: Option<String>,
    pub date_added: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

// =============================================================================
// Artists
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistDetail {
    pub born: Option<String>,
    pub formed: Option<String>,
    pub died: Option<String>,
    pub disbanded: Option<String>,
    pub years_active: Option<String>,
    pub genres: Option<String>,
    pub moods: Option<String>,
    pub styles: Option<String>,
    pub instruments: Option<String>,
    pub biography: Option<String>,
    pub disambiguation: Option<String>,
    pub artist_type: Option<String>,
    pub gender: Option<String>,
    pub last_scraped: Option<String>,
    pub mbid_confirmed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscographyEntry {
    pub title: String,
    pub year: Option<i32>,
    pub release_group_mbid: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    /// `None` means the display name is also the sort name.
    pub sort_name: Option<String>,
    pub mbid: Option<String>,
    /// Populated at [`DetailLevel::Full`].
    pub detail: Option<ArtistDetail>,
    pub discography: Vec<DiscographyEntry>,
    pub art: ArtMap,
}

impl Artist {
    pub fn is_sentinel(&self) -> bool {
        self.id == SENTINEL_ARTIST_ID
    }

    pub fn sort_key(&self) -> &str {
        self.sort_name.as_deref().unwrap_or(&self.name)
    }
}

/// Input to artist matching.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArtistCandidate {
    pub name: String,
    pub mbid: Option<String>,
}

/// Full replacement set for [`crate::library_store::SqliteLibraryStore::update_artist`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistUpdate {
    pub sort_name: Option<String>,
    pub detail: ArtistDetail,
    pub discography: Vec<DiscographyEntry>,
    pub art: ArtMap,
}

/// A resolved artist credit as read back from the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistCredit {
    pub artist_id: i64,
    pub name: String,
    pub mbid: Option<String>,
    /// Credit-specific sort name, falling back to the artist's own.
    pub sort_name: Option<String>,
    pub role_id: i64,
    pub role: String,
    pub ordinal: i64,
}

/// A credit as supplied by a scanner or an import: artists are referenced
/// by name and identifier, never by id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditInput {
    pub name: String,
    pub mbid: Option<String>,
    pub sort_name: Option<String>,
    /// `None` is the primary role.
    pub role: Option<String>,
}

impl CreditInput {
    pub fn artist(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_mbid(mut self, mbid: &str) -> Self {
        self.mbid = Some(mbid.to_string());
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }
}

impl From<&ArtistCredit> for CreditInput {
    fn from(credit: &ArtistCredit) -> Self {
        Self {
            name: credit.name.clone(),
            mbid: credit.mbid.clone(),
            sort_name: credit.sort_name.clone(),
            role: if credit.role_id == PRIMARY_ROLE_ID {
                None
            } else {
                Some(credit.role.clone())
            },
        }
    }
}

// =============================================================================
// Albums
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Album {
    pub id: i64,
    pub title: String,
    pub mbid: Option<String>,
    pub release_group_mbid: Option<String>,
    pub artist_display: String,
    pub artist_sort: Option<String>,
    pub genre_display: String,
    pub genres: Vec<Genre>,
    pub year: Option<i32>,
    pub compilation: bool,
    pub release_type: ReleaseType,
    pub label: Option<String>,
    pub album_type: Option<String>,
    pub moods: Option<String>,
    pub styles: Option<String>,
    pub themes: Option<String>,
    pub review: Option<String>,
    pub rating: f64,
    pub votes: i64,
    pub user_rating: i64,
    pub last_scraped: Option<String>,
    pub date_added: Option<String>,
    pub credits: Vec<ArtistCredit>,
    pub art: ArtMap,
    /// Populated only when songs were requested.
    pub songs: Vec<Song>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewAlbum {
    pub title: String,
    pub mbid: Option<String>,
    pub release_group_mbid: Option<String>,
    pub artist_display: String,
    pub artist_sort: Option<String>,
    pub genre_display: String,
    pub year: Option<i32>,
    pub label: Option<String>,
    pub album_type: Option<String>,
    pub compilation: bool,
    pub release_type: ReleaseType,
    pub credits: Vec<CreditInput>,
}

// =============================================================================
// Songs
// =============================================================================

/// Packs a disc and a track number into the single track position column.
pub fn track_position(disc: i64, track: i64) -> i64 {
    (disc << 16) | (track & 0xFFFF)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Song {
    pub id: i64,
    pub album_id: i64,
    pub album_title: String,
    pub title: String,
    pub track: i64,
    pub duration: i64,
    pub year: Option<i32>,
    pub file_id: i64,
    pub path: String,
    pub filename: String,
    pub mbid: Option<String>,
    pub artist_display: String,
    pub artist_sort: Option<String>,
    pub genre_display: String,
    pub comment: Option<String>,
    pub mood: Option<String>,
    pub start_offset: i64,
    pub end_offset: i64,
    pub replay_gain: Option<String>,
    pub rating: f64,
    pub votes: i64,
    pub user_rating: i64,
    pub play_count: i64,
    pub last_played: Option<String>,
    pub date_added: Option<String>,
    /// Populated at [`DetailLevel::Full`].
    pub genres: Vec<Genre>,
    /// Populated at [`DetailLevel::Full`].
    pub credits: Vec<ArtistCredit>,
}

impl Song {
    pub fn disc_number(&self) -> i64 {
        self.track >> 16
    }

    pub fn track_number(&self) -> i64 {
        self.track & 0xFFFF
    }

    pub fn full_path(&self) -> String {
        format!("{}{}", self.path, self.filename)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewSong {
    pub album_id: i64,
    pub title: String,
    pub mbid: Option<String>,
    /// Full path of the audio file, folder and file name.
    pub path: String,
    pub comment: Option<String>,
    pub mood: Option<String>,
    pub artist_display: String,
    pub artist_sort: Option<String>,
    pub genres: Vec<String>,
    /// See [`track_position`].
    pub track: i64,
    pub duration: i64,
    pub year: Option<i32>,
    pub play_count: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub last_played: Option<String>,
    pub rating: f64,
    pub user_rating: i64,
    pub votes: i64,
    pub replay_gain: Option<String>,
    pub credits: Vec<CreditInput>,
}

// =============================================================================
// Sources and playlists
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub multipath: String,
    pub paths: Vec<String>,
}

/// A source as configured outside the library, compared by [`check_sources`].
///
/// [`check_sources`]: crate::library_store::SqliteLibraryStore::check_sources
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaSource {
    pub name: String,
    pub paths: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub rules: crate::query::RuleSet,
    pub updated_at: Option<String>,
    pub art: ArtMap,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagScanState {
    /// Schema version that asked for a rescan, if one is still pending.
    pub needs_scan: Option<usize>,
    pub last_scan: Option<String>,
    pub artist_links_updated: Option<String>,
    pub genres_updated: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_position_packs_disc_and_track() {
        let song = Song {
            track: track_position(2, 7),
            ..Default::default()
        };
        assert_eq!(song.disc_number(), 2);
        assert_eq!(song.track_number(), 7);
        assert_eq!(track_position(0, 3), 3);
    }

    #[test]
    fn test_release_type_db_strings() {
        assert_eq!(ReleaseType::from_db_str("single"), ReleaseType::Single);
        assert_eq!(
            ReleaseType::from_db_str("ep"),
            ReleaseType::Other("ep".to_string())
        );
        assert_eq!(ReleaseType::Other("ep".to_string()).to_db_str(), "ep");
    }

    #[test]
    fn test_detail_levels_are_ordered() {
        assert!(DetailLevel::Full > DetailLevel::Basic);
    }
}
