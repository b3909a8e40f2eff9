//! The option bag accepted by browse queries.

use super::rules::RuleSet;
use crate::library_store::{PRIMARY_ROLE_ID, PRIMARY_ROLE_NAME};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Artists,
    Albums,
    Songs,
    Genres,
    Playlists,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Artists => "artists",
            EntityKind::Albums => "albums",
            EntityKind::Songs => "songs",
            EntityKind::Genres => "genres",
            EntityKind::Playlists => "playlists",
        }
    }

    /// Table or view a listing of this kind reads from.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Artists => "artist_view",
            EntityKind::Albums => "album_view",
            EntityKind::Songs => "song_view",
            EntityKind::Genres => "genre",
            EntityKind::Playlists => "playlist",
        }
    }

    /// Qualified id column of [`Self::table`].
    pub fn id_column(&self) -> &'static str {
        match self {
            EntityKind::Artists => "artist_view.artist_id",
            EntityKind::Albums => "album_view.album_id",
            EntityKind::Songs => "song_view.song_id",
            EntityKind::Genres => "genre.genre_id",
            EntityKind::Playlists => "playlist.playlist_id",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "artists" | "artist" => Ok(EntityKind::Artists),
            "albums" | "album" => Ok(EntityKind::Albums),
            "songs" | "song" => Ok(EntityKind::Songs),
            "genres" | "genre" => Ok(EntityKind::Genres),
            "playlists" | "playlist" => Ok(EntityKind::Playlists),
            other => Err(format!("unknown entity kind: {}", other)),
        }
    }
}

/// A discriminator given either as a numeric id or as a name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdOrName {
    Id(i64),
    Name(String),
}

impl From<i64> for IdOrName {
    fn from(id: i64) -> Self {
        IdOrName::Id(id)
    }
}

impl From<&str> for IdOrName {
    fn from(name: &str) -> Self {
        IdOrName::Name(name.to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleFilter {
    /// The primary "artist" role.
    #[default]
    Default,
    Id(i64),
    Name(String),
    /// Every role, primary included.
    All,
}

impl RoleFilter {
    /// True for a specific contributor role other than the primary one.
    pub fn is_non_default(&self) -> bool {
        match self {
            RoleFilter::Default | RoleFilter::All => false,
            RoleFilter::Id(id) => *id != PRIMARY_ROLE_ID,
            RoleFilter::Name(name) => !name.eq_ignore_ascii_case(PRIMARY_ROLE_NAME),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    Title,
    Year,
    Artist,
    Album,
    Track,
    DateAdded,
    PlayCount,
    LastPlayed,
    Rating,
    Random,
    Id,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    #[serde(default)]
    pub descending: bool,
}

impl SortSpec {
    pub fn ascending(field: SortField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn descending(field: SortField) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

/// Everything a browse request can narrow by. Unset fields do not filter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowseOptions {
    pub genre: Option<IdOrName>,
    pub album: Option<IdOrName>,
    pub artist: Option<IdOrName>,
    pub song: Option<IdOrName>,
    pub source: Option<IdOrName>,
    /// A stored playlist whose rules become the primary rule set.
    pub playlist: Option<IdOrName>,
    pub role: RoleFilter,
    pub year: Option<i32>,
    pub compilation: Option<bool>,
    /// Artists listing only: keep artists credited on albums.
    pub album_artists_only: bool,
    /// Primary rule set, applied first when its kind matches.
    pub rules: Option<RuleSet>,
    /// Secondary rule set, applied last when its kind matches.
    pub filter: Option<RuleSet>,
    pub sort: Option<SortSpec>,
    pub page: Option<Page>,
}
