//! Translation of a browse request into a predicate, a sort order and a
//! page window.
//!
//! Precedence, outermost first:
//!
//! 1. A primary rule set of the requested kind is the base predicate. Its
//!    sort replaces the requested one and its limit caps the matched rows
//!    before any further narrowing. A rule set of another kind is ignored.
//! 2. Option discriminators (genre, album, song, source, year,
//!    compilation) narrow the base.
//! 3. Artist, role and album-artists-only combine through
//!    [`combine_credits`].
//! 4. A secondary filter rule set of the requested kind is applied last;
//!    one of another kind is dropped.

use super::options::{BrowseOptions, EntityKind, IdOrName, Page, RoleFilter, SortField, SortSpec};
use super::predicate::{escape_like, Predicate};
use super::rules::RuleSet;
use crate::library_store::PRIMARY_ROLE_ID;
use rusqlite::types::Value;
use tracing::debug;

const ARTISTS_OF_CREDIT: &str =
    "artist_credit JOIN artist ON artist.artist_id = artist_credit.artist_id";
const GENRES_OF_SONG: &str = "song_genre JOIN genre ON genre.genre_id = song_genre.genre_id";
const SOURCES_OF_ALBUM: &str = "album_source JOIN source ON source.source_id = album_source.source_id";

/// Combines the song-credit predicate `song_credit` (already narrowed by
/// role) with the album-credit predicate `album_credit`.
///
/// | album artists only | contributor role | result    |
/// |--------------------|------------------|-----------|
/// | yes                | yes              | C AND A   |
/// | yes                | no               | A         |
/// | no                 | yes              | C         |
/// | no                 | no               | C OR A    |
///
/// "Contributor role" means a specific role other than the primary one. An
/// artist shows up as a song contributor, an album artist or both unless
/// the request narrows it explicitly.
pub fn combine_credits(
    song_credit: Predicate,
    album_credit: Predicate,
    role: &RoleFilter,
    album_artists_only: bool,
) -> Predicate {
    match (album_artists_only, role.is_non_default()) {
        (true, true) => song_credit.and(album_credit),
        (true, false) => album_credit,
        (false, true) => song_credit,
        (false, false) => song_credit.or(album_credit),
    }
}

fn role_predicate(role: &RoleFilter) -> Predicate {
    match role {
        RoleFilter::Default => Predicate::eq("artist_credit.role_id", PRIMARY_ROLE_ID),
        RoleFilter::Id(id) => Predicate::eq("artist_credit.role_id", *id),
        RoleFilter::Name(name) => Predicate::in_select(
            "artist_credit.role_id",
            "SELECT role_id FROM role WHERE name = ? COLLATE NOCASE",
            vec![Value::Text(name.clone())],
        ),
        RoleFilter::All => Predicate::Always,
    }
}

/// Matches `id_column` against an id or `name_column` against a name,
/// case-insensitively.
fn id_or_name(value: &IdOrName, id_column: &str, name_column: &str) -> Predicate {
    match value {
        IdOrName::Id(id) => Predicate::eq(id_column, *id),
        IdOrName::Name(name) => Predicate::like(name_column, escape_like(name)),
    }
}

/// Column names of the rows a set of option filters is evaluated against.
struct Scope {
    album_id: &'static str,
    album_title: &'static str,
    compilation: &'static str,
    year: &'static str,
    /// Song id and title columns, when a song row is in scope.
    song: Option<(&'static str, &'static str)>,
}

const SONG_VIEW_SCOPE: Scope = Scope {
    album_id: "song_view.album_id",
    album_title: "song_view.album_title",
    compilation: "song_view.compilation",
    year: "song_view.year",
    song: Some(("song_view.song_id", "song_view.title")),
};

const ALBUM_VIEW_SCOPE: Scope = Scope {
    album_id: "album_view.album_id",
    album_title: "album_view.title",
    compilation: "album_view.compilation",
    year: "album_view.year",
    song: None,
};

/// Rows of `song JOIN album`.
const SONG_TABLE_SCOPE: Scope = Scope {
    album_id: "album.album_id",
    album_title: "album.title",
    compilation: "album.compilation",
    year: "song.year",
    song: Some(("song.song_id", "song.title")),
};

/// Rows of `album`.
const ALBUM_TABLE_SCOPE: Scope = Scope {
    album_id: "album.album_id",
    album_title: "album.title",
    compilation: "album.compilation",
    year: "album.year",
    song: None,
};

impl Scope {
    fn genre(&self, genre: &IdOrName) -> Predicate {
        let matched = id_or_name(genre, "genre.genre_id", "genre.name");
        match self.song {
            Some((song_id, _)) => Predicate::exists(
                GENRES_OF_SONG,
                format!("song_genre.song_id = {}", song_id),
                matched,
            ),
            // An album has a genre when one of its songs does
            None => Predicate::exists(
                "song AS genre_song JOIN song_genre ON song_genre.song_id = genre_song.song_id \
                 JOIN genre ON genre.genre_id = song_genre.genre_id",
                format!("genre_song.album_id = {}", self.album_id),
                matched,
            ),
        }
    }

    fn song(&self, song: &IdOrName) -> Predicate {
        match self.song {
            Some((song_id, title)) => id_or_name(song, song_id, title),
            None => Predicate::exists(
                "song AS owned_song",
                format!("owned_song.album_id = {}", self.album_id),
                id_or_name(song, "owned_song.song_id", "owned_song.title"),
            ),
        }
    }

    fn source(&self, source: &IdOrName) -> Predicate {
        Predicate::exists(
            SOURCES_OF_ALBUM,
            format!("album_source.album_id = {}", self.album_id),
            id_or_name(source, "source.source_id", "source.name"),
        )
    }

    /// Every discriminator except artist and role.
    fn filters(&self, options: &BrowseOptions) -> Predicate {
        let mut predicate = Predicate::Always;
        if let Some(genre) = &options.genre {
            predicate = predicate.and(self.genre(genre));
        }
        if let Some(album) = &options.album {
            predicate = predicate.and(id_or_name(album, self.album_id, self.album_title));
        }
        if let Some(song) = &options.song {
            predicate = predicate.and(self.song(song));
        }
        if let Some(source) = &options.source {
            predicate = predicate.and(self.source(source));
        }
        if let Some(year) = options.year {
            predicate = predicate.and(Predicate::eq(self.year, year as i64));
        }
        if let Some(compilation) = options.compilation {
            predicate = predicate.and(Predicate::eq(self.compilation, compilation as i64));
        }
        predicate
    }

    /// Artist discriminator for song and album listings.
    fn artist(&self, artist: &IdOrName, options: &BrowseOptions) -> Predicate {
        let matched = id_or_name(artist, "artist_credit.artist_id", "artist.name");
        let song_credit = match self.song {
            Some((song_id, _)) => Predicate::exists(
                ARTISTS_OF_CREDIT,
                format!(
                    "artist_credit.owner_kind = 'song' AND artist_credit.owner_id = {}",
                    song_id
                ),
                matched.clone().and(role_predicate(&options.role)),
            ),
            None => Predicate::exists(
                "song AS credited_song JOIN artist_credit ON artist_credit.owner_kind = 'song' \
                 AND artist_credit.owner_id = credited_song.song_id \
                 JOIN artist ON artist.artist_id = artist_credit.artist_id",
                format!("credited_song.album_id = {}", self.album_id),
                matched.clone().and(role_predicate(&options.role)),
            ),
        };
        let album_credit = Predicate::exists(
            ARTISTS_OF_CREDIT,
            format!(
                "artist_credit.owner_kind = 'album' AND artist_credit.owner_id = {}",
                self.album_id
            ),
            matched,
        );
        combine_credits(
            song_credit,
            album_credit,
            &options.role,
            options.album_artists_only,
        )
    }
}

fn has_song_filters(options: &BrowseOptions) -> bool {
    options.genre.is_some()
        || options.album.is_some()
        || options.song.is_some()
        || options.source.is_some()
        || options.year.is_some()
        || options.compilation.is_some()
}

// =============================================================================
// Per-kind translation
// =============================================================================

fn songs_predicate(options: &BrowseOptions) -> Predicate {
    let mut predicate = SONG_VIEW_SCOPE.filters(options);
    if let Some(artist) = &options.artist {
        predicate = predicate.and(SONG_VIEW_SCOPE.artist(artist, options));
    }
    predicate
}

fn albums_predicate(options: &BrowseOptions) -> Predicate {
    let mut predicate = ALBUM_VIEW_SCOPE.filters(options);
    if let Some(artist) = &options.artist {
        predicate = predicate.and(ALBUM_VIEW_SCOPE.artist(artist, options));
    }
    predicate
}

/// Artists are listed through their credits: song credits in the requested
/// role, and album credits.
fn artists_predicate(options: &BrowseOptions) -> Predicate {
    let song_credit = Predicate::exists(
        "artist_credit JOIN song ON artist_credit.owner_kind = 'song' \
         AND song.song_id = artist_credit.owner_id \
         JOIN album ON album.album_id = song.album_id",
        "artist_credit.artist_id = artist_view.artist_id",
        role_predicate(&options.role).and(SONG_TABLE_SCOPE.filters(options)),
    );
    let album_credit = Predicate::exists(
        "artist_credit JOIN album ON artist_credit.owner_kind = 'album' \
         AND album.album_id = artist_credit.owner_id",
        "artist_credit.artist_id = artist_view.artist_id",
        ALBUM_TABLE_SCOPE.filters(options),
    );
    let mut predicate = combine_credits(
        song_credit,
        album_credit,
        &options.role,
        options.album_artists_only,
    );
    if let Some(artist) = &options.artist {
        predicate = predicate.and(id_or_name(
            artist,
            "artist_view.artist_id",
            "artist_view.name",
        ));
    }
    predicate
}

fn genres_predicate(options: &BrowseOptions) -> Predicate {
    let mut predicate = match &options.genre {
        Some(genre) => id_or_name(genre, "genre.genre_id", "genre.name"),
        None => Predicate::Always,
    };
    let narrowed = BrowseOptions {
        genre: None,
        ..options.clone()
    };
    if has_song_filters(&narrowed) || narrowed.artist.is_some() {
        let mut songs = SONG_TABLE_SCOPE.filters(&narrowed);
        if let Some(artist) = &narrowed.artist {
            songs = songs.and(SONG_TABLE_SCOPE.artist(artist, &narrowed));
        }
        predicate = predicate.and(Predicate::exists(
            "song_genre AS listed_genre JOIN song ON song.song_id = listed_genre.song_id \
             JOIN album ON album.album_id = song.album_id",
            "listed_genre.genre_id = genre.genre_id",
            songs,
        ));
    }
    predicate
}

fn playlists_predicate(options: &BrowseOptions) -> Predicate {
    match &options.playlist {
        Some(playlist) => id_or_name(playlist, "playlist.playlist_id", "playlist.name"),
        None => Predicate::Always,
    }
}

// =============================================================================
// Sorting
// =============================================================================

fn default_sort(kind: EntityKind) -> SortSpec {
    match kind {
        EntityKind::Songs | EntityKind::Albums => SortSpec::ascending(SortField::Title),
        _ => SortSpec::ascending(SortField::Name),
    }
}

/// Sort expression and whether it is text, for fields that apply to `kind`.
fn sort_column(kind: EntityKind, field: SortField) -> Option<(&'static str, bool)> {
    if field == SortField::Random {
        return Some(("RANDOM()", false));
    }
    if field == SortField::Id {
        return Some((kind.id_column(), false));
    }
    let column = match (kind, field) {
        (EntityKind::Songs, SortField::Name | SortField::Title) => ("song_view.title", true),
        (EntityKind::Songs, SortField::Artist) => (
            "COALESCE(song_view.artist_sort, song_view.artist_display)",
            true,
        ),
        (EntityKind::Songs, SortField::Album) => ("song_view.album_title", true),
        (EntityKind::Songs, SortField::Year) => ("song_view.year", false),
        (EntityKind::Songs, SortField::Track) => ("song_view.track", false),
        (EntityKind::Songs, SortField::DateAdded) => ("song_view.date_added", false),
        (EntityKind::Songs, SortField::PlayCount) => ("song_view.play_count", false),
        (EntityKind::Songs, SortField::LastPlayed) => ("song_view.last_played", false),
        (EntityKind::Songs, SortField::Rating) => ("song_view.rating", false),

        (EntityKind::Albums, SortField::Name | SortField::Title | SortField::Album) => {
            ("album_view.title", true)
        }
        (EntityKind::Albums, SortField::Artist) => (
            "COALESCE(album_view.artist_sort, album_view.artist_display)",
            true,
        ),
        (EntityKind::Albums, SortField::Year) => ("album_view.year", false),
        (EntityKind::Albums, SortField::DateAdded) => ("album_view.date_added", false),
        (EntityKind::Albums, SortField::PlayCount) => ("album_view.play_count", false),
        (EntityKind::Albums, SortField::LastPlayed) => ("album_view.last_played", false),
        (EntityKind::Albums, SortField::Rating) => ("album_view.rating", false),

        (EntityKind::Artists, SortField::Name | SortField::Title | SortField::Artist) => (
            "COALESCE(artist_view.sort_name, artist_view.name)",
            true,
        ),

        (EntityKind::Genres, SortField::Name | SortField::Title) => ("genre.name", true),

        (EntityKind::Playlists, SortField::Name | SortField::Title) => ("playlist.name", true),
        (EntityKind::Playlists, SortField::DateAdded) => ("playlist.updated_at", false),

        _ => return None,
    };
    Some(column)
}

fn order_by(kind: EntityKind, sort: SortSpec) -> String {
    let (column, is_text) = sort_column(kind, sort.field)
        .or_else(|| sort_column(kind, default_sort(kind).field))
        .unwrap_or((kind.id_column(), false));
    format!(
        "{}{} {}, {} ASC",
        column,
        if is_text { " COLLATE NOCASE" } else { "" },
        if sort.descending { "DESC" } else { "ASC" },
        kind.id_column()
    )
}

// =============================================================================
// Builder
// =============================================================================

/// A built browse query. The same predicate renders both the page of rows
/// and the total count, since the count cannot be recovered from a limited
/// result.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    pub kind: EntityKind,
    pub predicate: Predicate,
    pub sort: SortSpec,
    pub page: Option<Page>,
}

impl QueryPlan {
    /// `SELECT id, label` for one page, in sort order.
    pub fn rows_sql(&self) -> (String, Vec<Value>) {
        let (filter, mut params) = self.predicate.to_sql();
        let mut sql = format!(
            "SELECT {}, {} FROM {} WHERE {} ORDER BY {}",
            self.kind.id_column(),
            label_column(self.kind),
            self.kind.table(),
            filter,
            order_by(self.kind, self.sort)
        );
        if let Some(page) = self.page {
            sql.push_str(" LIMIT ? OFFSET ?");
            // SQLite treats a negative limit as no limit
            let limit = if page.limit == 0 { -1 } else { page.limit as i64 };
            params.push(Value::Integer(limit));
            params.push(Value::Integer(page.offset as i64));
        }
        (sql, params)
    }

    pub fn count_sql(&self) -> (String, Vec<Value>) {
        let (filter, params) = self.predicate.to_sql();
        (
            format!("SELECT COUNT(*) FROM {} WHERE {}", self.kind.table(), filter),
            params,
        )
    }
}

/// Display label column of a kind's listing.
pub(crate) fn label_column(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Artists => "artist_view.name",
        EntityKind::Albums => "album_view.title",
        EntityKind::Songs => "song_view.title",
        EntityKind::Genres => "genre.name",
        EntityKind::Playlists => "playlist.name",
    }
}

pub struct QueryBuilder {
    kind: EntityKind,
    playlist_rules: Option<RuleSet>,
}

impl QueryBuilder {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            playlist_rules: None,
        }
    }

    /// Rules of the playlist named by the options, used as the primary rule
    /// set when the options carry none of their own.
    pub fn with_playlist_rules(mut self, rules: Option<RuleSet>) -> Self {
        self.playlist_rules = rules;
        self
    }

    pub fn build(&self, options: &BrowseOptions) -> QueryPlan {
        let kind = self.kind;
        let mut sort = options.sort.unwrap_or_else(|| default_sort(kind));

        let primary = options.rules.as_ref().or(self.playlist_rules.as_ref());
        let mut predicate = match primary {
            Some(rules) if rules.kind == kind => {
                if let Some(rules_sort) = rules.sort {
                    sort = rules_sort;
                }
                match rules.limit {
                    Some(limit) => limited_rules(kind, rules, sort, limit),
                    None => rules.predicate(),
                }
            }
            Some(rules) => {
                debug!("Ignoring {} rule set for {} listing", rules.kind, kind);
                Predicate::Always
            }
            None => Predicate::Always,
        };

        predicate = predicate.and(match kind {
            EntityKind::Songs => songs_predicate(options),
            EntityKind::Albums => albums_predicate(options),
            EntityKind::Artists => artists_predicate(options),
            EntityKind::Genres => genres_predicate(options),
            // Playlist options on other kinds select rules, not rows
            EntityKind::Playlists => playlists_predicate(options),
        });

        match &options.filter {
            Some(filter) if filter.kind == kind => predicate = predicate.and(filter.predicate()),
            Some(filter) => debug!("Dropping {} filter for {} listing", filter.kind, kind),
            None => {}
        }

        QueryPlan {
            kind,
            predicate,
            sort,
            page: options.page,
        }
    }
}

/// Restricts to the first `limit` rows matched by `rules` in `sort` order.
fn limited_rules(kind: EntityKind, rules: &RuleSet, sort: SortSpec, limit: u64) -> Predicate {
    let (filter, params) = rules.predicate().to_sql();
    let select = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT {}",
        kind.id_column(),
        kind.table(),
        filter,
        order_by(kind, sort),
        limit
    );
    Predicate::in_select(kind.id_column(), select, params)
}
