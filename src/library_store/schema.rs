//! SQLite schema definitions for the music library database.
//!
//! Every historical version is described in full so that an existing database
//! can be validated against the version it claims to be before it is
//! migrated. Table constants carry a `_V<n>` suffix up to the last version
//! that used that shape; the unsuffixed constant is the current shape.
//!
//! Artist credits point at either a song or an album, so their deletion is
//! driven by triggers rather than foreign keys. Views and triggers are not
//! part of the versioned tables: they are dropped before a migration and
//! rebuilt afterwards.

use crate::library_store::models::{
    PRIMARY_ROLE_ID, PRIMARY_ROLE_NAME, SENTINEL_ARTIST_ID, SENTINEL_ARTIST_MBID,
    SENTINEL_ARTIST_NAME,
};
use crate::sqlite_column;
use crate::sqlite_persistence::{
    column_exists, table_exists, Column, ForeignKey, ForeignKeyOnChange, SqlType, Table,
    VersionedSchema, DEFAULT_TIMESTAMP,
};
use anyhow::Result;
use rusqlite::{params, Connection};

// =============================================================================
// Foreign keys
// =============================================================================

const PATH_FK: ForeignKey = ForeignKey {
    foreign_table: "path",
    foreign_column: "path_id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artist",
    foreign_column: "artist_id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ALBUM_FK: ForeignKey = ForeignKey {
    foreign_table: "album",
    foreign_column: "album_id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const SONG_FK: ForeignKey = ForeignKey {
    foreign_table: "song",
    foreign_column: "song_id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const GENRE_FK: ForeignKey = ForeignKey {
    foreign_table: "genre",
    foreign_column: "genre_id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const SOURCE_FK: ForeignKey = ForeignKey {
    foreign_table: "source",
    foreign_column: "source_id",
    on_delete: ForeignKeyOnChange::Cascade,
};

// =============================================================================
// Path / File registry
// =============================================================================

const PATH_TABLE: Table = Table {
    name: "path",
    columns: &[
        sqlite_column!("path_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("path", &SqlType::Text, non_null = true), // always ends with a separator
        sqlite_column!("hash", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[&["path"]],
};

const FILE_TABLE_V4: Table = Table {
    name: "file",
    columns: &[
        sqlite_column!("file_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "path_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&PATH_FK)
        ),
        sqlite_column!("filename", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_file_path", "path_id")],
    unique_constraints: &[&["path_id", "filename"]],
};

/// Play statistics moved here from `song` in version 5.
const FILE_TABLE: Table = Table {
    name: "file",
    columns: &[
        sqlite_column!("file_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "path_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&PATH_FK)
        ),
        sqlite_column!("filename", &SqlType::Text, non_null = true),
        sqlite_column!(
            "play_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("last_played", &SqlType::Text),
        sqlite_column!("date_added", &SqlType::Text),
    ],
    indices: &[("idx_file_path", "path_id")],
    unique_constraints: &[&["path_id", "filename"]],
};

// =============================================================================
// Vocabulary
// =============================================================================

const GENRE_TABLE: Table = Table {
    name: "genre",
    columns: &[
        sqlite_column!("genre_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["name"]],
};

const ROLE_TABLE: Table = Table {
    name: "role",
    columns: &[
        sqlite_column!("role_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["name"]],
};

// =============================================================================
// Artists
// =============================================================================

const ARTIST_TABLE_V6: Table = Table {
    name: "artist",
    columns: &[
        sqlite_column!("artist_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("mbid", &SqlType::Text),
    ],
    indices: &[("idx_artist_name", "name")],
    unique_constraints: &[&["mbid"]],
};

const ARTIST_TABLE: Table = Table {
    name: "artist",
    columns: &[
        sqlite_column!("artist_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("mbid", &SqlType::Text),
        sqlite_column!("sort_name", &SqlType::Text),
    ],
    indices: &[("idx_artist_name", "name")],
    unique_constraints: &[&["mbid"]],
};

const ARTIST_INFO_TABLE_V6: Table = Table {
    name: "artist_info",
    columns: &[
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            is_primary_key = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("born", &SqlType::Text),
        sqlite_column!("formed", &SqlType::Text),
        sqlite_column!("died", &SqlType::Text),
        sqlite_column!("disbanded", &SqlType::Text),
        sqlite_column!("years_active", &SqlType::Text),
        sqlite_column!("genres", &SqlType::Text),
        sqlite_column!("moods", &SqlType::Text),
        sqlite_column!("styles", &SqlType::Text),
        sqlite_column!("instruments", &SqlType::Text),
        sqlite_column!("biography", &SqlType::Text),
        sqlite_column!("disambiguation", &SqlType::Text),
        sqlite_column!("artist_type", &SqlType::Text),
        sqlite_column!("gender", &SqlType::Text),
        sqlite_column!("last_scraped", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[],
};

const ARTIST_INFO_TABLE: Table = Table {
    name: "artist_info",
    columns: &[
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            is_primary_key = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("born", &SqlType::Text),
        sqlite_column!("formed", &SqlType::Text),
        sqlite_column!("died", &SqlType::Text),
        sqlite_column!("disbanded", &SqlType::Text),
        sqlite_column!("years_active", &SqlType::Text),
        sqlite_column!("genres", &SqlType::Text),
        sqlite_column!("moods", &SqlType::Text),
        sqlite_column!("styles", &SqlType::Text),
        sqlite_column!("instruments", &SqlType::Text),
        sqlite_column!("biography", &SqlType::Text),
        sqlite_column!("disambiguation", &SqlType::Text),
        sqlite_column!("artist_type", &SqlType::Text),
        sqlite_column!("gender", &SqlType::Text),
        sqlite_column!("last_scraped", &SqlType::Text),
        sqlite_column!(
            "mbid_confirmed",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

const DISCOGRAPHY_TABLE: Table = Table {
    name: "discography",
    columns: &[
        sqlite_column!("discography_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("release_group_mbid", &SqlType::Text),
    ],
    indices: &[("idx_discography_artist", "artist_id")],
    unique_constraints: &[],
};

// =============================================================================
// Albums and songs
// =============================================================================

const ALBUM_TABLE_V5: Table = Table {
    name: "album",
    columns: &[
        sqlite_column!("album_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("mbid", &SqlType::Text),
        sqlite_column!(
            "artist_display",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "genre_display",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!(
            "compilation",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("label", &SqlType::Text),
        sqlite_column!("album_type", &SqlType::Text),
        sqlite_column!("moods", &SqlType::Text),
        sqlite_column!("styles", &SqlType::Text),
        sqlite_column!("themes", &SqlType::Text),
        sqlite_column!("review", &SqlType::Text),
        sqlite_column!(
            "rating",
            &SqlType::Real,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "votes",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "user_rating",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("last_scraped", &SqlType::Text),
        sqlite_column!("date_added", &SqlType::Text),
    ],
    indices: &[("idx_album_title", "title"), ("idx_album_mbid", "mbid")],
    unique_constraints: &[],
};

const ALBUM_TABLE: Table = Table {
    name: "album",
    columns: &[
        sqlite_column!("album_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("mbid", &SqlType::Text),
        sqlite_column!(
            "artist_display",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "genre_display",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!(
            "compilation",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("label", &SqlType::Text),
        sqlite_column!("album_type", &SqlType::Text),
        sqlite_column!("moods", &SqlType::Text),
        sqlite_column!("styles", &SqlType::Text),
        sqlite_column!("themes", &SqlType::Text),
        sqlite_column!("review", &SqlType::Text),
        sqlite_column!(
            "rating",
            &SqlType::Real,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "votes",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "user_rating",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("last_scraped", &SqlType::Text),
        sqlite_column!("date_added", &SqlType::Text),
        sqlite_column!("release_group_mbid", &SqlType::Text),
        sqlite_column!(
            "release_type",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'album'")
        ),
        sqlite_column!("artist_sort", &SqlType::Text),
    ],
    indices: &[("idx_album_title", "title"), ("idx_album_mbid", "mbid")],
    unique_constraints: &[],
};

const SONG_TABLE_V4: Table = Table {
    name: "song",
    columns: &[
        sqlite_column!("song_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("album_id", &SqlType::Integer, non_null = true),
        sqlite_column!("file_id", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!(
            "track",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "duration",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("mbid", &SqlType::Text),
        sqlite_column!(
            "artist_display",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "genre_display",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!("comment", &SqlType::Text),
        sqlite_column!("mood", &SqlType::Text),
        sqlite_column!(
            "start_offset",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "end_offset",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "rating",
            &SqlType::Real,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "votes",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "user_rating",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "play_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("last_played", &SqlType::Text),
    ],
    indices: &[
        ("idx_song_album", "album_id"),
        ("idx_song_file", "file_id"),
        ("idx_song_mbid", "mbid"),
    ],
    unique_constraints: &[],
};

const SONG_TABLE_V5: Table = Table {
    name: "song",
    columns: &[
        sqlite_column!("song_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("album_id", &SqlType::Integer, non_null = true),
        sqlite_column!("file_id", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!(
            "track",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "duration",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("mbid", &SqlType::Text),
        sqlite_column!(
            "artist_display",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "genre_display",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!("comment", &SqlType::Text),
        sqlite_column!("mood", &SqlType::Text),
        sqlite_column!(
            "start_offset",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "end_offset",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "rating",
            &SqlType::Real,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "votes",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "user_rating",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        ("idx_song_album", "album_id"),
        ("idx_song_file", "file_id"),
        ("idx_song_mbid", "mbid"),
    ],
    unique_constraints: &[],
};

const SONG_TABLE: Table = Table {
    name: "song",
    columns: &[
        sqlite_column!("song_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("album_id", &SqlType::Integer, non_null = true),
        sqlite_column!("file_id", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!(
            "track",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "duration",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("mbid", &SqlType::Text),
        sqlite_column!(
            "artist_display",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "genre_display",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!("comment", &SqlType::Text),
        sqlite_column!("mood", &SqlType::Text),
        sqlite_column!(
            "start_offset",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "end_offset",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "rating",
            &SqlType::Real,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "votes",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "user_rating",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("artist_sort", &SqlType::Text),
        sqlite_column!("replay_gain", &SqlType::Text),
    ],
    indices: &[
        ("idx_song_album", "album_id"),
        ("idx_song_file", "file_id"),
        ("idx_song_mbid", "mbid"),
    ],
    unique_constraints: &[],
};

const SONG_GENRE_TABLE: Table = Table {
    name: "song_genre",
    columns: &[
        sqlite_column!(
            "song_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&SONG_FK)
        ),
        sqlite_column!(
            "genre_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&GENRE_FK)
        ),
        sqlite_column!(
            "ordinal",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[("idx_song_genre_genre", "genre_id")],
    unique_constraints: &[&["song_id", "genre_id"]],
};

const ALBUM_GENRE_TABLE: Table = Table {
    name: "album_genre",
    columns: &[
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_FK)
        ),
        sqlite_column!(
            "genre_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&GENRE_FK)
        ),
        sqlite_column!(
            "ordinal",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[("idx_album_genre_genre", "genre_id")],
    unique_constraints: &[&["album_id", "genre_id"]],
};

// =============================================================================
// Artist credits
// =============================================================================

const SONG_ARTIST_TABLE_V1: Table = Table {
    name: "song_artist",
    columns: &[
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true),
        sqlite_column!("song_id", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "ordinal",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[("idx_song_artist_song", "song_id")],
    unique_constraints: &[&["artist_id", "song_id"]],
};

const SONG_ARTIST_TABLE_V2: Table = Table {
    name: "song_artist",
    columns: &[
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true),
        sqlite_column!("song_id", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "ordinal",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "role_id",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
    ],
    indices: &[("idx_song_artist_song", "song_id")],
    unique_constraints: &[&["artist_id", "song_id"]],
};

const ALBUM_ARTIST_TABLE_V2: Table = Table {
    name: "album_artist",
    columns: &[
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true),
        sqlite_column!("album_id", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "ordinal",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[("idx_album_artist_album", "album_id")],
    unique_constraints: &[&["artist_id", "album_id"]],
};

/// One row per (artist, owner, role). `owner_kind` is 'song' or 'album'.
const ARTIST_CREDIT_TABLE: Table = Table {
    name: "artist_credit",
    columns: &[
        sqlite_column!("credit_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true),
        sqlite_column!("owner_id", &SqlType::Integer, non_null = true),
        sqlite_column!("owner_kind", &SqlType::Text, non_null = true),
        sqlite_column!(
            "role_id",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!(
            "ordinal",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("sort_name", &SqlType::Text),
    ],
    indices: &[
        ("idx_artist_credit_owner", "owner_kind, owner_id"),
        ("idx_artist_credit_artist", "artist_id"),
    ],
    unique_constraints: &[&["artist_id", "owner_id", "owner_kind", "role_id"]],
};

// =============================================================================
// Artwork, sources, playlists, bookkeeping
// =============================================================================

const ART_TABLE: Table = Table {
    name: "art",
    columns: &[
        sqlite_column!("art_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("media_id", &SqlType::Integer, non_null = true),
        sqlite_column!("media_type", &SqlType::Text, non_null = true),
        sqlite_column!("art_type", &SqlType::Text, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_art_media", "media_id, media_type")],
    unique_constraints: &[&["media_id", "media_type", "art_type"]],
};

const SOURCE_TABLE: Table = Table {
    name: "source",
    columns: &[
        sqlite_column!("source_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "multipath",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
    ],
    indices: &[],
    unique_constraints: &[&["name"]],
};

const SOURCE_PATH_TABLE: Table = Table {
    name: "source_path",
    columns: &[
        sqlite_column!(
            "source_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&SOURCE_FK)
        ),
        sqlite_column!("path", &SqlType::Text, non_null = true),
        sqlite_column!(
            "ordinal",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[],
    unique_constraints: &[&["source_id", "path"]],
};

const ALBUM_SOURCE_TABLE: Table = Table {
    name: "album_source",
    columns: &[
        sqlite_column!(
            "source_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&SOURCE_FK)
        ),
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_FK)
        ),
    ],
    indices: &[("idx_album_source_album", "album_id")],
    unique_constraints: &[&["source_id", "album_id"]],
};

const PLAYLIST_TABLE: Table = Table {
    name: "playlist",
    columns: &[
        sqlite_column!("playlist_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("rules", &SqlType::Text, non_null = true), // JSON rule set
        sqlite_column!("updated_at", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[&["name"]],
};

/// Single row (id = 1) recording whether a tag rescan is pending.
const VERSION_TAG_SCAN_TABLE: Table = Table {
    name: "version_tag_scan",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "needs_scan",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("last_scan", &SqlType::Text),
        sqlite_column!("artist_links_updated", &SqlType::Text),
        sqlite_column!("genres_updated", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[],
};

// =============================================================================
// Migrations
// =============================================================================

fn migrate_to_v2(conn: &Connection) -> Result<()> {
    ROLE_TABLE.create_if_missing(conn)?;
    SONG_ARTIST_TABLE_V2.add_column_if_missing(conn, "role_id")?;
    seed_primary_role(conn)
}

fn migrate_to_v3(conn: &Connection) -> Result<()> {
    ARTIST_CREDIT_TABLE.create_if_missing(conn)?;
    if table_exists(conn, "song_artist")? {
        conn.execute(
            "INSERT OR IGNORE INTO artist_credit (artist_id, owner_id, owner_kind, role_id, ordinal)
             SELECT artist_id, song_id, 'song', role_id, ordinal FROM song_artist",
            [],
        )?;
        conn.execute("DROP TABLE song_artist", [])?;
    }
    if table_exists(conn, "album_artist")? {
        conn.execute(
            "INSERT OR IGNORE INTO artist_credit (artist_id, owner_id, owner_kind, role_id, ordinal)
             SELECT artist_id, album_id, 'album', 1, ordinal FROM album_artist",
            [],
        )?;
        conn.execute("DROP TABLE album_artist", [])?;
    }
    Ok(())
}

fn migrate_to_v4(conn: &Connection) -> Result<()> {
    SOURCE_TABLE.create_if_missing(conn)?;
    SOURCE_PATH_TABLE.create_if_missing(conn)?;
    ALBUM_SOURCE_TABLE.create_if_missing(conn)?;
    Ok(())
}

fn migrate_to_v5(conn: &Connection) -> Result<()> {
    for column in ["play_count", "last_played", "date_added"] {
        FILE_TABLE.add_column_if_missing(conn, column)?;
    }
    if column_exists(conn, "song", "play_count")? {
        conn.execute(
            "UPDATE file SET
                play_count = COALESCE((SELECT MAX(song.play_count) FROM song WHERE song.file_id = file.file_id), 0),
                last_played = (SELECT MAX(song.last_played) FROM song WHERE song.file_id = file.file_id)",
            [],
        )?;
        conn.execute("ALTER TABLE song DROP COLUMN play_count", [])?;
        conn.execute("ALTER TABLE song DROP COLUMN last_played", [])?;
    }
    Ok(())
}

fn migrate_to_v6(conn: &Connection) -> Result<()> {
    for column in ["release_group_mbid", "release_type", "artist_sort"] {
        ALBUM_TABLE.add_column_if_missing(conn, column)?;
    }
    for column in ["artist_sort", "replay_gain"] {
        SONG_TABLE.add_column_if_missing(conn, column)?;
    }
    // Best effort until the rescan fills release types from tags
    conn.execute(
        "UPDATE album SET release_type = 'single' WHERE lower(album_type) = 'single'",
        [],
    )?;
    Ok(())
}

fn migrate_to_v7(conn: &Connection) -> Result<()> {
    PLAYLIST_TABLE.create_if_missing(conn)?;
    ARTIST_TABLE.add_column_if_missing(conn, "sort_name")?;
    ARTIST_INFO_TABLE.add_column_if_missing(conn, "mbid_confirmed")?;
    Ok(())
}

// =============================================================================
// Seed rows, triggers and views
// =============================================================================

pub(crate) fn seed_primary_role(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO role (role_id, name) VALUES (?1, ?2)",
        params![PRIMARY_ROLE_ID, PRIMARY_ROLE_NAME],
    )?;
    Ok(())
}

/// Inserts the rows every library must contain. Safe to run on every open.
pub(crate) fn seed_rows(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO artist (artist_id, name, mbid) VALUES (?1, ?2, ?3)",
        params![SENTINEL_ARTIST_ID, SENTINEL_ARTIST_NAME, SENTINEL_ARTIST_MBID],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO artist_info (artist_id) VALUES (?1)",
        params![SENTINEL_ARTIST_ID],
    )?;
    seed_primary_role(conn)?;
    conn.execute(
        "INSERT OR IGNORE INTO version_tag_scan (id, needs_scan) VALUES (1, 0)",
        [],
    )?;
    Ok(())
}

const TRIGGERS: &[(&str, &str)] = &[
    (
        "tgr_delete_album",
        "CREATE TRIGGER tgr_delete_album AFTER DELETE ON album FOR EACH ROW BEGIN
            DELETE FROM song WHERE song.album_id = old.album_id;
            DELETE FROM artist_credit WHERE owner_kind = 'album' AND owner_id = old.album_id;
            DELETE FROM art WHERE media_type = 'album' AND media_id = old.album_id;
        END",
    ),
    (
        "tgr_delete_song",
        "CREATE TRIGGER tgr_delete_song AFTER DELETE ON song FOR EACH ROW BEGIN
            DELETE FROM artist_credit WHERE owner_kind = 'song' AND owner_id = old.song_id;
            DELETE FROM art WHERE media_type = 'song' AND media_id = old.song_id;
        END",
    ),
    (
        "tgr_delete_artist",
        "CREATE TRIGGER tgr_delete_artist AFTER DELETE ON artist FOR EACH ROW BEGIN
            DELETE FROM art WHERE media_type = 'artist' AND media_id = old.artist_id;
        END",
    ),
    (
        "tgr_delete_playlist",
        "CREATE TRIGGER tgr_delete_playlist AFTER DELETE ON playlist FOR EACH ROW BEGIN
            DELETE FROM art WHERE media_type = 'playlist' AND media_id = old.playlist_id;
        END",
    ),
];

const VIEWS: &[(&str, &str)] = &[
    (
        "song_view",
        "CREATE VIEW song_view AS SELECT
            song.song_id, song.album_id, album.title AS album_title, song.title, song.track,
            song.duration, song.year, song.file_id, path.path, file.filename,
            path.path || file.filename AS full_path, song.mbid, song.artist_display,
            song.artist_sort, song.genre_display, song.comment, song.mood, song.start_offset,
            song.end_offset, song.replay_gain, song.rating, song.votes, song.user_rating,
            file.play_count, file.last_played, file.date_added,
            album.compilation, album.release_type, album.artist_display AS album_artist_display
        FROM song
        JOIN album ON album.album_id = song.album_id
        JOIN file ON file.file_id = song.file_id
        JOIN path ON path.path_id = file.path_id",
    ),
    (
        "album_view",
        "CREATE VIEW album_view AS SELECT
            album.*,
            (SELECT COUNT(*) FROM song WHERE song.album_id = album.album_id) AS song_count,
            (SELECT COALESCE(SUM(song.duration), 0) FROM song WHERE song.album_id = album.album_id) AS total_duration,
            (SELECT COALESCE(SUM(file.play_count), 0) FROM song JOIN file ON file.file_id = song.file_id
                WHERE song.album_id = album.album_id) AS play_count,
            (SELECT MAX(file.last_played) FROM song JOIN file ON file.file_id = song.file_id
                WHERE song.album_id = album.album_id) AS last_played
        FROM album",
    ),
    (
        "artist_view",
        "CREATE VIEW artist_view AS SELECT
            artist.artist_id, artist.name, artist.sort_name, artist.mbid,
            artist_info.born, artist_info.formed, artist_info.died, artist_info.disbanded,
            artist_info.years_active, artist_info.genres, artist_info.moods, artist_info.styles,
            artist_info.instruments, artist_info.biography, artist_info.disambiguation,
            artist_info.artist_type, artist_info.gender, artist_info.last_scraped,
            artist_info.mbid_confirmed
        FROM artist LEFT JOIN artist_info ON artist_info.artist_id = artist.artist_id",
    ),
];

fn object_exists(conn: &Connection, kind: &str, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
        params![kind, name],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn create_triggers(conn: &Connection) -> Result<()> {
    for (name, sql) in TRIGGERS {
        if !object_exists(conn, "trigger", name)? {
            conn.execute(sql, [])?;
        }
    }
    Ok(())
}

pub(crate) fn create_views(conn: &Connection) -> Result<()> {
    for (name, sql) in VIEWS {
        if !object_exists(conn, "view", name)? {
            conn.execute(sql, [])?;
        }
    }
    Ok(())
}

pub(crate) fn drop_triggers_and_views(conn: &Connection) -> Result<()> {
    for (name, _) in TRIGGERS {
        conn.execute(&format!("DROP TRIGGER IF EXISTS {}", name), [])?;
    }
    for (name, _) in VIEWS {
        conn.execute(&format!("DROP VIEW IF EXISTS {}", name), [])?;
    }
    Ok(())
}

// =============================================================================
// Versioned Schema Definition
// =============================================================================

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[
            PATH_TABLE,
            FILE_TABLE_V4,
            GENRE_TABLE,
            ARTIST_TABLE_V6,
            ARTIST_INFO_TABLE_V6,
            DISCOGRAPHY_TABLE,
            ALBUM_TABLE_V5,
            SONG_TABLE_V4,
            SONG_ARTIST_TABLE_V1,
            ALBUM_ARTIST_TABLE_V2,
            SONG_GENRE_TABLE,
            ALBUM_GENRE_TABLE,
            ART_TABLE,
            VERSION_TAG_SCAN_TABLE,
        ],
        migration: None,
        tag_rescan: false,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            PATH_TABLE,
            FILE_TABLE_V4,
            GENRE_TABLE,
            ROLE_TABLE,
            ARTIST_TABLE_V6,
            ARTIST_INFO_TABLE_V6,
            DISCOGRAPHY_TABLE,
            ALBUM_TABLE_V5,
            SONG_TABLE_V4,
            SONG_ARTIST_TABLE_V2,
            ALBUM_ARTIST_TABLE_V2,
            SONG_GENRE_TABLE,
            ALBUM_GENRE_TABLE,
            ART_TABLE,
            VERSION_TAG_SCAN_TABLE,
        ],
        migration: Some(migrate_to_v2),
        tag_rescan: false,
    },
    VersionedSchema {
        version: 3,
        tables: &[
            PATH_TABLE,
            FILE_TABLE_V4,
            GENRE_TABLE,
            ROLE_TABLE,
            ARTIST_TABLE_V6,
            ARTIST_INFO_TABLE_V6,
            DISCOGRAPHY_TABLE,
            ALBUM_TABLE_V5,
            SONG_TABLE_V4,
            ARTIST_CREDIT_TABLE,
            SONG_GENRE_TABLE,
            ALBUM_GENRE_TABLE,
            ART_TABLE,
            VERSION_TAG_SCAN_TABLE,
        ],
        migration: Some(migrate_to_v3),
        tag_rescan: false,
    },
    VersionedSchema {
        version: 4,
        tables: &[
            PATH_TABLE,
            FILE_TABLE_V4,
            GENRE_TABLE,
            ROLE_TABLE,
            ARTIST_TABLE_V6,
            ARTIST_INFO_TABLE_V6,
            DISCOGRAPHY_TABLE,
            ALBUM_TABLE_V5,
            SONG_TABLE_V4,
            ARTIST_CREDIT_TABLE,
            SONG_GENRE_TABLE,
            ALBUM_GENRE_TABLE,
            ART_TABLE,
            SOURCE_TABLE,
            SOURCE_PATH_TABLE,
            ALBUM_SOURCE_TABLE,
            VERSION_TAG_SCAN_TABLE,
        ],
        migration: Some(migrate_to_v4),
        tag_rescan: false,
    },
    VersionedSchema {
        version: 5,
        tables: &[
            PATH_TABLE,
            FILE_TABLE,
            GENRE_TABLE,
            ROLE_TABLE,
            ARTIST_TABLE_V6,
            ARTIST_INFO_TABLE_V6,
            DISCOGRAPHY_TABLE,
            ALBUM_TABLE_V5,
            SONG_TABLE_V5,
            ARTIST_CREDIT_TABLE,
            SONG_GENRE_TABLE,
            ALBUM_GENRE_TABLE,
            ART_TABLE,
            SOURCE_TABLE,
            SOURCE_PATH_TABLE,
            ALBUM_SOURCE_TABLE,
            VERSION_TAG_SCAN_TABLE,
        ],
        migration: Some(migrate_to_v5),
        tag_rescan: false,
    },
    VersionedSchema {
        version: 6,
        tables: &[
            PATH_TABLE,
            FILE_TABLE,
            GENRE_TABLE,
            ROLE_TABLE,
            ARTIST_TABLE_V6,
            ARTIST_INFO_TABLE_V6,
            DISCOGRAPHY_TABLE,
            ALBUM_TABLE,
            SONG_TABLE,
            ARTIST_CREDIT_TABLE,
            SONG_GENRE_TABLE,
            ALBUM_GENRE_TABLE,
            ART_TABLE,
            SOURCE_TABLE,
            SOURCE_PATH_TABLE,
            ALBUM_SOURCE_TABLE,
            VERSION_TAG_SCAN_TABLE,
        ],
        migration: Some(migrate_to_v6),
        tag_rescan: true,
    },
    VersionedSchema {
        version: 7,
        tables: &[
            PATH_TABLE,
            FILE_TABLE,
            GENRE_TABLE,
            ROLE_TABLE,
            ARTIST_TABLE,
            ARTIST_INFO_TABLE,
            DISCOGRAPHY_TABLE,
            ALBUM_TABLE,
            SONG_TABLE,
            ARTIST_CREDIT_TABLE,
            SONG_GENRE_TABLE,
            ALBUM_GENRE_TABLE,
            ART_TABLE,
            SOURCE_TABLE,
            SOURCE_PATH_TABLE,
            ALBUM_SOURCE_TABLE,
            PLAYLIST_TABLE,
            VERSION_TAG_SCAN_TABLE,
        ],
        migration: Some(migrate_to_v7),
        tag_rescan: false,
    },
];

const fn latest_version(schemas: &[VersionedSchema]) -> usize {
    schemas[schemas.len() - 1].version
}

const fn highest_tag_rescan_version(schemas: &[VersionedSchema]) -> usize {
    let mut threshold = 0;
    let mut i = 0;
    while i < schemas.len() {
        if schemas[i].tag_rescan && schemas[i].version > threshold {
            threshold = schemas[i].version;
        }
        i += 1;
    }
    threshold
}

/// Structural schema version written by this build.
pub const LIBRARY_SCHEMA_VERSION: usize = latest_version(LIBRARY_VERSIONED_SCHEMAS);

/// Databases older than this version need a full tag rescan after upgrading.
pub const TAG_RESCAN_THRESHOLD: usize = highest_tag_rescan_version(LIBRARY_VERSIONED_SCHEMAS);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_persistence::read_schema_version;

    fn schema_for(version: usize) -> &'static VersionedSchema {
        LIBRARY_VERSIONED_SCHEMAS
            .iter()
            .find(|s| s.version == version)
            .unwrap()
    }

    #[test]
    fn test_versions_are_sequential() {
        for (index, schema) in LIBRARY_VERSIONED_SCHEMAS.iter().enumerate() {
            assert_eq!(schema.version, index + 1);
            assert_eq!(schema.migration.is_none(), index == 0);
        }
        assert_eq!(LIBRARY_SCHEMA_VERSION, 7);
        assert_eq!(TAG_RESCAN_THRESHOLD, 6);
    }

    #[test]
    fn test_every_version_creates_and_validates() {
        for schema in LIBRARY_VERSIONED_SCHEMAS {
            let conn = Connection::open_in_memory().unwrap();
            schema.create(&conn).unwrap();
            schema.validate(&conn).unwrap();
            assert_eq!(read_schema_version(&conn).unwrap(), Some(schema.version));
        }
    }

    #[test]
    fn test_each_migration_step_reaches_next_version_shape() {
        for window in LIBRARY_VERSIONED_SCHEMAS.windows(2) {
            let conn = Connection::open_in_memory().unwrap();
            window[0].create(&conn).unwrap();
            let migration = window[1].migration.unwrap();
            migration(&conn).unwrap();
            window[1].validate(&conn).unwrap();
            // Steps are idempotent
            migration(&conn).unwrap();
            window[1].validate(&conn).unwrap();
        }
    }

    #[test]
    fn test_v3_moves_links_into_artist_credit() {
        let conn = Connection::open_in_memory().unwrap();
        schema_for(2).create(&conn).unwrap();
        conn.execute(
            "INSERT INTO song_artist (artist_id, song_id, ordinal, role_id) VALUES (5, 10, 0, 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO album_artist (artist_id, album_id, ordinal) VALUES (5, 20, 1)",
            [],
        )
        .unwrap();

        migrate_to_v3(&conn).unwrap();

        let credits: Vec<(i64, String, i64)> = conn
            .prepare("SELECT owner_id, owner_kind, ordinal FROM artist_credit ORDER BY owner_id")
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            credits,
            vec![(10, "song".to_string(), 0), (20, "album".to_string(), 1)]
        );
        assert!(!table_exists(&conn, "song_artist").unwrap());
        assert!(!table_exists(&conn, "album_artist").unwrap());
    }

    #[test]
    fn test_v5_moves_play_statistics_to_file() {
        let conn = Connection::open_in_memory().unwrap();
        schema_for(4).create(&conn).unwrap();
        conn.execute("INSERT INTO path (path_id, path) VALUES (1, '/music/')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO file (file_id, path_id, filename) VALUES (1, 1, 'a.flac')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO song (song_id, album_id, file_id, title, play_count, last_played)
             VALUES (1, 1, 1, 'A', 4, '2020-01-01 10:00:00')",
            [],
        )
        .unwrap();

        migrate_to_v5(&conn).unwrap();

        let (count, last): (i64, String) = conn
            .query_row(
                "SELECT play_count, last_played FROM file WHERE file_id = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 4);
        assert_eq!(last, "2020-01-01 10:00:00");
        assert!(!column_exists(&conn, "song", "play_count").unwrap());
    }

    #[test]
    fn test_triggers_and_views_build_on_current_schema() {
        let conn = Connection::open_in_memory().unwrap();
        schema_for(LIBRARY_SCHEMA_VERSION).create(&conn).unwrap();
        create_triggers(&conn).unwrap();
        create_views(&conn).unwrap();
        // Second call is a no-op
        create_triggers(&conn).unwrap();
        create_views(&conn).unwrap();
        seed_rows(&conn).unwrap();
        seed_rows(&conn).unwrap();

        let sentinel: String = conn
            .query_row(
                "SELECT name FROM artist_view WHERE artist_id = ?1",
                params![SENTINEL_ARTIST_ID],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(sentinel, SENTINEL_ARTIST_NAME);

        drop_triggers_and_views(&conn).unwrap();
        assert!(!object_exists(&conn, "view", "song_view").unwrap());
        assert!(!object_exists(&conn, "trigger", "tgr_delete_song").unwrap());
    }
}
