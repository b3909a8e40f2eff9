//! Smart playlists: a name and a stored rule set.

use super::models::{MediaType, Playlist};
use super::store::{now_timestamp, SqliteLibraryStore};
use crate::query::RuleSet;
use crate::sqlite_persistence::ScopedConnection;
use anyhow::{bail, Context, Result};
use rusqlite::{params, OptionalExtension, Row};

fn parse_playlist_row(row: &Row) -> rusqlite::Result<(i64, String, String, Option<String>)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

impl SqliteLibraryStore {
    fn hydrate_playlist_in(
        &self,
        conn: &ScopedConnection,
        (id, name, rules, updated_at): (i64, String, String, Option<String>),
    ) -> Result<Playlist> {
        let rules: RuleSet = serde_json::from_str(&rules)
            .with_context(|| format!("Invalid rules stored for playlist {}", id))?;
        Ok(Playlist {
            id,
            name,
            rules,
            updated_at,
            art: self.get_art_in(conn, id, MediaType::Playlist)?,
        })
    }

    fn get_playlist_where_in(
        &self,
        conn: &ScopedConnection,
        column: &str,
        key: &dyn rusqlite::ToSql,
    ) -> Result<Option<Playlist>> {
        let row = conn
            .prepare_cached(&format!(
                "SELECT playlist_id, name, rules, updated_at FROM playlist WHERE {} = ?1",
                column
            ))?
            .query_row(params![key], parse_playlist_row)
            .optional()?;
        row.map(|row| self.hydrate_playlist_in(conn, row)).transpose()
    }

    pub fn add_playlist(&self, name: &str, rules: &RuleSet) -> Option<i64> {
        self.write("add_playlist", name, |conn| {
            if name.trim().is_empty() {
                bail!("Playlist name is empty");
            }
            conn.execute(
                "INSERT INTO playlist (name, rules, updated_at) VALUES (?1, ?2, ?3)",
                params![name, serde_json::to_string(rules)?, now_timestamp()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn update_playlist(&self, id: i64, name: &str, rules: &RuleSet) -> bool {
        self.write("update_playlist", id, |conn| {
            Ok(conn.execute(
                "UPDATE playlist SET name = ?1, rules = ?2, updated_at = ?3 WHERE playlist_id = ?4",
                params![name, serde_json::to_string(rules)?, now_timestamp(), id],
            )? > 0)
        })
        .unwrap_or(false)
    }

    pub fn get_playlist(&self, id: i64) -> Option<Playlist> {
        self.read("get_playlist", id, |conn| {
            self.get_playlist_where_in(conn, "playlist_id", &id)
        })
        .flatten()
    }

    pub fn get_playlist_by_name(&self, name: &str) -> Option<Playlist> {
        self.read("get_playlist_by_name", name, |conn| {
            self.get_playlist_where_in(conn, "name", &name)
        })
        .flatten()
    }

    pub fn get_playlists(&self) -> Vec<Playlist> {
        self.read("get_playlists", (), |conn| {
            let rows = conn
                .prepare_cached(
                    "SELECT playlist_id, name, rules, updated_at FROM playlist ORDER BY name",
                )?
                .query_map([], parse_playlist_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter()
                .map(|row| self.hydrate_playlist_in(conn, row))
                .collect::<Result<Vec<_>>>()
        })
        .unwrap_or_default()
    }

    pub fn delete_playlist(&self, id: i64) -> bool {
        let deleted = self
            .write("delete_playlist", id, |conn| {
                Ok(conn.execute("DELETE FROM playlist WHERE playlist_id = ?1", params![id])? > 0)
            })
            .unwrap_or(false);
        if deleted {
            self.cache.invalidate_art(id, MediaType::Playlist);
        }
        deleted
    }
}
