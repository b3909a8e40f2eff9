//! Genre and Role dictionaries, created on first use.

use super::models::{Genre, Role, PRIMARY_ROLE_ID, PRIMARY_ROLE_NAME};
use super::store::SqliteLibraryStore;
use crate::sqlite_persistence::ScopedConnection;
use anyhow::{bail, Result};
use rusqlite::{params, OptionalExtension};

impl SqliteLibraryStore {
    // =========================================================================
    // Genres
    // =========================================================================

    pub(super) fn add_genre_in(&self, conn: &ScopedConnection, name: &str) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Genre name is empty");
        }
        let existing: Option<i64> = conn
            .prepare_cached("SELECT genre_id FROM genre WHERE name = ?1")?
            .query_row(params![name], |r| r.get(0))
            .optional()?;
        match existing {
            Some(id) => Ok(id),
            None => {
                conn.execute("INSERT INTO genre (name) VALUES (?1)", params![name])?;
                Ok(conn.last_insert_rowid())
            }
        }
    }

    pub fn add_genre(&self, name: &str) -> Option<i64> {
        self.write("add_genre", name, |conn| self.add_genre_in(conn, name))
    }

    pub fn get_genre_id(&self, name: &str) -> Option<i64> {
        self.read("get_genre_id", name, |conn| {
            Ok(conn
                .query_row(
                    "SELECT genre_id FROM genre WHERE name = ?1",
                    params![name.trim()],
                    |r| r.get(0),
                )
                .optional()?)
        })
        .flatten()
    }

    pub fn get_genres(&self) -> Vec<Genre> {
        self.read("get_genres", (), |conn| {
            let mut stmt = conn.prepare_cached("SELECT genre_id, name FROM genre ORDER BY name")?;
            let genres = stmt
                .query_map([], |r| {
                    Ok(Genre {
                        id: r.get(0)?,
                        name: r.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(genres)
        })
        .unwrap_or_default()
    }

    // =========================================================================
    // Roles
    // =========================================================================

    pub(super) fn add_role_in(&self, conn: &ScopedConnection, name: &str) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case(PRIMARY_ROLE_NAME) {
            return Ok(PRIMARY_ROLE_ID);
        }
        let existing: Option<i64> = conn
            .prepare_cached("SELECT role_id FROM role WHERE name = ?1")?
            .query_row(params![name], |r| r.get(0))
            .optional()?;
        match existing {
            Some(id) => Ok(id),
            None => {
                conn.execute("INSERT INTO role (name) VALUES (?1)", params![name])?;
                Ok(conn.last_insert_rowid())
            }
        }
    }

    /// Gets or creates a contribution role. "artist" is always role 1.
    pub fn add_role(&self, name: &str) -> Option<i64> {
        self.write("add_role", name, |conn| self.add_role_in(conn, name))
    }

    pub fn get_role_id(&self, name: &str) -> Option<i64> {
        if name.trim().eq_ignore_ascii_case(PRIMARY_ROLE_NAME) {
            return Some(PRIMARY_ROLE_ID);
        }
        self.read("get_role_id", name, |conn| {
            Ok(conn
                .query_row(
                    "SELECT role_id FROM role WHERE name = ?1",
                    params![name.trim()],
                    |r| r.get(0),
                )
                .optional()?)
        })
        .flatten()
    }

    pub fn get_roles(&self) -> Vec<Role> {
        self.read("get_roles", (), |conn| {
            let mut stmt = conn.prepare_cached("SELECT role_id, name FROM role ORDER BY role_id")?;
            let roles = stmt
                .query_map([], |r| {
                    Ok(Role {
                        id: r.get(0)?,
                        name: r.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(roles)
        })
        .unwrap_or_default()
    }
}
