//! Library sources: named sets of root folders and the albums found under
//! them.

use super::models::{MediaSource, Source};
use super::paths::normalize_path;
use super::store::SqliteLibraryStore;
use crate::sqlite_persistence::ScopedConnection;
use anyhow::{bail, Result};
use rusqlite::{params, params_from_iter, OptionalExtension};
use std::collections::HashMap;
use tracing::info;

const MULTIPATH_SCHEME: &str = "multipath://";

/// Builds the combined descriptor of a source. A single path is its own
/// descriptor; several are URL-encoded into a `multipath://` string.
pub fn combine_paths(paths: &[String]) -> String {
    match paths {
        [] => String::new(),
        [single] => normalize_path(single),
        many => {
            let mut combined = String::from(MULTIPATH_SCHEME);
            for path in many {
                combined.push_str(&urlencoding::encode(&normalize_path(path)));
                combined.push('/');
            }
            combined
        }
    }
}

/// Inverse of [`combine_paths`].
pub fn split_multipath(descriptor: &str) -> Vec<String> {
    let Some(encoded) = descriptor.strip_prefix(MULTIPATH_SCHEME) else {
        return if descriptor.is_empty() {
            Vec::new()
        } else {
            vec![descriptor.to_string()]
        };
    };
    encoded
        .split('/')
        .filter(|part| !part.is_empty())
        .filter_map(|part| urlencoding::decode(part).ok())
        .map(|decoded| decoded.into_owned())
        .collect()
}

fn normalized_paths(paths: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for path in paths.iter().filter(|p| !p.is_empty()).map(|p| normalize_path(p)) {
        if !normalized.contains(&path) {
            normalized.push(path);
        }
    }
    normalized
}

impl SqliteLibraryStore {
    fn get_source_id_in(&self, conn: &ScopedConnection, name: &str) -> Result<Option<i64>> {
        Ok(conn
            .prepare_cached("SELECT source_id FROM source WHERE name = ?1")?
            .query_row(params![name], |r| r.get(0))
            .optional()?)
    }

    fn get_source_paths_in(&self, conn: &ScopedConnection, source_id: i64) -> Result<Vec<String>> {
        let mut stmt = conn.prepare_cached(
            "SELECT path FROM source_path WHERE source_id = ?1 ORDER BY ordinal",
        )?;
        let paths = stmt
            .query_map(params![source_id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(paths)
    }

    fn insert_source_in(
        &self,
        conn: &ScopedConnection,
        source_id: Option<i64>,
        name: &str,
        multipath: &str,
        paths: &[String],
    ) -> Result<i64> {
        conn.execute(
            "INSERT INTO source (source_id, name, multipath) VALUES (?1, ?2, ?3)",
            params![source_id, name, multipath],
        )?;
        let id = conn.last_insert_rowid();
        let mut insert = conn.prepare_cached(
            "INSERT INTO source_path (source_id, path, ordinal) VALUES (?1, ?2, ?3)",
        )?;
        for (ordinal, path) in paths.iter().enumerate() {
            insert.execute(params![id, path, ordinal as i64])?;
        }
        self.recompute_source_albums_in(conn, id)?;
        Ok(id)
    }

    /// Links the source to every album with a song under one of its paths.
    fn recompute_source_albums_in(&self, conn: &ScopedConnection, source_id: i64) -> Result<()> {
        conn.execute(
            "DELETE FROM album_source WHERE source_id = ?1",
            params![source_id],
        )?;
        let linked = conn.execute(
            "INSERT OR IGNORE INTO album_source (source_id, album_id)
             SELECT DISTINCT source_path.source_id, song.album_id
             FROM source_path
             JOIN path ON substr(path.path, 1, length(source_path.path)) = source_path.path
             JOIN file ON file.path_id = path.path_id
             JOIN song ON song.file_id = file.file_id
             WHERE source_path.source_id = ?1",
            params![source_id],
        )?;
        info!("Source {} now covers {} albums", source_id, linked);
        Ok(())
    }

    /// Links an album to every source containing `folder`.
    pub(super) fn associate_album_sources_in(
        &self,
        conn: &ScopedConnection,
        album_id: i64,
        folder: &str,
    ) -> Result<()> {
        conn.prepare_cached(
            "INSERT OR IGNORE INTO album_source (source_id, album_id)
             SELECT DISTINCT source_id, ?1 FROM source_path
             WHERE substr(?2, 1, length(path)) = path",
        )?
        .execute(params![album_id, normalize_path(folder)])?;
        Ok(())
    }

    /// Gets or creates a source by name. A new source is linked to the
    /// albums already found under its paths.
    pub fn add_source(&self, name: &str, multipath: &str, paths: &[String]) -> Option<i64> {
        let paths = normalized_paths(paths);
        self.write("add_source", name, |conn| {
            if name.trim().is_empty() {
                bail!("Source name is empty");
            }
            match self.get_source_id_in(conn, name)? {
                Some(id) => Ok(id),
                None => self.insert_source_in(conn, None, name, multipath, &paths),
            }
        })
    }

    /// Renames a source in place, or recreates it under the same id when
    /// its paths changed so that album links are recomputed.
    pub fn update_source(
        &self,
        old_name: &str,
        name: &str,
        multipath: &str,
        paths: &[String],
    ) -> bool {
        let paths = normalized_paths(paths);
        self.write("update_source", old_name, |conn| {
            let Some(id) = self.get_source_id_in(conn, old_name)? else {
                return Ok(false);
            };
            if self.get_source_paths_in(conn, id)? == paths {
                conn.execute(
                    "UPDATE source SET name = ?1, multipath = ?2 WHERE source_id = ?3",
                    params![name, multipath, id],
                )?;
            } else {
                conn.execute("DELETE FROM source WHERE source_id = ?1", params![id])?;
                self.insert_source_in(conn, Some(id), name, multipath, &paths)?;
            }
            Ok(true)
        })
        .unwrap_or(false)
    }

    pub fn remove_source(&self, name: &str) -> bool {
        self.write("remove_source", name, |conn| {
            Ok(conn.execute("DELETE FROM source WHERE name = ?1", params![name])? > 0)
        })
        .unwrap_or(false)
    }

    fn get_sources_where_in(
        &self,
        conn: &ScopedConnection,
        filter: &str,
        param: Option<i64>,
    ) -> Result<Vec<Source>> {
        let sql = format!(
            "SELECT source_id, name, multipath FROM source {} ORDER BY name",
            filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(param.iter()), |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut sources = Vec::with_capacity(rows.len());
        for (id, name, multipath) in rows {
            sources.push(Source {
                id,
                name,
                multipath,
                paths: self.get_source_paths_in(conn, id)?,
            });
        }
        Ok(sources)
    }

    pub fn get_sources(&self) -> Vec<Source> {
        self.read("get_sources", (), |conn| {
            self.get_sources_where_in(conn, "", None)
        })
        .unwrap_or_default()
    }

    pub fn get_sources_for_album(&self, album_id: i64) -> Vec<Source> {
        self.read("get_sources_for_album", album_id, |conn| {
            self.get_sources_where_in(
                conn,
                "WHERE source_id IN (SELECT source_id FROM album_source WHERE album_id = ?1)",
                Some(album_id),
            )
        })
        .unwrap_or_default()
    }

    /// True when the stored sources match `sources` exactly (same names,
    /// same paths), meaning no association recompute is needed.
    pub fn check_sources(&self, sources: &[MediaSource]) -> bool {
        let keyed = |name: &str, mut paths: Vec<String>| {
            paths.sort();
            (name.to_string(), paths)
        };
        let stored: HashMap<String, Vec<String>> = self
            .get_sources()
            .into_iter()
            .map(|source| keyed(&source.name, source.paths))
            .collect();
        let wanted: HashMap<String, Vec<String>> = sources
            .iter()
            .map(|external| keyed(&external.name, normalized_paths(&external.paths)))
            .collect();
        // A repeated external name collapses in the map
        wanted.len() == sources.len() && wanted == stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibrarySettings;
    use crate::library_store::{CreditInput, NewAlbum, NewSong};

    fn store() -> SqliteLibraryStore {
        SqliteLibraryStore::open_in_memory(LibrarySettings::default()).unwrap()
    }

    fn add_album_with_song(store: &SqliteLibraryStore, title: &str, path: &str) -> i64 {
        let album_id = store
            .add_album(&NewAlbum {
                title: title.to_string(),
                artist_display: "A".to_string(),
                credits: vec![CreditInput::artist("A")],
                ..Default::default()
            })
            .unwrap();
        store
            .add_song(&NewSong {
                album_id,
                title: format!("{} song", title),
                path: path.to_string(),
                ..Default::default()
            })
            .unwrap();
        album_id
    }

    #[test]
    fn test_multipath_round_trip() {
        let paths = vec!["/music/a b".to_string(), "/music/c".to_string()];
        let combined = combine_paths(&paths);
        assert!(combined.starts_with("multipath://"));
        assert_eq!(
            split_multipath(&combined),
            vec!["/music/a b/".to_string(), "/music/c/".to_string()]
        );
        assert_eq!(combine_paths(&["/music".to_string()]), "/music/");
        assert_eq!(split_multipath("/music/"), vec!["/music/".to_string()]);
    }

    #[test]
    fn test_source_links_existing_and_new_albums() {
        let store = store();
        let rock = add_album_with_song(&store, "Rock", "/music/rock/a/1.flac");
        let _jazz = add_album_with_song(&store, "Jazz", "/music/jazz/1.flac");

        let id = store
            .add_source("Rock", "/music/rock/", &["/music/rock".to_string()])
            .unwrap();
        assert_eq!(
            store.add_source("Rock", "/music/rock/", &["/music/rock".to_string()]),
            Some(id)
        );
        let linked = store.get_sources_for_album(rock);
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].paths, vec!["/music/rock/".to_string()]);

        // Songs scanned later are linked as they arrive
        let late = add_album_with_song(&store, "Late", "/music/rock/b/1.flac");
        assert_eq!(store.get_sources_for_album(late).len(), 1);
    }

    #[test]
    fn test_update_source_recomputes_on_path_change() {
        let store = store();
        let rock = add_album_with_song(&store, "Rock", "/music/rock/1.flac");
        let jazz = add_album_with_song(&store, "Jazz", "/music/jazz/1.flac");
        let id = store
            .add_source("Music", "", &["/music/rock".to_string()])
            .unwrap();

        assert!(store.update_source("Music", "Renamed", "", &["/music/rock/".to_string()]));
        assert_eq!(store.get_sources()[0].id, id);
        assert_eq!(store.get_sources_for_album(rock)[0].name, "Renamed");

        assert!(store.update_source("Renamed", "Renamed", "", &["/music/jazz".to_string()]));
        let sources = store.get_sources();
        assert_eq!(sources[0].id, id);
        assert!(store.get_sources_for_album(rock).is_empty());
        assert_eq!(store.get_sources_for_album(jazz).len(), 1);
        assert!(!store.update_source("Missing", "X", "", &[]));
    }

    #[test]
    fn test_check_and_remove_sources() {
        let store = store();
        store.add_source("A", "", &["/a".to_string()]);
        let external = vec![MediaSource {
            name: "A".to_string(),
            paths: vec!["/a/".to_string()],
        }];
        assert!(store.check_sources(&external));
        assert!(!store.check_sources(&[]));
        assert!(!store.check_sources(&[MediaSource {
            name: "A".to_string(),
            paths: vec!["/b".to_string()],
        }]));

        assert!(store.remove_source("A"));
        assert!(!store.remove_source("A"));
        assert!(store.check_sources(&[]));
    }

    #[test]
    fn test_repeated_external_source_does_not_match() {
        let store = store();
        store.add_source("A", "", &["/a".to_string()]);
        store.add_source("B", "", &["/b".to_string()]);
        let source = |name: &str, path: &str| MediaSource {
            name: name.to_string(),
            paths: vec![path.to_string()],
        };
        assert!(store.check_sources(&[source("B", "/b"), source("A", "/a")]));
        assert!(!store.check_sources(&[source("A", "/a"), source("A", "/a")]));
    }
}
