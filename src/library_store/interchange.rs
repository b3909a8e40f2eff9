//! JSON export and import of curated artist and album metadata.
//!
//! An export carries what a scan cannot recover from tags: extended artist
//! detail, discographies, album reviews, ratings and artwork. Importing
//! merges it back onto entities that already exist; nothing is created.

use super::models::{
    Album, ArtMap, ArtistCandidate, ArtistDetail, ArtistUpdate, CreditInput, DetailLevel,
    DiscographyEntry, ReleaseType, SENTINEL_ARTIST_ID,
};
use super::progress::ProgressMonitor;
use super::store::{now_timestamp, SqliteLibraryStore};
use crate::sqlite_persistence::{ScopedConnection, TransactionMode};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::{debug, info};

pub const EXPORT_FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LibraryExport {
    pub version: u32,
    pub exported_at: String,
    #[serde(default)]
    pub artists: Vec<ExportedArtist>,
    #[serde(default)]
    pub albums: Vec<ExportedAlbum>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportedArtist {
    pub name: String,
    pub mbid: Option<String>,
    pub sort_name: Option<String>,
    pub detail: ArtistDetail,
    pub discography: Vec<DiscographyEntry>,
    pub art: ArtMap,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportedAlbum {
    pub title: String,
    pub mbid: Option<String>,
    pub release_group_mbid: Option<String>,
    pub artist_display: String,
    pub artist_sort: Option<String>,
    pub year: Option<i32>,
    pub compilation: bool,
    pub release_type: String,
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
    /// Informational; imports match on title, artist and identifier.
    pub credits: Vec<CreditInput>,
    pub art: ArtMap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    pub artists: bool,
    pub albums: bool,
    pub include_art: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            artists: true,
            albums: true,
            include_art: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub artists: usize,
    pub albums: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub updated: usize,
    /// Records with no matching artist or album.
    pub skipped: usize,
}

impl ExportedAlbum {
    fn from_album(album: Album, include_art: bool) -> Self {
        Self {
            credits: album.credits.iter().map(CreditInput::from).collect(),
            title: album.title,
            mbid: album.mbid,
            release_group_mbid: album.release_group_mbid,
            artist_display: album.artist_display,
            artist_sort: album.artist_sort,
            year: album.year,
            compilation: album.compilation,
            release_type: album.release_type.to_db_str().to_string(),
            label: album.label,
            album_type: album.album_type,
            moods: album.moods,
            styles: album.styles,
            themes: album.themes,
            review: album.review,
            rating: album.rating,
            votes: album.votes,
            user_rating: album.user_rating,
            last_scraped: album.last_scraped,
            art: if include_art { album.art } else { ArtMap::new() },
        }
    }

    /// Copies the curated fields onto a stored album, leaving its identity,
    /// genres and credits alone. Missing art slots keep their stored value.
    fn apply_to(&self, album: &mut Album) {
        album.release_group_mbid = self.release_group_mbid.clone();
        album.artist_sort = self.artist_sort.clone();
        album.year = self.year;
        album.compilation = self.compilation;
        album.release_type = ReleaseType::from_db_str(&self.release_type);
        album.label = self.label.clone();
        album.album_type = self.album_type.clone();
        album.moods = self.moods.clone();
        album.styles = self.styles.clone();
        album.themes = self.themes.clone();
        album.review = self.review.clone();
        album.rating = self.rating;
        album.votes = self.votes;
        album.user_rating = self.user_rating;
        album.last_scraped = self.last_scraped.clone();
        album.art = self.art.clone();
    }
}

impl SqliteLibraryStore {
    fn ids(&self, op: &str, sql: &str) -> Vec<i64> {
        self.read(op, (), |conn| {
            let ids = conn
                .prepare(sql)?
                .query_map([], |r| r.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            Ok(ids)
        })
        .unwrap_or_default()
    }

    /// Writes the curated metadata of the library as JSON. Cancellation is
    /// polled between batches.
    pub fn export_library<W: Write>(
        &self,
        writer: W,
        options: &ExportOptions,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<ExportSummary> {
        let batch_size = self.settings.cleanup_batch_size.max(1);
        let mut export = LibraryExport {
            version: EXPORT_FORMAT_VERSION,
            exported_at: now_timestamp(),
            artists: Vec::new(),
            albums: Vec::new(),
        };

        if options.artists {
            let ids = self.ids(
                "export_artist_ids",
                &format!(
                    "SELECT artist_id FROM artist WHERE artist_id <> {} ORDER BY artist_id",
                    SENTINEL_ARTIST_ID
                ),
            );
            for (done, batch) in ids.chunks(batch_size).enumerate() {
                if monitor.is_cancelled() {
                    bail!("Export cancelled");
                }
                monitor.on_progress("artists", (done * batch_size) as u64, ids.len() as u64);
                for id in batch {
                    let Some(artist) = self.get_artist(*id, DetailLevel::Full) else {
                        debug!("Artist {} vanished during export", id);
                        continue;
                    };
                    export.artists.push(ExportedArtist {
                        name: artist.name,
                        mbid: artist.mbid,
                        sort_name: artist.sort_name,
                        detail: artist.detail.unwrap_or_default(),
                        discography: artist.discography,
                        art: if options.include_art { artist.art } else { ArtMap::new() },
                    });
                }
            }
        }

        if options.albums {
            let ids = self.ids("export_album_ids", "SELECT album_id FROM album ORDER BY album_id");
            for (done, batch) in ids.chunks(batch_size).enumerate() {
                if monitor.is_cancelled() {
                    bail!("Export cancelled");
                }
                monitor.on_progress("albums", (done * batch_size) as u64, ids.len() as u64);
                for id in batch {
                    if let Some(album) = self.get_album(*id, false) {
                        export
                            .albums
                            .push(ExportedAlbum::from_album(album, options.include_art));
                    }
                }
            }
        }

        serde_json::to_writer_pretty(writer, &export).context("Failed to write export")?;
        let summary = ExportSummary {
            artists: export.artists.len(),
            albums: export.albums.len(),
        };
        monitor.on_progress("done", 1, 1);
        info!("Exported {} artists and {} albums", summary.artists, summary.albums);
        Ok(summary)
    }

    /// Merges an export back onto matching artists and albums. Unmatched
    /// records are skipped, never created.
    pub fn import_library<R: Read>(
        &self,
        reader: R,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<ImportSummary> {
        let export: LibraryExport =
            serde_json::from_reader(reader).context("Failed to parse library export")?;
        if export.version > EXPORT_FORMAT_VERSION {
            bail!(
                "Export format {} is newer than supported {}",
                export.version,
                EXPORT_FORMAT_VERSION
            );
        }

        let total = (export.artists.len() + export.albums.len()) as u64;
        // One write transaction; a cancelled or failed import merges nothing
        let result = self.with_connection(|conn| {
            conn.transaction(TransactionMode::Immediate, |conn| {
                self.import_records_in(conn, &export, total, monitor)
            })
        });
        self.cache.clear();
        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                self.lock_memo().clear();
                return Err(e);
            }
        };

        info!(
            "Imported library metadata: {} updated, {} skipped",
            summary.updated, summary.skipped
        );
        Ok(summary)
    }

    fn import_records_in(
        &self,
        conn: &ScopedConnection,
        export: &LibraryExport,
        total: u64,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        let mut done = 0u64;

        for artist in &export.artists {
            if monitor.is_cancelled() {
                bail!("Import cancelled after {} of {} records", done, total);
            }
            let candidate = ArtistCandidate {
                name: artist.name.clone(),
                mbid: artist.mbid.clone(),
            };
            match self.match_artist_in(conn, &candidate)? {
                Some(id) if id != SENTINEL_ARTIST_ID => {
                    let update = ArtistUpdate {
                        sort_name: artist.sort_name.clone(),
                        detail: artist.detail.clone(),
                        discography: artist.discography.clone(),
                        art: artist.art.clone(),
                    };
                    if self.update_artist_in(conn, id, &update)? {
                        summary.updated += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
                _ => {
                    debug!("No artist matches {:?}, skipping", artist.name);
                    summary.skipped += 1;
                }
            }
            done += 1;
            monitor.on_progress("artists", done, total);
        }

        for exported in &export.albums {
            if monitor.is_cancelled() {
                bail!("Import cancelled after {} of {} records", done, total);
            }
            let mbid = exported.mbid.as_deref().filter(|m| !m.is_empty());
            let stored = match self.match_album_in(
                conn,
                exported.title.trim(),
                exported.artist_display.trim(),
                mbid,
                false,
            )? {
                Some(id) => self.get_album_in(conn, id, false)?,
                None => None,
            };
            match stored {
                Some(mut album) => {
                    exported.apply_to(&mut album);
                    if self.update_album_in(conn, &album, false)? {
                        summary.updated += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
                None => {
                    debug!("No album matches {:?}, skipping", exported.title);
                    summary.skipped += 1;
                }
            }
            done += 1;
            monitor.on_progress("albums", done, total);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibrarySettings;
    use crate::library_store::{NewAlbum, NoProgress};

    fn store() -> SqliteLibraryStore {
        SqliteLibraryStore::open_in_memory(LibrarySettings::default()).unwrap()
    }

    fn seed(store: &SqliteLibraryStore) -> i64 {
        store.add_artist("Band", Some("mbid-band"), None).unwrap();
        store
            .add_album(&NewAlbum {
                title: "Debut".to_string(),
                artist_display: "Band".to_string(),
                credits: vec![CreditInput::artist("Band").with_mbid("mbid-band")],
                ..Default::default()
            })
            .unwrap()
    }

    struct Cancelled;

    impl ProgressMonitor for Cancelled {
        fn on_progress(&mut self, _stage: &str, _done: u64, _total: u64) {}

        fn is_cancelled(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_export_then_import_into_fresh_store() {
        let source = store();
        let album_id = seed(&source);
        let band = source.get_artist_by_match(&ArtistCandidate {
            name: "Band".to_string(),
            mbid: None,
        });
        let update = ArtistUpdate {
            detail: ArtistDetail {
                biography: Some("Formed in a garage".to_string()),
                ..Default::default()
            },
            art: [("thumb".to_string(), "band.jpg".to_string())].into(),
            ..Default::default()
        };
        assert!(source.update_artist(band.unwrap(), &update));
        let mut album = source.get_album(album_id, false).unwrap();
        album.review = Some("Loud".to_string());
        album.rating = 8.5;
        assert!(source.update_album(&album, false));

        let mut buffer = Vec::new();
        let summary = source
            .export_library(&mut buffer, &ExportOptions::default(), &mut NoProgress)
            .unwrap();
        assert_eq!(summary, ExportSummary { artists: 1, albums: 1 });

        let target = store();
        let target_album = seed(&target);
        let imported = target.import_library(buffer.as_slice(), &mut NoProgress).unwrap();
        assert_eq!(imported, ImportSummary { updated: 2, skipped: 0 });

        let album = target.get_album(target_album, false).unwrap();
        assert_eq!(album.review.as_deref(), Some("Loud"));
        assert_eq!(album.rating, 8.5);
        let artist_id = target
            .get_artist_by_match(&ArtistCandidate {
                name: "Band".to_string(),
                mbid: Some("mbid-band".to_string()),
            })
            .unwrap();
        let artist = target.get_artist(artist_id, DetailLevel::Full).unwrap();
        assert_eq!(
            artist.detail.unwrap().biography.as_deref(),
            Some("Formed in a garage")
        );
        assert_eq!(artist.art["thumb"], "band.jpg");
    }

    /// Cancels once `after` records have been reported.
    struct CancelAfter {
        after: u64,
        done: u64,
    }

    impl ProgressMonitor for CancelAfter {
        fn on_progress(&mut self, _stage: &str, done: u64, _total: u64) {
            self.done = done;
        }

        fn is_cancelled(&self) -> bool {
            self.done >= self.after
        }
    }

    #[test]
    fn test_cancelled_import_merges_nothing() {
        let source = store();
        let album_id = seed(&source);
        let band = source
            .get_artist_by_match(&ArtistCandidate {
                name: "Band".to_string(),
                mbid: None,
            })
            .unwrap();
        let update = ArtistUpdate {
            detail: ArtistDetail {
                biography: Some("Garage".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(source.update_artist(band, &update));
        let mut album = source.get_album(album_id, false).unwrap();
        album.review = Some("Loud".to_string());
        assert!(source.update_album(&album, false));
        let mut buffer = Vec::new();
        source
            .export_library(&mut buffer, &ExportOptions::default(), &mut NoProgress)
            .unwrap();

        let target = store();
        let target_album = seed(&target);
        let target_band = target
            .get_artist_by_match(&ArtistCandidate {
                name: "Band".to_string(),
                mbid: None,
            })
            .unwrap();
        let mut monitor = CancelAfter { after: 1, done: 0 };
        assert!(target.import_library(buffer.as_slice(), &mut monitor).is_err());

        let artist = target.get_artist(target_band, DetailLevel::Full).unwrap();
        assert_eq!(artist.detail.unwrap().biography, None);
        assert_eq!(target.get_album(target_album, false).unwrap().review, None);

        // The same export merges fully once nothing cancels it
        let summary = target.import_library(buffer.as_slice(), &mut NoProgress).unwrap();
        assert_eq!(summary, ImportSummary { updated: 2, skipped: 0 });
        let artist = target.get_artist(target_band, DetailLevel::Full).unwrap();
        assert_eq!(artist.detail.unwrap().biography.as_deref(), Some("Garage"));
    }

    #[test]
    fn test_import_skips_unknown_records() {
        let source = store();
        seed(&source);
        let mut buffer = Vec::new();
        source
            .export_library(&mut buffer, &ExportOptions::default(), &mut NoProgress)
            .unwrap();

        let target = store();
        let summary = target.import_library(buffer.as_slice(), &mut NoProgress).unwrap();
        assert_eq!(summary, ImportSummary { updated: 0, skipped: 2 });
        assert!(target.get_album_id_by_name("Debut", "Band", None).is_none());
    }

    #[test]
    fn test_export_without_art_or_artists() {
        let source = store();
        let album_id = seed(&source);
        assert!(source.set_art(album_id, crate::library_store::MediaType::Album, "thumb", "a.jpg"));

        let mut buffer = Vec::new();
        let options = ExportOptions {
            artists: false,
            include_art: false,
            ..Default::default()
        };
        source.export_library(&mut buffer, &options, &mut NoProgress).unwrap();
        let export: LibraryExport = serde_json::from_slice(&buffer).unwrap();
        assert!(export.artists.is_empty());
        assert_eq!(export.albums.len(), 1);
        assert!(export.albums[0].art.is_empty());
        assert_eq!(export.albums[0].credits.len(), 1);
        assert_eq!(export.albums[0].credits[0].name, "Band");
        assert_eq!(export.albums[0].credits[0].role, None);
    }

    #[test]
    fn test_rejects_newer_format_and_cancellation() {
        let target = store();
        let newer = serde_json::json!({
            "version": EXPORT_FORMAT_VERSION + 1,
            "exported_at": "2026-01-01 00:00:00",
        });
        assert!(target
            .import_library(newer.to_string().as_bytes(), &mut NoProgress)
            .is_err());

        seed(&target);
        let mut buffer = Vec::new();
        assert!(target
            .export_library(&mut buffer, &ExportOptions::default(), &mut Cancelled)
            .is_err());
        assert!(buffer.is_empty());
    }
}
