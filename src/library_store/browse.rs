//! Browse listings: runs [`QueryPlan`]s and hydrates the matched rows
//! through the cached getters.

use super::models::{
    Album, Artist, DetailLevel, Genre, Playlist, Song, SENTINEL_ARTIST_ID, SENTINEL_ARTIST_NAME,
};
use super::store::SqliteLibraryStore;
use crate::query::{
    label_column, BrowseOptions, BrowseResult, EntityKind, IdOrName, ItemSummary, LibraryBrowse,
    QueryBuilder, QueryPlan, RuleSet, MISSING_ARTIST_LABEL_KEY,
};
use rusqlite::{params, params_from_iter, OptionalExtension};
use tracing::debug;

impl SqliteLibraryStore {
    /// Rules of the playlist named in `options`, for listings other than
    /// playlists themselves.
    fn playlist_rules(&self, kind: EntityKind, options: &BrowseOptions) -> Option<RuleSet> {
        if kind == EntityKind::Playlists {
            return None;
        }
        let playlist = match options.playlist.as_ref()? {
            IdOrName::Id(id) => self.get_playlist(*id),
            IdOrName::Name(name) => self.get_playlist_by_name(name),
        };
        if playlist.is_none() {
            debug!("Browse references unknown playlist {:?}", options.playlist);
        }
        playlist.map(|p| p.rules)
    }

    pub fn plan_query(&self, kind: EntityKind, options: &BrowseOptions) -> QueryPlan {
        QueryBuilder::new(kind)
            .with_playlist_rules(self.playlist_rules(kind, options))
            .build(options)
    }

    /// Ids and labels of one page, plus the unpaged total.
    fn run_plan(&self, plan: &QueryPlan) -> BrowseResult<(i64, String)> {
        self.read("browse", plan.kind, |conn| {
            let (sql, params) = plan.rows_sql();
            debug!("Browse {}: {}", plan.kind, sql);
            let items = conn
                .prepare(&sql)?
                .query_map(params_from_iter(params.iter()), |r| Ok((r.get(0)?, r.get(1)?)))?
                .collect::<rusqlite::Result<Vec<(i64, String)>>>()?;

            let (sql, params) = plan.count_sql();
            let total: i64 = conn.query_row(&sql, params_from_iter(params.iter()), |r| r.get(0))?;
            Ok(BrowseResult {
                items,
                total: total as u64,
            })
        })
        .unwrap_or_default()
    }

    fn ids_by_where(&self, kind: EntityKind, options: &BrowseOptions) -> BrowseResult<i64> {
        self.run_plan(&self.plan_query(kind, options)).map(|(id, _)| id)
    }

    /// Label of the missing-artist placeholder, translated when a string
    /// source is attached.
    pub fn missing_artist_label(&self) -> String {
        self.strings
            .as_ref()
            .and_then(|source| {
                self.cache
                    .localized()
                    .resolve(source.as_ref(), MISSING_ARTIST_LABEL_KEY)
            })
            .unwrap_or_else(|| SENTINEL_ARTIST_NAME.to_string())
    }

    fn display_label(&self, kind: EntityKind, id: i64, label: String) -> String {
        if kind == EntityKind::Artists && id == SENTINEL_ARTIST_ID {
            self.missing_artist_label()
        } else {
            label
        }
    }

    pub fn get_artists_by_where(&self, options: &BrowseOptions) -> BrowseResult<Artist> {
        let ids = self.ids_by_where(EntityKind::Artists, options);
        BrowseResult {
            items: ids
                .items
                .into_iter()
                .filter_map(|id| self.get_artist(id, DetailLevel::Basic))
                .map(|mut artist| {
                    if artist.is_sentinel() {
                        artist.name = self.missing_artist_label();
                    }
                    artist
                })
                .collect(),
            total: ids.total,
        }
    }

    pub fn get_albums_by_where(&self, options: &BrowseOptions) -> BrowseResult<Album> {
        let ids = self.ids_by_where(EntityKind::Albums, options);
        BrowseResult {
            items: ids
                .items
                .into_iter()
                .filter_map(|id| self.get_album(id, false))
                .collect(),
            total: ids.total,
        }
    }

    pub fn get_songs_by_where(&self, options: &BrowseOptions) -> BrowseResult<Song> {
        let ids = self.ids_by_where(EntityKind::Songs, options);
        BrowseResult {
            items: ids
                .items
                .into_iter()
                .filter_map(|id| self.get_song_with_detail(id, DetailLevel::Basic))
                .collect(),
            total: ids.total,
        }
    }

    pub fn get_genres_by_where(&self, options: &BrowseOptions) -> BrowseResult<Genre> {
        self.run_plan(&self.plan_query(EntityKind::Genres, options))
            .map(|(id, name)| Genre { id, name })
    }

    pub fn get_playlists_by_where(&self, options: &BrowseOptions) -> BrowseResult<Playlist> {
        let ids = self.ids_by_where(EntityKind::Playlists, options);
        BrowseResult {
            items: ids
                .items
                .into_iter()
                .filter_map(|id| self.get_playlist(id))
                .collect(),
            total: ids.total,
        }
    }
}

impl LibraryBrowse for SqliteLibraryStore {
    fn get_items(&self, kind: EntityKind, options: &BrowseOptions) -> BrowseResult<ItemSummary> {
        self.run_plan(&self.plan_query(kind, options))
            .map(|(id, label)| ItemSummary {
                kind,
                id,
                label: self.display_label(kind, id, label),
            })
    }

    fn get_item_label(&self, kind: EntityKind, id: i64) -> Option<String> {
        let label: String = self
            .read("get_item_label", (kind, id), |conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM {} WHERE {} = ?1",
                            label_column(kind),
                            kind.table(),
                            kind.id_column()
                        ),
                        params![id],
                        |r| r.get(0),
                    )
                    .optional()?)
            })
            .flatten()?;
        Some(self.display_label(kind, id, label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StringSource;
    use crate::config::LibrarySettings;
    use crate::library_store::{CreditInput, NewAlbum, NewSong};
    use crate::query::{Page, RoleFilter, Rule, RuleField, RuleOperator, SortField, SortSpec};
    use std::sync::Arc;

    fn store() -> SqliteLibraryStore {
        SqliteLibraryStore::open_in_memory(LibrarySettings::default()).unwrap()
    }

    fn album(store: &SqliteLibraryStore, title: &str, artist: &str) -> i64 {
        store
            .add_album(&NewAlbum {
                title: title.to_string(),
                artist_display: artist.to_string(),
                credits: vec![CreditInput::artist(artist)],
                ..Default::default()
            })
            .unwrap()
    }

    fn song(store: &SqliteLibraryStore, album_id: i64, title: &str, genres: &[&str]) -> i64 {
        store
            .add_song(&NewSong {
                album_id,
                title: title.to_string(),
                path: format!("/music/{}/{}.flac", album_id, title),
                genres: genres.iter().map(|g| g.to_string()).collect(),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_albums_by_genre_id_match_song_genres() {
        let store = store();
        let rock_album = album(&store, "Rocks", "A");
        let mixed_album = album(&store, "Mixed", "B");
        let jazz_album = album(&store, "Jazz", "C");
        song(&store, rock_album, "r1", &["Rock"]);
        song(&store, mixed_album, "m1", &["Jazz"]);
        song(&store, mixed_album, "m2", &["Rock", "Pop"]);
        song(&store, jazz_album, "j1", &["Jazz"]);
        let rock = store.get_genre_id("Rock").unwrap();

        let result = store.get_albums_by_where(&BrowseOptions {
            genre: Some(IdOrName::Id(rock)),
            ..Default::default()
        });
        let mut ids: Vec<i64> = result.items.iter().map(|a| a.id).collect();
        ids.sort();
        assert_eq!(ids, vec![rock_album, mixed_album]);
        assert_eq!(result.total, 2);
    }

    #[test]
    fn test_songs_paged_with_total() {
        let store = store();
        let album_id = album(&store, "Long", "A");
        for title in ["e", "d", "c", "b", "a"] {
            song(&store, album_id, title, &[]);
        }
        let result = store.get_songs_by_where(&BrowseOptions {
            sort: Some(SortSpec::ascending(SortField::Title)),
            page: Some(Page {
                offset: 1,
                limit: 2,
            }),
            ..Default::default()
        });
        let titles: Vec<&str> = result.items.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c"]);
        assert_eq!(result.total, 5);
    }

    #[test]
    fn test_artists_by_role_and_album_artists_only() {
        let store = store();
        let album_id = album(&store, "Works", "Band");
        let song_id = store
            .add_song(&NewSong {
                album_id,
                title: "Piece".to_string(),
                path: "/music/works/1.flac".to_string(),
                credits: vec![CreditInput::artist("Band")],
                ..Default::default()
            })
            .unwrap();
        assert!(store.add_song_contributor(song_id, "composer", "Writer", None));

        let names = |options: &BrowseOptions| -> Vec<String> {
            store
                .get_artists_by_where(options)
                .items
                .into_iter()
                .map(|a| a.name)
                .collect()
        };

        // Composers are hidden from the default listing
        assert_eq!(names(&BrowseOptions::default()), vec!["Band".to_string()]);
        assert_eq!(
            names(&BrowseOptions {
                role: RoleFilter::Name("composer".to_string()),
                ..Default::default()
            }),
            vec!["Writer".to_string()]
        );
        assert_eq!(
            names(&BrowseOptions {
                role: RoleFilter::All,
                ..Default::default()
            }),
            vec!["Band".to_string(), "Writer".to_string()]
        );
        // The composer is not credited on the album
        assert!(names(&BrowseOptions {
            role: RoleFilter::Name("composer".to_string()),
            album_artists_only: true,
            ..Default::default()
        })
        .is_empty());
    }

    #[test]
    fn test_songs_by_artist_reach_album_artist() {
        let store = store();
        let album_id = album(&store, "Split", "Band");
        let song_id = store
            .add_song(&NewSong {
                album_id,
                title: "Guest track".to_string(),
                path: "/music/split/1.flac".to_string(),
                credits: vec![CreditInput::artist("Guest")],
                ..Default::default()
            })
            .unwrap();

        let by_band = store.get_songs_by_where(&BrowseOptions {
            artist: Some(IdOrName::Name("band".to_string())),
            ..Default::default()
        });
        assert_eq!(by_band.items[0].id, song_id);

        let guest_as_album_artist = store.get_songs_by_where(&BrowseOptions {
            artist: Some(IdOrName::Name("Guest".to_string())),
            album_artists_only: true,
            ..Default::default()
        });
        assert_eq!(guest_as_album_artist.total, 0);
    }

    #[test]
    fn test_playlist_option_applies_stored_rules() {
        let store = store();
        let album_id = album(&store, "Mixed", "A");
        song(&store, album_id, "loud", &["Rock"]);
        song(&store, album_id, "quiet", &["Ambient"]);
        store.add_playlist(
            "Rock",
            &RuleSet::new(EntityKind::Songs)
                .with_rule(Rule::new(RuleField::Genre, RuleOperator::Is, &["rock"])),
        );

        let result = store.get_items(
            EntityKind::Songs,
            &BrowseOptions {
                playlist: Some(IdOrName::Name("Rock".to_string())),
                ..Default::default()
            },
        );
        assert_eq!(result.total, 1);
        assert_eq!(result.items[0].label, "loud");

        let playlists = store.get_playlists_by_where(&BrowseOptions::default());
        assert_eq!(playlists.items[0].name, "Rock");
    }

    #[test]
    fn test_genres_narrowed_by_album() {
        let store = store();
        let first = album(&store, "First", "A");
        let second = album(&store, "Second", "A");
        song(&store, first, "s1", &["Rock"]);
        song(&store, second, "s2", &["Jazz"]);

        let genres = store.get_genres_by_where(&BrowseOptions {
            album: Some(IdOrName::Id(second)),
            ..Default::default()
        });
        assert_eq!(genres.total, 1);
        assert_eq!(genres.items[0].name, "Jazz");
        assert_eq!(store.get_genres_by_where(&BrowseOptions::default()).total, 2);
    }

    struct German;

    impl StringSource for German {
        fn version(&self) -> i64 {
            1
        }

        fn lookup(&self, key: &str) -> Option<String> {
            (key == MISSING_ARTIST_LABEL_KEY).then(|| "[Fehlender Tag]".to_string())
        }
    }

    #[test]
    fn test_sentinel_label_is_translated() {
        let store = store().with_string_source(Arc::new(German));
        let album_id = store
            .add_album(&NewAlbum {
                title: "Untagged".to_string(),
                ..Default::default()
            })
            .unwrap();
        song(&store, album_id, "t", &[]);

        assert_eq!(
            store.get_item_label(EntityKind::Artists, SENTINEL_ARTIST_ID),
            Some("[Fehlender Tag]".to_string())
        );
        assert_eq!(
            store.get_item_label(EntityKind::Albums, album_id),
            Some("Untagged".to_string())
        );
        assert_eq!(store.get_item_label(EntityKind::Songs, 999), None);

        let artists = store.get_items(EntityKind::Artists, &BrowseOptions::default());
        assert_eq!(artists.items[0].label, "[Fehlender Tag]");
        assert_eq!(store.cache().localized().len(), 1);
    }

    #[test]
    fn test_failed_query_is_empty() {
        let store = store();
        store.with_connection(|conn| {
            conn.execute("DROP VIEW album_view", []).unwrap();
        });
        let result = store.get_albums_by_where(&BrowseOptions::default());
        assert!(result.items.is_empty());
        assert_eq!(result.total, 0);
    }
}
