//! Metadata providers: sources of playlists and songs beyond the local
//! library, merged behind one registry.

use crate::library_store::SqliteLibraryStore;
use crate::query::{BrowseOptions, EntityKind, IdOrName, Page, SortSpec};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// One entry listed by a provider. `path` is the browse location of the
/// entry under the requested base directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderItem {
    pub provider: String,
    pub kind: EntityKind,
    pub id: i64,
    pub label: String,
    pub path: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProviderListing {
    pub items: Vec<ProviderItem>,
    pub total: u64,
}

/// Narrows a song listing. Unset fields do not filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SongQuery {
    pub genre: Option<IdOrName>,
    pub artist: Option<IdOrName>,
    pub album: Option<IdOrName>,
    pub playlist: Option<IdOrName>,
}

pub trait MetadataProvider: Send + Sync {
    fn name(&self) -> &str;

    fn supported_kinds(&self) -> &[EntityKind];

    /// Playlists under `base_dir`. With `count_only` the listing carries
    /// the total and no items. `None` means the provider failed.
    fn get_playlists(
        &self,
        base_dir: &str,
        sort: Option<SortSpec>,
        count_only: bool,
    ) -> Option<ProviderListing>;

    fn get_songs(
        &self,
        base_dir: &str,
        query: &SongQuery,
        sort: Option<SortSpec>,
    ) -> Option<ProviderListing>;

    fn supports(&self, kind: EntityKind) -> bool {
        self.supported_kinds().contains(&kind)
    }
}

fn item_path(base_dir: &str, id: i64, folder: bool) -> String {
    let separator = if base_dir.is_empty() || base_dir.ends_with('/') {
        ""
    } else {
        "/"
    };
    let suffix = if folder { "/" } else { "" };
    format!("{}{}{}{}", base_dir, separator, id, suffix)
}

const LOCAL_KINDS: [EntityKind; 2] = [EntityKind::Playlists, EntityKind::Songs];

impl MetadataProvider for SqliteLibraryStore {
    fn name(&self) -> &str {
        "library"
    }

    fn supported_kinds(&self) -> &[EntityKind] {
        &LOCAL_KINDS
    }

    fn get_playlists(
        &self,
        base_dir: &str,
        sort: Option<SortSpec>,
        count_only: bool,
    ) -> Option<ProviderListing> {
        let mut options = BrowseOptions {
            sort,
            ..Default::default()
        };
        if count_only {
            // A one-row page still yields the unpaged total
            options.page = Some(Page { offset: 0, limit: 1 });
        }
        let result = self.get_playlists_by_where(&options);
        let items = if count_only {
            Vec::new()
        } else {
            result
                .items
                .into_iter()
                .map(|playlist| ProviderItem {
                    provider: self.name().to_string(),
                    kind: EntityKind::Playlists,
                    path: item_path(base_dir, playlist.id, true),
                    id: playlist.id,
                    label: playlist.name,
                })
                .collect()
        };
        Some(ProviderListing {
            items,
            total: result.total,
        })
    }

    fn get_songs(
        &self,
        base_dir: &str,
        query: &SongQuery,
        sort: Option<SortSpec>,
    ) -> Option<ProviderListing> {
        let options = BrowseOptions {
            genre: query.genre.clone(),
            artist: query.artist.clone(),
            album: query.album.clone(),
            playlist: query.playlist.clone(),
            sort,
            ..Default::default()
        };
        let result = self.get_songs_by_where(&options);
        Some(ProviderListing {
            items: result
                .items
                .into_iter()
                .map(|song| ProviderItem {
                    provider: self.name().to_string(),
                    kind: EntityKind::Songs,
                    path: item_path(base_dir, song.id, false),
                    id: song.id,
                    label: song.title,
                })
                .collect(),
            total: result.total,
        })
    }
}

/// Fans a listing out to every registered provider supporting its kind and
/// concatenates the answers in registration order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn MetadataProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn MetadataProvider>) {
        debug!("Registering metadata provider {}", provider.name());
        self.providers.push(provider);
    }

    pub fn providers_for(&self, kind: EntityKind) -> impl Iterator<Item = &Arc<dyn MetadataProvider>> {
        self.providers.iter().filter(move |p| p.supports(kind))
    }

    fn merge<F>(&self, kind: EntityKind, fetch: F) -> ProviderListing
    where
        F: Fn(&dyn MetadataProvider) -> Option<ProviderListing>,
    {
        let mut merged = ProviderListing::default();
        for provider in self.providers_for(kind) {
            match fetch(provider.as_ref()) {
                Some(listing) => {
                    merged.total += listing.total;
                    merged.items.extend(listing.items);
                }
                None => warn!("Provider {} failed to list {}", provider.name(), kind),
            }
        }
        merged
    }

    pub fn get_playlists(
        &self,
        base_dir: &str,
        sort: Option<SortSpec>,
        count_only: bool,
    ) -> ProviderListing {
        self.merge(EntityKind::Playlists, |p| {
            p.get_playlists(base_dir, sort, count_only)
        })
    }

    pub fn get_songs(
        &self,
        base_dir: &str,
        query: &SongQuery,
        sort: Option<SortSpec>,
    ) -> ProviderListing {
        self.merge(EntityKind::Songs, |p| p.get_songs(base_dir, query, sort))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibrarySettings;
    use crate::library_store::{CreditInput, NewAlbum, NewSong};
    use crate::query::{RuleSet, SortField};

    struct StaticProvider {
        kinds: Vec<EntityKind>,
        fail: bool,
    }

    impl MetadataProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        fn supported_kinds(&self) -> &[EntityKind] {
            &self.kinds
        }

        fn get_playlists(
            &self,
            base_dir: &str,
            _sort: Option<SortSpec>,
            _count_only: bool,
        ) -> Option<ProviderListing> {
            if self.fail {
                return None;
            }
            Some(ProviderListing {
                items: vec![ProviderItem {
                    provider: "static".to_string(),
                    kind: EntityKind::Playlists,
                    id: 7,
                    label: "Remote mix".to_string(),
                    path: item_path(base_dir, 7, true),
                }],
                total: 1,
            })
        }

        fn get_songs(
            &self,
            _base_dir: &str,
            _query: &SongQuery,
            _sort: Option<SortSpec>,
        ) -> Option<ProviderListing> {
            if self.fail {
                None
            } else {
                Some(ProviderListing::default())
            }
        }
    }

    fn library() -> Arc<SqliteLibraryStore> {
        let store = SqliteLibraryStore::open_in_memory(LibrarySettings::default()).unwrap();
        let album = store
            .add_album(&NewAlbum {
                title: "Debut".to_string(),
                artist_display: "Band".to_string(),
                credits: vec![CreditInput::artist("Band")],
                ..Default::default()
            })
            .unwrap();
        for title in ["Second", "First"] {
            store
                .add_song(&NewSong {
                    album_id: album,
                    title: title.to_string(),
                    path: format!("/music/{}.flac", title),
                    credits: vec![CreditInput::artist("Band")],
                    ..Default::default()
                })
                .unwrap();
        }
        store.add_playlist("Everything", &RuleSet::new(EntityKind::Songs)).unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_item_path() {
        assert_eq!(item_path("db://playlists/", 3, true), "db://playlists/3/");
        assert_eq!(item_path("db://songs", 3, false), "db://songs/3");
        assert_eq!(item_path("", 3, false), "3");
    }

    #[test]
    fn test_local_provider_lists_songs_and_playlists() {
        let store = library();
        let songs = MetadataProvider::get_songs(
            store.as_ref(),
            "db://songs/",
            &SongQuery {
                artist: Some("Band".into()),
                ..Default::default()
            },
            Some(SortSpec::ascending(SortField::Title)),
        )
        .unwrap();
        assert_eq!(songs.total, 2);
        let titles: Vec<_> = songs.items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
        assert!(songs.items[0].path.starts_with("db://songs/"));

        // The inherent get_playlists lists stored playlists without paths
        let counted =
            MetadataProvider::get_playlists(store.as_ref(), "db://playlists/", None, true).unwrap();
        assert_eq!(counted.total, 1);
        assert!(counted.items.is_empty());
    }

    #[test]
    fn test_registry_merges_supporting_providers() {
        let mut registry = ProviderRegistry::new();
        registry.register(library());
        registry.register(Arc::new(StaticProvider {
            kinds: vec![EntityKind::Playlists],
            fail: false,
        }));
        registry.register(Arc::new(StaticProvider {
            kinds: vec![EntityKind::Playlists, EntityKind::Songs],
            fail: true,
        }));

        assert_eq!(registry.providers_for(EntityKind::Songs).count(), 2);
        assert_eq!(registry.providers_for(EntityKind::Albums).count(), 0);

        let playlists = registry.get_playlists("db://playlists/", None, false);
        assert_eq!(playlists.total, 2);
        let labels: Vec<_> = playlists.items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["Everything", "Remote mix"]);
        assert_eq!(playlists.items[1].provider, "static");

        let songs = registry.get_songs("db://songs/", &SongQuery::default(), None);
        assert_eq!(songs.total, 2);
    }
}
