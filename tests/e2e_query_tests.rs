//! End-to-end tests for browse queries and the provider registry

mod common;

use common::{
    TestLibrary, ALBUM_1_TITLE, ALBUM_2_TITLE, BAND_NAME, COMPOSER_NAME, COMPOSER_ROLE,
    JAZZ_GENRE, ROCK_GENRE, SINGER_NAME,
};
use music_library_db::provider::{ProviderRegistry, SongQuery};
use music_library_db::query::{
    BrowseOptions, EntityKind, IdOrName, LibraryBrowse, Page, RoleFilter, Rule, RuleField,
    RuleOperator, RuleSet, SortField, SortSpec,
};
use std::sync::Arc;

fn labels(library: &TestLibrary, kind: EntityKind, options: &BrowseOptions) -> Vec<String> {
    library
        .store
        .get_items(kind, options)
        .items
        .into_iter()
        .map(|item| item.label)
        .collect()
}

fn by_title() -> Option<SortSpec> {
    Some(SortSpec::ascending(SortField::Title))
}

// =============================================================================
// Albums
// =============================================================================

#[test]
fn test_albums_by_genre_are_those_with_a_song_of_that_genre() {
    let library = TestLibrary::seeded();
    let rock = library.store.get_genre_id(ROCK_GENRE).unwrap();
    let jazz = library.store.get_genre_id(JAZZ_GENRE).unwrap();

    let rock_albums = library.store.get_albums_by_where(&BrowseOptions {
        genre: Some(IdOrName::Id(rock)),
        ..Default::default()
    });
    let ids: Vec<_> = rock_albums.items.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![library.album_1]);
    assert_eq!(rock_albums.total, 1);

    let jazz_albums = library.store.get_albums_by_where(&BrowseOptions {
        genre: Some(IdOrName::Id(jazz)),
        sort: by_title(),
        ..Default::default()
    });
    let ids: Vec<_> = jazz_albums.items.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![library.album_1, library.album_2]);
}

#[test]
fn test_albums_by_artist_name() {
    let library = TestLibrary::seeded();
    let options = BrowseOptions {
        artist: Some(SINGER_NAME.into()),
        ..Default::default()
    };
    assert_eq!(
        labels(&library, EntityKind::Albums, &options),
        vec![ALBUM_2_TITLE]
    );
}

// =============================================================================
// Artists and Roles
// =============================================================================

#[test]
fn test_default_artist_listing_hides_contributors() {
    let library = TestLibrary::seeded();
    let options = BrowseOptions::default();
    assert_eq!(
        labels(&library, EntityKind::Artists, &options),
        vec![SINGER_NAME, BAND_NAME]
    );

    let composers = BrowseOptions {
        role: RoleFilter::Name(COMPOSER_ROLE.to_string()),
        ..Default::default()
    };
    assert_eq!(
        labels(&library, EntityKind::Artists, &composers),
        vec![COMPOSER_NAME]
    );

    let everyone = BrowseOptions {
        role: RoleFilter::All,
        ..Default::default()
    };
    assert_eq!(library.store.get_items(EntityKind::Artists, &everyone).total, 3);
}

#[test]
fn test_album_artists_only_narrows_contributor_roles() {
    let library = TestLibrary::seeded();
    let album_artists = BrowseOptions {
        album_artists_only: true,
        ..Default::default()
    };
    assert_eq!(
        labels(&library, EntityKind::Artists, &album_artists),
        vec![SINGER_NAME, BAND_NAME]
    );

    // The composer is credited on a song only
    let composing_album_artists = BrowseOptions {
        album_artists_only: true,
        role: RoleFilter::Name(COMPOSER_ROLE.to_string()),
        ..Default::default()
    };
    assert!(labels(&library, EntityKind::Artists, &composing_album_artists).is_empty());
}

#[test]
fn test_songs_by_contributor() {
    let library = TestLibrary::seeded();
    let options = BrowseOptions {
        artist: Some(COMPOSER_NAME.into()),
        role: RoleFilter::Name(COMPOSER_ROLE.to_string()),
        ..Default::default()
    };
    assert_eq!(labels(&library, EntityKind::Songs, &options), vec!["Noon"]);

    let by_band = BrowseOptions {
        artist: Some(BAND_NAME.into()),
        sort: by_title(),
        ..Default::default()
    };
    assert_eq!(
        labels(&library, EntityKind::Songs, &by_band),
        vec!["Noon", "Sunrise"]
    );
}

// =============================================================================
// Rule Sets and Paging
// =============================================================================

#[test]
fn test_rule_sets_of_other_kinds_are_dropped() {
    let library = TestLibrary::seeded();
    let album_rules = RuleSet::new(EntityKind::Albums).with_rule(Rule::new(
        RuleField::Title,
        RuleOperator::Is,
        &["nothing matches this"],
    ));
    let options = BrowseOptions {
        rules: Some(album_rules.clone()),
        filter: Some(album_rules),
        ..Default::default()
    };
    assert_eq!(library.store.get_items(EntityKind::Songs, &options).total, 3);
}

#[test]
fn test_rule_set_limit_and_sort() {
    let library = TestLibrary::seeded();
    let mut jazz = RuleSet::new(EntityKind::Songs).with_rule(Rule::new(
        RuleField::Genre,
        RuleOperator::Is,
        &[JAZZ_GENRE],
    ));
    let options = BrowseOptions {
        rules: Some(jazz.clone()),
        sort: by_title(),
        ..Default::default()
    };
    assert_eq!(
        labels(&library, EntityKind::Songs, &options),
        vec!["Breeze", "Noon"]
    );

    jazz.sort = Some(SortSpec::descending(SortField::Title));
    jazz.limit = Some(1);
    let limited = BrowseOptions {
        rules: Some(jazz),
        ..Default::default()
    };
    let result = library.store.get_items(EntityKind::Songs, &limited);
    assert_eq!(result.total, 1);
    assert_eq!(result.items[0].label, "Noon");
}

#[test]
fn test_pages_report_the_unpaged_total() {
    let library = TestLibrary::seeded();
    let first_page = BrowseOptions {
        sort: by_title(),
        page: Some(Page {
            offset: 0,
            limit: 2,
        }),
        ..Default::default()
    };
    let page = library.store.get_items(EntityKind::Songs, &first_page);
    assert_eq!(page.total, 3);
    let titles: Vec<_> = page.items.iter().map(|i| i.label.as_str()).collect();
    assert_eq!(titles, vec!["Breeze", "Noon"]);

    let second_page = BrowseOptions {
        page: Some(Page {
            offset: 2,
            limit: 2,
        }),
        ..first_page
    };
    let page = library.store.get_items(EntityKind::Songs, &second_page);
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].label, "Sunrise");
}

#[test]
fn test_item_labels() {
    let library = TestLibrary::seeded();
    assert_eq!(
        library
            .store
            .get_item_label(EntityKind::Albums, library.album_1)
            .as_deref(),
        Some(ALBUM_1_TITLE)
    );
    assert_eq!(library.store.get_item_label(EntityKind::Albums, 9999), None);
}

// =============================================================================
// Providers
// =============================================================================

#[test]
fn test_registry_lists_local_songs_and_playlists() {
    let library = TestLibrary::seeded();
    let playlist = RuleSet::new(EntityKind::Songs).with_rule(Rule::new(
        RuleField::Genre,
        RuleOperator::Is,
        &[ROCK_GENRE],
    ));
    library.store.add_playlist("Rock songs", &playlist).unwrap();

    let TestLibrary { dir, store, .. } = library;
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(store));

    let playlists = registry.get_playlists("library://playlists/", None, false);
    assert_eq!(playlists.total, 1);
    assert_eq!(playlists.items[0].label, "Rock songs");
    assert!(playlists.items[0].path.ends_with('/'));

    let rock = registry.get_songs(
        "library://songs/",
        &SongQuery {
            playlist: Some("Rock songs".into()),
            ..Default::default()
        },
        by_title(),
    );
    let titles: Vec<_> = rock.items.iter().map(|i| i.label.as_str()).collect();
    assert_eq!(titles, vec!["Noon", "Sunrise"]);
    drop(dir);
}
