//! The browse contract consumed by virtual-path navigation layers.

use super::options::{BrowseOptions, EntityKind};
use serde::Serialize;

/// String key under which a [`crate::cache::StringSource`] translates the
/// missing-artist placeholder.
pub const MISSING_ARTIST_LABEL_KEY: &str = "library.missing_artist";

/// One page of a listing plus the number of rows matching without paging.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BrowseResult<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Default for BrowseResult<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

impl<T> BrowseResult<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> BrowseResult<U> {
        BrowseResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    pub kind: EntityKind,
    pub id: i64,
    pub label: String,
}

pub trait LibraryBrowse {
    /// Ordered page of summaries. A failed query yields an empty result.
    fn get_items(&self, kind: EntityKind, options: &BrowseOptions) -> BrowseResult<ItemSummary>;

    /// Display label of one entity, translated for placeholders.
    fn get_item_label(&self, kind: EntityKind, id: i64) -> Option<String>;
}
