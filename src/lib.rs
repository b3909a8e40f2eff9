//! Music library persistence and query engine.
//!
//! The library exposes the store, its query layer and the provider
//! contract for embedding and for the integration tests.

pub mod cache;
pub mod config;
pub mod library_store;
pub mod provider;
pub mod query;
pub mod sqlite_persistence;

pub use library_store::SqliteLibraryStore;
pub use provider::{MetadataProvider, ProviderRegistry};
pub use query::{BrowseOptions, EntityKind, LibraryBrowse};
