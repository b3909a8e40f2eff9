mod albums;
mod artists;
mod artwork;
mod browse;
mod cleanup;
mod interchange;
mod migration;
mod models;
mod paths;
mod playlists;
mod progress;
mod schema;
mod songs;
mod sources;
mod store;
mod vocabulary;

pub use cleanup::{CleanupError, CleanupReport};
pub use interchange::{
    ExportOptions, ExportSummary, ExportedAlbum, ExportedArtist, ImportSummary, LibraryExport,
};
pub use migration::{MigrationError, OpenOutcome};
pub use models::*;
pub use paths::normalize_path;
pub use progress::{NoProgress, ProgressMonitor};
pub use schema::{LIBRARY_SCHEMA_VERSION, LIBRARY_VERSIONED_SCHEMAS, TAG_RESCAN_THRESHOLD};
pub use sources::{combine_paths, split_multipath};
pub use store::SqliteLibraryStore;
