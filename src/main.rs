use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use music_library_db::config::{self, AppConfig, CliConfig};
use music_library_db::library_store::{
    DateAddedPolicy, ExportOptions, OpenOutcome, ProgressMonitor, SqliteLibraryStore,
};
use music_library_db::query::{
    BrowseOptions, EntityKind, IdOrName, LibraryBrowse, Page, SortField, SortSpec,
};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path))
}

fn parse_policy(s: &str) -> Result<DateAddedPolicy, String> {
    DateAddedPolicy::parse(s).ok_or_else(|| format!("Unknown date-added policy '{}'", s))
}

fn parse_sort(s: &str) -> Result<SortSpec, String> {
    let (field, descending) = match s.strip_prefix('-') {
        Some(field) => (field, true),
        None => (s, false),
    };
    let field: SortField = serde_json::from_value(serde_json::Value::String(field.to_string()))
        .map_err(|_| format!("Unknown sort field '{}'", field))?;
    Ok(SortSpec { field, descending })
}

fn id_or_name(s: &str) -> IdOrName {
    s.parse::<i64>()
        .map(IdOrName::Id)
        .unwrap_or_else(|_| IdOrName::Name(s.to_string()))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the library database. Created when missing.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// How the date-added of new files is chosen: mtime, newest or now.
    #[clap(long, value_parser = parse_policy, default_value = "mtime")]
    pub date_added_policy: DateAddedPolicy,

    /// Disable the in-process result cache.
    #[clap(long)]
    pub no_cache: bool,

    /// Rows handled between cancellation checks in batch operations.
    #[clap(long)]
    pub cleanup_batch_size: Option<usize>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print schema version, scan state and row counts.
    Info,
    /// Remove songs whose files are gone and everything left orphaned.
    Cleanup,
    /// Write curated artist and album metadata as JSON.
    Export {
        /// Output file, stdout when omitted.
        #[clap(long, value_parser = parse_path)]
        output: Option<PathBuf>,
        #[clap(long)]
        no_art: bool,
        #[clap(long)]
        albums_only: bool,
    },
    /// Merge a previous export onto the matching artists and albums.
    Import {
        #[clap(value_parser = parse_path)]
        input: PathBuf,
    },
    /// List one kind of entity.
    Browse {
        kind: EntityKind,
        #[clap(long)]
        genre: Option<String>,
        #[clap(long)]
        artist: Option<String>,
        #[clap(long)]
        album: Option<String>,
        #[clap(long)]
        playlist: Option<String>,
        #[clap(long)]
        year: Option<i32>,
        /// Sort field, prefixed with '-' for descending order.
        #[clap(long, value_parser = parse_sort)]
        sort: Option<SortSpec>,
        #[clap(long, default_value_t = 0)]
        offset: u64,
        /// Zero lists everything.
        #[clap(long, default_value_t = 50)]
        limit: u64,
    },
}

/// Logs batch progress at most once per stage change or tenth of the work.
#[derive(Default)]
struct LogProgress {
    stage: String,
    last_decile: u64,
}

impl ProgressMonitor for LogProgress {
    fn on_progress(&mut self, stage: &str, done: u64, total: u64) {
        let decile = if total == 0 { 10 } else { done * 10 / total };
        if stage != self.stage || decile > self.last_decile {
            info!("{}: {}/{}", stage, done, total);
            self.stage = stage.to_string();
            self.last_decile = decile;
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn run(store: &SqliteLibraryStore, command: Command) -> Result<()> {
    match command {
        Command::Info => {
            let counts = store
                .counts()
                .ok_or_else(|| anyhow!("Failed to count library rows"))?;
            let scan = store.get_tag_scan_state().unwrap_or_default();
            info!("Schema version: {:?}", store.schema_version());
            info!("Tag rescan needed: {:?}", scan.needs_scan);
            info!("Last scan: {:?}", scan.last_scan);
            print_json(&counts)?;
        }
        Command::Cleanup => {
            let report = store.cleanup(&mut LogProgress::default())?;
            info!(
                "Removed {} songs, {} albums, {} paths, {} artists",
                report.songs, report.albums, report.paths, report.artists
            );
        }
        Command::Export {
            output,
            no_art,
            albums_only,
        } => {
            let options = ExportOptions {
                artists: !albums_only,
                albums: true,
                include_art: !no_art,
            };
            let mut monitor = LogProgress::default();
            let summary = match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {:?}", path))?;
                    store.export_library(BufWriter::new(file), &options, &mut monitor)?
                }
                None => store.export_library(std::io::stdout().lock(), &options, &mut monitor)?,
            };
            info!(
                "Exported {} artists and {} albums",
                summary.artists, summary.albums
            );
        }
        Command::Import { input } => {
            let file =
                File::open(&input).with_context(|| format!("Failed to open {:?}", input))?;
            let summary = store.import_library(BufReader::new(file), &mut LogProgress::default())?;
            print_json(&summary)?;
        }
        Command::Browse {
            kind,
            genre,
            artist,
            album,
            playlist,
            year,
            sort,
            offset,
            limit,
        } => {
            let options = BrowseOptions {
                genre: genre.as_deref().map(id_or_name),
                artist: artist.as_deref().map(id_or_name),
                album: album.as_deref().map(id_or_name),
                playlist: playlist.as_deref().map(id_or_name),
                year,
                sort,
                page: Some(Page { offset, limit }),
                ..Default::default()
            };
            print_json(&store.get_items(kind, &options))?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        date_added_policy: cli_args.date_added_policy,
        no_cache: cli_args.no_cache,
        cleanup_batch_size: cli_args.cleanup_batch_size,
    };
    let app_config = AppConfig::resolve(&cli_config, file_config)?;
    info!("Configuration loaded:");
    info!("  db_path: {:?}", app_config.db_path);
    info!("  settings: {:?}", app_config.library);

    let store = SqliteLibraryStore::open(&app_config.db_path, app_config.library)?;
    match store.open_outcome() {
        OpenOutcome::Created => info!("Created a new library"),
        OpenOutcome::Migrated { from } => info!("Migrated library from version {}", from),
        OpenOutcome::UpToDate => {}
    }
    if let Some(version) = store.needs_tag_scan() {
        warn!("Library schema {} asks for a full tag rescan", version);
    }

    run(&store, cli_args.command)
}
