mod file_config;

pub use file_config::{FileConfig, LibraryFileConfig};

use crate::library_store::DateAddedPolicy;
use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;

pub const DEFAULT_CLEANUP_BATCH_SIZE: usize = 1000;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub date_added_policy: DateAddedPolicy,
    pub no_cache: bool,
    pub cleanup_batch_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub library: LibrarySettings,
}

/// Runtime knobs of the library store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySettings {
    pub date_added_policy: DateAddedPolicy,
    pub cache_enabled: bool,
    pub cleanup_batch_size: usize,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            date_added_policy: DateAddedPolicy::default(),
            cache_enabled: true,
            cleanup_batch_size: DEFAULT_CLEANUP_BATCH_SIZE,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| anyhow!("db_path must be specified via --db-path or in config file"))?;

        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let library_file = file.library.unwrap_or_default();
        let date_added_policy = match library_file.date_added_policy {
            Some(s) => DateAddedPolicy::parse(&s)
                .ok_or_else(|| anyhow!("Unknown date_added_policy '{}'", s))?,
            None => cli.date_added_policy,
        };
        let cleanup_batch_size = library_file
            .cleanup_batch_size
            .or(cli.cleanup_batch_size)
            .unwrap_or(DEFAULT_CLEANUP_BATCH_SIZE);
        if cleanup_batch_size == 0 {
            bail!("cleanup_batch_size must be greater than zero");
        }

        let library = LibrarySettings {
            date_added_policy,
            cache_enabled: library_file.cache_enabled.unwrap_or(!cli.no_cache),
            cleanup_batch_size,
        };

        Ok(Self { db_path, library })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().join("library.db")),
            date_added_policy: DateAddedPolicy::Now,
            no_cache: true,
            cleanup_batch_size: Some(50),
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_path, temp_dir.path().join("library.db"));
        assert_eq!(config.library.date_added_policy, DateAddedPolicy::Now);
        assert!(!config.library.cache_enabled);
        assert_eq!(config.library.cleanup_batch_size, 50);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/should/be/overridden.db")),
            no_cache: true,
            ..Default::default()
        };
        let file_config = FileConfig {
            db_path: Some(
                temp_dir
                    .path()
                    .join("toml.db")
                    .to_string_lossy()
                    .to_string(),
            ),
            library: Some(LibraryFileConfig {
                date_added_policy: Some("newest".to_string()),
                cache_enabled: Some(true),
                cleanup_batch_size: None,
            }),
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.db_path, temp_dir.path().join("toml.db"));
        assert_eq!(
            config.library.date_added_policy,
            DateAddedPolicy::NewestOfModifiedAndCreated
        );
        assert!(config.library.cache_enabled);
        assert_eq!(
            config.library.cleanup_batch_size,
            DEFAULT_CLEANUP_BATCH_SIZE
        );
    }

    #[test]
    fn test_resolve_missing_db_path_error() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result.unwrap_err().to_string().contains("db_path"));
    }

    #[test]
    fn test_resolve_db_path_is_directory_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_resolve_unknown_policy_error() {
        let temp_dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            db_path: Some(temp_dir.path().join("a.db").to_string_lossy().to_string()),
            library: Some(LibraryFileConfig {
                date_added_policy: Some("sometimes".to_string()),
                ..Default::default()
            }),
        };
        assert!(AppConfig::resolve(&CliConfig::default(), Some(file_config)).is_err());
    }
}
