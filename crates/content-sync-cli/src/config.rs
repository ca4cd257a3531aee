use std::path::{Path, PathBuf};

use content_sync::remote::DEFAULT_DOWNLOAD_CONCURRENCY;
use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
    /// SQLite database holding remotes, repositories and versions.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Directory artifacts are stored under.
    #[serde(default = "default_storage")]
    pub storage: PathBuf,
    /// Log filter used when neither `-v` nor `RUST_LOG` is given.
    #[serde(default)]
    pub log_level: Option<String>,
    /// Concurrency for remotes created without `--concurrency`.
    #[serde(default = "default_download_concurrency")]
    pub default_download_concurrency: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            storage: default_storage(),
            log_level: None,
            default_download_concurrency: default_download_concurrency(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("content-sync")
}

fn default_database() -> PathBuf {
    data_dir().join("content.db")
}

fn default_storage() -> PathBuf {
    data_dir().join("artifacts")
}

fn default_download_concurrency() -> usize {
    DEFAULT_DOWNLOAD_CONCURRENCY
}

/// Config file path: `~/.config/content-sync/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("content-sync").join("config.toml"))
}

/// Load config from the default location, falling back to defaults.
pub fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_from(&path),
        None => AppConfig::default(),
    }
}

/// Load config from `path`, falling back to defaults if it is missing or
/// cannot be parsed.
pub fn load_from(path: &Path) -> AppConfig {
    if let Ok(contents) = std::fs::read_to_string(path) {
        if let Ok(config) = toml::from_str::<AppConfig>(&contents) {
            return config;
        }
        eprintln!(
            "warning: failed to parse config at {}, using defaults",
            path.display()
        );
    }

    AppConfig::default()
}
