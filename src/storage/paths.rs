//! Platform paths for config and database files.
//!
//! - Linux: `~/.config/gridwatt/` and `~/.local/share/gridwatt/`
//! - macOS: `~/Library/Application Support/gridwatt/`
//!
//! `GRIDWATT_CONFIG` and `GRIDWATT_DB` override the defaults, which keeps
//! cron jobs and tests away from the real account data.

use std::path::PathBuf;

use directories::ProjectDirs;

/// Environment variable overriding the config file path.
pub const ENV_CONFIG: &str = "GRIDWATT_CONFIG";

/// Environment variable overriding the database path.
pub const ENV_DB: &str = "GRIDWATT_DB";

/// Resolved application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    #[must_use]
    pub fn new() -> Self {
        ProjectDirs::from("", "", "gridwatt").map_or_else(
            || Self {
                // No home directory (containers); fall back to cwd.
                config_dir: PathBuf::from("."),
                data_dir: PathBuf::from("."),
            },
            |dirs| Self {
                config_dir: dirs.config_dir().to_path_buf(),
                data_dir: dirs.data_dir().to_path_buf(),
            },
        )
    }

    /// Path to the TOML config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        std::env::var(ENV_CONFIG).map_or_else(
            |_| self.config_dir.join("config.toml"),
            PathBuf::from,
        )
    }

    /// Path to the SQLite database.
    #[must_use]
    pub fn database_file(&self) -> PathBuf {
        std::env::var(ENV_DB)
            .map_or_else(|_| self.data_dir.join("usage.db"), PathBuf::from)
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
