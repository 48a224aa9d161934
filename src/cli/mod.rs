//! Command implementations.

pub mod args;
pub mod fetch;
pub mod list;
pub mod login;
pub mod publish;
pub mod stats;

use std::path::PathBuf;

pub use args::{Cli, Commands};

use crate::storage::paths::AppPaths;

/// Resolved file locations shared by every command.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config_path: PathBuf,
    pub db_path: PathBuf,
}

impl CliContext {
    /// Resolve paths from CLI flags, falling back to platform defaults.
    #[must_use]
    pub fn resolve(cli: &Cli) -> Self {
        let paths = AppPaths::new();
        Self {
            config_path: cli.config.clone().unwrap_or_else(|| paths.config_file()),
            db_path: cli.db.clone().unwrap_or_else(|| paths.database_file()),
        }
    }
}
