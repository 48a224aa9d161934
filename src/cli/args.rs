//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Collect electricity usage from utility portals into SQLite and publish
/// it to a Home Assistant energy dashboard.
#[derive(Parser, Debug)]
#[command(name = "gridwatt")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Config file path
    #[arg(long, global = true, value_name = "PATH", env = "GRIDWATT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file path
    #[arg(long, global = true, value_name = "PATH", env = "GRIDWATT_DB")]
    pub db: Option<PathBuf>,

    /// Log level
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit JSON logs to stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in to a utility portal interactively and save the session
    Login(LoginArgs),

    /// Fetch usage readings into the local database
    Fetch(FetchArgs),

    /// List stored readings
    List(ListArgs),

    /// Publish stored readings to the dashboard
    Publish(PublishArgs),

    /// Compile dashboard statistics from published readings
    Stats(StatsArgs),
}

/// Arguments for the `login` command.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Utility to log in to (nyseg or coned)
    pub service: String,
}

/// Arguments for the `fetch` command.
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Utility to fetch (nyseg or coned)
    pub service: String,

    /// Days of history to request (default: per-utility config, else 90)
    #[arg(long, value_name = "N")]
    pub days: Option<u32>,

    /// Overall deadline for the fetch in seconds
    #[arg(long, value_name = "SECONDS", default_value = "300")]
    pub timeout: u64,
}

/// Arguments for the `list` command.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Filter by utility (default: all)
    #[arg(long, value_name = "SERVICE")]
    pub service: Option<String>,
}

/// Arguments for the `publish` command.
#[derive(Parser, Debug)]
pub struct PublishArgs {
    /// Utility to publish (default: all configured)
    #[arg(long, value_name = "SERVICE")]
    pub service: Option<String>,

    /// Only publish readings on or after this date (YYYY-MM-DD or Nd)
    #[arg(long, value_name = "DATE")]
    pub since: Option<String>,

    /// Only publish readings on or before this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub until: Option<String>,

    /// Republish everything, ignoring the published flag
    #[arg(long)]
    pub all: bool,

    /// Limit number of readings to publish (0 = no limit)
    #[arg(long, value_name = "N", default_value = "0")]
    pub limit: usize,
}

/// Arguments for the `stats` command.
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Utility to compile statistics for
    #[arg(long, value_name = "SERVICE", default_value = "nyseg")]
    pub service: String,

    /// Cost per kWh for cost statistics (overrides config)
    #[arg(long, value_name = "RATE")]
    pub rate: Option<f64>,
}
