//! gridwatt - utility usage collector
//!
//! CLI entry point.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use gridwatt::cli::{Cli, CliContext, Commands};
use gridwatt::core::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .or_else(logging::parse_log_level_from_env)
        .unwrap_or_default();
    let log_format = if cli.json_logs {
        logging::LogFormat::Json
    } else {
        logging::parse_log_format_from_env().unwrap_or_default()
    };
    logging::init(
        log_level,
        log_format,
        logging::parse_log_file_from_env(),
        cli.verbose,
    );

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> gridwatt::Result<()> {
    let ctx = CliContext::resolve(&cli);

    match &cli.command {
        Commands::Login(args) => gridwatt::cli::login::execute(&ctx, args).await,
        Commands::Fetch(args) => gridwatt::cli::fetch::execute(&ctx, args).await,
        Commands::List(args) => gridwatt::cli::list::execute(&ctx, args),
        Commands::Publish(args) => gridwatt::cli::publish::execute(&ctx, args).await,
        Commands::Stats(args) => gridwatt::cli::stats::execute(&ctx, args).await,
    }
}
