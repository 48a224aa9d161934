//! `gridwatt stats` - trigger statistics compilation on the dashboard.
//!
//! Run after `publish`: the dashboard compiles the backfilled hourly states
//! into long-term statistics, which is what its energy view reads.

use crate::cli::CliContext;
use crate::cli::args::StatsArgs;
use crate::core::utility::Utility;
use crate::error::{GridwattError, Result};
use crate::publish::Publisher;
use crate::storage::config::Config;

/// # Errors
/// Returns an error when the dashboard rejects either compilation call.
pub async fn execute(ctx: &CliContext, args: &StatsArgs) -> Result<()> {
    let utility = Utility::from_cli_name(&args.service)?;
    let config = Config::load_from(&ctx.config_path)?;

    let dashboard = config.utility(utility).dashboard.ok_or_else(|| {
        GridwattError::DashboardNotConfigured {
            utility: utility.cli_name().to_string(),
        }
    })?;
    let publisher = Publisher::new(&dashboard)?;

    println!(
        "Generating statistics for {} ({})...",
        dashboard.entity_id,
        utility.display_name()
    );
    let stats = publisher.generate_statistics().await?;
    println!("Statistics generated:");
    println!("  inserted: {}", stats.inserted);
    println!("  updated: {}", stats.updated);
    println!("  total hours: {}", stats.total_hours);

    println!("Generating cost statistics...");
    let cost = publisher.generate_cost_statistics(args.rate).await?;
    println!("Cost statistics generated:");
    println!("  inserted: {}", cost.inserted);
    println!("  updated: {}", cost.updated);
    println!("  total cost: ${:.2}", cost.total_cost);
    if cost.rate_used > 0.0 {
        println!("  rate used: ${:.5}/kWh", cost.rate_used);
    }

    Ok(())
}
