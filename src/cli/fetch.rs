//! `gridwatt fetch` - run the acquisition pipeline for one utility.

use std::time::Duration;

use crate::cli::CliContext;
use crate::cli::args::FetchArgs;
use crate::core::models::DateRange;
use crate::core::orchestrator;
use crate::core::session::SessionManager;
use crate::core::utility::Utility;
use crate::core::webdriver::WebDriverProvider;
use crate::error::{GridwattError, Result};
use crate::providers::UtilityPipeline;
use crate::storage::config::{Config, ConfigCredentialStore};
use crate::storage::store::UsageStore;

/// # Errors
/// Surfaces the terminal error of the fetch run.
pub async fn execute(ctx: &CliContext, args: &FetchArgs) -> Result<()> {
    let utility = Utility::from_cli_name(&args.service)?;
    let config = Config::load_from(&ctx.config_path)?;
    let settings = config.utility(utility);
    let credential = settings.credential();

    if credential.saved_session().is_none() && !credential.has_login() {
        return Err(GridwattError::AuthNotConfigured {
            utility: utility.cli_name().to_string(),
        });
    }

    let store = UsageStore::open(&ctx.db_path)?;
    let days = args.days.unwrap_or_else(|| config.days_to_fetch(utility));
    let range = DateRange::last_days(days);
    println!(
        "Fetching {} usage for the last {days} days...",
        utility.display_name()
    );

    let mut sessions = SessionManager::new(
        utility,
        WebDriverProvider::new(config.webdriver.clone()),
        ConfigCredentialStore::new(ctx.config_path.clone()),
        credential,
    );
    let fetcher = UtilityPipeline::new(utility, &settings)?;

    // Overall deadline: covers the browser, polling, and persistence. Each
    // login gets a fresh browser, so nothing leaks when this fires.
    let report = tokio::time::timeout(
        Duration::from_secs(args.timeout),
        orchestrator::run_fetch(&mut sessions, &fetcher, &store, &range),
    )
    .await
    .map_err(|_| GridwattError::Timeout(args.timeout))??;

    if report.reauthenticated {
        println!("Session expired mid-fetch; refreshed credentials were saved");
    }
    println!(
        "Processed {} readings ({} new, {} already stored)",
        report.fetched,
        report.inserted,
        report.fetched - report.inserted
    );
    Ok(())
}
