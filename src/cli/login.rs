//! `gridwatt login` - interactive login with session capture.
//!
//! Opens a visible browser, lets the user log in by hand (including any
//! challenge the portal throws that automation cannot answer), and captures
//! the session: cookies from the jar, the auth token from observed request
//! traffic. Both are saved to the config file for later headless runs.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::CliContext;
use crate::cli::args::LoginArgs;
use crate::core::automation::Browser;
use crate::core::session::TokenCapture;
use crate::core::utility::Utility;
use crate::core::webdriver::WebDriverBrowser;
use crate::error::{GridwattError, Result};
use crate::storage::config::Config;

/// # Errors
/// Returns an error if the browser cannot be driven or nothing was captured.
pub async fn execute(ctx: &CliContext, args: &LoginArgs) -> Result<()> {
    let utility = Utility::from_cli_name(&args.service)?;
    let mut config = Config::load_from(&ctx.config_path)?;

    let mut settings = config.webdriver.clone();
    settings.headless = false;

    println!("Opening browser for {} login...", utility.display_name());
    let mut browser = WebDriverBrowser::launch(&settings).await?;

    let outcome = capture_session(&mut browser, utility).await;
    if let Err(e) = browser.close().await {
        tracing::warn!(error = %e, "browser close failed");
    }
    let (cookies, token) = outcome?;

    let mut credential = config.utility(utility).credential();
    credential.cookies = cookies;
    if let Some(token) = token {
        credential.auth_token = Some(token);
        println!("Captured auth token from network traffic");
    } else {
        println!("Warning: no auth token observed");
        println!("  Open the usage/insights page before pressing Enter, or add");
        println!("  username/password to the config for automatic login.");
    }

    config.set_session_artifacts(utility, &credential);
    config.save_to(&ctx.config_path)?;
    println!(
        "Saved {} cookies for {} to {}",
        credential.cookies.len(),
        utility.display_name(),
        ctx.config_path.display()
    );
    Ok(())
}

async fn capture_session(
    browser: &mut WebDriverBrowser,
    utility: Utility,
) -> Result<(Vec<crate::core::models::Cookie>, Option<String>)> {
    let capture = TokenCapture::spawn(utility.token_header(), browser.subscribe_requests());

    browser.navigate(utility.login_profile().login_url).await?;

    println!("Log in manually in the browser window.");
    println!("After logging in, visit the usage page so the app issues API calls.");
    println!("Then press Enter here to save the session...");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;

    // Grab whatever the observer has seen by now; the user already waited.
    let token = capture.wait(Duration::from_millis(250)).await;

    let cookies = browser.cookies().await?;
    if cookies.is_empty() {
        return Err(GridwattError::AuthFailed {
            utility: utility.cli_name().to_string(),
            reason: "no cookies found - make sure you are logged in".to_string(),
        });
    }

    Ok((cookies, token))
}
