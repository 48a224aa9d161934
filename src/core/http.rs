//! HTTP client utilities.
//!
//! Provides a shared HTTP client for provider API calls and publishing.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::error::{GridwattError, Result};

/// Default timeout for HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent on provider API calls. The export gateways sit behind the
/// same WAF as the customer portal and reject obviously non-browser agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(BROWSER_USER_AGENT)
        .build()
        .map_err(|e| GridwattError::Network(e.to_string()))
}

/// Get a default HTTP client.
pub fn default_client() -> Result<Client> {
    build_client(DEFAULT_TIMEOUT)
}

/// Map a reqwest error to the gridwatt taxonomy.
pub(crate) fn classify_request_error(err: &reqwest::Error) -> GridwattError {
    if err.is_timeout() {
        GridwattError::Timeout(DEFAULT_TIMEOUT.as_secs())
    } else {
        GridwattError::Network(err.to_string())
    }
}
