//! Browser automation capability.
//!
//! The DOM automation itself (a real browser, its cookie jar, its JavaScript
//! engine) is an external capability consumed through the narrow [`Browser`]
//! trait; only the orchestration around it lives in this crate. The
//! production adapter is [`crate::core::webdriver::WebDriverBrowser`]; tests
//! use a scripted fake.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::core::models::Cookie;
use crate::error::Result;

/// One outgoing network request observed by the browser, as seen by the
/// traffic observer during login. Only the header map matters to us.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub url: String,
    pub headers: HashMap<String, String>,
}

impl RequestEvent {
    /// Look up a header value, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Narrow interface over an interactive browser.
///
/// `subscribe_requests` is the traffic-observer side channel: it delivers
/// [`RequestEvent`]s for outgoing requests on the automation backend's own
/// schedule, concurrently with whatever page activity the other methods
/// drive. It may be called at most once per browser instance.
pub trait Browser {
    async fn navigate(&mut self, url: &str) -> Result<()>;
    async fn fill(&mut self, selector: &str, value: &str) -> Result<()>;
    async fn click(&mut self, selector: &str) -> Result<()>;
    async fn wait_visible(&mut self, selector: &str, timeout: Duration) -> Result<()>;
    async fn is_present(&mut self, selector: &str) -> Result<bool>;
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;
    async fn cookies(&mut self) -> Result<Vec<Cookie>>;
    async fn set_cookies(&mut self, cookies: &[Cookie]) -> Result<()>;
    fn subscribe_requests(&mut self) -> mpsc::UnboundedReceiver<RequestEvent>;
    async fn close(&mut self) -> Result<()>;
}

/// Launches a fresh browser per login attempt.
///
/// Each interactive login gets its own browser instance so that a failed
/// attempt never leaks state (or a half-dead process) into the next one.
pub trait BrowserProvider {
    type Browser: Browser;

    async fn launch(&self) -> Result<Self::Browser>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("Up-Authorization".to_string(), "tok-123".to_string());
        let event = RequestEvent {
            url: "https://example.com/api".to_string(),
            headers,
        };

        assert_eq!(event.header("up-authorization"), Some("tok-123"));
        assert_eq!(event.header("UP-AUTHORIZATION"), Some("tok-123"));
        assert_eq!(event.header("authorization"), None);
    }
}
