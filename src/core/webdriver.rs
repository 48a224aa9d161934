//! WebDriver-backed browser automation.
//!
//! Drives a chromedriver instance over the WebDriver REST protocol. The
//! browser (DOM, cookie jar, JS engine) lives entirely in chromedriver; this
//! adapter only issues protocol commands and drains the CDP performance log
//! to surface outgoing network requests as [`RequestEvent`]s for the
//! session manager's token capture.

use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::automation::{Browser, BrowserProvider, RequestEvent};
use crate::core::http;
use crate::core::models::Cookie;
use crate::error::{GridwattError, Result};

/// W3C element identifier key in find-element responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Interval between element-visibility polls.
const VISIBILITY_POLL: Duration = Duration::from_millis(250);

/// Interval between performance-log drains.
const LOG_POLL: Duration = Duration::from_millis(500);

/// Where to reach chromedriver and how to launch the browser.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WebDriverSettings {
    /// chromedriver endpoint.
    #[serde(default = "default_endpoint")]
    pub url: String,
    /// Run the browser headless. Turned off for interactive login.
    #[serde(default = "default_headless")]
    pub headless: bool,
}

fn default_endpoint() -> String {
    "http://localhost:9515".to_string()
}

const fn default_headless() -> bool {
    true
}

impl Default for WebDriverSettings {
    fn default() -> Self {
        Self {
            url: default_endpoint(),
            headless: default_headless(),
        }
    }
}

/// Launches a fresh WebDriver session per login attempt.
#[derive(Debug, Clone)]
pub struct WebDriverProvider {
    settings: WebDriverSettings,
}

impl WebDriverProvider {
    #[must_use]
    pub const fn new(settings: WebDriverSettings) -> Self {
        Self { settings }
    }
}

impl BrowserProvider for WebDriverProvider {
    type Browser = WebDriverBrowser;

    async fn launch(&self) -> Result<WebDriverBrowser> {
        WebDriverBrowser::launch(&self.settings).await
    }
}

/// A live WebDriver session.
pub struct WebDriverBrowser {
    http: Client,
    session_url: String,
    events: Option<mpsc::UnboundedReceiver<RequestEvent>>,
    log_task: Option<JoinHandle<()>>,
    closed: bool,
}

impl WebDriverBrowser {
    /// Start a browser session against the configured chromedriver.
    ///
    /// # Errors
    ///
    /// Returns [`GridwattError::Browser`] if chromedriver is unreachable or
    /// refuses the session.
    pub async fn launch(settings: &WebDriverSettings) -> Result<Self> {
        let http = http::build_client(Duration::from_secs(60))?;

        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            format!("--user-agent={}", http::BROWSER_USER_AGENT),
        ];
        if settings.headless {
            args.push("--headless=new".to_string());
        }

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "goog:chromeOptions": { "args": args },
                    // CDP network events surface through the performance log;
                    // that is where the auth token capture reads from.
                    "goog:loggingPrefs": { "performance": "ALL" },
                }
            }
        });

        let base = settings.url.trim_end_matches('/').to_string();
        let value = command(
            &http,
            Method::POST,
            &format!("{base}/session"),
            Some(&capabilities),
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GridwattError::Browser("webdriver session response had no sessionId".to_string())
            })?;
        let session_url = format!("{base}/session/{session_id}");

        let (tx, rx) = mpsc::unbounded_channel();
        let log_task = tokio::spawn(drain_performance_log(
            http.clone(),
            session_url.clone(),
            tx,
        ));

        Ok(Self {
            http,
            session_url,
            events: Some(rx),
            log_task: Some(log_task),
            closed: false,
        })
    }

    async fn command(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        command(
            &self.http,
            method,
            &format!("{}{path}", self.session_url),
            body,
        )
        .await
    }

    async fn find_element(&self, selector: &str) -> Result<String> {
        let value = self
            .command(
                Method::POST,
                "/element",
                Some(&json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| {
                GridwattError::Browser(format!("element response missing id for {selector}"))
            })
    }
}

impl Browser for WebDriverBrowser {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.command(Method::POST, "/url", Some(&json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        let element = self.find_element(selector).await?;
        self.command(
            Method::POST,
            &format!("/element/{element}/value"),
            Some(&json!({ "text": value })),
        )
        .await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let element = self.find_element(selector).await?;
        self.command(
            Method::POST,
            &format!("/element/{element}/click"),
            Some(&json!({})),
        )
        .await?;
        Ok(())
    }

    async fn wait_visible(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(element) = self.find_element(selector).await {
                let displayed = self
                    .command(Method::GET, &format!("/element/{element}/displayed"), None)
                    .await?;
                if displayed.as_bool() == Some(true) {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(GridwattError::Browser(format!(
                    "timed out waiting for {selector}"
                )));
            }
            tokio::time::sleep(VISIBILITY_POLL).await;
        }
    }

    async fn is_present(&mut self, selector: &str) -> Result<bool> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(&json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        Ok(value.as_array().is_some_and(|els| !els.is_empty()))
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(&json!({ "script": script, "args": [] })),
        )
        .await
    }

    async fn cookies(&mut self) -> Result<Vec<Cookie>> {
        let value = self.command(Method::GET, "/cookie", None).await?;
        let raw = value.as_array().cloned().unwrap_or_default();
        Ok(raw
            .iter()
            .filter_map(|c| {
                Some(Cookie {
                    name: c.get("name")?.as_str()?.to_string(),
                    value: c.get("value")?.as_str()?.to_string(),
                    domain: c
                        .get("domain")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    path: c
                        .get("path")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    expires: c.get("expiry").and_then(Value::as_f64),
                    http_only: c
                        .get("httpOnly")
                        .and_then(Value::as_bool)
                        .unwrap_or_default(),
                    secure: c.get("secure").and_then(Value::as_bool).unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn set_cookies(&mut self, cookies: &[Cookie]) -> Result<()> {
        for cookie in cookies {
            let mut body = json!({
                "name": cookie.name,
                "value": cookie.value,
                "path": cookie.path,
                "httpOnly": cookie.http_only,
                "secure": cookie.secure,
            });
            if !cookie.domain.is_empty() {
                body["domain"] = Value::String(cookie.domain.clone());
            }
            // WebDriver only accepts cookies matching the current document's
            // domain; saved jars span several portal hosts, so refusals are
            // expected and non-fatal.
            if let Err(e) = self
                .command(Method::POST, "/cookie", Some(&json!({ "cookie": body })))
                .await
            {
                tracing::debug!(cookie = %cookie.name, error = %e, "cookie not replayed");
            }
        }
        Ok(())
    }

    fn subscribe_requests(&mut self) -> mpsc::UnboundedReceiver<RequestEvent> {
        self.events
            .take()
            .expect("subscribe_requests called twice on one browser")
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(task) = self.log_task.take() {
            task.abort();
        }
        self.command(Method::DELETE, "", None).await?;
        Ok(())
    }
}

impl Drop for WebDriverBrowser {
    fn drop(&mut self) {
        if let Some(task) = self.log_task.take() {
            task.abort();
        }
        // close() is the orderly path. When the browser is dropped mid-flight
        // (deadline expiry, error unwinding), still release the chromedriver
        // session so no browser process outlives the fetch attempt.
        if !self.closed {
            self.closed = true;
            let http = self.http.clone();
            let url = self.session_url.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = command(&http, Method::DELETE, &url, None).await;
                });
            }
        }
    }
}

/// Issue one WebDriver command and unwrap the `value` envelope.
async fn command(http: &Client, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(body);
    }
    let response = request
        .send()
        .await
        .map_err(|e| GridwattError::Browser(format!("webdriver request failed: {e}")))?;

    let status = response.status();
    let envelope: Value = response
        .json()
        .await
        .map_err(|e| GridwattError::Browser(format!("webdriver response undecodable: {e}")))?;

    if !status.is_success() {
        let message = envelope
            .pointer("/value/message")
            .and_then(Value::as_str)
            .unwrap_or("unknown webdriver error");
        return Err(GridwattError::Browser(format!(
            "webdriver command failed ({status}): {message}"
        )));
    }

    Ok(envelope.get("value").cloned().unwrap_or(Value::Null))
}

/// Poll the chromedriver performance log and forward outgoing-request events.
///
/// Runs until the session closes or the receiver is dropped. Reading the log
/// clears it server-side, so each entry is seen exactly once.
async fn drain_performance_log(
    http: Client,
    session_url: String,
    tx: mpsc::UnboundedSender<RequestEvent>,
) {
    loop {
        tokio::time::sleep(LOG_POLL).await;

        let entries = match command(
            &http,
            Method::POST,
            &format!("{session_url}/log"),
            Some(&json!({ "type": "performance" })),
        )
        .await
        {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => continue,
            // Session gone; nothing more to observe.
            Err(_) => return,
        };

        for entry in entries {
            let Some(event) = parse_log_entry(&entry) else {
                continue;
            };
            if tx.send(event).is_err() {
                return;
            }
        }
    }
}

/// Extract a request event from one performance-log entry, if it is a
/// `Network.requestWillBeSent` message.
fn parse_log_entry(entry: &Value) -> Option<RequestEvent> {
    let message: Value = serde_json::from_str(entry.get("message")?.as_str()?).ok()?;
    let inner = message.get("message")?;
    if inner.get("method")?.as_str()? != "Network.requestWillBeSent" {
        return None;
    }

    let request = inner.pointer("/params/request")?;
    let url = request.get("url")?.as_str()?.to_string();
    let headers = request
        .get("headers")?
        .as_object()?
        .iter()
        .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
        .collect();

    Some(RequestEvent { url, headers })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_will_be_sent_entries() {
        let message = json!({
            "message": {
                "method": "Network.requestWillBeSent",
                "params": {
                    "request": {
                        "url": "https://energymanager.nyseg.com/api/usage",
                        "headers": {
                            "Up-Authorization": "tok-abc",
                            "Accept": "application/json"
                        }
                    }
                }
            }
        });
        let entry = json!({
            "level": "INFO",
            "message": message.to_string(),
            "timestamp": 1_700_000_000_000_i64,
        });

        let event = parse_log_entry(&entry).expect("should parse");
        assert_eq!(event.url, "https://energymanager.nyseg.com/api/usage");
        assert_eq!(event.header("up-authorization"), Some("tok-abc"));
    }

    #[test]
    fn ignores_other_cdp_methods() {
        let message = json!({
            "message": { "method": "Network.responseReceived", "params": {} }
        });
        let entry = json!({ "message": message.to_string() });
        assert!(parse_log_entry(&entry).is_none());
    }

    #[test]
    fn ignores_undecodable_entries() {
        let entry = json!({ "message": "not json" });
        assert!(parse_log_entry(&entry).is_none());
    }
}
