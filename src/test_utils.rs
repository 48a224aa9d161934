//! Shared test utilities.
//!
//! Available to unit tests and, via the `test-utils` feature, to the
//! integration tests under `tests/`.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::core::automation::{Browser, BrowserProvider, RequestEvent};
use crate::core::models::{Cookie, Credential};
use crate::core::session::CredentialStore;
use crate::core::utility::Utility;
use crate::error::{GridwattError, Result};

// =============================================================================
// Fixtures
// =============================================================================

/// Hourly interval export, the NYSEG direct-API shape.
pub const NYSEG_INTERVAL_CSV: &str = "\
Date,Start Time,End Time,Usage(Real energy in kilowatt-hours),Weather
2024-03-01,2024-03-01 00:00:00,2024-03-01 01:00:00,0.62,Clear
2024-03-01,2024-03-01 01:00:00,2024-03-01 02:00:00,0.58,Clear
2024-03-01,2024-03-01 02:00:00,2024-03-01 03:00:00,0.71,Cloudy
";

/// Daily-granularity export with no per-row timestamps.
pub const NYSEG_DAILY_CSV: &str = "\
Date,Usage
2024-03-01,11.5
2024-03-02,9.25
";

/// Quarter-hour export, the Con Edison shape.
pub const CONED_QUARTER_HOUR_CSV: &str = "\
TYPE,DATE,START TIME,END TIME,USAGE,UNITS,NOTES
Electric usage,2024-03-01,00:00,00:14,0.25,kWh,
Electric usage,2024-03-01,00:15,00:29,0.30,kWh,
Electric usage,2024-03-01,00:30,00:44,0.20,kWh,
Electric usage,2024-03-01,00:45,00:59,0.25,kWh,
Electric usage,2024-03-01,01:00,01:14,0.40,kWh,
";

/// A plain cookie with just a name and value.
#[must_use]
pub fn cookie(name: &str, value: &str) -> Cookie {
    Cookie {
        name: name.to_string(),
        value: value.to_string(),
        domain: String::new(),
        path: String::new(),
        expires: None,
        http_only: false,
        secure: false,
    }
}

/// A request event with the given headers.
#[must_use]
pub fn request_event(url: &str, headers: &[(&str, &str)]) -> RequestEvent {
    RequestEvent {
        url: url.to_string(),
        headers: headers
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
    }
}

// =============================================================================
// Scripted browser
// =============================================================================

/// Browser fake that replays canned cookies and request events.
///
/// Queued request events are emitted on every `navigate` call, which models
/// page loads firing API traffic while the login flow is mid-drive.
#[derive(Debug, Default)]
pub struct ScriptedBrowser {
    emit_on_navigate: Vec<RequestEvent>,
    cookies: Vec<Cookie>,
    present: HashSet<String>,
    tx: Option<mpsc::UnboundedSender<RequestEvent>>,
    /// URLs visited, for assertions.
    pub visited: Vec<String>,
    /// Form fills performed, as (selector, value).
    pub filled: Vec<(String, String)>,
    /// Whether close() was called.
    pub closed: bool,
}

impl ScriptedBrowser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_request_events(mut self, events: Vec<RequestEvent>) -> Self {
        self.emit_on_navigate = events;
        self
    }

    #[must_use]
    pub fn with_cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.cookies = cookies;
        self
    }

    #[must_use]
    pub fn with_present_selector(mut self, selector: &str) -> Self {
        self.present.insert(selector.to_string());
        self
    }
}

impl Browser for ScriptedBrowser {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.visited.push(url.to_string());
        if let Some(tx) = &self.tx {
            for event in self.emit_on_navigate.drain(..) {
                let _ = tx.send(event);
            }
        }
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        self.filled.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn click(&mut self, _selector: &str) -> Result<()> {
        Ok(())
    }

    async fn wait_visible(&mut self, _selector: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn is_present(&mut self, selector: &str) -> Result<bool> {
        Ok(self.present.contains(selector))
    }

    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn cookies(&mut self) -> Result<Vec<Cookie>> {
        Ok(self.cookies.clone())
    }

    async fn set_cookies(&mut self, cookies: &[Cookie]) -> Result<()> {
        self.cookies.extend(cookies.iter().cloned());
        Ok(())
    }

    fn subscribe_requests(&mut self) -> mpsc::UnboundedReceiver<RequestEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tx = Some(tx);
        rx
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Hands out scripted browsers in order, one per login attempt.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    queue: Arc<Mutex<VecDeque<ScriptedBrowser>>>,
    launched: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(browsers: Vec<ScriptedBrowser>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(browsers.into())),
            launched: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many browsers have been launched so far.
    #[must_use]
    pub fn launches(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }
}

impl BrowserProvider for ScriptedProvider {
    type Browser = ScriptedBrowser;

    async fn launch(&self) -> Result<ScriptedBrowser> {
        self.launched.fetch_add(1, Ordering::SeqCst);
        self.queue
            .lock()
            .expect("scripted queue poisoned")
            .pop_front()
            .ok_or_else(|| GridwattError::Browser("no scripted browser queued".to_string()))
    }
}

// =============================================================================
// Recording credential store
// =============================================================================

/// Credential store that records every save.
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    saved: Arc<Mutex<Vec<(Utility, Credential)>>>,
}

impl RecordingStore {
    /// Everything saved so far.
    #[must_use]
    pub fn saved(&self) -> Vec<(Utility, Credential)> {
        self.saved.lock().expect("recording store poisoned").clone()
    }
}

impl CredentialStore for RecordingStore {
    fn save(&self, utility: Utility, credential: &Credential) -> Result<()> {
        self.saved
            .lock()
            .expect("recording store poisoned")
            .push((utility, credential.clone()));
        Ok(())
    }
}
