//! Domain types shared across the acquisition pipeline.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::core::utility::Utility;

// =============================================================================
// Cookies and credentials
// =============================================================================

/// A browser cookie, as stored in the config file and replayed into the
/// automation backend or the `Cookie` request header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
    /// Unix timestamp; fractional values come straight from the browser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

/// Long-lived secrets plus short-lived session artifacts for one utility
/// account. Owned by the session manager; only a successful (re)login
/// mutates the artifact fields.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Answer to the login challenge question, when the utility asks one.
    pub challenge_answer: Option<String>,
    pub cookies: Vec<Cookie>,
    pub auth_token: Option<String>,
}

impl Credential {
    /// Whether an interactive login can be attempted.
    #[must_use]
    pub fn has_login(&self) -> bool {
        matches!((&self.username, &self.password), (Some(u), Some(p)) if !u.is_empty() && !p.is_empty())
    }

    /// Build a session from saved artifacts, if they are complete.
    ///
    /// A session is cookies *and* token; anything less is treated as absent
    /// so callers never see a partially-populated session.
    #[must_use]
    pub fn saved_session(&self) -> Option<Session> {
        let token = self.auth_token.clone().filter(|t| !t.is_empty())?;
        if self.cookies.is_empty() {
            return None;
        }
        Some(Session {
            cookies: self.cookies.clone(),
            token,
        })
    }
}

/// An authenticated context: session cookies plus the auth token captured
/// during login. Expiry is unknown in advance; it is discovered by a failed
/// downstream call.
#[derive(Debug, Clone)]
pub struct Session {
    pub cookies: Vec<Cookie>,
    pub token: String,
}

impl Session {
    /// Render the cookies as a `Cookie` request-header value.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// =============================================================================
// Date range
// =============================================================================

/// Inclusive calendar date range for an export request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The last `days` days, ending today (local time).
    #[must_use]
    pub fn last_days(days: u32) -> Self {
        let end = Local::now().date_naive();
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }
}

// =============================================================================
// Readings
// =============================================================================

/// One parsed payload row. Transient; exists only during extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub date: NaiveDate,
    /// The start-time cell verbatim. Hourly bucketing slices the hour out of
    /// this text because sub-hourly feeds label rows with bare `HH:MM`
    /// wall-clock times that carry no parseable date.
    pub start_text: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub kwh: f64,
}

/// One persisted usage reading.
///
/// Interval readings carry start/end timestamps and key on
/// (`start_time`, `service`); legacy daily readings carry only the date and
/// key on (`date`, `service`). The `published` flag is the only field that
/// ever changes after insert, and only from false to true.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageReading {
    pub id: i64,
    pub date: NaiveDate,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub kwh: f64,
    pub service: Utility,
    pub published: bool,
}

impl UsageReading {
    /// An unsaved reading (no row id yet, unpublished).
    #[must_use]
    pub const fn new(
        date: NaiveDate,
        start_time: Option<NaiveDateTime>,
        end_time: Option<NaiveDateTime>,
        kwh: f64,
        service: Utility,
    ) -> Self {
        Self {
            id: 0,
            date,
            start_time,
            end_time,
            kwh,
            service,
            published: false,
        }
    }
}
