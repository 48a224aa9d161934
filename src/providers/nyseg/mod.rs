//! NYSEG export protocol.
//!
//! The energy-manager API looks synchronous but is not: the download
//! endpoint either returns the CSV directly (rare, for small ranges) or a
//! JSON body holding a `promise_id`. Promises are polled at `/promix/{id}`
//! until the response is the CSV itself, or a JSON status that points at a
//! result URL on the storage host.

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use crate::core::export::{
    ExportJob, ExportProtocol, PollOutcome, ResultLocation, SubmitOutcome, ensure_authorized,
};
use crate::core::http;
use crate::core::models::{DateRange, Session};
use crate::core::utility::Utility;
use crate::error::{GridwattError, Result};

/// Production API gateway.
pub const DEFAULT_BASE_URL: &str = "https://engage-api-gw-dod79bsd.ue.gateway.dev";

/// NYSEG direct-API export client.
#[derive(Debug, Clone)]
pub struct NysegExport {
    base_url: String,
}

impl NysegExport {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point at a different gateway (tests use a mock server).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, http: &Client, url: &str, session: &Session) -> reqwest::RequestBuilder {
        http.get(url)
            .header("Up-Authorization", &session.token)
            .header("Cookie", session.cookie_header())
            .header("Referer", Utility::Nyseg.login_profile().landing_url)
            .header(CONTENT_TYPE, "application/json")
    }
}

impl Default for NysegExport {
    fn default() -> Self {
        Self::new()
    }
}

/// Submit response when the export is deferred.
#[derive(Debug, Deserialize)]
struct PromiseEnvelope {
    promise_id: Option<String>,
}

/// Poll response while the promise is outstanding.
#[derive(Debug, Deserialize)]
struct PromiseStatus {
    #[serde(default)]
    code: String,
    #[serde(default)]
    promise_url: String,
}

impl ExportProtocol for NysegExport {
    fn utility(&self) -> Utility {
        Utility::Nyseg
    }

    async fn submit(
        &self,
        http: &Client,
        session: &Session,
        range: &DateRange,
    ) -> Result<SubmitOutcome> {
        let url = format!("{}/usage/usage/download", self.base_url);
        let response = self
            .request(http, &url, session)
            .query(&[
                ("from_ces", "True"),
                ("commodity", "electric"),
                ("date", &range.start.to_string()),
                ("end_date", &range.end.to_string()),
                ("format", "csv"),
            ])
            .send()
            .await
            .map_err(|e| http::classify_request_error(&e))?;

        let status = response.status();
        ensure_authorized(status, Utility::Nyseg)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| http::classify_request_error(&e))?;

        if !status.is_success() {
            return Err(GridwattError::ExportFailed {
                utility: Utility::Nyseg.cli_name().to_string(),
                message: format!(
                    "download endpoint returned status {status}: {}",
                    String::from_utf8_lossy(&body)
                ),
            });
        }

        // A JSON body means the export was deferred behind a promise.
        if content_type.contains("json") {
            if let Ok(envelope) = serde_json::from_slice::<PromiseEnvelope>(&body) {
                if let Some(id) = envelope.promise_id.filter(|id| !id.is_empty()) {
                    return Ok(SubmitOutcome::Job(ExportJob { id }));
                }
            }
        }

        Ok(SubmitOutcome::Payload(body.to_vec()))
    }

    async fn poll(
        &self,
        http: &Client,
        session: &Session,
        job: &ExportJob,
    ) -> Result<PollOutcome> {
        let url = format!("{}/promix/{}", self.base_url, job.id);
        let response = self
            .request(http, &url, session)
            .send()
            .await
            .map_err(|e| http::classify_request_error(&e))?;

        ensure_authorized(response.status(), Utility::Nyseg)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| http::classify_request_error(&e))?;

        // The promise endpoint answers with the CSV itself once finished.
        if content_type.contains("csv") || content_type.contains("text") {
            return Ok(PollOutcome::Ready(ResultLocation::Inline(body.to_vec())));
        }

        let Ok(status) = serde_json::from_slice::<PromiseStatus>(&body) else {
            return Ok(PollOutcome::Pending);
        };

        if !status.promise_url.is_empty() {
            match status.code.as_str() {
                "PROMISE_FOUND" => {
                    return Ok(PollOutcome::Ready(ResultLocation::Url(status.promise_url)));
                }
                "PROMISE_FOUND_PARTIAL_DATA" => {
                    return Ok(PollOutcome::Partial(ResultLocation::Url(
                        status.promise_url,
                    )));
                }
                _ => {}
            }
        }

        if status.code.contains("ERROR") || status.code.contains("FAILED") {
            return Ok(PollOutcome::Failed(format!(
                "export generation failed with code {}",
                status.code
            )));
        }

        Ok(PollOutcome::Pending)
    }
}
