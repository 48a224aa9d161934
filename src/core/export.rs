//! Asynchronous export-job client.
//!
//! Both supported portals expose the same contract shape: submit an export
//! request, poll a status endpoint until the job reaches a terminal state,
//! then fetch the payload — sometimes inline in the poll response, sometimes
//! from a result URL on a different, unauthenticated host. The
//! provider-specific request/response shapes live behind [`ExportProtocol`];
//! this module owns the poll loop and its classification rules.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::core::http;
use crate::core::models::{DateRange, Session};
use crate::core::utility::Utility;
use crate::error::{GridwattError, Result};

/// Fixed interval between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Attempt budget for one export job.
pub const MAX_POLL_ATTEMPTS: u32 = 60;

/// Partially-ready results are consumed only after this many attempts, so a
/// slow job is not cut short while the provider is still filling it in.
pub const MIN_ATTEMPTS_FOR_PARTIAL: u32 = 5;

// =============================================================================
// Protocol seam
// =============================================================================

/// A submitted export job awaiting completion. Never persisted; discarded
/// once the payload is retrieved or the job is declared dead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub id: String,
}

/// What a submit call produced.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The response body was already the payload.
    Payload(Vec<u8>),
    /// The provider started a job to poll.
    Job(ExportJob),
}

/// Where a finished job's payload lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultLocation {
    /// The poll response body was itself the payload.
    Inline(Vec<u8>),
    /// Fetch from here, unauthenticated.
    Url(String),
}

/// Classification of one poll response.
#[derive(Debug)]
pub enum PollOutcome {
    Ready(ResultLocation),
    /// Result exists but the provider marked it incomplete.
    Partial(ResultLocation),
    Pending,
    Failed(String),
}

/// Provider-specific submit/poll wire formats.
pub trait ExportProtocol {
    fn utility(&self) -> Utility;

    async fn submit(
        &self,
        http: &Client,
        session: &Session,
        range: &DateRange,
    ) -> Result<SubmitOutcome>;

    async fn poll(
        &self,
        http: &Client,
        session: &Session,
        job: &ExportJob,
    ) -> Result<PollOutcome>;
}

/// Reclassify 401/403 as an auth failure regardless of job state, so the
/// orchestrator can tell "data not ready" from "my credentials died".
///
/// # Errors
/// Returns [`GridwattError::AuthFailed`] for 401/403.
pub fn ensure_authorized(status: StatusCode, utility: Utility) -> Result<()> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(GridwattError::AuthFailed {
            utility: utility.cli_name().to_string(),
            reason: format!("provider returned status {status}"),
        });
    }
    Ok(())
}

// =============================================================================
// Client
// =============================================================================

/// Drives an export to completion: submit, poll, fetch.
pub struct ExportJobClient {
    http: Client,
    poll_interval: Duration,
    max_attempts: u32,
}

impl ExportJobClient {
    /// Client with production poll settings.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: http::default_client()?,
            poll_interval: POLL_INTERVAL,
            max_attempts: MAX_POLL_ATTEMPTS,
        })
    }

    /// Override poll timing; tests shrink the interval to milliseconds.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_poll_settings(poll_interval: Duration, max_attempts: u32) -> Result<Self> {
        Ok(Self {
            http: http::default_client()?,
            poll_interval,
            max_attempts,
        })
    }

    /// Submit an export and return the final payload bytes.
    ///
    /// # Errors
    ///
    /// - [`GridwattError::AuthFailed`] when any call returns 401/403
    /// - [`GridwattError::ExportFailed`] when the job reports failure
    /// - [`GridwattError::PollTimeout`] when the attempt budget runs out
    pub async fn request_export<P: ExportProtocol>(
        &self,
        protocol: &P,
        session: &Session,
        range: &DateRange,
    ) -> Result<Vec<u8>> {
        match protocol.submit(&self.http, session, range).await? {
            SubmitOutcome::Payload(bytes) => {
                tracing::debug!(bytes = bytes.len(), "export returned payload directly");
                Ok(bytes)
            }
            SubmitOutcome::Job(job) => {
                tracing::info!(job = %job.id, "export job submitted, polling");
                self.poll_until_ready(protocol, session, &job).await
            }
        }
    }

    async fn poll_until_ready<P: ExportProtocol>(
        &self,
        protocol: &P,
        session: &Session,
        job: &ExportJob,
    ) -> Result<Vec<u8>> {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.poll_interval).await;

            match protocol.poll(&self.http, session, job).await? {
                PollOutcome::Ready(location) => {
                    tracing::info!(job = %job.id, attempt, "export job ready");
                    return self.fetch_result(protocol.utility(), location).await;
                }
                PollOutcome::Partial(location) if attempt > MIN_ATTEMPTS_FOR_PARTIAL => {
                    tracing::info!(job = %job.id, attempt, "accepting partial export result");
                    return self.fetch_result(protocol.utility(), location).await;
                }
                PollOutcome::Partial(_) | PollOutcome::Pending => {
                    tracing::debug!(job = %job.id, attempt, "export job still pending");
                }
                PollOutcome::Failed(message) => {
                    return Err(GridwattError::ExportFailed {
                        utility: protocol.utility().cli_name().to_string(),
                        message,
                    });
                }
            }
        }

        Err(GridwattError::PollTimeout {
            utility: protocol.utility().cli_name().to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Retrieve the payload from wherever the job left it. Result URLs point
    /// at a storage host that takes no credentials.
    async fn fetch_result(&self, utility: Utility, location: ResultLocation) -> Result<Vec<u8>> {
        match location {
            ResultLocation::Inline(bytes) => Ok(bytes),
            ResultLocation::Url(url) => {
                let response = self
                    .http
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| http::classify_request_error(&e))?;
                if !response.status().is_success() {
                    return Err(GridwattError::ExportFailed {
                        utility: utility.cli_name().to_string(),
                        message: format!("result fetch returned status {}", response.status()),
                    });
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| http::classify_request_error(&e))?;
                Ok(bytes.to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_statuses_become_auth_errors() {
        let err = ensure_authorized(StatusCode::UNAUTHORIZED, Utility::Nyseg).unwrap_err();
        assert!(err.is_auth());

        let err = ensure_authorized(StatusCode::FORBIDDEN, Utility::Coned).unwrap_err();
        assert!(err.is_auth());

        assert!(ensure_authorized(StatusCode::OK, Utility::Nyseg).is_ok());
        assert!(ensure_authorized(StatusCode::INTERNAL_SERVER_ERROR, Utility::Nyseg).is_ok());
    }
}
