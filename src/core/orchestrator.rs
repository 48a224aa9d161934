//! Fetch orchestration.
//!
//! Ties the pipeline together: ensure session → export → extract →
//! aggregate → persist, with a one-shot reauthentication when a stage
//! reports that the session died mid-flight. Any other failure is terminal,
//! and a second auth failure after a refresh is too — there is no unbounded
//! retry loop.

use crate::core::models::{DateRange, Session, UsageReading};
use crate::error::Result;
use crate::storage::store::UsageStore;

// =============================================================================
// Seams
// =============================================================================

/// Produces a currently-valid session; owns the login state machine.
pub trait SessionProvider {
    /// Return the cached session, or log in if none survives.
    async fn ensure_session(&mut self) -> Result<Session>;

    /// Forced fresh login, ignoring any cached session. Implementations
    /// persist the refreshed credential artifacts before returning.
    async fn refresh_session(&mut self) -> Result<Session>;

    /// Whether username/password are configured, i.e. whether
    /// reauthentication is even possible.
    fn has_login_credentials(&self) -> bool;
}

/// Fetches and normalizes readings for one utility over one date range.
pub trait UsageFetcher {
    async fn fetch(&self, session: &Session, range: &DateRange) -> Result<Vec<UsageReading>>;
}

// =============================================================================
// State machine
// =============================================================================

/// Fetch attempt lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    Fetching,
    Reauthenticating,
    Done,
}

/// Outcome of a completed fetch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Readings produced by the pipeline.
    pub fetched: usize,
    /// Readings actually inserted (the rest were natural-key duplicates).
    pub inserted: usize,
    /// Whether the run went through the reauthentication path.
    pub reauthenticated: bool,
}

/// Run one fetch: session → fetch pipeline → idempotent persist.
///
/// An auth failure flips the machine to `Reauthenticating` exactly once,
/// provided login credentials are configured; the refreshed run then starts
/// over from `Fetching`. Everything persisted by an earlier attempt stays
/// put — writes are append-only and idempotent, so a retried fetch simply
/// re-covers the same range.
///
/// # Errors
///
/// Propagates the terminal error of the final attempt.
pub async fn run_fetch<S, F>(
    sessions: &mut S,
    fetcher: &F,
    store: &UsageStore,
    range: &DateRange,
) -> Result<FetchReport>
where
    S: SessionProvider,
    F: UsageFetcher,
{
    let mut state = FetchState::Fetching;
    let mut report = FetchReport::default();

    while state != FetchState::Done {
        match state {
            FetchState::Fetching => {
                let attempt = async {
                    let session = sessions.ensure_session().await?;
                    fetcher.fetch(&session, range).await
                }
                .await;

                match attempt {
                    Ok(readings) => {
                        report.fetched = readings.len();
                        report.inserted = 0;
                        for reading in &readings {
                            if store.insert(reading)? {
                                report.inserted += 1;
                            }
                        }
                        tracing::info!(
                            fetched = report.fetched,
                            inserted = report.inserted,
                            "fetch complete"
                        );
                        state = FetchState::Done;
                    }
                    Err(e)
                        if e.is_auth()
                            && !report.reauthenticated
                            && sessions.has_login_credentials() =>
                    {
                        tracing::warn!(error = %e, "auth failure mid-fetch, refreshing session");
                        state = FetchState::Reauthenticating;
                    }
                    Err(e) => return Err(e),
                }
            }
            FetchState::Reauthenticating => {
                sessions.refresh_session().await?;
                report.reauthenticated = true;
                state = FetchState::Fetching;
            }
            FetchState::Done => unreachable!("loop exits on Done"),
        }
    }

    Ok(report)
}
