//! Session lifecycle management.
//!
//! Produces a currently-valid authenticated [`Session`] for one utility
//! account. A cached session is reused until a downstream call proves it
//! dead; otherwise an interactive login is driven through the browser
//! automation capability while a traffic observer watches outgoing requests
//! for the utility's auth-token header.
//!
//! The portals never hand the token out through a queryable API. It only
//! appears as a request header once the landing page starts calling the
//! usage backend, and it is only trustworthy on the first request that
//! carries it, so the capture slot is guarded by a mutex and accepts exactly
//! one value.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::core::automation::{Browser, BrowserProvider, RequestEvent};
use crate::core::models::{Credential, Session};
use crate::core::orchestrator::SessionProvider;
use crate::core::utility::{LoginProfile, Utility};
use crate::error::{GridwattError, Result};

/// How long to wait for the login form to appear.
const LOGIN_WAIT: Duration = Duration::from_secs(20);

/// How long to wait for the landing page to finish rendering.
const LANDING_WAIT: Duration = Duration::from_secs(20);

/// How long the portal gets to decide whether to show a challenge question.
const CHALLENGE_SETTLE: Duration = Duration::from_secs(2);

/// Bounded window for the token to show up in observed traffic.
pub(crate) const TOKEN_WAIT: Duration = Duration::from_secs(30);

// =============================================================================
// Credential persistence seam
// =============================================================================

/// Write-back sink for refreshed credential artifacts.
///
/// Implemented by the config layer; a successful (re)login persists the new
/// cookies and token through this so later runs can skip the browser.
pub trait CredentialStore {
    /// # Errors
    /// Returns an error if the artifacts cannot be persisted.
    fn save(&self, utility: Utility, credential: &Credential) -> Result<()>;
}

// =============================================================================
// Session manager
// =============================================================================

/// Owns the login state machine for one utility account.
pub struct SessionManager<P: BrowserProvider, S: CredentialStore> {
    utility: Utility,
    provider: P,
    store: S,
    credential: Credential,
    cached: Option<Session>,
}

impl<P: BrowserProvider, S: CredentialStore> SessionManager<P, S> {
    /// Build a manager seeded from saved credential artifacts.
    pub fn new(utility: Utility, provider: P, store: S, credential: Credential) -> Self {
        let cached = credential.saved_session();
        Self {
            utility,
            provider,
            store,
            credential,
            cached,
        }
    }

    /// The credential as currently held (refreshed artifacts included).
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    async fn login(&mut self) -> Result<Session> {
        if !self.credential.has_login() {
            return Err(GridwattError::AuthNotConfigured {
                utility: self.utility.cli_name().to_string(),
            });
        }

        tracing::info!(utility = %self.utility, "performing interactive login");
        let profile = self.utility.login_profile();
        let mut browser = self.provider.launch().await?;
        let outcome = drive_login(&mut browser, self.utility, &profile, &self.credential).await;
        if let Err(e) = browser.close().await {
            tracing::warn!(utility = %self.utility, error = %e, "browser close failed");
        }
        let session = outcome?;

        // Write the artifacts back so later runs start from this session.
        self.credential.cookies = session.cookies.clone();
        self.credential.auth_token = Some(session.token.clone());
        self.store.save(self.utility, &self.credential)?;

        self.cached = Some(session.clone());
        tracing::info!(utility = %self.utility, "login succeeded, session cached");
        Ok(session)
    }
}

impl<P: BrowserProvider, S: CredentialStore> SessionProvider for SessionManager<P, S> {
    /// Return the cached session if one exists; log in otherwise.
    async fn ensure_session(&mut self) -> Result<Session> {
        if let Some(session) = &self.cached {
            tracing::debug!(utility = %self.utility, "reusing cached session");
            return Ok(session.clone());
        }
        self.login().await
    }

    /// Forced login: ignores any cached session.
    async fn refresh_session(&mut self) -> Result<Session> {
        self.cached = None;
        self.login().await
    }

    fn has_login_credentials(&self) -> bool {
        self.credential.has_login()
    }
}

/// Drive the interactive login flow on a live browser.
async fn drive_login<B: Browser>(
    browser: &mut B,
    utility: Utility,
    profile: &LoginProfile,
    credential: &Credential,
) -> Result<Session> {
    let username = credential.username.as_deref().unwrap_or_default();
    let password = credential.password.as_deref().unwrap_or_default();

    // Subscribe before any page activity so no request goes unobserved.
    let capture = TokenCapture::spawn(utility.token_header(), browser.subscribe_requests());

    // Always a fresh jar: a half-expired session replayed here could skip
    // the login form and leave the flow waiting on selectors that never
    // appear. Expired credentials are exactly why we are logging in.
    browser.navigate(profile.login_url).await?;
    browser
        .wait_visible(profile.username_selector, LOGIN_WAIT)
        .await?;
    browser.fill(profile.username_selector, username).await?;
    browser.fill(profile.password_selector, password).await?;
    browser.click(profile.submit_selector).await?;

    if let Some(challenge) = profile.challenge {
        tokio::time::sleep(CHALLENGE_SETTLE).await;
        if browser.is_present(challenge.input_selector).await? {
            let answer = credential
                .challenge_answer
                .as_deref()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| GridwattError::AuthFailed {
                    utility: utility.cli_name().to_string(),
                    reason: "challenge question required but no answer configured".to_string(),
                })?;
            tracing::debug!(utility = %utility, "answering challenge question");
            browser.fill(challenge.input_selector, answer).await?;
            browser.click(challenge.submit_selector).await?;
        }
    }

    // The landing page is what fires the API calls that carry the token;
    // the capture task is already listening while this load settles.
    browser.navigate(profile.landing_url).await?;
    if let Some(selector) = profile.landing_selector {
        browser.wait_visible(selector, LANDING_WAIT).await?;
    }

    let token = capture
        .wait(TOKEN_WAIT)
        .await
        .ok_or_else(|| GridwattError::TokenNotObserved {
            utility: utility.cli_name().to_string(),
        })?;

    let cookies = browser.cookies().await?;
    if cookies.is_empty() {
        return Err(GridwattError::AuthFailed {
            utility: utility.cli_name().to_string(),
            reason: "no session cookies present after login".to_string(),
        });
    }

    Ok(Session { cookies, token })
}

// =============================================================================
// Token capture
// =============================================================================

/// One-shot capture of an auth token from observed request traffic.
///
/// The observer delivers events on its own task while the login flow is
/// simultaneously driving page loads; the slot mutex plus the none-check
/// make sure exactly one value is accepted even when several concurrent
/// requests carry the header.
pub(crate) struct TokenCapture {
    slot: Arc<Mutex<Option<String>>>,
    notify: Arc<Notify>,
    task: JoinHandle<()>,
}

impl TokenCapture {
    pub(crate) fn spawn(
        header: &str,
        mut events: mpsc::UnboundedReceiver<RequestEvent>,
    ) -> Self {
        let header = header.to_string();
        let slot = Arc::new(Mutex::new(None));
        let notify = Arc::new(Notify::new());

        let task = tokio::spawn({
            let slot = Arc::clone(&slot);
            let notify = Arc::clone(&notify);
            async move {
                while let Some(event) = events.recv().await {
                    let Some(value) = event.header(&header) else {
                        continue;
                    };
                    let token = normalize_token(value);
                    if token.is_empty() {
                        continue;
                    }
                    let mut guard = slot.lock().expect("token slot poisoned");
                    if guard.is_none() {
                        tracing::debug!(url = %event.url, "captured auth token");
                        *guard = Some(token);
                        notify.notify_one();
                    }
                    // Later occurrences are ignored.
                }
            }
        });

        Self { slot, notify, task }
    }

    /// Wait up to `window` for a token to be captured.
    pub(crate) async fn wait(&self, window: Duration) -> Option<String> {
        tokio::time::timeout(window, async {
            loop {
                if let Some(token) = self.slot.lock().expect("token slot poisoned").clone() {
                    return token;
                }
                self.notify.notified().await;
            }
        })
        .await
        .ok()
    }
}

impl Drop for TokenCapture {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The header value sometimes arrives scheme-prefixed; store the bare token.
fn normalize_token(value: &str) -> String {
    value
        .strip_prefix("Bearer ")
        .unwrap_or(value)
        .trim()
        .to_string()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        RecordingStore, ScriptedBrowser, ScriptedProvider, cookie, request_event,
    };

    fn credential_with_login() -> Credential {
        Credential {
            username: Some("user@example.com".to_string()),
            password: Some("hunter2".to_string()),
            ..Credential::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cached_session_is_returned_without_browser_activity() {
        let credential = Credential {
            cookies: vec![cookie("JSESSIONID", "abc")],
            auth_token: Some("tok-cached".to_string()),
            ..credential_with_login()
        };
        // No scripted browsers queued: any launch attempt would error.
        let provider = ScriptedProvider::new(vec![]);
        let mut manager = SessionManager::new(
            Utility::Nyseg,
            provider.clone(),
            RecordingStore::default(),
            credential,
        );

        let session = manager.ensure_session().await.expect("cached session");
        assert_eq!(session.token, "tok-cached");
        assert_eq!(provider.launches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn login_captures_first_token_only() {
        let browser = ScriptedBrowser::new()
            .with_cookies(vec![cookie("session", "s1")])
            .with_request_events(vec![
                request_event("https://cdn.example.com/app.js", &[]),
                request_event(
                    "https://api.example.com/usage",
                    &[("Up-Authorization", "tok-first")],
                ),
                request_event(
                    "https://api.example.com/billing",
                    &[("Up-Authorization", "tok-second")],
                ),
            ]);
        let store = RecordingStore::default();
        let mut manager = SessionManager::new(
            Utility::Nyseg,
            ScriptedProvider::new(vec![browser]),
            store.clone(),
            credential_with_login(),
        );

        let session = manager.ensure_session().await.expect("login succeeds");
        assert_eq!(session.token, "tok-first");
        assert_eq!(session.cookies.len(), 1);

        // Refreshed artifacts were written back for later runs.
        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, Utility::Nyseg);
        assert_eq!(saved[0].1.auth_token.as_deref(), Some("tok-first"));
        assert_eq!(saved[0].1.cookies.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bearer_prefix_is_stripped_from_captured_token() {
        let browser = ScriptedBrowser::new()
            .with_cookies(vec![cookie("session", "s1")])
            .with_request_events(vec![request_event(
                "https://cned.opower.com/ei/edge/apis/graphql",
                &[("Authorization", "Bearer tok-opower")],
            )]);
        let mut manager = SessionManager::new(
            Utility::Coned,
            ScriptedProvider::new(vec![browser]),
            RecordingStore::default(),
            Credential {
                challenge_answer: Some("blue".to_string()),
                ..credential_with_login()
            },
        );

        let session = manager.ensure_session().await.expect("login succeeds");
        assert_eq!(session.token, "tok-opower");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_token_in_traffic_is_an_auth_error() {
        let browser = ScriptedBrowser::new()
            .with_cookies(vec![cookie("session", "s1")])
            .with_request_events(vec![request_event("https://cdn.example.com/app.js", &[])]);
        let mut manager = SessionManager::new(
            Utility::Nyseg,
            ScriptedProvider::new(vec![browser]),
            RecordingStore::default(),
            credential_with_login(),
        );

        let err = manager.ensure_session().await.expect_err("no token");
        assert!(matches!(err, GridwattError::TokenNotObserved { .. }));
        assert!(err.is_auth());
    }

    #[tokio::test(start_paused = true)]
    async fn login_without_credentials_is_not_attempted() {
        let provider = ScriptedProvider::new(vec![]);
        let mut manager = SessionManager::new(
            Utility::Nyseg,
            provider.clone(),
            RecordingStore::default(),
            Credential::default(),
        );

        let err = manager.ensure_session().await.expect_err("no credentials");
        assert!(matches!(err, GridwattError::AuthNotConfigured { .. }));
        assert_eq!(provider.launches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_ignores_cached_session() {
        let browser = ScriptedBrowser::new()
            .with_cookies(vec![cookie("session", "fresh")])
            .with_request_events(vec![request_event(
                "https://api.example.com/usage",
                &[("Up-Authorization", "tok-fresh")],
            )]);
        let credential = Credential {
            cookies: vec![cookie("JSESSIONID", "stale")],
            auth_token: Some("tok-stale".to_string()),
            ..credential_with_login()
        };
        let provider = ScriptedProvider::new(vec![browser]);
        let mut manager = SessionManager::new(
            Utility::Nyseg,
            provider.clone(),
            RecordingStore::default(),
            credential,
        );

        let session = manager.refresh_session().await.expect("forced login");
        assert_eq!(session.token, "tok-fresh");
        assert_eq!(provider.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn challenge_without_answer_fails_login() {
        let browser = ScriptedBrowser::new()
            .with_present_selector("input#form-login-mfa-code")
            .with_cookies(vec![cookie("session", "s1")])
            .with_request_events(vec![request_event(
                "https://cned.opower.com/api",
                &[("Authorization", "Bearer tok")],
            )]);
        let mut manager = SessionManager::new(
            Utility::Coned,
            ScriptedProvider::new(vec![browser]),
            RecordingStore::default(),
            credential_with_login(),
        );

        let err = manager.ensure_session().await.expect_err("challenge unanswered");
        assert!(matches!(err, GridwattError::AuthFailed { .. }));
    }

    #[test]
    fn normalize_token_strips_bearer_scheme() {
        assert_eq!(normalize_token("Bearer abc"), "abc");
        assert_eq!(normalize_token("abc"), "abc");
        assert_eq!(normalize_token("  spaced  "), "spaced");
    }
}
