//! Configuration file loading and management.
//!
//! One TOML document holds everything per utility: login credentials, saved
//! session artifacts (cookies + token), fetch overrides, and the dashboard
//! endpoint readings get published to.
//!
//! ```toml
//! [webdriver]
//! url = "http://localhost:9515"
//!
//! [nyseg]
//! username = "user@example.com"
//! password = "..."
//! days_to_fetch = 30
//!
//! [nyseg.dashboard]
//! url = "http://homeassistant.local:5050"
//! token = "..."
//! entity_id = "sensor.nyseg_energy_usage"
//! rate = 0.20
//! ```
//!
//! The session manager writes refreshed cookies and tokens back through
//! [`ConfigCredentialStore`] so later runs can skip the browser entirely.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::models::{Cookie, Credential};
use crate::core::session::CredentialStore;
use crate::core::utility::Utility;
use crate::core::webdriver::WebDriverSettings;
use crate::error::{GridwattError, Result};

/// Fallback fetch window in days (roughly three billing cycles).
pub const DEFAULT_DAYS_TO_FETCH: u32 = 90;

// =============================================================================
// Document model
// =============================================================================

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub nyseg: UtilityConfig,
    #[serde(default)]
    pub coned: UtilityConfig,
    #[serde(default)]
    pub webdriver: WebDriverSettings,
}

/// Per-utility settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtilityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Answer to the portal's challenge question, if it asks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_answer: Option<String>,
    /// Stable provider-side account identifier (Con Edison: customer uuid).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Saved session artifacts from the last successful login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<Cookie>,
    /// Override of the fetch window length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_to_fetch: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<DashboardConfig>,
}

impl UtilityConfig {
    /// The credential view the session manager works with.
    #[must_use]
    pub fn credential(&self) -> Credential {
        Credential {
            username: self.username.clone(),
            password: self.password.clone(),
            challenge_answer: self.challenge_answer.clone(),
            cookies: self.cookies.clone(),
            auth_token: self.auth_token.clone(),
        }
    }
}

/// Home Assistant endpoint readings are published to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// e.g. `http://homeassistant.local:5050`
    pub url: String,
    /// Long-lived access token.
    pub token: String,
    /// e.g. `sensor.nyseg_energy_usage`
    pub entity_id: String,
    /// Cost per kWh for cost statistics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

// =============================================================================
// Load / save
// =============================================================================

impl Config {
    /// Load from a path. A missing file is an empty config, so first runs
    /// work without any setup beyond `gridwatt login`.
    ///
    /// # Errors
    /// Returns [`GridwattError::ConfigParse`] for an unreadable document.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };

        toml::from_str(&raw).map_err(|e| GridwattError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save to a path, creating parent directories as needed.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)
            .map_err(|e| GridwattError::Config(format!("serializing config: {e}")))?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// Per-utility settings.
    #[must_use]
    pub fn utility(&self, utility: Utility) -> UtilityConfig {
        match utility {
            Utility::Nyseg => self.nyseg.clone(),
            Utility::Coned => self.coned.clone(),
        }
    }

    fn utility_mut(&mut self, utility: Utility) -> &mut UtilityConfig {
        match utility {
            Utility::Nyseg => &mut self.nyseg,
            Utility::Coned => &mut self.coned,
        }
    }

    /// Fetch window for a utility, falling back to the default.
    #[must_use]
    pub fn days_to_fetch(&self, utility: Utility) -> u32 {
        self.utility(utility)
            .days_to_fetch
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_DAYS_TO_FETCH)
    }

    /// Replace a utility's session artifacts with a refreshed credential.
    pub fn set_session_artifacts(&mut self, utility: Utility, credential: &Credential) {
        let entry = self.utility_mut(utility);
        entry.cookies = credential.cookies.clone();
        entry.auth_token = credential.auth_token.clone();
    }
}

// =============================================================================
// Credential write-back
// =============================================================================

/// Persists refreshed session artifacts into the config file.
#[derive(Debug, Clone)]
pub struct ConfigCredentialStore {
    path: PathBuf,
}

impl ConfigCredentialStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CredentialStore for ConfigCredentialStore {
    fn save(&self, utility: Utility, credential: &Credential) -> Result<()> {
        let mut config = Config::load_from(&self.path)?;
        config.set_session_artifacts(utility, credential);
        config.save_to(&self.path)?;
        tracing::debug!(utility = %utility, "saved refreshed session artifacts");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert!(config.nyseg.username.is_none());
        assert!(config.coned.username.is_none());
    }

    #[test]
    fn roundtrips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config {
            nyseg: UtilityConfig {
                username: Some("user@example.com".to_string()),
                password: Some("hunter2".to_string()),
                days_to_fetch: Some(30),
                dashboard: Some(DashboardConfig {
                    url: "http://ha.local:5050".to_string(),
                    token: "tok".to_string(),
                    entity_id: "sensor.nyseg_energy_usage".to_string(),
                    rate: Some(0.201),
                }),
                ..UtilityConfig::default()
            },
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        let nyseg = loaded.utility(Utility::Nyseg);
        assert_eq!(nyseg.username.as_deref(), Some("user@example.com"));
        assert_eq!(loaded.days_to_fetch(Utility::Nyseg), 30);
        assert_eq!(loaded.days_to_fetch(Utility::Coned), DEFAULT_DAYS_TO_FETCH);
        assert!(nyseg.dashboard.is_some());
    }

    #[test]
    fn invalid_document_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "nyseg = 12").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, GridwattError::ConfigParse { .. }));
    }

    #[test]
    fn credential_store_writes_artifacts_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config {
            nyseg: UtilityConfig {
                username: Some("user@example.com".to_string()),
                password: Some("hunter2".to_string()),
                ..UtilityConfig::default()
            },
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let credential = Credential {
            username: Some("user@example.com".to_string()),
            password: Some("hunter2".to_string()),
            cookies: vec![Cookie {
                name: "session".to_string(),
                value: "abc".to_string(),
                domain: ".nyseg.com".to_string(),
                path: "/".to_string(),
                expires: None,
                http_only: true,
                secure: true,
            }],
            auth_token: Some("tok-fresh".to_string()),
            challenge_answer: None,
        };
        ConfigCredentialStore::new(path.clone())
            .save(Utility::Nyseg, &credential)
            .unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.nyseg.auth_token.as_deref(), Some("tok-fresh"));
        assert_eq!(reloaded.nyseg.cookies.len(), 1);
        // Login credentials survive the artifact update.
        assert_eq!(reloaded.nyseg.username.as_deref(), Some("user@example.com"));
    }
}
