//! Utility descriptors.
//!
//! Defines the supported utilities and their portal-specific metadata:
//! login flow selectors, the request header their web apps carry the auth
//! token in, and how their export rows aggregate to hourly records.

use serde::{Deserialize, Serialize};

use crate::core::aggregate::AggregationStrategy;
use crate::error::{GridwattError, Result};

// =============================================================================
// Utility Enum
// =============================================================================

/// Supported utility providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Utility {
    Nyseg,
    Coned,
}

impl Utility {
    /// All utilities in display order.
    pub const ALL: &'static [Self] = &[Self::Nyseg, Self::Coned];

    /// CLI name for this utility.
    #[must_use]
    pub const fn cli_name(self) -> &'static str {
        match self {
            Self::Nyseg => "nyseg",
            Self::Coned => "coned",
        }
    }

    /// Display name for human output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Nyseg => "NYSEG",
            Self::Coned => "Con Edison",
        }
    }

    /// Parse from CLI argument.
    pub fn from_cli_name(name: &str) -> Result<Self> {
        let lower = name.to_lowercase();
        Self::ALL
            .iter()
            .find(|u| u.cli_name() == lower)
            .copied()
            .ok_or_else(|| GridwattError::InvalidUtility(name.to_string()))
    }

    /// The request header this utility's web app carries its auth token in.
    ///
    /// The token is not retrievable through any queryable API; it is
    /// captured passively by watching outgoing requests during login.
    #[must_use]
    pub const fn token_header(self) -> &'static str {
        match self {
            Self::Nyseg => "Up-Authorization",
            Self::Coned => "Authorization",
        }
    }

    /// How this utility's export rows reduce to stored readings.
    ///
    /// NYSEG exports hourly rows with full interval timestamps; Con Edison
    /// exports 15-minute rows that are summed per clock hour.
    #[must_use]
    pub const fn aggregation(self) -> AggregationStrategy {
        match self {
            Self::Nyseg => AggregationStrategy::Identity,
            Self::Coned => AggregationStrategy::HourlySum,
        }
    }

    /// Interactive login flow for this utility's portal.
    #[must_use]
    pub const fn login_profile(self) -> LoginProfile {
        match self {
            Self::Nyseg => LoginProfile {
                login_url: "https://sso.nyseg.com/es/login",
                username_selector: "input#_com_liferay_login_web_portlet_LoginPortlet_login",
                password_selector: "input#_com_liferay_login_web_portlet_LoginPortlet_password",
                submit_selector: r#"button[type="submit"]"#,
                challenge: None,
                landing_url: "https://energymanager.nyseg.com/insights",
                landing_selector: Some("div.engage-insights-explore"),
            },
            Self::Coned => LoginProfile {
                login_url: "https://www.coned.com/en/login",
                username_selector: "input#form-login-email",
                password_selector: "input#form-login-password",
                submit_selector: "button.js-login-submit-button",
                challenge: Some(ChallengeProfile {
                    input_selector: "input#form-login-mfa-code",
                    submit_selector: "button.js-device-submit-button",
                }),
                landing_url: "https://www.coned.com/en/accounts-billing/my-account/energy-use",
                landing_selector: None,
            },
        }
    }
}

impl std::fmt::Display for Utility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cli_name())
    }
}

// =============================================================================
// Login profiles
// =============================================================================

/// Selectors and URLs for one utility's interactive login flow.
///
/// The auth token header name lives on [`Utility::token_header`]; the token
/// itself only appears once the landing page starts issuing API calls.
#[derive(Debug, Clone, Copy)]
pub struct LoginProfile {
    pub login_url: &'static str,
    pub username_selector: &'static str,
    pub password_selector: &'static str,
    pub submit_selector: &'static str,
    /// Challenge-question step shown by some portals after password submit.
    pub challenge: Option<ChallengeProfile>,
    /// Page that triggers the API traffic carrying the auth token.
    pub landing_url: &'static str,
    /// Element that signals the landing page finished rendering.
    pub landing_selector: Option<&'static str>,
}

/// Challenge-question selectors.
#[derive(Debug, Clone, Copy)]
pub struct ChallengeProfile {
    pub input_selector: &'static str,
    pub submit_selector: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_cli_name_is_case_insensitive() {
        assert_eq!(Utility::from_cli_name("NYSEG").unwrap(), Utility::Nyseg);
        assert_eq!(Utility::from_cli_name("coned").unwrap(), Utility::Coned);
        assert!(matches!(
            Utility::from_cli_name("pge"),
            Err(GridwattError::InvalidUtility(_))
        ));
    }

    #[test]
    fn token_headers_differ_per_portal() {
        assert_eq!(Utility::Nyseg.token_header(), "Up-Authorization");
        assert_eq!(Utility::Coned.token_header(), "Authorization");
    }

    #[test]
    fn coned_login_has_challenge_step() {
        assert!(Utility::Coned.login_profile().challenge.is_some());
        assert!(Utility::Nyseg.login_profile().challenge.is_none());
    }
}
