//! Error types for gridwatt.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! - **Authentication**: rejected credentials, expired sessions, a login
//!   that never produced an auth token. The only recoverable class: the
//!   fetch orchestrator reauthenticates exactly once when one of these
//!   surfaces mid-fetch.
//! - **Export**: the provider's export job reported failure, or polling
//!   exhausted its attempt budget. Fatal.
//! - **Parse**: the export payload did not have the expected shape
//!   (missing required columns). Fatal at batch level; individual bad rows
//!   are skipped during extraction and never surface here.
//! - **Storage**: SQLite failures. Fatal.
//! - **Configuration / Network / Internal**: the usual ambient classes.

use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Authentication issues (expired sessions, rejected logins).
    Authentication,
    /// Export-job issues (provider-reported failure, poll exhaustion).
    Export,
    /// Payload parse issues (missing columns, undecodable CSV).
    Parse,
    /// Local persistence issues.
    Storage,
    /// Configuration issues (bad values, missing files, unknown utility).
    Configuration,
    /// Network issues (timeouts, connection failures).
    Network,
    /// Internal errors (bugs, unexpected state, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Authentication => "Authentication error",
            Self::Export => "Export error",
            Self::Parse => "Parse error",
            Self::Storage => "Storage error",
            Self::Configuration => "Configuration error",
            Self::Network => "Network error",
            Self::Internal => "Internal error",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Authentication failed and could not be recovered
    AuthError = 2,
    /// Payload or configuration could not be parsed
    ParseError = 3,
    /// Timeout (overall deadline or poll budget)
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Main error type for gridwatt operations.
#[derive(Error, Debug)]
pub enum GridwattError {
    // ==========================================================================
    // Authentication errors
    // ==========================================================================
    /// The provider rejected the session or credentials.
    #[error("authentication failed for {utility}: {reason}")]
    AuthFailed { utility: String, reason: String },

    /// Login completed but no auth token was observed in outgoing traffic.
    #[error("no auth token observed during {utility} login")]
    TokenNotObserved { utility: String },

    /// Neither saved session artifacts nor username/password are configured.
    #[error("no authentication configured for {utility}")]
    AuthNotConfigured { utility: String },

    // ==========================================================================
    // Export errors
    // ==========================================================================
    /// The provider's export job explicitly reported failure.
    #[error("export failed for {utility}: {message}")]
    ExportFailed { utility: String, message: String },

    /// Polling exhausted its attempt budget without a terminal status.
    #[error("export for {utility} timed out after {attempts} poll attempts")]
    PollTimeout { utility: String, attempts: u32 },

    // ==========================================================================
    // Parse errors
    // ==========================================================================
    /// Required columns could not be located in the payload header.
    #[error("could not find required columns (date and usage) in payload: {header}")]
    MissingColumns { header: String },

    /// The payload could not be decoded at all.
    #[error("failed to parse export payload: {0}")]
    ParsePayload(String),

    // ==========================================================================
    // Storage errors
    // ==========================================================================
    /// Local database failure.
    #[error("storage error: {0}")]
    Storage(String),

    // ==========================================================================
    // Browser automation errors
    // ==========================================================================
    /// The browser-automation backend failed or is unreachable.
    #[error("browser automation error: {0}")]
    Browser(String),

    // ==========================================================================
    // Publish errors
    // ==========================================================================
    /// The dashboard endpoint rejected a publish call.
    #[error("dashboard returned status {status}: {body}")]
    PublishFailed { status: u16, body: String },

    /// Dashboard publishing is not configured for the utility.
    #[error("dashboard publishing is not configured for {utility}")]
    DashboardNotConfigured { utility: String },

    // ==========================================================================
    // Configuration errors
    // ==========================================================================
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error parsing the configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Unknown utility name.
    #[error("unknown utility: {0} (available: nyseg, coned)")]
    InvalidUtility(String),

    // ==========================================================================
    // Network errors
    // ==========================================================================
    /// Overall operation deadline expired.
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// Generic network error.
    #[error("network error: {0}")]
    Network(String),

    // ==========================================================================
    // I/O and internal errors
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GridwattError {
    /// Map error to exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::AuthFailed { .. }
            | Self::TokenNotObserved { .. }
            | Self::AuthNotConfigured { .. } => ExitCode::AuthError,

            Self::MissingColumns { .. }
            | Self::ParsePayload(_)
            | Self::Config(_)
            | Self::ConfigParse { .. }
            | Self::InvalidUtility(_) => ExitCode::ParseError,

            Self::Timeout(_) | Self::PollTimeout { .. } => ExitCode::Timeout,

            Self::ExportFailed { .. }
            | Self::Storage(_)
            | Self::Browser(_)
            | Self::PublishFailed { .. }
            | Self::DashboardNotConfigured { .. }
            | Self::Network(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthFailed { .. }
            | Self::TokenNotObserved { .. }
            | Self::AuthNotConfigured { .. } => ErrorCategory::Authentication,

            Self::ExportFailed { .. } | Self::PollTimeout { .. } => ErrorCategory::Export,

            Self::MissingColumns { .. } | Self::ParsePayload(_) => ErrorCategory::Parse,

            Self::Storage(_) => ErrorCategory::Storage,

            Self::Config(_)
            | Self::ConfigParse { .. }
            | Self::InvalidUtility(_)
            | Self::DashboardNotConfigured { .. } => ErrorCategory::Configuration,

            Self::Timeout(_) | Self::Network(_) => ErrorCategory::Network,

            Self::Browser(_)
            | Self::PublishFailed { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Whether this error means the session or credentials died.
    ///
    /// Only these errors trigger the fetch orchestrator's one-shot
    /// reauthentication path; everything else is terminal.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::AuthFailed { .. } | Self::TokenNotObserved { .. }
        )
    }

    /// Returns the utility name if this error is utility-specific.
    #[must_use]
    pub fn utility(&self) -> Option<&str> {
        match self {
            Self::AuthFailed { utility, .. }
            | Self::TokenNotObserved { utility }
            | Self::AuthNotConfigured { utility }
            | Self::ExportFailed { utility, .. }
            | Self::PollTimeout { utility, .. }
            | Self::DashboardNotConfigured { utility } => Some(utility),
            _ => None,
        }
    }
}

/// Result type alias for gridwatt operations.
pub type Result<T> = std::result::Result<T, GridwattError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_recoverable() {
        let err = GridwattError::AuthFailed {
            utility: "nyseg".to_string(),
            reason: "status 401".to_string(),
        };
        assert!(err.is_auth());
        assert_eq!(err.category(), ErrorCategory::Authentication);

        let err = GridwattError::TokenNotObserved {
            utility: "nyseg".to_string(),
        };
        assert!(err.is_auth());
    }

    #[test]
    fn missing_credentials_are_not_recoverable() {
        // AuthNotConfigured means there is nothing to reauthenticate with.
        let err = GridwattError::AuthNotConfigured {
            utility: "coned".to_string(),
        };
        assert!(!err.is_auth());
        assert_eq!(err.category(), ErrorCategory::Authentication);
        assert_eq!(err.exit_code(), ExitCode::AuthError);
    }

    #[test]
    fn export_failure_and_poll_timeout_are_distinct() {
        let failed = GridwattError::ExportFailed {
            utility: "coned".to_string(),
            message: "job reported failure".to_string(),
        };
        let timed_out = GridwattError::PollTimeout {
            utility: "coned".to_string(),
            attempts: 60,
        };
        assert!(!failed.is_auth());
        assert!(!timed_out.is_auth());
        assert_eq!(failed.exit_code(), ExitCode::GeneralError);
        assert_eq!(timed_out.exit_code(), ExitCode::Timeout);
        assert_eq!(failed.category(), ErrorCategory::Export);
        assert_eq!(timed_out.category(), ErrorCategory::Export);
    }

    #[test]
    fn parse_errors_map_to_parse_exit_code() {
        let err = GridwattError::MissingColumns {
            header: "Foo,Bar".to_string(),
        };
        assert_eq!(err.exit_code(), ExitCode::ParseError);
        assert_eq!(err.category(), ErrorCategory::Parse);
    }

    #[test]
    fn utility_extraction() {
        let err = GridwattError::ExportFailed {
            utility: "nyseg".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.utility(), Some("nyseg"));

        let err = GridwattError::Network("reset".to_string());
        assert_eq!(err.utility(), None);
    }

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::GeneralError), 1);
        assert_eq!(i32::from(ExitCode::AuthError), 2);
        assert_eq!(i32::from(ExitCode::ParseError), 3);
        assert_eq!(i32::from(ExitCode::Timeout), 4);
    }

    #[test]
    fn storage_errors_are_fatal_general_errors() {
        let err = GridwattError::Storage("disk full".to_string());
        assert!(!err.is_auth());
        assert_eq!(err.exit_code(), ExitCode::GeneralError);
    }
}
