//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use hbee_config::ConfigError;
use hbee_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    #[allow(dead_code)]
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const INVALID: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to broker at {url}")]
    #[diagnostic(
        code(hbee::connection_failed),
        help(
            "Check that the broker is reachable and the URL scheme is one of\n\
             ws, wss, mqtt, mqtts.\n\
             Try: hbee status"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Gave up reconnecting after {attempts} attempts")]
    #[diagnostic(
        code(hbee::reconnect_exhausted),
        help("The broker kept refusing or dropping the session. Check `hbee status`.")
    )]
    ReconnectExhausted { attempts: u32 },

    #[error("Broker connect timed out after {seconds}s")]
    #[diagnostic(
        code(hbee::timeout),
        help("Increase the timeout with --timeout or check broker responsiveness.")
    )]
    Timeout { seconds: u64 },

    #[error("No reply from device {device} within {seconds}s")]
    #[diagnostic(code(hbee::no_reply))]
    NoReply { device: String, seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Broker refused the credentials for profile '{profile}'")]
    #[diagnostic(
        code(hbee::auth_failed),
        help("Store a password with: hbee config set-password --profile {profile}")
    )]
    AuthFailed { profile: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(hbee::validation))]
    Validation { field: String, reason: String },

    #[error("Rejected {what}: {reason}")]
    #[diagnostic(code(hbee::rejected))]
    Rejected { what: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(hbee::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: hbee config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(hbee::no_config),
        help(
            "Create one with: hbee config init\n\
             Or pass --broker and --user.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("No readiness endpoint configured")]
    #[diagnostic(
        code(hbee::no_status_url),
        help("Pass --url or run: hbee config set status_url https://host/api/mqtt/status")
    )]
    NoStatusUrl,

    #[error(transparent)]
    #[diagnostic(code(hbee::config))]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Operation '{action}' requires confirmation")]
    #[diagnostic(
        code(hbee::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Core ─────────────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(hbee::core))]
    Core(String),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ReconnectExhausted { .. } => {
                exit_code::CONNECTION
            }
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Timeout { .. } | Self::NoReply { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::Rejected { .. } => exit_code::INVALID,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl CliError {
    /// Attach the broker URL so connection failures say where they went.
    pub fn from_core(err: CoreError, url: &str, profile: &str) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => {
                let lowered = reason.to_ascii_lowercase();
                if lowered.contains("notauthorized") || lowered.contains("badusername") {
                    CliError::AuthFailed {
                        profile: profile.to_owned(),
                    }
                } else {
                    CliError::ConnectionFailed {
                        url: url.to_owned(),
                        source: reason.into(),
                    }
                }
            }

            CoreError::NotConnected => CliError::ConnectionFailed {
                url: url.to_owned(),
                source: "broker session is not connected".into(),
            },

            other => other.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed {
                url: "(broker)".into(),
                source: reason.into(),
            },

            CoreError::NotConnected => CliError::ConnectionFailed {
                url: "(disconnected)".into(),
                source: "broker session is not connected".into(),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::ReconnectExhausted { attempts } => CliError::ReconnectExhausted { attempts },

            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::WildcardPublish { topic } => CliError::Validation {
                field: "topic".into(),
                reason: format!("'{topic}' contains a wildcard"),
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Core(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_category() {
        let err: CliError = CoreError::ReconnectExhausted { attempts: 5 }.into();
        assert_eq!(err.exit_code(), exit_code::CONNECTION);

        let err: CliError = CoreError::Timeout { timeout_secs: 30 }.into();
        assert_eq!(err.exit_code(), exit_code::TIMEOUT);

        let err: CliError = CoreError::WildcardPublish {
            topic: "HBEE/a/#".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }

    #[test]
    fn refused_credentials_map_to_auth() {
        let err = CliError::from_core(
            CoreError::ConnectionFailed {
                reason: "broker refused session: NotAuthorized".into(),
            },
            "wss://b.example.com/mqtt",
            "home",
        );
        assert!(matches!(err, CliError::AuthFailed { ref profile } if profile == "home"));
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }
}
