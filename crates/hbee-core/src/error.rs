// ── Core error types ──
//
// What consumers of hbee-core see. Validation failures on inbound traffic
// never surface here (they are dropped and counted by the router); these
// are the failures of explicit calls like connect, subscribe, and publish.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to broker: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Broker connect timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Not connected to broker")]
    NotConnected,

    // ── Validation errors ────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Refusing to publish to wildcard topic '{topic}'")]
    WildcardPublish { topic: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Only reconnect exhaustion means the connection is gone for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReconnectExhausted { .. })
    }
}

// ── Conversion from wire-level errors ────────────────────────────────

impl From<hbee_api::Error> for CoreError {
    fn from(err: hbee_api::Error) -> Self {
        use hbee_api::Error as Api;

        match err {
            Api::InvalidTopic { .. } | Api::InvalidPayload(_) | Api::InvalidCommand(_) => {
                CoreError::Validation {
                    message: err.to_string(),
                }
            }
            Api::Connect(reason) => CoreError::ConnectionFailed { reason },
            Api::ConnectTimeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::NotConnected => CoreError::NotConnected,
            Api::Subscribe(reason) => CoreError::ConnectionFailed {
                reason: format!("subscribe failed: {reason}"),
            },
            Api::Publish(reason) => CoreError::ConnectionFailed {
                reason: format!("publish failed: {reason}"),
            },
            Api::Transport(ref e) if e.is_timeout() => CoreError::Timeout { timeout_secs: 0 },
            Api::Transport(e) => CoreError::ConnectionFailed {
                reason: e.to_string(),
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
