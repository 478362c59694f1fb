use thiserror::Error;

/// Top-level error type for the `hbee-api` crate.
///
/// Covers the broker transport, the readiness probe, and the codecs.
/// `hbee-core` maps these into its own connection-level taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Codecs ──────────────────────────────────────────────────────
    /// Topic string failed validation.
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: TopicError },

    /// Message body failed validation.
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),

    /// Outbound command string does not follow the `GET&` / `ACT&` grammar.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    // ── Broker ──────────────────────────────────────────────────────
    /// Broker connection could not be established.
    #[error("Broker connection failed: {0}")]
    Connect(String),

    /// No CONNACK within the configured window.
    #[error("Broker connection timed out after {timeout_secs}s")]
    ConnectTimeout { timeout_secs: u64 },

    /// Operation requires a live session.
    #[error("Not connected to broker")]
    NotConnected,

    /// Subscribe or unsubscribe request rejected by the client.
    #[error("Subscription request failed: {0}")]
    Subscribe(String),

    /// Publish request rejected by the client.
    #[error("Publish failed: {0}")]
    Publish(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Connect(_) | Self::ConnectTimeout { .. } | Self::NotConnected => true,
            _ => false,
        }
    }

    /// Returns `true` for codec rejections of a single inbound or outbound item.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidTopic { .. } | Self::InvalidPayload(_) | Self::InvalidCommand(_)
        )
    }
}

// ── Topic rejections ────────────────────────────────────────────────

/// Why a topic string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("topic is empty")]
    Empty,

    #[error("expected 5 segments, found {found}")]
    SegmentCount { found: usize },

    #[error("prefix '{0}' is not HBEE")]
    Prefix(String),

    #[error("user id segment is empty")]
    EmptyUserId,

    #[error("unsupported sensor type '{0}'")]
    SensorType(String),

    #[error("device id segment is empty")]
    EmptyDeviceId,

    #[error("device id '{0}' is neither a UUID nor a 12-digit hardware address")]
    DeviceId(String),

    #[error("unsupported suffix '{0}'")]
    Suffix(String),

    #[error("wildcard '{0}' not allowed in a publish topic")]
    Wildcard(char),

    #[error("'{0}' is not a valid topic segment")]
    Segment(String),

    #[error("topic is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("publish topics must use sensor type TC and suffix SER")]
    NotOutbound,
}

// ── Payload rejections ──────────────────────────────────────────────

/// Why a message body was rejected.
///
/// Variants name the offending key wherever one exists so a log line
/// alone is enough to find the bad field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("payload is empty")]
    Empty,

    #[error("payload is {len} bytes, limit is {max}")]
    TooLarge { len: usize, max: usize },

    #[error("payload contains blocked pattern '{0}'")]
    Blocked(String),

    #[error("payload is not a JSON object")]
    NotObject,

    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("object has no fields")]
    EmptyObject,

    #[error("object has {count} fields, limit is {max}")]
    TooManyFields { count: usize, max: usize },

    #[error("field '{0}' holds a nested object or array")]
    Nested(String),

    #[error("missing actcode")]
    MissingActcode,

    #[error("unknown actcode '{0}'")]
    UnknownActcode(String),

    #[error("{actcode} message is missing '{field}'")]
    MissingField {
        actcode: &'static str,
        field: &'static str,
    },

    #[error("name '{name}' is not valid for {actcode}")]
    InvalidName { actcode: &'static str, name: String },

    #[error("name '{0}' is not an allowed field name")]
    DisallowedName(String),

    #[error("{name} value '{value}' {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{key} value '{value}' is not numeric")]
    NotNumeric { key: String, value: String },

    #[error("{key} value '{value}' must be an integer")]
    NotIntegral { key: String, value: String },

    #[error("{key} value {value} is outside {min}..={max}")]
    OutOfRange {
        key: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("array is empty")]
    EmptyArray,

    #[error("array has {len} elements, limit is {max}")]
    ArrayTooLarge { len: usize, max: usize },

    #[error("no valid element among {total} (first failure: {first})")]
    NoValidElement { total: usize, first: Box<PayloadError> },
}
