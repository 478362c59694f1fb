// ── Broker transport contract ──
//
// The connection manager drives any persistent pub/sub session through
// this trait. `MqttTransport` is the production implementation; tests
// substitute scripted doubles.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use secrecy::SecretString;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Error;

/// Capacity of the inbound event channel handed out by [`Transport::connect`].
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── QoS ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

// ── Events ──────────────────────────────────────────────────────────

/// Something the broker session reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A publish arrived on a subscribed topic.
    Message { topic: String, payload: Bytes },
    /// The session dropped. No further events follow on this channel.
    ConnectionLost { reason: String },
}

// ── Transport trait ─────────────────────────────────────────────────

/// Identifies one broker session opened by [`Transport::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A freshly opened session and the channel its inbound traffic arrives on.
#[derive(Debug)]
pub struct TransportSession {
    pub id: SessionId,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// A persistent publish/subscribe session with a broker.
///
/// `connect` opens a fresh session; a previous one, if any, is torn down
/// first. `close` only touches the session it names, so a late cleanup
/// from an abandoned attempt cannot end a newer session.
pub trait Transport: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = Result<TransportSession, Error>> + Send;

    /// Whether the current session still reports itself alive.
    fn is_connected(&self) -> bool;

    fn subscribe(&self, filter: &str, qos: QoS) -> impl Future<Output = Result<(), Error>> + Send;

    fn unsubscribe(&self, filter: &str) -> impl Future<Output = Result<(), Error>> + Send;

    fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retained: bool,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// End session `id` if it is still the current one.
    fn close(&self, id: SessionId) -> impl Future<Output = ()> + Send;

    /// End whatever session is current.
    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}

// ── BrokerConfig ────────────────────────────────────────────────────

/// Wire scheme of the broker endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerScheme {
    /// MQTT over WebSocket.
    Ws,
    /// MQTT over secure WebSocket.
    Wss,
    /// Plain TCP.
    Tcp,
    /// TCP with TLS.
    Tls,
}

impl BrokerScheme {
    fn from_url(url: &Url) -> Result<Self, Error> {
        match url.scheme() {
            "ws" => Ok(Self::Ws),
            "wss" => Ok(Self::Wss),
            "mqtt" | "tcp" => Ok(Self::Tcp),
            "mqtts" | "ssl" => Ok(Self::Tls),
            other => Err(Error::Connect(format!("unsupported broker scheme '{other}'"))),
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Self::Ws => 80,
            Self::Wss => 443,
            Self::Tcp => 1883,
            Self::Tls => 8883,
        }
    }
}

/// Everything needed to open a broker session.
#[derive(Clone)]
pub struct BrokerConfig {
    /// Broker endpoint, e.g. `wss://broker.example.com:8084/mqtt`.
    pub url: Url,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub keep_alive: Duration,
    pub clean_session: bool,
    /// How long to wait for the broker to acknowledge a connect.
    pub connect_timeout: Duration,
}

impl BrokerConfig {
    pub fn new(url: Url, client_id: impl Into<String>) -> Self {
        Self {
            url,
            client_id: client_id.into(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(60),
            clean_session: true,
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn scheme(&self) -> Result<BrokerScheme, Error> {
        BrokerScheme::from_url(&self.url)
    }

    pub fn host(&self) -> Result<&str, Error> {
        self.url
            .host_str()
            .ok_or_else(|| Error::Connect(format!("broker URL '{}' has no host", self.url)))
    }

    pub fn port(&self) -> Result<u16, Error> {
        Ok(self.url.port().unwrap_or(self.scheme()?.default_port()))
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("url", &self.url.as_str())
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("keep_alive", &self.keep_alive)
            .field("clean_session", &self.clean_session)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
