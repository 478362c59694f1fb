//! [`Transport`] over MQTT 3.1.1 via `rumqttc`.
//!
//! Each `connect` builds a fresh client/event-loop pair, waits for the
//! broker's CONNACK, then hands the event loop to a pump task that
//! forwards publishes until the session drops. The pump never reconnects
//! on its own; recovery belongs to the caller's backoff policy.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::transport::{
    BrokerConfig, BrokerScheme, EVENT_CHANNEL_CAPACITY, QoS, SessionId, Transport, TransportEvent,
    TransportSession,
};

/// Outgoing request queue depth inside `rumqttc`.
const REQUEST_CAPACITY: usize = 64;

/// How long a closing session gets to flush its DISCONNECT packet.
const DISCONNECT_FLUSH: Duration = Duration::from_secs(1);

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => Self::AtMostOnce,
            QoS::AtLeastOnce => Self::AtLeastOnce,
            QoS::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

/// One open broker session. The liveness flag belongs to this session
/// alone; a dying pump can only clear its own.
struct Live {
    id: SessionId,
    client: AsyncClient,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

impl Live {
    /// Ask the broker to end the session, give the pump a moment to flush
    /// the request, then stop it.
    async fn shutdown(mut self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(session = %self.id, error = %e, "broker disconnect request failed");
        } else if tokio::time::timeout(DISCONNECT_FLUSH, &mut self.pump)
            .await
            .is_err()
        {
            tracing::debug!(session = %self.id, "disconnect not flushed in time");
        }
        self.cancel.cancel();
    }
}

/// Production broker transport.
pub struct MqttTransport {
    config: BrokerConfig,
    session: Mutex<Option<Live>>,
    next_id: AtomicU64,
}

impl MqttTransport {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn client(&self) -> Result<AsyncClient, Error> {
        self.session
            .lock()
            .map_err(|_| Error::NotConnected)?
            .as_ref()
            .map(|s| s.client.clone())
            .ok_or(Error::NotConnected)
    }

    fn take_session(&self, id: Option<SessionId>) -> Option<Live> {
        let mut guard = self.session.lock().ok()?;
        match id {
            Some(id) if guard.as_ref().is_some_and(|s| s.id != id) => None,
            _ => guard.take(),
        }
    }
}

impl Transport for MqttTransport {
    async fn connect(&self) -> Result<TransportSession, Error> {
        if let Some(stale) = self.take_session(None) {
            stale.connected.store(false, Ordering::SeqCst);
            stale.cancel.cancel();
        }

        let options = mqtt_options(&self.config)?;
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));

        tracing::info!(url = %self.config.url, session = %id, "connecting to broker");
        let timeout = self.config.connect_timeout;
        tokio::time::timeout(timeout, await_connack(&mut eventloop))
            .await
            .map_err(|_| Error::ConnectTimeout {
                timeout_secs: timeout.as_secs(),
            })??;
        tracing::info!(session = %id, "broker session established");

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let connected = Arc::new(AtomicBool::new(true));
        let pump = tokio::spawn(pump(eventloop, tx, cancel.clone(), Arc::clone(&connected)));

        let live = Live {
            id,
            client,
            cancel,
            connected,
            pump,
        };
        let displaced = match self.session.lock() {
            Ok(mut guard) => guard.replace(live),
            Err(_) => {
                live.cancel.cancel();
                return Err(Error::Connect("session state poisoned".into()));
            }
        };
        if let Some(displaced) = displaced {
            displaced.connected.store(false, Ordering::SeqCst);
            displaced.cancel.cancel();
        }
        Ok(TransportSession { id, events: rx })
    }

    fn is_connected(&self) -> bool {
        self.session
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.connected.load(Ordering::SeqCst)))
            .unwrap_or(false)
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), Error> {
        let client = self.client()?;
        client
            .subscribe(filter, qos.into())
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), Error> {
        let client = self.client()?;
        client
            .unsubscribe(filter)
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retained: bool,
    ) -> Result<(), Error> {
        let client = self.client()?;
        client
            .publish_bytes(topic, qos.into(), retained, payload)
            .await
            .map_err(|e| Error::Publish(e.to_string()))
    }

    async fn close(&self, id: SessionId) {
        match self.take_session(Some(id)) {
            Some(live) => live.shutdown().await,
            None => tracing::debug!(session = %id, "session already replaced; nothing to close"),
        }
    }

    async fn disconnect(&self) {
        if let Some(live) = self.take_session(None) {
            live.shutdown().await;
        }
    }
}

// ── Session plumbing ─────────────────────────────────────────────────

fn mqtt_options(config: &BrokerConfig) -> Result<MqttOptions, Error> {
    let scheme = config.scheme()?;
    let port = config.port()?;

    // WebSocket transports take the full endpoint URL as the host.
    let mut options = match scheme {
        BrokerScheme::Ws | BrokerScheme::Wss => {
            MqttOptions::new(&config.client_id, config.url.as_str(), port)
        }
        BrokerScheme::Tcp | BrokerScheme::Tls => {
            MqttOptions::new(&config.client_id, config.host()?, port)
        }
    };

    match scheme {
        BrokerScheme::Ws => {
            options.set_transport(rumqttc::Transport::Ws);
        }
        BrokerScheme::Wss => {
            options.set_transport(rumqttc::Transport::wss_with_default_config());
        }
        BrokerScheme::Tls => {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        BrokerScheme::Tcp => {}
    }

    options
        .set_keep_alive(config.keep_alive)
        .set_clean_session(config.clean_session);

    if let Some(ref username) = config.username {
        let password = config
            .password
            .as_ref()
            .map(|p| p.expose_secret().to_owned())
            .unwrap_or_default();
        options.set_credentials(username, password);
    }

    Ok(options)
}

async fn await_connack(eventloop: &mut EventLoop) -> Result<(), Error> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(Error::Connect(format!("broker refused session: {:?}", ack.code)))
                };
            }
            Ok(_) => {}
            Err(e) => return Err(Error::Connect(e.to_string())),
        }
    }
}

/// Forward inbound publishes until the session drops or is cancelled.
async fn pump(
    mut eventloop: EventLoop,
    tx: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let event = TransportEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload,
                    };
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    lost(&connected, &tx, "broker sent DISCONNECT".into()).await;
                    break;
                }
                // Our own DISCONNECT went out; the session is over.
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => {}
                Err(e) => {
                    lost(&connected, &tx, e.to_string()).await;
                    break;
                }
            }
        }
    }
    tracing::debug!("broker pump exiting");
}

async fn lost(connected: &AtomicBool, tx: &mpsc::Sender<TransportEvent>, reason: String) {
    connected.store(false, Ordering::SeqCst);
    tracing::warn!(%reason, "broker session lost");
    let _ = tx.send(TransportEvent::ConnectionLost { reason }).await;
}
