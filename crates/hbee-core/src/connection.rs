// ── Connection manager ──
//
// Owns the broker session lifecycle: idempotent connect, subscription
// replay, health checks, backoff reconnection, and the hand-off of
// inbound traffic to the router. Cheaply cloneable; every clone drives
// the same session.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hbee_api::topic::{build_outbound_topic, check_publish_topic, is_wildcard_filter};
use hbee_api::{Command, Transport, TransportEvent, TransportSession};

use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::event::ClientEvent;
use crate::handler::{AlwaysOnline, DeviceUpdateSink, Handler, NetworkMonitor};
use crate::page::{DeviceRef, PageClassifier, PageInfo, page_topics};
use crate::router::MessageRouter;
use crate::stats::ValidationStats;
use crate::subscription::{SubscriptionRegistry, validate_filter};
use crate::sync::{StartupSynchronizer, SyncRefusal, SyncReport, SyncTarget};

const EVENT_CHANNEL_SIZE: usize = 256;

// ── ConnectionState ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}

/// Point-in-time view of the manager for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub attempt: u32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_health_check_at: Option<DateTime<Utc>>,
    pub subscribed_topics: Vec<String>,
}

// ── Collaborators ────────────────────────────────────────────────────

/// Optional hooks into the embedding application.
#[derive(Clone)]
pub struct Collaborators {
    pub network: Arc<dyn NetworkMonitor>,
    /// Enables startup sync when present.
    pub page: Option<Arc<dyn PageClassifier>>,
    pub sink: Option<Arc<dyn DeviceUpdateSink>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            network: Arc::new(AlwaysOnline),
            page: None,
            sink: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Activity {
    last_message_at: Option<DateTime<Utc>>,
    last_health_check_at: Option<DateTime<Utc>>,
}

// ── ConnectionManager ────────────────────────────────────────────────

pub struct ConnectionManager<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    transport: T,
    config: ClientConfig,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ClientEvent>,
    registry: Mutex<SubscriptionRegistry>,
    router: MessageRouter,
    sync: StartupSynchronizer,
    network: Arc<dyn NetworkMonitor>,
    page: Option<Arc<dyn PageClassifier>>,
    /// Cancelled by `disconnect()`; every session token descends from it.
    run: Mutex<CancellationToken>,
    gave_up: AtomicBool,
    activity: Mutex<Activity>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self::with_collaborators(transport, config, Collaborators::default())
    }

    pub fn with_collaborators(
        transport: T,
        config: ClientConfig,
        collaborators: Collaborators,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let router = MessageRouter::new(config.access.clone(), collaborators.sink, events.clone());
        let sync = StartupSynchronizer::new(config.sync.clone());

        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                state,
                events,
                registry: Mutex::new(SubscriptionRegistry::new()),
                router,
                sync,
                network: collaborators.network,
                page: collaborators.page,
                run: Mutex::new(CancellationToken::new()),
                gave_up: AtomicBool::new(false),
                activity: Mutex::new(Activity::default()),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn synchronizer(&self) -> &StartupSynchronizer {
        &self.inner.sync
    }

    // ── State observation ────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to lifecycle and message events.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// True after the reconnect budget ran out, until the next `connect()`.
    pub fn has_given_up(&self) -> bool {
        self.inner.gave_up.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> ValidationStats {
        self.inner.router.stats()
    }

    pub fn reset_stats(&self) {
        self.inner.router.reset_stats();
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let state = self.state();
        let attempt = match state {
            ConnectionState::Reconnecting { attempt } => attempt,
            _ => 0,
        };
        let activity = self.activity().clone();
        ConnectionSnapshot {
            state,
            attempt,
            last_message_at: activity.last_message_at,
            last_health_check_at: activity.last_health_check_at,
            subscribed_topics: self.registry().restore_all(),
        }
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    fn registry(&self) -> MutexGuard<'_, SubscriptionRegistry> {
        self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn activity(&self) -> MutexGuard<'_, Activity> {
        self.inner.activity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_run(&self) -> CancellationToken {
        self.inner
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Move to `next` unless `run` was cancelled. Checked under the state
    /// lock so a concurrent `disconnect()` always has the last word.
    fn transition(&self, run: &CancellationToken, next: ConnectionState) {
        self.inner.state.send_if_modified(|state| {
            if run.is_cancelled() || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Connect to the broker.
    ///
    /// Safe to call from several triggers at once: only the first caller
    /// opens a transport session, the rest wait on the same outcome.
    /// Resolves once connected, or with an error once the manager has
    /// settled back into `Disconnected`.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let mut claimed = false;
        self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                claimed = true;
            }
            claimed
        });

        if claimed {
            self.inner.gave_up.store(false, Ordering::SeqCst);
            let run = self.current_run();
            match self.establish(&run).await {
                Ok(restored) => {
                    info!(restored, "connected to broker");
                    self.emit(ClientEvent::Connected);
                    self.after_connected(&run);
                }
                Err(_) if run.is_cancelled() => {
                    debug!("connect abandoned by disconnect");
                    return Err(CoreError::ConnectionFailed {
                        reason: "disconnected before a session was established".into(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, "broker connect failed");
                    self.begin_reconnect(&run);
                }
            }
        } else {
            debug!(state = %self.state(), "connect already in progress or established");
        }

        self.settled().await
    }

    async fn settled(&self) -> Result<(), CoreError> {
        let mut rx = self.inner.state.subscribe();
        let state = *rx
            .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Disconnected))
            .await
            .map_err(|_| CoreError::Internal("connection state channel closed".into()))?;

        match state {
            ConnectionState::Connected => Ok(()),
            _ if self.has_given_up() => Err(CoreError::ReconnectExhausted {
                attempts: self.inner.config.reconnect.max_attempts,
            }),
            _ => Err(CoreError::ConnectionFailed {
                reason: "disconnected before a session was established".into(),
            }),
        }
    }

    /// Close the session and cancel every pending timer. Subscriptions
    /// are kept for the next `connect()`.
    pub async fn disconnect(&self) {
        let run = {
            let mut guard = self.inner.run.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, CancellationToken::new())
        };
        run.cancel();
        self.inner.gave_up.store(false, Ordering::SeqCst);
        self.inner.state.send_replace(ConnectionState::Disconnected);
        self.inner.transport.disconnect().await;
        info!("disconnected from broker");
    }

    /// Disconnect and forget every subscription.
    pub async fn disconnect_on_logout(&self) {
        self.disconnect().await;
        self.registry().clear();
        info!("subscriptions cleared on logout");
    }

    /// Open a transport session and replay subscriptions. Leaves the state
    /// at `Connected` on success.
    ///
    /// A failed attempt closes only its own session: once `run` is
    /// cancelled a newer session may already be live on the transport.
    async fn establish(&self, run: &CancellationToken) -> Result<usize, CoreError> {
        let TransportSession { id, events } = self.inner.transport.connect().await?;
        if run.is_cancelled() {
            self.inner.transport.close(id).await;
            return Err(CoreError::ConnectionFailed {
                reason: "session opened after disconnect".into(),
            });
        }
        let session = run.child_token();
        self.spawn_pump(events, run, &session);

        match self.restore_subscriptions(run, &session).await {
            Ok(restored) => {
                self.spawn_health_check(run, &session);
                Ok(restored)
            }
            Err(e) => {
                session.cancel();
                if !run.is_cancelled() {
                    self.inner.transport.close(id).await;
                }
                Err(e)
            }
        }
    }

    /// Re-issue every registered topic, then declare the session live.
    ///
    /// Subscribe and unsubscribe calls that land mid-replay bump the
    /// registry generation; the replay loops until it observes a stable
    /// registry, issuing only the difference each round. `Connected` is
    /// set under the registry lock, so later calls see a live session and
    /// issue their own transport request.
    async fn restore_subscriptions(
        &self,
        run: &CancellationToken,
        session: &CancellationToken,
    ) -> Result<usize, CoreError> {
        let qos = self.inner.config.qos;
        let mut issued: IndexSet<String> = IndexSet::new();

        loop {
            let (topics, generation) = {
                let registry = self.registry();
                (registry.restore_all(), registry.generation())
            };

            for topic in &topics {
                if !issued.contains(topic) {
                    self.inner.transport.subscribe(topic, qos).await?;
                    issued.insert(topic.clone());
                }
            }
            let stale: Vec<String> = issued
                .iter()
                .filter(|t| !topics.contains(t))
                .cloned()
                .collect();
            for topic in stale {
                self.inner.transport.unsubscribe(&topic).await?;
                issued.shift_remove(&topic);
            }

            let live = {
                let registry = self.registry();
                if run.is_cancelled() || session.is_cancelled() {
                    return Err(CoreError::ConnectionFailed {
                        reason: "session ended during subscription restore".into(),
                    });
                }
                let stable = registry.generation() == generation;
                if stable {
                    self.transition(run, ConnectionState::Connected);
                }
                stable
            };
            if live {
                debug!(restored = issued.len(), "subscriptions restored");
                return Ok(issued.len());
            }
            debug!("registry changed during restore; replaying difference");
        }
    }

    fn begin_reconnect(&self, run: &CancellationToken) {
        if self.inner.config.reconnect.max_attempts == 0 {
            self.give_up(0, run);
            return;
        }
        self.transition(run, ConnectionState::Reconnecting { attempt: 1 });
        tokio::spawn(self.clone().reconnect_loop(run.clone()));
    }

    async fn reconnect_loop(self, run: CancellationToken) {
        let policy = self.inner.config.reconnect.clone();
        let mut attempt = 1;

        while attempt <= policy.max_attempts {
            self.transition(&run, ConnectionState::Reconnecting { attempt });

            // Offline time does not consume attempts.
            while !self.inner.network.is_online() {
                debug!(
                    recheck_ms = duration_ms(policy.offline_recheck),
                    "network offline; reconnect paused"
                );
                tokio::select! {
                    biased;
                    () = run.cancelled() => return,
                    () = tokio::time::sleep(policy.offline_recheck) => {}
                }
            }

            let delay = policy.delay_for(attempt);
            info!(
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = duration_ms(delay),
                "scheduling reconnect"
            );
            tokio::select! {
                biased;
                () = run.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }

            self.transition(&run, ConnectionState::Connecting);
            match self.establish(&run).await {
                Ok(restored) => {
                    info!(attempt, restored, "reconnected to broker");
                    self.emit(ClientEvent::Reconnected { restored });
                    self.after_connected(&run);
                    return;
                }
                Err(_) if run.is_cancelled() => return,
                Err(e) => {
                    warn!(attempt, error = %e, "reconnect attempt failed");
                    attempt += 1;
                }
            }
        }

        self.give_up(policy.max_attempts, &run);
    }

    fn give_up(&self, attempts: u32, run: &CancellationToken) {
        if run.is_cancelled() {
            return;
        }
        self.inner.gave_up.store(true, Ordering::SeqCst);
        self.transition(run, ConnectionState::Disconnected);
        error!(attempts, "giving up on broker connection");
        self.emit(ClientEvent::GaveUp { attempts });
    }

    /// React to a dropped session. Only the first report per session
    /// counts, and only a live session starts a reconnect.
    fn connection_lost(
        &self,
        reason: String,
        run: &CancellationToken,
        session: &CancellationToken,
    ) {
        if session.is_cancelled() {
            return;
        }
        session.cancel();

        let claimed = self.inner.state.send_if_modified(|state| {
            if run.is_cancelled() || *state != ConnectionState::Connected {
                return false;
            }
            *state = ConnectionState::Reconnecting { attempt: 1 };
            true
        });
        if !claimed {
            debug!(%reason, "session dropped before it went live");
            return;
        }

        warn!(%reason, "broker connection lost");
        self.emit(ClientEvent::ConnectionLost { reason });
        self.begin_reconnect(run);
    }

    // ── Background tasks ─────────────────────────────────────────────

    fn spawn_pump(
        &self,
        events: mpsc::Receiver<TransportEvent>,
        run: &CancellationToken,
        session: &CancellationToken,
    ) {
        tokio::spawn(self.clone().pump(events, run.clone(), session.clone()));
    }

    /// Feed inbound events to the router in arrival order.
    async fn pump(
        self,
        mut events: mpsc::Receiver<TransportEvent>,
        run: CancellationToken,
        session: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = session.cancelled() => break,
                event = events.recv() => match event {
                    Some(TransportEvent::Message { topic, payload }) => {
                        self.handle_inbound(&topic, &payload);
                    }
                    Some(TransportEvent::ConnectionLost { reason }) => {
                        self.connection_lost(reason, &run, &session);
                        break;
                    }
                    None => {
                        let reason = "transport event channel closed".to_owned();
                        self.connection_lost(reason, &run, &session);
                        break;
                    }
                }
            }
        }
    }

    fn spawn_health_check(&self, run: &CancellationToken, session: &CancellationToken) {
        let period = self.inner.config.health.interval;
        if period.is_zero() {
            return;
        }
        let manager = self.clone();
        let run = run.clone();
        let session = session.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = session.cancelled() => break,
                    _ = interval.tick() => {
                        manager.activity().last_health_check_at = Some(Utc::now());
                        if !manager.inner.transport.is_connected() {
                            manager.connection_lost("health check failed".into(), &run, &session);
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Kick off startup sync for the current page, if there is one.
    fn after_connected(&self, run: &CancellationToken) {
        let Some(classifier) = self.inner.page.clone() else {
            return;
        };
        let manager = self.clone();
        let cancel = run.child_token();

        tokio::spawn(async move {
            let page = classifier.current_page();
            if let Ok(report) = manager.inner.sync.run(&manager, &page, &cancel).await {
                manager.emit(ClientEvent::SyncCompleted(report));
            }
        });
    }

    fn handle_inbound(&self, raw_topic: &str, payload: &Bytes) {
        self.activity().last_message_at = Some(Utc::now());

        let Ok((topic, decoded)) = self.inner.router.ingest(raw_topic, payload) else {
            return;
        };
        let handler = self
            .registry()
            .best_match(raw_topic)
            .map(|sub| Arc::clone(&sub.handler));
        self.inner.router.route(&topic, &decoded.message, handler);
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Register `filter` and, if a session is live, subscribe on the
    /// broker. Returns `false` when the filter was already registered (its
    /// handler is replaced).
    pub async fn subscribe(&self, filter: &str, handler: Handler) -> Result<bool, CoreError> {
        validate_filter(filter).map_err(|reason| CoreError::Validation {
            message: format!("subscription filter '{filter}': {reason}"),
        })?;

        let (added, live) = {
            let mut registry = self.registry();
            let added = registry.subscribe(filter, handler);
            (added, self.state() == ConnectionState::Connected)
        };

        if added && live {
            self.inner
                .transport
                .subscribe(filter, self.inner.config.qos)
                .await?;
        }
        debug!(filter, added, live, "subscribed");
        Ok(added)
    }

    pub async fn unsubscribe(&self, filter: &str) -> Result<bool, CoreError> {
        let (removed, live) = {
            let mut registry = self.registry();
            let removed = registry.unsubscribe(filter);
            (removed, self.state() == ConnectionState::Connected)
        };

        if removed && live {
            self.inner.transport.unsubscribe(filter).await?;
        }
        debug!(filter, removed, "unsubscribed");
        Ok(removed)
    }

    /// Subscribe to every topic `page` needs, all sharing `handler`.
    pub async fn subscribe_page(
        &self,
        page: &PageInfo,
        handler: Handler,
    ) -> Result<Vec<String>, CoreError> {
        let topics = page_topics(page, &self.inner.config.access);
        for topic in &topics {
            self.subscribe(topic, Arc::clone(&handler)).await?;
        }
        Ok(topics)
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.registry().restore_all()
    }

    // ── Publishing ───────────────────────────────────────────────────

    /// Publish raw bytes on a canonical outbound topic.
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> Result<(), CoreError> {
        if is_wildcard_filter(topic) || topic.contains(['+', '#']) {
            return Err(CoreError::WildcardPublish {
                topic: topic.to_owned(),
            });
        }
        check_publish_topic(topic).map_err(|reason| hbee_api::Error::InvalidTopic {
            topic: topic.to_owned(),
            reason,
        })?;
        if self.state() != ConnectionState::Connected {
            return Err(CoreError::NotConnected);
        }

        self.inner
            .transport
            .publish(topic, payload.into(), self.inner.config.qos, false)
            .await?;
        debug!(topic, "published");
        Ok(())
    }

    /// Send `command` to `device_id` owned by `owner_id`.
    pub async fn publish_command(
        &self,
        owner_id: &str,
        device_id: &str,
        command: &Command,
    ) -> Result<(), CoreError> {
        let topic = build_outbound_topic(owner_id, device_id).map_err(|reason| {
            hbee_api::Error::InvalidTopic {
                topic: format!("{owner_id}/{device_id}"),
                reason,
            }
        })?;
        info!(%topic, %command, "sending command");
        self.publish(&topic, command.to_string()).await
    }

    // ── Startup sync ─────────────────────────────────────────────────

    /// Run startup sync now for the current page, subject to the guard.
    pub async fn sync_now(&self) -> Result<SyncReport, SyncRefusal> {
        let Some(classifier) = self.inner.page.clone() else {
            return Err(SyncRefusal::NoDevices {
                page: "<none>".into(),
            });
        };
        let page = classifier.current_page();
        let cancel = self.current_run().child_token();
        let report = self.inner.sync.run(self, &page, &cancel).await?;
        self.emit(ClientEvent::SyncCompleted(report.clone()));
        Ok(report)
    }
}

impl<T: Transport> SyncTarget for ConnectionManager<T> {
    async fn request_settings(&self, device: &DeviceRef) -> Result<(), CoreError> {
        self.publish_command(&device.owner_id, &device.device_id, &Command::request_settings())
            .await
    }

    async fn request_status(&self, device: &DeviceRef) -> Result<(), CoreError> {
        self.publish_command(&device.owner_id, &device.device_id, &Command::request_status())
            .await
    }
}

fn duration_ms(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 2 }.to_string(),
            "reconnecting (attempt 2)"
        );
    }

    #[test]
    fn state_serializes_tagged() {
        let json = serde_json::to_value(ConnectionState::Reconnecting { attempt: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({"state": "reconnecting", "attempt": 3}));
    }
}
