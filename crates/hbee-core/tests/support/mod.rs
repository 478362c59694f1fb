// Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use hbee_api::{Error, QoS, SessionId, Transport, TransportEvent, TransportSession};
use hbee_core::ClientEvent;

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Script {
    connect_delay: Duration,
    fail_connects: usize,
    fail_subscribes: usize,
    connect_times: Vec<Instant>,
    subscribes: Vec<String>,
    unsubscribes: Vec<String>,
    publishes: Vec<(Instant, String, String)>,
    sender: Option<mpsc::Sender<TransportEvent>>,
    current: Option<SessionId>,
    next_id: u64,
    closed: Vec<SessionId>,
    on_subscribe: Option<Hook>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
    connected: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().connect_delay = delay;
        self
    }

    /// The next `n` connects fail.
    pub fn fail_next(&self, n: usize) {
        self.script.lock().unwrap().fail_connects = n;
    }

    /// The next `n` subscribe requests fail.
    pub fn fail_next_subscribe(&self, n: usize) {
        self.script.lock().unwrap().fail_subscribes = n;
    }

    /// Run `hook` inside the next subscribe call, then yield.
    pub fn on_next_subscribe(&self, hook: impl FnOnce() + Send + 'static) {
        self.script.lock().unwrap().on_subscribe = Some(Box::new(hook));
    }

    pub fn connect_calls(&self) -> usize {
        self.script.lock().unwrap().connect_times.len()
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.script.lock().unwrap().connect_times.clone()
    }

    pub fn subscribes(&self) -> Vec<String> {
        self.script.lock().unwrap().subscribes.clone()
    }

    /// Sessions ended through `close`.
    pub fn closed(&self) -> Vec<SessionId> {
        self.script.lock().unwrap().closed.clone()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.script.lock().unwrap().current
    }

    pub fn unsubscribes(&self) -> Vec<String> {
        self.script.lock().unwrap().unsubscribes.clone()
    }

    pub fn clear_log(&self) {
        let mut script = self.script.lock().unwrap();
        script.subscribes.clear();
        script.unsubscribes.clear();
        script.publishes.clear();
    }

    /// `(topic, payload)` of every publish.
    pub fn publishes(&self) -> Vec<(String, String)> {
        self.script
            .lock()
            .unwrap()
            .publishes
            .iter()
            .map(|(_, topic, body)| (topic.clone(), body.clone()))
            .collect()
    }

    pub fn publish_times(&self) -> Vec<Instant> {
        self.script
            .lock()
            .unwrap()
            .publishes
            .iter()
            .map(|(at, _, _)| *at)
            .collect()
    }

    /// Inject an inbound publish.
    pub fn deliver(&self, topic: &str, payload: &str) {
        let script = self.script.lock().unwrap();
        let sender = script.sender.as_ref().expect("no live session");
        sender
            .try_send(TransportEvent::Message {
                topic: topic.into(),
                payload: Bytes::copy_from_slice(payload.as_bytes()),
            })
            .unwrap();
    }

    /// Drop the session the way a broker disconnect would.
    pub fn drop_session(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(sender) = self.script.lock().unwrap().sender.take() {
            let _ = sender.try_send(TransportEvent::ConnectionLost {
                reason: reason.into(),
            });
        }
    }

    /// Die silently: no event, only `is_connected()` turns false.
    pub fn go_silent(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    async fn connect(&self) -> Result<TransportSession, Error> {
        let delay = self.script.lock().unwrap().connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock().unwrap();
        script.connect_times.push(Instant::now());
        if script.fail_connects > 0 {
            script.fail_connects -= 1;
            return Err(Error::Connect("connection refused".into()));
        }
        script.next_id += 1;
        let id = SessionId(script.next_id);
        let (tx, rx) = mpsc::channel(64);
        script.sender = Some(tx);
        script.current = Some(id);
        self.connected.store(true, Ordering::SeqCst);
        Ok(TransportSession { id, events: rx })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(&self, filter: &str, _qos: QoS) -> Result<(), Error> {
        let hook = {
            let mut script = self.script.lock().unwrap();
            if script.fail_subscribes > 0 {
                script.fail_subscribes -= 1;
                return Err(Error::Subscribe("not authorized".into()));
            }
            script.subscribes.push(filter.to_owned());
            script.on_subscribe.take()
        };
        if let Some(hook) = hook {
            hook();
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), Error> {
        self.script
            .lock()
            .unwrap()
            .unsubscribes
            .push(filter.to_owned());
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        _qos: QoS,
        _retained: bool,
    ) -> Result<(), Error> {
        let body = String::from_utf8(payload.to_vec()).unwrap();
        self.script
            .lock()
            .unwrap()
            .publishes
            .push((Instant::now(), topic.to_owned(), body));
        Ok(())
    }

    async fn close(&self, id: SessionId) {
        let mut script = self.script.lock().unwrap();
        script.closed.push(id);
        if script.current == Some(id) {
            script.current = None;
            script.sender = None;
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        script.current = None;
        script.sender = None;
    }
}

/// Wait for the first event matching `pred`.
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<ClientEvent>,
    pred: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
