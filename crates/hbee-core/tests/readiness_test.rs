// Integration tests for backend readiness gating.

mod support;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use hbee_api::{BackendStatus, Error, ReadinessProbe};
use hbee_core::readiness::{await_backend, spawn_monitor};
use hbee_core::{
    AccessPolicy, ClientConfig, ClientEvent, ConnectionManager, ConnectionState, ProbePolicy,
    Readiness,
};

use support::{MockTransport, wait_for_event};

/// Replays a fixed sequence of answers, repeating the last one.
#[derive(Clone)]
struct ScriptedProbe {
    answers: Arc<Mutex<VecDeque<Option<bool>>>>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedProbe {
    /// `Some(ready)` answers with a status; `None` fails the request.
    fn new(answers: &[Option<bool>]) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.iter().copied().collect())),
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl ReadinessProbe for ScriptedProbe {
    async fn check(&self) -> Result<BackendStatus, Error> {
        *self.calls.lock().unwrap() += 1;
        let answer = {
            let mut answers = self.answers.lock().unwrap();
            if answers.len() > 1 {
                answers.pop_front().unwrap()
            } else {
                answers[0]
            }
        };
        match answer {
            Some(ready) => Ok(BackendStatus {
                success: true,
                backend_ready: ready,
                connected: ready,
                message: None,
            }),
            None => Err(Error::Connect("probe unreachable".into())),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn waits_for_backend_to_become_ready() {
    let probe = ScriptedProbe::new(&[Some(false), None, Some(false), Some(true)]);
    let start = Instant::now();

    let readiness = await_backend(&probe, &ProbePolicy::default()).await;
    assert_eq!(readiness, Readiness::Ready);
    assert_eq!(probe.calls(), 4);
    assert_eq!(start.elapsed(), Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn falls_through_after_bounded_retries() {
    let probe = ScriptedProbe::new(&[None]);
    let start = Instant::now();

    let readiness = await_backend(&probe, &ProbePolicy::default()).await;
    assert_eq!(readiness, Readiness::Unknown);
    assert_eq!(probe.calls(), 10);
    // Nine gaps between ten probes.
    assert_eq!(start.elapsed(), Duration::from_secs(18));
}

#[tokio::test(start_paused = true)]
async fn monitor_revives_manager_that_gave_up() {
    let transport = MockTransport::new();
    let mut cfg = ClientConfig::new(AccessPolicy::new("alice"));
    cfg.reconnect.max_attempts = 0;
    let manager = ConnectionManager::new(transport.clone(), cfg);
    let mut events = manager.events();

    transport.fail_next(1);
    assert!(manager.connect().await.is_err());
    assert!(manager.has_given_up());

    let probe = ScriptedProbe::new(&[Some(false), Some(false), Some(true)]);
    let cancel = CancellationToken::new();
    let monitor = spawn_monitor(manager.clone(), probe, ProbePolicy::default(), cancel.clone());

    assert_eq!(
        wait_for_event(&mut events, |e| matches!(e, ClientEvent::BackendReady(_))).await,
        ClientEvent::BackendReady(false)
    );
    assert_eq!(
        wait_for_event(&mut events, |e| matches!(e, ClientEvent::BackendReady(_))).await,
        ClientEvent::BackendReady(true)
    );
    wait_for_event(&mut events, |e| matches!(e, ClientEvent::Connected)).await;
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(transport.connect_calls(), 2);

    cancel.cancel();
    monitor.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn monitor_leaves_deliberate_disconnect_alone() {
    let transport = MockTransport::new();
    let manager = ConnectionManager::new(transport.clone(), ClientConfig::default());

    let probe = ScriptedProbe::new(&[Some(false), Some(true)]);
    let cancel = CancellationToken::new();
    let monitor = spawn_monitor(
        manager.clone(),
        probe.clone(),
        ProbePolicy::default(),
        cancel.clone(),
    );

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert!(probe.calls() >= 3);
    assert_eq!(transport.connect_calls(), 0);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    cancel.cancel();
    monitor.await.unwrap();
}
