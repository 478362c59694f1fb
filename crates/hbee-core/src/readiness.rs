//! Backend readiness gating.
//!
//! The probe is advisory. [`await_backend`] gives a starting backend a
//! bounded head start and then lets the caller connect anyway;
//! [`spawn_monitor`] revives a manager that gave up once the backend
//! reports ready again.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hbee_api::{ReadinessProbe, Transport};

use crate::config::ProbePolicy;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::event::ClientEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
    /// The probe itself failed.
    Unknown,
}

async fn probe_once<P: ReadinessProbe>(probe: &P) -> Readiness {
    match probe.check().await {
        Ok(status) if status.is_ready() => Readiness::Ready,
        Ok(status) => {
            debug!(message = status.message.as_deref().unwrap_or(""), "backend not ready");
            Readiness::NotReady
        }
        Err(e) => {
            debug!(error = %e, "readiness probe failed");
            Readiness::Unknown
        }
    }
}

/// Poll until the backend is ready or `max_retries` probes have run.
/// Returns the last observation; anything but `Ready` means "connect
/// anyway".
pub async fn await_backend<P: ReadinessProbe>(probe: &P, policy: &ProbePolicy) -> Readiness {
    let mut last = Readiness::Unknown;
    for attempt in 1..=policy.max_retries {
        last = probe_once(probe).await;
        if last == Readiness::Ready {
            info!(attempt, "backend ready");
            return last;
        }
        if attempt < policy.max_retries {
            tokio::time::sleep(policy.retry_interval).await;
        }
    }
    warn!(
        retries = policy.max_retries,
        last = ?last,
        "backend readiness unconfirmed; connecting anyway"
    );
    last
}

/// Poll the probe every `monitor_interval`. Readiness changes are
/// broadcast as [`ClientEvent::BackendReady`]; a not-ready to ready
/// transition reconnects a manager that has given up.
pub fn spawn_monitor<T, P>(
    manager: ConnectionManager<T>,
    probe: P,
    policy: ProbePolicy,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    T: Transport,
    P: ReadinessProbe,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(policy.monitor_interval);
        let mut last_ready: Option<bool> = None;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let ready = probe_once(&probe).await == Readiness::Ready;
            if last_ready == Some(ready) {
                continue;
            }
            manager.emit(ClientEvent::BackendReady(ready));

            let recovered = ready && last_ready == Some(false);
            last_ready = Some(ready);
            if recovered
                && manager.state() == ConnectionState::Disconnected
                && manager.has_given_up()
            {
                info!("backend recovered; reconnecting");
                let manager = manager.clone();
                tokio::spawn(async move {
                    if let Err(e) = manager.connect().await {
                        warn!(error = %e, "reconnect after backend recovery failed");
                    }
                });
            }
        }
    })
}
