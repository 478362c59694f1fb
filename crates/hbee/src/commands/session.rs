//! Opening and closing a broker session for profile-bound commands.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hbee_api::{BackendProbe, MqttTransport};
use hbee_config::ResolvedProfile;
use hbee_core::readiness::{self, Readiness};
use hbee_core::{Collaborators, ConnectionManager, PageClassifier, PageInfo};

use crate::error::CliError;

pub type Client = ConnectionManager<MqttTransport>;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// A connected client plus its background readiness monitor.
pub struct Session {
    pub client: Client,
    monitor: Option<(CancellationToken, JoinHandle<()>)>,
}

/// Build the readiness probe for `profile`, if it names an endpoint.
pub fn probe_for(profile: &ResolvedProfile) -> Result<Option<BackendProbe>, CliError> {
    profile
        .status_url
        .clone()
        .map(|url| {
            BackendProbe::new(url, PROBE_TIMEOUT).map_err(|e| CliError::Validation {
                field: "status_url".into(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// Connect using `profile`.
///
/// With `probe_first`, a configured readiness endpoint is polled before
/// connecting; an unready backend delays the connect but never blocks it.
pub async fn open(
    profile: &ResolvedProfile,
    page: Option<PageInfo>,
    probe_first: bool,
) -> Result<Session, CliError> {
    let probe = probe_for(profile)?;

    if probe_first {
        if let Some(ref probe) = probe {
            let outcome = readiness::await_backend(probe, &profile.client.probe).await;
            if outcome != Readiness::Ready {
                tracing::warn!(?outcome, "backend not confirmed ready");
            }
        }
    }

    let collaborators = Collaborators {
        page: page.map(|p| Arc::new(p) as Arc<dyn PageClassifier>),
        ..Collaborators::default()
    };
    let client = ConnectionManager::with_collaborators(
        MqttTransport::new(profile.broker.clone()),
        profile.client.clone(),
        collaborators,
    );

    client
        .connect()
        .await
        .map_err(|e| CliError::from_core(e, profile.broker.url.as_str(), &profile.name))?;

    let monitor = probe.map(|probe| {
        let cancel = CancellationToken::new();
        let handle = readiness::spawn_monitor(
            client.clone(),
            probe,
            profile.client.probe.clone(),
            cancel.clone(),
        );
        (cancel, handle)
    });

    Ok(Session { client, monitor })
}

impl Session {
    /// Stop background work and leave the broker cleanly.
    pub async fn close(self) {
        if let Some((cancel, handle)) = self.monitor {
            cancel.cancel();
            let _ = handle.await;
        }
        self.client.disconnect().await;
    }
}
