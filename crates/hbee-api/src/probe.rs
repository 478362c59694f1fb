// ── Backend readiness probe ──
//
// The web backend exposes whether its own broker bridge is up. Clients
// poll it before the first connect so they don't race a backend that is
// still starting, but never treat it as a hard prerequisite.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::Error;

/// Body of `GET /api/mqtt/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub backend_ready: bool,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl BackendStatus {
    /// All three flags must agree before the backend counts as ready.
    pub fn is_ready(&self) -> bool {
        self.success && self.backend_ready && self.connected
    }
}

/// Anything that can report backend readiness.
pub trait ReadinessProbe: Send + Sync + 'static {
    fn check(&self) -> impl Future<Output = Result<BackendStatus, Error>> + Send;
}

/// HTTP implementation of [`ReadinessProbe`].
#[derive(Debug, Clone)]
pub struct BackendProbe {
    http: reqwest::Client,
    url: Url,
}

impl BackendProbe {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hbee/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, url })
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_reqwest(url: Url, http: reqwest::Client) -> Self {
        Self { http, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn fetch(&self) -> Result<BackendStatus, Error> {
        debug!(url = %self.url, "probing backend readiness");

        let body = self
            .http
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

impl ReadinessProbe for BackendProbe {
    fn check(&self) -> impl Future<Output = Result<BackendStatus, Error>> + Send {
        self.fetch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_needs_all_flags() {
        let mut status: BackendStatus =
            serde_json::from_str(r#"{"success":true,"backendReady":true,"connected":true}"#)
                .unwrap();
        assert!(status.is_ready());

        status.connected = false;
        assert!(!status.is_ready());
    }

    #[test]
    fn missing_flags_default_to_false() {
        let status: BackendStatus =
            serde_json::from_str(r#"{"success":true,"message":"starting"}"#).unwrap();
        assert!(!status.is_ready());
        assert_eq!(status.message.as_deref(), Some("starting"));
    }
}
