//! `hbee status`: ask the web backend whether its broker bridge is up.

use hbee_api::{BackendProbe, BackendStatus, ReadinessProbe};
use hbee_config::ResolvedProfile;
use hbee_core::readiness::{self, Readiness};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::commands::session;
use crate::error::CliError;
use crate::output;

fn detail(status: &BackendStatus) -> String {
    let flag = |b: bool| if b { "yes" } else { "no" };
    let mut out = format!(
        "Ready:         {}\nSuccess:       {}\nBackend ready: {}\nConnected:     {}",
        flag(status.is_ready()),
        flag(status.success),
        flag(status.backend_ready),
        flag(status.connected),
    );
    if let Some(ref message) = status.message {
        out.push_str("\nMessage:       ");
        out.push_str(message);
    }
    out
}

pub async fn handle(
    args: StatusArgs,
    profile: Option<&ResolvedProfile>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let probe = match args.url {
        Some(ref raw) => {
            let url = raw.parse().map_err(|e| CliError::Validation {
                field: "url".into(),
                reason: format!("'{raw}': {e}"),
            })?;
            BackendProbe::new(url, std::time::Duration::from_secs(10)).map_err(|e| {
                CliError::Validation {
                    field: "url".into(),
                    reason: e.to_string(),
                }
            })?
        }
        None => profile
            .map(session::probe_for)
            .transpose()?
            .flatten()
            .ok_or(CliError::NoStatusUrl)?,
    };

    if args.wait {
        let policy = profile.map(|p| p.client.probe.clone()).unwrap_or_default();
        let outcome = readiness::await_backend(&probe, &policy).await;
        tracing::info!(?outcome, "readiness wait finished");
        if outcome == Readiness::Unknown {
            tracing::warn!("probe never answered");
        }
    }

    let status = probe
        .check()
        .await
        .map_err(|e| CliError::ConnectionFailed {
            url: probe.url().to_string(),
            source: Box::new(e),
        })?;
    let out = output::render_single(&global.output, &status, detail, |s| {
        s.is_ready().to_string()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
