//! `hbee watch`: subscribe to a page of devices and stream what they say.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use hbee_api::{Message, Topic};
use hbee_config::ResolvedProfile;
use hbee_core::{ClientEvent, DeviceRef, PageContext, PageInfo, ValidationStats, handler};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::commands::session;
use crate::error::CliError;
use crate::output;

/// One streamed line in structured output modes.
#[derive(Debug, Serialize)]
struct Observed {
    at: DateTime<Utc>,
    topic: String,
    device: String,
    #[serde(flatten)]
    message: Message,
}

/// The page `watch` presents: the named devices, or every device the
/// account can see when none are named.
pub fn watch_page(args: &WatchArgs, profile: &ResolvedProfile) -> PageInfo {
    let owner = args
        .owner
        .clone()
        .unwrap_or_else(|| profile.client.access.user_id.clone());
    let ids = if args.device.is_empty() {
        &profile.devices
    } else {
        &args.device
    };
    let mut devices: Vec<DeviceRef> = ids
        .iter()
        .map(|id| DeviceRef::new(owner.clone(), id.clone()))
        .collect();

    let context = if devices.len() == 1 {
        PageContext::SingleDevice {
            device: devices.remove(0),
        }
    } else {
        PageContext::MultiDevice { devices }
    };
    PageInfo::new("watch", context)
}

pub async fn handle(
    args: WatchArgs,
    mut profile: ResolvedProfile,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.no_sync {
        profile.client.sync.enabled = false;
    }
    let page = watch_page(&args, &profile);
    let sync_page = profile.client.sync.enabled.then(|| page.clone());

    let session = session::open(&profile, sync_page, !args.no_probe).await?;
    let client = session.client.clone();
    let mut events = client.events();

    let (tx, mut rx) = mpsc::unbounded_channel::<(Topic, Message)>();
    let on_message = handler(move |topic, message| {
        let _ = tx.send((topic.clone(), message.clone()));
    });
    let topics = client.subscribe_page(&page, on_message).await?;
    tracing::info!(topics = ?topics, "watching");

    let color = output::should_color(&global.color);
    let deadline = sleep_or_forever(args.duration.map(Duration::from_secs));
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupted);
    let mut seen = 0usize;

    let outcome = loop {
        tokio::select! {
            biased;
            _ = &mut interrupted => break Ok(()),
            () = &mut deadline => break Ok(()),
            Some((topic, message)) = rx.recv() => {
                if !global.quiet {
                    println!("{}", render_message(&global.output, &topic, &message, color));
                }
                seen += 1;
                if args.count.is_some_and(|limit| seen >= limit) {
                    break Ok(());
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(err) = report_event(&event, color) {
                        break Err(err);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break Ok(()),
            },
        }
    };

    let stats = client.stats();
    session.close().await;

    if args.stats {
        let out = output::render_single(&global.output, &stats, format_stats, |s| {
            s.total.to_string()
        });
        output::print_output(&out, global.quiet);
    }
    outcome
}

async fn sleep_or_forever(deadline: Option<Duration>) {
    match deadline {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

/// Narrate lifecycle events on stderr. Returns an error once the
/// client has given up.
fn report_event(event: &ClientEvent, color: bool) -> Option<CliError> {
    match event {
        ClientEvent::Connected => eprintln!("{}", output::success("connected", color)),
        ClientEvent::Reconnected { restored } => eprintln!(
            "{}",
            output::success(&format!("reconnected, {restored} subscriptions restored"), color)
        ),
        ClientEvent::ConnectionLost { reason } => {
            eprintln!("{}", output::alert(&format!("connection lost: {reason}"), color));
        }
        ClientEvent::GaveUp { attempts } => {
            return Some(CliError::ReconnectExhausted {
                attempts: *attempts,
            });
        }
        ClientEvent::SyncCompleted(report) => eprintln!(
            "{}",
            output::dim(
                &format!(
                    "requested settings from {} and status from {} device(s)",
                    report.settings_requested, report.status_requested
                ),
                color
            )
        ),
        ClientEvent::BackendReady(ready) => {
            let text = if *ready { "backend ready" } else { "backend not ready" };
            eprintln!("{}", output::dim(text, color));
        }
        ClientEvent::MessageReceived { .. } => {}
    }
    None
}

pub fn render_message(
    format: &OutputFormat,
    topic: &Topic,
    message: &Message,
    color: bool,
) -> String {
    match format {
        OutputFormat::Table | OutputFormat::Plain => {
            let time = Local::now().format("%H:%M:%S").to_string();
            let fields = message
                .updates()
                .iter()
                .map(|(field, value)| format!("{field}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            format!(
                "{} {} {:<7} {}",
                output::dim(&time, color),
                output::accent(topic.device_id(), color),
                message.actcode(),
                fields
            )
        }
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            output::render_json_line(&Observed {
                at: Utc::now(),
                topic: topic.to_string(),
                device: topic.device_id().to_owned(),
                message: message.clone(),
            })
        }
    }
}

fn format_stats(stats: &ValidationStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Messages:     {}", stats.total);
    let _ = writeln!(out, "Valid:        {}", stats.valid);
    let _ = writeln!(out, "Rejected:     {}", stats.invalid);
    let _ = write!(out, "Success rate: {:.1}%", stats.success_rate());
    for (category, count) in stats.top_categories(5) {
        let _ = write!(out, "\n  {category:<16} {count}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::{Cli, Command};

    fn profile(devices: &[&str]) -> ResolvedProfile {
        let mut p = hbee_config::Profile::new("mqtt://localhost", "alice");
        p.devices = devices.iter().map(|d| (*d).to_owned()).collect();
        hbee_config::resolve_profile(&p, "test").unwrap()
    }

    fn args(extra: &[&str]) -> WatchArgs {
        let cli = Cli::try_parse_from([&["hbee", "watch"][..], extra].concat()).unwrap();
        match cli.command {
            Command::Watch(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn profile_devices_form_a_multi_device_page() {
        let page = watch_page(&args(&[]), &profile(&["ab12cd34ef56", "0123456789ab"]));
        assert_eq!(page.devices().len(), 2);
        assert!(matches!(page.context, PageContext::MultiDevice { .. }));
    }

    #[test]
    fn single_named_device_with_owner() {
        let page = watch_page(
            &args(&["--device", "ab12cd34ef56", "--owner", "bob"]),
            &profile(&[]),
        );
        assert_eq!(
            page.context,
            PageContext::SingleDevice {
                device: DeviceRef::new("bob", "ab12cd34ef56")
            }
        );
    }

    #[test]
    fn stats_summary_lists_categories() {
        let mut stats = ValidationStats::new();
        stats.record_valid();
        stats.record_rejection(hbee_core::RejectionCategory::InvalidJson, "bad", "{x");
        let text = format_stats(&stats);
        assert!(text.contains("Messages:     2"));
        assert!(text.contains("invalid_json"));
    }
}
