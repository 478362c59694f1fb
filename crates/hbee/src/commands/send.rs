//! `hbee send`: publish one command and optionally wait for the reply.

use std::time::Duration;

use tokio::sync::mpsc;

use hbee_api::command::{REQUEST_SETTINGS_TYPE, REQUEST_STATUS_TYPE};
use hbee_api::topic::{device_filter, is_device_id};
use hbee_api::{Command, Message, Topic};
use hbee_config::ResolvedProfile;
use hbee_core::handler;

use crate::cli::{GlobalOpts, SendArgs, SendCommand};
use crate::commands::session;
use crate::commands::watch::render_message;
use crate::error::CliError;
use crate::output;

/// Translate the CLI subcommand into a wire command.
pub fn build_command(cmd: &SendCommand) -> Result<Command, CliError> {
    let invalid = |e: hbee_api::Error| CliError::Validation {
        field: "command".into(),
        reason: e.to_string(),
    };
    match cmd {
        SendCommand::Settings => Ok(Command::request_settings()),
        SendCommand::Status => Ok(Command::request_status()),
        SendCommand::Defrost { state } => Ok(Command::force_defrost(state.is_on())),
        SendCommand::Output {
            kind,
            channel,
            state,
        } => Command::set_output(*kind, *channel, state.is_on()).map_err(invalid),
        SendCommand::Raw { command } => Command::parse(command).map_err(invalid),
    }
}

/// Whether `message` answers `command`.
pub fn is_reply(command: &Command, message: &Message) -> bool {
    match command {
        Command::Get {
            kind: REQUEST_SETTINGS_TYPE,
        } => matches!(message, Message::SetRes(_)),
        Command::Get {
            kind: REQUEST_STATUS_TYPE,
        } => matches!(message, Message::Live(_) | Message::Status(_)),
        Command::Get { .. } => true,
        Command::Act { .. } => matches!(message, Message::ActRes(_) | Message::Error(_)),
    }
}

pub async fn handle(
    args: SendArgs,
    profile: ResolvedProfile,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if !is_device_id(&args.device) {
        return Err(CliError::Validation {
            field: "device".into(),
            reason: format!(
                "'{}' is neither a UUID nor a 12-digit hardware address",
                args.device
            ),
        });
    }
    let command = build_command(&args.command)?;
    let owner = args
        .owner
        .clone()
        .unwrap_or_else(|| profile.client.access.user_id.clone());

    let session = session::open(&profile, None, false).await?;
    let client = session.client.clone();

    let (tx, mut rx) = mpsc::unbounded_channel::<(Topic, Message)>();
    if args.wait.is_some() {
        let device = args.device.clone();
        let on_message = handler(move |topic, message| {
            if topic.device_id() == device {
                let _ = tx.send((topic.clone(), message.clone()));
            }
        });
        client.subscribe(&device_filter(&owner), on_message).await?;
    }

    let sent = client.publish_command(&owner, &args.device, &command).await;
    if let Err(e) = sent {
        session.close().await;
        return Err(e.into());
    }
    if !global.quiet {
        eprintln!("sent {command} to {}", args.device);
    }

    let result = match args.wait {
        None => Ok(()),
        Some(secs) => {
            let color = output::should_color(&global.color);
            let wait = async {
                while let Some((topic, message)) = rx.recv().await {
                    if is_reply(&command, &message) {
                        return Some(render_message(&global.output, &topic, &message, color));
                    }
                }
                None
            };
            match tokio::time::timeout(Duration::from_secs(secs), wait).await {
                Ok(Some(line)) => {
                    output::print_output(&line, global.quiet);
                    Ok(())
                }
                Ok(None) | Err(_) => Err(CliError::NoReply {
                    device: args.device.clone(),
                    seconds: secs,
                }),
            }
        }
    };

    session.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Switch;

    #[test]
    fn builds_wire_commands() {
        let cmd = build_command(&SendCommand::Output {
            kind: 1,
            channel: 2,
            state: Switch::On,
        })
        .unwrap();
        assert_eq!(cmd.to_string(), "ACT&name=output&value=1&type=1&ch=2");

        let cmd = build_command(&SendCommand::Raw {
            command: "GET&type=2".into(),
        })
        .unwrap();
        assert_eq!(cmd, Command::request_status());
    }

    #[test]
    fn raw_commands_are_validated() {
        let err = build_command(&SendCommand::Raw {
            command: "REBOOT".into(),
        })
        .unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn replies_match_their_request() {
        let setres = hbee_api::payload::parse(r#"{"actcode":"setres","p01":"235"}"#)
            .unwrap()
            .message;
        let actres =
            hbee_api::payload::parse(r#"{"actcode":"actres","name":"forcedef","value":"1"}"#)
                .unwrap()
                .message;

        assert!(is_reply(&Command::request_settings(), &setres));
        assert!(!is_reply(&Command::request_status(), &setres));
        assert!(is_reply(&Command::force_defrost(true), &actres));
        assert!(!is_reply(&Command::request_settings(), &actres));
    }
}
