//! `hbee check`: run the inbound validators without a broker.

use std::fmt::Write as _;
use std::io::Read;

use hbee_api::payload::{self, Decoded};
use hbee_api::topic::{filter_matches, is_wildcard_filter};
use hbee_api::Topic;
use hbee_core::RejectionCategory;

use crate::cli::{CheckArgs, CheckCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: CheckArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        CheckCommand::Topic { topic } => {
            let parsed = Topic::parse(&topic).map_err(|e| CliError::Rejected {
                what: "topic".into(),
                reason: e.to_string(),
            })?;
            let out =
                output::render_single(&global.output, &parsed, format_topic, Topic::to_string);
            output::print_output(&out, global.quiet);
            Ok(())
        }

        CheckCommand::Payload { payload } => {
            let raw = if payload == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                payload
            };
            let decoded = payload::parse(raw.trim_end_matches(['\r', '\n'])).map_err(|e| {
                CliError::Rejected {
                    what: format!("payload ({})", RejectionCategory::from(&e)),
                    reason: e.to_string(),
                }
            })?;
            let out = output::render_single(&global.output, &decoded, format_decoded, |d| {
                d.message.actcode().to_owned()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        CheckCommand::Match { filter, topic } => {
            if filter_matches(&filter, &topic) {
                output::print_output("match", global.quiet);
                Ok(())
            } else {
                let reason = if is_wildcard_filter(&filter) {
                    format!("'{topic}' is not covered by '{filter}'")
                } else {
                    format!("'{topic}' differs from '{filter}'")
                };
                Err(CliError::Rejected {
                    what: "topic".into(),
                    reason,
                })
            }
        }
    }
}

fn format_topic(topic: &Topic) -> String {
    format!(
        "User:     {}\nType:     {}\nDevice:   {}\nSuffix:   {}\nInbound:  {}\nReply to: {}",
        topic.user_id(),
        topic.sensor_type(),
        topic.device_id(),
        topic.suffix(),
        topic.suffix().is_inbound(),
        topic.outbound()
    )
}

fn format_decoded(decoded: &Decoded) -> String {
    let mut out = String::new();
    let _ = write!(out, "actcode: {}", decoded.message.actcode());
    for (field, value) in decoded.message.updates() {
        let _ = write!(out, "\n  {field:<10} {value}");
    }
    if let Some(ref array) = decoded.array {
        let _ = write!(
            out,
            "\narray: element {} of {} selected ({} invalid)",
            array.selected, array.total, array.invalid
        );
        for rejection in &array.rejected {
            let _ = write!(out, "\n  [{}] {}", rejection.index, rejection.error);
        }
    }
    out
}
