//! Outbound command strings.
//!
//! Commands are plain text, not JSON:
//! `GET&type=<n>` or `ACT&name=<name>&value=<v>[&type=<t>&ch=<c>]`.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// `GET&type=1`: ask the controller for its `setres` parameter dump.
pub const REQUEST_SETTINGS_TYPE: u8 = 1;
/// `GET&type=2`: ask the controller for its live status.
pub const REQUEST_STATUS_TYPE: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `GET&type=<n>`
    Get { kind: u8 },
    /// `ACT&name=<name>&value=<v>[&type=<t>&ch=<c>]`
    Act {
        name: String,
        value: String,
        target: Option<(u8, u8)>,
    },
}

impl Command {
    pub fn request_settings() -> Self {
        Self::Get {
            kind: REQUEST_SETTINGS_TYPE,
        }
    }

    pub fn request_status() -> Self {
        Self::Get {
            kind: REQUEST_STATUS_TYPE,
        }
    }

    pub fn force_defrost(on: bool) -> Self {
        Self::Act {
            name: "forcedef".into(),
            value: if on { "1" } else { "0" }.into(),
            target: None,
        }
    }

    /// Drive relay output `kind`/`channel` on or off.
    pub fn set_output(kind: u8, channel: u8, on: bool) -> Result<Self, Error> {
        for (label, n) in [("type", kind), ("ch", channel)] {
            if !(1..=99).contains(&n) {
                return Err(Error::InvalidCommand(format!(
                    "{label} {n} is outside 1..=99"
                )));
            }
        }
        Ok(Self::Act {
            name: "output".into(),
            value: if on { "1" } else { "0" }.into(),
            target: Some((kind, channel)),
        })
    }

    pub fn parse(raw: &str) -> Result<Self, Error> {
        raw.parse()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get { kind } => write!(f, "GET&type={kind}"),
            Self::Act {
                name,
                value,
                target,
            } => {
                write!(f, "ACT&name={name}&value={value}")?;
                if let Some((kind, channel)) = target {
                    write!(f, "&type={kind}&ch={channel}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidCommand(format!("'{s}': {reason}"));

        let mut parts = s.split('&');
        let verb = parts.next().unwrap_or_default();
        let pairs = parts
            .map(|pair| pair.split_once('=').ok_or_else(|| invalid("expected key=value")))
            .collect::<Result<Vec<_>, _>>()?;

        let number = |key: &str, value: &str| {
            value
                .parse::<u8>()
                .ok()
                .filter(|n| (1..=99).contains(n))
                .ok_or_else(|| invalid(&format!("{key} must be an integer in 1..=99")))
        };
        let token = |key: &str, value: &str| {
            if value.is_empty() || value.chars().any(|c| matches!(c, '&' | '=' | '/' | '+' | '#'))
            {
                Err(invalid(&format!("{key} must be a non-empty plain token")))
            } else {
                Ok(value.to_owned())
            }
        };

        match (verb, pairs.as_slice()) {
            ("GET", [("type", kind)]) => Ok(Self::Get {
                kind: number("type", *kind)?,
            }),
            ("ACT", [("name", name), ("value", value)]) => Ok(Self::Act {
                name: token("name", *name)?,
                value: token("value", *value)?,
                target: None,
            }),
            ("ACT", [("name", name), ("value", value), ("type", kind), ("ch", channel)]) => {
                Ok(Self::Act {
                    name: token("name", *name)?,
                    value: token("value", *value)?,
                    target: Some((number("type", *kind)?, number("ch", *channel)?)),
                })
            }
            ("GET" | "ACT", _) => Err(invalid("unexpected fields")),
            _ => Err(invalid("must start with GET& or ACT&")),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_wire_strings() {
        assert_eq!(Command::request_settings().to_string(), "GET&type=1");
        assert_eq!(Command::request_status().to_string(), "GET&type=2");
        assert_eq!(
            Command::force_defrost(true).to_string(),
            "ACT&name=forcedef&value=1"
        );
        assert_eq!(
            Command::set_output(1, 2, false).unwrap().to_string(),
            "ACT&name=output&value=0&type=1&ch=2"
        );
    }

    #[test]
    fn parses_own_output() {
        for cmd in [
            Command::request_status(),
            Command::force_defrost(false),
            Command::set_output(3, 4, true).unwrap(),
        ] {
            assert_eq!(Command::parse(&cmd.to_string()).unwrap(), cmd);
        }
    }

    #[test]
    fn rejects_malformed_commands() {
        for raw in [
            "",
            "PUT&type=1",
            "GET",
            "GET&type=0",
            "GET&type=1&x=2",
            "ACT&value=1&name=forcedef",
            "ACT&name=&value=1",
            "ACT&name=output&value=1&type=1",
            "ACT&name=output&value=1&type=1&ch=100",
            "GET&type",
        ] {
            assert!(
                matches!(Command::parse(raw), Err(Error::InvalidCommand(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn output_target_bounds() {
        assert!(Command::set_output(0, 1, true).is_err());
        assert!(Command::set_output(1, 100, true).is_err());
    }
}
