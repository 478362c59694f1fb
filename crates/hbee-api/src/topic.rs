//! Topic grammar: `HBEE/{userId}/{sensorType}/{deviceId}/{suffix}`.
//!
//! Exactly five `/`-separated segments. Inbound device traffic arrives on
//! `DEV` / `RESP`, outbound commands always go to `.../TC/{deviceId}/SER`.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::error::TopicError;

/// Fixed first segment of every topic.
pub const PREFIX: &str = "HBEE";

/// Longest topic accepted at the publish boundary.
pub const MAX_PUBLISH_TOPIC_LEN: usize = 200;

const SEGMENT_COUNT: usize = 5;

// ── Segment enums ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SensorType {
    Tc,
    Sensor,
    Device,
    Iot,
}

/// Direction marker in the last segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Suffix {
    /// Device to client telemetry.
    Dev,
    /// Client to device command.
    Ser,
    Cmd,
    /// Device reply to a command.
    Resp,
}

impl Suffix {
    /// Whether messages on this suffix carry device data for the client.
    pub fn is_inbound(self) -> bool {
        matches!(self, Self::Dev | Self::Resp)
    }
}

// ── Topic ───────────────────────────────────────────────────────────

/// A validated five-segment topic.
///
/// Only obtainable through [`Topic::parse`], so every instance satisfies
/// the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Topic {
    user_id: String,
    sensor_type: SensorType,
    device_id: String,
    suffix: Suffix,
}

impl Topic {
    pub fn parse(raw: &str) -> Result<Self, TopicError> {
        if raw.trim().is_empty() {
            return Err(TopicError::Empty);
        }

        let segments: Vec<&str> = raw.split('/').collect();
        let [prefix, user_id, sensor_type, device_id, suffix] = segments[..] else {
            return Err(TopicError::SegmentCount {
                found: segments.len(),
            });
        };

        if prefix != PREFIX {
            return Err(TopicError::Prefix(prefix.to_owned()));
        }
        if user_id.is_empty() {
            return Err(TopicError::EmptyUserId);
        }
        let sensor_type = SensorType::from_str(sensor_type)
            .map_err(|_| TopicError::SensorType(sensor_type.to_owned()))?;
        if device_id.is_empty() {
            return Err(TopicError::EmptyDeviceId);
        }
        if !is_device_id(device_id) {
            return Err(TopicError::DeviceId(device_id.to_owned()));
        }
        let suffix =
            Suffix::from_str(suffix).map_err(|_| TopicError::Suffix(suffix.to_owned()))?;

        Ok(Self {
            user_id: user_id.to_owned(),
            sensor_type,
            device_id: device_id.to_owned(),
            suffix,
        })
    }

    pub fn prefix(&self) -> &'static str {
        PREFIX
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn sensor_type(&self) -> SensorType {
        self.sensor_type
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn suffix(&self) -> Suffix {
        self.suffix
    }

    /// The command topic addressing the same device.
    pub fn outbound(&self) -> String {
        format!("{PREFIX}/{}/TC/{}/SER", self.user_id, self.device_id)
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PREFIX}/{}/{}/{}/{}",
            self.user_id, self.sensor_type, self.device_id, self.suffix
        )
    }
}

/// `8-4-4-4-12` hex UUID or a bare 12-hex-digit hardware address.
pub fn is_device_id(s: &str) -> bool {
    match s.len() {
        12 => s.bytes().all(|b| b.is_ascii_hexdigit()),
        36 => Uuid::try_parse(s).is_ok(),
        _ => false,
    }
}

// ── Outbound ────────────────────────────────────────────────────────

/// Build the canonical command topic `HBEE/{userId}/TC/{deviceId}/SER`.
///
/// Both ids are checked as single literal segments, so the result can
/// never carry a wildcard or an extra level.
pub fn build_outbound_topic(user_id: &str, device_id: &str) -> Result<String, TopicError> {
    check_literal_segment(user_id).map_err(|e| match e {
        TopicError::Segment(_) if user_id.is_empty() => TopicError::EmptyUserId,
        other => other,
    })?;
    if device_id.is_empty() {
        return Err(TopicError::EmptyDeviceId);
    }
    if !is_device_id(device_id) {
        return Err(TopicError::DeviceId(device_id.to_owned()));
    }

    let topic = format!("{PREFIX}/{user_id}/TC/{device_id}/SER");
    check_publish_topic(&topic)?;
    Ok(topic)
}

/// Publish-boundary check applied to every outgoing topic.
pub fn check_publish_topic(topic: &str) -> Result<(), TopicError> {
    if let Some(c) = topic.chars().find(|c| matches!(c, '+' | '#')) {
        return Err(TopicError::Wildcard(c));
    }
    if topic.len() > MAX_PUBLISH_TOPIC_LEN {
        return Err(TopicError::TooLong {
            len: topic.len(),
            max: MAX_PUBLISH_TOPIC_LEN,
        });
    }
    let parsed = Topic::parse(topic)?;
    if parsed.sensor_type != SensorType::Tc || parsed.suffix != Suffix::Ser {
        return Err(TopicError::NotOutbound);
    }
    Ok(())
}

fn check_literal_segment(segment: &str) -> Result<(), TopicError> {
    if let Some(c) = segment.chars().find(|c| matches!(c, '+' | '#')) {
        return Err(TopicError::Wildcard(c));
    }
    if segment.is_empty() || segment.contains('/') || segment.contains('\0') {
        return Err(TopicError::Segment(segment.to_owned()));
    }
    Ok(())
}

// ── Subscription patterns ───────────────────────────────────────────

/// MQTT filter match: `+` spans one level, a trailing `#` spans the rest.
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut levels = topic.split('/');
    for part in filter.split('/') {
        if part == "#" {
            return true;
        }
        match levels.next() {
            Some(level) if part == "+" || part == level => {}
            _ => return false,
        }
    }
    levels.next().is_none()
}

/// Whether a subscription filter contains wildcard levels.
pub fn is_wildcard_filter(filter: &str) -> bool {
    filter.split('/').any(|level| level == "+" || level == "#")
}

/// Wildcard subscription for all device traffic owned by `user_id`.
pub fn device_filter(user_id: &str) -> String {
    format!("{PREFIX}/{user_id}/+/+/DEV")
}

// ── Tests ────────────────────────────────────────────────────────────
