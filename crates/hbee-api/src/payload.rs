//! Message body codec.
//!
//! Bodies are flat JSON objects keyed by `actcode`. Some firmware batches
//! several objects into one JSON array; those resolve to the first element
//! that validates, with per-element diagnostics reported alongside.
//!
//! Every stage short-circuits: size, blocklist, shape, field types,
//! `actcode`, then the per-`actcode` rules.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

use crate::error::PayloadError;
use crate::param::{PARAMS, ParamId};

/// Largest accepted single-object body.
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024;
/// Largest accepted array-wrapped body.
pub const MAX_ARRAY_PAYLOAD_BYTES: usize = 50 * 1024;
pub const MAX_ARRAY_ELEMENTS: usize = 100;
pub const MAX_FIELDS: usize = 20;

const DIN_MAX: i64 = 65_000;

/// Matched case-insensitively anywhere in the raw body.
const BLOCKED_PATTERNS: [&str; 5] = ["<script", "</script", "javascript:", "vbscript:", "eval("];

/// Every `name` a message may carry, whatever its `actcode`.
const ALLOWED_NAMES: [&str; 5] = ["ain", "din", "output", "forcedef", "userId"];

static EVENT_HANDLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bon[a-z]+\s*=").expect("event handler pattern is valid"));

// ── Message model ───────────────────────────────────────────────────

/// Remaining primitive fields of a message, in wire order.
pub type Fields = Map<String, Value>;

/// A validated device message, one variant per `actcode`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "actcode", rename_all = "lowercase")]
pub enum Message {
    Live(LiveReading),
    SetRes(SettingsReport),
    ActRes(ActionReport),
    Error(Fields),
    Status(Fields),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SensorName {
    /// Analog input, usually the cabinet temperature.
    Ain,
    /// Digital input counter.
    Din,
    /// Relay output state.
    Output,
}

/// Decoded `value` of a live reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiveValue {
    Analog(f64),
    /// The probe reported `"Error"` instead of a reading.
    ProbeFault,
    Digital(u32),
    Output(bool),
}

impl LiveValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Analog(v) => Some(v),
            Self::Digital(v) => Some(f64::from(v)),
            Self::Output(on) => Some(if on { 1.0 } else { 0.0 }),
            Self::ProbeFault => None,
        }
    }
}

impl std::fmt::Display for LiveValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analog(v) => write!(f, "{v}"),
            Self::ProbeFault => f.write_str("Error"),
            Self::Digital(v) => write!(f, "{v}"),
            Self::Output(on) => f.write_str(if *on { "1" } else { "0" }),
        }
    }
}

impl Serialize for LiveValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Self::Analog(v) => serializer.serialize_f64(v),
            Self::Digital(v) => serializer.serialize_u32(v),
            Self::ProbeFault | Self::Output(_) => serializer.collect_str(self),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveReading {
    pub name: SensorName,
    pub value: LiveValue,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<u8>,
    #[serde(rename = "ch", skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
}

/// Parameters reported by a `setres` reply. Keys the device omitted are
/// simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettingsReport {
    #[serde(flatten)]
    pub params: BTreeMap<ParamId, f64>,
}

impl SettingsReport {
    pub fn get(&self, index: u8) -> Option<f64> {
        ParamId::new(index).and_then(|id| self.params.get(&id).copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr)]
pub enum ActionName {
    #[strum(serialize = "forcedef")]
    #[serde(rename = "forcedef")]
    ForceDefrost,
    #[strum(serialize = "output")]
    #[serde(rename = "output")]
    Output,
    #[strum(serialize = "userId")]
    #[serde(rename = "userId")]
    UserId,
}

/// Acknowledgement of an `ACT&` command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionReport {
    pub name: ActionName,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Message {
    pub fn actcode(&self) -> &'static str {
        match self {
            Self::Live(_) => "live",
            Self::SetRes(_) => "setres",
            Self::ActRes(_) => "actres",
            Self::Error(_) => "error",
            Self::Status(_) => "status",
        }
    }

    /// Flatten into `(field, value)` pairs for display collaborators.
    pub fn updates(&self) -> Vec<(String, String)> {
        match self {
            Self::Live(reading) => vec![(reading.name.to_string(), reading.value.to_string())],
            Self::SetRes(report) => report
                .params
                .iter()
                .map(|(id, value)| (id.to_string(), value.to_string()))
                .collect(),
            Self::ActRes(report) => {
                let value = report.fields.get("value").map(value_text).unwrap_or_default();
                vec![(report.name.to_string(), value)]
            }
            Self::Error(fields) | Self::Status(fields) => fields
                .iter()
                .map(|(key, value)| (key.clone(), value_text(value)))
                .collect(),
        }
    }
}

// ── Decode result ───────────────────────────────────────────────────

/// Outcome of a successful parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decoded {
    pub message: Message,
    /// Present only when the body was array-wrapped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array: Option<ArrayDiagnostics>,
}

/// What happened to each element of an array-wrapped body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayDiagnostics {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Index of the element that was dispatched.
    pub selected: usize,
    pub rejected: Vec<ElementRejection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementRejection {
    pub index: usize,
    #[serde(rename = "reason", serialize_with = "serialize_display")]
    pub error: PayloadError,
}

fn serialize_display<S: Serializer>(err: &PayloadError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(err)
}

// ── Entry point ─────────────────────────────────────────────────────

/// Validate and decode a raw message body.
pub fn parse(raw: &str) -> Result<Decoded, PayloadError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(PayloadError::Empty);
    }

    let array_wrapped = text.starts_with('[') && text.ends_with(']');
    let max = if array_wrapped {
        MAX_ARRAY_PAYLOAD_BYTES
    } else {
        MAX_PAYLOAD_BYTES
    };
    if raw.len() > max {
        return Err(PayloadError::TooLarge {
            len: raw.len(),
            max,
        });
    }

    scan_blocked(raw)?;

    if array_wrapped {
        return decode_array(text);
    }

    if !(text.starts_with('{') && text.ends_with('}')) {
        return Err(PayloadError::NotObject);
    }
    let value: Value =
        serde_json::from_str(text).map_err(|e| PayloadError::Json(e.to_string()))?;

    Ok(Decoded {
        message: decode_object(value)?,
        array: None,
    })
}

fn scan_blocked(raw: &str) -> Result<(), PayloadError> {
    let lower = raw.to_ascii_lowercase();
    if let Some(pattern) = BLOCKED_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(PayloadError::Blocked((*pattern).to_owned()));
    }
    if let Some(found) = EVENT_HANDLER.find(&lower) {
        return Err(PayloadError::Blocked(found.as_str().to_owned()));
    }
    Ok(())
}

fn decode_array(text: &str) -> Result<Decoded, PayloadError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| PayloadError::Json(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(PayloadError::NotObject);
    };

    let total = items.len();
    if total == 0 {
        return Err(PayloadError::EmptyArray);
    }
    if total > MAX_ARRAY_ELEMENTS {
        return Err(PayloadError::ArrayTooLarge {
            len: total,
            max: MAX_ARRAY_ELEMENTS,
        });
    }

    let mut selected: Option<(usize, Message)> = None;
    let mut valid = 0;
    let mut rejected = Vec::new();

    for (index, item) in items.into_iter().enumerate() {
        match decode_object(item) {
            Ok(message) => {
                valid += 1;
                if selected.is_none() {
                    selected = Some((index, message));
                }
            }
            Err(error) => rejected.push(ElementRejection { index, error }),
        }
    }

    let Some((selected, message)) = selected else {
        let first = rejected
            .into_iter()
            .next()
            .map_or(PayloadError::EmptyArray, |r| r.error);
        return Err(PayloadError::NoValidElement {
            total,
            first: Box::new(first),
        });
    };

    if !rejected.is_empty() {
        tracing::info!(
            total,
            valid,
            invalid = rejected.len(),
            selected,
            "array-wrapped message resolved with rejected elements"
        );
    }

    Ok(Decoded {
        message,
        array: Some(ArrayDiagnostics {
            total,
            valid,
            invalid: rejected.len(),
            selected,
            rejected,
        }),
    })
}

// ── Object validation ───────────────────────────────────────────────

fn decode_object(value: Value) -> Result<Message, PayloadError> {
    let Value::Object(mut fields) = value else {
        return Err(PayloadError::NotObject);
    };

    if fields.is_empty() {
        return Err(PayloadError::EmptyObject);
    }
    if fields.len() > MAX_FIELDS {
        return Err(PayloadError::TooManyFields {
            count: fields.len(),
            max: MAX_FIELDS,
        });
    }
    if let Some((key, _)) = fields.iter().find(|(_, v)| v.is_object() || v.is_array()) {
        return Err(PayloadError::Nested(key.clone()));
    }

    let actcode = match fields.remove("actcode") {
        None | Some(Value::Null) => return Err(PayloadError::MissingActcode),
        Some(Value::String(code)) => code,
        Some(other) => return Err(PayloadError::UnknownActcode(other.to_string())),
    };

    let message = match actcode.as_str() {
        "live" => Message::Live(decode_live(&fields)?),
        "setres" => Message::SetRes(decode_settings(&fields)?),
        "actres" => Message::ActRes(decode_action(&fields)?),
        "error" => Message::Error(fields.clone()),
        "status" => Message::Status(fields.clone()),
        _ => return Err(PayloadError::UnknownActcode(actcode)),
    };

    if let Some(name) = fields.get("name") {
        let name = value_text(name);
        if !ALLOWED_NAMES.contains(&name.as_str()) {
            return Err(PayloadError::DisallowedName(name));
        }
    }

    Ok(message)
}

fn decode_live(fields: &Fields) -> Result<LiveReading, PayloadError> {
    let name = required(fields, "live", "name")?;
    let name = name
        .as_str()
        .and_then(|n| SensorName::from_str(n).ok())
        .ok_or_else(|| PayloadError::InvalidName {
            actcode: "live",
            name: value_text(name),
        })?;

    let raw = required(fields, "live", "value")?;
    let value = match name {
        SensorName::Ain => match raw {
            Value::String(s) if s == "Error" => LiveValue::ProbeFault,
            _ => number(raw)
                .map(LiveValue::Analog)
                .ok_or_else(|| invalid_value("ain", raw, "is not a number"))?,
        },
        SensorName::Din => integer(raw)
            .filter(|n| (0..=DIN_MAX).contains(n))
            .and_then(|n| u32::try_from(n).ok())
            .map(LiveValue::Digital)
            .ok_or_else(|| invalid_value("din", raw, "is not an integer in 0..=65000"))?,
        SensorName::Output => match raw.as_str() {
            Some("0") => LiveValue::Output(false),
            Some("1") => LiveValue::Output(true),
            _ => return Err(invalid_value("output", raw, "must be \"0\" or \"1\"")),
        },
    };

    let kind = small_selector(fields, "type")?;
    let channel = match small_selector(fields, "ch")? {
        Some(ch) => Some(ch),
        None => small_selector(fields, "channel")?,
    };

    Ok(LiveReading {
        name,
        value,
        kind,
        channel,
    })
}

fn decode_settings(fields: &Fields) -> Result<SettingsReport, PayloadError> {
    let mut report = SettingsReport::default();

    for spec in &PARAMS {
        let id = spec.id();
        let key = id.to_string();
        let Some(raw) = fields.get(&key).filter(|v| !v.is_null()) else {
            continue;
        };

        let value = number(raw).ok_or_else(|| PayloadError::NotNumeric {
            key: key.clone(),
            value: value_text(raw),
        })?;
        if spec.integral && value.fract() != 0.0 {
            return Err(PayloadError::NotIntegral {
                key,
                value: value_text(raw),
            });
        }
        if !spec.contains(value) {
            return Err(PayloadError::OutOfRange {
                key,
                value,
                min: spec.min,
                max: spec.max,
            });
        }

        report.params.insert(id, value);
    }

    Ok(report)
}

fn decode_action(fields: &Fields) -> Result<ActionReport, PayloadError> {
    let name = required(fields, "actres", "name")?;
    let name = name
        .as_str()
        .and_then(|n| ActionName::from_str(n).ok())
        .ok_or_else(|| PayloadError::InvalidName {
            actcode: "actres",
            name: value_text(name),
        })?;

    let mut rest = fields.clone();
    rest.remove("name");
    Ok(ActionReport { name, fields: rest })
}

// ── Field helpers ───────────────────────────────────────────────────

fn required<'a>(
    fields: &'a Fields,
    actcode: &'static str,
    field: &'static str,
) -> Result<&'a Value, PayloadError> {
    fields
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or(PayloadError::MissingField { actcode, field })
}

/// Optional `1..=99` integer such as `type` or `ch`.
fn small_selector(fields: &Fields, key: &str) -> Result<Option<u8>, PayloadError> {
    let Some(raw) = fields.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let Some(n) = integer(raw) else {
        return Err(PayloadError::NotIntegral {
            key: key.to_owned(),
            value: value_text(raw),
        });
    };
    u8::try_from(n)
        .ok()
        .filter(|n| (1..=99).contains(n))
        .map(Some)
        .ok_or_else(|| PayloadError::OutOfRange {
            key: key.to_owned(),
            value: number(raw).unwrap_or_default(),
            min: 1.0,
            max: 99.0,
        })
}

/// JSON number, or a string that parses entirely as a finite number.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// JSON integer (integral floats such as `1.0` included), or a string
/// that parses entirely as one.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Largest magnitude at which every integral `f64` is exact.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[allow(clippy::cast_possible_truncation)]
fn integral(v: f64) -> Option<i64> {
    (v.fract() == 0.0 && v.abs() <= MAX_SAFE_INTEGER).then(|| v as i64)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn invalid_value(name: &'static str, raw: &Value, reason: &'static str) -> PayloadError {
    PayloadError::InvalidValue {
        name,
        value: value_text(raw),
        reason,
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn message(raw: &str) -> Message {
        parse(raw).unwrap().message
    }

    fn reject(raw: &str) -> PayloadError {
        parse(raw).unwrap_err()
    }

    // ── Envelope ────────────────────────────────────────────────────

    #[test]
    fn live_analog_reading() {
        let msg = message(r#"{"actcode":"live","name":"ain","value":"23.5"}"#);
        let Message::Live(reading) = msg else {
            panic!("expected live message");
        };
        assert_eq!(reading.name, SensorName::Ain);
        assert_eq!(reading.value, LiveValue::Analog(23.5));
        assert_eq!(reading.kind, None);
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert_eq!(reject(""), PayloadError::Empty);
        assert_eq!(reject("   "), PayloadError::Empty);

        let padding = "x".repeat(MAX_PAYLOAD_BYTES);
        let raw = format!(r#"{{"actcode":"status","note":"{padding}"}}"#);
        assert!(matches!(
            reject(&raw),
            PayloadError::TooLarge { max: MAX_PAYLOAD_BYTES, .. }
        ));
    }

    #[test]
    fn array_bodies_get_the_larger_limit() {
        let padding = "x".repeat(MAX_PAYLOAD_BYTES);
        let raw = format!(r#"[{{"actcode":"status","note":"{padding}"}}]"#);
        assert!(parse(&raw).is_ok());

        let padding = "x".repeat(MAX_ARRAY_PAYLOAD_BYTES);
        let raw = format!(r#"[{{"actcode":"status","note":"{padding}"}}]"#);
        assert!(matches!(
            reject(&raw),
            PayloadError::TooLarge { max: MAX_ARRAY_PAYLOAD_BYTES, .. }
        ));
    }

    #[test]
    fn rejects_blocked_substrings() {
        for (raw, pattern) in [
            (r#"{"actcode":"status","x":"<SCRIPT>"}"#, "<script"),
            (r#"{"actcode":"status","x":"</script>"}"#, "</script"),
            (r#"{"actcode":"status","x":"JavaScript:go()"}"#, "javascript:"),
            (r#"{"actcode":"status","x":"vbscript:go"}"#, "vbscript:"),
            (r#"{"actcode":"status","x":"eval(1)"}"#, "eval("),
            (r#"{"actcode":"status","x":"<img onerror=go>"}"#, "onerror="),
            (r#"{"actcode":"status","x":"onLoad = go"}"#, "onload ="),
        ] {
            assert_eq!(reject(raw), PayloadError::Blocked(pattern.into()), "{raw}");
        }
    }

    #[test]
    fn rejects_non_object_bodies() {
        assert_eq!(reject("42"), PayloadError::NotObject);
        assert_eq!(reject(r#""live""#), PayloadError::NotObject);
        assert!(matches!(reject("{not json}"), PayloadError::Json(_)));
        assert_eq!(reject("{}"), PayloadError::EmptyObject);
    }

    #[test]
    fn rejects_too_many_fields() {
        let extra: Vec<String> = (0..20).map(|i| format!(r#""f{i}":{i}"#)).collect();
        let raw = format!(r#"{{"actcode":"status",{}}}"#, extra.join(","));
        assert_eq!(
            reject(&raw),
            PayloadError::TooManyFields { count: 21, max: 20 }
        );
    }

    #[test]
    fn rejects_nested_values() {
        assert_eq!(
            reject(r#"{"actcode":"status","meta":{"a":1}}"#),
            PayloadError::Nested("meta".into())
        );
        assert_eq!(
            reject(r#"{"actcode":"status","list":[1,2]}"#),
            PayloadError::Nested("list".into())
        );
    }

    #[test]
    fn actcode_is_required_and_known() {
        assert_eq!(reject(r#"{"name":"ain"}"#), PayloadError::MissingActcode);
        assert_eq!(
            reject(r#"{"actcode":"reboot"}"#),
            PayloadError::UnknownActcode("reboot".into())
        );
        assert!(matches!(message(r#"{"actcode":"error","code":"E1"}"#), Message::Error(_)));
        assert!(matches!(message(r#"{"actcode":"status","online":true}"#), Message::Status(_)));
    }

    // ── live ────────────────────────────────────────────────────────

    #[test]
    fn live_value_rules() {
        assert_eq!(
            message(r#"{"actcode":"live","name":"ain","value":"Error"}"#),
            Message::Live(LiveReading {
                name: SensorName::Ain,
                value: LiveValue::ProbeFault,
                kind: None,
                channel: None,
            })
        );
        assert_eq!(
            reject(r#"{"actcode":"live","name":"ain","value":"warm"}"#),
            PayloadError::InvalidValue {
                name: "ain",
                value: "warm".into(),
                reason: "is not a number",
            }
        );

        assert!(parse(r#"{"actcode":"live","name":"din","value":"65000"}"#).is_ok());
        assert!(parse(r#"{"actcode":"live","name":"din","value":0}"#).is_ok());
        for bad in [r#""65001""#, r#""-1""#, r#""1.5""#] {
            let raw = format!(r#"{{"actcode":"live","name":"din","value":{bad}}}"#);
            assert!(
                matches!(reject(&raw), PayloadError::InvalidValue { name: "din", .. }),
                "{raw}"
            );
        }

        assert!(parse(r#"{"actcode":"live","name":"output","value":"1"}"#).is_ok());
        assert!(matches!(
            reject(r#"{"actcode":"live","name":"output","value":"2"}"#),
            PayloadError::InvalidValue { name: "output", .. }
        ));
        assert!(matches!(
            reject(r#"{"actcode":"live","name":"output","value":1}"#),
            PayloadError::InvalidValue { name: "output", .. }
        ));
    }

    #[test]
    fn integral_floats_count_as_integers() {
        let Message::Live(reading) = parse(r#"{"actcode":"live","name":"din","value":1.0}"#)
            .unwrap()
            .message
        else {
            panic!("expected live message");
        };
        assert_eq!(reading.value, LiveValue::Digital(1));

        assert!(matches!(
            reject(r#"{"actcode":"live","name":"din","value":1.5}"#),
            PayloadError::InvalidValue { name: "din", .. }
        ));

        let Message::Live(reading) =
            parse(r#"{"actcode":"live","name":"ain","value":"21.0","type":2.0}"#)
                .unwrap()
                .message
        else {
            panic!("expected live message");
        };
        assert_eq!(reading.kind, Some(2));
    }

    #[test]
    fn live_requires_name_and_value() {
        assert_eq!(
            reject(r#"{"actcode":"live","value":"1"}"#),
            PayloadError::MissingField {
                actcode: "live",
                field: "name",
            }
        );
        assert_eq!(
            reject(r#"{"actcode":"live","name":"ain"}"#),
            PayloadError::MissingField {
                actcode: "live",
                field: "value",
            }
        );
        assert_eq!(
            reject(r#"{"actcode":"live","name":"forcedef","value":"1"}"#),
            PayloadError::InvalidName {
                actcode: "live",
                name: "forcedef".into(),
            }
        );
    }

    #[test]
    fn live_type_and_channel() {
        let Message::Live(reading) =
            message(r#"{"actcode":"live","name":"output","value":"0","type":"1","ch":"2"}"#)
        else {
            panic!("expected live message");
        };
        assert_eq!(reading.kind, Some(1));
        assert_eq!(reading.channel, Some(2));

        let Message::Live(reading) =
            message(r#"{"actcode":"live","name":"output","value":"0","channel":99}"#)
        else {
            panic!("expected live message");
        };
        assert_eq!(reading.channel, Some(99));

        assert!(matches!(
            reject(r#"{"actcode":"live","name":"output","value":"0","type":0}"#),
            PayloadError::OutOfRange { .. }
        ));
        assert!(matches!(
            reject(r#"{"actcode":"live","name":"output","value":"0","ch":"100"}"#),
            PayloadError::OutOfRange { .. }
        ));
        assert!(matches!(
            reject(r#"{"actcode":"live","name":"output","value":"0","ch":"x"}"#),
            PayloadError::NotIntegral { .. }
        ));
    }

    // ── setres ──────────────────────────────────────────────────────

    fn setres(key: &str, value: &str) -> Result<Decoded, PayloadError> {
        parse(&format!(r#"{{"actcode":"setres","{key}":"{value}"}}"#))
    }

    #[test]
    fn every_parameter_range_boundary() {
        for spec in &PARAMS {
            let key = spec.id().to_string();
            let step = if spec.integral || (spec.min.fract() == 0.0 && spec.max.fract() == 0.0)
            {
                1.0
            } else {
                0.1
            };
            let below = format!("{:.1}", spec.min - step);
            let above = format!("{:.1}", spec.max + step);

            assert!(setres(&key, &spec.min.to_string()).is_ok(), "{key} min");
            assert!(setres(&key, &spec.max.to_string()).is_ok(), "{key} max");
            assert!(
                matches!(
                    setres(&key, &below),
                    Err(PayloadError::OutOfRange { key: ref k, .. }) if *k == key
                ),
                "{key} below {below}"
            );
            assert!(
                matches!(
                    setres(&key, &above),
                    Err(PayloadError::OutOfRange { key: ref k, .. }) if *k == key
                ),
                "{key} above {above}"
            );
        }
    }

    #[test]
    fn setres_partial_map() {
        let Message::SetRes(report) =
            message(r#"{"actcode":"setres","p01":"-35","p02":1.5,"p16":"1"}"#)
        else {
            panic!("expected setres message");
        };
        assert_eq!(report.params.len(), 3);
        assert_eq!(report.get(1), Some(-35.0));
        assert_eq!(report.get(2), Some(1.5));
        assert_eq!(report.get(3), None);
    }

    #[test]
    fn setres_names_offending_key() {
        assert_eq!(
            setres("p05", "soon").unwrap_err(),
            PayloadError::NotNumeric {
                key: "p05".into(),
                value: "soon".into(),
            }
        );
        assert_eq!(
            setres("p07", "1.5").unwrap_err(),
            PayloadError::NotIntegral {
                key: "p07".into(),
                value: "1.5".into(),
            }
        );
    }

    // ── actres / names ──────────────────────────────────────────────

    #[test]
    fn actres_names() {
        let Message::ActRes(report) =
            message(r#"{"actcode":"actres","name":"forcedef","value":"1"}"#)
        else {
            panic!("expected actres message");
        };
        assert_eq!(report.name, ActionName::ForceDefrost);
        assert_eq!(report.fields.get("value"), Some(&Value::from("1")));

        assert_eq!(
            reject(r#"{"actcode":"actres","name":"ain"}"#),
            PayloadError::InvalidName {
                actcode: "actres",
                name: "ain".into(),
            }
        );
    }

    #[test]
    fn global_name_allow_list() {
        assert_eq!(
            reject(r#"{"actcode":"status","name":"reboot"}"#),
            PayloadError::DisallowedName("reboot".into())
        );
        assert!(parse(r#"{"actcode":"status","name":"userId"}"#).is_ok());
    }

    // ── Arrays ──────────────────────────────────────────────────────

    #[test]
    fn array_first_valid_wins() {
        let decoded = parse(
            r#"[{"actcode":"live","name":"din","value":"-4"},
                {"actcode":"live","name":"ain","value":"4.5"},
                {"actcode":"live","name":"ain","value":"9.0"}]"#,
        )
        .unwrap();

        assert_eq!(
            decoded.message,
            Message::Live(LiveReading {
                name: SensorName::Ain,
                value: LiveValue::Analog(4.5),
                kind: None,
                channel: None,
            })
        );
        let diag = decoded.array.unwrap();
        assert_eq!((diag.total, diag.valid, diag.invalid), (3, 2, 1));
        assert_eq!(diag.selected, 1);
        assert_eq!(diag.rejected[0].index, 0);
    }

    #[test]
    fn array_bad_then_good() {
        let decoded = parse(r#"[{"actcode":"nope"},{"actcode":"status"}]"#).unwrap();
        let diag = decoded.array.unwrap();
        assert_eq!((diag.valid, diag.invalid), (1, 1));
        assert_eq!(
            diag.rejected[0].error,
            PayloadError::UnknownActcode("nope".into())
        );
    }

    #[test]
    fn array_limits() {
        assert_eq!(reject("[]"), PayloadError::EmptyArray);

        let items = vec![r#"{"actcode":"status"}"#; 101].join(",");
        assert_eq!(
            reject(&format!("[{items}]")),
            PayloadError::ArrayTooLarge { len: 101, max: 100 }
        );

        assert_eq!(
            reject(r#"[1, {"actcode":"bad"}]"#),
            PayloadError::NoValidElement {
                total: 2,
                first: Box::new(PayloadError::NotObject),
            }
        );
    }

    #[test]
    fn updates_flatten_messages() {
        let msg = message(r#"{"actcode":"setres","p01":"-35","p03":"120"}"#);
        assert_eq!(
            msg.updates(),
            vec![("p01".into(), "-35".into()), ("p03".into(), "120".into())]
        );
    }

    #[test]
    fn serializes_with_actcode_tag() {
        let msg = message(r#"{"actcode":"live","name":"output","value":"1","ch":3}"#);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"actcode":"live","name":"output","value":"1","ch":3})
        );
    }
}
