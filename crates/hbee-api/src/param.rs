//! Controller parameters `p01`..`p16` and the tenths encoding.
//!
//! Temperatures and deviations travel as integers counting tenths of a
//! unit: `-25` on the wire is `-2.5` on screen.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

// ── Parameter table ─────────────────────────────────────────────────

/// Accepted range and shape of one controller parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub index: u8,
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    /// Selector parameters only take whole numbers.
    pub integral: bool,
    /// Wire value counts tenths of the display unit.
    pub tenths: bool,
}

impl ParamSpec {
    const fn new(index: u8, label: &'static str, min: f64, max: f64) -> Self {
        Self {
            index,
            label,
            min,
            max,
            integral: false,
            tenths: false,
        }
    }

    const fn selector(self) -> Self {
        Self {
            integral: true,
            ..self
        }
    }

    const fn in_tenths(self) -> Self {
        Self {
            tenths: true,
            ..self
        }
    }

    pub fn id(&self) -> ParamId {
        ParamId(self.index)
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

pub const PARAMS: [ParamSpec; 16] = [
    ParamSpec::new(1, "set-point", -200.0, 850.0).in_tenths(),
    ParamSpec::new(2, "hysteresis", 0.1, 19.9),
    ParamSpec::new(3, "compressor delay", 0.0, 599.0),
    ParamSpec::new(4, "temperature correction", -10.0, 10.0),
    ParamSpec::new(5, "defrost interval", 0.0, 250.0),
    ParamSpec::new(6, "defrost duration", 0.0, 250.0),
    ParamSpec::new(7, "fan mode", 0.0, 3.0).selector(),
    ParamSpec::new(8, "fan delay after defrost", 0.0, 599.0),
    ParamSpec::new(9, "fan off delay", 0.0, 599.0),
    ParamSpec::new(10, "low temperature deviation", 0.0, 9.9),
    ParamSpec::new(11, "accumulated runtime defrost", 0.0, 1.0).selector(),
    ParamSpec::new(12, "probe type", 0.0, 2.0).selector(),
    ParamSpec::new(13, "manual override", 0.0, 1.0).selector(),
    ParamSpec::new(14, "station number", 1.0, 99.0).selector(),
    ParamSpec::new(15, "baud rate", 0.0, 4.0).selector(),
    ParamSpec::new(16, "cooler/heater mode", 0.0, 1.0).selector(),
];

// ── ParamId ─────────────────────────────────────────────────────────

/// Index of a controller parameter, `1..=16`, rendered as `p01`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamId(u8);

impl ParamId {
    pub fn new(index: u8) -> Option<Self> {
        (1..=16).contains(&index).then_some(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    pub fn spec(self) -> &'static ParamSpec {
        &PARAMS[usize::from(self.0 - 1)]
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{:02}", self.0)
    }
}

impl FromStr for ParamId {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('p')
            .filter(|digits| digits.len() == 2)
            .and_then(|digits| digits.parse::<u8>().ok())
            .and_then(Self::new)
            .ok_or_else(|| ParamError::UnknownParam(s.to_owned()))
    }
}

impl Serialize for ParamId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ── Tenths codec ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("'{0}' is not an integer tenths value")]
    NotTenths(String),

    #[error("'{0}' is not a number")]
    NotNumber(String),

    #[error("'{0}' is not a parameter name")]
    UnknownParam(String),
}

/// Decode a tenths integer into its one-decimal display form.
///
/// `235` → `"23.5"`, `-5` → `"-0.5"`, `0` → `"0.0"`.
pub fn decode_tenths(raw: &str) -> Result<String, ParamError> {
    let tenths: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ParamError::NotTenths(raw.to_owned()))?;
    let sign = if tenths < 0 { "-" } else { "" };
    let magnitude = tenths.unsigned_abs();
    Ok(format!("{sign}{}.{}", magnitude / 10, magnitude % 10))
}

/// Encode a display value into tenths, rounding to the nearest tenth.
pub fn encode_tenths(value: &str) -> Result<i64, ParamError> {
    let parsed: f64 = value
        .trim()
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| ParamError::NotNumber(value.to_owned()))?;
    let scaled = (parsed * 10.0).round();
    format!("{scaled:.0}")
        .parse::<i64>()
        .map_err(|_| ParamError::NotNumber(value.to_owned()))
}

/// Render a parameter's wire value for display, decoding tenths where
/// the parameter uses them.
pub fn display_value(id: ParamId, wire: f64) -> String {
    if id.spec().tenths {
        if let Ok(text) = decode_tenths(&format!("{wire:.0}")) {
            return text;
        }
    }
    wire.to_string()
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_formats_one_decimal() {
        assert_eq!(decode_tenths("235").unwrap(), "23.5");
        assert_eq!(decode_tenths("-200").unwrap(), "-20.0");
        assert_eq!(decode_tenths("-5").unwrap(), "-0.5");
        assert_eq!(decode_tenths("0").unwrap(), "0.0");
        assert_eq!(decode_tenths("850").unwrap(), "85.0");
    }

    #[test]
    fn encode_rounds_to_tenths() {
        assert_eq!(encode_tenths("23.5").unwrap(), 235);
        assert_eq!(encode_tenths("-0.5").unwrap(), -5);
        assert_eq!(encode_tenths("0.0").unwrap(), 0);
        assert_eq!(encode_tenths("-0.0").unwrap(), 0);
        assert_eq!(encode_tenths("1.25").unwrap(), 13);
    }

    #[test]
    fn decode_encode_inverse_over_setpoint_range() {
        for tenths in -200_i64..=850 {
            let shown = decode_tenths(&tenths.to_string()).unwrap();
            assert_eq!(encode_tenths(&shown).unwrap(), tenths, "via {shown}");
        }
    }

    #[test]
    fn rejects_non_numeric_input() {
        assert_eq!(
            decode_tenths("23.5"),
            Err(ParamError::NotTenths("23.5".into()))
        );
        assert_eq!(encode_tenths("warm"), Err(ParamError::NotNumber("warm".into())));
        assert_eq!(encode_tenths("NaN"), Err(ParamError::NotNumber("NaN".into())));
    }

    #[test]
    fn param_ids() {
        let id: ParamId = "p07".parse().unwrap();
        assert_eq!(id.index(), 7);
        assert_eq!(id.to_string(), "p07");
        assert!(id.spec().integral);
        assert!("p17".parse::<ParamId>().is_err());
        assert!("p7".parse::<ParamId>().is_err());
        assert!("q01".parse::<ParamId>().is_err());
    }

    #[test]
    fn table_is_ordered() {
        for (i, spec) in PARAMS.iter().enumerate() {
            assert_eq!(usize::from(spec.index), i + 1);
            assert!(spec.min <= spec.max);
        }
    }

    #[test]
    fn display_value_decodes_setpoint_only() {
        let p01 = ParamId::new(1).unwrap();
        let p03 = ParamId::new(3).unwrap();
        assert_eq!(display_value(p01, -35.0), "-3.5");
        assert_eq!(display_value(p03, 120.0), "120");
    }
}
