//! Running tally of inbound validation outcomes.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumIter, IntoEnumIterator};

use hbee_api::PayloadError;

/// Rejections kept for inspection.
pub const RECENT_REJECTIONS: usize = 50;
/// Characters of the raw input kept per rejection.
const SAMPLE_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectionCategory {
    InvalidTopic,
    InvalidJson,
    InvalidActcode,
    InvalidValue,
    SecurityThreat,
    Other,
}

impl From<&PayloadError> for RejectionCategory {
    fn from(err: &PayloadError) -> Self {
        match err {
            PayloadError::Blocked(_) => Self::SecurityThreat,
            PayloadError::Json(_)
            | PayloadError::NotObject
            | PayloadError::EmptyObject
            | PayloadError::TooManyFields { .. }
            | PayloadError::Nested(_)
            | PayloadError::EmptyArray
            | PayloadError::ArrayTooLarge { .. } => Self::InvalidJson,
            PayloadError::MissingActcode | PayloadError::UnknownActcode(_) => Self::InvalidActcode,
            PayloadError::MissingField { .. }
            | PayloadError::InvalidName { .. }
            | PayloadError::DisallowedName(_)
            | PayloadError::InvalidValue { .. }
            | PayloadError::NotNumeric { .. }
            | PayloadError::NotIntegral { .. }
            | PayloadError::OutOfRange { .. } => Self::InvalidValue,
            PayloadError::NoValidElement { first, .. } => Self::from(first.as_ref()),
            PayloadError::Empty | PayloadError::TooLarge { .. } => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub at: DateTime<Utc>,
    pub category: RejectionCategory,
    pub reason: String,
    /// Leading slice of the rejected input.
    pub sample: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationStats {
    pub total: u64,
    pub valid: u64,
    pub invalid: u64,
    pub by_category: BTreeMap<RejectionCategory, u64>,
    pub recent: VecDeque<Rejection>,
}

impl ValidationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_valid(&mut self) {
        self.total += 1;
        self.valid += 1;
    }

    pub fn record_rejection(&mut self, category: RejectionCategory, reason: &str, raw: &str) {
        self.total += 1;
        self.invalid += 1;
        *self.by_category.entry(category).or_default() += 1;

        if self.recent.len() == RECENT_REJECTIONS {
            self.recent.pop_front();
        }
        self.recent.push_back(Rejection {
            at: Utc::now(),
            category,
            reason: reason.to_owned(),
            sample: raw.chars().take(SAMPLE_CHARS).collect(),
        });
    }

    pub fn count(&self, category: RejectionCategory) -> u64 {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    /// Up to `n` categories with the most rejections, largest first.
    pub fn top_categories(&self, n: usize) -> Vec<(RejectionCategory, u64)> {
        let mut counts: Vec<_> = RejectionCategory::iter()
            .map(|c| (c, self.count(c)))
            .filter(|(_, count)| *count > 0)
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts.truncate(n);
        counts
    }

    /// Percentage of messages that passed, 0 when nothing was seen.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.valid as f64 * 100.0 / self.total as f64
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counts_and_rate() {
        let mut stats = ValidationStats::new();
        stats.record_valid();
        stats.record_valid();
        stats.record_valid();
        stats.record_rejection(RejectionCategory::InvalidJson, "malformed", "{");
        assert_eq!(stats.total, 4);
        assert_eq!(stats.invalid, 1);
        assert!((stats.success_rate() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ring_keeps_latest_fifty() {
        let mut stats = ValidationStats::new();
        for i in 0..60 {
            stats.record_rejection(RejectionCategory::Other, &format!("r{i}"), "x");
        }
        assert_eq!(stats.recent.len(), RECENT_REJECTIONS);
        assert_eq!(stats.recent.front().unwrap().reason, "r10");
        assert_eq!(stats.count(RejectionCategory::Other), 60);
    }

    #[test]
    fn sample_is_truncated() {
        let mut stats = ValidationStats::new();
        stats.record_rejection(RejectionCategory::InvalidValue, "big", &"z".repeat(500));
        assert_eq!(stats.recent[0].sample.len(), SAMPLE_CHARS);
    }

    #[test]
    fn top_categories_sorted() {
        let mut stats = ValidationStats::new();
        stats.record_rejection(RejectionCategory::InvalidTopic, "a", "");
        for _ in 0..3 {
            stats.record_rejection(RejectionCategory::SecurityThreat, "b", "");
        }
        assert_eq!(
            stats.top_categories(5),
            vec![
                (RejectionCategory::SecurityThreat, 3),
                (RejectionCategory::InvalidTopic, 1)
            ]
        );
        assert_eq!(stats.top_categories(1).len(), 1);
    }

    #[test]
    fn categories_follow_payload_errors() {
        assert_eq!(
            RejectionCategory::from(&PayloadError::Blocked("eval(".into())),
            RejectionCategory::SecurityThreat
        );
        assert_eq!(
            RejectionCategory::from(&PayloadError::UnknownActcode("x".into())),
            RejectionCategory::InvalidActcode
        );
        let nested = PayloadError::NoValidElement {
            total: 2,
            first: Box::new(PayloadError::NotNumeric {
                key: "p01".into(),
                value: "x".into(),
            }),
        };
        assert_eq!(RejectionCategory::from(&nested), RejectionCategory::InvalidValue);
    }

    #[test]
    fn reset_clears_everything() {
        let mut stats = ValidationStats::new();
        stats.record_rejection(RejectionCategory::Other, "r", "x");
        stats.reset();
        assert_eq!(stats.total, 0);
        assert!(stats.recent.is_empty());
    }
}
