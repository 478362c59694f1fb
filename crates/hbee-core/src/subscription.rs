// ── Subscription registry ──
//
// The source of truth for what the client is subscribed to. It outlives
// broker sessions: every reconnect replays it in insertion order.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use hbee_api::topic::{filter_matches, is_wildcard_filter};

use crate::handler::Handler;

/// Longest filter accepted for subscription.
pub const MAX_FILTER_LEN: usize = 200;

#[derive(Clone)]
pub struct Subscription {
    pub topic: String,
    pub handler: Handler,
    pub registered_at: DateTime<Utc>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("registered_at", &self.registered_at)
            .finish_non_exhaustive()
    }
}

/// Ordered, de-duplicated set of subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: IndexMap<String, Subscription>,
    generation: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `topic`. Returns `true` if it was not present before; an
    /// existing entry keeps its position and only swaps its handler.
    pub fn subscribe(&mut self, topic: impl Into<String>, handler: Handler) -> bool {
        let topic = topic.into();
        self.generation += 1;
        if let Some(existing) = self.entries.get_mut(&topic) {
            existing.handler = handler;
            return false;
        }
        let entry = Subscription {
            topic: topic.clone(),
            handler,
            registered_at: Utc::now(),
        };
        self.entries.insert(topic, entry);
        true
    }

    pub fn unsubscribe(&mut self, topic: &str) -> bool {
        let removed = self.entries.shift_remove(topic).is_some();
        if removed {
            self.generation += 1;
        }
        removed
    }

    /// Every topic in insertion order, for replay after a reconnect.
    pub fn restore_all(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.generation += 1;
        }
        self.entries.clear();
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.entries.contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumped on every mutation. Lets a replay detect concurrent changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The subscription that should receive a message on `topic`.
    ///
    /// An exact entry wins. Otherwise the matching wildcard filter with the
    /// most literal levels wins, earliest registration breaking ties.
    pub fn best_match(&self, topic: &str) -> Option<&Subscription> {
        if let Some(exact) = self.entries.get(topic) {
            return Some(exact);
        }
        self.entries
            .values()
            .rev()
            .filter(|sub| is_wildcard_filter(&sub.topic) && filter_matches(&sub.topic, topic))
            .max_by_key(|sub| specificity(&sub.topic))
    }
}

fn specificity(filter: &str) -> (usize, bool) {
    let literal = filter
        .split('/')
        .filter(|level| *level != "+" && *level != "#")
        .count();
    (literal, !filter.ends_with('#'))
}

/// Check that `filter` is a well-formed subscription filter.
pub fn validate_filter(filter: &str) -> Result<(), String> {
    if filter.is_empty() {
        return Err("filter is empty".into());
    }
    if filter.len() > MAX_FILTER_LEN {
        return Err(format!(
            "filter is {} bytes, limit is {MAX_FILTER_LEN}",
            filter.len()
        ));
    }
    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        match *level {
            "+" => {}
            "#" if i + 1 == levels.len() => {}
            "#" => return Err("'#' must be the last level".into()),
            other if other.contains(['+', '#']) => {
                return Err(format!("wildcard inside level '{other}'"));
            }
            _ => {}
        }
    }
    Ok(())
}
