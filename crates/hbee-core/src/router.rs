//! Inbound message pipeline: validate, authorize, dispatch.
//!
//! Routing never fails outward. Bad topics and bodies are counted and
//! logged, foreign traffic is dropped quietly, and a panicking handler
//! is contained so the next message still gets through.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use hbee_api::payload::{self, Decoded};
use hbee_api::{Message, PayloadError, Topic};

use crate::config::AccessPolicy;
use crate::event::ClientEvent;
use crate::handler::{DeviceUpdateSink, Handler};
use crate::stats::{RejectionCategory, ValidationStats};

/// Why an otherwise valid message was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Outbound suffix (`SER`/`CMD`) echoed back by the broker.
    NotInbound,
    /// Owner is neither the user nor a permitted id.
    ForeignOwner,
    /// Device is outside the known-device set.
    UnknownDevice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Dispatched; `handled` is false when no subscription matched.
    Dispatched { handled: bool },
    Dropped(DropReason),
}

/// An inbound message that failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub category: RejectionCategory,
    pub reason: String,
}

pub struct MessageRouter {
    access: AccessPolicy,
    stats: Mutex<ValidationStats>,
    sink: Option<Arc<dyn DeviceUpdateSink>>,
    events: broadcast::Sender<ClientEvent>,
}

impl MessageRouter {
    pub fn new(
        access: AccessPolicy,
        sink: Option<Arc<dyn DeviceUpdateSink>>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            access,
            stats: Mutex::new(ValidationStats::new()),
            sink,
            events,
        }
    }

    pub fn access(&self) -> &AccessPolicy {
        &self.access
    }

    /// Copy of the validation counters.
    pub fn stats(&self) -> ValidationStats {
        self.lock_stats().clone()
    }

    pub fn reset_stats(&self) {
        self.lock_stats().reset();
    }

    fn lock_stats(&self) -> MutexGuard<'_, ValidationStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Validation ───────────────────────────────────────────────────

    /// Parse a raw topic and body, recording the outcome.
    pub fn ingest(
        &self,
        raw_topic: &str,
        raw_payload: &[u8],
    ) -> Result<(Topic, Decoded), Rejected> {
        let topic = match Topic::parse(raw_topic) {
            Ok(topic) => topic,
            Err(e) => {
                warn!(topic = raw_topic, reason = %e, "dropping message with invalid topic");
                return Err(self.reject(RejectionCategory::InvalidTopic, e.to_string(), raw_topic));
            }
        };

        let Ok(body) = std::str::from_utf8(raw_payload) else {
            warn!(topic = raw_topic, "dropping message with non-UTF-8 payload");
            return Err(self.reject(
                RejectionCategory::InvalidJson,
                "payload is not valid UTF-8".into(),
                &String::from_utf8_lossy(raw_payload),
            ));
        };

        match payload::parse(body) {
            Ok(decoded) => {
                self.lock_stats().record_valid();
                Ok((topic, decoded))
            }
            Err(e) => {
                let category = RejectionCategory::from(&e);
                if is_structural(&e) {
                    warn!(topic = raw_topic, %category, reason = %e, "dropping invalid payload");
                } else {
                    info!(topic = raw_topic, %category, reason = %e, "dropping invalid payload");
                }
                Err(self.reject(category, e.to_string(), body))
            }
        }
    }

    fn reject(&self, category: RejectionCategory, reason: String, raw: &str) -> Rejected {
        self.lock_stats().record_rejection(category, &reason, raw);
        Rejected { category, reason }
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Authorize and dispatch one validated message to `handler`, the
    /// update sink, and the event stream.
    pub fn route(
        &self,
        topic: &Topic,
        message: &Message,
        handler: Option<Handler>,
    ) -> RouteOutcome {
        if let Some(reason) = self.drop_reason(topic) {
            debug!(%topic, ?reason, "message not dispatched");
            return RouteOutcome::Dropped(reason);
        }

        let handled = handler.is_some();
        if let Some(handler) = handler {
            contain(topic, "subscription handler", || handler(topic, message));
        }

        if let Some(sink) = &self.sink {
            for (field, value) in message.updates() {
                contain(topic, "update sink", || {
                    sink.apply(topic.device_id(), &field, &value);
                });
            }
        }

        // No receivers is fine.
        let _ = self.events.send(ClientEvent::MessageReceived {
            topic: topic.clone(),
            message: message.clone(),
        });

        RouteOutcome::Dispatched { handled }
    }

    fn drop_reason(&self, topic: &Topic) -> Option<DropReason> {
        if !topic.suffix().is_inbound() {
            Some(DropReason::NotInbound)
        } else if !self.access.permits_owner(topic.user_id()) {
            Some(DropReason::ForeignOwner)
        } else if !self.access.permits_device(topic.device_id()) {
            Some(DropReason::UnknownDevice)
        } else {
            None
        }
    }
}

/// Syntax-level failures log at `warn`; semantic ones at `info`.
fn is_structural(err: &PayloadError) -> bool {
    matches!(
        RejectionCategory::from(err),
        RejectionCategory::InvalidJson | RejectionCategory::SecurityThreat
    ) && !matches!(err, PayloadError::NoValidElement { .. })
}

fn contain(topic: &Topic, what: &str, f: impl FnOnce()) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(f)) {
        warn!(%topic, panic = panic_message(&*panic), "{what} panicked; continuing");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
