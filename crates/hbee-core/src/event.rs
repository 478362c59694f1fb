// ── Client lifecycle events ──

use hbee_api::{Message, Topic};

use crate::sync::SyncReport;

/// Broadcast on [`ConnectionManager::events`](crate::ConnectionManager::events).
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// First session after `connect()` is up and subscriptions are live.
    Connected,
    /// A lost session came back; `restored` subscriptions were re-issued.
    Reconnected { restored: usize },
    ConnectionLost { reason: String },
    /// Reconnection budget exhausted. The manager is now disconnected.
    GaveUp { attempts: u32 },
    /// A validated, authorized message was dispatched.
    MessageReceived { topic: Topic, message: Message },
    SyncCompleted(SyncReport),
    /// Backend readiness changed.
    BackendReady(bool),
}
