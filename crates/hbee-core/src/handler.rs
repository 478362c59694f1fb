//! Capabilities the embedding application hands to the client.
//!
//! The core never looks for ambient hooks; anything it calls back into is
//! registered here explicitly.

use std::sync::Arc;

use hbee_api::{Message, Topic};

/// Callback attached to a subscription.
pub type Handler = Arc<dyn Fn(&Topic, &Message) + Send + Sync>;

/// Receives flattened `(device_id, field, value)` updates for every routed
/// message.
pub trait DeviceUpdateSink: Send + Sync {
    fn apply(&self, device_id: &str, field: &str, value: &str);
}

/// Reports whether the host currently has network connectivity.
pub trait NetworkMonitor: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Default monitor for hosts without a connectivity signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl NetworkMonitor for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Build a [`Handler`] from a closure.
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Topic, &Message) + Send + Sync + 'static,
{
    Arc::new(f)
}
