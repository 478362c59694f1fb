// hbee-core: Connection lifecycle, routing, and startup sync for HBEE clients.

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod handler;
pub mod page;
pub mod readiness;
pub mod router;
pub mod stats;
pub mod subscription;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{
    AccessPolicy, ClientConfig, HealthPolicy, ProbePolicy, ReconnectPolicy, SyncPolicy,
};
pub use connection::{Collaborators, ConnectionManager, ConnectionSnapshot, ConnectionState};
pub use error::CoreError;
pub use event::ClientEvent;
pub use handler::{AlwaysOnline, DeviceUpdateSink, Handler, NetworkMonitor, handler};
pub use page::{DeviceRef, PageClassifier, PageContext, PageInfo, page_topics};
pub use readiness::Readiness;
pub use router::{MessageRouter, RouteOutcome};
pub use stats::{RejectionCategory, ValidationStats};
pub use subscription::SubscriptionRegistry;
pub use sync::{StartupSynchronizer, SyncGuard, SyncRefusal, SyncReport, SyncTarget};
