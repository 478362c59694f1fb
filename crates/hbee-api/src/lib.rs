// hbee-api: Wire-level codecs and broker transport for HBEE device messaging.

pub mod command;
pub mod error;
pub mod mqtt;
pub mod param;
pub mod payload;
pub mod probe;
pub mod topic;
pub mod transport;

pub use command::Command;
pub use error::{Error, PayloadError, TopicError};
pub use mqtt::MqttTransport;
pub use payload::{Decoded, Message};
pub use probe::{BackendProbe, BackendStatus, ReadinessProbe};
pub use topic::Topic;
pub use transport::{BrokerConfig, QoS, SessionId, Transport, TransportEvent, TransportSession};
