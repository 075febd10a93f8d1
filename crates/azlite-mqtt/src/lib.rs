//! # azlite-mqtt
//!
//! Event-driven MQTT 5 runtime for the azlite SDK.
//!
//! This crate assembles the core event pipeline into an MQTT connection:
//!
//! - **Events**: [`MqttEvent`] - the full pipeline vocabulary, from
//!   lifecycle events to wire-level request/response pairs
//! - **Connection**: [`MqttConnection`] - a hierarchical state machine
//!   handling connect, exponential-backoff reconnect and disconnect
//! - **Adapter**: [`MqttClientPolicy`] - the terminal policy translating
//!   outbound events into calls on the host's [`MqttClient`]
//! - **Pending requests**: [`PendingRequests`] - bounded correlation-id /
//!   packet-id tracking for RPC-style exchanges
//! - **Properties**: [`PropertyBag`] - the MQTT 5 user-property abstraction
//!
//! A typical pipeline is `MqttConnection` (application side), optionally a
//! [`PolicyCollection`](azlite_core::collection::PolicyCollection) of RPC
//! subclients, then `MqttClientPolicy` (transport side). The concrete MQTT
//! stack stays outside, behind [`MqttClient`].

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod adapter;
pub mod connection;
pub mod event;
pub mod pending;
pub mod property;

// Re-export commonly used types at crate root
pub use adapter::{MqttClient, MqttClientPolicy};
pub use connection::{
    ConnectionState, ConnectionStateWatch, MqttConnection, MqttConnectionOptions,
};
pub use event::{
    ConnackData, ConnectData, DisconnectData, MqttEvent, PubData, PubRecvData, PubackData,
    SubData, SubackData,
};
pub use pending::{DEFAULT_PENDING_CAPACITY, PendingRequest, PendingRequests};
pub use property::{Property, PropertyBag};
