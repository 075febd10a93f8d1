//! # azlite-iot
//!
//! Topic and payload codecs for IoT services over the azlite MQTT runtime.
//!
//! Codecs translate typed operations into wire-level topics and back; they
//! hold no connection state and perform no I/O, so they compose with any
//! pipeline:
//!
//! - **Topic engine**: token replacement and inverse parsing over
//!   `/`-delimited format strings ([`topic`])
//! - **RPC**: server and client codecs for command request/response over
//!   publish/subscribe ([`rpc`])
//! - **Telemetry**: producer and consumer codecs ([`telemetry`])
//! - **IoT Hub**: telemetry and cloud-to-device topics with url-encoded
//!   message properties ([`hub`])
//! - **DPS**: registration request/response topics ([`provisioning`])
//! - **SAS**: shared-access-signature document and password builders;
//!   HMAC stays with the caller ([`sas`])

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod hub;
pub mod provisioning;
pub mod rpc;
pub mod sas;
pub mod telemetry;
pub mod topic;

// Re-export commonly used types at crate root
pub use hub::{IotHubClient, MessageProperties};
pub use provisioning::{ProvisioningClient, RegisterResponse};
pub use rpc::{RpcClientCodec, RpcRequestInfo, RpcResponseInfo, RpcServerCodec, RpcStatus};
pub use telemetry::{TelemetryConsumerCodec, TelemetryInfo, TelemetryProducerCodec};
pub use topic::{TopicMatches, TopicValues, build_topic, match_topic, required_topic_length};
