//! Telemetry producer/consumer codecs.
//!
//! Telemetry is fire-and-forget publish/subscribe: a producer publishes to
//! `services/{modelId}/{senderId}/telemetry` (by default) and any consumer
//! subscribed to the matching filter receives it.

use bytes::Bytes;

use azlite_core::error::Result;

use crate::topic::{
    TELEMETRY_CONSUMER_DEFAULT_TOPIC_FORMAT, TELEMETRY_PRODUCER_DEFAULT_TOPIC_FORMAT, TopicValues,
    build_topic, match_topic,
};

/// Default telemetry publish/subscribe timeout, in milliseconds.
pub const TELEMETRY_DEFAULT_TIMEOUT_MSEC: i64 = 10_000;

/// Options for [`TelemetryProducerCodec`].
#[derive(Debug, Clone)]
pub struct TelemetryProducerCodecOptions {
    /// Topic format telemetry is published to. May use `{modelId}`,
    /// `{senderId}` and `{name}`.
    pub telemetry_topic_format: Bytes,
}

impl Default for TelemetryProducerCodecOptions {
    fn default() -> Self {
        Self {
            telemetry_topic_format: Bytes::from_static(TELEMETRY_PRODUCER_DEFAULT_TOPIC_FORMAT),
        }
    }
}

/// Producer-side codec: builds publish topics.
#[derive(Debug, Clone)]
pub struct TelemetryProducerCodec {
    model_id: Bytes,
    client_id: Bytes,
    options: TelemetryProducerCodecOptions,
}

impl TelemetryProducerCodec {
    /// Creates a producer codec sending as `client_id` for `model_id`.
    pub fn new(model_id: Bytes, client_id: Bytes, options: TelemetryProducerCodecOptions) -> Self {
        Self {
            model_id,
            client_id,
            options,
        }
    }

    /// Builds the publish topic; `telemetry_name` fills `{name}` when the
    /// format uses it.
    pub fn publish_topic(&self, dst: &mut [u8], telemetry_name: Option<&[u8]>) -> Result<usize> {
        build_topic(
            dst,
            &self.options.telemetry_topic_format,
            &TopicValues {
                model_id: Some(&self.model_id),
                sender_id: Some(&self.client_id),
                name: telemetry_name,
                ..TopicValues::default()
            },
            None,
        )
    }
}

/// Options for [`TelemetryConsumerCodec`].
#[derive(Debug, Clone)]
pub struct TelemetryConsumerCodecOptions {
    /// Topic format telemetry arrives on. May use `{serviceId}` and
    /// `{senderId}`.
    pub telemetry_topic_format: Bytes,
    /// Shared-subscription group for load-balanced consumption.
    pub service_group: Option<Bytes>,
}

impl Default for TelemetryConsumerCodecOptions {
    fn default() -> Self {
        Self {
            telemetry_topic_format: Bytes::from_static(TELEMETRY_CONSUMER_DEFAULT_TOPIC_FORMAT),
            service_group: None,
        }
    }
}

/// Bindings parsed from a received telemetry topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryInfo<'a> {
    /// The sending client's id.
    pub sender_id: &'a [u8],
}

/// Consumer-side codec: subscription filter and received-topic parsing.
#[derive(Debug, Clone)]
pub struct TelemetryConsumerCodec {
    service_id: Bytes,
    options: TelemetryConsumerCodecOptions,
}

impl TelemetryConsumerCodec {
    /// Creates a consumer codec for telemetry of `service_id`.
    pub fn new(service_id: Bytes, options: TelemetryConsumerCodecOptions) -> Self {
        Self {
            service_id,
            options,
        }
    }

    /// Builds the subscription topic filter; the sender level subscribes
    /// with the MQTT `+` wildcard.
    pub fn subscribe_topic(&self, dst: &mut [u8]) -> Result<usize> {
        build_topic(
            dst,
            &self.options.telemetry_topic_format,
            &TopicValues {
                service_id: Some(&self.service_id),
                sender_id: Some(b"+"),
                ..TopicValues::default()
            },
            self.options.service_group.as_deref(),
        )
    }

    /// Parses a received telemetry topic for this service.
    pub fn parse_received_topic<'a>(&self, topic: &'a [u8]) -> Result<TelemetryInfo<'a>> {
        let matches = match_topic(
            &self.options.telemetry_topic_format,
            topic,
            &TopicValues {
                service_id: Some(&self.service_id),
                ..TopicValues::default()
            },
        )?;
        Ok(TelemetryInfo {
            sender_id: matches.sender_id.unwrap_or_default(),
        })
    }
}
