//! IoT Hub device topics.
//!
//! The hub's MQTT surface is fixed: devices publish telemetry to
//! `devices/<id>/messages/events/` (optionally followed by url-encoded
//! message properties) and receive cloud-to-device messages on
//! `devices/<id>/messages/devicebound/#`.

use bytes::Bytes;

use azlite_core::error::{Error, Result};
use azlite_core::span::SpanWriter;

/// System property key for the payload content type.
pub const PROPERTY_CONTENT_TYPE: &[u8] = b"$.ct";

/// System property key for the payload content encoding.
pub const PROPERTY_CONTENT_ENCODING: &[u8] = b"$.ce";

const TELEMETRY_PREFIX: &[u8] = b"devices/";
const TELEMETRY_SUFFIX: &[u8] = b"/messages/events/";
const C2D_SUFFIX: &[u8] = b"/messages/devicebound/";

/// Url-encoded `name=value` pairs appended to a telemetry topic.
///
/// Build order is significant and preserved: content type first, content
/// encoding second, user properties last.
#[derive(Debug)]
pub struct MessageProperties<'a> {
    writer: SpanWriter<'a>,
}

impl<'a> MessageProperties<'a> {
    /// Starts an empty property string in `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            writer: SpanWriter::new(buf),
        }
    }

    /// Appends one url-encoded `name=value` pair.
    pub fn add(&mut self, name: &[u8], value: &[u8]) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArg);
        }
        if !self.writer.is_empty() {
            self.writer.push_byte(b'&')?;
        }
        self.writer.url_encode(name)?;
        self.writer.push_byte(b'=')?;
        self.writer.url_encode(value)?;
        Ok(())
    }

    /// Shorthand for the `$.ct` system property.
    pub fn content_type(&mut self, value: &[u8]) -> Result<()> {
        self.add(PROPERTY_CONTENT_TYPE, value)
    }

    /// Shorthand for the `$.ce` system property.
    pub fn content_encoding(&mut self, value: &[u8]) -> Result<()> {
        self.add(PROPERTY_CONTENT_ENCODING, value)
    }

    /// The encoded property string.
    pub fn as_bytes(&self) -> &[u8] {
        self.writer.as_bytes()
    }
}

/// An IoT Hub device client's topic codec.
#[derive(Debug, Clone)]
pub struct IotHubClient {
    device_id: Bytes,
}

impl IotHubClient {
    /// Creates a codec for `device_id`.
    pub fn new(device_id: Bytes) -> Self {
        Self { device_id }
    }

    /// Builds the telemetry publish topic
    /// `devices/<id>/messages/events/<properties>`.
    pub fn telemetry_publish_topic(
        &self,
        dst: &mut [u8],
        properties: Option<&MessageProperties<'_>>,
    ) -> Result<usize> {
        let mut writer = SpanWriter::new(dst);
        writer.copy_from(TELEMETRY_PREFIX)?;
        writer.copy_from(&self.device_id)?;
        writer.copy_from(TELEMETRY_SUFFIX)?;
        if let Some(properties) = properties {
            writer.copy_from(properties.as_bytes())?;
        }
        Ok(writer.len())
    }

    /// Builds the cloud-to-device subscription filter
    /// `devices/<id>/messages/devicebound/#`.
    pub fn c2d_subscribe_topic_filter(&self, dst: &mut [u8]) -> Result<usize> {
        let mut writer = SpanWriter::new(dst);
        writer.copy_from(TELEMETRY_PREFIX)?;
        writer.copy_from(&self.device_id)?;
        writer.copy_from(C2D_SUFFIX)?;
        writer.push_byte(b'#')?;
        Ok(writer.len())
    }

    /// Parses a received cloud-to-device topic, returning the trailing
    /// url-encoded property string (possibly empty).
    pub fn parse_c2d_topic<'t>(&self, topic: &'t [u8]) -> Result<&'t [u8]> {
        let rest = topic
            .strip_prefix(TELEMETRY_PREFIX)
            .ok_or(Error::IotTopicNoMatch)?;
        let rest = rest
            .strip_prefix(self.device_id.as_ref())
            .ok_or(Error::IotTopicNoMatch)?;
        rest.strip_prefix(C2D_SUFFIX).ok_or(Error::IotTopicNoMatch)
    }
}
