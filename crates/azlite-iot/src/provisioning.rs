//! Device Provisioning Service (DPS) registration topics.
//!
//! Registration is a request/response exchange over fixed `$dps/` topics:
//! the device subscribes to `$dps/registrations/res/#`, publishes a
//! register (or operation-status poll) request carrying a request id, and
//! parses the response topic for the HTTP-style status and an optional
//! retry-after hint.

use bytes::Bytes;

use azlite_core::error::{Error, Result};
use azlite_core::span::SpanWriter;

/// Subscription filter for registration responses.
pub const REGISTER_SUBSCRIBE_TOPIC_FILTER: &[u8] = b"$dps/registrations/res/#";

/// DPS API version sent in the MQTT user name.
pub const PROVISIONING_SERVICE_API_VERSION: &[u8] = b"2019-03-31";

const REGISTER_PUBLISH_PREFIX: &[u8] = b"$dps/registrations/PUT/iotdps-register/?$rid=";
const QUERY_PUBLISH_PREFIX: &[u8] = b"$dps/registrations/GET/iotdps-get-operationstatus/?$rid=";
const RESPONSE_PREFIX: &[u8] = b"$dps/registrations/res/";
const RESPONSE_RID_KEY: &[u8] = b"/?$rid=";
const RETRY_AFTER_KEY: &[u8] = b"retry-after=";

/// A parsed registration response topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterResponse<'a> {
    /// HTTP-style status of the registration operation.
    pub status: u16,
    /// The request id echoed back by the service.
    pub request_id: &'a [u8],
    /// Service-provided polling delay in seconds, when throttled or
    /// still pending.
    pub retry_after_secs: Option<u32>,
}

/// DPS registration topic codec for one device.
#[derive(Debug, Clone)]
pub struct ProvisioningClient {
    id_scope: Bytes,
    registration_id: Bytes,
}

impl ProvisioningClient {
    /// Creates a codec for `registration_id` under `id_scope`.
    pub fn new(id_scope: Bytes, registration_id: Bytes) -> Self {
        Self {
            id_scope,
            registration_id,
        }
    }

    /// The fixed subscription filter for registration responses.
    pub fn register_subscribe_topic_filter(&self) -> &'static [u8] {
        REGISTER_SUBSCRIBE_TOPIC_FILTER
    }

    /// Builds the MQTT user name
    /// `<idScope>/registrations/<registrationId>/api-version=<version>`.
    pub fn user_name(&self, dst: &mut [u8]) -> Result<usize> {
        let mut writer = SpanWriter::new(dst);
        writer.copy_from(&self.id_scope)?;
        writer.copy_from(b"/registrations/")?;
        writer.copy_from(&self.registration_id)?;
        writer.copy_from(b"/api-version=")?;
        writer.copy_from(PROVISIONING_SERVICE_API_VERSION)?;
        Ok(writer.len())
    }

    /// Builds the register publish topic for `request_id`.
    pub fn register_publish_topic(&self, dst: &mut [u8], request_id: u32) -> Result<usize> {
        let mut writer = SpanWriter::new(dst);
        writer.copy_from(REGISTER_PUBLISH_PREFIX)?;
        writer.append_u32(request_id)?;
        Ok(writer.len())
    }

    /// Builds the operation-status poll topic for `request_id` and the
    /// `operation_id` returned by the initial register response.
    pub fn query_status_publish_topic(
        &self,
        dst: &mut [u8],
        request_id: u32,
        operation_id: &[u8],
    ) -> Result<usize> {
        let mut writer = SpanWriter::new(dst);
        writer.copy_from(QUERY_PUBLISH_PREFIX)?;
        writer.append_u32(request_id)?;
        writer.copy_from(b"&operationId=")?;
        writer.copy_from(operation_id)?;
        Ok(writer.len())
    }

    /// Parses a response topic
    /// `$dps/registrations/res/<status>/?$rid=<rid>[&retry-after=<secs>]`.
    pub fn parse_register_response_topic<'t>(
        &self,
        topic: &'t [u8],
    ) -> Result<RegisterResponse<'t>> {
        let rest = topic
            .strip_prefix(RESPONSE_PREFIX)
            .ok_or(Error::IotTopicNoMatch)?;

        let status_end = rest
            .iter()
            .position(|&b| b == b'/')
            .ok_or(Error::IotTopicNoMatch)?;
        let status = parse_u16(&rest[..status_end])?;

        let rest = &rest[status_end..];
        let rest = rest
            .strip_prefix(RESPONSE_RID_KEY)
            .ok_or(Error::IotTopicNoMatch)?;

        let (request_id, retry_after_secs) = match rest.iter().position(|&b| b == b'&') {
            Some(amp) => {
                let params = &rest[amp + 1..];
                let retry = params
                    .strip_prefix(RETRY_AFTER_KEY)
                    .map(parse_u32)
                    .transpose()?;
                (&rest[..amp], retry)
            }
            None => (rest, None),
        };
        if request_id.is_empty() {
            return Err(Error::IotTopicNoMatch);
        }

        Ok(RegisterResponse {
            status,
            request_id,
            retry_after_secs,
        })
    }
}

fn parse_u32(digits: &[u8]) -> Result<u32> {
    if digits.is_empty() {
        return Err(Error::UnexpectedEnd);
    }
    let mut value: u32 = 0;
    for &byte in digits {
        if !byte.is_ascii_digit() {
            return Err(Error::UnexpectedChar);
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u32::from(byte - b'0')))
            .ok_or(Error::InvalidArg)?;
    }
    Ok(value)
}

fn parse_u16(digits: &[u8]) -> Result<u16> {
    let value = parse_u32(digits)?;
    u16::try_from(value).map_err(|_| Error::InvalidArg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ProvisioningClient {
        ProvisioningClient::new(
            Bytes::from_static(b"0ne000FF"),
            Bytes::from_static(b"my-device"),
        )
    }

    #[test]
    fn subscribe_filter_is_fixed() {
        assert_eq!(
            client().register_subscribe_topic_filter(),
            b"$dps/registrations/res/#"
        );
    }

    #[test]
    fn user_name_carries_scope_registration_and_api_version() {
        let mut buf = [0u8; 128];
        let len = client().user_name(&mut buf).unwrap();
        assert_eq!(
            &buf[..len],
            b"0ne000FF/registrations/my-device/api-version=2019-03-31".as_slice()
        );
    }

    #[test]
    fn register_and_query_topics() {
        let mut buf = [0u8; 128];
        let len = client().register_publish_topic(&mut buf, 1).unwrap();
        assert_eq!(
            &buf[..len],
            b"$dps/registrations/PUT/iotdps-register/?$rid=1".as_slice()
        );

        let len = client()
            .query_status_publish_topic(&mut buf, 2, b"op-123")
            .unwrap();
        assert_eq!(
            &buf[..len],
            b"$dps/registrations/GET/iotdps-get-operationstatus/?$rid=2&operationId=op-123"
                .as_slice()
        );
    }

    #[test]
    fn response_topic_parsing() {
        let response = client()
            .parse_register_response_topic(b"$dps/registrations/res/202/?$rid=1&retry-after=3")
            .unwrap();
        assert_eq!(response.status, 202);
        assert_eq!(response.request_id, b"1");
        assert_eq!(response.retry_after_secs, Some(3));

        let response = client()
            .parse_register_response_topic(b"$dps/registrations/res/200/?$rid=42")
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.retry_after_secs, None);

        assert_eq!(
            client().parse_register_response_topic(b"$iothub/twin/res/200"),
            Err(Error::IotTopicNoMatch)
        );
    }
}
