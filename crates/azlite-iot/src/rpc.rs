//! RPC request/response codecs over MQTT 5.
//!
//! Command-style RPC runs over a publish/subscribe pair: the client
//! publishes a request to the server's subscription topic and receives the
//! response on its own response topic; correlation data ties the two
//! together. These codecs only translate between typed operations and
//! topics/properties - the pipeline moves the bytes.

use bytes::Bytes;

use azlite_core::error::{Error, Result};
use azlite_mqtt::property::PropertyBag;

use crate::topic::{
    ANY_EXECUTOR, RPC_CLIENT_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT,
    RPC_SERVER_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT, TopicValues, build_topic, match_topic,
};

/// Default subscribe/publish timeout for RPC traffic, in milliseconds.
pub const RPC_DEFAULT_TIMEOUT_MSEC: i64 = 10_000;

/// Default QoS for RPC traffic (at least once).
pub const RPC_DEFAULT_QOS: u8 = 1;

/// MQTT 5 user property carrying the response status code.
pub const RPC_STATUS_PROPERTY_NAME: &[u8] = b"Status";

/// MQTT 5 user property carrying an optional status message.
pub const RPC_STATUS_MESSAGE_PROPERTY_NAME: &[u8] = b"StatusMessage";

/// Correlation id length in bytes.
pub const RPC_CORRELATION_ID_LENGTH: usize = 16;

/// RPC status codes carried in the `Status` response property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RpcStatus {
    /// Default, unset value.
    Unknown = 0,
    /// Success.
    Ok = 200,
    /// Accepted for asynchronous completion.
    Accepted = 202,
    /// Success with no payload.
    NoContent = 204,
    /// Malformed request.
    BadRequest = 400,
    /// Authentication failed.
    Unauthorized = 401,
    /// Authorization failed.
    Forbidden = 403,
    /// No such command.
    NotFound = 404,
    /// Command exists but may not be invoked.
    NotAllowed = 405,
    /// Request conflicts with executor state.
    Conflict = 409,
    /// Timed out on the server.
    Timeout = 504,
    /// Throttled.
    Throttled = 429,
    /// The invoking client closed before completion.
    ClientClosed = 499,
    /// Internal executor error.
    ServerError = 500,
}

/// True when `status` (a `Status` property value) indicates failure.
pub fn rpc_status_failed(status: i32) -> bool {
    !(200..300).contains(&status)
}

/// Appends the `Status` (and optional `StatusMessage`) user properties a
/// server attaches to its response PUBLISH.
pub fn write_status_properties(bag: &mut PropertyBag, status: i32, message: Option<&[u8]>) {
    bag.append_string(
        Bytes::from_static(RPC_STATUS_PROPERTY_NAME),
        Bytes::from(status.to_string()),
    );
    if let Some(message) = message {
        bag.append_string(
            Bytes::from_static(RPC_STATUS_MESSAGE_PROPERTY_NAME),
            Bytes::copy_from_slice(message),
        );
    }
}

/// Reads the `Status` property of a received response PUBLISH.
pub fn read_status_property(bag: &PropertyBag) -> Result<i32> {
    let value = bag
        .find(RPC_STATUS_PROPERTY_NAME)
        .ok_or(Error::ItemNotFound)?;
    let text = core::str::from_utf8(value).map_err(|_| Error::UnexpectedChar)?;
    text.parse::<i32>().map_err(|_| Error::UnexpectedChar)
}

/// Options for [`RpcServerCodec`].
#[derive(Debug, Clone)]
pub struct RpcServerCodecOptions {
    /// Topic format requests arrive on.
    pub subscription_topic_format: Bytes,
    /// Shared-subscription group; also widens the executor level to
    /// [`ANY_EXECUTOR`] so any group member may pick a request up.
    pub service_group: Option<Bytes>,
}

impl Default for RpcServerCodecOptions {
    fn default() -> Self {
        Self {
            subscription_topic_format: Bytes::from_static(
                RPC_SERVER_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT,
            ),
            service_group: None,
        }
    }
}

/// Bindings parsed from a received request topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcRequestInfo<'a> {
    /// The executor the request was addressed to (own id or `_any_`).
    pub executor_id: &'a [u8],
    /// The command name.
    pub command_name: &'a [u8],
}

/// Server-side codec: subscription topic and request-topic parsing.
#[derive(Debug, Clone)]
pub struct RpcServerCodec {
    service_id: Bytes,
    client_id: Bytes,
    options: RpcServerCodecOptions,
}

impl RpcServerCodec {
    /// Creates a codec for commands of `service_id` executed by
    /// `client_id`.
    pub fn new(service_id: Bytes, client_id: Bytes, options: RpcServerCodecOptions) -> Self {
        Self {
            service_id,
            client_id,
            options,
        }
    }

    /// Builds the subscription topic filter for incoming requests. The
    /// command level subscribes with the MQTT `+` wildcard.
    pub fn subscribe_topic(&self, dst: &mut [u8]) -> Result<usize> {
        let executor: &[u8] = if self.options.service_group.is_some() {
            ANY_EXECUTOR
        } else {
            &self.client_id
        };
        build_topic(
            dst,
            &self.options.subscription_topic_format,
            &TopicValues {
                service_id: Some(&self.service_id),
                executor_id: Some(executor),
                name: Some(b"+"),
                ..TopicValues::default()
            },
            self.options.service_group.as_deref(),
        )
    }

    /// Parses a received request topic, accepting requests addressed to
    /// this executor or to [`ANY_EXECUTOR`].
    pub fn parse_request_topic<'a>(&self, topic: &'a [u8]) -> Result<RpcRequestInfo<'a>> {
        let matches = match_topic(
            &self.options.subscription_topic_format,
            topic,
            &TopicValues {
                service_id: Some(&self.service_id),
                executor_id: Some(ANY_EXECUTOR),
                ..TopicValues::default()
            },
        )?;
        let executor_id = matches.executor_id.unwrap_or(ANY_EXECUTOR);
        if executor_id != self.client_id.as_ref() && executor_id != ANY_EXECUTOR {
            return Err(azlite_core::error::Error::IotTopicNoMatch);
        }
        Ok(RpcRequestInfo {
            executor_id,
            command_name: matches.name.unwrap_or_default(),
        })
    }
}

/// Options for [`RpcClientCodec`].
#[derive(Debug, Clone)]
pub struct RpcClientCodecOptions {
    /// Topic format responses arrive on.
    pub subscription_topic_format: Bytes,
    /// Topic format requests are published to (the server's subscription
    /// format).
    pub request_topic_format: Bytes,
}

impl Default for RpcClientCodecOptions {
    fn default() -> Self {
        Self {
            subscription_topic_format: Bytes::from_static(
                RPC_CLIENT_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT,
            ),
            request_topic_format: Bytes::from_static(RPC_SERVER_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT),
        }
    }
}

/// Bindings parsed from a received response topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcResponseInfo<'a> {
    /// The executor that produced the response.
    pub executor_id: &'a [u8],
    /// The command name the response answers.
    pub command_name: &'a [u8],
}

/// Client-side codec: response subscription, request topics and
/// response-topic parsing.
#[derive(Debug, Clone)]
pub struct RpcClientCodec {
    invoker_client_id: Bytes,
    service_id: Bytes,
    options: RpcClientCodecOptions,
}

impl RpcClientCodec {
    /// Creates a codec invoking commands of `service_id` as
    /// `invoker_client_id`.
    pub fn new(invoker_client_id: Bytes, service_id: Bytes, options: RpcClientCodecOptions) -> Self {
        Self {
            invoker_client_id,
            service_id,
            options,
        }
    }

    /// Builds the subscription topic filter for responses to this invoker.
    /// Executor and command levels subscribe with the MQTT `+` wildcard.
    pub fn subscribe_topic(&self, dst: &mut [u8]) -> Result<usize> {
        build_topic(
            dst,
            &self.options.subscription_topic_format,
            &TopicValues {
                invoker_client_id: Some(&self.invoker_client_id),
                service_id: Some(&self.service_id),
                executor_id: Some(b"+"),
                name: Some(b"+"),
                ..TopicValues::default()
            },
            None,
        )
    }

    /// Builds the request topic for invoking `command_name` on
    /// `executor_id` (use [`ANY_EXECUTOR`] to address any executor).
    pub fn request_topic(
        &self,
        dst: &mut [u8],
        executor_id: &[u8],
        command_name: &[u8],
    ) -> Result<usize> {
        build_topic(
            dst,
            &self.options.request_topic_format,
            &TopicValues {
                service_id: Some(&self.service_id),
                executor_id: Some(executor_id),
                name: Some(command_name),
                ..TopicValues::default()
            },
            None,
        )
    }

    /// Builds the response topic a server publishes back to, mirroring the
    /// client's subscription.
    pub fn response_topic(
        &self,
        dst: &mut [u8],
        executor_id: &[u8],
        command_name: &[u8],
    ) -> Result<usize> {
        build_topic(
            dst,
            &self.options.subscription_topic_format,
            &TopicValues {
                invoker_client_id: Some(&self.invoker_client_id),
                service_id: Some(&self.service_id),
                executor_id: Some(executor_id),
                name: Some(command_name),
                ..TopicValues::default()
            },
            None,
        )
    }

    /// Parses a received response topic addressed to this invoker.
    pub fn parse_response_topic<'a>(&self, topic: &'a [u8]) -> Result<RpcResponseInfo<'a>> {
        let matches = match_topic(
            &self.options.subscription_topic_format,
            topic,
            &TopicValues {
                invoker_client_id: Some(&self.invoker_client_id),
                service_id: Some(&self.service_id),
                ..TopicValues::default()
            },
        )?;
        Ok(RpcResponseInfo {
            executor_id: matches.executor_id.unwrap_or_default(),
            command_name: matches.name.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_failure_classification() {
        assert!(!rpc_status_failed(RpcStatus::Ok as i32));
        assert!(!rpc_status_failed(RpcStatus::NoContent as i32));
        assert!(rpc_status_failed(RpcStatus::BadRequest as i32));
        assert!(rpc_status_failed(RpcStatus::Unknown as i32));
        assert!(rpc_status_failed(RpcStatus::ServerError as i32));
    }

    #[test]
    fn status_properties_round_trip() {
        let mut bag = PropertyBag::new();
        write_status_properties(&mut bag, RpcStatus::Ok as i32, Some(b"done"));
        assert_eq!(read_status_property(&bag).unwrap(), 200);
        assert_eq!(
            bag.find(RPC_STATUS_MESSAGE_PROPERTY_NAME),
            Some(b"done".as_slice())
        );
        assert_eq!(
            read_status_property(&PropertyBag::new()),
            Err(Error::ItemNotFound)
        );
    }
}
