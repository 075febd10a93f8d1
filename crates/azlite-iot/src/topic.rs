//! Topic token replacement and inverse parsing.
//!
//! Topic formats are plain strings carrying zero or more tokens
//! (`{serviceId}`, `{executorId}`, `{invokerClientId}`, `{name}`,
//! `{senderId}`, `{modelId}`), each of which must occupy a whole topic level:
//! wholly surrounded by `/` or sitting at a string boundary. Building a topic
//! is a serial copy into a caller buffer with every token replaced;
//! the inverse walks a received topic and the format in lockstep, binding
//! tokens to slices of the received topic.

use azlite_core::error::{Error, Result};
use azlite_core::span::SpanWriter;

/// Default topic format an RPC server subscribes to for incoming requests.
pub const RPC_SERVER_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT: &[u8] =
    b"services/{serviceId}/{executorId}/command/{name}/request";

/// Default topic format an RPC client subscribes to for responses.
pub const RPC_CLIENT_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT: &[u8] =
    b"clients/{invokerClientId}/services/{serviceId}/{executorId}/command/{name}/response";

/// Default topic format telemetry consumers subscribe to.
pub const TELEMETRY_CONSUMER_DEFAULT_TOPIC_FORMAT: &[u8] =
    b"services/{serviceId}/{senderId}/telemetry";

/// Default topic format telemetry producers publish to.
pub const TELEMETRY_PRODUCER_DEFAULT_TOPIC_FORMAT: &[u8] =
    b"services/{modelId}/{senderId}/telemetry";

/// Shared-subscription prefix: `$share/<group>/<topic>`.
pub const SERVICE_GROUP_PREFIX: &[u8] = b"$share/";

/// Executor wildcard: a request addressed to any executor.
pub const ANY_EXECUTOR: &[u8] = b"_any_";

/// Safe upper bound for built topics.
pub const MAX_TOPIC_LENGTH: usize = 4096;

const TOKEN_SERVICE_ID: &[u8] = b"{serviceId}";
const TOKEN_EXECUTOR_ID: &[u8] = b"{executorId}";
const TOKEN_INVOKER_CLIENT_ID: &[u8] = b"{invokerClientId}";
const TOKEN_NAME: &[u8] = b"{name}";
const TOKEN_SENDER_ID: &[u8] = b"{senderId}";
const TOKEN_MODEL_ID: &[u8] = b"{modelId}";

/// Values substituted into (or expected from) a topic format.
///
/// When building, a token present in the format must have its value set.
/// When matching, a set value constrains the received topic (the special
/// [`ANY_EXECUTOR`] value matches anything) and an unset value binds freely.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicValues<'a> {
    /// `{serviceId}`
    pub service_id: Option<&'a [u8]>,
    /// `{executorId}`
    pub executor_id: Option<&'a [u8]>,
    /// `{invokerClientId}`
    pub invoker_client_id: Option<&'a [u8]>,
    /// `{name}`
    pub name: Option<&'a [u8]>,
    /// `{senderId}`
    pub sender_id: Option<&'a [u8]>,
    /// `{modelId}`
    pub model_id: Option<&'a [u8]>,
}

/// Token bindings produced by [`match_topic`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicMatches<'a> {
    /// Binding of `{serviceId}`.
    pub service_id: Option<&'a [u8]>,
    /// Binding of `{executorId}`.
    pub executor_id: Option<&'a [u8]>,
    /// Binding of `{invokerClientId}`.
    pub invoker_client_id: Option<&'a [u8]>,
    /// Binding of `{name}`.
    pub name: Option<&'a [u8]>,
    /// Binding of `{senderId}`.
    pub sender_id: Option<&'a [u8]>,
    /// Binding of `{modelId}`.
    pub model_id: Option<&'a [u8]>,
}

fn is_known_token(token: &[u8]) -> bool {
    matches!(
        token,
        t if t == TOKEN_SERVICE_ID
            || t == TOKEN_EXECUTOR_ID
            || t == TOKEN_INVOKER_CLIENT_ID
            || t == TOKEN_NAME
            || t == TOKEN_SENDER_ID
            || t == TOKEN_MODEL_ID
    )
}

/// Checks that every token occupies a whole topic level and no stray braces
/// exist.
pub fn validate_topic_format(format: &[u8]) -> Result<()> {
    let mut index = 0;
    while index < format.len() {
        match format[index] {
            b'{' => {
                let close = format[index..]
                    .iter()
                    .position(|&b| b == b'}')
                    .map(|p| index + p)
                    .ok_or(Error::InvalidArg)?;
                let token = &format[index..=close];
                if !is_known_token(token) {
                    return Err(Error::InvalidArg);
                }
                let left_ok = index == 0 || format[index - 1] == b'/';
                let right_ok = close + 1 == format.len() || format[close + 1] == b'/';
                if !left_ok || !right_ok {
                    return Err(Error::InvalidArg);
                }
                index = close + 1;
            }
            b'}' => return Err(Error::InvalidArg),
            _ => index += 1,
        }
    }
    Ok(())
}

fn token_value<'a>(token: &[u8], values: &TopicValues<'a>) -> Result<&'a [u8]> {
    let value = match token {
        t if t == TOKEN_SERVICE_ID => values.service_id,
        t if t == TOKEN_EXECUTOR_ID => values.executor_id,
        t if t == TOKEN_INVOKER_CLIENT_ID => values.invoker_client_id,
        t if t == TOKEN_NAME => values.name,
        t if t == TOKEN_SENDER_ID => values.sender_id,
        t if t == TOKEN_MODEL_ID => values.model_id,
        _ => None,
    };
    value.ok_or(Error::InvalidArg)
}

/// The exact byte length [`build_topic`] would produce, so callers can size
/// buffers.
pub fn required_topic_length(
    format: &[u8],
    values: &TopicValues<'_>,
    service_group: Option<&[u8]>,
) -> Result<usize> {
    validate_topic_format(format)?;
    let mut length = match service_group {
        Some(group) => SERVICE_GROUP_PREFIX.len() + group.len() + 1,
        None => 0,
    };
    let mut index = 0;
    while index < format.len() {
        if format[index] == b'{' {
            let close = format[index..]
                .iter()
                .position(|&b| b == b'}')
                .map(|p| index + p)
                .ok_or(Error::InvalidArg)?;
            length += token_value(&format[index..=close], values)?.len();
            index = close + 1;
        } else {
            length += 1;
            index += 1;
        }
    }
    Ok(length)
}

/// Builds a topic by serial copy into `dst`, replacing every token and
/// prepending `$share/<group>/` when a service group is supplied. Returns
/// the written length; overflow yields [`Error::InsufficientSpanSize`]
/// without partial output.
pub fn build_topic(
    dst: &mut [u8],
    format: &[u8],
    values: &TopicValues<'_>,
    service_group: Option<&[u8]>,
) -> Result<usize> {
    let required = required_topic_length(format, values, service_group)?;
    if required > MAX_TOPIC_LENGTH {
        return Err(Error::InvalidArg);
    }
    if required > dst.len() {
        return Err(Error::InsufficientSpanSize);
    }

    let mut writer = SpanWriter::new(dst);
    if let Some(group) = service_group {
        writer.copy_from(SERVICE_GROUP_PREFIX)?;
        writer.copy_from(group)?;
        writer.push_byte(b'/')?;
    }
    let mut index = 0;
    while index < format.len() {
        if format[index] == b'{' {
            let close = format[index..]
                .iter()
                .position(|&b| b == b'}')
                .map(|p| index + p)
                .ok_or(Error::InvalidArg)?;
            writer.copy_from(token_value(&format[index..=close], values)?)?;
            index = close + 1;
        } else {
            writer.push_byte(format[index])?;
            index += 1;
        }
    }
    debug_assert_eq!(writer.len(), required);
    Ok(writer.len())
}

fn check_or_bind<'a>(
    token: &[u8],
    segment: &'a [u8],
    expected: &TopicValues<'_>,
    out: &mut TopicMatches<'a>,
) -> Result<()> {
    let (constraint, slot) = match token {
        t if t == TOKEN_SERVICE_ID => (expected.service_id, &mut out.service_id),
        t if t == TOKEN_EXECUTOR_ID => (expected.executor_id, &mut out.executor_id),
        t if t == TOKEN_INVOKER_CLIENT_ID => {
            (expected.invoker_client_id, &mut out.invoker_client_id)
        }
        t if t == TOKEN_NAME => (expected.name, &mut out.name),
        t if t == TOKEN_SENDER_ID => (expected.sender_id, &mut out.sender_id),
        t if t == TOKEN_MODEL_ID => (expected.model_id, &mut out.model_id),
        _ => return Err(Error::InvalidArg),
    };
    if let Some(value) = constraint
        && value != ANY_EXECUTOR
        && value != segment
    {
        return Err(Error::IotTopicNoMatch);
    }
    *slot = Some(segment);
    Ok(())
}

/// Walks `received` and `format` in lockstep, binding each token to the
/// matching topic level. Constrained tokens (set in `expected`) must equal
/// the received level, except the [`ANY_EXECUTOR`] wildcard. A mismatch
/// yields [`Error::IotTopicNoMatch`] and no bindings.
pub fn match_topic<'a>(
    format: &[u8],
    received: &'a [u8],
    expected: &TopicValues<'_>,
) -> Result<TopicMatches<'a>> {
    validate_topic_format(format)?;
    let mut out = TopicMatches::default();
    let mut fi = 0;
    let mut ri = 0;
    while fi < format.len() {
        if format[fi] == b'{' {
            let close = format[fi..]
                .iter()
                .position(|&b| b == b'}')
                .map(|p| fi + p)
                .ok_or(Error::InvalidArg)?;
            let level_end = received[ri..]
                .iter()
                .position(|&b| b == b'/')
                .map_or(received.len(), |p| ri + p);
            let segment = &received[ri..level_end];
            if segment.is_empty() {
                return Err(Error::IotTopicNoMatch);
            }
            check_or_bind(&format[fi..=close], segment, expected, &mut out)?;
            ri = level_end;
            fi = close + 1;
        } else {
            if ri >= received.len() || received[ri] != format[fi] {
                return Err(Error::IotTopicNoMatch);
            }
            fi += 1;
            ri += 1;
        }
    }
    if ri != received.len() {
        return Err(Error::IotTopicNoMatch);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_validation_requires_whole_levels() {
        validate_topic_format(RPC_SERVER_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT).unwrap();
        validate_topic_format(RPC_CLIENT_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT).unwrap();
        validate_topic_format(b"plain/topic/no/tokens").unwrap();

        // Partial-token occurrences are rejected.
        assert!(validate_topic_format(b"services/x{serviceId}/cmd").is_err());
        assert!(validate_topic_format(b"services/{serviceId}x/cmd").is_err());
        assert!(validate_topic_format(b"services/{unknownToken}/cmd").is_err());
        assert!(validate_topic_format(b"services/{serviceId").is_err());
        assert!(validate_topic_format(b"services/}bad").is_err());
    }

    #[test]
    fn build_reports_required_length_and_overflow() {
        let values = TopicValues {
            service_id: Some(b"svc"),
            executor_id: Some(b"exec"),
            name: Some(b"unlock"),
            ..TopicValues::default()
        };
        let required = required_topic_length(
            RPC_SERVER_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT,
            &values,
            None,
        )
        .unwrap();
        assert_eq!(required, b"services/svc/exec/command/unlock/request".len());

        let mut small = [0u8; 8];
        assert_eq!(
            build_topic(
                &mut small,
                RPC_SERVER_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT,
                &values,
                None
            ),
            Err(Error::InsufficientSpanSize)
        );
    }

    #[test]
    fn missing_token_values_are_invalid() {
        let mut buf = [0u8; 128];
        let values = TopicValues {
            service_id: Some(b"svc"),
            ..TopicValues::default()
        };
        assert_eq!(
            build_topic(
                &mut buf,
                RPC_SERVER_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT,
                &values,
                None
            ),
            Err(Error::InvalidArg)
        );
    }

    #[test]
    fn service_group_prefix_is_prepended() {
        let mut buf = [0u8; 128];
        let values = TopicValues {
            service_id: Some(b"svc"),
            executor_id: Some(ANY_EXECUTOR),
            name: Some(b"+"),
            ..TopicValues::default()
        };
        let len = build_topic(
            &mut buf,
            RPC_SERVER_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT,
            &values,
            Some(b"group1"),
        )
        .unwrap();
        assert_eq!(
            &buf[..len],
            b"$share/group1/services/svc/_any_/command/+/request".as_slice()
        );
    }

    #[test]
    fn mismatch_yields_no_match_and_no_bindings() {
        let expected = TopicValues {
            service_id: Some(b"svc"),
            ..TopicValues::default()
        };
        let result = match_topic(
            RPC_SERVER_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT,
            b"services/other/exec/command/unlock/request",
            &expected,
        );
        assert_eq!(result, Err(Error::IotTopicNoMatch));

        // Structural mismatches too.
        assert_eq!(
            match_topic(
                RPC_SERVER_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT,
                b"services/svc/exec/telemetry",
                &expected,
            ),
            Err(Error::IotTopicNoMatch)
        );
    }

    #[test]
    fn any_executor_constraint_matches_every_level() {
        let expected = TopicValues {
            service_id: Some(b"svc"),
            executor_id: Some(ANY_EXECUTOR),
            ..TopicValues::default()
        };
        let matches = match_topic(
            RPC_SERVER_DEFAULT_SUBSCRIPTION_TOPIC_FORMAT,
            b"services/svc/some-box/command/unlock/request",
            &expected,
        )
        .unwrap();
        assert_eq!(matches.executor_id, Some(b"some-box".as_slice()));
        assert_eq!(matches.name, Some(b"unlock".as_slice()));
    }
}
