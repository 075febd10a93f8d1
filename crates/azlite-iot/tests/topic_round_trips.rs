//! Build/parse round trips for every default topic format, plus an
//! end-to-end SAS vector with a real HMAC-SHA256.

use base64::Engine;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use pretty_assertions::assert_eq;
use sha2::Sha256;

use azlite_core::error::Error;

use azlite_iot::rpc::{
    RpcClientCodec, RpcClientCodecOptions, RpcServerCodec, RpcServerCodecOptions,
};
use azlite_iot::sas;
use azlite_iot::telemetry::{
    TelemetryConsumerCodec, TelemetryConsumerCodecOptions, TelemetryProducerCodec,
    TelemetryProducerCodecOptions,
};

fn server_codec() -> RpcServerCodec {
    RpcServerCodec::new(
        Bytes::from_static(b"svc"),
        Bytes::from_static(b"exec"),
        RpcServerCodecOptions::default(),
    )
}

fn client_codec() -> RpcClientCodec {
    RpcClientCodec::new(
        Bytes::from_static(b"inv"),
        Bytes::from_static(b"svc"),
        RpcClientCodecOptions::default(),
    )
}

#[test]
fn rpc_request_topic_round_trips() {
    let mut buf = [0u8; 256];
    let len = client_codec()
        .request_topic(&mut buf, b"exec", b"unlock")
        .unwrap();
    assert_eq!(
        &buf[..len],
        b"services/svc/exec/command/unlock/request".as_slice()
    );

    let info = server_codec().parse_request_topic(&buf[..len]).unwrap();
    assert_eq!(info.executor_id, b"exec");
    assert_eq!(info.command_name, b"unlock");
}

#[test]
fn rpc_response_topic_round_trips() {
    let mut buf = [0u8; 256];
    let len = client_codec()
        .response_topic(&mut buf, b"exec", b"unlock")
        .unwrap();
    assert_eq!(
        &buf[..len],
        b"clients/inv/services/svc/exec/command/unlock/response".as_slice()
    );

    let info = client_codec().parse_response_topic(&buf[..len]).unwrap();
    assert_eq!(info.executor_id, b"exec");
    assert_eq!(info.command_name, b"unlock");
}

#[test]
fn rpc_subscription_topics_use_wildcards() {
    let mut buf = [0u8; 256];
    let len = server_codec().subscribe_topic(&mut buf).unwrap();
    assert_eq!(&buf[..len], b"services/svc/exec/command/+/request".as_slice());

    let len = client_codec().subscribe_topic(&mut buf).unwrap();
    assert_eq!(
        &buf[..len],
        b"clients/inv/services/svc/+/command/+/response".as_slice()
    );
}

#[test]
fn shared_group_server_subscription_targets_any_executor() {
    let codec = RpcServerCodec::new(
        Bytes::from_static(b"svc"),
        Bytes::from_static(b"exec"),
        RpcServerCodecOptions {
            service_group: Some(Bytes::from_static(b"workers")),
            ..RpcServerCodecOptions::default()
        },
    );
    let mut buf = [0u8; 256];
    let len = codec.subscribe_topic(&mut buf).unwrap();
    assert_eq!(
        &buf[..len],
        b"$share/workers/services/svc/_any_/command/+/request".as_slice()
    );

    // A request addressed to _any_ is accepted by every group member.
    let info = codec
        .parse_request_topic(b"services/svc/_any_/command/unlock/request")
        .unwrap();
    assert_eq!(info.executor_id, b"_any_");
}

#[test]
fn foreign_topics_do_not_match() {
    assert_eq!(
        server_codec()
            .parse_request_topic(b"services/other-svc/exec/command/unlock/request")
            .map(|_| ()),
        Err(Error::IotTopicNoMatch)
    );
    assert_eq!(
        client_codec()
            .parse_response_topic(b"clients/somebody-else/services/svc/exec/command/unlock/response")
            .map(|_| ()),
        Err(Error::IotTopicNoMatch)
    );
}

#[test]
fn telemetry_topics_round_trip() {
    let producer = TelemetryProducerCodec::new(
        Bytes::from_static(b"svc"),
        Bytes::from_static(b"sender-1"),
        TelemetryProducerCodecOptions::default(),
    );
    let mut buf = [0u8; 256];
    let len = producer.publish_topic(&mut buf, None).unwrap();
    assert_eq!(&buf[..len], b"services/svc/sender-1/telemetry".as_slice());

    let consumer = TelemetryConsumerCodec::new(
        Bytes::from_static(b"svc"),
        TelemetryConsumerCodecOptions::default(),
    );
    let info = consumer.parse_received_topic(&buf[..len]).unwrap();
    assert_eq!(info.sender_id, b"sender-1");

    let len = consumer.subscribe_topic(&mut buf).unwrap();
    assert_eq!(&buf[..len], b"services/svc/+/telemetry".as_slice());
}

#[test]
fn telemetry_consumer_groups_share_the_subscription() {
    let consumer = TelemetryConsumerCodec::new(
        Bytes::from_static(b"svc"),
        TelemetryConsumerCodecOptions {
            service_group: Some(Bytes::from_static(b"pool")),
            ..TelemetryConsumerCodecOptions::default()
        },
    );
    let mut buf = [0u8; 256];
    let len = consumer.subscribe_topic(&mut buf).unwrap();
    assert_eq!(&buf[..len], b"$share/pool/services/svc/+/telemetry".as_slice());
}

#[test]
fn sas_password_from_a_real_hmac() {
    let scope = b"myhub.azure-devices.net/devices/dev";
    let expiry = 1_700_000_000u64;
    let key = b"device-primary-key";

    let mut document_buf = [0u8; 128];
    let document_len = sas::signature_document(&mut document_buf, scope, expiry).unwrap();

    // The application-side half of the contract: HMAC-SHA256 + base64.
    let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
    mac.update(&document_buf[..document_len]);
    let signature = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    let mut password_buf = [0u8; 512];
    let password_len = sas::password(
        &mut password_buf,
        scope,
        signature.as_bytes(),
        expiry,
        Some(b"device"),
    )
    .unwrap();
    let password = core::str::from_utf8(&password_buf[..password_len]).unwrap();

    assert!(password.starts_with("SharedAccessSignature sr=myhub.azure-devices.net%2Fdevices%2Fdev&sig="));
    assert!(password.ends_with("&se=1700000000&skn=device"));
    // The base64 signature is url-encoded: '+', '/' and '=' never appear
    // raw.
    let sig_field = password
        .split("&sig=")
        .nth(1)
        .unwrap()
        .split('&')
        .next()
        .unwrap();
    assert!(!sig_field.contains(['+', '/', '=']));
}
