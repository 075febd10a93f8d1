//! End-to-end RPC invocation over a full MQTT pipeline: connection state
//! machine, policy collection with an invoker subclient, pending-request
//! correlation, and the client/server codecs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use azlite_core::collection::PolicyCollection;
use azlite_core::context::Context;
use azlite_core::error::Result;
use azlite_core::pipeline::{Flow, Pipeline, Policy, PolicyContext};
use azlite_core::platform::{Platform, PlatformTimer};

use azlite_mqtt::adapter::{MqttClient, MqttClientPolicy};
use azlite_mqtt::connection::{ConnectionState, MqttConnection, MqttConnectionOptions};
use azlite_mqtt::event::{
    ConnackData, ConnectData, MqttEvent, PubData, PubRecvData, PubackData, SubData, SubackData,
};
use azlite_mqtt::pending::PendingRequests;
use azlite_mqtt::property::PropertyBag;

use azlite_iot::rpc::{
    RpcClientCodec, RpcClientCodecOptions, RpcServerCodec, RpcServerCodecOptions,
    read_status_property, write_status_properties,
};

const CORRELATION_PROPERTY: &[u8] = b"correlation";

/// Minimal deterministic platform; this flow needs no timers to fire.
struct InertPlatform {
    now_msec: AtomicI64,
}

impl Platform for InertPlatform {
    fn clock_msec(&self) -> i64 {
        self.now_msec.load(Ordering::SeqCst)
    }

    fn sleep_msec(&self, msec: i64) {
        self.now_msec.fetch_add(msec, Ordering::SeqCst);
    }

    fn random(&self) -> u32 {
        42
    }

    fn critical_error(&self) -> ! {
        panic!("critical error in rpc flow test");
    }

    fn start_timer(&self, _delay_msec: i64, _callback: Box<dyn FnOnce() + Send>) -> PlatformTimer {
        PlatformTimer::new(Arc::new(AtomicBool::new(false)))
    }
}

/// Executor double: acks the request PUBLISH, then publishes the response
/// the way an RPC server would - response topic from the server-side view,
/// correlation data echoed, status attached.
struct ExecutorClient;

impl MqttClient for ExecutorClient {
    fn connect(
        &mut self,
        cx: &mut PolicyContext<'_, MqttEvent>,
        _data: &ConnectData,
    ) -> Result<()> {
        cx.send_inbound(MqttEvent::ConnectRsp(ConnackData {
            reason_code: 0,
            session_present: false,
        }));
        Ok(())
    }

    fn disconnect(&mut self, _cx: &mut PolicyContext<'_, MqttEvent>) -> Result<()> {
        Ok(())
    }

    fn publish(&mut self, cx: &mut PolicyContext<'_, MqttEvent>, data: &PubData) -> Result<()> {
        cx.send_inbound(MqttEvent::Puback(PubackData {
            packet_id: data.packet_id,
            reason_code: 0,
        }));

        let server = RpcServerCodec::new(
            Bytes::from_static(b"svc"),
            Bytes::from_static(b"exec"),
            RpcServerCodecOptions::default(),
        );
        let request = server.parse_request_topic(&data.topic).expect("request topic");
        assert_eq!(request.command_name, b"unlock");

        let client_view = RpcClientCodec::new(
            Bytes::from_static(b"inv"),
            Bytes::from_static(b"svc"),
            RpcClientCodecOptions::default(),
        );
        let mut topic_buf = [0u8; 256];
        let topic_len = client_view
            .response_topic(&mut topic_buf, b"exec", request.command_name)
            .expect("response topic");

        let mut properties = PropertyBag::new();
        let correlation = data
            .properties
            .find(CORRELATION_PROPERTY)
            .expect("request correlation");
        properties.append_binary(
            Bytes::from_static(CORRELATION_PROPERTY),
            Bytes::copy_from_slice(correlation),
        );
        write_status_properties(&mut properties, 200, Some(b"unlocked"));

        cx.send_inbound(MqttEvent::PubRecv(PubRecvData {
            topic: Bytes::copy_from_slice(&topic_buf[..topic_len]),
            payload: Bytes::from_static(b"{\"door\":\"open\"}"),
            qos: 1,
            properties,
        }));
        Ok(())
    }

    fn subscribe(&mut self, cx: &mut PolicyContext<'_, MqttEvent>, data: &SubData) -> Result<()> {
        cx.send_inbound(MqttEvent::Suback(SubackData {
            packet_id: data.packet_id,
        }));
        Ok(())
    }
}

type Completions = Arc<Mutex<Vec<(Vec<u8>, i32)>>>;

/// Invoker subclient: binds packet ids to pending requests on the way out,
/// completes them from correlated responses on the way in.
struct RpcInvoker {
    codec: RpcClientCodec,
    pending: Arc<Mutex<PendingRequests>>,
    completions: Completions,
}

impl Policy<MqttEvent> for RpcInvoker {
    fn on_outbound(
        &mut self,
        _cx: &mut PolicyContext<'_, MqttEvent>,
        event: MqttEvent,
    ) -> Result<Flow<MqttEvent>> {
        if let MqttEvent::PubReq(data) = &event
            && let Some(correlation) = data.properties.find(CORRELATION_PROPERTY)
        {
            self.pending
                .lock()
                .set_message_id(correlation, data.packet_id)?;
        }
        Ok(Flow::Forward(event))
    }

    fn on_inbound(
        &mut self,
        _cx: &mut PolicyContext<'_, MqttEvent>,
        event: MqttEvent,
    ) -> Result<Flow<MqttEvent>> {
        if let MqttEvent::PubRecv(data) = &event
            && self.codec.parse_response_topic(&data.topic).is_ok()
            && let Some(correlation) = data.properties.find(CORRELATION_PROPERTY)
        {
            let completed = self.pending.lock().remove(correlation)?;
            let status = read_status_property(&data.properties)?;
            self.completions
                .lock()
                .push((completed.correlation_id().to_vec(), status));
        }
        Ok(Flow::Forward(event))
    }
}

#[test]
fn rpc_invocation_completes_through_the_pending_table() {
    let platform = Arc::new(InertPlatform {
        now_msec: AtomicI64::new(1_000),
    });
    let pending = Arc::new(Mutex::new(PendingRequests::default()));
    let completions: Completions = Arc::new(Mutex::new(Vec::new()));

    let codec = RpcClientCodec::new(
        Bytes::from_static(b"inv"),
        Bytes::from_static(b"svc"),
        RpcClientCodecOptions::default(),
    );

    let mut subclients = PolicyCollection::new();
    subclients.add_client(Box::new(RpcInvoker {
        codec: codec.clone(),
        pending: Arc::clone(&pending),
        completions: Arc::clone(&completions),
    }));

    let connection = MqttConnection::new(MqttConnectionOptions {
        hostname: Bytes::from_static(b"broker.example.com"),
        client_id: Bytes::from_static(b"inv"),
        ..MqttConnectionOptions::default()
    });
    let watch = connection.state_watch();
    let adapter = MqttClientPolicy::new(
        ExecutorClient,
        Context::application().with_expiration(Context::NEVER),
    );

    let app_events: Arc<Mutex<Vec<MqttEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&app_events);
    let pipeline = Pipeline::new(
        Arc::clone(&platform) as Arc<dyn Platform>,
        vec![
            Box::new(connection),
            Box::new(subclients),
            Box::new(adapter),
        ],
        move |event| sink_events.lock().push(event),
    )
    .unwrap();

    pipeline.post_outbound(MqttEvent::OpenReq).unwrap();
    assert_eq!(watch.state(), ConnectionState::Connected);

    // Track the request, then publish it.
    let correlation = Bytes::from_static(b"corr-0001");
    pending
        .lock()
        .add(correlation.clone(), platform.clock_msec(), 10_000)
        .unwrap();

    let mut topic_buf = [0u8; 256];
    let topic_len = codec.request_topic(&mut topic_buf, b"exec", b"unlock").unwrap();
    let mut properties = PropertyBag::new();
    properties.append_binary(Bytes::from_static(CORRELATION_PROPERTY), correlation.clone());

    pipeline
        .post_outbound(MqttEvent::PubReq(PubData {
            topic: Bytes::copy_from_slice(&topic_buf[..topic_len]),
            payload: Bytes::from_static(b"{}"),
            qos: 1,
            packet_id: 11,
            properties,
        }))
        .unwrap();

    // The response completed and untracked the request.
    assert_eq!(
        completions.lock().as_slice(),
        [(b"corr-0001".to_vec(), 200)]
    );
    assert!(pending.lock().is_empty());

    // The raw PUBACK and response PUBLISH still reached the application.
    let events = app_events.lock();
    assert!(events
        .iter()
        .any(|e| matches!(e, MqttEvent::Puback(PubackData { packet_id: 11, .. }))));
    assert!(events.iter().any(|e| matches!(e, MqttEvent::PubRecv(_))));
}
