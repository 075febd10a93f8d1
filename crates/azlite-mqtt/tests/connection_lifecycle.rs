//! Connection state machine lifecycle tests over a mock MQTT client and a
//! manually-fired timer platform.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use azlite_core::error::{Error, Result};
use azlite_core::pipeline::{Pipeline, PolicyContext};
use azlite_core::platform::{Platform, PlatformTimer};

use azlite_mqtt::adapter::{MqttClient, MqttClientPolicy};
use azlite_mqtt::connection::{
    ConnectionState, MqttConnection, MqttConnectionOptions,
};
use azlite_mqtt::event::{
    ConnackData, ConnectData, DisconnectData, MqttEvent, PubData, PubackData, SubData, SubackData,
};
use azlite_mqtt::property::PropertyBag;

/// Platform whose timers fire only when the test says so.
struct ManualPlatform {
    now_msec: AtomicI64,
    timers: Mutex<Vec<ScheduledTimer>>,
    random_value: u32,
}

struct ScheduledTimer {
    delay_msec: i64,
    cancelled: Arc<AtomicBool>,
    callback: Option<Box<dyn FnOnce() + Send>>,
}

impl ManualPlatform {
    fn new() -> Self {
        Self {
            now_msec: AtomicI64::new(0),
            timers: Mutex::new(Vec::new()),
            random_value: 1234,
        }
    }

    /// Delays of timers that are armed and not cancelled.
    fn pending_delays(&self) -> Vec<i64> {
        self.timers
            .lock()
            .iter()
            .filter(|t| t.callback.is_some() && !t.cancelled.load(Ordering::Acquire))
            .map(|t| t.delay_msec)
            .collect()
    }

    /// Fires the most recently armed live timer.
    fn fire_latest(&self) {
        let callback = {
            let mut timers = self.timers.lock();
            timers
                .iter_mut()
                .rev()
                .find(|t| t.callback.is_some() && !t.cancelled.load(Ordering::Acquire))
                .and_then(|t| t.callback.take())
        };
        callback.expect("no live timer to fire")();
    }
}

impl Platform for ManualPlatform {
    fn clock_msec(&self) -> i64 {
        self.now_msec.load(Ordering::SeqCst)
    }

    fn sleep_msec(&self, msec: i64) {
        self.now_msec.fetch_add(msec, Ordering::SeqCst);
    }

    fn random(&self) -> u32 {
        self.random_value
    }

    fn critical_error(&self) -> ! {
        panic!("critical error in mqtt test");
    }

    fn start_timer(&self, delay_msec: i64, callback: Box<dyn FnOnce() + Send>) -> PlatformTimer {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.timers.lock().push(ScheduledTimer {
            delay_msec,
            cancelled: Arc::clone(&cancelled),
            callback: Some(callback),
        });
        PlatformTimer::new(cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientCall {
    Connect,
    Disconnect,
    Publish,
    Subscribe,
}

/// Scripted client: each connect consumes the next CONNACK reason; `None`
/// stays silent (for timeout tests). Everything else acks immediately.
struct MockClient {
    connack_reasons: VecDeque<Option<i32>>,
    calls: Arc<Mutex<Vec<ClientCall>>>,
}

impl MqttClient for MockClient {
    fn connect(
        &mut self,
        cx: &mut PolicyContext<'_, MqttEvent>,
        _data: &ConnectData,
    ) -> Result<()> {
        self.calls.lock().push(ClientCall::Connect);
        if let Some(Some(reason_code)) = self.connack_reasons.pop_front() {
            cx.send_inbound(MqttEvent::ConnectRsp(ConnackData {
                reason_code,
                session_present: false,
            }));
        }
        Ok(())
    }

    fn disconnect(&mut self, cx: &mut PolicyContext<'_, MqttEvent>) -> Result<()> {
        self.calls.lock().push(ClientCall::Disconnect);
        cx.send_inbound(MqttEvent::DisconnectRsp(DisconnectData {
            reason_code: 0,
            requested: true,
        }));
        Ok(())
    }

    fn publish(&mut self, cx: &mut PolicyContext<'_, MqttEvent>, data: &PubData) -> Result<()> {
        self.calls.lock().push(ClientCall::Publish);
        cx.send_inbound(MqttEvent::Puback(PubackData {
            packet_id: data.packet_id,
            reason_code: 0,
        }));
        Ok(())
    }

    fn subscribe(&mut self, cx: &mut PolicyContext<'_, MqttEvent>, data: &SubData) -> Result<()> {
        self.calls.lock().push(ClientCall::Subscribe);
        cx.send_inbound(MqttEvent::Suback(SubackData {
            packet_id: data.packet_id,
        }));
        Ok(())
    }
}

struct Harness {
    platform: Arc<ManualPlatform>,
    pipeline: Pipeline<MqttEvent>,
    watch: azlite_mqtt::connection::ConnectionStateWatch,
    calls: Arc<Mutex<Vec<ClientCall>>>,
    app_events: Arc<Mutex<Vec<MqttEvent>>>,
}

fn options() -> MqttConnectionOptions {
    MqttConnectionOptions {
        hostname: Bytes::from_static(b"broker.example.com"),
        client_id: Bytes::from_static(b"device-1"),
        ..MqttConnectionOptions::default()
    }
}

fn harness(connack_reasons: Vec<Option<i32>>, options: MqttConnectionOptions) -> Harness {
    let platform = Arc::new(ManualPlatform::new());
    let calls = Arc::new(Mutex::new(Vec::new()));
    let app_events: Arc<Mutex<Vec<MqttEvent>>> = Arc::new(Mutex::new(Vec::new()));

    let connection = MqttConnection::new(options);
    let watch = connection.state_watch();
    let client = MockClient {
        connack_reasons: connack_reasons.into_iter().collect(),
        calls: Arc::clone(&calls),
    };
    let adapter = MqttClientPolicy::new(
        client,
        azlite_core::context::Context::application()
            .with_expiration(azlite_core::context::Context::NEVER),
    );

    let sink_events = Arc::clone(&app_events);
    let pipeline = Pipeline::new(
        Arc::clone(&platform) as Arc<dyn Platform>,
        vec![Box::new(connection), Box::new(adapter)],
        move |event| sink_events.lock().push(event),
    )
    .unwrap();

    Harness {
        platform,
        pipeline,
        watch,
        calls,
        app_events,
    }
}

#[test]
fn open_request_connects_and_notifies_the_application() {
    let h = harness(vec![Some(0)], options());
    assert_eq!(h.watch.state(), ConnectionState::Idle);

    h.pipeline.post_outbound(MqttEvent::OpenReq).unwrap();

    // Transport saw exactly one CONNECT.
    assert_eq!(h.calls.lock().as_slice(), [ClientCall::Connect]);
    // The application callback observed the successful CONNACK.
    assert_eq!(
        h.app_events.lock().as_slice(),
        [MqttEvent::ConnectRsp(ConnackData {
            reason_code: 0,
            session_present: false,
        })]
    );
    assert_eq!(h.watch.state(), ConnectionState::Connected);
}

#[test]
fn close_request_runs_the_disconnect_handshake() {
    let h = harness(vec![Some(0)], options());
    h.pipeline.post_outbound(MqttEvent::OpenReq).unwrap();
    h.pipeline.post_outbound(MqttEvent::CloseReq).unwrap();

    assert_eq!(
        h.calls.lock().as_slice(),
        [ClientCall::Connect, ClientCall::Disconnect]
    );
    assert_eq!(h.watch.state(), ConnectionState::Idle);
}

#[test]
fn refused_connack_schedules_a_backoff_retry() {
    // 136: server unavailable (retriable); then success.
    let h = harness(vec![Some(136), Some(0)], options());
    h.pipeline.post_outbound(MqttEvent::OpenReq).unwrap();

    assert_eq!(h.watch.state(), ConnectionState::Idle);
    // attempt 1: min 1000 doubled + 1234 jitter, no operation time.
    assert_eq!(h.platform.pending_delays(), vec![3234]);

    h.platform.fire_latest();
    assert_eq!(h.watch.state(), ConnectionState::Connected);
    assert_eq!(
        h.calls.lock().as_slice(),
        [ClientCall::Connect, ClientCall::Connect]
    );
}

#[test]
fn authentication_refusal_faults_without_retrying() {
    // 5: not authorized.
    let h = harness(vec![Some(5)], options());
    h.pipeline.post_outbound(MqttEvent::OpenReq).unwrap();

    assert_eq!(h.watch.state(), ConnectionState::Faulted);
    assert!(h.platform.pending_delays().is_empty());

    let events = h.app_events.lock();
    // Reason 5 first reaches the app as the raw CONNACK, then the fault
    // report.
    assert!(matches!(
        events.last(),
        Some(MqttEvent::Error(report)) if report.error == Error::HttpAuthenticationFailed
    ));
    drop(events);

    // Faulted rejects further opens until closed.
    assert_eq!(
        h.pipeline.post_outbound(MqttEvent::OpenReq),
        Err(Error::HfsmInvalidState)
    );
    h.pipeline.post_outbound(MqttEvent::CloseReq).unwrap();
    assert_eq!(h.watch.state(), ConnectionState::Idle);
}

#[test]
fn connect_attempt_budget_exhaustion_faults() {
    let h = harness(
        vec![Some(136), Some(136)],
        MqttConnectionOptions {
            max_connect_attempts: 2,
            ..options()
        },
    );
    h.pipeline.post_outbound(MqttEvent::OpenReq).unwrap();
    assert_eq!(h.watch.state(), ConnectionState::Idle);

    h.platform.fire_latest();
    assert_eq!(h.watch.state(), ConnectionState::Faulted);
    assert!(matches!(
        h.app_events.lock().last(),
        Some(MqttEvent::Error(report)) if report.error == Error::HfsmInvalidState
    ));
}

#[test]
fn missing_connack_times_out_into_a_retry() {
    // First connect never answers; the connect timer forces the failure
    // path. Second connect succeeds.
    let h = harness(vec![None, Some(0)], options());
    h.pipeline.post_outbound(MqttEvent::OpenReq).unwrap();
    assert_eq!(h.watch.state(), ConnectionState::Connecting);
    // Only the 30 s connect timer is live.
    assert_eq!(h.platform.pending_delays(), vec![30_000]);

    h.platform.fire_latest();
    assert_eq!(h.watch.state(), ConnectionState::Idle);
    assert_eq!(h.platform.pending_delays(), vec![3234]);

    h.platform.fire_latest();
    assert_eq!(h.watch.state(), ConnectionState::Connected);
}

#[test]
fn publish_and_subscribe_require_a_connection() {
    let h = harness(vec![Some(0)], options());

    let publish = MqttEvent::PubReq(PubData {
        topic: Bytes::from_static(b"services/svc/dev/telemetry"),
        payload: Bytes::from_static(b"{}"),
        qos: 1,
        packet_id: 7,
        properties: PropertyBag::new(),
    });

    assert_eq!(
        h.pipeline.post_outbound(publish.clone()),
        Err(Error::HfsmInvalidState)
    );

    h.pipeline.post_outbound(MqttEvent::OpenReq).unwrap();
    h.pipeline.post_outbound(publish).unwrap();
    h.pipeline
        .post_outbound(MqttEvent::SubReq(SubData {
            topic_filter: Bytes::from_static(b"services/svc/dev/telemetry"),
            qos: 1,
            packet_id: 8,
        }))
        .unwrap();

    assert_eq!(
        h.calls.lock().as_slice(),
        [ClientCall::Connect, ClientCall::Publish, ClientCall::Subscribe]
    );
    // Acks flowed through to the application.
    let events = h.app_events.lock();
    assert!(events.iter().any(|e| matches!(
        e,
        MqttEvent::Puback(PubackData { packet_id: 7, .. })
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, MqttEvent::Suback(SubackData { packet_id: 8 }))));
}

#[test]
fn expired_adapter_context_cancels_and_reports_inbound() {
    let platform = Arc::new(ManualPlatform::new());
    let calls = Arc::new(Mutex::new(Vec::new()));
    let app_events: Arc<Mutex<Vec<MqttEvent>>> = Arc::new(Mutex::new(Vec::new()));

    let connection = MqttConnection::new(options());
    let client = MockClient {
        connack_reasons: VecDeque::new(),
        calls: Arc::clone(&calls),
    };
    // Context already expired relative to the virtual clock.
    platform.now_msec.store(10, Ordering::SeqCst);
    let adapter = MqttClientPolicy::new(
        client,
        azlite_core::context::Context::application().with_expiration(5),
    );

    let sink_events = Arc::clone(&app_events);
    let pipeline = Pipeline::new(
        Arc::clone(&platform) as Arc<dyn Platform>,
        vec![Box::new(connection), Box::new(adapter)],
        move |event| sink_events.lock().push(event),
    )
    .unwrap();

    // The open itself is accepted; the deferred CONNECT_REQ dies at the
    // adapter and comes back as an inbound ERROR event.
    pipeline.post_outbound(MqttEvent::OpenReq).unwrap();
    assert!(calls.lock().is_empty());
    assert!(matches!(
        app_events.lock().last(),
        Some(MqttEvent::Error(report)) if report.error == Error::Canceled
    ));
}
