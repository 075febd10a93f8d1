//! The MQTT connection state machine.
//!
//! A hierarchical machine managing connect, reconnect-with-backoff and
//! disconnect on behalf of the application:
//!
//! ```text
//! Root
//! ├── Idle           (retry timer may be pending)
//! ├── Connecting     (CONNECT sent, connect timer running)
//! ├── Connected
//! ├── Disconnecting  (DISCONNECT sent, handshake timer running)
//! └── Faulted        (terminal error sink until closed)
//! ```
//!
//! Failed connect attempts back off exponentially with jitter; once the
//! configured attempt budget is exhausted (or the broker refuses
//! authentication) the machine enters `Faulted`, raises an ERROR toward the
//! application, and rejects further requests until a close resets it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;

use azlite_core::error::{Error, Result};
use azlite_core::event::{ErrorReport, PipelineEvent};
use azlite_core::hfsm::{Hfsm, Reaction, StateMachine};
use azlite_core::log::{self, Classification};
use azlite_core::pipeline::{Flow, PipelineTimer, Policy, PolicyContext};
use azlite_core::retry::calculate_retry_delay;

use crate::event::{ConnackData, ConnectData, MqttEvent};

/// CONNACK reason codes that mean authentication failed; retrying cannot
/// help.
const AUTH_FAILURE_REASONS: [i32; 3] = [4, 5, 135];

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct MqttConnectionOptions {
    /// Broker host name.
    pub hostname: Bytes,
    /// Broker port.
    pub port: u16,
    /// MQTT client id.
    pub client_id: Bytes,
    /// User name (may be empty).
    pub username: Bytes,
    /// Password (may be empty).
    pub password: Bytes,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Ask the broker for a clean session on connect.
    pub clean_start: bool,
    /// How long to wait for CONNACK.
    pub connect_timeout_msec: i64,
    /// How long to wait for the disconnect handshake.
    pub disconnect_timeout_msec: i64,
    /// Minimum reconnect back-off.
    pub min_retry_delay_msec: i32,
    /// Maximum reconnect back-off.
    pub max_retry_delay_msec: i32,
    /// Upper bound (exclusive) for reconnect jitter.
    pub max_random_jitter_msec: i32,
    /// Connect attempts before faulting; `-1` retries forever.
    pub max_connect_attempts: i16,
    /// Pass every event through untouched; the application manages the
    /// connection itself.
    pub disable_sdk_connection_management: bool,
}

impl Default for MqttConnectionOptions {
    fn default() -> Self {
        Self {
            hostname: Bytes::new(),
            port: 8883,
            client_id: Bytes::new(),
            username: Bytes::new(),
            password: Bytes::new(),
            keep_alive_secs: 240,
            clean_start: true,
            connect_timeout_msec: 30_000,
            disconnect_timeout_msec: 5_000,
            min_retry_delay_msec: 1_000,
            max_retry_delay_msec: 100_000,
            max_random_jitter_msec: 5_000,
            max_connect_attempts: -1,
            disable_sdk_connection_management: false,
        }
    }
}

/// Observable connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Superstate; never the resting state after attach.
    Root = 0,
    /// Not connected; a reconnect timer may be pending.
    Idle = 1,
    /// CONNECT sent, awaiting CONNACK.
    Connecting = 2,
    /// Session established.
    Connected = 3,
    /// DISCONNECT sent, awaiting the handshake.
    Disconnecting = 4,
    /// Terminal error sink.
    Faulted = 5,
}

impl ConnectionState {
    fn from_u8(value: u8) -> ConnectionState {
        match value {
            1 => ConnectionState::Idle,
            2 => ConnectionState::Connecting,
            3 => ConnectionState::Connected,
            4 => ConnectionState::Disconnecting,
            5 => ConnectionState::Faulted,
            _ => ConnectionState::Root,
        }
    }
}

/// Cheap, shareable view of the connection state.
#[derive(Debug, Clone)]
pub struct ConnectionStateWatch {
    inner: Arc<AtomicU8>,
}

impl ConnectionStateWatch {
    /// The state after the most recent event dispatch.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.load(Ordering::Acquire))
    }
}

struct ConnectionMachine {
    options: MqttConnectionOptions,
    connect_timer: Option<PipelineTimer<MqttEvent>>,
    retry_timer: Option<PipelineTimer<MqttEvent>>,
    disconnect_timer: Option<PipelineTimer<MqttEvent>>,
    attempts: i16,
    connect_started_msec: i64,
}

impl ConnectionMachine {
    fn new(options: MqttConnectionOptions) -> Self {
        Self {
            options,
            connect_timer: None,
            retry_timer: None,
            disconnect_timer: None,
            attempts: 0,
            connect_started_msec: 0,
        }
    }

    fn connect_data(&self) -> ConnectData {
        ConnectData {
            host: self.options.hostname.clone(),
            port: self.options.port,
            client_id: self.options.client_id.clone(),
            username: self.options.username.clone(),
            password: self.options.password.clone(),
            keep_alive_secs: self.options.keep_alive_secs,
            clean_start: self.options.clean_start,
        }
    }

    /// Emits CONNECT_REQ and arms the connect timer.
    fn begin_connect(&mut self, cx: &mut PolicyContext<'_, MqttEvent>) {
        self.connect_started_msec = cx.clock_msec();
        cx.send_outbound(MqttEvent::ConnectReq(self.connect_data()));
        if let Some(timer) = &mut self.connect_timer {
            timer.start(self.options.connect_timeout_msec);
        }
        log::write(Classification::MQTT_CONNECT, b"MQTT connect requested");
    }

    /// Emits DISCONNECT_REQ and arms the handshake timer.
    fn begin_disconnect(&mut self, cx: &mut PolicyContext<'_, MqttEvent>) {
        cx.send_outbound(MqttEvent::DisconnectReq);
        if let Some(timer) = &mut self.disconnect_timer {
            timer.start(self.options.disconnect_timeout_msec);
        }
        log::write(Classification::MQTT_DISCONNECT, b"MQTT disconnect requested");
    }

    fn is_timer(timer: &Option<PipelineTimer<MqttEvent>>, event: &MqttEvent) -> bool {
        match (timer, event) {
            (Some(timer), MqttEvent::Timeout(token)) => timer.token() == *token,
            _ => false,
        }
    }

    /// Triages a failed connect attempt: fault on authentication refusal or
    /// an exhausted budget, otherwise back off and return to Idle.
    fn connect_attempt_failed(
        &mut self,
        cx: &mut PolicyContext<'_, MqttEvent>,
        reason_code: i32,
        origin: &MqttEvent,
    ) -> Reaction<ConnectionState> {
        self.attempts = self.attempts.saturating_add(1);

        let auth_refused = AUTH_FAILURE_REASONS.contains(&reason_code);
        let budget_exhausted = self.options.max_connect_attempts >= 0
            && self.attempts >= self.options.max_connect_attempts;
        if auth_refused || budget_exhausted {
            tracing::warn!(reason_code, attempts = self.attempts, "mqtt connection faulted");
            cx.send_inbound(MqttEvent::error(ErrorReport {
                error: if auth_refused {
                    Error::HttpAuthenticationFailed
                } else {
                    Error::HfsmInvalidState
                },
                origin: origin.kind(),
            }));
            return Reaction::TransitionPeer(ConnectionState::Faulted);
        }

        let operation_msec = (cx.clock_msec() - self.connect_started_msec)
            .clamp(0, i64::from(i32::MAX)) as i32;
        let jitter_msec = if self.options.max_random_jitter_msec > 0 {
            (cx.platform().random() % self.options.max_random_jitter_msec as u32) as i32
        } else {
            0
        };
        let delay_msec = calculate_retry_delay(
            operation_msec,
            self.attempts,
            self.options.min_retry_delay_msec,
            self.options.max_retry_delay_msec,
            jitter_msec,
        );
        tracing::debug!(attempt = self.attempts, delay_msec, "mqtt reconnect scheduled");
        if let Some(timer) = &mut self.retry_timer {
            timer.start(i64::from(delay_msec));
        }
        Reaction::TransitionPeer(ConnectionState::Idle)
    }
}

impl StateMachine for ConnectionMachine {
    type Event = MqttEvent;
    type State = ConnectionState;

    fn parent(state: ConnectionState) -> Option<ConnectionState> {
        match state {
            ConnectionState::Root => None,
            _ => Some(ConnectionState::Root),
        }
    }

    fn handle(
        &mut self,
        state: ConnectionState,
        event: &MqttEvent,
        cx: &mut PolicyContext<'_, MqttEvent>,
    ) -> Result<Reaction<ConnectionState>> {
        match state {
            ConnectionState::Root => self.handle_root(event, cx),
            ConnectionState::Idle => self.handle_idle(event, cx),
            ConnectionState::Connecting => self.handle_connecting(event, cx),
            ConnectionState::Connected => self.handle_connected(event, cx),
            ConnectionState::Disconnecting => self.handle_disconnecting(event, cx),
            ConnectionState::Faulted => self.handle_faulted(event, cx),
        }
    }
}

impl ConnectionMachine {
    fn handle_root(
        &mut self,
        event: &MqttEvent,
        _cx: &mut PolicyContext<'_, MqttEvent>,
    ) -> Result<Reaction<ConnectionState>> {
        match event {
            MqttEvent::Entry => Ok(Reaction::TransitionSubstate(ConnectionState::Idle)),
            // Stale timers and late responses are dropped here so they never
            // reach the terminal adapter.
            MqttEvent::Exit
            | MqttEvent::Timeout(_)
            | MqttEvent::Error(_)
            | MqttEvent::ConnectRsp(_)
            | MqttEvent::DisconnectRsp(_)
            | MqttEvent::Puback(_)
            | MqttEvent::Suback(_)
            | MqttEvent::PubRecv(_) => Ok(Reaction::Handled),
            _ => Err(Error::HfsmInvalidState),
        }
    }

    fn handle_idle(
        &mut self,
        event: &MqttEvent,
        cx: &mut PolicyContext<'_, MqttEvent>,
    ) -> Result<Reaction<ConnectionState>> {
        match event {
            MqttEvent::Entry | MqttEvent::Exit => Ok(Reaction::Handled),
            MqttEvent::OpenReq => {
                self.attempts = 0;
                self.begin_connect(cx);
                Ok(Reaction::TransitionPeer(ConnectionState::Connecting))
            }
            MqttEvent::Timeout(_) if Self::is_timer(&self.retry_timer, event) => {
                self.begin_connect(cx);
                Ok(Reaction::TransitionPeer(ConnectionState::Connecting))
            }
            _ => Ok(Reaction::Superstate),
        }
    }

    fn handle_connecting(
        &mut self,
        event: &MqttEvent,
        cx: &mut PolicyContext<'_, MqttEvent>,
    ) -> Result<Reaction<ConnectionState>> {
        match event {
            MqttEvent::Entry | MqttEvent::Exit => Ok(Reaction::Handled),
            MqttEvent::ConnectRsp(ConnackData { reason_code, .. }) => {
                if let Some(timer) = &mut self.connect_timer {
                    timer.stop();
                }
                if *reason_code == 0 {
                    self.attempts = 0;
                    log::write(Classification::MQTT_CONNECT, b"MQTT connected");
                    Ok(Reaction::TransitionPeer(ConnectionState::Connected))
                } else {
                    Ok(self.connect_attempt_failed(cx, *reason_code, event))
                }
            }
            MqttEvent::Timeout(_) if Self::is_timer(&self.connect_timer, event) => {
                // No CONNACK inside the window counts as a failed attempt.
                Ok(self.connect_attempt_failed(cx, -1, event))
            }
            MqttEvent::CloseReq => {
                self.begin_disconnect(cx);
                Ok(Reaction::TransitionPeer(ConnectionState::Disconnecting))
            }
            _ => Ok(Reaction::Superstate),
        }
    }

    fn handle_connected(
        &mut self,
        event: &MqttEvent,
        cx: &mut PolicyContext<'_, MqttEvent>,
    ) -> Result<Reaction<ConnectionState>> {
        match event {
            MqttEvent::Entry | MqttEvent::Exit => Ok(Reaction::Handled),
            MqttEvent::CloseReq => {
                self.begin_disconnect(cx);
                Ok(Reaction::TransitionPeer(ConnectionState::Disconnecting))
            }
            MqttEvent::DisconnectRsp(_) => {
                // Connection lost without a close request: back off and
                // reconnect.
                log::write(Classification::MQTT_DISCONNECT, b"MQTT connection lost");
                Ok(self.connect_attempt_failed(cx, 0, event))
            }
            _ => Ok(Reaction::Superstate),
        }
    }

    fn handle_disconnecting(
        &mut self,
        event: &MqttEvent,
        _cx: &mut PolicyContext<'_, MqttEvent>,
    ) -> Result<Reaction<ConnectionState>> {
        match event {
            MqttEvent::Entry | MqttEvent::Exit => Ok(Reaction::Handled),
            MqttEvent::DisconnectRsp(_) => {
                if let Some(timer) = &mut self.disconnect_timer {
                    timer.stop();
                }
                self.attempts = 0;
                log::write(Classification::MQTT_DISCONNECT, b"MQTT disconnected");
                Ok(Reaction::TransitionPeer(ConnectionState::Idle))
            }
            MqttEvent::Timeout(_) if Self::is_timer(&self.disconnect_timer, event) => {
                // Handshake never completed; force Idle.
                Ok(Reaction::TransitionPeer(ConnectionState::Idle))
            }
            // A CONNACK racing the disconnect is dropped.
            MqttEvent::ConnectRsp(_) => Ok(Reaction::Handled),
            _ => Ok(Reaction::Superstate),
        }
    }

    fn handle_faulted(
        &mut self,
        event: &MqttEvent,
        _cx: &mut PolicyContext<'_, MqttEvent>,
    ) -> Result<Reaction<ConnectionState>> {
        match event {
            MqttEvent::Entry | MqttEvent::Exit => Ok(Reaction::Handled),
            // Closing resets the fault.
            MqttEvent::CloseReq => {
                self.attempts = 0;
                Ok(Reaction::TransitionPeer(ConnectionState::Idle))
            }
            MqttEvent::OpenReq => Err(Error::HfsmInvalidState),
            _ => Ok(Reaction::Superstate),
        }
    }
}

/// Pipeline policy owning the connection state machine.
///
/// Sits application-most on the MQTT pipeline: open/close requests and timer
/// expiries feed the machine, publish/subscribe requests pass through only
/// while connected, and inbound responses update the machine before flowing
/// on to the application sink.
pub struct MqttConnection {
    pending: Option<ConnectionMachine>,
    hfsm: Option<Hfsm<ConnectionMachine>>,
    watch: Arc<AtomicU8>,
    passthrough: bool,
}

impl core::fmt::Debug for MqttConnection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MqttConnection")
            .field("state", &ConnectionState::from_u8(self.watch.load(Ordering::Acquire)))
            .finish()
    }
}

impl MqttConnection {
    /// Creates the connection policy from its options.
    pub fn new(options: MqttConnectionOptions) -> Self {
        let passthrough = options.disable_sdk_connection_management;
        Self {
            pending: Some(ConnectionMachine::new(options)),
            hfsm: None,
            watch: Arc::new(AtomicU8::new(ConnectionState::Root as u8)),
            passthrough,
        }
    }

    /// A handle observing the connection state; grab one before boxing the
    /// policy into the pipeline.
    pub fn state_watch(&self) -> ConnectionStateWatch {
        ConnectionStateWatch {
            inner: Arc::clone(&self.watch),
        }
    }

    fn publish_state(&self) {
        if let Some(hfsm) = &self.hfsm {
            self.watch.store(hfsm.current() as u8, Ordering::Release);
        }
    }

    fn dispatch(
        &mut self,
        cx: &mut PolicyContext<'_, MqttEvent>,
        event: &MqttEvent,
    ) -> Result<()> {
        let hfsm = self.hfsm.as_mut().ok_or(Error::HfsmInvalidState)?;
        let result = hfsm.send_event(event, cx);
        self.publish_state();
        result
    }

    fn is_connected(&self) -> bool {
        self.hfsm
            .as_ref()
            .is_some_and(|hfsm| hfsm.current() == ConnectionState::Connected)
    }
}

impl Policy<MqttEvent> for MqttConnection {
    fn on_attach(&mut self, cx: &mut PolicyContext<'_, MqttEvent>) -> Result<()> {
        let mut machine = self.pending.take().ok_or(Error::HfsmInvalidState)?;
        if !self.passthrough {
            machine.connect_timer = Some(cx.create_timer());
            machine.retry_timer = Some(cx.create_timer());
            machine.disconnect_timer = Some(cx.create_timer());
        }
        self.hfsm = Some(Hfsm::init(machine, ConnectionState::Root, cx)?);
        self.publish_state();
        Ok(())
    }

    fn on_outbound(
        &mut self,
        cx: &mut PolicyContext<'_, MqttEvent>,
        event: MqttEvent,
    ) -> Result<Flow<MqttEvent>> {
        if self.passthrough {
            return Ok(Flow::Forward(event));
        }
        match &event {
            MqttEvent::PubReq(_) | MqttEvent::SubReq(_) => {
                if self.is_connected() {
                    Ok(Flow::Forward(event))
                } else {
                    Err(Error::HfsmInvalidState)
                }
            }
            _ => {
                self.dispatch(cx, &event)?;
                Ok(Flow::Handled)
            }
        }
    }

    fn on_inbound(
        &mut self,
        cx: &mut PolicyContext<'_, MqttEvent>,
        event: MqttEvent,
    ) -> Result<Flow<MqttEvent>> {
        if self.passthrough {
            return Ok(Flow::Forward(event));
        }
        if matches!(
            &event,
            MqttEvent::ConnectRsp(_) | MqttEvent::DisconnectRsp(_)
        ) {
            self.dispatch(cx, &event)?;
        }
        // Responses always continue to the application sink.
        Ok(Flow::Forward(event))
    }
}
