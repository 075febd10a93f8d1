//! MQTT 5 pipeline events.
//!
//! One enum covers the whole event vocabulary of an MQTT pipeline: the
//! runtime lifecycle events (entry/exit/timeout/error), the application's
//! open/close requests, and the wire-level request/response pairs the
//! adapter exchanges with the transport. Payloads carry [`Bytes`] so events
//! can cross threads and sit in the pipeline's deferred queues without
//! copying buffers.

use bytes::Bytes;

use azlite_core::error::Facility;
use azlite_core::event::{ErrorReport, EventKind, PipelineEvent};
use azlite_core::pipeline::TimerToken;

use crate::property::PropertyBag;

/// CONNECT request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectData {
    /// Broker host name.
    pub host: Bytes,
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
    /// Whether to ask the broker for a clean session.
    pub clean_start: bool,
}

/// CONNACK payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnackData {
    /// MQTT 5 connect reason code; zero is success.
    pub reason_code: i32,
    /// Whether the broker resumed an existing session.
    pub session_present: bool,
}

/// Broker or client initiated disconnect notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectData {
    /// MQTT 5 disconnect reason code.
    pub reason_code: i32,
    /// True when this disconnect answers a client DISCONNECT request.
    pub requested: bool,
}

/// PUBLISH request payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PubData {
    /// Topic to publish to.
    pub topic: Bytes,
    /// Message payload.
    pub payload: Bytes,
    /// Quality of service (0..=2).
    pub qos: u8,
    /// Client-assigned packet id; PUBACK correlates through it.
    pub packet_id: u16,
    /// MQTT 5 properties (correlation data, response topic, user props).
    pub properties: PropertyBag,
}

/// Received PUBLISH payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PubRecvData {
    /// Topic the message arrived on.
    pub topic: Bytes,
    /// Message payload.
    pub payload: Bytes,
    /// Quality of service the broker used.
    pub qos: u8,
    /// MQTT 5 properties attached by the sender.
    pub properties: PropertyBag,
}

/// PUBACK payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubackData {
    /// Packet id of the acknowledged PUBLISH.
    pub packet_id: u16,
    /// MQTT 5 PUBACK reason code.
    pub reason_code: i32,
}

/// SUBSCRIBE request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubData {
    /// Topic filter to subscribe to.
    pub topic_filter: Bytes,
    /// Requested quality of service.
    pub qos: u8,
    /// Client-assigned packet id; SUBACK correlates through it.
    pub packet_id: u16,
}

/// SUBACK payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubackData {
    /// Packet id of the acknowledged SUBSCRIBE.
    pub packet_id: u16,
}

/// Every event an MQTT pipeline can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum MqttEvent {
    /// State entry (HFSM lifecycle).
    Entry,
    /// State exit (HFSM lifecycle).
    Exit,
    /// A pipeline timer elapsed.
    Timeout(TimerToken),
    /// A handler failed while processing the reported event.
    Error(ErrorReport),
    /// Application request to open the connection.
    OpenReq,
    /// Application request to close the connection.
    CloseReq,
    /// Outbound CONNECT toward the transport.
    ConnectReq(ConnectData),
    /// Inbound CONNACK from the transport.
    ConnectRsp(ConnackData),
    /// Outbound DISCONNECT toward the transport.
    DisconnectReq,
    /// Inbound disconnect notification.
    DisconnectRsp(DisconnectData),
    /// Outbound PUBLISH.
    PubReq(PubData),
    /// Inbound received PUBLISH.
    PubRecv(PubRecvData),
    /// Inbound PUBACK.
    Puback(PubackData),
    /// Outbound SUBSCRIBE.
    SubReq(SubData),
    /// Inbound SUBACK.
    Suback(SubackData),
}

impl PipelineEvent for MqttEvent {
    fn entry() -> Self {
        MqttEvent::Entry
    }

    fn exit() -> Self {
        MqttEvent::Exit
    }

    fn timeout(token: TimerToken) -> Self {
        MqttEvent::Timeout(token)
    }

    fn error(report: ErrorReport) -> Self {
        MqttEvent::Error(report)
    }

    fn kind(&self) -> EventKind {
        match self {
            MqttEvent::Entry => EventKind::ENTRY,
            MqttEvent::Exit => EventKind::EXIT,
            MqttEvent::Timeout(_) => EventKind::TIMEOUT,
            MqttEvent::Error(_) => EventKind::ERROR,
            MqttEvent::ConnectReq(_) => EventKind::new(Facility::Mqtt, 3),
            MqttEvent::ConnectRsp(_) => EventKind::new(Facility::Mqtt, 4),
            MqttEvent::DisconnectReq => EventKind::new(Facility::Mqtt, 5),
            MqttEvent::DisconnectRsp(_) => EventKind::new(Facility::Mqtt, 6),
            MqttEvent::PubReq(_) => EventKind::new(Facility::Mqtt, 7),
            MqttEvent::PubRecv(_) => EventKind::new(Facility::Mqtt, 8),
            MqttEvent::Puback(_) => EventKind::new(Facility::Mqtt, 9),
            MqttEvent::SubReq(_) => EventKind::new(Facility::Mqtt, 10),
            MqttEvent::Suback(_) => EventKind::new(Facility::Mqtt, 11),
            MqttEvent::OpenReq => EventKind::new(Facility::Mqtt, 20),
            MqttEvent::CloseReq => EventKind::new(Facility::Mqtt, 21),
        }
    }
}
