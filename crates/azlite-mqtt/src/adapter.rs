//! Terminal adapter policy binding the event pipeline to an MQTT client.
//!
//! The adapter translates the four outbound request events into calls on the
//! host's [`MqttClient`] and lets the known inbound response events flow on
//! toward the application. Receiving any event outside that vocabulary means
//! the pipeline is mis-assembled, which is unrecoverable: the platform's
//! critical-error hook fires.

use azlite_core::context::Context;
use azlite_core::error::{Error, Result};
use azlite_core::event::PipelineEvent;
use azlite_core::pipeline::{Flow, Policy, PolicyContext};

use crate::event::{ConnectData, MqttEvent, PubData, SubData};

/// The consumed MQTT transport seam.
///
/// Implementations run the actual MQTT stack. Each call may complete
/// synchronously by queuing the matching response event on `cx`, or
/// asynchronously by posting inbound events from the host's receive loop via
/// [`Pipeline::post_inbound`](azlite_core::pipeline::Pipeline::post_inbound).
pub trait MqttClient: Send {
    /// Opens the network connection and sends CONNECT.
    fn connect(&mut self, cx: &mut PolicyContext<'_, MqttEvent>, data: &ConnectData)
    -> Result<()>;

    /// Sends DISCONNECT and tears the connection down.
    fn disconnect(&mut self, cx: &mut PolicyContext<'_, MqttEvent>) -> Result<()>;

    /// Sends a PUBLISH.
    fn publish(&mut self, cx: &mut PolicyContext<'_, MqttEvent>, data: &PubData) -> Result<()>;

    /// Sends a SUBSCRIBE.
    fn subscribe(&mut self, cx: &mut PolicyContext<'_, MqttEvent>, data: &SubData) -> Result<()>;
}

/// Terminal pipeline policy over an [`MqttClient`].
pub struct MqttClientPolicy<C> {
    client: C,
    context: Context<'static>,
}

impl<C> core::fmt::Debug for MqttClientPolicy<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MqttClientPolicy").finish()
    }
}

impl<C: MqttClient> MqttClientPolicy<C> {
    /// Binds `client` under `context`; once the context expires every
    /// outbound dispatch fails with [`Error::Canceled`].
    pub fn new(client: C, context: Context<'static>) -> Self {
        Self { client, context }
    }

    /// The wrapped client.
    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: MqttClient> Policy<MqttEvent> for MqttClientPolicy<C> {
    fn on_outbound(
        &mut self,
        cx: &mut PolicyContext<'_, MqttEvent>,
        event: MqttEvent,
    ) -> Result<Flow<MqttEvent>> {
        if self.context.has_expired(cx.clock_msec()) {
            return Err(Error::Canceled);
        }
        tracing::debug!(kind = ?event.kind(), "mqtt adapter dispatch");
        match &event {
            MqttEvent::ConnectReq(data) => self.client.connect(cx, data)?,
            MqttEvent::DisconnectReq => self.client.disconnect(cx)?,
            MqttEvent::PubReq(data) => self.client.publish(cx, data)?,
            MqttEvent::SubReq(data) => self.client.subscribe(cx, data)?,
            // Anything else reaching the terminal policy is a wiring bug.
            _ => cx.critical_error(),
        }
        Ok(Flow::Handled)
    }

    fn on_inbound(
        &mut self,
        cx: &mut PolicyContext<'_, MqttEvent>,
        event: MqttEvent,
    ) -> Result<Flow<MqttEvent>> {
        match &event {
            MqttEvent::ConnectRsp(_)
            | MqttEvent::DisconnectRsp(_)
            | MqttEvent::PubRecv(_)
            | MqttEvent::Puback(_)
            | MqttEvent::Suback(_)
            | MqttEvent::Error(_) => Ok(Flow::Forward(event)),
            _ => cx.critical_error(),
        }
    }
}
