//! Orthogonal policy regions below a shared pipeline slot.
//!
//! A [`PolicyCollection`] occupies one pipeline position and fans events out
//! to any number of subclient policies, letting several protocol clients
//! (for example multiple RPC clients) share one connection. On either
//! direction the collection broadcasts the event to every subclient in
//! attach order, then forwards it to its own neighbor; a subclient that
//! wants to originate traffic posts through the shared [`PolicyContext`],
//! which routes to the collection's neighbors.

use std::boxed::Box;
use std::vec::Vec;

use crate::error::{Error, Result};
use crate::event::PipelineEvent;
use crate::pipeline::{Flow, Policy, PolicyContext};

/// Identifies an attached subclient for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubclientId(u32);

/// A pipeline policy broadcasting to attached subclients.
pub struct PolicyCollection<E: PipelineEvent> {
    clients: Vec<(SubclientId, Box<dyn Policy<E>>)>,
    next_id: u32,
}

impl<E: PipelineEvent> core::fmt::Debug for PolicyCollection<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PolicyCollection")
            .field("clients", &self.clients.len())
            .finish()
    }
}

impl<E: PipelineEvent> Default for PolicyCollection<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PipelineEvent> PolicyCollection<E> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            clients: Vec::new(),
            next_id: 0,
        }
    }

    /// Appends a subclient at the end of the broadcast order.
    pub fn add_client(&mut self, client: Box<dyn Policy<E>>) -> SubclientId {
        let id = SubclientId(self.next_id);
        self.next_id += 1;
        self.clients.push((id, client));
        id
    }

    /// Detaches a subclient.
    pub fn remove_client(&mut self, id: SubclientId) -> Result<Box<dyn Policy<E>>> {
        match self.clients.iter().position(|(cid, _)| *cid == id) {
            Some(index) => Ok(self.clients.remove(index).1),
            None => Err(Error::ItemNotFound),
        }
    }

    /// Number of attached subclients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// True when no subclient is attached.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl<E: PipelineEvent> Policy<E> for PolicyCollection<E> {
    fn on_attach(&mut self, cx: &mut PolicyContext<'_, E>) -> Result<()> {
        for (_, client) in &mut self.clients {
            client.on_attach(cx)?;
        }
        Ok(())
    }

    fn on_outbound(&mut self, cx: &mut PolicyContext<'_, E>, event: E) -> Result<Flow<E>> {
        for (_, client) in &mut self.clients {
            client.on_outbound(cx, event.clone())?;
        }
        Ok(Flow::Forward(event))
    }

    fn on_inbound(&mut self, cx: &mut PolicyContext<'_, E>, event: E) -> Result<Flow<E>> {
        for (_, client) in &mut self.clients {
            client.on_inbound(cx, event.clone())?;
        }
        Ok(Flow::Forward(event))
    }
}
