//! Hierarchical finite state machine runtime.
//!
//! A machine is a value implementing [`StateMachine`]: a `Copy` state
//! identifier, a parent map, and one handler receiving the current state and
//! an event. Handlers do not mutate the current state themselves - they
//! return a [`Reaction`] and the runtime performs the transition, which keeps
//! ENTRY/EXIT ordering deterministic:
//!
//! - **peer**: exit inner states bottom-up to the source, exit the source,
//!   enter the destination;
//! - **substate**: exit inner states to the source, enter the destination
//!   (the source stays active);
//! - **superstate**: exit inner states to the source, exit the source (the
//!   destination is not re-entered).
//!
//! An event a state does not handle propagates to its parent
//! ([`Reaction::Superstate`]); the top-level state must handle every event,
//! and a machine whose root refuses one trips the platform's critical-error
//! hook.
//!
//! Constraints carried over from the design: a single top-level state must
//! exist, transitions may only target peer states, substates or superstates,
//! and the initial state is the top-level state.

use core::fmt;

use crate::error::Result;
use crate::event::PipelineEvent;
use crate::pipeline::PolicyContext;

/// What a state handler decided about an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction<S> {
    /// The event is fully handled.
    Handled,
    /// Propagate the event to the parent state.
    Superstate,
    /// Exit to the handling state, exit it, and enter a peer.
    TransitionPeer(S),
    /// Descend from the handling state into a direct substate.
    TransitionSubstate(S),
    /// Collapse from the handling state into its parent.
    TransitionSuperstate(S),
}

/// A hierarchical state machine definition.
pub trait StateMachine {
    /// The event type dispatched through this machine.
    type Event: PipelineEvent;

    /// State identifier.
    type State: Copy + PartialEq + fmt::Debug;

    /// The parent of `state`, or `None` for the top-level state.
    fn parent(state: Self::State) -> Option<Self::State>;

    /// Handles `event` while `state` is the dispatch target.
    fn handle(
        &mut self,
        state: Self::State,
        event: &Self::Event,
        cx: &mut PolicyContext<'_, Self::Event>,
    ) -> Result<Reaction<Self::State>>;
}

/// Runtime wrapper holding a machine and its current state.
#[derive(Debug)]
pub struct Hfsm<M: StateMachine> {
    machine: M,
    current: M::State,
}

impl<M: StateMachine> Hfsm<M> {
    /// Initializes the runtime in `root` and synchronously dispatches ENTRY
    /// to it. The root's parent must be `None`.
    pub fn init(
        machine: M,
        root: M::State,
        cx: &mut PolicyContext<'_, M::Event>,
    ) -> Result<Self> {
        debug_assert!(M::parent(root).is_none());
        let mut hfsm = Self {
            machine,
            current: root,
        };
        let reaction = hfsm.machine.handle(root, &M::Event::entry(), cx)?;
        hfsm.apply(root, reaction, cx)?;
        Ok(hfsm)
    }

    /// The current (innermost active) state.
    pub fn current(&self) -> M::State {
        self.current
    }

    /// The wrapped machine.
    pub fn machine(&self) -> &M {
        &self.machine
    }

    /// Mutable access to the wrapped machine.
    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    /// Dispatches `event` to the current state, bubbling to super-states
    /// while handlers return [`Reaction::Superstate`]. If the top-level
    /// state also refuses, the platform critical-error hook is invoked.
    pub fn send_event(
        &mut self,
        event: &M::Event,
        cx: &mut PolicyContext<'_, M::Event>,
    ) -> Result<()> {
        let mut target = self.current;
        loop {
            match self.machine.handle(target, event, cx)? {
                Reaction::Handled => return Ok(()),
                Reaction::Superstate => match M::parent(target) {
                    Some(parent) => target = parent,
                    // The top-level state must handle every event.
                    None => cx.critical_error(),
                },
                reaction => return self.apply(target, reaction, cx),
            }
        }
    }

    fn apply(
        &mut self,
        source: M::State,
        reaction: Reaction<M::State>,
        cx: &mut PolicyContext<'_, M::Event>,
    ) -> Result<()> {
        match reaction {
            Reaction::Handled | Reaction::Superstate => Ok(()),
            Reaction::TransitionPeer(destination) => {
                self.exit_to(source, cx)?;
                self.machine.handle(source, &M::Event::exit(), cx)?;
                self.enter(destination, cx)
            }
            Reaction::TransitionSubstate(destination) => {
                self.exit_to(source, cx)?;
                self.enter(destination, cx)
            }
            Reaction::TransitionSuperstate(destination) => {
                self.exit_to(source, cx)?;
                self.machine.handle(source, &M::Event::exit(), cx)?;
                self.current = destination;
                Ok(())
            }
        }
    }

    /// Exits inner states bottom-up until `source` is the current state.
    fn exit_to(&mut self, source: M::State, cx: &mut PolicyContext<'_, M::Event>) -> Result<()> {
        while self.current != source {
            let state = self.current;
            self.machine.handle(state, &M::Event::exit(), cx)?;
            match M::parent(state) {
                Some(parent) => self.current = parent,
                // A transition source must be an ancestor of the current
                // state; running out of parents is a wiring bug.
                None => cx.critical_error(),
            }
        }
        Ok(())
    }

    /// Enters `destination`, makes it current, and chases any transition its
    /// ENTRY handler requests (machines may descend further during entry).
    fn enter(&mut self, destination: M::State, cx: &mut PolicyContext<'_, M::Event>) -> Result<()> {
        let reaction = self.machine.handle(destination, &M::Event::entry(), cx)?;
        self.current = destination;
        match reaction {
            Reaction::Handled | Reaction::Superstate => Ok(()),
            chained => self.apply(destination, chained, cx),
        }
    }
}
