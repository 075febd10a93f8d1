//! # azlite-core
//!
//! Foundation layer for the azlite client SDK - `no_std` compatible for
//! constrained targets.
//!
//! This crate provides the primitives every other azlite crate is built on:
//!
//! - **Status codes**: a single 32-bit tagged [`Error`] with
//!   facility/code/severity bits ([`error`])
//! - **Spans**: bounds-checked views and append cursors over caller-owned
//!   buffers, so the request paths never allocate ([`span`])
//! - **Contexts**: a hierarchical cancellation/deadline tree ([`context`])
//! - **Spinlock**: a CAS-based reader/writer lock for small shared state
//!   ([`spinlock`])
//! - **Platform port**: the narrow interface the SDK consumes from its host
//!   ([`platform`], `std` only)
//! - **HFSM + pipeline**: the hierarchical state machine runtime and the
//!   mutex-serialized bidirectional event pipeline ([`hfsm`], [`pipeline`],
//!   [`collection`], `std` only)
//! - **Retry math** and **classification logging** ([`retry`], [`log`])
//!
//! ## Features
//!
//! - `std` (default): platform port, pipelines, state machines, logging
//!
//! ## no_std Usage
//!
//! ```toml
//! [dependencies]
//! azlite-core = { version = "0.4", default-features = false }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod context;
pub mod error;
pub mod retry;
pub mod span;
pub mod spinlock;

#[cfg(feature = "std")]
pub mod collection;
#[cfg(feature = "std")]
pub mod event;
#[cfg(feature = "std")]
pub mod hfsm;
#[cfg(feature = "std")]
pub mod log;
#[cfg(feature = "std")]
pub mod platform;
#[cfg(feature = "std")]
pub mod pipeline;

// Re-export commonly used types at crate root
pub use context::Context;
pub use error::{Error, Facility, Result};
pub use span::SpanWriter;
pub use spinlock::RwSpinLock;

#[cfg(feature = "std")]
pub use event::{ErrorReport, EventKind, PipelineEvent};
#[cfg(feature = "std")]
pub use hfsm::{Hfsm, Reaction, StateMachine};
#[cfg(feature = "std")]
pub use pipeline::{Flow, Pipeline, PipelineTimer, Policy, PolicyContext, TimerToken};
#[cfg(feature = "std")]
pub use platform::{Platform, StdPlatform};
