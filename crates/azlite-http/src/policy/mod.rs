//! The standard HTTP policy set.
//!
//! Ordered outermost to innermost in the default pipeline: request-id,
//! retry, credential, logging, telemetry, api-version, transport. Each
//! policy owns one orthogonal concern and is independently testable.

pub mod api_version;
pub mod credential;
pub mod logging;
pub mod request_id;
pub mod retry;
pub mod telemetry;
pub mod transport;
