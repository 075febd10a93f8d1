//! # azlite-http
//!
//! Span-backed HTTP request/response model with a pluggable policy pipeline
//! and an AAD credential subsystem.
//!
//! This crate provides:
//!
//! - **Request/response model**: [`HttpRequest`] and [`HttpResponse`] over
//!   caller-owned buffers; a forward-only [`ResponseParser`]
//! - **Policy pipeline**: [`HttpPipeline`] composing request-id, retry,
//!   credential, logging, telemetry, api-version and transport policies
//! - **Credentials**: [`ClientSecretCredential`] (OAuth2 client-credentials
//!   against AAD) with a spinlock-guarded token cache, and
//!   [`AnonymousCredential`]
//! - **Transport seam**: the [`HttpTransport`] trait the host implements
//!
//! The pipeline owns no sockets and performs no allocation on the request
//! path; the transport and all buffers belong to the application.
//!
//! ## Example
//!
//! ```rust,ignore
//! let pipeline = HttpPipeline::standard(platform, credential, transport,
//!     HttpClientOptions::default());
//! let mut request = HttpRequest::new(ctx, HttpMethod::GET, &mut url_buf,
//!     b"https://example.vault.azure.net/secrets/Password", &mut headers_buf, b"")?;
//! request.set_query_parameter(b"api-version", b"7.0")?;
//! let mut response = HttpResponse::new(&mut response_buf);
//! pipeline.send(&mut request, &mut response)?;
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod credential;
pub mod pipeline;
pub mod policy;
pub mod request;
pub mod response;
pub mod token;
pub mod transport;

// Re-export commonly used types at crate root
pub use credential::{AnonymousCredential, AppliedToken, ClientSecretCredential, TokenCredential};
pub use pipeline::{HttpClientOptions, HttpPipeline, HttpPolicy, NextPolicy};
pub use policy::api_version::{ApiVersionLocation, ApiVersionOptions};
pub use policy::retry::RetryOptions;
pub use policy::telemetry::TelemetryOptions;
pub use request::{HttpMethod, HttpRequest};
pub use response::{HttpResponse, ResponseParser, StatusLine};
pub use token::{Token, TokenCache};
pub use transport::{HttpTransport, TransportError};
