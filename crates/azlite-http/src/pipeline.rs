//! The HTTP policy pipeline.
//!
//! A pipeline is an ordered chain of [`HttpPolicy`] values. A request flows
//! outward through every policy to the terminal transport; the response (or
//! error) flows back through the same chain in reverse as each `send` call
//! returns. Policies compose orthogonal concerns - request ids, retries,
//! credentials, logging, telemetry, API versions - around one transport
//! call.

use std::sync::Arc;

use azlite_core::error::{Error, Result};
use azlite_core::platform::Platform;

use crate::credential::TokenCredential;
use crate::policy::api_version::{ApiVersionOptions, ApiVersionPolicy};
use crate::policy::credential::CredentialPolicy;
use crate::policy::logging::LoggingPolicy;
use crate::policy::request_id::RequestIdPolicy;
use crate::policy::retry::{RetryOptions, RetryPolicy};
use crate::policy::telemetry::{TelemetryOptions, TelemetryPolicy};
use crate::policy::transport::TransportPolicy;
use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::transport::HttpTransport;

/// A node in the HTTP pipeline.
pub trait HttpPolicy: Send + Sync {
    /// Does this policy's work around the rest of the chain. Most policies
    /// mutate the request, call `next.send(..)`, and post-process the
    /// response on the way back out.
    fn send(
        &self,
        request: &mut HttpRequest<'_>,
        response: &mut HttpResponse<'_>,
        next: NextPolicy<'_>,
    ) -> Result<()>;
}

/// The remainder of the chain after the current policy.
#[derive(Clone, Copy)]
pub struct NextPolicy<'a> {
    policies: &'a [Arc<dyn HttpPolicy>],
}

impl core::fmt::Debug for NextPolicy<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NextPolicy")
            .field("remaining", &self.policies.len())
            .finish()
    }
}

impl NextPolicy<'_> {
    /// Forwards the request to the next policy in the chain.
    pub fn send(
        self,
        request: &mut HttpRequest<'_>,
        response: &mut HttpResponse<'_>,
    ) -> Result<()> {
        let (first, rest) = self
            .policies
            .split_first()
            .ok_or(Error::HttpPipelineInvalidPolicy)?;
        first.send(request, response, NextPolicy { policies: rest })
    }
}

/// An immutable, shareable HTTP policy chain.
#[derive(Clone)]
pub struct HttpPipeline {
    policies: Arc<[Arc<dyn HttpPolicy>]>,
}

impl core::fmt::Debug for HttpPipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HttpPipeline")
            .field("policies", &self.policies.len())
            .finish()
    }
}

/// Options for the standard client pipeline.
#[derive(Debug, Clone, Default)]
pub struct HttpClientOptions {
    /// Retry policy tuning.
    pub retry: RetryOptions,
    /// `User-Agent` telemetry fields.
    pub telemetry: TelemetryOptions,
    /// Optional service API version, sent as a header or query parameter.
    pub api_version: Option<ApiVersionOptions>,
}

impl HttpPipeline {
    /// Builds a pipeline from explicit policies, outermost first. The last
    /// policy must be terminal (a transport).
    pub fn from_policies(policies: Vec<Arc<dyn HttpPolicy>>) -> Self {
        Self {
            policies: policies.into(),
        }
    }

    /// Builds the standard client chain:
    /// request-id, retry, credential, logging, telemetry, api-version,
    /// transport.
    pub fn standard(
        platform: Arc<dyn Platform>,
        credential: Arc<dyn TokenCredential>,
        transport: Arc<dyn HttpTransport>,
        options: HttpClientOptions,
    ) -> Self {
        let mut policies: Vec<Arc<dyn HttpPolicy>> = vec![
            Arc::new(RequestIdPolicy::new()),
            Arc::new(RetryPolicy::new(Arc::clone(&platform), options.retry)),
            Arc::new(CredentialPolicy::new(credential)),
            Arc::new(LoggingPolicy::new(Arc::clone(&platform))),
            Arc::new(TelemetryPolicy::new(options.telemetry)),
        ];
        if let Some(api_version) = options.api_version {
            policies.push(Arc::new(ApiVersionPolicy::new(api_version)));
        }
        policies.push(Arc::new(TransportPolicy::new(transport)));
        Self::from_policies(policies)
    }

    /// Sends `request` through the chain, filling `response`.
    pub fn send(
        &self,
        request: &mut HttpRequest<'_>,
        response: &mut HttpResponse<'_>,
    ) -> Result<()> {
        NextPolicy {
            policies: &self.policies,
        }
        .send(request, response)
    }
}
