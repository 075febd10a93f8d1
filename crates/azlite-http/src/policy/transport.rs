//! Terminal policy binding the pipeline to the host transport.

use std::sync::Arc;

use azlite_core::error::Result;

use crate::pipeline::{HttpPolicy, NextPolicy};
use crate::request::HttpRequest;
use crate::response::HttpResponse;
use crate::transport::HttpTransport;

/// Sends the request through the bound [`HttpTransport`]. Terminal; never
/// forwards.
pub struct TransportPolicy {
    transport: Arc<dyn HttpTransport>,
}

impl core::fmt::Debug for TransportPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransportPolicy").finish()
    }
}

impl TransportPolicy {
    /// Creates the policy.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

impl HttpPolicy for TransportPolicy {
    fn send(
        &self,
        request: &mut HttpRequest<'_>,
        response: &mut HttpResponse<'_>,
        _next: NextPolicy<'_>,
    ) -> Result<()> {
        tracing::debug!(
            method = request.method().as_str(),
            url = %String::from_utf8_lossy(request.url()),
            "dispatching to transport"
        );
        self.transport.send(request, response)
    }
}
