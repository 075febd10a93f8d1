//! Per-call unique request id.

use azlite_core::error::Result;

use crate::pipeline::{HttpPolicy, NextPolicy};
use crate::request::HttpRequest;
use crate::response::HttpResponse;

const REQUEST_ID_HEADER: &[u8] = b"x-ms-client-request-id";

/// Appends a random `x-ms-client-request-id` header (16 random bytes as 32
/// hex characters) so a call can be correlated with service-side logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdPolicy;

impl RequestIdPolicy {
    /// Creates the policy.
    pub fn new() -> Self {
        Self
    }
}

impl HttpPolicy for RequestIdPolicy {
    fn send(
        &self,
        request: &mut HttpRequest<'_>,
        response: &mut HttpResponse<'_>,
        next: NextPolicy<'_>,
    ) -> Result<()> {
        let id = uuid::Uuid::new_v4();
        let mut hex = [0u8; 32];
        let encoded = id.as_simple().encode_lower(&mut hex);
        request.append_header(REQUEST_ID_HEADER, encoded.as_bytes())?;
        next.send(request, response)
    }
}
