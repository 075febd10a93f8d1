//! Applies a credential to the outbound request.

use std::sync::Arc;

use azlite_core::error::Result;

use crate::credential::TokenCredential;
use crate::pipeline::{HttpPolicy, NextPolicy};
use crate::request::HttpRequest;
use crate::response::{HttpResponse, status_code_of};

/// Delegates to [`TokenCredential::apply`] before forwarding.
///
/// A `401 Unauthorized` received with a token that was still fresh at send
/// time means the cache is stale (revocation, clock skew): the policy
/// invalidates the cache, strips the headers it appended, and repeats
/// exactly once.
pub struct CredentialPolicy {
    credential: Arc<dyn TokenCredential>,
}

impl core::fmt::Debug for CredentialPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CredentialPolicy").finish()
    }
}

impl CredentialPolicy {
    /// Creates the policy.
    pub fn new(credential: Arc<dyn TokenCredential>) -> Self {
        Self { credential }
    }
}

impl HttpPolicy for CredentialPolicy {
    fn send(
        &self,
        request: &mut HttpRequest<'_>,
        response: &mut HttpResponse<'_>,
        next: NextPolicy<'_>,
    ) -> Result<()> {
        let before_auth = request.headers_watermark();
        let applied = self.credential.apply(request)?;
        next.send(request, response)?;

        let unauthorized = status_code_of(response).map(|s| s == 401).unwrap_or(false);
        if unauthorized && !applied.refreshed {
            tracing::debug!("401 with a cached token; refreshing and repeating once");
            self.credential.invalidate();
            request.truncate_headers(before_auth);
            response.clear();
            self.credential.apply(request)?;
            return next.send(request, response);
        }
        Ok(())
    }
}
