//! The consumed HTTP transport seam.
//!
//! The SDK never performs socket I/O itself: the host supplies one
//! [`HttpTransport`] that sends a prepared [`HttpRequest`] and fills the
//! [`HttpResponse`] buffer via its `append` primitive. Adapters classify
//! their host errors through [`TransportError`] so the retry policy can tell
//! transient failures from fatal ones.

use azlite_core::error::Error;

use crate::request::HttpRequest;
use crate::response::HttpResponse;

/// Sends one request and fills `response` with the raw wire bytes.
pub trait HttpTransport: Send + Sync {
    /// Contract: on success the full response (status line, headers, body)
    /// is in `response`. Failure codes: `HttpResponseOverflow` when the
    /// response does not fit, `HttpResponseCouldntResolveHost` for DNS
    /// failures, `HttpAdapter` for anything else.
    fn send(
        &self,
        request: &HttpRequest<'_>,
        response: &mut HttpResponse<'_>,
    ) -> azlite_core::error::Result<()>;
}

/// Classified transport failure, for adapter implementations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host name could not be resolved.
    #[error("could not resolve host")]
    CouldntResolveHost,
    /// The response exceeded the caller's response buffer.
    #[error("response buffer too small")]
    ResponseOverflow,
    /// Any other host I/O failure.
    #[error("transport failure: {0}")]
    Adapter(String),
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::CouldntResolveHost => Error::HttpResponseCouldntResolveHost,
            TransportError::ResponseOverflow => Error::HttpResponseOverflow,
            TransportError::Adapter(_) => Error::HttpAdapter,
        }
    }
}
