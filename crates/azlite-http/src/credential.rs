//! Credentials that attach authentication to outbound requests.
//!
//! A credential is a capability: [`TokenCredential::apply`] mutates an
//! outbound request (typically by appending `authorization: Bearer <token>`)
//! and reports whether it had to refresh. [`ClientSecretCredential`]
//! implements the AAD OAuth2 client-credentials flow over its own private
//! HTTP pipeline, caching the token behind the spinlock-guarded
//! [`TokenCache`](crate::token::TokenCache). Locks are never held across the
//! token request.

use std::sync::Arc;

use serde::Deserialize;

use azlite_core::context::Context;
use azlite_core::error::{Error, Result};
use azlite_core::platform::Platform;
use azlite_core::span::SpanWriter;
use azlite_core::spinlock::RwSpinLock;

use crate::pipeline::HttpPipeline;
use crate::policy::logging::LoggingPolicy;
use crate::policy::retry::{RetryOptions, RetryPolicy};
use crate::policy::transport::TransportPolicy;
use crate::request::{HttpMethod, HttpRequest};
use crate::response::{HttpResponse, ResponseParser};
use crate::token::{Token, TokenCache};
use crate::transport::HttpTransport;

/// Result of applying a credential to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedToken {
    /// True when the credential had to acquire a fresh token for this call;
    /// false when a cached, unexpired token was used.
    pub refreshed: bool,
}

/// A capability that authenticates outbound requests.
pub trait TokenCredential: Send + Sync {
    /// Mutates `request` to carry authentication.
    fn apply(&self, request: &mut HttpRequest<'_>) -> Result<AppliedToken>;

    /// Drops any cached token so the next `apply` refreshes.
    fn invalidate(&self) {}

    /// Replaces the resource scopes the credential requests tokens for.
    fn set_scopes(&self, scopes: &str) -> Result<()> {
        let _ = scopes;
        Err(Error::NotSupported)
    }
}

/// The no-op credential for services that accept unauthenticated requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousCredential;

impl TokenCredential for AnonymousCredential {
    fn apply(&self, _request: &mut HttpRequest<'_>) -> Result<AppliedToken> {
        Ok(AppliedToken { refreshed: false })
    }
}

const AAD_URL_BUF_SIZE: usize = 2048;
const AAD_BODY_BUF_SIZE: usize = 1024;
const AAD_HEADERS_BUF_SIZE: usize = 10 * 64;
const AAD_RESPONSE_BUF_SIZE: usize = 3072;

const AUTH_HEADER_NAME: &[u8] = b"authorization";
const BEARER_PREFIX: &[u8] = b"Bearer ";

#[derive(Debug, Deserialize)]
struct AadTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// AAD client-secret credential (OAuth2 client-credentials grant).
pub struct ClientSecretCredential {
    platform: Arc<dyn Platform>,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    scopes: RwSpinLock<String>,
    cache: TokenCache,
    token_pipeline: HttpPipeline,
}

impl core::fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl ClientSecretCredential {
    /// Creates a credential for `tenant_id`/`client_id`. Token requests go
    /// through `transport` on a private retry + logging pipeline.
    pub fn new(
        platform: Arc<dyn Platform>,
        transport: Arc<dyn HttpTransport>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let token_pipeline = HttpPipeline::from_policies(vec![
            Arc::new(RetryPolicy::new(
                Arc::clone(&platform),
                RetryOptions::default(),
            )),
            Arc::new(LoggingPolicy::new(Arc::clone(&platform))),
            Arc::new(TransportPolicy::new(transport)),
        ]);
        Self {
            platform,
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: RwSpinLock::new(String::new()),
            cache: TokenCache::new(),
            token_pipeline,
        }
    }

    /// Acquires a token from the AAD token endpoint.
    fn request_token(&self, context: &Context<'_>) -> Result<Token> {
        let mut url_buf = [0u8; AAD_URL_BUF_SIZE];
        let url_len = {
            let mut url = SpanWriter::new(&mut url_buf);
            url.copy_from(b"https://login.microsoftonline.com/")?;
            url.url_encode(self.tenant_id.as_bytes())?;
            url.copy_from(b"/oauth2/token")?;
            url.len()
        };

        let mut body_buf = [0u8; AAD_BODY_BUF_SIZE];
        let body_len = {
            let mut body = SpanWriter::new(&mut body_buf);
            body.copy_from(b"grant_type=client_credentials&client_id=")?;
            body.url_encode(self.client_id.as_bytes())?;
            body.copy_from(b"&client_secret=")?;
            body.url_encode(self.client_secret.as_bytes())?;
            body.copy_from(b"&resource=")?;
            body.url_encode(self.scopes.read().as_bytes())?;
            body.len()
        };

        let mut request_url_buf = [0u8; AAD_URL_BUF_SIZE];
        let mut headers_buf = [0u8; AAD_HEADERS_BUF_SIZE];
        let mut request = HttpRequest::new(
            context,
            HttpMethod::POST,
            &mut request_url_buf,
            &url_buf[..url_len],
            &mut headers_buf,
            &body_buf[..body_len],
        )?;
        request.append_header(b"content-type", b"application/x-www-form-urlencoded")?;

        let mut response_buf = [0u8; AAD_RESPONSE_BUF_SIZE];
        let mut response = HttpResponse::new(&mut response_buf);
        self.token_pipeline.send(&mut request, &mut response)?;

        let mut parser = ResponseParser::new(&response);
        let status = parser.status_line()?;
        if status.status_code != 200 {
            tracing::warn!(status = status.status_code, "token endpoint refused request");
            return Err(Error::HttpAuthenticationFailed);
        }
        loop {
            match parser.next_header() {
                Ok(_) => {}
                Err(Error::HttpEndOfHeaders) => break,
                Err(other) => return Err(other),
            }
        }
        let parsed: AadTokenResponse =
            serde_json::from_slice(parser.body()).map_err(|_| Error::JsonInvalidState)?;

        let mut token_buf = [0u8; crate::token::TOKEN_BUF_SIZE];
        let token_len = {
            let mut token = SpanWriter::new(&mut token_buf);
            token.copy_from(BEARER_PREFIX)?;
            token.copy_from(parsed.access_token.as_bytes())?;
            token.len()
        };
        Token::new(
            &token_buf[..token_len],
            self.platform
                .clock_msec()
                .saturating_add(parsed.expires_in.saturating_mul(1000)),
        )
    }
}

impl TokenCredential for ClientSecretCredential {
    fn apply(&self, request: &mut HttpRequest<'_>) -> Result<AppliedToken> {
        let mut token = self.cache.get();
        let refreshed = token.is_expired(self.platform.clock_msec());
        if refreshed {
            token = self.request_token(request.context())?;
            self.cache.set(token.clone());
        }
        request.append_header(AUTH_HEADER_NAME, token.as_bytes())?;
        Ok(AppliedToken { refreshed })
    }

    fn invalidate(&self) {
        self.cache.invalidate();
    }

    fn set_scopes(&self, scopes: &str) -> Result<()> {
        *self.scopes.write() = scopes.to_owned();
        Ok(())
    }
}
