//! Service API version injection.

use serde::{Deserialize, Serialize};

use azlite_core::error::Result;

use crate::pipeline::{HttpPolicy, NextPolicy};
use crate::request::HttpRequest;
use crate::response::HttpResponse;

/// Where the service expects its API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiVersionLocation {
    /// As a request header.
    Header,
    /// As a query parameter.
    QueryParameter,
}

/// Name, value and placement of the API version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiVersionOptions {
    /// Header or query parameter name, e.g. `api-version`.
    pub name: String,
    /// Version value, e.g. `7.0`.
    pub version: String,
    /// Placement discriminator.
    pub location: ApiVersionLocation,
}

/// Appends the API version per the option's discriminator.
#[derive(Debug, Clone)]
pub struct ApiVersionPolicy {
    options: ApiVersionOptions,
}

impl ApiVersionPolicy {
    /// Creates the policy.
    pub fn new(options: ApiVersionOptions) -> Self {
        Self { options }
    }
}

impl HttpPolicy for ApiVersionPolicy {
    fn send(
        &self,
        request: &mut HttpRequest<'_>,
        response: &mut HttpResponse<'_>,
        next: NextPolicy<'_>,
    ) -> Result<()> {
        match self.options.location {
            ApiVersionLocation::Header => {
                request.append_header(
                    self.options.name.as_bytes(),
                    self.options.version.as_bytes(),
                )?;
            }
            ApiVersionLocation::QueryParameter => {
                request.set_query_parameter(
                    self.options.name.as_bytes(),
                    self.options.version.as_bytes(),
                )?;
            }
        }
        next.send(request, response)
    }
}
