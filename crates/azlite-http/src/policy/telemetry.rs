//! SDK telemetry (`User-Agent`) header.

use serde::{Deserialize, Serialize};

use azlite_core::error::Result;
use azlite_core::span::SpanWriter;

use crate::pipeline::{HttpPolicy, NextPolicy};
use crate::request::HttpRequest;
use crate::response::HttpResponse;

const USER_AGENT_BUF_SIZE: usize = 128;

/// Fields of the `azsdk-rs-<service>/<version> (<os>)` telemetry id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryOptions {
    /// Short service name, e.g. `keyvault`.
    pub service: String,
    /// Component version.
    pub version: String,
    /// Host OS identifier.
    pub os: String,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            service: "core".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            os: std::env::consts::OS.to_owned(),
        }
    }
}

/// Appends the `User-Agent` header built from [`TelemetryOptions`].
#[derive(Debug, Clone)]
pub struct TelemetryPolicy {
    options: TelemetryOptions,
}

impl TelemetryPolicy {
    /// Creates the policy.
    pub fn new(options: TelemetryOptions) -> Self {
        Self { options }
    }
}

impl HttpPolicy for TelemetryPolicy {
    fn send(
        &self,
        request: &mut HttpRequest<'_>,
        response: &mut HttpResponse<'_>,
        next: NextPolicy<'_>,
    ) -> Result<()> {
        let mut buf = [0u8; USER_AGENT_BUF_SIZE];
        let mut agent = SpanWriter::new(&mut buf);
        agent.copy_from(b"azsdk-rs-")?;
        agent.copy_from(self.options.service.as_bytes())?;
        agent.push_byte(b'/')?;
        agent.copy_from(self.options.version.as_bytes())?;
        agent.copy_from(b" (")?;
        agent.copy_from(self.options.os.as_bytes())?;
        agent.push_byte(b')')?;
        request.append_header(b"user-agent", agent.as_bytes())?;
        next.send(request, response)
    }
}
