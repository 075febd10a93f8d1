//! Request/response logging through the classification listener.

use std::sync::Arc;

use azlite_core::error::Result;
use azlite_core::log::{self, Classification};
use azlite_core::platform::Platform;
use azlite_core::span::SpanWriter;

use crate::pipeline::{HttpPolicy, NextPolicy};
use crate::request::HttpRequest;
use crate::response::{HttpResponse, ResponseParser};

const LOG_BUF_SIZE: usize = 1024;

/// Header values longer than this are logged as prefix + " ... " + suffix.
const MAX_LOGGED_VALUE: usize = 50;
const LOGGED_AFFIX: usize = 22;

/// Formats outbound requests (`HTTP_REQUEST`) and their responses
/// (`HTTP_RESPONSE`, with elapsed milliseconds) for the registered log
/// listener. Formatting is skipped entirely when the classification is
/// filtered out.
pub struct LoggingPolicy {
    platform: Arc<dyn Platform>,
}

impl core::fmt::Debug for LoggingPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoggingPolicy").finish()
    }
}

impl LoggingPolicy {
    /// Creates the policy.
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }
}

/// Long header values are elided to a 22-byte prefix and suffix.
fn append_logged_value(message: &mut SpanWriter<'_>, value: &[u8]) {
    if value.len() <= MAX_LOGGED_VALUE {
        let _ = message.copy_from(value);
    } else {
        let _ = message.copy_from(&value[..LOGGED_AFFIX]);
        let _ = message.copy_from(b" ... ");
        let _ = message.copy_from(&value[value.len() - LOGGED_AFFIX..]);
    }
}

fn append_request(message: &mut SpanWriter<'_>, request: &HttpRequest<'_>) {
    let _ = message.copy_from(b"HTTP Request : ");
    let _ = message.copy_from(request.method().as_str().as_bytes());
    let _ = message.push_byte(b' ');
    let _ = message.copy_from(request.url());
    for index in 0..request.headers_count() {
        let Ok((name, value)) = request.header_at(index) else {
            break;
        };
        let _ = message.copy_from(b"\n\t");
        let _ = message.copy_from(name);
        let _ = message.copy_from(b" : ");
        append_logged_value(message, value);
    }
}

fn append_response(
    message: &mut SpanWriter<'_>,
    elapsed_msec: i64,
    response: &HttpResponse<'_>,
    request: &HttpRequest<'_>,
) {
    let _ = message.copy_from(b"HTTP Response (");
    let _ = message.append_i64(elapsed_msec);
    let _ = message.copy_from(b"ms) : ");

    let mut parser = ResponseParser::new(response);
    if let Ok(status) = parser.status_line() {
        let _ = message.append_u32(u32::from(status.status_code));
        let _ = message.push_byte(b' ');
        let _ = message.copy_from(status.reason_phrase);
        while let Ok((name, value)) = parser.next_header() {
            let _ = message.copy_from(b"\n\t");
            let _ = message.copy_from(name);
            let _ = message.copy_from(b" : ");
            append_logged_value(message, value);
        }
    }

    let _ = message.copy_from(b"\n\n -> ");
    append_request(message, request);
}

impl HttpPolicy for LoggingPolicy {
    fn send(
        &self,
        request: &mut HttpRequest<'_>,
        response: &mut HttpResponse<'_>,
        next: NextPolicy<'_>,
    ) -> Result<()> {
        if log::should_write(Classification::HTTP_REQUEST) {
            let mut buf = [0u8; LOG_BUF_SIZE];
            let mut message = SpanWriter::new(&mut buf);
            append_request(&mut message, request);
            log::write(Classification::HTTP_REQUEST, message.as_bytes());
        }

        let started = self.platform.clock_msec();
        let result = next.send(request, response);
        if result.is_ok() && log::should_write(Classification::HTTP_RESPONSE) {
            let elapsed = self.platform.clock_msec() - started;
            let mut buf = [0u8; LOG_BUF_SIZE];
            let mut message = SpanWriter::new(&mut buf);
            append_response(&mut message, elapsed, response, request);
            log::write(Classification::HTTP_RESPONSE, message.as_bytes());
        }
        result
    }
}
