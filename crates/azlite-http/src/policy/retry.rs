//! Transparent retries with exponential back-off.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use azlite_core::error::{Error, Result};
use azlite_core::log::{self, Classification};
use azlite_core::platform::Platform;
use azlite_core::retry::calculate_retry_delay;
use azlite_core::span::SpanWriter;

use crate::pipeline::{HttpPolicy, NextPolicy};
use crate::request::HttpRequest;
use crate::response::{HttpResponse, status_code_of};

/// HTTP status codes worth retrying.
const RETRIABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Sleep granularity, so a cancelled context is noticed mid-back-off.
const SLEEP_CHUNK_MSEC: i64 = 250;

/// Retry policy tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Total attempts before the last result is surfaced.
    pub max_tries: i16,
    /// Base delay doubled per attempt.
    pub retry_delay_msec: i32,
    /// Ceiling for the computed delay.
    pub max_retry_delay_msec: i32,
    /// Upper bound (exclusive) for the random jitter added per attempt.
    pub max_random_jitter_msec: i32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_tries: 4,
            retry_delay_msec: 4_000,
            max_retry_delay_msec: 120_000,
            max_random_jitter_msec: 4_000,
        }
    }
}

/// Retries transient failures: retriable statuses and transport errors
/// tagged as transient. Restores the request's retry headers and resets the
/// response buffer between attempts; cancellation preempts the back-off
/// sleep.
pub struct RetryPolicy {
    platform: Arc<dyn Platform>,
    options: RetryOptions,
}

impl core::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("options", &self.options)
            .finish()
    }
}

impl RetryPolicy {
    /// Creates the policy.
    pub fn new(platform: Arc<dyn Platform>, options: RetryOptions) -> Self {
        Self { platform, options }
    }

    fn sleep_with_cancellation(&self, request: &HttpRequest<'_>, delay_msec: i32) -> Result<()> {
        let mut remaining = i64::from(delay_msec);
        while remaining > 0 {
            if request.context().has_expired(self.platform.clock_msec()) {
                return Err(Error::Canceled);
            }
            let chunk = remaining.min(SLEEP_CHUNK_MSEC);
            self.platform.sleep_msec(chunk);
            remaining -= chunk;
        }
        Ok(())
    }
}

/// Transport failures the retry policy treats as transient.
fn is_retriable_error(error: Error) -> bool {
    matches!(
        error,
        Error::HttpAdapter | Error::HttpResponseCouldntResolveHost
    )
}

impl HttpPolicy for RetryPolicy {
    fn send(
        &self,
        request: &mut HttpRequest<'_>,
        response: &mut HttpResponse<'_>,
        next: NextPolicy<'_>,
    ) -> Result<()> {
        request.mark_retry_headers_start();
        let mut tries: i16 = 0;

        loop {
            if request.context().has_expired(self.platform.clock_msec()) {
                return Err(Error::Canceled);
            }

            let started = self.platform.clock_msec();
            let result = next.send(request, response);
            tries += 1;

            let retriable = match &result {
                Ok(()) => status_code_of(response)
                    .map(|status| RETRIABLE_STATUSES.contains(&status))
                    .unwrap_or(false),
                Err(error) => is_retriable_error(*error),
            };
            if !retriable || tries >= self.options.max_tries {
                return result;
            }

            let operation_msec =
                (self.platform.clock_msec() - started).clamp(0, i64::from(i32::MAX)) as i32;
            let jitter_msec = if self.options.max_random_jitter_msec > 0 {
                (self.platform.random() % self.options.max_random_jitter_msec as u32) as i32
            } else {
                0
            };
            let delay_msec = calculate_retry_delay(
                operation_msec,
                tries,
                self.options.retry_delay_msec,
                self.options.max_retry_delay_msec,
                jitter_msec,
            );

            tracing::debug!(attempt = tries, delay_msec, "retrying request");
            if log::should_write(Classification::HTTP_RETRY) {
                let mut buf = [0u8; 64];
                let mut message = SpanWriter::new(&mut buf);
                let _ = message.copy_from(b"HTTP Retry attempt #");
                let _ = message.append_i32(i32::from(tries) + 1);
                let _ = message.copy_from(b" will be made in ");
                let _ = message.append_i32(delay_msec);
                let _ = message.copy_from(b"ms.");
                log::write(Classification::HTTP_RETRY, message.as_bytes());
            }

            self.sleep_with_cancellation(request, delay_msec)?;
            request.remove_retry_headers();
            response.clear();
        }
    }
}
