//! Exponential back-off with jitter, shared by the HTTP retry policy and the
//! MQTT connection state machine.

/// Recommended delay in milliseconds before retrying a failed operation.
///
/// The schedule doubles `min_retry_delay_msec` per attempt, adds the
/// caller-provided jitter, caps the sum at `max_retry_delay_msec`, then
/// credits the time the failed operation already consumed:
///
/// `clamp(min(min_delay * 2^attempt + jitter, max_delay) - operation_msec, 0, i32::MAX)`
///
/// `random_jitter_msec` is expected to be drawn uniformly from
/// `[0, max_jitter)` by the caller so the schedule stays testable.
/// Intermediate math saturates at 64 bits, so large attempt counts settle at
/// the cap instead of wrapping.
pub fn calculate_retry_delay(
    operation_msec: i32,
    attempt: i16,
    min_retry_delay_msec: i32,
    max_retry_delay_msec: i32,
    random_jitter_msec: i32,
) -> i32 {
    let backoff = if attempt >= 32 {
        i64::MAX
    } else {
        (i64::from(min_retry_delay_msec)) << attempt.max(0)
    };
    let delay = backoff
        .saturating_add(i64::from(random_jitter_msec))
        .min(i64::from(max_retry_delay_msec));
    delay
        .saturating_sub(i64::from(operation_msec))
        .clamp(0, i64::from(i32::MAX)) as i32
}
