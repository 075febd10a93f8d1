//! The host platform port.
//!
//! Everything the SDK needs from its host is behind [`Platform`]: a monotonic
//! clock, sleep, uniform randomness (retry jitter), one-shot timers and a
//! critical-error hook for contract violations that cannot be reported
//! through a return value. Pipelines hold the port as `Arc<dyn Platform>` so
//! constrained targets can supply their own implementation.
//!
//! [`StdPlatform`] implements the port for hosted targets.

use std::boxed::Box;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Services the SDK consumes from the host.
///
/// Contract: `clock_msec` is monotonic and wraps only at `2^63`; timer
/// callbacks may run on any thread; `critical_error` never returns.
pub trait Platform: Send + Sync {
    /// Monotonic milliseconds since an arbitrary epoch.
    fn clock_msec(&self) -> i64;

    /// Blocks the calling thread for `msec` milliseconds.
    fn sleep_msec(&self, msec: i64);

    /// A uniformly distributed random value.
    fn random(&self) -> u32;

    /// Invoked when an invariant is broken and no caller can be told.
    fn critical_error(&self) -> !;

    /// Schedules `callback` to run once after `delay_msec` milliseconds,
    /// possibly on another thread. Dropping the returned handle cancels a
    /// pending callback.
    fn start_timer(&self, delay_msec: i64, callback: Box<dyn FnOnce() + Send>) -> PlatformTimer;
}

/// Cancellation handle for a one-shot timer.
#[derive(Debug)]
pub struct PlatformTimer {
    cancelled: Arc<AtomicBool>,
}

impl PlatformTimer {
    /// Creates a handle sharing `cancelled` with the timer thread.
    pub fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self { cancelled }
    }

    /// Cancels the callback if it has not fired yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl Drop for PlatformTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Hosted implementation of [`Platform`] on `std` threads and
/// `std::time::Instant`.
#[derive(Debug)]
pub struct StdPlatform {
    start: std::time::Instant,
}

impl Default for StdPlatform {
    fn default() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl StdPlatform {
    /// Creates a platform whose clock starts at zero.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Timer threads poll the cancellation flag at this granularity so a
/// cancelled long timer does not pin a thread for its full delay.
const TIMER_POLL_MSEC: u64 = 50;

impl Platform for StdPlatform {
    fn clock_msec(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }

    fn sleep_msec(&self, msec: i64) {
        if msec > 0 {
            std::thread::sleep(std::time::Duration::from_millis(msec as u64));
        }
    }

    fn random(&self) -> u32 {
        fastrand::u32(..)
    }

    fn critical_error(&self) -> ! {
        panic!("azlite: critical platform error - unhandled pipeline event");
    }

    fn start_timer(&self, delay_msec: i64, callback: Box<dyn FnOnce() + Send>) -> PlatformTimer {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        std::thread::spawn(move || {
            let mut remaining = delay_msec.max(0) as u64;
            while remaining > 0 {
                if flag.load(Ordering::Acquire) {
                    return;
                }
                let chunk = remaining.min(TIMER_POLL_MSEC);
                std::thread::sleep(std::time::Duration::from_millis(chunk));
                remaining -= chunk;
            }
            if !flag.load(Ordering::Acquire) {
                callback();
            }
        });
        PlatformTimer::new(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic() {
        let platform = StdPlatform::new();
        let a = platform.clock_msec();
        platform.sleep_msec(5);
        let b = platform.clock_msec();
        assert!(b >= a);
    }

    #[test]
    fn timer_fires_once() {
        let platform = StdPlatform::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let _timer = platform.start_timer(
            10,
            Box::new(move || {
                flag.store(true, Ordering::Release);
            }),
        );
        // Keep the handle alive past the deadline.
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(fired.load(Ordering::Acquire));
    }

    #[test]
    fn dropped_timer_does_not_fire() {
        let platform = StdPlatform::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let timer = platform.start_timer(
            100,
            Box::new(move || {
                flag.store(true, Ordering::Release);
            }),
        );
        drop(timer);
        std::thread::sleep(std::time::Duration::from_millis(250));
        assert!(!fired.load(Ordering::Acquire));
    }
}
