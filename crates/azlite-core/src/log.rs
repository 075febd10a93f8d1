//! Classification-tagged logging.
//!
//! The application registers one listener and a bit-flag filter at startup;
//! the SDK formats a message only when its classification bit is enabled, so
//! the disabled path costs a single atomic load. Messages are byte spans
//! formatted into caller-scope buffers; the listener must not retain them.

use core::ops::BitOr;
use core::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

/// A single log classification bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification(u32);

impl Classification {
    /// An outbound HTTP request is about to be sent.
    pub const HTTP_REQUEST: Classification = Classification(1 << 0);
    /// An HTTP response was received.
    pub const HTTP_RESPONSE: Classification = Classification(1 << 1);
    /// The HTTP retry policy is about to back off.
    pub const HTTP_RETRY: Classification = Classification(1 << 2);
    /// MQTT connection lifecycle.
    pub const MQTT_CONNECT: Classification = Classification(1 << 3);
    /// MQTT disconnection lifecycle.
    pub const MQTT_DISCONNECT: Classification = Classification(1 << 4);
    /// MQTT publish traffic.
    pub const MQTT_PUB: Classification = Classification(1 << 5);
    /// MQTT subscribe traffic.
    pub const MQTT_SUB: Classification = Classification(1 << 6);

    /// The raw bit value.
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for Classification {
    type Output = Classification;

    fn bitor(self, rhs: Classification) -> Classification {
        Classification(self.0 | rhs.0)
    }
}

/// The application-provided log sink.
pub type Listener = fn(Classification, &[u8]);

static FILTER: AtomicU32 = AtomicU32::new(u32::MAX);
static LISTENER: RwLock<Option<Listener>> = RwLock::new(None);

/// Installs (or clears) the process-wide listener. Call once at startup.
pub fn set_listener(listener: Option<Listener>) {
    *LISTENER.write() = listener;
}

/// Restricts logging to the classifications whose bits are set in `filter`.
/// The default filter enables everything.
pub fn set_filter(filter: Classification) {
    FILTER.store(filter.bits(), Ordering::Relaxed);
}

/// Re-enables every classification.
pub fn clear_filter() {
    FILTER.store(u32::MAX, Ordering::Relaxed);
}

/// True when a listener is installed and `classification` passes the filter.
/// Callers use this to skip message formatting entirely.
pub fn should_write(classification: Classification) -> bool {
    FILTER.load(Ordering::Relaxed) & classification.bits() != 0 && LISTENER.read().is_some()
}

/// Delivers `message` to the listener if `classification` is enabled.
pub fn write(classification: Classification, message: &[u8]) {
    if FILTER.load(Ordering::Relaxed) & classification.bits() == 0 {
        return;
    }
    if let Some(listener) = *LISTENER.read() {
        listener(classification, message);
    }
}
