//! Cached access tokens.
//!
//! A [`Token`] is a fixed 2 KiB byte array (the wire-ready `Bearer ...`
//! header value) plus an absolute expiry on the platform's monotonic clock.
//! [`TokenCache`] guards one token with the reader/writer spinlock and moves
//! whole copies in and out, so neither lock is ever held across I/O.

use azlite_core::error::{Error, Result};
use azlite_core::spinlock::RwSpinLock;

/// Maximum encoded token size in bytes.
pub const TOKEN_BUF_SIZE: usize = 2048;

/// A wire-ready authorization token with an expiry.
#[derive(Clone)]
pub struct Token {
    bytes: [u8; TOKEN_BUF_SIZE],
    len: u16,
    expires_at_msec: i64,
}

impl core::fmt::Debug for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Token bytes are credentials; never log them.
        f.debug_struct("Token")
            .field("len", &self.len)
            .field("expires_at_msec", &self.expires_at_msec)
            .finish()
    }
}

impl Default for Token {
    fn default() -> Self {
        Self {
            bytes: [0u8; TOKEN_BUF_SIZE],
            len: 0,
            expires_at_msec: 0,
        }
    }
}

impl Token {
    /// Builds a token from its encoded bytes and absolute expiry.
    pub fn new(encoded: &[u8], expires_at_msec: i64) -> Result<Self> {
        if encoded.len() > TOKEN_BUF_SIZE {
            return Err(Error::InsufficientSpanSize);
        }
        let mut token = Self {
            bytes: [0u8; TOKEN_BUF_SIZE],
            len: encoded.len() as u16,
            expires_at_msec,
        };
        token.bytes[..encoded.len()].copy_from_slice(encoded);
        Ok(token)
    }

    /// The encoded token bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    /// Absolute expiry in monotonic milliseconds.
    pub fn expires_at_msec(&self) -> i64 {
        self.expires_at_msec
    }

    /// A token is expired when it was never set, or its expiry has passed.
    pub fn is_expired(&self, now_msec: i64) -> bool {
        self.expires_at_msec <= 0 || self.expires_at_msec < now_msec
    }
}

/// Spinlock-guarded token slot shared between the credential policy and the
/// refresh path.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: RwSpinLock<Token>,
}

impl TokenCache {
    /// Creates a cache holding an expired (empty) token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the cached token out under the reader lock. The caller may
    /// use the copy freely without holding any lock.
    pub fn get(&self) -> Token {
        self.slot.read().clone()
    }

    /// Replaces the cached token under the writer lock. Concurrent
    /// refreshers serialize here; the last writer wins, which is idempotent
    /// because both acquired the same token.
    pub fn set(&self, token: Token) {
        *self.slot.write() = token;
    }

    /// Drops the cached token so the next `get` observes an expired one.
    pub fn invalidate(&self) {
        *self.slot.write() = Token::default();
    }
}
