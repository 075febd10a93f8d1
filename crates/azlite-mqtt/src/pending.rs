//! In-flight request tracking.
//!
//! Higher-level codecs tie MQTT PUBACKs and response publishes back to the
//! request that caused them through this table: each entry holds the
//! request's correlation id, a deadline context derived from the application
//! context, and - once the transport assigned one - the packet id of the
//! request PUBLISH. The table is bounded and scanned linearly; it lives
//! inside the pipeline, so the pipeline mutex is its only synchronization.

use bytes::Bytes;

use azlite_core::context::Context;
use azlite_core::error::{Error, Result};

/// Default number of requests that may be in flight at once.
pub const DEFAULT_PENDING_CAPACITY: usize = 5;

/// One in-flight request.
#[derive(Debug)]
pub struct PendingRequest {
    correlation_id: Bytes,
    context: Context<'static>,
    message_id: Option<u16>,
}

impl PendingRequest {
    /// The request's correlation id.
    pub fn correlation_id(&self) -> &[u8] {
        &self.correlation_id
    }

    /// The deadline context governing this request.
    pub fn context(&self) -> &Context<'static> {
        &self.context
    }

    /// The packet id of the request PUBLISH, once known.
    pub fn message_id(&self) -> Option<u16> {
        self.message_id
    }
}

/// Bounded table of in-flight requests.
#[derive(Debug)]
pub struct PendingRequests {
    entries: Vec<PendingRequest>,
    capacity: usize,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_CAPACITY)
    }
}

impl PendingRequests {
    /// Creates a table bounded at `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Tracks a new request with deadline `now_msec + timeout_msec`. Fails
    /// with [`Error::OutOfMemory`] when the table is full and
    /// [`Error::InvalidArg`] when the correlation id is already tracked.
    pub fn add(&mut self, correlation_id: Bytes, now_msec: i64, timeout_msec: i64) -> Result<()> {
        if self.entries.len() >= self.capacity {
            return Err(Error::OutOfMemory);
        }
        if self.find_by_correlation_id(&correlation_id).is_some() {
            return Err(Error::InvalidArg);
        }
        let context = Context::application().with_expiration(now_msec.saturating_add(timeout_msec));
        self.entries.insert(
            0,
            PendingRequest {
                correlation_id,
                context,
                message_id: None,
            },
        );
        Ok(())
    }

    /// Stops tracking and returns the request with `correlation_id`.
    pub fn remove(&mut self, correlation_id: &[u8]) -> Result<PendingRequest> {
        match self
            .entries
            .iter()
            .position(|entry| entry.correlation_id == correlation_id)
        {
            Some(index) => Ok(self.entries.remove(index)),
            None => Err(Error::ItemNotFound),
        }
    }

    /// Looks a request up by correlation id.
    pub fn find_by_correlation_id(&self, correlation_id: &[u8]) -> Option<&PendingRequest> {
        self.entries
            .iter()
            .find(|entry| entry.correlation_id == correlation_id)
    }

    /// Looks a request up by the packet id of its request PUBLISH.
    pub fn find_by_message_id(&self, message_id: u16) -> Option<&PendingRequest> {
        self.entries
            .iter()
            .find(|entry| entry.message_id == Some(message_id))
    }

    /// Binds the transport-assigned packet id to a tracked request.
    pub fn set_message_id(&mut self, correlation_id: &[u8], message_id: u16) -> Result<()> {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.correlation_id == correlation_id)
        {
            Some(entry) => {
                entry.message_id = Some(message_id);
                Ok(())
            }
            None => Err(Error::ItemNotFound),
        }
    }

    /// The first request whose deadline lies before `now_msec`.
    pub fn first_expired(&self, now_msec: i64) -> Option<&PendingRequest> {
        self.entries
            .iter()
            .find(|entry| entry.context.has_expired(now_msec))
    }

    /// Number of tracked requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_find_remove() {
        let mut table = PendingRequests::default();
        table.add(Bytes::from_static(b"corr-1"), 1_000, 10_000).unwrap();
        table.add(Bytes::from_static(b"corr-2"), 1_000, 10_000).unwrap();

        assert_eq!(table.len(), 2);
        assert!(table.find_by_correlation_id(b"corr-1").is_some());
        assert!(table.find_by_correlation_id(b"corr-3").is_none());

        let removed = table.remove(b"corr-1").unwrap();
        assert_eq!(removed.correlation_id(), b"corr-1");
        assert_eq!(table.remove(b"corr-1").map(|_| ()), Err(Error::ItemNotFound));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn duplicate_correlation_ids_are_rejected() {
        let mut table = PendingRequests::default();
        table.add(Bytes::from_static(b"corr"), 0, 1_000).unwrap();
        assert_eq!(
            table.add(Bytes::from_static(b"corr"), 0, 1_000),
            Err(Error::InvalidArg)
        );
    }

    #[test]
    fn capacity_is_enforced() {
        let mut table = PendingRequests::new(2);
        table.add(Bytes::from_static(b"a"), 0, 1_000).unwrap();
        table.add(Bytes::from_static(b"b"), 0, 1_000).unwrap();
        assert_eq!(
            table.add(Bytes::from_static(b"c"), 0, 1_000),
            Err(Error::OutOfMemory)
        );
    }

    #[test]
    fn message_id_binding_and_lookup() {
        let mut table = PendingRequests::default();
        table.add(Bytes::from_static(b"corr"), 0, 1_000).unwrap();
        assert!(table.find_by_message_id(7).is_none());

        table.set_message_id(b"corr", 7).unwrap();
        assert_eq!(
            table.find_by_message_id(7).unwrap().correlation_id(),
            b"corr"
        );
        assert_eq!(table.set_message_id(b"other", 8), Err(Error::ItemNotFound));
    }

    #[test]
    fn expiry_uses_the_derived_deadline() {
        let mut table = PendingRequests::default();
        table.add(Bytes::from_static(b"slow"), 1_000, 500).unwrap();
        table.add(Bytes::from_static(b"fast"), 1_000, 5_000).unwrap();

        assert!(table.first_expired(1_400).is_none());
        let expired = table.first_expired(1_501).unwrap();
        assert_eq!(expired.correlation_id(), b"slow");
    }
}
