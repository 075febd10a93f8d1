//! Hierarchical cancellation, deadlines and key/value lookup.
//!
//! A [`Context`] is a node in a tree rooted at the process-wide
//! [`Context::application`] singleton. Nodes are immutable after construction
//! except for cancellation, which writes the expiration atomically. The
//! effective expiration of a node is the minimum along its path to the root,
//! so cancelling an ancestor implicitly cancels every descendant.
//!
//! Reads are relaxed and deliberately racy: a stale read can only delay a
//! cancellation, never un-cancel an operation.

use core::any::Any;
use core::sync::atomic::{AtomicI64, Ordering};

use crate::error::{Error, Result};

/// A value that can be attached to a [`Context`] node.
pub type ContextValue = dyn Any + Send + Sync;

/// A node in the cancellation/deadline tree.
pub struct Context<'a> {
    parent: Option<&'a Context<'a>>,
    expiration_msec: AtomicI64,
    binding: Option<(&'static str, &'a ContextValue)>,
}

impl core::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("expiration_msec", &self.expiration_msec)
            .field("has_parent", &self.parent.is_some())
            .field("key", &self.binding.map(|(key, _)| key))
            .finish()
    }
}

static APPLICATION: Context<'static> = Context {
    parent: None,
    expiration_msec: AtomicI64::new(Context::NEVER),
    binding: None,
};

impl<'a> Context<'a> {
    /// Sentinel expiration meaning "never expires".
    pub const NEVER: i64 = i64::MAX;

    /// The process-wide root context. Cancelling it cancels every operation
    /// derived from it; intended for application shutdown.
    pub fn application() -> &'static Context<'static> {
        &APPLICATION
    }

    /// Creates a child that expires at `expiration_msec` (monotonic
    /// milliseconds), or earlier if an ancestor does.
    pub fn with_expiration(&'a self, expiration_msec: i64) -> Context<'a> {
        Context {
            parent: Some(self),
            expiration_msec: AtomicI64::new(expiration_msec),
            binding: None,
        }
    }

    /// Creates a child carrying a `(key, value)` binding.
    pub fn with_value(&'a self, key: &'static str, value: &'a ContextValue) -> Context<'a> {
        Context {
            parent: Some(self),
            expiration_msec: AtomicI64::new(Self::NEVER),
            binding: Some((key, value)),
        }
    }

    /// Cancels this node (and, transitively, every descendant) by moving its
    /// expiration into the past.
    pub fn cancel(&self) {
        self.expiration_msec.store(0, Ordering::Relaxed);
    }

    /// The effective expiration: the minimum along the path to the root.
    pub fn expiration(&self) -> i64 {
        let mut expiration = self.expiration_msec.load(Ordering::Relaxed);
        let mut node = self.parent;
        while let Some(ctx) = node {
            expiration = expiration.min(ctx.expiration_msec.load(Ordering::Relaxed));
            node = ctx.parent;
        }
        expiration
    }

    /// True when the effective expiration lies before `now_msec`.
    pub fn has_expired(&self, now_msec: i64) -> bool {
        self.expiration() < now_msec
    }

    /// Returns the value bound on the nearest node (self first, then
    /// ancestors) whose key equals `key`.
    pub fn value_of(&self, key: &str) -> Result<&'a ContextValue> {
        let mut node = Some(self);
        while let Some(ctx) = node {
            if let Some((k, v)) = ctx.binding
                && k == key
            {
                return Ok(v);
            }
            node = ctx.parent;
        }
        Err(Error::ItemNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_never_expires_by_default() {
        let app = Context::application();
        assert_eq!(app.expiration(), Context::NEVER);
        assert!(!app.has_expired(i64::MAX - 1));
    }

    #[test]
    fn descendant_expiration_is_min_over_path() {
        let app = Context::application();
        let parent = app.with_expiration(10_000);
        let child = parent.with_expiration(25_000);
        let grandchild = child.with_expiration(7_000);

        assert_eq!(parent.expiration(), 10_000);
        // The looser child deadline is capped by the parent's.
        assert_eq!(child.expiration(), 10_000);
        assert_eq!(grandchild.expiration(), 7_000);
        assert!(child.expiration() <= parent.expiration());
        assert!(grandchild.has_expired(7_001));
        assert!(!grandchild.has_expired(7_000));
    }

    #[test]
    fn cancelling_an_ancestor_cancels_descendants() {
        let app = Context::application();
        let parent = app.with_expiration(i64::MAX - 1);
        let child = parent.with_expiration(i64::MAX - 1);

        assert!(!child.has_expired(1));
        parent.cancel();
        assert_eq!(child.expiration(), 0);
        assert!(child.has_expired(1));
    }

    #[test]
    fn value_lookup_walks_parents_and_prefers_nearest() {
        let app = Context::application();
        let outer_value = 1u32;
        let inner_value = 2u32;
        let outer = app.with_value("retry-count", &outer_value);
        let middle = outer.with_expiration(Context::NEVER);
        let inner = middle.with_value("retry-count", &inner_value);

        let found = inner.value_of("retry-count").unwrap();
        assert_eq!(found.downcast_ref::<u32>(), Some(&2));

        let found = middle.value_of("retry-count").unwrap();
        assert_eq!(found.downcast_ref::<u32>(), Some(&1));

        assert_eq!(
            middle.value_of("missing").map(|_| ()),
            Err(Error::ItemNotFound)
        );
    }
}
