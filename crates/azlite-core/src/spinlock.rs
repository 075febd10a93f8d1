//! Reader/writer spinlock over a single 32-bit atomic.
//!
//! State layout: bit 31 = writer active, bit 30 = writer waiting, bits 0..29 =
//! reader count. A waiting writer blocks new readers, so writer starvation is
//! bounded by the hold time of the readers already inside. Built purely on
//! compare-and-exchange; no OS calls, suitable for guarding small
//! memcpy-sized critical sections such as the token cache.

use core::cell::UnsafeCell;
use core::hint;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};

const WRITER_ACTIVE: u32 = 0x8000_0000;
const WRITER_WAITING: u32 = 0x4000_0000;
const WRITER_BITS: u32 = WRITER_ACTIVE | WRITER_WAITING;
const READER_BITS: u32 = !WRITER_BITS;

/// A spinning reader/writer lock protecting a `T`.
#[derive(Debug, Default)]
pub struct RwSpinLock<T> {
    state: AtomicU32,
    value: UnsafeCell<T>,
}

// Same bounds as std's RwLock: the lock hands out &T to several threads and
// &mut T to one.
unsafe impl<T: Send> Send for RwSpinLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwSpinLock<T> {}

impl<T> RwSpinLock<T> {
    /// Creates an unlocked lock around `value`.
    pub const fn new(value: T) -> Self {
        Self {
            state: AtomicU32::new(0),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquires the shared reader side, spinning while a writer is active or
    /// waiting.
    pub fn read(&self) -> RwSpinLockReadGuard<'_, T> {
        loop {
            let state = self.state.load(Ordering::Relaxed);
            if state & WRITER_BITS == 0
                && self
                    .state
                    .compare_exchange_weak(state, state + 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return RwSpinLockReadGuard { lock: self };
            }
            hint::spin_loop();
        }
    }

    /// Acquires the exclusive writer side. While blocked, sets the
    /// writer-waiting bit so new readers hold off.
    pub fn write(&self) -> RwSpinLockWriteGuard<'_, T> {
        loop {
            let state = self.state.load(Ordering::Relaxed);

            // Free, or only our waiting bit left: claim the lock.
            if (state == 0 || state == WRITER_WAITING)
                && self
                    .state
                    .compare_exchange_weak(state, WRITER_ACTIVE, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return RwSpinLockWriteGuard { lock: self };
            }

            // Readers still inside: flag that a writer wants in.
            if state & WRITER_WAITING == 0 && state & WRITER_ACTIVE == 0 {
                let _ = self.state.compare_exchange_weak(
                    state,
                    state | WRITER_WAITING,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
            }
            hint::spin_loop();
        }
    }
}

/// Shared access to the protected value. Dropping releases the reader slot.
#[derive(Debug)]
pub struct RwSpinLockReadGuard<'a, T> {
    lock: &'a RwSpinLock<T>,
}

impl<T> Deref for RwSpinLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Reader count > 0 keeps writers out.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> Drop for RwSpinLockReadGuard<'_, T> {
    fn drop(&mut self) {
        loop {
            let state = self.lock.state.load(Ordering::Relaxed);
            let next = ((state & READER_BITS) - 1) | (state & WRITER_WAITING);
            if self
                .lock
                .state
                .compare_exchange_weak(state, next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            hint::spin_loop();
        }
    }
}

/// Exclusive access to the protected value. Dropping releases the lock but
/// preserves the waiting bit for the next writer in line.
#[derive(Debug)]
pub struct RwSpinLockWriteGuard<'a, T> {
    lock: &'a RwSpinLock<T>,
}

impl<T> Deref for RwSpinLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for RwSpinLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Writer-active excludes all readers and other writers.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for RwSpinLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock
            .state
            .fetch_and(WRITER_WAITING, Ordering::Release);
    }
}
