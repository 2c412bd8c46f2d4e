//! Condition variable paired per call with a [`Mutex`].
//!
//! Release-and-block is atomic with respect to `signal`/`broadcast`:
//! `parking_lot::Condvar` queues the waiter before releasing the lock.

use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::instrument::{self, LockEvent};
use crate::sync::Mutex;

/// How a timed wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Woken by `signal`/`broadcast` (or spuriously).
    Signaled,
    TimedOut,
}

impl WaitOutcome {
    #[must_use]
    pub const fn timed_out(self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Condition variable.
///
/// A condition variable may be waited on with only one mutex at a time;
/// waiting on it with two different mutexes concurrently panics.
pub struct Condvar {
    var: parking_lot::Condvar,
    initialized: AtomicBool,
}

impl Condvar {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            var: parking_lot::Condvar::new(),
            initialized: AtomicBool::new(true),
        }
    }

    pub fn destroy(&self) {
        assert!(
            self.initialized.swap(false, Ordering::AcqRel),
            "condvar destroyed twice or never initialized"
        );
    }

    /// Wake at least one waiter, if any.
    pub fn signal(&self) {
        self.assert_initialized();
        self.var.notify_one();
    }

    /// Wake every current waiter.
    pub fn broadcast(&self) {
        self.assert_initialized();
        self.var.notify_all();
    }

    /// Atomically release `mutex` and block; `mutex` is held again on return.
    ///
    /// The caller must hold `mutex`, typically through a
    /// [`crate::sync::MutexGuard`]. Wakeups may be spurious, so callers wait
    /// in a loop on their predicate.
    #[track_caller]
    pub fn wait(&self, mutex: &Mutex) {
        self.assert_initialized();
        mutex.assert_initialized();
        let location = Location::caller();
        instrument::notify(LockEvent::PreUnlock, mutex.addr(), location);
        // SAFETY: the caller holds `mutex`. The guard stands in for that
        // ownership during the wait and is forgotten after, leaving it held.
        let mut guard = unsafe { mutex.raw().make_guard_unchecked() };
        self.var.wait(&mut guard);
        std::mem::forget(guard);
        instrument::notify(LockEvent::PostLock, mutex.addr(), location);
    }

    /// Like [`Condvar::wait`] but gives up after `ms` milliseconds.
    ///
    /// `mutex` is held again on return either way.
    #[track_caller]
    pub fn wait_timed(&self, mutex: &Mutex, ms: u32) -> WaitOutcome {
        self.assert_initialized();
        mutex.assert_initialized();
        let location = Location::caller();
        instrument::notify(LockEvent::PreUnlock, mutex.addr(), location);
        // SAFETY: as in `wait`.
        let mut guard = unsafe { mutex.raw().make_guard_unchecked() };
        let result = self
            .var
            .wait_for(&mut guard, Duration::from_millis(u64::from(ms)));
        std::mem::forget(guard);
        instrument::notify(LockEvent::PostLock, mutex.addr(), location);
        if result.timed_out() {
            WaitOutcome::TimedOut
        } else {
            WaitOutcome::Signaled
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    #[inline]
    fn assert_initialized(&self) {
        assert!(self.is_initialized(), "condvar used after destroy");
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Condvar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condvar")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
