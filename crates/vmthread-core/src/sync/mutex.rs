//! Exclusive, non-recursive mutex.
//!
//! Built on the host's lightweight lock (`parking_lot`), used without guards:
//! ownership is tracked by the lock word alone. There is no fairness beyond
//! what `parking_lot` provides and no priority inheritance.
//!
//! [`Mutex::unlock`] is `unsafe`: the lock word cannot tell who holds it, so
//! the caller vouches for ownership. Safe code releases through a
//! [`MutexGuard`] from [`Mutex::guard`] or [`Mutex::try_guard`].

use std::marker::PhantomData;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::instrument::{self, LockEvent};

/// Exclusive lock with explicit `lock`/`unlock`.
///
/// Relocking from the owning thread deadlocks; use
/// [`crate::RecursiveMutex`] for re-entrant locking.
pub struct Mutex {
    lock: parking_lot::Mutex<()>,
    initialized: AtomicBool,
}

impl Mutex {
    /// Create an unlocked, initialized mutex.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lock: parking_lot::const_mutex(()),
            initialized: AtomicBool::new(true),
        }
    }

    /// Mark the mutex destroyed. It must not be held.
    pub fn destroy(&self) {
        assert!(
            self.initialized.swap(false, Ordering::AcqRel),
            "mutex destroyed twice or never initialized"
        );
        assert!(!self.lock.is_locked(), "destroying a held mutex");
    }

    /// Block until the calling thread owns the mutex.
    #[track_caller]
    pub fn lock(&self) {
        self.assert_initialized();
        let location = Location::caller();
        instrument::notify(LockEvent::PreLock, self.addr(), location);
        match self.lock.try_lock() {
            Some(guard) => std::mem::forget(guard),
            None => {
                instrument::note_contended();
                std::mem::forget(self.lock.lock());
            }
        }
        instrument::notify(LockEvent::PostLock, self.addr(), location);
    }

    /// Take the mutex if it is free. Returns `false` ("would block") otherwise.
    #[track_caller]
    pub fn try_lock(&self) -> bool {
        self.assert_initialized();
        match self.lock.try_lock() {
            Some(guard) => {
                std::mem::forget(guard);
                instrument::notify(LockEvent::PostLock, self.addr(), Location::caller());
                true
            }
            None => false,
        }
    }

    /// Release the mutex.
    ///
    /// # Safety
    ///
    /// The mutex must be locked, and the caller must own that acquisition:
    /// it took the lock with [`Mutex::lock`]/[`Mutex::try_lock`] itself, or
    /// the thread that did handed the acquisition over and will not release
    /// it again. Releasing someone else's acquisition lets a third thread in
    /// while the owner still believes it holds the lock.
    ///
    /// ```compile_fail,E0133
    /// let m = vmthread_core::Mutex::new();
    /// m.lock();
    /// m.unlock();
    /// ```
    #[track_caller]
    pub unsafe fn unlock(&self) {
        // SAFETY: forwarded from the caller.
        unsafe { self.unlock_at(Location::caller()) }
    }

    /// Block until acquired and return a guard that releases on drop.
    #[track_caller]
    pub fn guard(&self) -> MutexGuard<'_> {
        let location = Location::caller();
        self.lock();
        MutexGuard {
            mutex: self,
            location,
            _not_send: PhantomData,
        }
    }

    /// Guard-returning [`Mutex::try_lock`].
    #[track_caller]
    pub fn try_guard(&self) -> Option<MutexGuard<'_>> {
        let location = Location::caller();
        self.try_lock().then(|| MutexGuard {
            mutex: self,
            location,
            _not_send: PhantomData,
        })
    }

    /// # Safety
    ///
    /// As for [`Mutex::unlock`].
    unsafe fn unlock_at(&self, location: &'static Location<'static>) {
        self.assert_initialized();
        debug_assert!(self.lock.is_locked(), "unlock of an unlocked mutex");
        instrument::notify(LockEvent::PreUnlock, self.addr(), location);
        // SAFETY: the caller owns the acquisition; its guard was forgotten in
        // `lock`/`try_lock`.
        unsafe { self.lock.force_unlock() };
    }

    /// Whether some thread holds the mutex right now.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn assert_initialized(&self) {
        assert!(self.is_initialized(), "mutex used after destroy");
    }

    pub(crate) fn raw(&self) -> &parking_lot::Mutex<()> {
        &self.lock
    }

    pub(crate) fn addr(&self) -> usize {
        self as *const Self as usize
    }
}

/// Proof of one acquisition of a [`Mutex`]; releases it on drop.
///
/// Not `Send`: the acquisition is released on the thread that made it.
#[must_use = "dropping the guard releases the mutex immediately"]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
    location: &'static Location<'static>,
    _not_send: PhantomData<*const ()>,
}

impl MutexGuard<'_> {
    /// The mutex this guard holds, e.g. to pass to [`crate::Condvar::wait`].
    #[must_use]
    pub fn mutex(&self) -> &Mutex {
        self.mutex
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard was created from this thread's own acquisition
        // and is dropped exactly once.
        unsafe { self.mutex.unlock_at(self.location) };
    }
}

impl std::fmt::Debug for MutexGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutexGuard")
            .field("mutex", &self.mutex.addr())
            .finish_non_exhaustive()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
