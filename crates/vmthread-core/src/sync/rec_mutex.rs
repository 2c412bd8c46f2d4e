//! Recursive mutex on the host's re-entrant lock.
//!
//! The host lock keeps its recursion count in owner-private, non-atomic
//! state, so [`RecursiveMutex::unlock`] is `unsafe`: only the owning thread
//! may touch it. [`RecursiveMutexGuard`] is the safe way to release.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

/// Mutex that its owner may lock repeatedly.
///
/// Each `lock` (or successful `try_lock`) must be balanced by one `unlock`
/// from the same thread before another thread can acquire it.
pub struct RecursiveMutex {
    lock: parking_lot::ReentrantMutex<()>,
    initialized: AtomicBool,
}

impl RecursiveMutex {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lock: parking_lot::const_reentrant_mutex(()),
            initialized: AtomicBool::new(true),
        }
    }

    pub fn destroy(&self) {
        assert!(
            self.initialized.swap(false, Ordering::AcqRel),
            "recursive mutex destroyed twice or never initialized"
        );
        assert!(!self.lock.is_locked(), "destroying a held recursive mutex");
    }

    pub fn lock(&self) {
        self.assert_initialized();
        std::mem::forget(self.lock.lock());
    }

    /// Take one more level of ownership without waiting. `false` means
    /// another thread holds the mutex.
    pub fn try_lock(&self) -> bool {
        self.assert_initialized();
        match self.lock.try_lock() {
            Some(guard) => {
                std::mem::forget(guard);
                true
            }
            None => false,
        }
    }

    /// Release one level of ownership.
    ///
    /// # Safety
    ///
    /// The calling thread must own the mutex, with at least one level taken
    /// by [`RecursiveMutex::lock`]/[`RecursiveMutex::try_lock`] and not yet
    /// released. A call from any other thread races on the owner's recursion
    /// count and lets a third thread in while the owner still holds it.
    ///
    /// ```compile_fail,E0133
    /// let m = vmthread_core::RecursiveMutex::new();
    /// m.lock();
    /// m.unlock();
    /// ```
    pub unsafe fn unlock(&self) {
        self.assert_initialized();
        debug_assert!(self.lock.is_locked(), "unlock of an unlocked recursive mutex");
        // SAFETY: the calling thread owns at least one level whose guard was
        // forgotten in `lock`/`try_lock`.
        unsafe { self.lock.force_unlock() };
    }

    /// Take one level and return a guard that releases it on drop.
    pub fn guard(&self) -> RecursiveMutexGuard<'_> {
        self.lock();
        RecursiveMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    /// Guard-returning [`RecursiveMutex::try_lock`].
    pub fn try_guard(&self) -> Option<RecursiveMutexGuard<'_>> {
        self.try_lock().then(|| RecursiveMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    #[inline]
    fn assert_initialized(&self) {
        assert!(self.is_initialized(), "recursive mutex used after destroy");
    }
}

/// One level of ownership of a [`RecursiveMutex`], released on drop.
///
/// Not `Send`, so it cannot be dropped on a thread that does not own the
/// mutex:
///
/// ```compile_fail,E0277
/// static M: vmthread_core::RecursiveMutex = vmthread_core::RecursiveMutex::new();
/// let g = M.guard();
/// std::thread::spawn(move || drop(g));
/// ```
#[must_use = "dropping the guard releases the level immediately"]
pub struct RecursiveMutexGuard<'a> {
    mutex: &'a RecursiveMutex,
    _not_send: PhantomData<*const ()>,
}

impl Drop for RecursiveMutexGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard holds a level taken on this thread, and `!Send`
        // keeps it here.
        unsafe { self.mutex.unlock() };
    }
}

impl std::fmt::Debug for RecursiveMutexGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveMutexGuard").finish_non_exhaustive()
    }
}

impl Default for RecursiveMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecursiveMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveMutex")
            .field("locked", &self.is_locked())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn other_thread_can_lock(m: &Arc<RecursiveMutex>) -> bool {
        let other = Arc::clone(m);
        std::thread::spawn(move || other.try_guard().is_some())
            .join()
            .unwrap()
    }

    #[test]
    fn owner_relocks_without_deadlock() {
        let m = RecursiveMutex::new();
        m.lock();
        m.lock();
        assert!(m.try_lock());
        // SAFETY: three levels taken above on this thread.
        unsafe {
            m.unlock();
            m.unlock();
            m.unlock();
        }
        assert!(!m.is_locked());
        m.destroy();
    }

    #[test]
    fn n_locks_need_n_unlocks() {
        let m = Arc::new(RecursiveMutex::new());
        let mut levels: Vec<_> = (0..5).map(|_| m.guard()).collect();
        while let Some(level) = levels.pop() {
            assert!(
                !other_thread_can_lock(&m),
                "acquired by another thread with {} levels still held",
                levels.len() + 1
            );
            drop(level);
        }
        assert!(other_thread_can_lock(&m));
    }

    #[test]
    fn non_owner_cannot_release_through_safe_code() {
        // Safe code can only release via a guard, and guards stay on the
        // thread that took them: the owner's levels survive other threads.
        let m = Arc::new(RecursiveMutex::new());
        let held = m.guard();
        let other = Arc::clone(&m);
        let outsider_got_in = std::thread::spawn(move || {
            let attempt = other.try_guard();
            attempt.is_some()
        })
        .join()
        .unwrap();
        assert!(!outsider_got_in);
        assert!(m.is_locked());
        drop(held);
        assert!(!m.is_locked());
    }

    #[test]
    #[should_panic(expected = "used after destroy")]
    fn trylock_after_destroy_panics() {
        let m = RecursiveMutex::new();
        m.destroy();
        let _ = m.try_lock();
    }
}
