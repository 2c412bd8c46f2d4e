//! Counting semaphore.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::diag::{self, DiagRecord, LogLevel};

/// Largest count a semaphore can hold.
pub const SEM_VALUE_MAX: u32 = i32::MAX as u32;

/// Result of [`Semaphore::try_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemWait {
    Acquired,
    TimedOut,
}

impl SemWait {
    #[must_use]
    pub const fn acquired(self) -> bool {
        matches!(self, Self::Acquired)
    }
}

/// Classic counting semaphore: the count never goes negative, waiters are
/// woken in no guaranteed order.
pub struct Semaphore {
    count: parking_lot::Mutex<u32>,
    available: parking_lot::Condvar,
    initialized: AtomicBool,
}

impl Semaphore {
    /// Create a semaphore holding `count` permits.
    #[must_use]
    pub fn new(count: u32) -> Self {
        assert!(count <= SEM_VALUE_MAX, "initial count above SEM_VALUE_MAX");
        Self {
            count: parking_lot::Mutex::new(count),
            available: parking_lot::Condvar::new(),
            initialized: AtomicBool::new(true),
        }
    }

    pub fn destroy(&self) {
        assert!(
            self.initialized.swap(false, Ordering::AcqRel),
            "semaphore destroyed twice or never initialized"
        );
    }

    /// Add one permit and wake one waiter.
    ///
    /// A post that would exceed [`SEM_VALUE_MAX`] is dropped with a warning.
    pub fn post(&self) {
        self.assert_initialized();
        let mut count = self.count.lock();
        if *count == SEM_VALUE_MAX {
            drop(count);
            diag::emit(
                DiagRecord::new(LogLevel::Warn, "sem", "post_overflow")
                    .with_message("semaphore count at SEM_VALUE_MAX; post dropped")
                    .with_errno(libc::EOVERFLOW),
            );
            return;
        }
        *count += 1;
        drop(count);
        self.available.notify_one();
    }

    /// Block until a permit is available, then take it.
    pub fn wait(&self) {
        self.assert_initialized();
        let mut count = self.count.lock();
        while *count == 0 {
            self.available.wait(&mut count);
        }
        *count -= 1;
    }

    /// Take a permit, waiting at most `timeout_ms`. Zero polls once.
    pub fn try_wait(&self, timeout_ms: u32) -> SemWait {
        self.assert_initialized();
        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
        let mut count = self.count.lock();
        while *count == 0 {
            if self
                .available
                .wait_until(&mut count, deadline)
                .timed_out()
                && *count == 0
            {
                return SemWait::TimedOut;
            }
        }
        *count -= 1;
        SemWait::Acquired
    }

    /// Current number of permits (a snapshot).
    #[must_use]
    pub fn value(&self) -> u32 {
        self.assert_initialized();
        *self.count.lock()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    #[inline]
    fn assert_initialized(&self) {
        assert!(self.is_initialized(), "semaphore used after destroy");
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("count", &*self.count.lock())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
