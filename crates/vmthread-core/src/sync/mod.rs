//! Synchronization primitives.
//!
//! C-style lock objects: explicit `lock()`/`unlock()` pairs instead of RAII
//! guards, so that the runtime can hold a lock across call boundaries the way
//! its device models expect. Each primitive carries an `initialized` flag;
//! every operation asserts it and `destroy()` clears it first, so use after
//! destruction fails loudly instead of silently racing.
//!
//! Releasing a lock is `unsafe` (the caller vouches for ownership); the
//! guard types release safely on drop.

#[allow(unsafe_code)]
pub mod cond;
#[allow(unsafe_code)]
pub mod mutex;
#[allow(unsafe_code)]
pub mod rec_mutex;
pub mod sem;

pub use cond::{Condvar, WaitOutcome};
pub use mutex::{Mutex, MutexGuard};
pub use rec_mutex::{RecursiveMutex, RecursiveMutexGuard};
pub use sem::{SEM_VALUE_MAX, SemWait, Semaphore};
