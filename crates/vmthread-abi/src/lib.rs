// All extern "C" exports take raw pointers from C callers and check them for
// null at the boundary; per-function safety docs would repeat the same rule.
#![allow(clippy::missing_safety_doc)]
//! # vmthread-abi
//!
//! extern "C" boundary for `vmthread-core`.
//!
//! Produces a `cdylib` exposing the lock, condition variable, semaphore and
//! thread entry points under a `vmthread_` prefix. Objects are opaque heap
//! cells: `*_init` hands out a pointer that stays owned by this library until
//! the matching `*_destroy`.
//!
//! # Conventions
//!
//! ```text
//! C caller -> null check (EINVAL) -> vmthread-core -> errno-style c_int
//! ```
//!
//! Usage errors detected by the core (destroying a held mutex, joining twice)
//! panic, which aborts at this boundary.

#[macro_use]
mod macros;

pub mod sync_abi;
pub mod thread_abi;
