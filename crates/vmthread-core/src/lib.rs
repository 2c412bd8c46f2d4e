//! # vmthread-core
//!
//! Host-independent threading primitives for the virtualization runtime.
//!
//! This crate provides mutexes, recursive mutexes, condition variables,
//! counting semaphores, and a managed thread lifecycle (create, join, exit,
//! self-identification, naming, exit notifiers) with POSIX-like semantics on
//! top of whatever the host offers. Unsafe code is denied at the crate level
//! and allowed only in the modules that talk to the host directly.
//!
//! # Architecture
//!
//! ```text
//! caller -> sync::{Mutex, RecursiveMutex, Condvar, Semaphore} -> parking_lot
//!        -> thread::{create, join, exit, self}    -> std::thread + TLS control block
//!                                                 -> notifier lists, naming (libc)
//! ```
//!
//! Usage errors (touching a destroyed primitive, joining twice) panic through
//! assertions. Timeouts and contention come back as plain data. Host failures
//! are fatal: a `fatal` diagnostic is written and the process aborts.

#![deny(unsafe_code)]

pub mod config;
pub mod diag;
pub mod error;
pub mod instrument;
pub mod sync;
pub mod thread;

pub use error::ThreadError;
pub use sync::{
    Condvar, Mutex, MutexGuard, RecursiveMutex, RecursiveMutexGuard, SEM_VALUE_MAX, SemWait,
    Semaphore, WaitOutcome,
};
pub use thread::{
    ExitNotifierId, ThreadHandle, ThreadMode, ThreadPhase, ThreadValue, enable_thread_naming,
    register_exit_callback, thread_create, thread_exit, thread_get_affinity, thread_is_self,
    thread_join, thread_self, thread_set_affinity, unregister_exit_callback,
};
