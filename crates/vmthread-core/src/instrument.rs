//! Lock instrumentation.
//!
//! Every [`crate::Mutex`] operation reports three hook points with the
//! caller's source location: before blocking (`PreLock`), after ownership is
//! acquired (`PostLock`) and before release (`PreUnlock`). Condition variable
//! waits report `PreUnlock`/`PostLock` around the wait so that observers see a
//! consistent ownership history. Observers are for contention and deadlock
//! diagnostics and cannot influence the outcome of the operation.
//!
//! Independently of any observer, process-wide counters record how many
//! acquisitions happened, how many of them found the lock held, and how many
//! releases were made.

use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

use crate::diag::{self, DiagRecord, LogLevel};

/// Hook point reported to a [`LockObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEvent {
    PreLock,
    PostLock,
    PreUnlock,
}

impl LockEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreLock => "mutex_lock",
            Self::PostLock => "mutex_locked",
            Self::PreUnlock => "mutex_unlock",
        }
    }
}

/// Where a hook fired: the lock's address and the caller's source location.
#[derive(Debug, Clone, Copy)]
pub struct LockSite {
    pub addr: usize,
    pub location: &'static Location<'static>,
}

/// Receives lock hook events. Must not block on the lock being reported.
pub trait LockObserver: Send + Sync {
    fn on_event(&self, event: LockEvent, site: LockSite);
}

static OBSERVER_INSTALLED: AtomicBool = AtomicBool::new(false);
static OBSERVER: RwLock<Option<Arc<dyn LockObserver>>> = parking_lot::const_rwlock(None);

static LOCK_ACQUIRED: AtomicU64 = AtomicU64::new(0);
static LOCK_CONTENDED: AtomicU64 = AtomicU64::new(0);
static LOCK_RELEASED: AtomicU64 = AtomicU64::new(0);

/// Install `observer`, replacing any previous one.
pub fn set_lock_observer(observer: Arc<dyn LockObserver>) {
    *OBSERVER.write() = Some(observer);
    OBSERVER_INSTALLED.store(true, Ordering::Release);
}

/// Remove the installed observer, if any.
pub fn clear_lock_observer() {
    OBSERVER_INSTALLED.store(false, Ordering::Release);
    *OBSERVER.write() = None;
}

#[inline]
pub(crate) fn notify(event: LockEvent, addr: usize, location: &'static Location<'static>) {
    match event {
        LockEvent::PostLock => {
            LOCK_ACQUIRED.fetch_add(1, Ordering::Relaxed);
        }
        LockEvent::PreUnlock => {
            LOCK_RELEASED.fetch_add(1, Ordering::Relaxed);
        }
        LockEvent::PreLock => {}
    }
    if !OBSERVER_INSTALLED.load(Ordering::Acquire) {
        return;
    }
    let observer = OBSERVER.read().clone();
    if let Some(observer) = observer {
        observer.on_event(event, LockSite { addr, location });
    }
}

#[inline]
pub(crate) fn note_contended() {
    LOCK_CONTENDED.fetch_add(1, Ordering::Relaxed);
}

/// Snapshot of the process-wide lock counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LockCounters {
    pub acquired: u64,
    pub contended: u64,
    pub released: u64,
}

#[must_use]
pub fn lock_counters() -> LockCounters {
    LockCounters {
        acquired: LOCK_ACQUIRED.load(Ordering::Relaxed),
        contended: LOCK_CONTENDED.load(Ordering::Relaxed),
        released: LOCK_RELEASED.load(Ordering::Relaxed),
    }
}

/// Test hook: zero the lock counters.
#[doc(hidden)]
pub fn reset_lock_counters_for_tests() {
    LOCK_ACQUIRED.store(0, Ordering::Relaxed);
    LOCK_CONTENDED.store(0, Ordering::Relaxed);
    LOCK_RELEASED.store(0, Ordering::Relaxed);
}

/// Observer that turns every hook into a `trace` diagnostic record.
#[derive(Debug, Default)]
pub struct TraceObserver;

impl LockObserver for TraceObserver {
    fn on_event(&self, event: LockEvent, site: LockSite) {
        if !diag::enabled(LogLevel::Trace) {
            return;
        }
        diag::emit(
            DiagRecord::new(LogLevel::Trace, "mutex", event.as_str()).with_details(
                serde_json::json!({
                    "lock": format!("{:#x}", site.addr),
                    "file": site.location.file(),
                    "line": site.location.line(),
                }),
            ),
        );
    }
}
