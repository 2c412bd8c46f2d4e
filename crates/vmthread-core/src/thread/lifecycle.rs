//! Managed thread lifecycle: create, join, exit, self.
//!
//! ## Control block
//!
//! Every thread started by [`thread_create`] owns a heap control block shared
//! (via `Arc`) between the thread itself, the creator's [`ThreadHandle`], and
//! any handles minted later by [`thread_self`]. The block holds:
//! - the mode (`Joinable` / `Detached`) and the recorded name
//! - the phase tag, the exit value and the retained host join handle, all
//!   behind one exclusive section
//! - the host thread token used for naming
//! - the thread's private exit-notifier list
//!
//! Phases: `Starting -> Running -> Exited -> Joined` for joinable threads,
//! `Starting -> Running -> Exited` for detached ones.
//!
//! ## Exit sequence
//!
//! Returning from the entry point, calling [`thread_exit`], or panicking all
//! end in the same sequence on the exiting thread: run the exit notifiers,
//! publish `Exited` (and the value, joinable only) under the exclusive
//! section, clear the thread-local slot.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{JoinHandle, ThreadId};

use parking_lot::Mutex;
use serde::Serialize;

use super::naming::{self, HostToken};
use super::notifier::NotifierList;
use crate::diag::{self, DiagRecord, LogLevel};
use crate::error::ThreadError;

/// Value a thread hands to its joiner.
pub type ThreadValue = Box<dyn Any + Send>;

/// Whether a thread's exit value can be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadMode {
    Joinable,
    Detached,
}

/// Lifecycle state of a managed thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadPhase {
    /// Spawned, trampoline not yet running.
    Starting,
    Running,
    /// Exit sequence finished; the value (if any) is waiting for a joiner.
    Exited,
    /// Value collected. Terminal.
    Joined,
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<ControlBlock>>> = const { RefCell::new(None) };
}

static THREADS_CREATED: AtomicU64 = AtomicU64::new(0);
static THREADS_EXITED: AtomicU64 = AtomicU64::new(0);
static THREADS_JOINED: AtomicU64 = AtomicU64::new(0);

/// Process-wide lifecycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ThreadCounters {
    pub created: u64,
    pub exited: u64,
    pub joined: u64,
}

#[must_use]
pub fn thread_counters() -> ThreadCounters {
    ThreadCounters {
        created: THREADS_CREATED.load(Ordering::Relaxed),
        exited: THREADS_EXITED.load(Ordering::Relaxed),
        joined: THREADS_JOINED.load(Ordering::Relaxed),
    }
}

struct BlockState {
    phase: ThreadPhase,
    value: Option<ThreadValue>,
    host: Option<JoinHandle<()>>,
    token: Option<HostToken>,
}

pub(crate) struct ControlBlock {
    mode: ThreadMode,
    name: Mutex<Option<String>>,
    state: Mutex<BlockState>,
    pub(crate) notifiers: NotifierList,
}

impl ControlBlock {
    fn new(mode: ThreadMode, name: Option<String>) -> Self {
        Self {
            mode,
            name: Mutex::new(name),
            state: Mutex::new(BlockState {
                phase: ThreadPhase::Starting,
                value: None,
                host: None,
                token: None,
            }),
            notifiers: NotifierList::new(),
        }
    }

    pub(crate) fn record_name(&self, name: &str) {
        *self.name.lock() = Some(name.to_owned());
    }

    /// Run `f` with the host token while the thread is known to be alive.
    ///
    /// The exclusive section is held across `f`, so the thread cannot publish
    /// its exit (and a detached thread cannot vanish) in the meantime.
    pub(crate) fn with_live_token<R>(
        &self,
        f: impl FnOnce(HostToken) -> R,
    ) -> Result<R, ThreadError> {
        let state = self.state.lock();
        match (state.phase, state.token) {
            (ThreadPhase::Starting | ThreadPhase::Running, Some(token)) => Ok(f(token)),
            _ => Err(ThreadError::Exited),
        }
    }

    fn mark_running(&self) {
        let mut state = self.state.lock();
        if state.phase == ThreadPhase::Starting {
            state.phase = ThreadPhase::Running;
        }
    }

    fn finish(&self, value: Option<ThreadValue>) {
        self.notifiers.seal_and_run();
        let discarded = {
            let mut state = self.state.lock();
            state.phase = ThreadPhase::Exited;
            match self.mode {
                ThreadMode::Joinable => {
                    state.value = value;
                    None
                }
                ThreadMode::Detached => value,
            }
        };
        drop(discarded);
        THREADS_EXITED.fetch_add(1, Ordering::Relaxed);
        let _ = CURRENT.try_with(|slot| slot.borrow_mut().take());
    }
}

impl std::fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlBlock")
            .field("mode", &self.mode)
            .field("name", &*self.name.lock())
            .field("phase", &self.state.lock().phase)
            .finish_non_exhaustive()
    }
}

/// Control block of the calling thread, if it is managed and still running.
pub(crate) fn current_block() -> Option<Arc<ControlBlock>> {
    CURRENT
        .try_with(|slot| slot.borrow().clone())
        .ok()
        .flatten()
}

/// Recorded name of the calling managed thread.
pub(crate) fn current_name() -> Option<String> {
    current_block().and_then(|block| block.name.lock().clone())
}

/// Unwind payload carrying a [`thread_exit`] value to the trampoline.
struct ThreadExit(Option<ThreadValue>);

fn trampoline<F>(block: Arc<ControlBlock>, entry: F)
where
    F: FnOnce() -> Option<ThreadValue>,
{
    CURRENT.with(|slot| *slot.borrow_mut() = Some(Arc::clone(&block)));
    block.mark_running();
    match panic::catch_unwind(AssertUnwindSafe(entry)) {
        Ok(value) => block.finish(value),
        Err(payload) => match payload.downcast::<ThreadExit>() {
            Ok(exit) => block.finish(exit.0),
            Err(payload) => {
                block.finish(None);
                panic::resume_unwind(payload);
            }
        },
    }
}

/// Reference to a thread.
///
/// Handles for managed threads share the thread's control block. Handles for
/// unmanaged threads (the main thread, foreign threads) carry only the host
/// thread id: they compare and identify, but joining them yields `None`.
#[derive(Clone)]
pub struct ThreadHandle {
    id: ThreadId,
    block: Option<Arc<ControlBlock>>,
}

impl ThreadHandle {
    #[must_use]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Whether the thread was started by [`thread_create`].
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.block.is_some()
    }

    #[must_use]
    pub fn mode(&self) -> Option<ThreadMode> {
        self.block.as_ref().map(|b| b.mode)
    }

    #[must_use]
    pub fn phase(&self) -> Option<ThreadPhase> {
        self.block.as_ref().map(|b| b.state.lock().phase)
    }

    /// Name given at creation or by the last [`ThreadHandle::set_name`].
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.block.as_ref().and_then(|b| b.name.lock().clone())
    }

    /// Name the thread, best effort.
    ///
    /// The name is always recorded on a managed thread's handle. It reaches the
    /// host only while naming is enabled; host failures disable naming with a
    /// warning and are not reported here.
    pub fn set_name(&self, name: &str) -> Result<(), ThreadError> {
        match &self.block {
            Some(block) => naming::apply(block, name),
            None if thread_is_self(self) => naming::apply_current(name),
            None => Err(ThreadError::Unsupported { op: "set_name" }),
        }
    }
}

impl PartialEq for ThreadHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ThreadHandle {}

impl std::fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("id", &self.id)
            .field("block", &self.block)
            .finish()
    }
}

/// Start a managed thread running `entry`.
///
/// `entry`'s return value (or the value passed to [`thread_exit`]) goes to the
/// joiner of a joinable thread and is dropped for a detached one. The name is
/// recorded and, when naming is enabled, applied to the host thread. Failure to
/// spawn a host thread is fatal.
pub fn thread_create<F>(name: Option<&str>, mode: ThreadMode, entry: F) -> ThreadHandle
where
    F: FnOnce() -> Option<ThreadValue> + Send + 'static,
{
    let block = Arc::new(ControlBlock::new(mode, name.map(str::to_owned)));
    let child = Arc::clone(&block);
    let host = match std::thread::Builder::new().spawn(move || trampoline(child, entry)) {
        Ok(host) => host,
        Err(err) => diag::fatal(
            "thread",
            "spawn_failed",
            format!("cannot create thread: {err}"),
            err.raw_os_error(),
        ),
    };
    let id = host.thread().id();
    {
        let mut state = block.state.lock();
        state.token = naming::token_of(&host);
        match mode {
            ThreadMode::Joinable => state.host = Some(host),
            ThreadMode::Detached => drop(host),
        }
    }
    THREADS_CREATED.fetch_add(1, Ordering::Relaxed);

    if let Some(name) = name {
        if naming::naming_enabled() {
            let _ = naming::apply(&block, name);
        }
    }
    if diag::enabled(LogLevel::Debug) {
        diag::emit(
            DiagRecord::new(LogLevel::Debug, "thread", "thread_created").with_details(
                serde_json::json!({ "name": name, "mode": mode, "id": format!("{id:?}") }),
            ),
        );
    }
    ThreadHandle {
        id,
        block: Some(block),
    }
}

/// Wait for a joinable thread to finish and take its exit value.
///
/// Returns `None` right away for detached threads and unmanaged handles.
/// Joining the same thread twice (through any of its handles) panics.
pub fn thread_join(handle: &ThreadHandle) -> Option<ThreadValue> {
    let block = handle.block.as_ref()?;
    if block.mode == ThreadMode::Detached {
        return None;
    }
    assert!(!thread_is_self(handle), "thread cannot join itself");

    let host = {
        let mut state = block.state.lock();
        assert!(
            state.phase != ThreadPhase::Joined,
            "thread joined more than once"
        );
        state.host.take()
    };
    let Some(host) = host else {
        panic!("thread joined more than once");
    };
    // A panicking entry has already run its exit sequence; the payload is
    // not part of the join contract.
    let _ = host.join();

    let value = {
        let mut state = block.state.lock();
        debug_assert_eq!(state.phase, ThreadPhase::Exited);
        state.phase = ThreadPhase::Joined;
        state.value.take()
    };
    THREADS_JOINED.fetch_add(1, Ordering::Relaxed);
    value
}

/// End the calling managed thread, handing `value` to its joiner.
///
/// Unwinds to the thread's entry trampoline, so destructors on the way run.
/// Calling this outside a managed thread is a usage error and panics.
pub fn thread_exit(value: Option<ThreadValue>) -> ! {
    assert!(
        current_block().is_some(),
        "thread_exit called outside a managed thread"
    );
    panic::resume_unwind(Box::new(ThreadExit(value)))
}

/// Handle for the calling thread.
#[must_use]
pub fn thread_self() -> ThreadHandle {
    ThreadHandle {
        id: std::thread::current().id(),
        block: current_block(),
    }
}

/// Whether `handle` refers to the calling thread.
#[must_use]
pub fn thread_is_self(handle: &ThreadHandle) -> bool {
    handle.id == std::thread::current().id()
}

/// CPU pinning is not offered by this layer.
pub fn thread_set_affinity(_handle: &ThreadHandle, _cpus: &[usize]) -> Result<(), ThreadError> {
    Err(ThreadError::Unsupported {
        op: "thread_set_affinity",
    })
}

pub fn thread_get_affinity(_handle: &ThreadHandle) -> Result<Vec<usize>, ThreadError> {
    Err(ThreadError::Unsupported {
        op: "thread_get_affinity",
    })
}
