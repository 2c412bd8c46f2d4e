//! Exit notifiers.
//!
//! Callbacks registered from a managed thread go on that thread's private
//! list and run on the exiting thread, FIFO, exactly once, before a joiner can
//! observe the exit. Callbacks registered from an unmanaged context go on the
//! process list, which runs from an `atexit` hook installed on first use.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once, Weak};

use parking_lot::Mutex;

use super::lifecycle::{self, ControlBlock};
use crate::diag::{self, DiagRecord, LogLevel};

type Callback = Box<dyn FnOnce() + Send>;

// Sequence number handed out for a registration that was refused.
const REJECTED: u64 = u64::MAX;

struct Entries {
    sealed: bool,
    next_seq: u64,
    pending: Vec<(u64, Callback)>,
}

/// FIFO list of pending callbacks.
pub(crate) struct NotifierList {
    inner: Mutex<Entries>,
}

impl NotifierList {
    pub(crate) const fn new() -> Self {
        Self {
            inner: parking_lot::const_mutex(Entries {
                sealed: false,
                next_seq: 0,
                pending: Vec::new(),
            }),
        }
    }

    fn push(&self, cb: Callback) -> Result<u64, Callback> {
        let mut entries = self.inner.lock();
        if entries.sealed {
            return Err(cb);
        }
        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.pending.push((seq, cb));
        Ok(seq)
    }

    fn remove(&self, seq: u64) -> bool {
        let removed = {
            let mut entries = self.inner.lock();
            entries
                .pending
                .iter()
                .position(|(s, _)| *s == seq)
                .map(|at| entries.pending.remove(at))
        };
        // Dropped outside the lock: a callback's captures may register again.
        removed.is_some()
    }

    fn take(&self, seal: bool) -> Vec<(u64, Callback)> {
        let mut entries = self.inner.lock();
        entries.sealed |= seal;
        std::mem::take(&mut entries.pending)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Seal the list and run everything on it. Later registrations are refused.
    pub(crate) fn seal_and_run(&self) {
        run_batch(self.take(true));
    }

    /// Run until empty, picking up anything registered by the callbacks.
    fn drain_and_run(&self) {
        loop {
            let batch = self.take(false);
            if batch.is_empty() {
                break;
            }
            run_batch(batch);
        }
    }
}

fn run_batch(batch: Vec<(u64, Callback)>) {
    for (seq, cb) in batch {
        if panic::catch_unwind(AssertUnwindSafe(cb)).is_err() {
            diag::emit(
                DiagRecord::new(LogLevel::Error, "notifier", "exit_notifier_panicked")
                    .with_details(serde_json::json!({ "seq": seq })),
            );
        }
    }
}

#[derive(Debug, Clone)]
enum Owner {
    Process,
    Thread(Weak<ControlBlock>),
}

/// Token for a registered exit callback, used to unregister it.
#[derive(Debug, Clone)]
pub struct ExitNotifierId {
    owner: Owner,
    seq: u64,
}

impl ExitNotifierId {
    /// Whether the callback went on a thread's private list.
    #[must_use]
    pub fn is_thread_local(&self) -> bool {
        matches!(self.owner, Owner::Thread(_))
    }

    /// Whether the registration was refused because the list was already
    /// being run.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.seq == REJECTED
    }
}

static PROCESS_LIST: NotifierList = NotifierList::new();
static PROCESS_HOOK: Once = Once::new();

extern "C" fn process_exit_hook() {
    run_process_exit_notifiers();
}

fn install_process_hook() {
    PROCESS_HOOK.call_once(|| {
        // SAFETY: `process_exit_hook` is a plain `extern "C" fn()` that lives
        // for the whole program.
        let rc = unsafe { libc::atexit(process_exit_hook) };
        if rc != 0 {
            diag::log(
                LogLevel::Warn,
                "notifier",
                "atexit_failed",
                "process exit notifiers will only run when called explicitly",
            );
        }
    });
}

/// Register `cb` to run when the calling thread exits.
///
/// From a managed thread the callback runs on that thread during its exit
/// sequence. From any other context it runs at normal process exit. A
/// registration made while the calling thread's list is already running is
/// refused: the callback is dropped and a warning is logged.
pub fn register_exit_callback<F>(cb: F) -> ExitNotifierId
where
    F: FnOnce() + Send + 'static,
{
    let cb: Callback = Box::new(cb);
    match lifecycle::current_block() {
        Some(block) => {
            let owner = Owner::Thread(Arc::downgrade(&block));
            match block.notifiers.push(cb) {
                Ok(seq) => ExitNotifierId { owner, seq },
                Err(_refused) => {
                    diag::log(
                        LogLevel::Warn,
                        "notifier",
                        "notifier_rejected",
                        "exit notifier registered while the thread is exiting; dropped",
                    );
                    ExitNotifierId {
                        owner,
                        seq: REJECTED,
                    }
                }
            }
        }
        None => {
            install_process_hook();
            let seq = match PROCESS_LIST.push(cb) {
                Ok(seq) => seq,
                Err(_) => REJECTED,
            };
            ExitNotifierId {
                owner: Owner::Process,
                seq,
            }
        }
    }
}

/// Remove a pending callback. Unknown, already-run or already-removed ids are
/// ignored. Returns whether a callback was removed.
pub fn unregister_exit_callback(id: &ExitNotifierId) -> bool {
    if id.is_rejected() {
        return false;
    }
    match &id.owner {
        Owner::Process => PROCESS_LIST.remove(id.seq),
        Owner::Thread(block) => block
            .upgrade()
            .is_some_and(|block| block.notifiers.remove(id.seq)),
    }
}

/// Run and clear the process exit list, FIFO.
///
/// Called from the `atexit` hook; callable directly by embedders that exit
/// without running `atexit` handlers.
pub fn run_process_exit_notifiers() {
    PROCESS_LIST.drain_and_run();
}

/// Number of callbacks pending on the process list.
#[must_use]
pub fn pending_process_notifiers() -> usize {
    PROCESS_LIST.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // The process list is shared by every test in this binary.
    static PROCESS_LIST_GUARD: Mutex<()> = parking_lot::const_mutex(());

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Callback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |n: u32| -> Callback {
            let sink = Arc::clone(&sink);
            Box::new(move || sink.lock().push(n))
        };
        (log, make)
    }

    #[test]
    fn list_runs_fifo_and_only_once() {
        let list = NotifierList::new();
        let (log, make) = recorder();
        for n in 0..4 {
            assert!(list.push(make(n)).is_ok());
        }
        list.seal_and_run();
        list.seal_and_run();
        assert_eq!(*log.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn removed_entries_do_not_run() {
        let list = NotifierList::new();
        let (log, make) = recorder();
        let first = list.push(make(1)).ok().unwrap();
        let second = list.push(make(2)).ok().unwrap();
        assert!(list.remove(first));
        assert!(!list.remove(first));
        assert_eq!(list.len(), 1);
        list.seal_and_run();
        assert!(!list.remove(second));
        assert_eq!(*log.lock(), vec![2]);
    }

    #[test]
    fn sealed_list_refuses_registration() {
        let list = NotifierList::new();
        list.seal_and_run();
        let (log, make) = recorder();
        assert!(list.push(make(9)).is_err());
        list.seal_and_run();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn panicking_callback_does_not_stop_the_rest() {
        let list = NotifierList::new();
        let (log, make) = recorder();
        list.push(make(1)).ok().unwrap();
        list.push(Box::new(|| panic!("notifier failure")))
            .ok()
            .unwrap();
        list.push(make(3)).ok().unwrap();
        list.seal_and_run();
        assert_eq!(*log.lock(), vec![1, 3]);
    }

    #[test]
    fn unmanaged_registration_goes_to_process_list() {
        let _guard = PROCESS_LIST_GUARD.lock();
        run_process_exit_notifiers();
        let hits = Arc::new(AtomicUsize::new(0));
        let ids: Vec<_> = (0..3)
            .map(|_| {
                let hits = Arc::clone(&hits);
                register_exit_callback(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        assert!(ids.iter().all(|id| !id.is_thread_local()));
        assert_eq!(pending_process_notifiers(), 3);
        assert!(unregister_exit_callback(&ids[1]));
        assert!(!unregister_exit_callback(&ids[1]));
        run_process_exit_notifiers();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(pending_process_notifiers(), 0);
    }

    #[test]
    fn process_list_picks_up_late_registrations() {
        let _guard = PROCESS_LIST_GUARD.lock();
        run_process_exit_notifiers();
        let hits = Arc::new(AtomicUsize::new(0));
        let outer = Arc::clone(&hits);
        register_exit_callback(move || {
            outer.fetch_add(1, Ordering::SeqCst);
            let inner = Arc::clone(&outer);
            register_exit_callback(move || {
                inner.fetch_add(10, Ordering::SeqCst);
            });
        });
        run_process_exit_notifiers();
        assert_eq!(hits.load(Ordering::SeqCst), 11);
    }
}
