use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex as PlMutex;
use vmthread_core::{
    Semaphore, ThreadMode, ThreadPhase, ThreadValue, register_exit_callback, thread_create,
    thread_exit, thread_is_self, thread_join, thread_self,
};

fn value_of<T: 'static>(v: Option<ThreadValue>) -> Option<T> {
    v.map(|v| *v.downcast::<T>().expect("unexpected exit value type"))
}

#[test]
fn join_returns_value_passed_to_thread_exit() {
    let h = thread_create(Some("exit-value"), ThreadMode::Joinable, || {
        fn deep(n: u32) -> u32 {
            if n == 0 {
                thread_exit(Some(Box::new(0xdead_u32)));
            }
            deep(n - 1) + 1
        }
        Some(Box::new(deep(5)) as ThreadValue)
    });
    assert_eq!(value_of::<u32>(thread_join(&h)), Some(0xdead));
}

#[test]
fn destructors_run_when_thread_exit_unwinds() {
    struct Flag(Arc<AtomicBool>);
    impl Drop for Flag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }
    let dropped = Arc::new(AtomicBool::new(false));
    let flag = Flag(Arc::clone(&dropped));
    let h = thread_create(None, ThreadMode::Joinable, move || {
        let _held = flag;
        thread_exit(None);
    });
    assert!(thread_join(&h).is_none());
    assert!(dropped.load(Ordering::SeqCst));
}

#[test]
fn detached_join_does_not_block_on_a_running_thread() {
    let gate = Arc::new(Semaphore::new(0));
    let finished = Arc::new(Semaphore::new(0));
    let h = {
        let gate = Arc::clone(&gate);
        let finished = Arc::clone(&finished);
        thread_create(Some("detached"), ThreadMode::Detached, move || {
            gate.wait();
            finished.post();
            None
        })
    };
    let start = Instant::now();
    assert!(thread_join(&h).is_none());
    assert!(start.elapsed() < Duration::from_secs(1));
    gate.post();
    finished.wait();
}

#[test]
fn detached_thread_reaches_exited() {
    let finished = Arc::new(Semaphore::new(0));
    let h = {
        let finished = Arc::clone(&finished);
        thread_create(None, ThreadMode::Detached, move || {
            register_exit_callback(move || finished.post());
            None
        })
    };
    finished.wait();
    let deadline = Instant::now() + Duration::from_secs(5);
    while h.phase() != Some(ThreadPhase::Exited) {
        assert!(Instant::now() < deadline, "detached thread never exited");
        std::thread::yield_now();
    }
}

#[test]
fn handles_from_thread_self_refer_to_the_same_thread() {
    let (tx, rx) = std::sync::mpsc::channel();
    let h = thread_create(None, ThreadMode::Joinable, move || {
        tx.send(thread_self()).expect("receiver alive");
        None
    });
    let minted = rx.recv().expect("thread sent its handle");
    assert_eq!(minted, h);
    assert!(!thread_is_self(&minted));
    // Both handles share one control block: one join consumes it.
    let _ = thread_join(&minted);
    assert_eq!(h.phase(), Some(ThreadPhase::Joined));
}

#[test]
fn exit_notifiers_complete_before_join_returns() {
    let log = Arc::new(PlMutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let h = thread_create(None, ThreadMode::Joinable, move || {
        for n in 0..5_u32 {
            let sink = Arc::clone(&sink);
            register_exit_callback(move || {
                std::thread::sleep(Duration::from_millis(2));
                sink.lock().push(n);
            });
        }
        Some(Box::new(()) as ThreadValue)
    });
    let _ = thread_join(&h);
    assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn many_threads_each_run_their_own_notifiers_once() {
    let hits = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let hits = Arc::clone(&hits);
            thread_create(None, ThreadMode::Joinable, move || {
                register_exit_callback(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                });
                Some(Box::new(i) as ThreadValue)
            })
        })
        .collect();
    let values: Vec<i32> = handles
        .iter()
        .map(|h| value_of::<i32>(thread_join(h)).expect("value"))
        .collect();
    assert_eq!(values, (0..16).collect::<Vec<_>>());
    assert_eq!(hits.load(Ordering::SeqCst), 16);
}
