//! End-to-end stress scenarios.
//!
//! Each scenario drives the primitives through managed threads and checks one
//! guarantee. A scenario either passes with a details object or fails with a
//! reason; panics inside worker threads count as failures.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use vmthread_core::{
    Condvar, Mutex, RecursiveMutex, SemWait, Semaphore, ThreadMode, ThreadValue,
    register_exit_callback, thread_create, thread_is_self, thread_join, thread_self,
};

use crate::HarnessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    MutexCounter,
    RecursiveMutex,
    CondvarPingPong,
    SemaphoreBalance,
    SemaphoreDelayedPost,
    JoinValue,
    DetachedJoin,
    SelfIdentification,
    ExitNotifiers,
}

impl Scenario {
    pub const ALL: [Scenario; 9] = [
        Scenario::MutexCounter,
        Scenario::RecursiveMutex,
        Scenario::CondvarPingPong,
        Scenario::SemaphoreBalance,
        Scenario::SemaphoreDelayedPost,
        Scenario::JoinValue,
        Scenario::DetachedJoin,
        Scenario::SelfIdentification,
        Scenario::ExitNotifiers,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MutexCounter => "mutex-counter",
            Self::RecursiveMutex => "recursive-mutex",
            Self::CondvarPingPong => "condvar-ping-pong",
            Self::SemaphoreBalance => "semaphore-balance",
            Self::SemaphoreDelayedPost => "semaphore-delayed-post",
            Self::JoinValue => "join-value",
            Self::DetachedJoin => "detached-join",
            Self::SelfIdentification => "self-identification",
            Self::ExitNotifiers => "exit-notifiers",
        }
    }

    /// Parse a `--scenario` argument: a scenario name or `all`.
    pub fn parse_selection(raw: &str) -> Result<Vec<Scenario>, HarnessError> {
        if raw.eq_ignore_ascii_case("all") {
            Ok(Self::ALL.to_vec())
        } else {
            raw.parse().map(|s| vec![s])
        }
    }

    /// Run the scenario with the given workload size.
    #[must_use]
    pub fn run(self, iterations: u64) -> ScenarioReport {
        let iterations = iterations.max(1);
        let start = Instant::now();
        let result = match self {
            Self::MutexCounter => mutex_counter(iterations),
            Self::RecursiveMutex => recursive_mutex(iterations),
            Self::CondvarPingPong => condvar_ping_pong(iterations),
            Self::SemaphoreBalance => semaphore_balance(iterations),
            Self::SemaphoreDelayedPost => semaphore_delayed_post(iterations),
            Self::JoinValue => join_value(iterations),
            Self::DetachedJoin => detached_join(),
            Self::SelfIdentification => self_identification(),
            Self::ExitNotifiers => exit_notifiers(iterations),
        };
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (passed, details) = match result {
            Ok(details) => (true, details),
            Err(reason) => (false, json!({ "reason": reason })),
        };
        ScenarioReport {
            scenario: self,
            passed,
            iterations,
            duration_ms,
            details,
        }
    }
}

impl FromStr for Scenario {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sc| sc.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| HarnessError::UnknownScenario(s.to_owned()))
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub passed: bool,
    pub iterations: u64,
    pub duration_ms: u64,
    pub details: serde_json::Value,
}

type Outcome = Result<serde_json::Value, String>;

fn spawn<F>(entry: F) -> vmthread_core::ThreadHandle
where
    F: FnOnce() -> Option<ThreadValue> + Send + 'static,
{
    thread_create(Some("harness-worker"), ThreadMode::Joinable, entry)
}

fn joined_value<T: 'static>(handle: &vmthread_core::ThreadHandle) -> Option<T> {
    thread_join(handle).and_then(|v| v.downcast::<T>().ok().map(|b| *b))
}

fn ensure(ok: bool, reason: impl FnOnce() -> String) -> Result<(), String> {
    if ok { Ok(()) } else { Err(reason()) }
}

const COUNTER_THREADS: u64 = 8;

fn mutex_counter(iterations: u64) -> Outcome {
    let lock = Arc::new(Mutex::new());
    // Non-atomic read-modify-write: exact only under mutual exclusion.
    let counter = Arc::new(AtomicU64::new(0));
    let handles: Vec<_> = (0..COUNTER_THREADS)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            spawn(move || {
                for _ in 0..iterations {
                    let _held = lock.guard();
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                }
                None
            })
        })
        .collect();
    for h in &handles {
        let _ = thread_join(h);
    }
    let expected = COUNTER_THREADS * iterations;
    let observed = counter.load(Ordering::Relaxed);
    ensure(observed == expected, || {
        format!("counter {observed}, expected {expected}")
    })?;
    Ok(json!({ "threads": COUNTER_THREADS, "expected": expected, "observed": observed }))
}

fn recursive_mutex(iterations: u64) -> Outcome {
    let depth = iterations.clamp(1, 64);
    let m = Arc::new(RecursiveMutex::new());
    let mut levels: Vec<_> = (0..depth).map(|_| m.guard()).collect();
    let other_gets_in = |m: &Arc<RecursiveMutex>| {
        let other = Arc::clone(m);
        let h = spawn(move || Some(Box::new(other.try_guard().is_some()) as ThreadValue));
        joined_value::<bool>(&h).unwrap_or(false)
    };
    while !levels.is_empty() {
        let held = levels.len();
        ensure(!other_gets_in(&m), || {
            format!("acquired by another thread with {held} levels held")
        })?;
        drop(levels.pop());
    }
    ensure(other_gets_in(&m), || "still held after balanced unlocks".into())?;
    Ok(json!({ "depth": depth }))
}

fn condvar_ping_pong(iterations: u64) -> Outcome {
    let lock = Arc::new(Mutex::new());
    let cond = Arc::new(Condvar::new());
    // Read and written only while `lock` is held.
    let consumer_turn = Arc::new(AtomicBool::new(false));

    let consumer = {
        let lock = Arc::clone(&lock);
        let cond = Arc::clone(&cond);
        let turn = Arc::clone(&consumer_turn);
        spawn(move || {
            for _ in 0..iterations {
                let _held = lock.guard();
                while !turn.load(Ordering::Relaxed) {
                    cond.wait(&lock);
                }
                turn.store(false, Ordering::Relaxed);
                cond.signal();
            }
            None
        })
    };
    for _ in 0..iterations {
        let _held = lock.guard();
        while consumer_turn.load(Ordering::Relaxed) {
            cond.wait(&lock);
        }
        consumer_turn.store(true, Ordering::Relaxed);
        cond.signal();
    }
    let _ = thread_join(&consumer);
    Ok(json!({ "rounds": iterations }))
}

fn semaphore_balance(iterations: u64) -> Outcome {
    const CONSUMERS: u64 = 4;
    let per_consumer = iterations;
    let sem = Arc::new(Semaphore::new(0));
    let balance = Arc::new(AtomicI64::new(0));
    let violations = Arc::new(AtomicUsize::new(0));
    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let sem = Arc::clone(&sem);
            let balance = Arc::clone(&balance);
            let violations = Arc::clone(&violations);
            spawn(move || {
                for _ in 0..per_consumer {
                    sem.wait();
                    if balance.fetch_sub(1, Ordering::SeqCst) < 1 {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                }
                None
            })
        })
        .collect();
    for _ in 0..CONSUMERS * per_consumer {
        balance.fetch_add(1, Ordering::SeqCst);
        sem.post();
    }
    for h in &consumers {
        let _ = thread_join(h);
    }
    let violations = violations.load(Ordering::SeqCst);
    ensure(violations == 0, || {
        format!("{violations} acquisitions without a matching post")
    })?;
    ensure(sem.try_wait(0) == SemWait::TimedOut, || {
        "permits left over after balanced post/wait".into()
    })?;
    Ok(json!({ "posts": CONSUMERS * per_consumer, "consumers": CONSUMERS }))
}

fn semaphore_delayed_post(iterations: u64) -> Outcome {
    let rounds = iterations.min(5);
    let delay = Duration::from_millis(20);
    for round in 0..rounds {
        let sem = Arc::new(Semaphore::new(0));
        let posted = Arc::new(AtomicBool::new(false));
        let poster = {
            let sem = Arc::clone(&sem);
            let posted = Arc::clone(&posted);
            spawn(move || {
                std::thread::sleep(delay);
                posted.store(true, Ordering::SeqCst);
                sem.post();
                None
            })
        };
        sem.wait();
        let early = !posted.load(Ordering::SeqCst);
        let _ = thread_join(&poster);
        ensure(!early, || format!("round {round}: wait returned before post"))?;
    }
    Ok(json!({ "rounds": rounds, "delay_ms": delay.as_millis() as u64 }))
}

fn join_value(iterations: u64) -> Outcome {
    let count = iterations.clamp(1, 256);
    let handles: Vec<_> = (0..count)
        .map(|i| spawn(move || Some(Box::new(i * 3) as ThreadValue)))
        .collect();
    for (i, h) in (0..count).zip(&handles) {
        let got = joined_value::<u64>(h);
        ensure(got == Some(i * 3), || {
            format!("thread {i} joined with {got:?}, expected {}", i * 3)
        })?;
    }
    Ok(json!({ "threads": count }))
}

fn detached_join() -> Outcome {
    let gate = Arc::new(Semaphore::new(0));
    let done = Arc::new(Semaphore::new(0));
    let h = {
        let gate = Arc::clone(&gate);
        let done = Arc::clone(&done);
        thread_create(Some("harness-detached"), ThreadMode::Detached, move || {
            gate.wait();
            done.post();
            Some(Box::new(1_u8) as ThreadValue)
        })
    };
    let start = Instant::now();
    let value = thread_join(&h);
    let waited = start.elapsed();
    gate.post();
    done.wait();
    ensure(value.is_none(), || "detached join produced a value".into())?;
    ensure(waited < Duration::from_secs(1), || {
        format!("detached join blocked for {waited:?}")
    })?;
    Ok(json!({ "join_us": waited.as_micros() as u64 }))
}

fn self_identification() -> Outcome {
    let main = thread_self();
    ensure(thread_is_self(&main), || "unmanaged self not recognized".into())?;
    ensure(!main.is_managed(), || "caller unexpectedly managed".into())?;
    let outside = main.clone();
    let h = spawn(move || {
        let me = thread_self();
        Some(Box::new(thread_is_self(&me) && me.is_managed() && !thread_is_self(&outside))
            as ThreadValue)
    });
    ensure(!thread_is_self(&h), || "creator mistaken for the new thread".into())?;
    ensure(joined_value::<bool>(&h) == Some(true), || {
        "thread failed to identify itself".into()
    })?;
    Ok(json!({}))
}

fn exit_notifiers(iterations: u64) -> Outcome {
    let per_thread = iterations.clamp(1, 32);
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let h = spawn(move || {
        for n in 0..per_thread {
            let sink = Arc::clone(&sink);
            let _ = register_exit_callback(move || sink.lock().push(n));
        }
        None
    });
    let _ = thread_join(&h);
    let seen = seen.lock().clone();
    let expected: Vec<u64> = (0..per_thread).collect();
    ensure(seen == expected, || {
        format!("notifiers ran as {seen:?}, expected {expected:?}")
    })?;
    Ok(json!({ "notifiers": per_thread }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for sc in Scenario::ALL {
            assert_eq!(sc.as_str().parse::<Scenario>().unwrap(), sc);
        }
        assert!(matches!(
            "nope".parse::<Scenario>(),
            Err(HarnessError::UnknownScenario(_))
        ));
    }

    #[test]
    fn selection_all_expands() {
        assert_eq!(Scenario::parse_selection("all").unwrap().len(), 9);
        assert_eq!(
            Scenario::parse_selection("join-value").unwrap(),
            vec![Scenario::JoinValue]
        );
    }

    #[test]
    fn small_runs_pass() {
        for sc in Scenario::ALL {
            let report = sc.run(20);
            assert!(report.passed, "{sc} failed: {}", report.details);
        }
    }

    #[test]
    fn report_serializes_kebab_case_name() {
        let report = Scenario::DetachedJoin.run(1);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["scenario"], "detached-join");
        assert_eq!(json["passed"], true);
    }
}
