//! Lock and semaphore fast-path benchmarks.
//!
//! Uncontended costs only; the stress harness covers contention.

use criterion::{Criterion, criterion_group, criterion_main};
use vmthread_abi::sync_abi::{
    VmMutex, vmthread_mutex_destroy, vmthread_mutex_init, vmthread_mutex_lock,
    vmthread_mutex_unlock,
};
use vmthread_core::{Mutex, RecursiveMutex, Semaphore};

fn bench_mutex_lock_unlock(c: &mut Criterion) {
    let m = Mutex::new();
    c.bench_function("mutex_lock_unlock", |b| {
        b.iter(|| {
            m.lock();
            // SAFETY: locked on the line above by this thread.
            unsafe { m.unlock() };
        });
    });
}

fn bench_mutex_trylock(c: &mut Criterion) {
    let m = Mutex::new();
    c.bench_function("mutex_trylock", |b| {
        b.iter(|| {
            if criterion::black_box(m.try_lock()) {
                // SAFETY: the try_lock succeeded on this thread.
                unsafe { m.unlock() };
            }
        });
    });
}

fn bench_rec_mutex_nested(c: &mut Criterion) {
    let m = RecursiveMutex::new();
    c.bench_function("rec_mutex_nested_4", |b| {
        b.iter(|| {
            for _ in 0..4 {
                m.lock();
            }
            for _ in 0..4 {
                // SAFETY: four levels taken above on this thread.
                unsafe { m.unlock() };
            }
        });
    });
}

fn bench_sem_post_wait(c: &mut Criterion) {
    let sem = Semaphore::new(0);
    c.bench_function("sem_post_wait", |b| {
        b.iter(|| {
            sem.post();
            sem.wait();
        });
    });
}

fn bench_abi_mutex(c: &mut Criterion) {
    let mut m: *mut VmMutex = std::ptr::null_mut();
    // SAFETY: `m` is initialized by the ABI and destroyed after the bench.
    unsafe { vmthread_mutex_init(&mut m) };
    c.bench_function("abi_mutex_lock_unlock", |b| {
        b.iter(|| unsafe {
            criterion::black_box(vmthread_mutex_lock(m));
            criterion::black_box(vmthread_mutex_unlock(m));
        });
    });
    unsafe { vmthread_mutex_destroy(m) };
}

fn bench_mutex_guard(c: &mut Criterion) {
    let m = Mutex::new();
    c.bench_function("mutex_guard", |b| {
        b.iter(|| drop(criterion::black_box(m.guard())));
    });
}

criterion_group!(
    benches,
    bench_mutex_lock_unlock,
    bench_mutex_guard,
    bench_mutex_trylock,
    bench_rec_mutex_nested,
    bench_sem_post_wait,
    bench_abi_mutex
);
criterion_main!(benches);
