//! Lock, condition variable and semaphore entry points.
//!
//! Every call returns 0 on success or a positive errno, except where noted:
//! `vmthread_cond_timedwait` returns whether it was signalled and
//! `vmthread_sem_timedwait` returns 0 or -1.

use std::ffi::c_int;

use vmthread_core::{Condvar, Mutex, RecursiveMutex, SEM_VALUE_MAX, SemWait, Semaphore};

/// Opaque mutex handle.
pub type VmMutex = Mutex;
/// Opaque recursive mutex handle.
pub type VmRecMutex = RecursiveMutex;
/// Opaque condition variable handle.
pub type VmCond = Condvar;
/// Opaque semaphore handle.
pub type VmSem = Semaphore;

fn into_out<T>(value: T) -> *mut T {
    Box::into_raw(Box::new(value))
}

/// Reclaim a cell allocated by one of the `*_init` calls.
unsafe fn reclaim<T>(ptr: *mut T) -> Box<T> {
    // SAFETY: `ptr` came from `into_out` and is destroyed at most once.
    unsafe { Box::from_raw(ptr) }
}

// ---------------------------------------------------------------------------
// Mutex
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_mutex_init(out: *mut *mut VmMutex) -> c_int {
    write_out_or_einval!(out, into_out(Mutex::new()));
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_mutex_destroy(mutex: *mut VmMutex) -> c_int {
    if mutex.is_null() {
        return libc::EINVAL;
    }
    let mutex = unsafe { reclaim(mutex) };
    mutex.destroy();
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_mutex_lock(mutex: *mut VmMutex) -> c_int {
    deref_or_return!(mutex, libc::EINVAL).lock();
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_mutex_trylock(mutex: *mut VmMutex) -> c_int {
    if deref_or_return!(mutex, libc::EINVAL).try_lock() {
        0
    } else {
        libc::EBUSY
    }
}

/// Release a mutex the calling thread holds.
///
/// Releasing a mutex the caller does not hold is undefined, as for the host
/// primitive.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_mutex_unlock(mutex: *mut VmMutex) -> c_int {
    let mutex = deref_or_return!(mutex, libc::EINVAL);
    // SAFETY: the C caller holds `mutex`.
    unsafe { mutex.unlock() };
    0
}

// ---------------------------------------------------------------------------
// Recursive mutex
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_rec_mutex_init(out: *mut *mut VmRecMutex) -> c_int {
    write_out_or_einval!(out, into_out(RecursiveMutex::new()));
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_rec_mutex_destroy(mutex: *mut VmRecMutex) -> c_int {
    if mutex.is_null() {
        return libc::EINVAL;
    }
    let mutex = unsafe { reclaim(mutex) };
    mutex.destroy();
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_rec_mutex_lock(mutex: *mut VmRecMutex) -> c_int {
    deref_or_return!(mutex, libc::EINVAL).lock();
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_rec_mutex_trylock(mutex: *mut VmRecMutex) -> c_int {
    if deref_or_return!(mutex, libc::EINVAL).try_lock() {
        0
    } else {
        libc::EBUSY
    }
}

/// Release one level. Only the owning thread may call this.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_rec_mutex_unlock(mutex: *mut VmRecMutex) -> c_int {
    let mutex = deref_or_return!(mutex, libc::EINVAL);
    // SAFETY: the C caller owns at least one level of `mutex`.
    unsafe { mutex.unlock() };
    0
}

// ---------------------------------------------------------------------------
// Condition variable
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_cond_init(out: *mut *mut VmCond) -> c_int {
    write_out_or_einval!(out, into_out(Condvar::new()));
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_cond_destroy(cond: *mut VmCond) -> c_int {
    if cond.is_null() {
        return libc::EINVAL;
    }
    let cond = unsafe { reclaim(cond) };
    cond.destroy();
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_cond_signal(cond: *mut VmCond) -> c_int {
    deref_or_return!(cond, libc::EINVAL).signal();
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_cond_broadcast(cond: *mut VmCond) -> c_int {
    deref_or_return!(cond, libc::EINVAL).broadcast();
    0
}

/// The caller must hold `mutex`; it is held again on return.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_cond_wait(cond: *mut VmCond, mutex: *mut VmMutex) -> c_int {
    let cond = deref_or_return!(cond, libc::EINVAL);
    let mutex = deref_or_return!(mutex, libc::EINVAL);
    cond.wait(mutex);
    0
}

/// Returns `true` when woken, `false` on timeout or a null argument.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_cond_timedwait(
    cond: *mut VmCond,
    mutex: *mut VmMutex,
    ms: u32,
) -> bool {
    let cond = deref_or_return!(cond, false);
    let mutex = deref_or_return!(mutex, false);
    !cond.wait_timed(mutex, ms).timed_out()
}

// ---------------------------------------------------------------------------
// Semaphore
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_sem_init(out: *mut *mut VmSem, count: u32) -> c_int {
    if count > SEM_VALUE_MAX {
        return libc::EINVAL;
    }
    write_out_or_einval!(out, into_out(Semaphore::new(count)));
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_sem_destroy(sem: *mut VmSem) -> c_int {
    if sem.is_null() {
        return libc::EINVAL;
    }
    let sem = unsafe { reclaim(sem) };
    sem.destroy();
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_sem_post(sem: *mut VmSem) -> c_int {
    deref_or_return!(sem, libc::EINVAL).post();
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_sem_wait(sem: *mut VmSem) -> c_int {
    deref_or_return!(sem, libc::EINVAL).wait();
    0
}

/// 0 when a permit was taken within `ms` milliseconds, -1 otherwise.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_sem_timedwait(sem: *mut VmSem, ms: u32) -> c_int {
    match deref_or_return!(sem, -1).try_wait(ms) {
        SemWait::Acquired => 0,
        SemWait::TimedOut => -1,
    }
}
