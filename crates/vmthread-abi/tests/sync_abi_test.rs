use std::ffi::c_void;
use std::ptr;
use std::time::{Duration, Instant};

use vmthread_abi::sync_abi::{
    VmCond, VmMutex, VmRecMutex, VmSem, vmthread_cond_broadcast, vmthread_cond_destroy,
    vmthread_cond_init, vmthread_cond_signal, vmthread_cond_timedwait, vmthread_mutex_destroy,
    vmthread_mutex_init, vmthread_mutex_lock, vmthread_mutex_trylock, vmthread_mutex_unlock,
    vmthread_rec_mutex_destroy, vmthread_rec_mutex_init, vmthread_rec_mutex_lock,
    vmthread_rec_mutex_trylock, vmthread_rec_mutex_unlock, vmthread_sem_destroy,
    vmthread_sem_init, vmthread_sem_post, vmthread_sem_timedwait, vmthread_sem_wait,
};
use vmthread_abi::thread_abi::{
    VMTHREAD_JOINABLE, VmThread, vmthread_thread_create, vmthread_thread_join,
    vmthread_thread_release,
};

#[test]
fn mutex_roundtrip_and_trylock_busy() {
    let mut m: *mut VmMutex = ptr::null_mut();
    unsafe {
        assert_eq!(vmthread_mutex_init(&mut m), 0);
        assert_eq!(vmthread_mutex_lock(m), 0);
        assert_eq!(vmthread_mutex_trylock(m), libc::EBUSY);
        assert_eq!(vmthread_mutex_unlock(m), 0);
        assert_eq!(vmthread_mutex_trylock(m), 0);
        assert_eq!(vmthread_mutex_unlock(m), 0);
        assert_eq!(vmthread_mutex_destroy(m), 0);
    }
}

unsafe extern "C-unwind" fn try_rec(arg: *mut c_void) -> *mut c_void {
    let rc = unsafe { vmthread_rec_mutex_trylock(arg as *mut VmRecMutex) };
    if rc == 0 {
        unsafe { vmthread_rec_mutex_unlock(arg as *mut VmRecMutex) };
    }
    rc as usize as *mut c_void
}

fn trylock_from_other_thread(m: *mut VmRecMutex) -> i32 {
    let mut t: *mut VmThread = ptr::null_mut();
    let mut ret: *mut c_void = ptr::null_mut();
    unsafe {
        assert_eq!(
            vmthread_thread_create(
                &mut t,
                ptr::null(),
                Some(try_rec),
                m.cast(),
                VMTHREAD_JOINABLE
            ),
            0
        );
        assert_eq!(vmthread_thread_join(t, &mut ret), 0);
        vmthread_thread_release(t);
    }
    ret as usize as i32
}

#[test]
fn recursive_mutex_counts_levels() {
    let mut m: *mut VmRecMutex = ptr::null_mut();
    unsafe {
        assert_eq!(vmthread_rec_mutex_init(&mut m), 0);
        assert_eq!(vmthread_rec_mutex_lock(m), 0);
        assert_eq!(vmthread_rec_mutex_trylock(m), 0);
    }
    assert_eq!(trylock_from_other_thread(m), libc::EBUSY);
    unsafe { vmthread_rec_mutex_unlock(m) };
    assert_eq!(trylock_from_other_thread(m), libc::EBUSY);
    unsafe { vmthread_rec_mutex_unlock(m) };
    assert_eq!(trylock_from_other_thread(m), 0);
    unsafe { assert_eq!(vmthread_rec_mutex_destroy(m), 0) };
}

#[test]
fn cond_timedwait_times_out_and_keeps_mutex() {
    let mut m: *mut VmMutex = ptr::null_mut();
    let mut c: *mut VmCond = ptr::null_mut();
    unsafe {
        assert_eq!(vmthread_mutex_init(&mut m), 0);
        assert_eq!(vmthread_cond_init(&mut c), 0);
        assert_eq!(vmthread_cond_signal(c), 0);
        assert_eq!(vmthread_cond_broadcast(c), 0);
        assert_eq!(vmthread_mutex_lock(m), 0);
        let start = Instant::now();
        assert!(!vmthread_cond_timedwait(c, m, 10));
        assert!(start.elapsed() >= Duration::from_millis(5));
        assert_eq!(vmthread_mutex_trylock(m), libc::EBUSY);
        assert_eq!(vmthread_mutex_unlock(m), 0);
        assert_eq!(vmthread_cond_destroy(c), 0);
        assert_eq!(vmthread_mutex_destroy(m), 0);
    }
}

#[test]
fn sem_timedwait_reports_minus_one_then_zero() {
    let mut s: *mut VmSem = ptr::null_mut();
    unsafe {
        assert_eq!(vmthread_sem_init(&mut s, 0), 0);
        assert_eq!(vmthread_sem_timedwait(s, 0), -1);
        assert_eq!(vmthread_sem_timedwait(s, 5), -1);
        assert_eq!(vmthread_sem_post(s), 0);
        assert_eq!(vmthread_sem_timedwait(s, 0), 0);
        assert_eq!(vmthread_sem_post(s), 0);
        assert_eq!(vmthread_sem_wait(s), 0);
        assert_eq!(vmthread_sem_destroy(s), 0);
    }
}
