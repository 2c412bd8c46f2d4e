//! Thread lifecycle, naming and exit-notifier entry points.
//!
//! Start routines and `vmthread_thread_exit` use the `C-unwind` ABI:
//! `vmthread_thread_exit` leaves the thread by unwinding to the trampoline,
//! so any frames between it and the start routine must allow unwinding.

use std::ffi::{CStr, c_char, c_int, c_ulong, c_void};
use std::ptr;

use parking_lot::Mutex;
use vmthread_core::{
    ExitNotifierId, ThreadHandle, ThreadMode, ThreadValue, enable_thread_naming,
    register_exit_callback, thread_create, thread_exit, thread_get_affinity, thread_is_self,
    thread_join, thread_self, thread_set_affinity, unregister_exit_callback,
};

/// Entry point of a thread started with [`vmthread_thread_create`].
pub type StartRoutine = unsafe extern "C-unwind" fn(*mut c_void) -> *mut c_void;

pub const VMTHREAD_JOINABLE: c_int = 0;
pub const VMTHREAD_DETACHED: c_int = 1;

/// Opaque thread handle. Released with [`vmthread_thread_release`].
pub struct VmThread {
    handle: ThreadHandle,
}

/// Caller-owned exit notifier record. `notify` receives the record itself and
/// a null data pointer.
#[repr(C)]
pub struct VmNotifier {
    pub notify: Option<unsafe extern "C" fn(*mut VmNotifier, *mut c_void)>,
}

// Raw pointers handed to another thread; ownership stays with the C caller.
struct SendPtr(*mut c_void);

// SAFETY: the pointer is only passed back to C, which owns its thread-safety.
unsafe impl Send for SendPtr {}

impl SendPtr {
    fn get(self) -> *mut c_void {
        self.0
    }
}

fn parse_mode(mode: c_int) -> Option<ThreadMode> {
    match mode {
        VMTHREAD_JOINABLE => Some(ThreadMode::Joinable),
        VMTHREAD_DETACHED => Some(ThreadMode::Detached),
        _ => None,
    }
}

fn into_ptr_value(ret: *mut c_void) -> ThreadValue {
    Box::new(ret as usize)
}

fn from_ptr_value(value: Option<ThreadValue>) -> *mut c_void {
    value
        .and_then(|v| v.downcast::<usize>().ok())
        .map_or(ptr::null_mut(), |addr| *addr as *mut c_void)
}

fn boxed(handle: ThreadHandle) -> *mut VmThread {
    Box::into_raw(Box::new(VmThread { handle }))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_thread_create(
    out: *mut *mut VmThread,
    name: *const c_char,
    start_routine: Option<StartRoutine>,
    arg: *mut c_void,
    mode: c_int,
) -> c_int {
    if out.is_null() {
        return libc::EINVAL;
    }
    let (Some(start), Some(mode)) = (start_routine, parse_mode(mode)) else {
        return libc::EINVAL;
    };
    let name = if name.is_null() {
        None
    } else {
        // SAFETY: non-null, caller passes a NUL-terminated string.
        Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
    };
    let arg = SendPtr(arg);
    let handle = thread_create(name.as_deref(), mode, move || {
        // SAFETY: the caller supplied a start routine valid for `arg`.
        let ret = unsafe { start(arg.get()) };
        Some(into_ptr_value(ret))
    });
    write_out_or_einval!(out, boxed(handle));
    0
}

/// Wait for `thread` and store its exit pointer in `retval` (if non-null).
/// Detached threads yield a null exit pointer immediately.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_thread_join(
    thread: *mut VmThread,
    retval: *mut *mut c_void,
) -> c_int {
    let thread = deref_or_return!(thread, libc::EINVAL);
    let ret = from_ptr_value(thread_join(&thread.handle));
    if !retval.is_null() {
        // SAFETY: non-null out-pointer supplied by the caller.
        unsafe { retval.write(ret) };
    }
    0
}

/// Free a handle from `vmthread_thread_create` or `vmthread_thread_get_self`.
/// The thread itself is unaffected.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_thread_release(thread: *mut VmThread) -> c_int {
    if thread.is_null() {
        return libc::EINVAL;
    }
    // SAFETY: allocated by `boxed` and released at most once.
    drop(unsafe { Box::from_raw(thread) });
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn vmthread_thread_exit(retval: *mut c_void) -> ! {
    thread_exit(Some(into_ptr_value(retval)))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_thread_get_self(out: *mut *mut VmThread) -> c_int {
    write_out_or_einval!(out, boxed(thread_self()));
    0
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_thread_is_self(thread: *const VmThread) -> bool {
    thread_is_self(&deref_or_return!(thread, false).handle)
}

/// Not supported: always `-ENOSYS` for a valid handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_thread_set_affinity(
    thread: *mut VmThread,
    cpus: *const c_ulong,
    ncpus: usize,
) -> c_int {
    let thread = deref_or_return!(thread, -libc::EINVAL);
    let cpus: Vec<usize> = if cpus.is_null() {
        Vec::new()
    } else {
        // SAFETY: caller passes `ncpus` readable entries.
        unsafe { std::slice::from_raw_parts(cpus, ncpus) }
            .iter()
            .map(|&c| c as usize)
            .collect()
    };
    match thread_set_affinity(&thread.handle, &cpus) {
        Ok(()) => 0,
        Err(err) => -err.errno(),
    }
}

/// Not supported: always `-ENOSYS` for a valid handle; outputs are untouched.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_thread_get_affinity(
    thread: *mut VmThread,
    _cpus: *mut *mut c_ulong,
    _ncpus: *mut usize,
) -> c_int {
    let thread = deref_or_return!(thread, -libc::EINVAL);
    match thread_get_affinity(&thread.handle) {
        Ok(_) => 0,
        Err(err) => -err.errno(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn vmthread_thread_naming(enable: bool) {
    enable_thread_naming(enable);
}

/// Best-effort rename. 0 on success, otherwise the errno of the failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_thread_set_name(
    thread: *mut VmThread,
    name: *const c_char,
) -> c_int {
    let thread = deref_or_return!(thread, libc::EINVAL);
    if name.is_null() {
        return libc::EINVAL;
    }
    // SAFETY: non-null, caller passes a NUL-terminated string.
    let name = unsafe { CStr::from_ptr(name) }.to_string_lossy();
    match thread.handle.set_name(&name) {
        Ok(()) => 0,
        Err(err) => err.errno(),
    }
}

// Pending C notifiers by record address.
static C_NOTIFIERS: Mutex<Vec<(usize, ExitNotifierId)>> = parking_lot::const_mutex(Vec::new());

fn forget_notifier(key: usize) -> Option<ExitNotifierId> {
    let mut pending = C_NOTIFIERS.lock();
    let at = pending.iter().position(|(k, _)| *k == key)?;
    Some(pending.swap_remove(at).1)
}

/// Run `notifier` when the calling thread exits (or at process exit when
/// called from a thread this library did not create).
///
/// Returns `EBUSY` when the calling thread is already running its exit
/// notifiers.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_thread_atexit_add(notifier: *mut VmNotifier) -> c_int {
    if deref_or_return!(notifier, libc::EINVAL).notify.is_none() {
        return libc::EINVAL;
    }
    let key = notifier as usize;
    let id = register_exit_callback(move || {
        let _ = forget_notifier(key);
        let notifier = key as *mut VmNotifier;
        // SAFETY: the record stays valid until it is removed or has run.
        if let Some(notify) = unsafe { (*notifier).notify } {
            unsafe { notify(notifier, ptr::null_mut()) };
        }
    });
    if id.is_rejected() {
        return libc::EBUSY;
    }
    C_NOTIFIERS.lock().push((key, id));
    0
}

/// Cancel a pending notifier. Unknown or already-run records are ignored.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vmthread_thread_atexit_remove(notifier: *mut VmNotifier) -> c_int {
    if notifier.is_null() {
        return libc::EINVAL;
    }
    if let Some(id) = forget_notifier(notifier as usize) {
        unregister_exit_callback(&id);
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing() {
        assert_eq!(parse_mode(VMTHREAD_JOINABLE), Some(ThreadMode::Joinable));
        assert_eq!(parse_mode(VMTHREAD_DETACHED), Some(ThreadMode::Detached));
        assert_eq!(parse_mode(7), None);
    }

    #[test]
    fn exit_pointer_survives_the_value_box() {
        let p = 0x5000 as *mut c_void;
        assert_eq!(from_ptr_value(Some(into_ptr_value(p))), p);
        assert!(from_ptr_value(None).is_null());
        assert!(from_ptr_value(Some(Box::new("not a pointer"))).is_null());
    }

    #[test]
    fn create_rejects_missing_pieces() {
        let mut t: *mut VmThread = ptr::null_mut();
        unsafe {
            assert_eq!(
                vmthread_thread_create(&mut t, ptr::null(), None, ptr::null_mut(), 0),
                libc::EINVAL
            );
        }
        assert!(t.is_null());
    }
}
