//! Host thread naming.
//!
//! Naming is a cached host capability plus a process-wide toggle. The toggle
//! starts from `VMTHREAD_THREAD_NAMING` and can be flipped with
//! [`enable_thread_naming`]. Failures never propagate: an unsupported host is
//! reported once, a failing host call disables naming for the rest of the
//! process.

use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use super::lifecycle::{self, ControlBlock};
use crate::config;
use crate::diag::{self, DiagRecord, LogLevel};
use crate::error::ThreadError;

/// Longest name the host keeps, in bytes, excluding the terminator.
pub const HOST_NAME_MAX: usize = 15;

const NAMING_UNRESOLVED: u8 = 0;
const NAMING_OFF: u8 = 1;
const NAMING_ON: u8 = 2;

static NAMING: AtomicU8 = AtomicU8::new(NAMING_UNRESOLVED);
static UNSUPPORTED_REPORTED: AtomicBool = AtomicBool::new(false);

/// Host identity of a thread, as needed by the naming call.
#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct HostToken(libc::pthread_t);

// SAFETY: a pthread_t is an opaque identifier; it may be used from any thread
// while the thread it names has not been reclaimed, which `with_live_token`
// guarantees.
#[cfg(unix)]
unsafe impl Send for HostToken {}

#[cfg(not(unix))]
#[derive(Debug, Clone, Copy)]
pub(crate) struct HostToken;

#[cfg(unix)]
pub(crate) fn token_of(handle: &std::thread::JoinHandle<()>) -> Option<HostToken> {
    use std::os::unix::thread::JoinHandleExt;
    Some(HostToken(handle.as_pthread_t() as libc::pthread_t))
}

#[cfg(not(unix))]
pub(crate) fn token_of(_handle: &std::thread::JoinHandle<()>) -> Option<HostToken> {
    None
}

/// Whether the host can name threads. Probed once per process.
#[must_use]
pub fn naming_supported() -> bool {
    static SUPPORTED: OnceLock<bool> = OnceLock::new();
    *SUPPORTED.get_or_init(|| cfg!(any(target_os = "linux", target_os = "android")))
}

fn supported_or_report() -> bool {
    if naming_supported() {
        return true;
    }
    if !UNSUPPORTED_REPORTED.swap(true, Ordering::AcqRel) {
        diag::log(
            LogLevel::Warn,
            "naming",
            "naming_unsupported",
            "thread naming not supported on this host",
        );
    }
    false
}

/// Whether new names are currently pushed to the host.
#[must_use]
pub fn naming_enabled() -> bool {
    match NAMING.load(Ordering::Acquire) {
        NAMING_ON => true,
        NAMING_OFF => false,
        _ => {
            let on = config::naming_requested() && supported_or_report();
            let initial = if on { NAMING_ON } else { NAMING_OFF };
            // An explicit enable_thread_naming() that raced us wins.
            let _ = NAMING.compare_exchange(
                NAMING_UNRESOLVED,
                initial,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            NAMING.load(Ordering::Acquire) == NAMING_ON
        }
    }
}

/// Switch host thread naming on or off for threads named from now on.
///
/// Enabling on a host without naming support logs a warning once and leaves
/// naming off.
pub fn enable_thread_naming(enable: bool) {
    let on = enable && supported_or_report();
    NAMING.store(if on { NAMING_ON } else { NAMING_OFF }, Ordering::Release);
}

/// Longest prefix of `name` that fits the host limit without splitting a
/// character.
#[must_use]
pub fn truncate_for_host(name: &str) -> &str {
    if name.len() <= HOST_NAME_MAX {
        return name;
    }
    let mut end = HOST_NAME_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn validate(name: &str) -> Result<(), ThreadError> {
    if name.contains('\0') {
        Err(ThreadError::InvalidName)
    } else {
        Ok(())
    }
}

pub(crate) fn apply(block: &ControlBlock, name: &str) -> Result<(), ThreadError> {
    validate(name)?;
    block.record_name(name);
    if !naming_enabled() {
        return Err(ThreadError::NamingDisabled);
    }
    // A thread naming itself may run before its creator stored the token.
    let is_current = lifecycle::current_block()
        .is_some_and(|current| std::ptr::eq(Arc::as_ptr(&current), block));
    let result = if is_current {
        set_host_name(current_token(), name)
    } else {
        block.with_live_token(|token| set_host_name(token, name))?
    };
    absorb_host_failure(result)
}

pub(crate) fn apply_current(name: &str) -> Result<(), ThreadError> {
    validate(name)?;
    if !naming_enabled() {
        return Err(ThreadError::NamingDisabled);
    }
    absorb_host_failure(set_host_name(current_token(), name))
}

fn absorb_host_failure(result: Result<(), ThreadError>) -> Result<(), ThreadError> {
    match result {
        Err(ThreadError::Host { op, errno }) => {
            enable_thread_naming(false);
            diag::emit(
                DiagRecord::new(LogLevel::Warn, "naming", "naming_failed")
                    .with_message(format!("{op} failed; thread naming disabled"))
                    .with_errno(errno),
            );
            Ok(())
        }
        other => other,
    }
}

#[cfg(unix)]
fn current_token() -> HostToken {
    // SAFETY: pthread_self has no preconditions.
    HostToken(unsafe { libc::pthread_self() })
}

#[cfg(not(unix))]
fn current_token() -> HostToken {
    HostToken
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn set_host_name(token: HostToken, name: &str) -> Result<(), ThreadError> {
    let cname =
        std::ffi::CString::new(truncate_for_host(name)).map_err(|_| ThreadError::InvalidName)?;
    // SAFETY: `token` names a live thread (see `with_live_token`) and `cname`
    // is a NUL-terminated string within the host length limit.
    let rc = unsafe { libc::pthread_setname_np(token.0, cname.as_ptr()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(ThreadError::Host {
            op: "pthread_setname_np",
            errno: rc,
        })
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_host_name(_token: HostToken, _name: &str) -> Result<(), ThreadError> {
    Err(ThreadError::Unsupported {
        op: "pthread_setname_np",
    })
}
