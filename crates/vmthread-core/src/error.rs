//! Error type for the few fallible thread-layer calls.
//!
//! Most of this crate never returns an error: contention and timeouts are
//! ordinary results, usage errors panic, and host failures abort. What is left
//! is best-effort functionality the host may not offer.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadError {
    /// The host target has no implementation of `op`.
    #[error("{op} is not supported on this host")]
    Unsupported { op: &'static str },
    /// Thread names cannot contain interior NUL bytes.
    #[error("thread name contains a NUL byte")]
    InvalidName,
    /// Naming is switched off (or was disabled after a host failure).
    #[error("thread naming is disabled")]
    NamingDisabled,
    /// The thread has already exited; its host identity is gone.
    #[error("thread has exited")]
    Exited,
    /// A host call failed with the given errno.
    #[error("{op} failed: errno {errno}")]
    Host { op: &'static str, errno: i32 },
}

impl ThreadError {
    /// errno-style code for the C boundary.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::Unsupported { .. } => libc::ENOSYS,
            Self::InvalidName => libc::EINVAL,
            Self::NamingDisabled => libc::EPERM,
            Self::Exited => libc::ESRCH,
            Self::Host { errno, .. } => *errno,
        }
    }
}
