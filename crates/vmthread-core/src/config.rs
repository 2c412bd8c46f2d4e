//! Runtime configuration.
//!
//! Two knobs are read from the environment on first use and cached for the
//! life of the process:
//! - `VMTHREAD_LOG`: diagnostic threshold (`off`, `error`, `warn` (default),
//!   `info`, `debug`, `trace`).
//! - `VMTHREAD_THREAD_NAMING`: initial state of the thread naming toggle
//!   (`on`/`off`, default `off`). [`crate::enable_thread_naming`] overrides it.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::diag::LogLevel;

// Atomic cache: 0=unresolved, 1=off, 2..=7 = LogLevel, 255=resolving.
// A reader that observes RESOLVING uses the default without waiting.
static CACHED_LOG: AtomicU8 = AtomicU8::new(0);

const LOG_UNRESOLVED: u8 = 0;
const LOG_OFF: u8 = 1;
const LOG_RESOLVING: u8 = 255;

// 0=unresolved, 1=off, 2=on.
static CACHED_NAMING: AtomicU8 = AtomicU8::new(0);

const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Warn;

/// Parse a diagnostic threshold (case-insensitive). `None` means logging is off.
#[must_use]
pub fn parse_log_threshold(raw: &str) -> Option<LogLevel> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "off" | "none" | "0" | "false" => None,
        "trace" => Some(LogLevel::Trace),
        "debug" => Some(LogLevel::Debug),
        "info" => Some(LogLevel::Info),
        "warn" | "warning" => Some(LogLevel::Warn),
        "error" => Some(LogLevel::Error),
        "fatal" => Some(LogLevel::Fatal),
        _ => Some(DEFAULT_LOG_LEVEL),
    }
}

/// Parse an on/off switch. Unknown values count as off.
#[must_use]
pub fn parse_switch(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "on" | "yes" | "true" | "enable" | "enabled"
    )
}

fn encode_threshold(level: Option<LogLevel>) -> u8 {
    match level {
        None => LOG_OFF,
        Some(level) => 2 + level as u8,
    }
}

fn decode_threshold(v: u8) -> Option<LogLevel> {
    match v {
        LOG_OFF => None,
        2 => Some(LogLevel::Trace),
        3 => Some(LogLevel::Debug),
        4 => Some(LogLevel::Info),
        5 => Some(LogLevel::Warn),
        6 => Some(LogLevel::Error),
        7 => Some(LogLevel::Fatal),
        _ => Some(DEFAULT_LOG_LEVEL),
    }
}

/// Current diagnostic threshold; `None` when diagnostics are off.
///
/// Reads `VMTHREAD_LOG` on the first call. A call that arrives while another
/// thread is resolving sees the default threshold.
#[must_use]
pub fn log_threshold() -> Option<LogLevel> {
    let cached = CACHED_LOG.load(Ordering::Relaxed);
    if cached != LOG_UNRESOLVED && cached != LOG_RESOLVING {
        return decode_threshold(cached);
    }
    if cached == LOG_RESOLVING {
        return Some(DEFAULT_LOG_LEVEL);
    }

    if CACHED_LOG
        .compare_exchange(
            LOG_UNRESOLVED,
            LOG_RESOLVING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        let v = CACHED_LOG.load(Ordering::Relaxed);
        return if v != LOG_UNRESOLVED && v != LOG_RESOLVING {
            decode_threshold(v)
        } else {
            Some(DEFAULT_LOG_LEVEL)
        };
    }

    let level = std::env::var("VMTHREAD_LOG")
        .map(|v| parse_log_threshold(&v))
        .unwrap_or(Some(DEFAULT_LOG_LEVEL));
    // A concurrent set_log_level() may have landed while we were resolving.
    let _ = CACHED_LOG.compare_exchange(
        LOG_RESOLVING,
        encode_threshold(level),
        Ordering::Release,
        Ordering::Relaxed,
    );
    decode_threshold(CACHED_LOG.load(Ordering::Acquire))
}

/// Override the diagnostic threshold for the rest of the process.
pub fn set_log_level(level: Option<LogLevel>) {
    CACHED_LOG.store(encode_threshold(level), Ordering::Release);
}

/// Whether `VMTHREAD_THREAD_NAMING` asked for thread naming at startup.
#[must_use]
pub fn naming_requested() -> bool {
    match CACHED_NAMING.load(Ordering::Relaxed) {
        1 => false,
        2 => true,
        _ => {
            let on = std::env::var("VMTHREAD_THREAD_NAMING")
                .map(|v| parse_switch(&v))
                .unwrap_or(false);
            CACHED_NAMING.store(if on { 2 } else { 1 }, Ordering::Relaxed);
            on
        }
    }
}
