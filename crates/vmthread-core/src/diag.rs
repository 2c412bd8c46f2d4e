//! Structured diagnostics.
//!
//! Every diagnostic is one JSON object per line (JSONL) so that the runtime's
//! log collectors can join thread-layer events with the rest of the system.
//!
//! Provides:
//! - [`DiagRecord`]: the record shape (`timestamp`, `level`, `event`,
//!   `component` required; the rest optional).
//! - [`emit`]: filter by the configured threshold and write to the sink.
//! - [`fatal`]: write a `fatal` record and abort the process.
//! - [`capture`]: redirect records into memory (tests only).

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config;

/// Severity level for diagnostic records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// One diagnostic line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagRecord {
    pub timestamp: String,
    pub level: LogLevel,
    pub event: String,
    /// Emitting subsystem (`mutex`, `cond`, `sem`, `thread`, `naming`, ...).
    pub component: String,
    /// Name of the calling thread: the recorded name of a managed thread,
    /// else the host thread's own name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn current_thread_name() -> Option<String> {
    crate::thread::lifecycle::current_name()
        .or_else(|| std::thread::current().name().map(str::to_owned))
}

impl DiagRecord {
    /// Create a record with the required fields only.
    #[must_use]
    pub fn new(level: LogLevel, component: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            level,
            event: event.into(),
            component: component.into(),
            thread: current_thread_name(),
            message: None,
            errno: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

type CaptureBuffer = Arc<Mutex<Vec<String>>>;

enum Sink {
    Stderr,
    Capture(CaptureBuffer),
}

static SINK: Mutex<Sink> = parking_lot::const_mutex(Sink::Stderr);

/// Returns true if a record at `level` would be written.
#[must_use]
pub fn enabled(level: LogLevel) -> bool {
    if level == LogLevel::Fatal {
        return true;
    }
    config::log_threshold().is_some_and(|threshold| level >= threshold)
}

/// Write `record` to the active sink if its level passes the threshold.
///
/// Sink failures are swallowed: diagnostics must never change the outcome of
/// the operation that produced them.
pub fn emit(record: DiagRecord) {
    if !enabled(record.level) {
        return;
    }
    let Ok(line) = record.to_jsonl() else {
        return;
    };
    match &*SINK.lock() {
        Sink::Stderr => {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{line}");
        }
        Sink::Capture(buf) => buf.lock().push(line),
    }
}

/// Shorthand for a record carrying only a message.
pub fn log(level: LogLevel, component: &str, event: &str, message: impl Into<String>) {
    if enabled(level) {
        emit(DiagRecord::new(level, component, event).with_message(message));
    }
}

/// Report an unrecoverable host failure and abort.
///
/// Used when a host primitive reports something other than success or a
/// timeout: the primitive is corrupt and there is no way to degrade.
pub fn fatal(component: &str, event: &str, message: impl Into<String>, errno: Option<i32>) -> ! {
    let mut record = DiagRecord::new(LogLevel::Fatal, component, event).with_message(message);
    record.errno = errno;
    emit(record);
    std::process::abort()
}

/// Records written while a capture is active.
#[derive(Clone)]
pub struct Capture {
    buf: CaptureBuffer,
}

impl Capture {
    /// Lines captured so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.buf.lock().clone()
    }

    /// Captured lines parsed back into records; malformed lines are skipped.
    #[must_use]
    pub fn records(&self) -> Vec<DiagRecord> {
        self.buf
            .lock()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Captured records with the given event name.
    #[must_use]
    pub fn events(&self, event: &str) -> Vec<DiagRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.event == event)
            .collect()
    }
}

/// Redirect all diagnostics into memory until [`release`] is called.
///
/// The sink is process-wide, so tests that capture should filter by event.
#[doc(hidden)]
pub fn capture() -> Capture {
    let mut sink = SINK.lock();
    if let Sink::Capture(buf) = &*sink {
        return Capture {
            buf: Arc::clone(buf),
        };
    }
    let buf: CaptureBuffer = Arc::new(Mutex::new(Vec::new()));
    *sink = Sink::Capture(Arc::clone(&buf));
    Capture { buf }
}

/// Restore the stderr sink.
#[doc(hidden)]
pub fn release() {
    *SINK.lock() = Sink::Stderr;
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year,
        month,
        day,
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
        millis,
    )
}

// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
