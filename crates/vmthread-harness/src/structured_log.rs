//! Structured evidence log for harness runs.
//!
//! Provides:
//! - [`LogEntry`]: one JSONL record per scenario run (required: `timestamp`,
//!   `trace_id`, `level`, `event`).
//! - [`LogEmitter`]: writes records to any `Write` sink with sequential trace ids.
//! - [`validate_log_line`]: checks a single JSONL line against the schema.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vmthread_core::diag::{LogLevel, now_utc};

/// Scenario outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            scenario: None,
            outcome: None,
            iterations: None,
            duration_ms: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = Some(iterations);
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// JSONL writer with `<run_id>::<seq>` trace ids.
pub struct LogEmitter<W: Write> {
    writer: W,
    seq: u64,
    run_id: String,
}

impl LogEmitter<std::io::BufWriter<std::fs::File>> {
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(std::io::BufWriter::new(file), run_id))
    }
}

impl LogEmitter<Vec<u8>> {
    /// In-memory emitter (for tests).
    #[must_use]
    pub fn to_buffer(run_id: &str) -> Self {
        Self::new(Vec::new(), run_id)
    }

    /// Lines written so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.writer)
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl<W: Write> LogEmitter<W> {
    pub fn new(writer: W, run_id: &str) -> Self {
        Self {
            writer,
            seq: 0,
            run_id: run_id.to_owned(),
        }
    }

    pub fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{:03}", self.run_id, self.seq)
    }

    /// Write `entry`, filling in a trace id if it has none.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Parse one JSONL line and check the required fields are present and
/// non-empty.
pub fn validate_log_line(line: &str) -> Result<LogEntry, String> {
    let entry: LogEntry =
        serde_json::from_str(line).map_err(|err| format!("not a log entry: {err}"))?;
    if entry.timestamp.is_empty() {
        return Err("empty timestamp".into());
    }
    if entry.trace_id.is_empty() {
        return Err("empty trace_id".into());
    }
    if entry.event.is_empty() {
        return Err("empty event".into());
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitter_assigns_sequential_trace_ids() {
        let mut emitter = LogEmitter::to_buffer("run-7");
        for _ in 0..2 {
            emitter
                .emit_entry(LogEntry::new("", LogLevel::Info, "scenario_result"))
                .unwrap();
        }
        let lines = emitter.lines();
        assert_eq!(lines.len(), 2);
        let first = validate_log_line(&lines[0]).unwrap();
        let second = validate_log_line(&lines[1]).unwrap();
        assert_eq!(first.trace_id, "run-7::001");
        assert_eq!(second.trace_id, "run-7::002");
    }

    #[test]
    fn optional_fields_are_omitted_when_unset() {
        let entry = LogEntry::new("t::001", LogLevel::Warn, "scenario_result");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("scenario"));
        assert!(!json.contains("duration_ms"));
        assert!(json.contains("\"level\":\"warn\""));
    }

    #[test]
    fn validation_rejects_missing_fields() {
        assert!(validate_log_line("{}").is_err());
        assert!(validate_log_line("not json").is_err());
        let blank = r#"{"timestamp":"x","trace_id":"","level":"info","event":"e"}"#;
        assert_eq!(validate_log_line(blank).unwrap_err(), "empty trace_id");
    }

    #[test]
    fn full_entry_round_trips() {
        let entry = LogEntry::new("t::009", LogLevel::Error, "scenario_result")
            .with_scenario("mutex-counter")
            .with_outcome(Outcome::Fail)
            .with_iterations(10)
            .with_duration_ms(3)
            .with_details(serde_json::json!({ "expected": 80, "observed": 79 }));
        let line = serde_json::to_string(&entry).unwrap();
        assert_eq!(validate_log_line(&line).unwrap(), entry);
    }
}
