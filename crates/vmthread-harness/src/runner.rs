//! Runs a scenario selection and records one log entry per scenario.

use std::io::Write;

use serde::Serialize;
use vmthread_core::diag::LogLevel;

use crate::HarnessError;
use crate::scenarios::{Scenario, ScenarioReport};
use crate::structured_log::{LogEmitter, LogEntry, Outcome};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub reports: Vec<ScenarioReport>,
}

impl RunSummary {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// `Err(ScenariosFailed)` when any scenario failed.
    pub fn into_result(self) -> Result<Self, HarnessError> {
        if self.all_passed() {
            Ok(self)
        } else {
            Err(HarnessError::ScenariosFailed {
                failed: self.failed,
                total: self.total,
            })
        }
    }
}

fn entry_for(report: &ScenarioReport) -> LogEntry {
    let (level, outcome) = if report.passed {
        (LogLevel::Info, Outcome::Pass)
    } else {
        (LogLevel::Error, Outcome::Fail)
    };
    LogEntry::new("", level, "scenario_result")
        .with_scenario(report.scenario.as_str())
        .with_outcome(outcome)
        .with_iterations(report.iterations)
        .with_duration_ms(report.duration_ms)
        .with_details(report.details.clone())
}

/// Run `scenarios` in order. Failures are reported in the summary rather
/// than as errors; only log I/O can fail the run itself.
pub fn run_scenarios<W: Write>(
    scenarios: &[Scenario],
    iterations: u64,
    log: &mut LogEmitter<W>,
) -> Result<RunSummary, HarnessError> {
    let mut reports = Vec::with_capacity(scenarios.len());
    for &scenario in scenarios {
        let report = scenario.run(iterations);
        log.emit_entry(entry_for(&report))?;
        reports.push(report);
    }
    log.flush()?;

    let passed = reports.iter().filter(|r| r.passed).count();
    Ok(RunSummary {
        total: reports.len(),
        passed,
        failed: reports.len() - passed,
        reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured_log::validate_log_line;

    #[test]
    fn one_log_line_per_scenario() {
        let mut log = LogEmitter::to_buffer("unit");
        let picks = [Scenario::JoinValue, Scenario::SelfIdentification];
        let summary = run_scenarios(&picks, 4, &mut log).unwrap();
        assert_eq!(summary.total, 2);
        assert!(summary.all_passed());

        let lines = log.lines();
        assert_eq!(lines.len(), 2);
        let first = validate_log_line(&lines[0]).unwrap();
        assert_eq!(first.scenario.as_deref(), Some("join-value"));
        assert_eq!(first.outcome, Some(Outcome::Pass));
        assert_eq!(first.trace_id, "unit::001");
    }

    #[test]
    fn failed_summary_converts_to_error() {
        let summary = RunSummary {
            total: 3,
            passed: 2,
            failed: 1,
            reports: Vec::new(),
        };
        let err = summary.into_result().unwrap_err();
        assert_eq!(err.to_string(), "1 of 3 scenarios failed");
    }
}
