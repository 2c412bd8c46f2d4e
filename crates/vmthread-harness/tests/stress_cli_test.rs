use std::path::PathBuf;
use std::process::Command;

use vmthread_harness::structured_log::{LogEmitter, Outcome, validate_log_line};
use vmthread_harness::{HarnessError, Scenario, run_scenarios};

fn scratch_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("vmthread-harness-{tag}-{}.jsonl", std::process::id()))
}

#[test]
fn every_scenario_passes_at_moderate_load() {
    let mut log = LogEmitter::to_buffer("it");
    let summary = run_scenarios(&Scenario::ALL, 200, &mut log).unwrap();
    for report in &summary.reports {
        assert!(report.passed, "{} failed: {}", report.scenario, report.details);
    }
    assert_eq!(summary.total, Scenario::ALL.len());
    assert_eq!(summary.failed, 0);

    let lines = log.lines();
    assert_eq!(lines.len(), Scenario::ALL.len());
    for line in &lines {
        let entry = validate_log_line(line).unwrap();
        assert_eq!(entry.event, "scenario_result");
        assert_eq!(entry.outcome, Some(Outcome::Pass));
        assert_eq!(entry.iterations, Some(200));
    }
}

#[test]
fn unknown_scenario_is_rejected() {
    let err = Scenario::parse_selection("mutex-countr").unwrap_err();
    assert!(matches!(err, HarnessError::UnknownScenario(ref s) if s == "mutex-countr"));
}

#[test]
fn cli_stress_writes_summary_and_evidence() {
    let log_path = scratch_path("cli");
    let output = Command::new(env!("CARGO_BIN_EXE_vmthread-harness"))
        .args(["stress", "--scenario", "mutex-counter", "--iterations", "500"])
        .arg("--log")
        .arg(&log_path)
        .output()
        .expect("harness should execute");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["total"], 1);
    assert_eq!(summary["passed"], 1);
    assert_eq!(summary["reports"][0]["scenario"], "mutex-counter");
    assert_eq!(summary["reports"][0]["details"]["observed"], 4000);

    let body = std::fs::read_to_string(&log_path).unwrap();
    let entries: Vec<_> = body.lines().map(|l| validate_log_line(l).unwrap()).collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].scenario.as_deref(), Some("mutex-counter"));
    let _ = std::fs::remove_file(&log_path);
}

#[test]
fn cli_rejects_unknown_scenario() {
    let output = Command::new(env!("CARGO_BIN_EXE_vmthread-harness"))
        .args(["stress", "--scenario", "bogus"])
        .output()
        .expect("harness should execute");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("bogus"));
}

#[test]
fn cli_lists_all_scenarios() {
    let output = Command::new(env!("CARGO_BIN_EXE_vmthread-harness"))
        .arg("list")
        .output()
        .expect("harness should execute");
    assert!(output.status.success());
    let listed: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_owned)
        .collect();
    let expected: Vec<String> = Scenario::ALL.iter().map(|s| s.to_string()).collect();
    assert_eq!(listed, expected);
}
