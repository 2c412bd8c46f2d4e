//! Stress harness for vmthread.
//!
//! This crate provides:
//! - Scenarios: end-to-end exercises of the lock, condition variable,
//!   semaphore and thread lifecycle guarantees, each yielding a pass/fail
//!   report.
//! - Structured evidence: one JSONL record per scenario run.

#![forbid(unsafe_code)]

pub mod error;
pub mod runner;
pub mod scenarios;
pub mod structured_log;

pub use error::HarnessError;
pub use runner::{RunSummary, run_scenarios};
pub use scenarios::{Scenario, ScenarioReport};
