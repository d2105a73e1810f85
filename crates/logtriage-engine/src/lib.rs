//! Heuristic triage, build comparison and flaky test detection, plus the
//! [`TriageService`] pipeline that feeds them from log and build sources.

pub mod compare;
pub mod flaky;
pub mod service;
pub mod triage;

pub use compare::{compare, test_delta};
pub use flaky::{detect_flaky, flakiness_score};
pub use service::{validate_job, ServiceDefaults, TriageService};
pub use triage::{action_for, triage, TriageConfig, INSPECT_FULL_LOG};
