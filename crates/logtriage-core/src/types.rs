use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One execution of a CI job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildRef {
    /// Full job name; folder segments are separated by `/`.
    pub job: String,
    pub number: u32,
}

impl BuildRef {
    pub fn new(job: impl Into<String>, number: u32) -> Self {
        Self {
            job: job.into(),
            number,
        }
    }
}

impl fmt::Display for BuildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.job, self.number)
    }
}

/// Build number as requested by a caller: explicit, or the latest build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildSelector {
    Number(u32),
    Last,
}

impl BuildSelector {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("last") || raw.is_empty() {
            return Some(BuildSelector::Last);
        }
        raw.parse::<u32>().ok().map(BuildSelector::Number)
    }
}

/// A bounded byte range of a build log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogWindow {
    pub start_offset: u64,
    pub data: Vec<u8>,
    /// Cursor for the next fetch.
    pub end_offset: u64,
    pub has_more: bool,
}

impl LogWindow {
    pub fn empty_at(offset: u64) -> Self {
        Self {
            start_offset: offset,
            data: Vec::new(),
            end_offset: offset,
            has_more: false,
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSummary {
    pub total_bytes: u64,
    pub line_count: u64,
    pub error_count: u32,
    pub warning_count: u32,
    pub failing_stages: Vec<String>,
    pub tail_lines: Vec<String>,
    /// Most frequent error lines, most frequent first.
    pub top_errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Failure category reported by an analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    DependencyResolution,
    Compilation,
    TestFailure,
    TaskExecution,
    PluginExecution,
    OutOfMemory,
    DaemonCrash,
    MissingModule,
    Network,
    Permission,
    Timeout,
    Other,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::DependencyResolution => "dependency_resolution",
            FindingKind::Compilation => "compilation",
            FindingKind::TestFailure => "test_failure",
            FindingKind::TaskExecution => "task_execution",
            FindingKind::PluginExecution => "plugin_execution",
            FindingKind::OutOfMemory => "out_of_memory",
            FindingKind::DaemonCrash => "daemon_crash",
            FindingKind::MissingModule => "missing_module",
            FindingKind::Network => "network",
            FindingKind::Permission => "permission",
            FindingKind::Timeout => "timeout",
            FindingKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerFinding {
    pub analyzer: String,
    pub kind: FindingKind,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl AnalyzerFinding {
    pub fn new(
        analyzer: &str,
        kind: FindingKind,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            analyzer: analyzer.to_string(),
            kind,
            severity,
            message: message.into(),
            suggestion: None,
            location: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn at(mut self, file: impl Into<String>, line: Option<u32>) -> Self {
        self.location = Some(SourceLocation {
            file: file.into(),
            line,
        });
        self
    }
}

/// Build-tool specific counters extracted alongside findings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetrics {
    pub compilation_errors: u32,
    pub test_failures: u32,
    pub failed_dependencies: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageHypothesis {
    pub cause: String,
    pub category: FindingKind,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageReport {
    /// Jenkins result of the triaged build, when it was looked up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_result: Option<String>,
    pub hypotheses: Vec<TriageHypothesis>,
    pub top_errors: Vec<String>,
    pub failing_stages: Vec<String>,
    pub suspect_commits: Vec<String>,
    pub next_actions: Vec<String>,
}

impl TriageReport {
    /// Report for a build that did not fail: no hypotheses, nothing to do.
    pub fn not_a_failure(result: impl Into<String>) -> Self {
        Self {
            build_result: Some(result.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failed,
    Unstable,
    Aborted,
    Skipped,
    InProgress,
    Unknown,
}

impl StageStatus {
    /// Parse the status strings Jenkins uses for builds and pipeline stages.
    pub fn from_jenkins(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => StageStatus::Success,
            "FAILED" | "FAILURE" => StageStatus::Failed,
            "UNSTABLE" => StageStatus::Unstable,
            "ABORTED" => StageStatus::Aborted,
            "NOT_EXECUTED" | "NOT_BUILT" | "SKIPPED" => StageStatus::Skipped,
            "IN_PROGRESS" | "PAUSED_PENDING_INPUT" | "QUEUED" => StageStatus::InProgress,
            _ => StageStatus::Unknown,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StageStatus::Failed | StageStatus::Unstable | StageStatus::Aborted
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub name: String,
    pub status: StageStatus,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMetadata {
    pub job: String,
    pub number: u32,
    /// Final result string; `IN_PROGRESS` while the build is running.
    pub result: String,
    pub building: bool,
    pub duration_ms: i64,
    pub stages: Vec<StageTiming>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmChange {
    pub commit_id: String,
    pub author: String,
    pub message: String,
    pub changed_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDiff {
    pub stage: String,
    pub base_duration_ms: Option<i64>,
    pub head_duration_ms: Option<i64>,
    pub status_changed: bool,
}

/// Log-level differences between two builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDelta {
    pub error_count_delta: i64,
    pub warning_count_delta: i64,
    pub new_failing_stages: Vec<String>,
    pub resolved_failing_stages: Vec<String>,
}

/// Pass/fail/skip totals of one build's test report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTotals {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Test-level differences between two builds that both published reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDelta {
    pub base: TestTotals,
    pub head: TestTotals,
    /// Failing in head, not failing in base. Sorted.
    pub newly_failing: Vec<String>,
    /// Failing in base, passing in head. Sorted.
    pub fixed: Vec<String>,
    pub regression: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildComparison {
    pub duration_delta_ms: i64,
    pub result_changed: bool,
    pub base_result: String,
    pub head_result: String,
    pub stage_diffs: Vec<StageDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_delta: Option<LogDelta>,
    /// `None` when either build has no test report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_delta: Option<TestDelta>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Skipped,
}

impl TestStatus {
    /// Jenkins case statuses: PASSED, FIXED, FAILED, REGRESSION, SKIPPED.
    pub fn from_jenkins(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PASSED" | "FIXED" => TestStatus::Pass,
            "SKIPPED" => TestStatus::Skipped,
            _ => TestStatus::Fail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    pub name: String,
    pub build_number: u32,
    pub status: TestStatus,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlakyTestEntry {
    pub name: String,
    pub statuses_by_build: BTreeMap<u32, TestStatus>,
    pub flakiness_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlakinessReport {
    pub builds_analyzed: Vec<u32>,
    pub flaky: Vec<FlakyTestEntry>,
    /// Tests that passed throughout the window until a final run of failures.
    pub regressed: Vec<String>,
    /// Tests observed fewer times than the minimum window.
    pub insufficient_data: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    /// 1-based line number within the searched text.
    pub line_number: usize,
    pub context: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_selector_accepts_last_and_numbers() {
        assert_eq!(BuildSelector::parse("last"), Some(BuildSelector::Last));
        assert_eq!(BuildSelector::parse(" LAST "), Some(BuildSelector::Last));
        assert_eq!(BuildSelector::parse("42"), Some(BuildSelector::Number(42)));
        assert_eq!(BuildSelector::parse("-1"), None);
    }

    #[test]
    fn stage_status_failure_states() {
        assert!(StageStatus::from_jenkins("FAILED").is_failure());
        assert!(StageStatus::from_jenkins("unstable").is_failure());
        assert!(!StageStatus::from_jenkins("SUCCESS").is_failure());
        assert_eq!(StageStatus::from_jenkins("NOT_EXECUTED"), StageStatus::Skipped);
    }

    #[test]
    fn severity_orders_error_highest() {
        let mut severities = vec![Severity::Error, Severity::Info, Severity::Warning];
        severities.sort();
        assert_eq!(
            severities,
            vec![Severity::Info, Severity::Warning, Severity::Error]
        );
    }

    #[test]
    fn finding_serializes_without_empty_optionals() {
        let finding = AnalyzerFinding::new(
            "maven",
            FindingKind::DependencyResolution,
            Severity::Error,
            "dependency X not found",
        );
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["severity"], "error");
        assert_eq!(json["kind"], "dependency_resolution");
        assert!(json.get("location").is_none());
    }
}
