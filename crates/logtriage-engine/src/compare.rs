use logtriage_core::{
    BuildComparison, BuildMetadata, LogDelta, LogSummary, StageDiff, StageTiming, TestDelta,
    TestRecord, TestStatus, TestTotals,
};
use std::collections::BTreeMap;

/// Diff two builds. Stages are outer-joined by name: base order first, then
/// stages only the head build ran.
pub fn compare(
    base: &BuildMetadata,
    head: &BuildMetadata,
    base_summary: Option<&LogSummary>,
    head_summary: Option<&LogSummary>,
) -> BuildComparison {
    let mut stage_diffs: Vec<StageDiff> = Vec::new();

    for stage in &base.stages {
        if stage_diffs.iter().any(|d| d.stage == stage.name) {
            continue;
        }
        let other = find_stage(&head.stages, &stage.name);
        stage_diffs.push(StageDiff {
            stage: stage.name.clone(),
            base_duration_ms: stage.duration_ms,
            head_duration_ms: other.and_then(|s| s.duration_ms),
            status_changed: other
                .map(|s| s.status.is_failure() != stage.status.is_failure())
                .unwrap_or(false),
        });
    }
    for stage in &head.stages {
        if stage_diffs.iter().any(|d| d.stage == stage.name) {
            continue;
        }
        stage_diffs.push(StageDiff {
            stage: stage.name.clone(),
            base_duration_ms: None,
            head_duration_ms: stage.duration_ms,
            status_changed: false,
        });
    }

    let log_delta = match (base_summary, head_summary) {
        (Some(b), Some(h)) => Some(log_delta(b, h)),
        _ => None,
    };

    BuildComparison {
        duration_delta_ms: head.duration_ms - base.duration_ms,
        result_changed: base.result != head.result,
        base_result: base.result.clone(),
        head_result: head.result.clone(),
        stage_diffs,
        log_delta,
        test_delta: None,
    }
}

/// Diff two test reports. `None` when either build published no tests.
///
/// Totals count distinct test names. A name reported more than once counts
/// as failing if any of its cases failed.
pub fn test_delta(base: &[TestRecord], head: &[TestRecord]) -> Option<TestDelta> {
    if base.is_empty() || head.is_empty() {
        return None;
    }
    let base_status = outcomes(base);
    let head_status = outcomes(head);

    let newly_failing: Vec<String> = head_status
        .iter()
        .filter(|(name, status)| {
            **status == TestStatus::Fail && base_status.get(*name) != Some(&TestStatus::Fail)
        })
        .map(|(name, _)| name.to_string())
        .collect();
    let fixed: Vec<String> = base_status
        .iter()
        .filter(|(name, status)| {
            **status == TestStatus::Fail && head_status.get(*name) == Some(&TestStatus::Pass)
        })
        .map(|(name, _)| name.to_string())
        .collect();

    let base = totals(&base_status);
    let head = totals(&head_status);
    Some(TestDelta {
        regression: head.failed > base.failed || !newly_failing.is_empty(),
        base,
        head,
        newly_failing,
        fixed,
    })
}

fn outcomes(records: &[TestRecord]) -> BTreeMap<&str, TestStatus> {
    let mut by_name: BTreeMap<&str, TestStatus> = BTreeMap::new();
    for record in records {
        by_name
            .entry(record.name.as_str())
            .and_modify(|status| {
                if record.status == TestStatus::Fail || *status == TestStatus::Skipped {
                    *status = record.status;
                }
            })
            .or_insert(record.status);
    }
    by_name
}

fn totals(outcomes: &BTreeMap<&str, TestStatus>) -> TestTotals {
    let mut totals = TestTotals::default();
    for status in outcomes.values() {
        match status {
            TestStatus::Pass => totals.passed += 1,
            TestStatus::Fail => totals.failed += 1,
            TestStatus::Skipped => totals.skipped += 1,
        }
    }
    totals
}

fn find_stage<'a>(stages: &'a [StageTiming], name: &str) -> Option<&'a StageTiming> {
    stages.iter().find(|s| s.name == name)
}

fn log_delta(base: &LogSummary, head: &LogSummary) -> LogDelta {
    LogDelta {
        error_count_delta: head.error_count as i64 - base.error_count as i64,
        warning_count_delta: head.warning_count as i64 - base.warning_count as i64,
        new_failing_stages: head
            .failing_stages
            .iter()
            .filter(|s| !base.failing_stages.contains(s))
            .cloned()
            .collect(),
        resolved_failing_stages: base
            .failing_stages
            .iter()
            .filter(|s| !head.failing_stages.contains(s))
            .cloned()
            .collect(),
    }
}
