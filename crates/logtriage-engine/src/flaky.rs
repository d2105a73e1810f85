use logtriage_core::{FlakinessReport, FlakyTestEntry, TestRecord, TestStatus};
use std::collections::{BTreeMap, BTreeSet};

/// Pass/fail transitions between consecutive runs over `builds_analyzed - 1`.
///
/// Skipped runs are ignored, and a build the test is missing from still
/// counts toward the denominator. Fewer than two runs score 0.
pub fn flakiness_score(statuses: &BTreeMap<u32, TestStatus>, builds_analyzed: usize) -> f64 {
    let runs = decisive_runs(statuses);
    if runs.len() < 2 {
        return 0.0;
    }
    let intervals = builds_analyzed.max(runs.len()) - 1;
    transitions(&runs) as f64 / intervals as f64
}

fn decisive_runs(statuses: &BTreeMap<u32, TestStatus>) -> Vec<TestStatus> {
    statuses
        .values()
        .copied()
        .filter(|s| *s != TestStatus::Skipped)
        .collect()
}

fn transitions(runs: &[TestStatus]) -> usize {
    runs.windows(2).filter(|pair| pair[0] != pair[1]).count()
}

/// Windowed aggregation of per-build test records into a flakiness report.
///
/// Tests with fewer than `min_observations` pass/fail runs are listed as
/// insufficient data and never scored.
pub fn detect_flaky(records: &[TestRecord], min_observations: usize) -> FlakinessReport {
    let mut by_test: BTreeMap<&str, BTreeMap<u32, TestStatus>> = BTreeMap::new();
    let mut builds: BTreeSet<u32> = BTreeSet::new();

    for record in records {
        builds.insert(record.build_number);
        let statuses = by_test.entry(record.name.as_str()).or_default();
        // A failed rerun in the same build outweighs a pass.
        let slot = statuses
            .entry(record.build_number)
            .or_insert(record.status);
        if record.status == TestStatus::Fail || *slot == TestStatus::Skipped {
            *slot = record.status;
        }
    }

    let mut report = FlakinessReport {
        builds_analyzed: builds.into_iter().collect(),
        ..Default::default()
    };
    let window = report.builds_analyzed.len();

    for (name, statuses) in by_test {
        let runs = decisive_runs(&statuses);
        if runs.len() < min_observations {
            report.insufficient_data.push(name.to_string());
            continue;
        }

        let has_pass = runs.contains(&TestStatus::Pass);
        let has_fail = runs.contains(&TestStatus::Fail);
        if !(has_pass && has_fail) {
            continue;
        }

        if transitions(&runs) == 1 && runs.last() == Some(&TestStatus::Fail) {
            report.regressed.push(name.to_string());
        }
        report.flaky.push(FlakyTestEntry {
            name: name.to_string(),
            flakiness_score: flakiness_score(&statuses, window),
            statuses_by_build: statuses,
        });
    }

    // Names are already ascending; stable sort keeps that for equal scores.
    report
        .flaky
        .sort_by(|a, b| b.flakiness_score.total_cmp(&a.flakiness_score));
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(name: &str, statuses: &[TestStatus]) -> Vec<TestRecord> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| TestRecord {
                name: name.to_string(),
                build_number: 100 + i as u32,
                status: *status,
                duration_ms: Some(10),
                error_message: None,
            })
            .collect()
    }

    use logtriage_core::TestStatus::{Fail as F, Pass as P, Skipped as S};

    #[test]
    fn always_passing_scores_zero_and_is_not_flagged() {
        let records = history("stable", &[P, P, P, P, P]);
        let report = detect_flaky(&records, 5);
        assert!(report.flaky.is_empty());
        assert!(report.insufficient_data.is_empty());

        let statuses: BTreeMap<u32, TestStatus> =
            records.iter().map(|r| (r.build_number, r.status)).collect();
        assert_eq!(flakiness_score(&statuses, 5), 0.0);
    }

    #[test]
    fn too_few_observations_never_flagged() {
        let records = history("young", &[P, F, P, F]);
        let report = detect_flaky(&records, 5);
        assert!(report.flaky.is_empty());
        assert_eq!(report.insufficient_data, vec!["young"]);
    }

    #[test]
    fn skipped_runs_do_not_count_as_observations() {
        let records = history("skippy", &[P, S, F, S, P, F]);
        let report = detect_flaky(&records, 5);
        assert_eq!(report.insufficient_data, vec!["skippy"]);
    }

    #[test]
    fn score_is_transitions_over_intervals() {
        let records = history("flip", &[P, F, P, F, P]);
        let report = detect_flaky(&records, 5);
        assert_eq!(report.flaky.len(), 1);
        assert_eq!(report.flaky[0].flakiness_score, 1.0);
        assert_eq!(report.builds_analyzed, vec![100, 101, 102, 103, 104]);
    }

    #[test]
    fn missing_builds_still_count_as_intervals() {
        let mut records = history("steady", &[P, P, P, P, P, P]);
        records.extend(history("sparse", &[P, F, P, F]));
        let report = detect_flaky(&records, 4);
        assert_eq!(report.builds_analyzed.len(), 6);
        assert_eq!(report.flaky.len(), 1);
        assert!((report.flaky[0].flakiness_score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn ordered_by_score_then_name() {
        let mut records = history("b_test", &[P, F, P, P, P]);
        records.extend(history("a_test", &[P, P, F, P, P]));
        records.extend(history("c_test", &[P, F, P, F, P]));
        let report = detect_flaky(&records, 5);
        let names: Vec<_> = report.flaky.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["c_test", "a_test", "b_test"]);
        assert_eq!(report.flaky[1].flakiness_score, 0.5);
    }

    #[test]
    fn single_switch_to_failure_is_a_regression() {
        let mut records = history("broke", &[P, P, P, F, F]);
        records.extend(history("fixed", &[F, F, P, P, P]));
        let report = detect_flaky(&records, 5);
        assert_eq!(report.regressed, vec!["broke"]);
        assert_eq!(report.flaky.len(), 2);
    }

    #[test]
    fn failed_rerun_in_same_build_wins() {
        let mut records = history("rerun", &[P, P, P, P, P]);
        records.push(TestRecord {
            name: "rerun".to_string(),
            build_number: 104,
            status: F,
            duration_ms: None,
            error_message: Some("boom".to_string()),
        });
        let report = detect_flaky(&records, 5);
        assert_eq!(report.regressed, vec!["rerun"]);
    }
}
