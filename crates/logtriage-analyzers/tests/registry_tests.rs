use logtriage_analyzers::{run, Analyzer, LogAnalyzer, MAX_FINDINGS};
use logtriage_core::{FindingKind, Severity};

const GRADLE_LOG: &str = "\
Welcome to Gradle 8.5!
> Task :app:test FAILED
5 tests completed, 2 failed
FAILURE: Build failed with an exception.
* What went wrong:
Execution failed for task ':app:test'.
BUILD FAILED in 31s
";

#[test]
fn auto_detection_picks_gradle() {
    let outcome = run(GRADLE_LOG, None).unwrap();
    assert_eq!(outcome.analyzer.as_deref(), Some("gradle"));
    assert!(outcome
        .findings
        .iter()
        .all(|f| f.analyzer == "gradle"));
    assert!(outcome
        .findings
        .iter()
        .any(|f| f.kind == FindingKind::TestFailure && f.severity == Severity::Error));

    let metrics = outcome.metrics.unwrap();
    assert_eq!(metrics.test_failures, 2);
    assert!(metrics.summary.starts_with("Gradle build failed"));
}

#[test]
fn named_analyzer_bypasses_detection() {
    // Nothing Maven-like in the log, but the caller asked for Maven.
    let outcome = run("java.lang.OutOfMemoryError: Java heap space", Some("maven")).unwrap();
    assert_eq!(outcome.analyzer.as_deref(), Some("maven"));
    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.findings[0].kind, FindingKind::OutOfMemory);
}

#[test]
fn unknown_analyzer_is_rejected() {
    let err = run(GRADLE_LOG, Some("sbt")).unwrap_err();
    assert_eq!(err.kind(), "invalid_argument");
}

#[test]
fn findings_are_capped() {
    let mut log = String::from("> Task :app:compileJava\n");
    for i in 0..200 {
        log.push_str(&format!("src/Gen{i}.java:{i}: error: boom\n"));
    }
    let findings = Analyzer::by_name("gradle").unwrap().analyze(&log);
    assert_eq!(findings.len(), MAX_FINDINGS);
}

#[test]
fn outcome_serializes_for_callers() {
    let outcome = run(GRADLE_LOG, None).unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["analyzer"], "gradle");
    assert!(json["findings"].as_array().unwrap().len() >= 2);
}
