use crate::patterns::{
    compiler_errors, count_matching_lines, issue, regex, regex_set, sum_captures, summary_line,
    unique_captures,
};
use crate::LogAnalyzer;
use logtriage_core::{AnalyzerFinding, FindingKind, Severity, ToolMetrics};
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

const NAME: &str = "gradle";

static DETECT: Lazy<RegexSet> = Lazy::new(|| {
    regex_set(&[
        r"Gradle \d+\.\d+",
        r"gradlew? (?:build|test|assemble|clean|check)",
        r"> Task :",
        r"BUILD SUCCESSFUL in",
        r"BUILD FAILED in",
    ])
});

static ERROR_LINE: Lazy<Regex> = Lazy::new(|| {
    regex(r"^FAILURE: |^\* What went wrong:|Execution failed for task |Could not resolve |> Compilation failed")
});
static COMPILE_COUNT: Lazy<Regex> = Lazy::new(|| regex(r"(?m)^(\d+) errors?\s*$"));
static TEST_COUNT: Lazy<Regex> = Lazy::new(|| regex(r"(\d+) tests? completed, (\d+) failed"));
static UNRESOLVED: Lazy<Regex> = Lazy::new(|| {
    regex(r"Could not (?:resolve|find) ([\w.\-]+:[\w.\-]+(?::[\w.\-+]+)?)")
});
static TASK_FAILURE: Lazy<Regex> =
    Lazy::new(|| regex(r"Execution failed for task '([\w:\-]+)'"));
static JAVAC_LOCATION: Lazy<Regex> = Lazy::new(|| {
    regex(r"^(?P<file>[^\s:]+\.java):(?P<line>\d+): error: (?P<msg>.+)$")
});
static KOTLIN_LOCATION: Lazy<Regex> = Lazy::new(|| {
    regex(r"^e: (?:file://)?(?P<file>[^\s:]+\.kts?):(?P<line>\d+):\d+ (?P<msg>.+)$")
});

/// Gradle: task execution, dependency resolution, compilation and daemon failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GradleAnalyzer;

impl GradleAnalyzer {
    fn located_errors(text: &str) -> Vec<AnalyzerFinding> {
        compiler_errors(
            NAME,
            &[&*JAVAC_LOCATION, &*KOTLIN_LOCATION],
            text,
            "Fix the reported compilation error and ensure the correct Java/Kotlin version is configured",
        )
    }
}

impl LogAnalyzer for GradleAnalyzer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_analyze(&self, text: &str) -> bool {
        DETECT.is_match(text)
    }

    fn analyze(&self, text: &str) -> Vec<AnalyzerFinding> {
        let mut findings = Vec::new();

        if let Some(captures) = TASK_FAILURE.captures(text) {
            findings.push(issue(
                NAME,
                FindingKind::TaskExecution,
                format!("Gradle task failed: {}", &captures[1]),
                "Inspect the output under '* What went wrong'; re-run with --stacktrace",
            ));
        }

        let deps = unique_captures(&UNRESOLVED, text, 1);
        if !deps.is_empty() || text.contains("Could not resolve all") {
            let message = match deps.first() {
                Some(first) => format!("Failed to resolve project dependencies: {}", first),
                None => "Failed to resolve project dependencies".to_string(),
            };
            findings.push(issue(
                NAME,
                FindingKind::DependencyResolution,
                message,
                "Check dependency versions and repository configuration; run './gradlew dependencies' to diagnose conflicts",
            ));
        }

        if text.contains("Compilation failed") || text.contains("Compilation error") {
            findings.push(issue(
                NAME,
                FindingKind::Compilation,
                "Kotlin/Java compilation failed",
                "Fix compilation errors in source code and ensure the correct Java/Kotlin version is configured",
            ));
        }

        if sum_captures(&TEST_COUNT, text, &[2]) > 0 || text.contains("There were failing tests")
        {
            findings.push(issue(
                NAME,
                FindingKind::TestFailure,
                "Unit or integration tests failed",
                "Review failing test cases; reproduce locally with './gradlew test'",
            ));
        }

        if text.contains("java.lang.OutOfMemoryError") {
            findings.push(issue(
                NAME,
                FindingKind::OutOfMemory,
                "Gradle build ran out of memory",
                "Increase Gradle heap size in gradle.properties: org.gradle.jvmargs=-Xmx2048m",
            ));
        }

        let daemon_lost = text.contains("Gradle build daemon disappeared")
            || (text.contains("Gradle Daemon")
                && (text.contains("stopped") || text.contains("died")));
        if daemon_lost {
            findings.push(
                AnalyzerFinding::new(
                    NAME,
                    FindingKind::DaemonCrash,
                    Severity::Warning,
                    "Gradle daemon crashed during build",
                )
                .with_suggestion(
                    "Stop the Gradle daemon and rebuild: ./gradlew --stop && ./gradlew clean build",
                ),
            );
        }

        findings.extend(Self::located_errors(text));
        findings
    }

    fn metrics(&self, text: &str) -> ToolMetrics {
        let located = Self::located_errors(text).len() as u32;
        let mut metrics = ToolMetrics {
            compilation_errors: sum_captures(&COMPILE_COUNT, text, &[1]).max(located),
            test_failures: sum_captures(&TEST_COUNT, text, &[2]),
            failed_dependencies: unique_captures(&UNRESOLVED, text, 1),
            summary: String::new(),
        };
        metrics.summary =
            summary_line("Gradle", &metrics, count_matching_lines(&ERROR_LINE, text));
        metrics
    }
}
