use crate::patterns::{
    compiler_errors, count_matching_lines, issue, regex, regex_set, sum_captures, summary_line,
    unique_captures,
};
use crate::LogAnalyzer;
use logtriage_core::{AnalyzerFinding, FindingKind, ToolMetrics};
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

const NAME: &str = "maven";

static DETECT: Lazy<RegexSet> = Lazy::new(|| {
    regex_set(&[
        r"Apache Maven \d+\.\d+",
        r"\[INFO\] Building .* \d+\.\d+",
        r"mvn (?:clean|compile|test|package|install|deploy|verify)",
        r"\[INFO\] Scanning for projects\.\.\.",
    ])
});

static ERROR_LINE: Lazy<Regex> = Lazy::new(|| {
    regex(r"^\[ERROR\] |BUILD FAILURE|Failed to execute goal |Could not resolve dependencies |Compilation failure")
});
static COMPILE_COUNT: Lazy<Regex> =
    Lazy::new(|| regex(r"(?m)^(?:\[(?:INFO|ERROR)\] )?(\d+) errors?\s*$"));
static TEST_SUMMARY: Lazy<Regex> =
    Lazy::new(|| regex(r"(?m)Tests run: \d+, Failures: (\d+), Errors: (\d+)(?:, Skipped: \d+)?\s*$"));
static TEST_CLASS: Lazy<Regex> =
    Lazy::new(|| regex(r"Tests run: \d+, Failures: (\d+), Errors: (\d+).*Time elapsed"));
static UNRESOLVED_PROJECT: Lazy<Regex> =
    Lazy::new(|| regex(r"Could not resolve dependencies for project ([\w.\-:]+)"));
static MISSING_ARTIFACT: Lazy<Regex> =
    Lazy::new(|| regex(r"Could not find artifact ([\w.\-]+:[\w.\-]+(?::[\w.\-]+)*)"));
static PLUGIN_FAILURE: Lazy<Regex> = Lazy::new(|| regex(r"Failed to execute goal ([\w.\-]+:[\w.\-]+(?::[\w.\-]+)*)"));
static JAVAC_LOCATION: Lazy<Regex> = Lazy::new(|| {
    regex(r"^\[ERROR\] (?P<file>[^\s\[\]]+\.(?:java|kt|scala|groovy)):\[(?P<line>\d+),\d+\] (?P<msg>.+)$")
});

/// Apache Maven: dependency resolution, compilation, surefire and plugin failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MavenAnalyzer;

impl MavenAnalyzer {
    fn failed_dependencies(text: &str) -> Vec<String> {
        let mut deps = unique_captures(&UNRESOLVED_PROJECT, text, 1);
        for artifact in unique_captures(&MISSING_ARTIFACT, text, 1) {
            if !deps.contains(&artifact) {
                deps.push(artifact);
            }
        }
        deps
    }

    fn test_failures(text: &str) -> u32 {
        // Prefer the aggregated "Results:" lines; per-class lines carry "Time elapsed".
        let aggregated: String = text
            .lines()
            .filter(|line| !line.contains("Time elapsed"))
            .collect::<Vec<_>>()
            .join("\n");
        let total = sum_captures(&TEST_SUMMARY, &aggregated, &[1, 2]);
        if total > 0 {
            return total;
        }
        text.lines()
            .map(|line| sum_captures(&TEST_CLASS, line, &[1, 2]))
            .sum()
    }
}

impl LogAnalyzer for MavenAnalyzer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_analyze(&self, text: &str) -> bool {
        DETECT.is_match(text)
    }

    fn analyze(&self, text: &str) -> Vec<AnalyzerFinding> {
        let mut findings = Vec::new();

        let deps = Self::failed_dependencies(text);
        if !deps.is_empty() || text.contains("Could not resolve dependencies") {
            let message = match deps.first() {
                Some(first) => format!("Failed to resolve project dependencies: {}", first),
                None => "Failed to resolve project dependencies".to_string(),
            };
            findings.push(issue(
                NAME,
                FindingKind::DependencyResolution,
                message,
                "Check dependency versions and repository availability; run 'mvn dependency:tree' to diagnose conflicts",
            ));
        }

        if text.contains("Compilation failure") || text.to_lowercase().contains("compilation failed")
        {
            findings.push(issue(
                NAME,
                FindingKind::Compilation,
                "Java compilation failed",
                "Fix compilation errors in source code and ensure the correct Java version is configured",
            ));
        }

        if text.contains("There are test failures") || Self::test_failures(text) > 0 {
            findings.push(issue(
                NAME,
                FindingKind::TestFailure,
                "Unit or integration tests failed",
                "Review failing test cases; reproduce locally with 'mvn test'",
            ));
        }

        if let Some(captures) = PLUGIN_FAILURE.captures(text) {
            findings.push(issue(
                NAME,
                FindingKind::PluginExecution,
                format!("Maven plugin failed: {}", &captures[1]),
                "Re-run with 'mvn -e' for the full plugin stack trace",
            ));
        }

        if text.contains("java.lang.OutOfMemoryError") {
            findings.push(issue(
                NAME,
                FindingKind::OutOfMemory,
                "Maven build ran out of memory",
                "Increase Maven heap size: MAVEN_OPTS='-Xmx2048m'",
            ));
        }

        findings.extend(compiler_errors(
            NAME,
            &[&*JAVAC_LOCATION],
            text,
            "Fix the reported compilation error",
        ));
        findings
    }

    fn metrics(&self, text: &str) -> ToolMetrics {
        let located = text
            .lines()
            .filter(|line| JAVAC_LOCATION.is_match(line))
            .count() as u32;
        let mut metrics = ToolMetrics {
            compilation_errors: sum_captures(&COMPILE_COUNT, text, &[1]).max(located),
            test_failures: Self::test_failures(text),
            failed_dependencies: Self::failed_dependencies(text),
            summary: String::new(),
        };
        metrics.summary = summary_line("Maven", &metrics, count_matching_lines(&ERROR_LINE, text));
        metrics
    }
}
