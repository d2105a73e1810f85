// ABOUTME: Regex helpers shared by the build-tool analyzers
// ABOUTME: Capture extraction, counters, compiler error locations and summaries

use logtriage_core::{AnalyzerFinding, FindingKind, Severity, ToolMetrics};
use regex::{Regex, RegexSet};

/// Compile a pattern that is part of the binary.
pub(crate) fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static analyzer pattern must compile")
}

pub(crate) fn regex_set(patterns: &[&str]) -> RegexSet {
    RegexSet::new(patterns).expect("static analyzer patterns must compile")
}

/// Distinct values of capture `group`, first-seen order.
pub(crate) fn unique_captures(re: &Regex, text: &str, group: usize) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for captures in re.captures_iter(text) {
        if let Some(m) = captures.get(group) {
            let value = m.as_str().trim_end_matches(['.', ',', ':']).to_string();
            if !value.is_empty() && !seen.contains(&value) {
                seen.push(value);
            }
        }
    }
    seen
}

/// Sum of the numeric capture groups in `groups` over all matches.
pub(crate) fn sum_captures(re: &Regex, text: &str, groups: &[usize]) -> u32 {
    re.captures_iter(text)
        .flat_map(|captures| {
            groups
                .iter()
                .filter_map(|g| captures.get(*g))
                .filter_map(|m| m.as_str().parse::<u32>().ok())
                .collect::<Vec<_>>()
        })
        .fold(0u32, |acc, n| acc.saturating_add(n))
}

pub(crate) fn count_matching_lines(re: &Regex, text: &str) -> u32 {
    text.lines().filter(|line| re.is_match(line)).count() as u32
}

/// Compiler diagnostics with a file location.
///
/// Each pattern must define the named groups `file` and `msg`; `line` is
/// optional. Duplicate `(file, line)` pairs are reported once.
pub(crate) fn compiler_errors(
    analyzer: &str,
    patterns: &[&Regex],
    text: &str,
    suggestion: &str,
) -> Vec<AnalyzerFinding> {
    let mut seen: Vec<(String, Option<u32>)> = Vec::new();
    let mut findings = Vec::new();

    for line in text.lines() {
        for re in patterns {
            let Some(captures) = re.captures(line) else {
                continue;
            };
            let Some(file) = captures.name("file").map(|m| m.as_str().to_string()) else {
                continue;
            };
            let line_no = captures
                .name("line")
                .and_then(|m| m.as_str().parse::<u32>().ok());
            if seen.iter().any(|(f, l)| *f == file && *l == line_no) {
                break;
            }
            let detail = captures
                .name("msg")
                .map(|m| m.as_str().trim())
                .unwrap_or("compilation error");
            findings.push(
                AnalyzerFinding::new(
                    analyzer,
                    FindingKind::Compilation,
                    Severity::Error,
                    format!("Compilation error in {}: {}", file, detail),
                )
                .with_suggestion(suggestion)
                .at(file.clone(), line_no),
            );
            seen.push((file, line_no));
            break;
        }
    }

    findings
}

pub(crate) fn issue(
    analyzer: &str,
    kind: FindingKind,
    message: impl Into<String>,
    suggestion: &str,
) -> AnalyzerFinding {
    AnalyzerFinding::new(analyzer, kind, Severity::Error, message).with_suggestion(suggestion)
}

/// "Maven build failed: 2 compilation error(s), ..." style one-liner.
pub(crate) fn summary_line(tool: &str, metrics: &ToolMetrics, error_lines: u32) -> String {
    let mut parts = Vec::new();
    if metrics.compilation_errors > 0 {
        parts.push(format!("{} compilation error(s)", metrics.compilation_errors));
    }
    if metrics.test_failures > 0 {
        parts.push(format!("{} test failure(s)", metrics.test_failures));
    }
    if !metrics.failed_dependencies.is_empty() {
        parts.push(format!(
            "{} dependency resolution failure(s)",
            metrics.failed_dependencies.len()
        ));
    }
    if error_lines > 0 {
        parts.push(format!("{} error message(s)", error_lines));
    }

    if parts.is_empty() {
        format!("{} build completed (check logs for warnings)", tool)
    } else {
        format!("{} build failed: {}", tool, parts.join(", "))
    }
}
