use crate::patterns::{
    compiler_errors, count_matching_lines, issue, regex, regex_set, sum_captures, summary_line,
    unique_captures,
};
use crate::LogAnalyzer;
use logtriage_core::{AnalyzerFinding, FindingKind, ToolMetrics};
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

const NAME: &str = "npm";

static DETECT: Lazy<RegexSet> = Lazy::new(|| {
    regex_set(&[
        r"npm (?:install|ci|run|test|build)",
        r"yarn (?:install|run|test|build)",
        r"npm ERR!",
        r"node_modules",
        r"package\.json",
    ])
});

static ERROR_LINE: Lazy<Regex> = Lazy::new(|| {
    regex(r"^npm ERR! |^error |^ERROR in |Failed to compile|Module not found: ")
});
static MOCHA_FAILING: Lazy<Regex> = Lazy::new(|| regex(r"(\d+) failing"));
static JEST_FAILED: Lazy<Regex> = Lazy::new(|| regex(r"Tests:\s+(\d+) failed"));
static FAIL_LINE: Lazy<Regex> = Lazy::new(|| regex(r"^\s*FAIL \S+\.(?:test|spec)\."));
static UNRESOLVED_DEP: Lazy<Regex> =
    Lazy::new(|| regex(r"Could not resolve dependency:[ \t]+([\w@\-/.]+)"));
static MODULE_NOT_FOUND: Lazy<Regex> =
    Lazy::new(|| regex(r#"Module not found:.*['"]([^'"]+)['"]"#));
static CANNOT_FIND_MODULE: Lazy<Regex> =
    Lazy::new(|| regex(r#"Cannot find module ['"]([^'"]+)['"]"#));
static TS_LOCATION: Lazy<Regex> = Lazy::new(|| {
    regex(r"^(?P<file>[^\s(]+\.tsx?)\((?P<line>\d+),\d+\): error (?P<msg>TS\d+: .+)$")
});
static WEBPACK_LOCATION: Lazy<Regex> = Lazy::new(|| {
    regex(r"^ERROR in (?:\./)?(?P<file>[^\s:]+\.(?:jsx?|tsx?|vue))(?::(?P<line>\d+):\d+)?(?P<msg>.*)$")
});

/// npm and yarn: package resolution, bundler/TypeScript compilation and test runners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NpmAnalyzer;

impl NpmAnalyzer {
    fn failed_dependencies(text: &str) -> Vec<String> {
        let mut deps = Vec::new();
        for re in [&*UNRESOLVED_DEP, &*MODULE_NOT_FOUND, &*CANNOT_FIND_MODULE] {
            for dep in unique_captures(re, text, 1) {
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
        }
        deps
    }

    fn test_failures(text: &str) -> u32 {
        let counted = sum_captures(&MOCHA_FAILING, text, &[1])
            .saturating_add(sum_captures(&JEST_FAILED, text, &[1]));
        if counted > 0 {
            counted
        } else {
            count_matching_lines(&FAIL_LINE, text)
        }
    }

    fn located_errors(text: &str) -> Vec<AnalyzerFinding> {
        compiler_errors(
            NAME,
            &[&*TS_LOCATION, &*WEBPACK_LOCATION],
            text,
            "Fix the reported TypeScript/bundler error",
        )
    }
}

impl LogAnalyzer for NpmAnalyzer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_analyze(&self, text: &str) -> bool {
        DETECT.is_match(text)
    }

    fn analyze(&self, text: &str) -> Vec<AnalyzerFinding> {
        let mut findings = Vec::new();

        if text.contains("Could not resolve dependency") || text.contains("ERESOLVE") {
            let message = match unique_captures(&UNRESOLVED_DEP, text, 1).first() {
                Some(dep) => format!("Failed to resolve package dependencies: {}", dep),
                None => "Failed to resolve package dependencies".to_string(),
            };
            findings.push(issue(
                NAME,
                FindingKind::DependencyResolution,
                message,
                "Check package.json versions and registry availability; try 'npm install --legacy-peer-deps'",
            ));
        }

        let typescript_errors = text.lines().any(|line| TS_LOCATION.is_match(line));
        if text.contains("Failed to compile") || text.contains("ERROR in") || typescript_errors {
            findings.push(issue(
                NAME,
                FindingKind::Compilation,
                "Webpack/TypeScript compilation failed",
                "Fix the reported build errors; run the build locally with 'npm run build'",
            ));
        }

        if Self::test_failures(text) > 0 {
            findings.push(issue(
                NAME,
                FindingKind::TestFailure,
                "Unit or integration tests failed",
                "Review failing test cases; reproduce locally with 'npm test'",
            ));
        }

        if text.contains("Module not found") || text.contains("Cannot find module") {
            let message = match Self::failed_dependencies(text)
                .into_iter()
                .find(|dep| !dep.contains(' '))
            {
                Some(module) => format!("Required module or package not found: {}", module),
                None => "Required module or package not found".to_string(),
            };
            findings.push(issue(
                NAME,
                FindingKind::MissingModule,
                message,
                "Run 'npm ci' to install dependencies from the lockfile and check import paths",
            ));
        }

        if text.contains("ECONNREFUSED") || text.contains("ETIMEDOUT") || text.contains("ENOTFOUND")
        {
            findings.push(issue(
                NAME,
                FindingKind::Network,
                "Network error accessing npm registry",
                "Check registry availability and proxy settings in .npmrc; clear the cache with 'npm cache clean --force'",
            ));
        }

        if text.contains("EACCES") || text.to_lowercase().contains("permission denied") {
            findings.push(issue(
                NAME,
                FindingKind::Permission,
                "Permission denied during npm operation",
                "Fix ownership of the npm cache and node_modules instead of running npm with sudo",
            ));
        }

        if text.contains("JavaScript heap out of memory") {
            findings.push(issue(
                NAME,
                FindingKind::OutOfMemory,
                "Node.js ran out of heap memory",
                "Increase the Node.js heap: NODE_OPTIONS=--max-old-space-size=4096",
            ));
        }

        findings.extend(Self::located_errors(text));
        findings
    }

    fn metrics(&self, text: &str) -> ToolMetrics {
        let mut metrics = ToolMetrics {
            compilation_errors: Self::located_errors(text).len() as u32,
            test_failures: Self::test_failures(text),
            failed_dependencies: Self::failed_dependencies(text),
            summary: String::new(),
        };
        metrics.summary = summary_line("NPM", &metrics, count_matching_lines(&ERROR_LINE, text));
        metrics
    }
}
