use logtriage_core::{
    AnalyzerFinding, FindingKind, LogSummary, ScmChange, Severity, TriageHypothesis, TriageReport,
};
use serde::{Deserialize, Serialize};

/// Tunables of the hypothesis scoring heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Confidence of a hypothesis backed by a single analyzer finding.
    pub analyzer_base: f64,
    /// Added per additional finding in the same group.
    pub corroboration_step: f64,
    /// Added once when a commit touched a file named by the group's findings.
    pub scm_match_boost: f64,
    /// Starting confidence of a log-only hypothesis.
    pub log_only_base: f64,
    /// Log-only hypotheses never exceed this; kept below `analyzer_base`.
    pub log_only_ceiling: f64,
    /// Confidence of the catch-all hypothesis when nothing else is known.
    pub unknown_confidence: f64,
    pub prefix_max_chars: usize,
    pub max_evidence: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            analyzer_base: 0.6,
            corroboration_step: 0.1,
            scm_match_boost: 0.15,
            log_only_base: 0.3,
            log_only_ceiling: 0.4,
            unknown_confidence: 0.1,
            prefix_max_chars: 60,
            max_evidence: 5,
        }
    }
}

impl TriageConfig {
    fn effective_log_only_ceiling(&self) -> f64 {
        // Must stay strictly under the analyzer base.
        self.log_only_ceiling.min(self.analyzer_base - 0.01).max(0.0)
    }
}

pub const INSPECT_FULL_LOG: &str = "Inspect the full log around the first error";

// Keyword categories for log-only hypotheses, matched on lowercased lines in order.
const LOG_CATEGORIES: &[(&[&str], FindingKind, &str)] = &[
    (
        &["timed out", "timeout"],
        FindingKind::Timeout,
        "Operation timed out",
    ),
    (
        &["out of memory", "outofmemoryerror", "heap space"],
        FindingKind::OutOfMemory,
        "Process ran out of memory",
    ),
    (
        &["connection refused", "could not resolve host", "network is unreachable", "econnrefused"],
        FindingKind::Network,
        "Network connectivity failure",
    ),
    (
        &["permission denied", "access denied", "eacces"],
        FindingKind::Permission,
        "Permission denied",
    ),
    (
        &["compilation error", "compilation failed", "cannot find symbol"],
        FindingKind::Compilation,
        "Compilation failed",
    ),
    (
        &["test failed", "tests failed", "failing"],
        FindingKind::TestFailure,
        "Test failures",
    ),
    (
        &["not found", "no such file"],
        FindingKind::MissingModule,
        "Missing file, module or resource",
    ),
    (
        &["npm err", "package"],
        FindingKind::DependencyResolution,
        "Package manager failure",
    ),
];

/// Recommended action per failure category; `None` falls back to [`INSPECT_FULL_LOG`].
pub fn action_for(kind: FindingKind) -> Option<&'static str> {
    match kind {
        FindingKind::DependencyResolution => {
            Some("Check dependency version pins and repository availability")
        }
        FindingKind::Compilation => Some("Fix compilation errors at the reported locations"),
        FindingKind::TestFailure => {
            Some("Re-run the failing tests locally and review recent test changes")
        }
        FindingKind::TaskExecution => Some("Inspect the output of the failing build task"),
        FindingKind::PluginExecution => Some("Check build plugin versions and configuration"),
        FindingKind::OutOfMemory => Some("Increase memory limits for the build or the agent"),
        FindingKind::DaemonCrash => Some("Stop the build daemon and retry the build"),
        FindingKind::MissingModule => {
            Some("Verify the module is declared in the manifest and installed")
        }
        FindingKind::Network => Some("Check network connectivity from the agent to registries"),
        FindingKind::Permission => Some("Check file permissions and credentials on the agent"),
        FindingKind::Timeout => Some("Look for hanging steps; raise timeouts only if the work is slow"),
        FindingKind::Other => None,
    }
}

/// Grouping key: text before the first ':', trimmed and bounded.
pub fn message_prefix(message: &str, max_chars: usize) -> String {
    let head = message.split(':').next().unwrap_or(message).trim();
    head.chars().take(max_chars).collect()
}

struct Group<'a> {
    analyzer: &'a str,
    prefix: String,
    findings: Vec<&'a AnalyzerFinding>,
}

/// Rank root-cause hypotheses for a failed build.
///
/// Deterministic for identical inputs. Empty findings or SCM data are valid
/// and produce log-only hypotheses.
pub fn triage(
    summary: &LogSummary,
    findings: &[AnalyzerFinding],
    scm_changes: &[ScmChange],
    config: &TriageConfig,
) -> TriageReport {
    let groups = group_error_findings(findings, config.prefix_max_chars);
    let mut suspect_commits: Vec<String> = Vec::new();
    // Template source per hypothesis, parallel to `hypotheses`.
    let mut suggestions: Vec<Option<&str>> = Vec::new();
    let mut hypotheses: Vec<TriageHypothesis> = Vec::new();

    for group in &groups {
        let first = group.findings[0];
        let corroborating = (group.findings.len() - 1) as f64;
        let mut confidence = config.analyzer_base + config.corroboration_step * corroborating;
        let mut evidence = group_evidence(group, config.max_evidence);

        let matched = matching_commits(group, scm_changes);
        if !matched.is_empty() {
            confidence += config.scm_match_boost;
            for (change, file) in matched {
                evidence.push(format!(
                    "Commit {} by {} touched {}",
                    short_id(&change.commit_id),
                    change.author,
                    file
                ));
                if !suspect_commits.contains(&change.commit_id) {
                    suspect_commits.push(change.commit_id.clone());
                }
            }
        }
        if !summary.failing_stages.is_empty() {
            evidence.push(format!(
                "Failing stage(s): {}",
                summary.failing_stages.join(", ")
            ));
        }

        hypotheses.push(TriageHypothesis {
            cause: first.message.clone(),
            category: first.kind,
            confidence: confidence.clamp(0.0, 1.0),
            evidence,
        });
        suggestions.push(first.suggestion.as_deref());
    }

    if hypotheses.is_empty() {
        hypotheses = log_only_hypotheses(summary, config);
        suggestions = vec![None; hypotheses.len()];
    }

    let mut ranked: Vec<(TriageHypothesis, Option<&str>)> =
        hypotheses.into_iter().zip(suggestions).collect();
    // Stable: equal confidences keep first-seen order.
    ranked.sort_by(|a, b| b.0.confidence.total_cmp(&a.0.confidence));

    let mut next_actions: Vec<String> = Vec::new();
    for (hypothesis, suggestion) in &ranked {
        let action = action_for(hypothesis.category).unwrap_or(INSPECT_FULL_LOG);
        push_unique(&mut next_actions, action);
        if let Some(suggestion) = suggestion {
            push_unique(&mut next_actions, suggestion);
        }
    }
    if !summary.failing_stages.is_empty() {
        push_unique(
            &mut next_actions,
            &format!(
                "Review failing stage(s): {}",
                summary.failing_stages.join(", ")
            ),
        );
    }
    if !suspect_commits.is_empty() {
        push_unique(
            &mut next_actions,
            &format!(
                "Review suspect commit(s): {}",
                suspect_commits
                    .iter()
                    .map(|c| short_id(c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
    }
    if next_actions.is_empty() {
        next_actions.push(INSPECT_FULL_LOG.to_string());
    }

    let top_errors = if summary.top_errors.is_empty() {
        groups
            .iter()
            .map(|g| g.findings[0].message.clone())
            .take(config.max_evidence)
            .collect()
    } else {
        summary.top_errors.clone()
    };

    TriageReport {
        build_result: None,
        hypotheses: ranked.into_iter().map(|(h, _)| h).collect(),
        top_errors,
        failing_stages: summary.failing_stages.clone(),
        suspect_commits,
        next_actions,
    }
}

fn group_error_findings(findings: &[AnalyzerFinding], prefix_max_chars: usize) -> Vec<Group<'_>> {
    let mut groups: Vec<Group<'_>> = Vec::new();
    for finding in findings.iter().filter(|f| f.severity == Severity::Error) {
        let prefix = message_prefix(&finding.message, prefix_max_chars);
        match groups
            .iter_mut()
            .find(|g| g.analyzer == finding.analyzer && g.prefix == prefix)
        {
            Some(group) => group.findings.push(finding),
            None => groups.push(Group {
                analyzer: &finding.analyzer,
                prefix,
                findings: vec![finding],
            }),
        }
    }
    groups
}

fn group_evidence(group: &Group<'_>, max: usize) -> Vec<String> {
    let mut evidence: Vec<String> = Vec::new();
    for finding in &group.findings {
        if evidence.len() >= max {
            break;
        }
        let line = match &finding.location {
            Some(location) => match location.line {
                Some(line) => format!("{} ({}:{})", finding.message, location.file, line),
                None => format!("{} ({})", finding.message, location.file),
            },
            None => format!("[{}] {}", finding.analyzer, finding.message),
        };
        push_unique(&mut evidence, &line);
    }
    evidence
}

/// Commits whose changed files match a location of the group, with the matched file.
fn matching_commits<'a>(
    group: &Group<'_>,
    scm_changes: &'a [ScmChange],
) -> Vec<(&'a ScmChange, &'a str)> {
    let locations: Vec<&str> = group
        .findings
        .iter()
        .filter_map(|f| f.location.as_ref().map(|l| l.file.as_str()))
        .collect();
    if locations.is_empty() {
        return Vec::new();
    }

    scm_changes
        .iter()
        .filter_map(|change| {
            change
                .changed_files
                .iter()
                .find(|changed| locations.iter().any(|loc| paths_match(changed, loc)))
                .map(|changed| (change, changed.as_str()))
        })
        .collect()
}

/// Equal, or one path is a `/`-aligned suffix of the other.
pub fn paths_match(a: &str, b: &str) -> bool {
    let a = a.trim_start_matches("./");
    let b = b.trim_start_matches("./");
    if a == b {
        return true;
    }
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    !short.is_empty()
        && long.ends_with(short)
        && long.as_bytes()[long.len() - short.len() - 1] == b'/'
}

fn log_only_hypotheses(summary: &LogSummary, config: &TriageConfig) -> Vec<TriageHypothesis> {
    let ceiling = config.effective_log_only_ceiling();
    let mut matched: Vec<(usize, Vec<&str>)> = Vec::new();
    let mut uncategorized: Vec<&str> = Vec::new();

    for line in summary.top_errors.iter().map(String::as_str) {
        let lowered = line.to_lowercase();
        let category = LOG_CATEGORIES
            .iter()
            .position(|(keywords, _, _)| keywords.iter().any(|k| lowered.contains(k)));
        match category {
            Some(idx) => match matched.iter_mut().find(|(i, _)| *i == idx) {
                Some((_, lines)) => lines.push(line),
                None => matched.push((idx, vec![line])),
            },
            None => uncategorized.push(line),
        }
    }

    let mut hypotheses: Vec<TriageHypothesis> = matched
        .into_iter()
        .map(|(idx, lines)| {
            let (_, kind, cause) = LOG_CATEGORIES[idx];
            let confidence = (config.log_only_base
                + config.corroboration_step / 2.0 * (lines.len() - 1) as f64)
                .min(ceiling);
            TriageHypothesis {
                cause: cause.to_string(),
                category: kind,
                confidence,
                evidence: lines
                    .into_iter()
                    .take(config.max_evidence)
                    .map(str::to_string)
                    .collect(),
            }
        })
        .collect();

    if let Some(first) = uncategorized.first() {
        hypotheses.push(TriageHypothesis {
            cause: format!("Errors in log: {}", first),
            category: FindingKind::Other,
            confidence: (config.log_only_base - config.corroboration_step).clamp(0.0, ceiling),
            evidence: uncategorized
                .iter()
                .take(config.max_evidence)
                .map(|l| l.to_string())
                .collect(),
        });
    }

    if hypotheses.is_empty() {
        let mut evidence = Vec::new();
        if !summary.failing_stages.is_empty() {
            evidence.push(format!(
                "Failing stage(s): {}",
                summary.failing_stages.join(", ")
            ));
        }
        hypotheses.push(TriageHypothesis {
            cause: "Unknown failure cause".to_string(),
            category: FindingKind::Other,
            confidence: config.unknown_confidence.min(ceiling),
            evidence,
        });
    }

    hypotheses
}

fn push_unique(items: &mut Vec<String>, item: &str) {
    if !items.iter().any(|i| i == item) {
        items.push(item.to_string());
    }
}

fn short_id(commit: &str) -> &str {
    commit.get(..12).unwrap_or(commit)
}
