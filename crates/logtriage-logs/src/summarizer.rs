use logtriage_core::{LogSummary, LogsConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, VecDeque};

static STAGE_FAILED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)Stage "([^"]+)" failed"#).expect("valid stage failure regex")
});

static STAGE_SKIPPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)Stage "([^"]+)" skipped"#).expect("valid stage skipped regex")
});

static STAGE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[Pipeline\] \{ \((.+)\)\s*$").expect("valid stage open regex"));

static FAILURE_INDICATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:ERROR|FATAL):|script returned exit code [1-9]|BUILD FAILURE|BUILD FAILED")
        .expect("valid failure indicator regex")
});

const BLOCK_OPEN: &str = "[Pipeline] {";
const BLOCK_CLOSE: &str = "[Pipeline] }";
const PIPELINE_STEP: &str = "[Pipeline]";

/// Default number of distinct error lines kept in `top_errors`.
pub const DEFAULT_TOP_ERRORS: usize = 5;

/// Keyword-driven log summarizer. Single pass, linear in input size.
#[derive(Debug, Clone)]
pub struct Summarizer {
    error_keywords: Vec<String>,
    warning_keywords: Vec<String>,
    top_errors_limit: usize,
}

impl Default for Summarizer {
    fn default() -> Self {
        Self::from_config(&LogsConfig::default())
    }
}

impl Summarizer {
    pub fn new(error_keywords: &[String], warning_keywords: &[String]) -> Self {
        Self {
            error_keywords: lowercase_all(error_keywords),
            warning_keywords: lowercase_all(warning_keywords),
            top_errors_limit: DEFAULT_TOP_ERRORS,
        }
    }

    pub fn from_config(config: &LogsConfig) -> Self {
        Self::new(&config.error_keywords, &config.warning_keywords)
    }

    pub fn with_top_errors_limit(mut self, limit: usize) -> Self {
        self.top_errors_limit = limit;
        self
    }

    pub fn summarize(&self, text: &str, tail_lines: usize) -> LogSummary {
        let mut line_count = 0u64;
        let mut error_count = 0u32;
        let mut warning_count = 0u32;
        let mut failing_stages: Vec<String> = Vec::new();
        let mut tail: VecDeque<&str> = VecDeque::with_capacity(tail_lines.min(1024));
        let mut error_lines: HashMap<&str, (u32, u64)> = HashMap::new();
        // Innermost pipeline block last; anonymous blocks hold `None`.
        let mut blocks: Vec<Option<&str>> = Vec::new();
        let mut skipped_stages: Vec<&str> = Vec::new();
        // Stage that just closed, kept across pipeline bookkeeping lines only.
        let mut last_closed: Option<&str> = None;

        for line in text.lines() {
            line_count += 1;
            let lowered = line.to_lowercase();

            if self.error_keywords.iter().any(|k| lowered.contains(k.as_str())) {
                error_count += 1;
                let key = line.trim();
                let entry = error_lines.entry(key).or_insert((0, line_count));
                entry.0 += 1;
            }
            if self
                .warning_keywords
                .iter()
                .any(|k| lowered.contains(k.as_str()))
            {
                warning_count += 1;
            }

            if let Some(captures) = STAGE_FAILED.captures(line) {
                push_unique(&mut failing_stages, &captures[1]);
            }
            let skipped = STAGE_SKIPPED.captures(line);
            if let Some(name) = skipped.as_ref().and_then(|c| c.get(1)) {
                skipped_stages.push(name.as_str());
            }

            if let Some(captures) = STAGE_OPEN.captures(line) {
                if let Some(name) = captures.get(1) {
                    blocks.push(Some(name.as_str()));
                }
            } else if line.trim_end() == BLOCK_OPEN {
                blocks.push(None);
            } else if line.trim_end() == BLOCK_CLOSE {
                if let Some(Some(stage)) = blocks.pop() {
                    if !skipped_stages.contains(&stage) {
                        last_closed = Some(stage);
                    }
                }
            } else if FAILURE_INDICATOR.is_match(line) {
                let open = blocks.iter().rev().find_map(|b| *b);
                if let Some(stage) = open.or(last_closed) {
                    push_unique(&mut failing_stages, stage);
                }
                last_closed = None;
            } else if !line.starts_with(PIPELINE_STEP)
                && !line.trim().is_empty()
                && skipped.is_none()
            {
                last_closed = None;
            }

            if tail_lines > 0 {
                if tail.len() == tail_lines {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }

        LogSummary {
            total_bytes: text.len() as u64,
            line_count,
            error_count,
            warning_count,
            failing_stages,
            tail_lines: tail.into_iter().map(str::to_string).collect(),
            top_errors: rank_errors(error_lines, self.top_errors_limit),
        }
    }
}

fn lowercase_all(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn push_unique(stages: &mut Vec<String>, stage: &str) {
    if !stages.iter().any(|s| s == stage) {
        stages.push(stage.to_string());
    }
}

/// Most frequent first, ties by first appearance.
fn rank_errors(error_lines: HashMap<&str, (u32, u64)>, limit: usize) -> Vec<String> {
    let mut ranked: Vec<(&str, u32, u64)> = error_lines
        .into_iter()
        .filter(|(line, _)| !line.is_empty())
        .map(|(line, (count, first))| (line, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(line, _, _)| line.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_errors_and_keeps_exact_tail() {
        let summary = Summarizer::default().summarize(
            "INFO start\nERROR disk full\nERROR disk full\n",
            1,
        );
        assert_eq!(summary.line_count, 3);
        assert_eq!(summary.error_count, 2);
        assert_eq!(summary.warning_count, 0);
        assert_eq!(summary.tail_lines, vec!["ERROR disk full"]);
        assert_eq!(summary.top_errors, vec!["ERROR disk full"]);
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let summary = Summarizer::default().summarize("Fatal: boom\nwarning: x\nWARN y\nok", 10);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.warning_count, 2);
        assert_eq!(summary.tail_lines.len(), 4);
    }

    #[test]
    fn custom_keywords_replace_defaults() {
        let summarizer = Summarizer::new(&["panic".to_string()], &[]);
        let summary = summarizer.summarize("ERROR a\nthread panicked\n", 0);
        assert_eq!(summary.error_count, 1);
        assert!(summary.tail_lines.is_empty());
    }

    #[test]
    fn failing_stages_first_seen_and_deduplicated() {
        let log = "Stage \"Test\" failed\nStage \"Build\" FAILED\nStage \"Test\" failed\n";
        let summary = Summarizer::default().summarize(log, 0);
        assert_eq!(summary.failing_stages, vec!["Test", "Build"]);
    }

    #[test]
    fn failing_stage_from_pipeline_block() {
        let log = "\
[Pipeline] stage
[Pipeline] { (Checkout)
[Pipeline] checkout
[Pipeline] }
[Pipeline] // stage
[Pipeline] stage
[Pipeline] { (Unit Tests)
[Pipeline] sh
+ make test
[Pipeline] }
ERROR: script returned exit code 2
[Pipeline] // stage
";
        let summary = Summarizer::default().summarize(log, 0);
        assert_eq!(summary.failing_stages, vec!["Unit Tests"]);

        let log = "\
[Pipeline] { (Unit Tests)
[Pipeline] {
+ make test
ERROR: script returned exit code 2
[Pipeline] }
[Pipeline] }
";
        let summary = Summarizer::default().summarize(log, 0);
        assert_eq!(summary.failing_stages, vec!["Unit Tests"]);
    }

    #[test]
    fn failure_after_pipeline_end_blames_last_closed_stage() {
        let log = "\
[Pipeline] node
[Pipeline] {
[Pipeline] stage
[Pipeline] { (Build)
+ make
[Pipeline] }
[Pipeline] // stage
[Pipeline] stage
[Pipeline] { (Test)
+ make test
[Pipeline] }
[Pipeline] // stage
[Pipeline] stage
[Pipeline] { (Deploy)
Stage \"Deploy\" skipped due to earlier failure(s)
[Pipeline] }
[Pipeline] // stage
[Pipeline] }
[Pipeline] // node
[Pipeline] End of Pipeline
ERROR: script returned exit code 1
Finished: FAILURE
";
        let summary = Summarizer::default().summarize(log, 0);
        assert_eq!(summary.failing_stages, vec!["Test"]);
    }

    #[test]
    fn unrelated_output_between_close_and_failure_blames_nobody() {
        let log = "\
[Pipeline] { (Build)
+ make
[Pipeline] }
Sending notifications
ERROR: mail server unreachable
";
        let summary = Summarizer::default().summarize(log, 0);
        assert!(summary.failing_stages.is_empty());
    }

    #[test]
    fn top_errors_ranked_by_frequency() {
        let log = "error: a\nerror: b\nerror: b\nerror: c\nerror: a\nerror: b\n";
        let summary = Summarizer::default()
            .with_top_errors_limit(2)
            .summarize(log, 0);
        assert_eq!(summary.top_errors, vec!["error: b", "error: a"]);
    }

    #[test]
    fn empty_text() {
        let summary = Summarizer::default().summarize("", 5);
        assert_eq!(summary.line_count, 0);
        assert_eq!(summary.total_bytes, 0);
        assert!(summary.tail_lines.is_empty());
    }
}
