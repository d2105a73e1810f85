use crate::compare::{compare, test_delta};
use crate::flaky::detect_flaky;
use crate::triage::{triage, TriageConfig};
use futures::future::try_join_all;
use logtriage_analyzers::{self as analyzers, AnalysisOutcome, Analyzer};
use logtriage_core::{
    BuildComparison, BuildRef, BuildSelector, BuildSource, FlakinessReport, FlakyConfig,
    LogSource, LogSummary, LogTriageConfig, LogWindow, Result, SearchMatch, TriageError,
    TriageReport,
};
use logtriage_logs::{
    compile_pattern, filter_lines, redact, search_lines, LogFetcher, Summarizer,
    MAX_SEARCH_MATCHES,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Defaults applied when a caller leaves a bound unspecified.
#[derive(Debug, Clone)]
pub struct ServiceDefaults {
    pub max_bytes: u64,
    pub tail_lines: usize,
}

/// Request pipeline over a log source and a build metadata source.
///
/// Stateless between calls; every operation fetches what it needs.
#[derive(Clone)]
pub struct TriageService {
    fetcher: LogFetcher,
    builds: Arc<dyn BuildSource>,
    summarizer: Summarizer,
    triage_config: TriageConfig,
    flaky_config: FlakyConfig,
    defaults: ServiceDefaults,
}

impl TriageService {
    pub fn new(
        logs: Arc<dyn LogSource>,
        builds: Arc<dyn BuildSource>,
        config: &LogTriageConfig,
    ) -> Self {
        Self {
            fetcher: LogFetcher::new(logs, Duration::from_secs(config.logs.fetch_timeout_secs)),
            builds,
            summarizer: Summarizer::from_config(&config.logs),
            triage_config: TriageConfig::default(),
            flaky_config: config.flaky.clone(),
            defaults: ServiceDefaults {
                max_bytes: config.logs.max_bytes_default,
                tail_lines: config.logs.tail_lines_default,
            },
        }
    }

    pub fn with_triage_config(mut self, triage_config: TriageConfig) -> Self {
        self.triage_config = triage_config;
        self
    }

    pub fn defaults(&self) -> &ServiceDefaults {
        &self.defaults
    }

    pub fn flaky_config(&self) -> &FlakyConfig {
        &self.flaky_config
    }

    fn max_bytes(&self, requested: Option<u64>) -> u64 {
        requested.unwrap_or(self.defaults.max_bytes)
    }

    /// Turn `"last"` into a concrete build number.
    pub async fn resolve_build(&self, job: &str, selector: BuildSelector) -> Result<BuildRef> {
        validate_job(job)?;
        match selector {
            BuildSelector::Number(number) => Ok(BuildRef::new(job, number)),
            BuildSelector::Last => {
                let number = self
                    .builds
                    .last_build_number(job)
                    .await
                    .map_err(|e| e.in_stage("resolve last build"))?;
                debug!("Resolved last build of {} to #{}", job, number);
                Ok(BuildRef::new(job, number))
            }
        }
    }

    /// One window of the raw log.
    ///
    /// Offsets always refer to the raw log; redaction and filtering only
    /// change the returned bytes.
    pub async fn fetch_log(
        &self,
        build: &BuildRef,
        start: u64,
        max_bytes: Option<u64>,
        filter: Option<&str>,
        redact_output: bool,
    ) -> Result<LogWindow> {
        let filter = filter.map(compile_pattern).transpose()?;
        info!("fetch_log {} from offset {}", build, start);

        let mut window = self
            .fetcher
            .fetch(build, start, self.max_bytes(max_bytes))
            .await
            .map_err(|e| e.in_stage("fetch_log"))?;

        if redact_output || filter.is_some() {
            let mut text = window.text();
            if redact_output {
                text = redact(&text);
            }
            if let Some(filter) = &filter {
                text = filter_lines(&text, filter);
            }
            window.data = text.into_bytes();
        }
        Ok(window)
    }

    async fn tail_text(&self, build: &BuildRef, max_bytes: u64, stage: &str) -> Result<String> {
        let window = self
            .fetcher
            .fetch_tail(build, max_bytes)
            .await
            .map_err(|e| e.in_stage(stage))?;
        debug!(
            "{}: read {} bytes of {} ending at offset {}",
            stage,
            window.data.len(),
            build,
            window.end_offset
        );
        Ok(redact(&window.text()))
    }

    pub async fn summarize_log(
        &self,
        build: &BuildRef,
        max_bytes: Option<u64>,
        tail_lines: Option<usize>,
    ) -> Result<LogSummary> {
        info!("summarize_log {}", build);
        let text = self
            .tail_text(build, self.max_bytes(max_bytes), "summarize_log")
            .await?;
        Ok(self
            .summarizer
            .summarize(&text, tail_lines.unwrap_or(self.defaults.tail_lines)))
    }

    pub async fn analyze_log(
        &self,
        build: &BuildRef,
        analyzer: Option<&str>,
        max_bytes: Option<u64>,
    ) -> Result<AnalysisOutcome> {
        // Reject unknown analyzer names before touching the network.
        if let Some(name) = analyzer {
            Analyzer::by_name(name)?;
        }
        info!("analyze_log {} analyzer={:?}", build, analyzer);
        let text = self
            .tail_text(build, self.max_bytes(max_bytes), "analyze_log")
            .await?;
        analyzers::run(&text, analyzer)
    }

    pub async fn triage_failure(
        &self,
        build: &BuildRef,
        max_bytes: Option<u64>,
    ) -> Result<TriageReport> {
        info!("triage_failure {}", build);
        let (meta, changes) = futures::try_join!(
            self.builds.build_metadata(build),
            self.builds.scm_changes(build)
        )
        .map_err(|e| e.in_stage("triage_failure"))?;

        if !is_failure_result(&meta.result) {
            info!("triage_failure {}: not a failure (result: {})", build, meta.result);
            return Ok(TriageReport::not_a_failure(meta.result));
        }

        let text = self
            .tail_text(build, self.max_bytes(max_bytes), "triage_failure")
            .await?;
        let summary = self.summarizer.summarize(&text, self.defaults.tail_lines);
        let outcome = analyzers::run(&text, None)?;

        let mut report = triage(&summary, &outcome.findings, &changes, &self.triage_config);
        report.build_result = Some(meta.result);
        info!(
            "triage_failure {}: {} hypotheses, {} suspect commit(s)",
            build,
            report.hypotheses.len(),
            report.suspect_commits.len()
        );
        Ok(report)
    }

    pub async fn compare_builds(
        &self,
        job: &str,
        base: u32,
        head: u32,
        include_logs: bool,
    ) -> Result<BuildComparison> {
        validate_job(job)?;
        let base_ref = BuildRef::new(job, base);
        let head_ref = BuildRef::new(job, head);
        info!("compare_builds {} #{} vs #{}", job, base, head);

        let (base_meta, head_meta) = futures::try_join!(
            self.builds.build_metadata(&base_ref),
            self.builds.build_metadata(&head_ref)
        )
        .map_err(|e| e.in_stage("compare_builds"))?;

        let (base_tests, head_tests) = futures::try_join!(
            self.builds.test_records(&base_ref),
            self.builds.test_records(&head_ref)
        )
        .map_err(|e| e.in_stage("compare_builds"))?;

        let mut comparison = if include_logs {
            let (base_summary, head_summary) = futures::try_join!(
                self.summarize_log(&base_ref, None, Some(0)),
                self.summarize_log(&head_ref, None, Some(0))
            )
            .map_err(|e| e.in_stage("compare_builds"))?;
            compare(
                &base_meta,
                &head_meta,
                Some(&base_summary),
                Some(&head_summary),
            )
        } else {
            compare(&base_meta, &head_meta, None, None)
        };
        comparison.test_delta = test_delta(&base_tests, &head_tests);
        if comparison.test_delta.is_none() {
            debug!("compare_builds {}: test results not available for both builds", job);
        }
        Ok(comparison)
    }

    pub async fn detect_flaky_tests(
        &self,
        job: &str,
        window_size: Option<usize>,
    ) -> Result<FlakinessReport> {
        validate_job(job)?;
        let window = window_size.unwrap_or(self.flaky_config.default_window);
        if window < self.flaky_config.min_observations {
            return Err(TriageError::invalid(format!(
                "window_size {} is smaller than the minimum of {} observations",
                window, self.flaky_config.min_observations
            )));
        }
        if window > self.flaky_config.max_window {
            return Err(TriageError::invalid(format!(
                "window_size {} exceeds the maximum of {}",
                window, self.flaky_config.max_window
            )));
        }

        info!("detect_flaky_tests {} over {} builds", job, window);
        let numbers = self
            .builds
            .recent_builds(job, window)
            .await
            .map_err(|e| e.in_stage("detect_flaky_tests"))?;

        let refs: Vec<BuildRef> = numbers.iter().map(|n| BuildRef::new(job, *n)).collect();
        let per_build = try_join_all(refs.iter().map(|b| self.builds.test_records(b)))
            .await
            .map_err(|e| e.in_stage("detect_flaky_tests"))?;
        let records: Vec<_> = per_build.into_iter().flatten().collect();
        debug!(
            "detect_flaky_tests {}: {} records from {} builds",
            job,
            records.len(),
            refs.len()
        );

        Ok(detect_flaky(&records, self.flaky_config.min_observations))
    }

    pub async fn search_log(
        &self,
        build: &BuildRef,
        pattern: &str,
        window_lines: usize,
        max_bytes: Option<u64>,
    ) -> Result<Vec<SearchMatch>> {
        let pattern = compile_pattern(pattern)?;
        info!("search_log {} /{}/", build, pattern.as_str());

        let window = self
            .fetcher
            .fetch(build, 0, self.max_bytes(max_bytes))
            .await
            .map_err(|e| e.in_stage("search_log"))?;
        let text = redact(&window.text());
        Ok(search_lines(&text, &pattern, window_lines, MAX_SEARCH_MATCHES))
    }
}

/// Only `FAILURE` builds are triaged; success, unstable, aborted and
/// running builds report their result and nothing else.
fn is_failure_result(result: &str) -> bool {
    result.eq_ignore_ascii_case("FAILURE")
}

/// Reject empty job names and paths with empty or `..` segments.
pub fn validate_job(job: &str) -> Result<()> {
    let job = job.trim();
    if job.is_empty() {
        return Err(TriageError::invalid("job name must not be empty"));
    }
    if job.split('/').any(|segment| segment.is_empty() || segment == "..") {
        return Err(TriageError::invalid(format!("invalid job path '{}'", job)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{is_failure_result, validate_job};

    #[test]
    fn only_failure_results_are_triaged() {
        assert!(is_failure_result("FAILURE"));
        assert!(!is_failure_result("SUCCESS"));
        assert!(!is_failure_result("UNSTABLE"));
        assert!(!is_failure_result("IN_PROGRESS"));
    }

    #[test]
    fn job_paths_are_validated() {
        assert!(validate_job("team/service").is_ok());
        assert!(validate_job("").is_err());
        assert!(validate_job("team//service").is_err());
        assert!(validate_job("../etc").is_err());
    }
}
