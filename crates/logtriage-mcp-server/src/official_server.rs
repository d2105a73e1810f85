// ABOUTME: MCP server exposing Jenkins log retrieval, analysis and triage tools
// ABOUTME: Wraps TriageService with per-caller rate limiting, response caching and error mapping

use crate::errors::{internal_error, to_mcp_error};
use crate::rate_limit::CallerRateLimiter;
use crate::stats::{CallOutcome, ServerStats};
use logtriage_analyzers::Analyzer;
use logtriage_cache::ResponseCache;
use logtriage_core::{
    BuildRef, BuildSelector, BuildSource, LogSource, LogTriageConfig, LogWindow, TriageError,
};
use logtriage_engine::{validate_job, TriageService};
use logtriage_jenkins::JenkinsClient;
use logtriage_logs::{compile_pattern, DEFAULT_WINDOW_LINES};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, Peer, RoleServer, ServerHandler,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Caller identity when the client did not introduce itself.
pub const ANONYMOUS_CALLER: &str = "client:anonymous";

const MAX_WINDOW_LINES: usize = 50;

const INSTRUCTIONS: &str = "Jenkins build log triage. Start with triage_failure for a failed \
build; it returns ranked root-cause hypotheses, suspect commits and next actions. Use \
summarize_log or analyze_log for a compact view of one log, search_log to locate a pattern \
with context, and fetch_log to page through the raw log by byte offset (pass the returned \
end_offset as the next start while has_more is true). compare_builds diffs two builds of a \
job and detect_flaky_tests scores tests across recent builds. `build` accepts a build \
number or \"last\". Secrets are redacted from every log excerpt.";

/// A build number, or `"last"` for the most recent build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum BuildSpec {
    Number(u32),
    Label(String),
}

impl Default for BuildSpec {
    fn default() -> Self {
        BuildSpec::Label("last".to_string())
    }
}

impl From<u32> for BuildSpec {
    fn from(number: u32) -> Self {
        BuildSpec::Number(number)
    }
}

impl BuildSpec {
    pub fn selector(&self) -> Result<BuildSelector, TriageError> {
        let selector = match self {
            BuildSpec::Number(number) => BuildSelector::Number(*number),
            BuildSpec::Label(label) => BuildSelector::parse(label).ok_or_else(|| {
                TriageError::invalid(format!(
                    "build must be a build number or \"last\", got '{}'",
                    label
                ))
            })?,
        };
        if selector == BuildSelector::Number(0) {
            return Err(TriageError::invalid("build numbers start at 1"));
        }
        Ok(selector)
    }

    /// Explicit number, when the request pins one.
    fn pinned(&self) -> Option<u32> {
        match self.selector() {
            Ok(BuildSelector::Number(number)) => Some(number),
            _ => None,
        }
    }
}

fn default_redact() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchLogRequest {
    /// Full job name; folders separated by '/'
    pub job: String,
    /// Build number or "last" (default)
    #[serde(default)]
    pub build: BuildSpec,
    /// Byte offset into the raw log to start reading from
    #[serde(default)]
    pub start: u64,
    /// Maximum bytes to return (defaults to the configured bound)
    #[serde(default)]
    pub max_bytes: Option<u64>,
    /// Only return lines matching this regex
    #[serde(default)]
    pub filter_regex: Option<String>,
    /// Mask secrets and strip ANSI codes (default true)
    #[serde(default = "default_redact")]
    pub redact: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SummarizeLogRequest {
    /// Full job name; folders separated by '/'
    pub job: String,
    /// Build number or "last" (default)
    #[serde(default)]
    pub build: BuildSpec,
    /// Bytes read from the end of the log
    #[serde(default)]
    pub max_bytes: Option<u64>,
    /// Number of trailing lines to include
    #[serde(default)]
    pub tail_lines: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeLogRequest {
    /// Full job name; folders separated by '/'
    pub job: String,
    /// Build number or "last" (default)
    #[serde(default)]
    pub build: BuildSpec,
    /// maven, gradle or npm; detected from the log when omitted
    #[serde(default)]
    pub analyzer: Option<String>,
    /// Bytes read from the end of the log
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriageFailureRequest {
    /// Full job name; folders separated by '/'
    pub job: String,
    /// Build number or "last" (default)
    #[serde(default)]
    pub build: BuildSpec,
    /// Bytes read from the end of the log
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompareBuildsRequest {
    /// Full job name; folders separated by '/'
    pub job: String,
    /// Baseline build number
    pub base: u32,
    /// Build number compared against the baseline
    pub head: u32,
    /// Also compare error and warning counts from both logs
    #[serde(default)]
    pub include_logs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetectFlakyTestsRequest {
    /// Full job name; folders separated by '/'
    pub job: String,
    /// Number of most recent builds to inspect
    #[serde(default)]
    pub window_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchLogRequest {
    /// Full job name; folders separated by '/'
    pub job: String,
    /// Build number or "last" (default)
    #[serde(default)]
    pub build: BuildSpec,
    /// Regex to search for
    pub pattern: String,
    /// Context lines before and after each match
    #[serde(default)]
    pub window_lines: Option<usize>,
    /// Bytes read from the start of the log
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct EmptyRequest {}

/// One tool invocation with its arguments.
#[derive(Debug, Clone)]
pub enum ToolCall {
    FetchLog(FetchLogRequest),
    SummarizeLog(SummarizeLogRequest),
    AnalyzeLog(AnalyzeLogRequest),
    TriageFailure(TriageFailureRequest),
    CompareBuilds(CompareBuildsRequest),
    DetectFlakyTests(DetectFlakyTestsRequest),
    SearchLog(SearchLogRequest),
    ServerStats,
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::FetchLog(_) => "fetch_log",
            ToolCall::SummarizeLog(_) => "summarize_log",
            ToolCall::AnalyzeLog(_) => "analyze_log",
            ToolCall::TriageFailure(_) => "triage_failure",
            ToolCall::CompareBuilds(_) => "compare_builds",
            ToolCall::DetectFlakyTests(_) => "detect_flaky_tests",
            ToolCall::SearchLog(_) => "search_log",
            ToolCall::ServerStats => "server_stats",
        }
    }

    /// Checks that need no upstream round trip.
    fn validate(&self) -> Result<(), TriageError> {
        match self {
            ToolCall::FetchLog(r) => {
                validate_job(&r.job)?;
                r.build.selector()?;
                validate_max_bytes(r.max_bytes)?;
                if let Some(filter) = &r.filter_regex {
                    compile_pattern(filter)?;
                }
            }
            ToolCall::SummarizeLog(r) => {
                validate_job(&r.job)?;
                r.build.selector()?;
                validate_max_bytes(r.max_bytes)?;
            }
            ToolCall::AnalyzeLog(r) => {
                validate_job(&r.job)?;
                r.build.selector()?;
                validate_max_bytes(r.max_bytes)?;
                if let Some(name) = &r.analyzer {
                    Analyzer::by_name(name)?;
                }
            }
            ToolCall::TriageFailure(r) => {
                validate_job(&r.job)?;
                r.build.selector()?;
                validate_max_bytes(r.max_bytes)?;
            }
            ToolCall::CompareBuilds(r) => {
                validate_job(&r.job)?;
                if r.base == 0 || r.head == 0 {
                    return Err(TriageError::invalid("build numbers start at 1"));
                }
            }
            ToolCall::DetectFlakyTests(r) => validate_job(&r.job)?,
            ToolCall::SearchLog(r) => {
                validate_job(&r.job)?;
                r.build.selector()?;
                validate_max_bytes(r.max_bytes)?;
                compile_pattern(&r.pattern)?;
                if r.window_lines.is_some_and(|n| n > MAX_WINDOW_LINES) {
                    return Err(TriageError::invalid(format!(
                        "window_lines must be at most {}",
                        MAX_WINDOW_LINES
                    )));
                }
            }
            ToolCall::ServerStats => {}
        }
        Ok(())
    }

    /// Arguments identifying a cacheable response.
    ///
    /// Only requests pinned to an explicit build are cached; `"last"` moves,
    /// log pages are cheap and flaky windows follow the newest builds.
    fn cache_arguments(&self) -> Option<Value> {
        let (arguments, build) = match self {
            ToolCall::SummarizeLog(r) => (serde_json::to_value(r), &r.build),
            ToolCall::AnalyzeLog(r) => (serde_json::to_value(r), &r.build),
            ToolCall::TriageFailure(r) => (serde_json::to_value(r), &r.build),
            ToolCall::SearchLog(r) => (serde_json::to_value(r), &r.build),
            ToolCall::CompareBuilds(r) => return serde_json::to_value(r).ok(),
            _ => return None,
        };
        let number = build.pinned()?;
        let mut arguments = arguments.ok()?;
        // "42" and 42 name the same build.
        arguments["build"] = json!(number);
        Some(arguments)
    }
}

fn validate_max_bytes(max_bytes: Option<u64>) -> Result<(), TriageError> {
    match max_bytes {
        Some(0) => Err(TriageError::invalid("max_bytes must be greater than zero")),
        _ => Ok(()),
    }
}

enum Failure {
    Triage(TriageError),
    Encode(serde_json::Error),
}

impl From<TriageError> for Failure {
    fn from(err: TriageError) -> Self {
        Failure::Triage(err)
    }
}

impl From<serde_json::Error> for Failure {
    fn from(err: serde_json::Error) -> Self {
        Failure::Encode(err)
    }
}

/// Tool result plus the build it was computed for.
struct Computed {
    build: Option<BuildRef>,
    result: Value,
}

#[derive(Clone)]
pub struct LogTriageServer {
    service: TriageService,
    cache: Arc<ResponseCache>,
    limiter: Arc<CallerRateLimiter>,
    stats: Arc<ServerStats>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl LogTriageServer {
    pub fn new(
        service: TriageService,
        cache: Arc<ResponseCache>,
        limiter: Arc<CallerRateLimiter>,
    ) -> Self {
        Self {
            service,
            cache,
            limiter,
            stats: Arc::new(ServerStats::new()),
            tool_router: Self::tool_router(),
        }
    }

    /// Server over arbitrary log and build sources.
    pub fn with_sources(
        logs: Arc<dyn LogSource>,
        builds: Arc<dyn BuildSource>,
        config: &LogTriageConfig,
    ) -> Result<Self, TriageError> {
        let service = TriageService::new(logs, builds, config);
        let cache = Arc::new(ResponseCache::new(&config.cache));
        let limiter = Arc::new(CallerRateLimiter::new(&config.rate_limit)?);
        Ok(Self::new(service, cache, limiter))
    }

    /// Server talking to the configured Jenkins instance.
    pub fn from_config(config: &LogTriageConfig) -> Result<Self, TriageError> {
        let jenkins = Arc::new(JenkinsClient::from_config(&config.jenkins)?);
        info!("Using Jenkins at {}", jenkins.base_url());
        Self::with_sources(jenkins.clone(), jenkins, config)
    }

    pub fn rate_limiter(&self) -> &Arc<CallerRateLimiter> {
        &self.limiter
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    #[tool(
        description = "Read one window of a build's console log by byte offset. Returns: text, start_offset, end_offset and has_more. Offsets always refer to the raw log, so pass end_offset as the next start to continue. Required: job. Optional: build (number or \"last\"), start, max_bytes, filter_regex, redact (default true)."
    )]
    async fn fetch_log(
        &self,
        peer: Peer<RoleServer>,
        params: Parameters<FetchLogRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond(&peer, ToolCall::FetchLog(params.0)).await
    }

    #[tool(
        description = "Summarize the end of a build log. Returns: error and warning counts, top repeated error lines, the innermost pipeline stage that failed, and the last lines. Required: job. Optional: build, max_bytes, tail_lines."
    )]
    async fn summarize_log(
        &self,
        peer: Peer<RoleServer>,
        params: Parameters<SummarizeLogRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond(&peer, ToolCall::SummarizeLog(params.0)).await
    }

    #[tool(
        description = "Run a build-tool analyzer (maven, gradle, npm) over a build log. Returns: the analyzer used, findings with severity, kind, file and line, plus tool metrics. Required: job. Optional: build, analyzer (auto-detected when omitted), max_bytes."
    )]
    async fn analyze_log(
        &self,
        peer: Peer<RoleServer>,
        params: Parameters<AnalyzeLogRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond(&peer, ToolCall::AnalyzeLog(params.0)).await
    }

    #[tool(
        description = "Explain why a build failed. Returns: root-cause hypotheses ranked by confidence with evidence, commits whose changed files match the failure, and concrete next actions. Required: job. Optional: build, max_bytes."
    )]
    async fn triage_failure(
        &self,
        peer: Peer<RoleServer>,
        params: Parameters<TriageFailureRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond(&peer, ToolCall::TriageFailure(params.0)).await
    }

    #[tool(
        description = "Compare two builds of the same job. Returns: result change, duration delta, per-stage status and duration changes, newly failing stages, and optionally error/warning count deltas. Required: job, base, head. Optional: include_logs."
    )]
    async fn compare_builds(
        &self,
        peer: Peer<RoleServer>,
        params: Parameters<CompareBuildsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond(&peer, ToolCall::CompareBuilds(params.0)).await
    }

    #[tool(
        description = "Score tests by how often they flip between pass and fail across the most recent builds of a job. Returns: flaky tests sorted by score, tests that regressed, and tests with too few observations. Required: job. Optional: window_size."
    )]
    async fn detect_flaky_tests(
        &self,
        peer: Peer<RoleServer>,
        params: Parameters<DetectFlakyTestsRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond(&peer, ToolCall::DetectFlakyTests(params.0)).await
    }

    #[tool(
        description = "Search a build log for a regex. Returns: matching line numbers with surrounding context lines. Required: job, pattern. Optional: build, window_lines (default 5), max_bytes."
    )]
    async fn search_log(
        &self,
        peer: Peer<RoleServer>,
        params: Parameters<SearchLogRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond(&peer, ToolCall::SearchLog(params.0)).await
    }

    #[tool(
        description = "Report server health: uptime, per-tool call and error counts, cache hit rate and rate limiter state."
    )]
    async fn server_stats(
        &self,
        peer: Peer<RoleServer>,
        _params: Parameters<EmptyRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.respond(&peer, ToolCall::ServerStats).await
    }
}

impl LogTriageServer {
    async fn respond(
        &self,
        peer: &Peer<RoleServer>,
        call: ToolCall,
    ) -> Result<CallToolResult, McpError> {
        let envelope = self.call(&caller_of(peer), call).await?;
        let text = serde_json::to_string_pretty(&envelope).map_err(|e| {
            let correlation_id = envelope["correlation_id"].as_str().unwrap_or_default();
            internal_error(format!("failed to encode response: {}", e), correlation_id)
        })?;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    /// Run one tool call on behalf of `caller`.
    ///
    /// Order: rate limit, argument validation, cache lookup, pipeline. The
    /// returned envelope carries `correlation_id`, `took_ms` and `cached`
    /// next to the tool's `result`.
    pub async fn call(&self, caller: &str, call: ToolCall) -> Result<Value, McpError> {
        let correlation_id = Uuid::new_v4().to_string();
        let tool = call.name();
        let span = info_span!("tool_call", tool, correlation_id = %correlation_id, caller);

        async {
            let started = Instant::now();
            match self.run(caller, &call).await {
                Ok((computed, cached)) => {
                    let took = started.elapsed();
                    let outcome = if cached {
                        CallOutcome::Cached
                    } else {
                        CallOutcome::Ok
                    };
                    self.stats.record(tool, outcome, took);
                    info!("{} completed in {}ms (cached: {})", tool, took.as_millis(), cached);

                    let mut envelope = json!({
                        "correlation_id": correlation_id,
                        "took_ms": took.as_millis() as u64,
                        "cached": cached,
                        "result": computed.result,
                    });
                    if let Some(build) = computed.build {
                        envelope["build"] = json!(build);
                    }
                    Ok(envelope)
                }
                Err(Failure::Triage(err)) => {
                    let outcome = match err {
                        TriageError::RateLimited { .. } => CallOutcome::RateLimited,
                        _ => CallOutcome::Failed,
                    };
                    self.stats.record(tool, outcome, started.elapsed());
                    warn!("{} failed ({}): {}", tool, err.kind(), err);
                    Err(to_mcp_error(&err, &correlation_id))
                }
                Err(Failure::Encode(err)) => {
                    self.stats.record(tool, CallOutcome::Failed, started.elapsed());
                    warn!("{} produced an unencodable result: {}", tool, err);
                    Err(internal_error(
                        format!("failed to encode {} result: {}", tool, err),
                        &correlation_id,
                    ))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, caller: &str, call: &ToolCall) -> Result<(Computed, bool), Failure> {
        self.limiter.check(caller)?;
        call.validate()?;

        let cache_arguments = call.cache_arguments();
        if let Some(arguments) = &cache_arguments {
            if let Some(hit) = self.cache.get(call.name(), arguments) {
                let build = serde_json::from_value(hit["build"].clone()).ok();
                return Ok((
                    Computed {
                        build,
                        result: hit["result"].clone(),
                    },
                    true,
                ));
            }
        }

        let computed = self.execute(call).await?;
        if let Some(arguments) = &cache_arguments {
            self.cache.put(
                call.name(),
                arguments,
                json!({ "build": computed.build, "result": computed.result }),
            );
        }
        Ok((computed, false))
    }

    async fn resolve(&self, job: &str, build: &BuildSpec) -> Result<BuildRef, TriageError> {
        self.service.resolve_build(job, build.selector()?).await
    }

    async fn execute(&self, call: &ToolCall) -> Result<Computed, Failure> {
        let (build, result) = match call {
            ToolCall::FetchLog(r) => {
                let build = self.resolve(&r.job, &r.build).await?;
                let window = self
                    .service
                    .fetch_log(
                        &build,
                        r.start,
                        r.max_bytes,
                        r.filter_regex.as_deref(),
                        r.redact,
                    )
                    .await?;
                (Some(build), window_json(&window))
            }
            ToolCall::SummarizeLog(r) => {
                let build = self.resolve(&r.job, &r.build).await?;
                let summary = self
                    .service
                    .summarize_log(&build, r.max_bytes, r.tail_lines)
                    .await?;
                (Some(build), serde_json::to_value(summary)?)
            }
            ToolCall::AnalyzeLog(r) => {
                let build = self.resolve(&r.job, &r.build).await?;
                let outcome = self
                    .service
                    .analyze_log(&build, r.analyzer.as_deref(), r.max_bytes)
                    .await?;
                (Some(build), serde_json::to_value(outcome)?)
            }
            ToolCall::TriageFailure(r) => {
                let build = self.resolve(&r.job, &r.build).await?;
                let report = self.service.triage_failure(&build, r.max_bytes).await?;
                (Some(build), serde_json::to_value(report)?)
            }
            ToolCall::CompareBuilds(r) => {
                let comparison = self
                    .service
                    .compare_builds(&r.job, r.base, r.head, r.include_logs)
                    .await?;
                (None, serde_json::to_value(comparison)?)
            }
            ToolCall::DetectFlakyTests(r) => {
                let report = self
                    .service
                    .detect_flaky_tests(&r.job, r.window_size)
                    .await?;
                (None, serde_json::to_value(report)?)
            }
            ToolCall::SearchLog(r) => {
                let build = self.resolve(&r.job, &r.build).await?;
                let matches = self
                    .service
                    .search_log(
                        &build,
                        &r.pattern,
                        r.window_lines.unwrap_or(DEFAULT_WINDOW_LINES),
                        r.max_bytes,
                    )
                    .await?;
                let result = json!({
                    "pattern": r.pattern,
                    "match_count": matches.len(),
                    "matches": matches,
                });
                (Some(build), result)
            }
            ToolCall::ServerStats => (None, self.stats_json()),
        };
        Ok(Computed { build, result })
    }

    fn stats_json(&self) -> Value {
        let cache = self.cache.stats();
        json!({
            "uptime_secs": self.stats.uptime().as_secs(),
            "tools": self.stats.snapshot(),
            "cache": {
                "enabled": cache.enabled,
                "hits": cache.hits,
                "misses": cache.misses,
                "evictions": cache.evictions,
                "expirations": cache.expirations,
                "entries": cache.entries,
                "max_entries": cache.max_entries,
                "ttl_secs": self.cache.ttl().as_secs(),
                "hit_rate": cache.hit_rate(),
            },
            "rate_limit": {
                "enabled": self.limiter.is_enabled(),
                "per_minute": self.limiter.per_minute(),
                "burst": self.limiter.burst(),
                "tracked_callers": self.limiter.tracked_callers(),
            },
        })
    }
}

fn window_json(window: &LogWindow) -> Value {
    json!({
        "start_offset": window.start_offset,
        "end_offset": window.end_offset,
        "has_more": window.has_more,
        "bytes": window.data.len(),
        "text": window.text(),
    })
}

/// Rate-limit key for the connected client.
fn caller_of(peer: &Peer<RoleServer>) -> String {
    peer.peer_info()
        .map(|info| info.client_info.name.trim().to_string())
        .filter(|name| !name.is_empty())
        .map(|name| format!("client:{}", name))
        .unwrap_or_else(|| ANONYMOUS_CALLER.to_string())
}

#[tool_handler]
impl ServerHandler for LogTriageServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_spec_accepts_numbers_and_last() {
        let spec: BuildSpec = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(spec.selector().unwrap(), BuildSelector::Number(42));

        let spec: BuildSpec = serde_json::from_value(json!("last")).unwrap();
        assert_eq!(spec.selector().unwrap(), BuildSelector::Last);

        let spec: BuildSpec = serde_json::from_value(json!("17")).unwrap();
        assert_eq!(spec.pinned(), Some(17));

        assert!(BuildSpec::Label("latest-ish".into()).selector().is_err());
        assert!(BuildSpec::Number(0).selector().is_err());
    }

    #[test]
    fn omitted_build_means_last() {
        let request: SummarizeLogRequest = serde_json::from_value(json!({"job": "app"})).unwrap();
        assert_eq!(request.build, BuildSpec::default());
        assert_eq!(request.build.selector().unwrap(), BuildSelector::Last);

        let request: FetchLogRequest = serde_json::from_value(json!({"job": "app"})).unwrap();
        assert!(request.redact);
        assert_eq!(request.start, 0);
    }

    #[test]
    fn only_pinned_builds_are_cacheable() {
        let pinned = ToolCall::SummarizeLog(SummarizeLogRequest {
            job: "app".into(),
            build: BuildSpec::Label("7".into()),
            max_bytes: None,
            tail_lines: None,
        });
        assert_eq!(pinned.cache_arguments().unwrap()["build"], 7);

        let last = ToolCall::SummarizeLog(SummarizeLogRequest {
            job: "app".into(),
            build: BuildSpec::default(),
            max_bytes: None,
            tail_lines: None,
        });
        assert!(last.cache_arguments().is_none());

        let fetch = ToolCall::FetchLog(FetchLogRequest {
            job: "app".into(),
            build: BuildSpec::Number(7),
            start: 0,
            max_bytes: None,
            filter_regex: None,
            redact: true,
        });
        assert!(fetch.cache_arguments().is_none());
        assert!(ToolCall::ServerStats.cache_arguments().is_none());
    }

    #[test]
    fn validation_rejects_bad_arguments() {
        let bad_regex = ToolCall::SearchLog(SearchLogRequest {
            job: "app".into(),
            build: BuildSpec::Number(1),
            pattern: "(unclosed".into(),
            window_lines: None,
            max_bytes: None,
        });
        assert_eq!(bad_regex.validate().unwrap_err().kind(), "invalid_argument");

        let zero_bytes = ToolCall::TriageFailure(TriageFailureRequest {
            job: "app".into(),
            build: BuildSpec::Number(1),
            max_bytes: Some(0),
        });
        assert!(zero_bytes.validate().is_err());

        let unknown_analyzer = ToolCall::AnalyzeLog(AnalyzeLogRequest {
            job: "app".into(),
            build: BuildSpec::Number(1),
            analyzer: Some("ant".into()),
            max_bytes: None,
        });
        assert!(unknown_analyzer.validate().is_err());

        let bad_job = ToolCall::DetectFlakyTests(DetectFlakyTestsRequest {
            job: "team//app".into(),
            window_size: None,
        });
        assert!(bad_job.validate().is_err());
    }
}
