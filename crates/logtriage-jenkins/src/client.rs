use crate::urls::{build_url, job_url, parse_base};
use crate::wire::{BuildInfo, JobBuilds, PipelineDescription, TestReport};
use async_trait::async_trait;
use logtriage_core::{
    BuildMetadata, BuildRef, BuildSource, JenkinsConfig, LogSource, RawLogChunk, Result,
    ScmChange, TestRecord, TriageError,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const TEXT_SIZE_HEADER: &str = "X-Text-Size";
const MORE_DATA_HEADER: &str = "X-More-Data";
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Jenkins REST client backing both [`LogSource`] and [`BuildSource`].
#[derive(Debug)]
pub struct JenkinsClient {
    http: Client,
    base: Url,
    user: Option<String>,
    token: Option<SecretString>,
    timeout: Duration,
}

impl JenkinsClient {
    pub fn from_config(config: &JenkinsConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(TriageError::invalid(
                "Jenkins URL is not configured; set JENKINS_URL or jenkins.url",
            ));
        }
        let base = parse_base(&config.url)?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("logtriage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TriageError::upstream("create HTTP client", e.to_string()))?;

        if config.user.is_some() != config.api_token.is_some() {
            warn!("Jenkins user and API token should be set together; requests may be rejected");
        }

        Ok(Self {
            http,
            base,
            user: config.user.clone(),
            token: config.api_token.clone().map(SecretString::from),
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let request = self.http.get(url);
        match &self.user {
            Some(user) => {
                request.basic_auth(user, self.token.as_ref().map(|t| t.expose_secret()))
            }
            None => request,
        }
    }

    /// Bound a whole round trip, body included.
    async fn within<T, F>(&self, context: &str, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(TriageError::timeout(context, self.timeout)),
        }
    }

    async fn send(&self, context: &str, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(context, e, self.timeout))?;
        debug!("{} -> {}", context, response.status());
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(map_status(context, status, &body))
    }

    async fn get_json<T: DeserializeOwned>(&self, context: &str, url: Url) -> Result<T> {
        self.within(context, async {
            let response = self.send(context, self.get(url)).await?;
            response
                .json::<T>()
                .await
                .map_err(|e| TriageError::upstream(context, format!("malformed response: {}", e)))
        })
        .await
    }

    /// Like `get_json`, but a 404 means "nothing published" rather than an error.
    async fn get_optional_json<T: DeserializeOwned>(
        &self,
        context: &str,
        url: Url,
    ) -> Result<Option<T>> {
        match self.get_json(context, url).await {
            Ok(value) => Ok(Some(value)),
            Err(TriageError::NotFound { .. }) => {
                debug!("{}: not published", context);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn job_builds(&self, job: &str, tree: &str) -> Result<JobBuilds> {
        let mut url = job_url(&self.base, job, &["api", "json"])?;
        url.query_pairs_mut().append_pair("tree", tree);
        self.get_json(&format!("list builds of {}", job), url).await
    }
}

#[async_trait]
impl LogSource for JenkinsClient {
    async fn read_log(&self, build: &BuildRef, start: u64) -> Result<RawLogChunk> {
        let url = build_url(&self.base, build, &["logText", "progressiveText"])?;
        let context = format!("fetch log for {}", build);
        let request = self.get(url).query(&[("start", start)]);

        self.within(&context, async {
            let response = self.send(&context, request).await?;
            let text_size = header_value(&response, TEXT_SIZE_HEADER)
                .and_then(|v| v.parse::<u64>().ok());
            let more_data = header_value(&response, MORE_DATA_HEADER)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false);
            let data = response
                .bytes()
                .await
                .map_err(|e| transport_error(&context, e, self.timeout))?
                .to_vec();

            let text_size = text_size.unwrap_or_else(|| {
                warn!("{}: missing {} header, using body length", context, TEXT_SIZE_HEADER);
                start + data.len() as u64
            });
            Ok(RawLogChunk {
                data,
                text_size,
                more_data,
            })
        })
        .await
    }

    /// Reads `X-Text-Size` and drops the body unread.
    async fn log_length(&self, build: &BuildRef) -> Result<u64> {
        let url = build_url(&self.base, build, &["logText", "progressiveText"])?;
        let context = format!("read log length for {}", build);
        let request = self.get(url).query(&[("start", 0u64)]);

        self.within(&context, async {
            let response = self.send(&context, request).await?;
            if let Some(size) =
                header_value(&response, TEXT_SIZE_HEADER).and_then(|v| v.parse::<u64>().ok())
            {
                return Ok(size);
            }
            warn!("{}: missing {} header, reading body", context, TEXT_SIZE_HEADER);
            let body = response
                .bytes()
                .await
                .map_err(|e| transport_error(&context, e, self.timeout))?;
            Ok(body.len() as u64)
        })
        .await
    }
}

#[async_trait]
impl BuildSource for JenkinsClient {
    async fn build_metadata(&self, build: &BuildRef) -> Result<BuildMetadata> {
        let info_url = build_url(&self.base, build, &["api", "json"])?;
        let stages_url = build_url(&self.base, build, &["wfapi", "describe"])?;
        let info_context = format!("read build {}", build);
        let stages_context = format!("read stages of {}", build);

        let (info, stages) = futures::try_join!(
            self.get_json::<BuildInfo>(&info_context, info_url),
            self.get_optional_json::<PipelineDescription>(&stages_context, stages_url)
        )
        .map_err(|e| not_found_as_build(e, build))?;

        Ok(info.into_metadata(&build.job, stages))
    }

    async fn scm_changes(&self, build: &BuildRef) -> Result<Vec<ScmChange>> {
        let url = build_url(&self.base, build, &["api", "json"])?;
        let info: BuildInfo = self
            .get_json(&format!("read changes of {}", build), url)
            .await
            .map_err(|e| not_found_as_build(e, build))?;
        Ok(info.scm_changes())
    }

    async fn test_records(&self, build: &BuildRef) -> Result<Vec<TestRecord>> {
        let url = build_url(&self.base, build, &["testReport", "api", "json"])?;
        let report: Option<TestReport> = self
            .get_optional_json(&format!("read test report of {}", build), url)
            .await?;
        Ok(report
            .map(|r| r.into_records(build.number))
            .unwrap_or_default())
    }

    async fn recent_builds(&self, job: &str, limit: usize) -> Result<Vec<u32>> {
        let tree = format!("builds[number]{{0,{}}}", limit);
        let builds = self
            .job_builds(job, &tree)
            .await
            .map_err(|e| not_found_as_job(e, job))?;
        let mut numbers: Vec<u32> = builds.builds.iter().map(|b| b.number).collect();
        numbers.sort_unstable_by(|a, b| b.cmp(a));
        numbers.truncate(limit);
        Ok(numbers)
    }

    async fn last_build_number(&self, job: &str) -> Result<u32> {
        let builds = self
            .job_builds(job, "lastBuild[number]")
            .await
            .map_err(|e| not_found_as_job(e, job))?;
        builds
            .last_build
            .map(|b| b.number)
            .ok_or_else(|| TriageError::not_found(format!("last build of job '{}'", job)))
    }
}

fn header_value<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

/// 404 maps to `NotFound`; every other failure status is an upstream error
/// that keeps its status code.
pub fn map_status(context: &str, status: StatusCode, body: &str) -> TriageError {
    if status == StatusCode::NOT_FOUND {
        return TriageError::not_found(context.to_string());
    }
    let excerpt: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    let message = if excerpt.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    } else {
        excerpt
    };
    TriageError::upstream_status(context, status.as_u16(), message)
}

fn transport_error(context: &str, err: reqwest::Error, timeout: Duration) -> TriageError {
    if err.is_timeout() {
        TriageError::timeout(context, timeout)
    } else {
        TriageError::upstream(context, err.to_string())
    }
}

fn not_found_as_build(err: TriageError, build: &BuildRef) -> TriageError {
    match err {
        TriageError::NotFound { .. } => TriageError::not_found(format!("build {}", build)),
        other => other,
    }
}

fn not_found_as_job(err: TriageError, job: &str) -> TriageError {
    match err {
        TriageError::NotFound { .. } => TriageError::not_found(format!("job '{}'", job)),
        other => other,
    }
}
