use std::time::Duration;
use thiserror::Error;

/// Failure taxonomy shared by every stage of the pipeline.
///
/// Each variant carries the context (build reference, pipeline stage) needed
/// to act on the error without re-running with verbose logging.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TriageError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Upstream unavailable while trying to {context}: {message}")]
    UpstreamUnavailable {
        context: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Timed out after {}ms while trying to {context}", .after.as_millis())]
    Timeout { context: String, after: Duration },

    #[error("Rate limit exceeded for {caller}, retry after {}ms", .retry_after.as_millis())]
    RateLimited {
        caller: String,
        retry_after: Duration,
    },
}

impl TriageError {
    pub fn invalid(message: impl Into<String>) -> Self {
        TriageError::InvalidArgument(message.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        TriageError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn upstream(context: impl Into<String>, message: impl Into<String>) -> Self {
        TriageError::UpstreamUnavailable {
            context: context.into(),
            status: None,
            message: message.into(),
        }
    }

    pub fn upstream_status(
        context: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        TriageError::UpstreamUnavailable {
            context: context.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn timeout(context: impl Into<String>, after: Duration) -> Self {
        TriageError::Timeout {
            context: context.into(),
            after,
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            TriageError::InvalidArgument(_) => "invalid_argument",
            TriageError::NotFound { .. } => "not_found",
            TriageError::UpstreamUnavailable { .. } => "upstream_unavailable",
            TriageError::Timeout { .. } => "timeout",
            TriageError::RateLimited { .. } => "rate_limited",
        }
    }

    /// Remediation hint surfaced to callers alongside the message.
    pub fn hint(&self) -> &'static str {
        match self {
            TriageError::InvalidArgument(_) => "One or more parameters are invalid",
            TriageError::NotFound { .. } => "Job or build does not exist, or the path is incorrect",
            TriageError::UpstreamUnavailable { status: Some(401), .. } => {
                "Check that JENKINS_USER and JENKINS_API_TOKEN are correct"
            }
            TriageError::UpstreamUnavailable { status: Some(403), .. } => {
                "The configured Jenkins user lacks permission for this resource"
            }
            TriageError::UpstreamUnavailable { .. } => "Jenkins returned an error or is unreachable",
            TriageError::Timeout { .. } => "Jenkins did not answer in time; retry or raise JENKINS_TIMEOUT",
            TriageError::RateLimited { .. } => "Too many requests, wait before retrying",
        }
    }

    /// Prefix the error context with the pipeline stage that observed it.
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            TriageError::UpstreamUnavailable {
                context,
                status,
                message,
            } => TriageError::UpstreamUnavailable {
                context: format!("{stage}: {context}"),
                status,
                message,
            },
            TriageError::Timeout { context, after } => TriageError::Timeout {
                context: format!("{stage}: {context}"),
                after,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = TriageError::upstream_status("fetch log for app #3", 502, "bad gateway");
        assert_eq!(
            err.to_string(),
            "Upstream unavailable while trying to fetch log for app #3: bad gateway"
        );

        let err = TriageError::timeout("read metadata for app #3", Duration::from_millis(1500));
        assert!(err.to_string().contains("1500ms"));
    }

    #[test]
    fn in_stage_only_touches_upstream_errors() {
        let err = TriageError::upstream("fetch log", "boom").in_stage("triage");
        assert!(err.to_string().contains("triage: fetch log"));

        let err = TriageError::invalid("bad regex").in_stage("triage");
        assert_eq!(err, TriageError::invalid("bad regex"));
    }

    #[test]
    fn auth_failures_get_credential_hint() {
        let err = TriageError::upstream_status("get build", 401, "unauthorized");
        assert!(err.hint().contains("JENKINS_API_TOKEN"));
        assert_eq!(err.kind(), "upstream_unavailable");
    }
}
