use logtriage_core::TriageError;
use rmcp::model::ErrorCode;
use rmcp::ErrorData as McpError;
use serde_json::json;

pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const NOT_FOUND: i32 = -32003;
pub const RATE_LIMITED: i32 = -32005;
pub const UPSTREAM_UNAVAILABLE: i32 = -32006;
pub const TIMEOUT: i32 = -32007;

pub fn error_code(err: &TriageError) -> i32 {
    match err {
        TriageError::InvalidArgument(_) => INVALID_PARAMS,
        TriageError::NotFound { .. } => NOT_FOUND,
        TriageError::RateLimited { .. } => RATE_LIMITED,
        TriageError::UpstreamUnavailable { .. } => UPSTREAM_UNAVAILABLE,
        TriageError::Timeout { .. } => TIMEOUT,
    }
}

/// JSON-RPC error for a failed tool call.
///
/// `data` always carries the correlation id and a remediation hint;
/// rate-limit rejections add `retry_after_ms`, upstream failures the HTTP
/// status when one was observed.
pub fn to_mcp_error(err: &TriageError, correlation_id: &str) -> McpError {
    let mut data = json!({
        "correlation_id": correlation_id,
        "kind": err.kind(),
        "hint": err.hint(),
    });
    match err {
        TriageError::RateLimited { retry_after, .. } => {
            data["retry_after_ms"] = json!(retry_after.as_millis() as u64);
        }
        TriageError::UpstreamUnavailable {
            status: Some(status),
            ..
        } => {
            data["status"] = json!(status);
        }
        _ => {}
    }

    McpError {
        code: ErrorCode(error_code(err)),
        message: err.to_string().into(),
        data: Some(data),
    }
}

/// Failure that has no place in the taxonomy, e.g. a result that would not
/// serialize.
pub fn internal_error(message: impl Into<String>, correlation_id: &str) -> McpError {
    let message: String = message.into();
    McpError {
        code: ErrorCode(INTERNAL_ERROR),
        message: message.into(),
        data: Some(json!({ "correlation_id": correlation_id })),
    }
}
