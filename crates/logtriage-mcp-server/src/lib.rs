// ABOUTME: MCP tool server for Jenkins build log triage over stdio
// ABOUTME: Thin runtime layer wiring the triage pipeline to rate limiting, caching and rmcp

pub mod errors;
pub mod official_server;
pub mod rate_limit;
pub mod stats;

pub use errors::{error_code, to_mcp_error};
pub use official_server::*;
pub use rate_limit::CallerRateLimiter;
pub use stats::{CallOutcome, ServerStats, ToolCounters};
