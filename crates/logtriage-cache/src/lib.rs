//! Response cache keyed by a SHA-256 fingerprint of tool name and arguments.

pub mod cache;
pub mod fingerprint;

pub use cache::{CacheStats, ResponseCache};
pub use fingerprint::{canonical_json, fingerprint};
