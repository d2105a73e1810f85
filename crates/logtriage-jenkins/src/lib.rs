//! Jenkins REST collaborator: progressive console text, build metadata,
//! pipeline stage timings, SCM change sets and test reports.

pub mod client;
pub mod urls;
pub mod wire;

pub use client::{map_status, JenkinsClient};
pub use urls::{build_url, job_url, parse_base};
