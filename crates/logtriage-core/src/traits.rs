use crate::{BuildMetadata, BuildRef, Result, ScmChange, TestRecord};
use async_trait::async_trait;

/// Raw answer of a log source for one read starting at some offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawLogChunk {
    /// Bytes from the requested offset onwards, possibly everything remaining.
    pub data: Vec<u8>,
    /// Total size of the log known to the source at read time.
    pub text_size: u64,
    /// Source reports the build is still producing output.
    pub more_data: bool,
}

#[async_trait]
pub trait LogSource: Send + Sync {
    async fn read_log(&self, build: &BuildRef, start: u64) -> Result<RawLogChunk>;

    async fn log_length(&self, build: &BuildRef) -> Result<u64> {
        let chunk = self.read_log(build, 0).await?;
        Ok(chunk.text_size.max(chunk.data.len() as u64))
    }
}

#[async_trait]
pub trait BuildSource: Send + Sync {
    async fn build_metadata(&self, build: &BuildRef) -> Result<BuildMetadata>;

    /// Changes in this build; empty when the build has no SCM data.
    async fn scm_changes(&self, build: &BuildRef) -> Result<Vec<ScmChange>>;

    /// Test results of this build; empty when no test report was published.
    async fn test_records(&self, build: &BuildRef) -> Result<Vec<TestRecord>>;

    /// Up to `limit` most recent build numbers of `job`, newest first.
    async fn recent_builds(&self, job: &str, limit: usize) -> Result<Vec<u32>>;

    async fn last_build_number(&self, job: &str) -> Result<u32>;
}
