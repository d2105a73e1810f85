use logtriage_core::{BuildRef, LogSource, LogWindow, Result, TriageError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Byte-offset log reader over a [`LogSource`].
///
/// Each call is a single round trip bounded by a timeout. Callers drive the
/// cursor themselves through [`LogWindow::end_offset`]; nothing is held
/// between calls.
#[derive(Clone)]
pub struct LogFetcher {
    source: Arc<dyn LogSource>,
    timeout: Duration,
}

impl LogFetcher {
    pub fn new(source: Arc<dyn LogSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn fetch(&self, build: &BuildRef, start: u64, max_bytes: u64) -> Result<LogWindow> {
        self.fetch_within(build, start, max_bytes, self.timeout).await
    }

    /// Like [`fetch`](Self::fetch) with a caller-supplied round-trip bound.
    pub async fn fetch_within(
        &self,
        build: &BuildRef,
        start: u64,
        max_bytes: u64,
        timeout: Duration,
    ) -> Result<LogWindow> {
        if max_bytes == 0 {
            return Err(TriageError::invalid("max_bytes must be greater than zero"));
        }

        let chunk = bounded(
            timeout,
            format!("fetch log for {}", build),
            self.source.read_log(build, start),
        )
        .await?;

        // Jenkins rewinds a start past the end to 0 and resends the whole log.
        if start >= chunk.text_size {
            debug!("Offset {} at or past end of log for {}", start, build);
            return Ok(LogWindow::empty_at(start));
        }

        let available = chunk.data.len() as u64;
        let take = available.min(max_bytes);
        let truncated = available > max_bytes;
        let mut data = chunk.data;
        data.truncate(take as usize);

        let window = LogWindow {
            start_offset: start,
            end_offset: start + take,
            has_more: truncated || chunk.more_data || start + take < chunk.text_size,
            data,
        };
        debug!(
            "Fetched {} bytes of {} [{}..{}), has_more={}",
            take, build, window.start_offset, window.end_offset, window.has_more
        );
        Ok(window)
    }

    /// The last `max_bytes` bytes of the log.
    pub async fn fetch_tail(&self, build: &BuildRef, max_bytes: u64) -> Result<LogWindow> {
        if max_bytes == 0 {
            return Err(TriageError::invalid("max_bytes must be greater than zero"));
        }
        let length = bounded(
            self.timeout,
            format!("read log length for {}", build),
            self.source.log_length(build),
        )
        .await?;
        let start = length.saturating_sub(max_bytes);
        self.fetch(build, start, max_bytes).await
    }
}

async fn bounded<T>(
    timeout: Duration,
    context: String,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(TriageError::timeout(context, timeout)),
    }
}
