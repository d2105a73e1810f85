use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Counters for one tool.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ToolCounters {
    pub calls: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub rate_limited: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Ok,
    Cached,
    Failed,
    RateLimited,
}

/// Per-tool call accounting since process start.
#[derive(Debug)]
pub struct ServerStats {
    started_at: Instant,
    tools: Mutex<BTreeMap<&'static str, ToolCounters>>,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            tools: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn record(&self, tool: &'static str, outcome: CallOutcome, elapsed: Duration) {
        let mut tools = self.tools.lock();
        let counters = tools.entry(tool).or_default();
        counters.calls += 1;
        counters.total_ms += elapsed.as_millis() as u64;
        match outcome {
            CallOutcome::Ok => {}
            CallOutcome::Cached => counters.cache_hits += 1,
            CallOutcome::Failed => counters.errors += 1,
            CallOutcome::RateLimited => {
                counters.errors += 1;
                counters.rate_limited += 1;
            }
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, ToolCounters> {
        self.tools.lock().clone()
    }

    pub fn tool(&self, tool: &str) -> ToolCounters {
        self.tools.lock().get(tool).cloned().unwrap_or_default()
    }
}
