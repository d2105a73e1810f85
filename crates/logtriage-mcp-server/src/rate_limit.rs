//! Per-caller token buckets consulted before any tool runs.

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use logtriage_core::{RateLimitConfig, Result, TriageError};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Keyed token bucket over caller identities.
///
/// A disabled limiter admits everything and tracks nobody.
pub struct CallerRateLimiter {
    limiter: Option<DefaultKeyedRateLimiter<String>>,
    per_minute: u32,
    burst: u32,
}

impl CallerRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let per_minute = NonZeroU32::new(config.per_minute)
            .ok_or_else(|| TriageError::invalid("rate_limit.per_minute must be positive"))?;
        let burst = NonZeroU32::new(config.burst)
            .ok_or_else(|| TriageError::invalid("rate_limit.burst must be positive"))?;
        let quota = Quota::per_minute(per_minute).allow_burst(burst);

        Ok(Self {
            limiter: Some(RateLimiter::keyed(quota)),
            per_minute: per_minute.get(),
            burst: burst.get(),
        })
    }

    pub fn disabled() -> Self {
        Self {
            limiter: None,
            per_minute: 0,
            burst: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    pub fn per_minute(&self) -> u32 {
        self.per_minute
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Take one token for `caller`, or report when the next one frees up.
    pub fn check(&self, caller: &str) -> Result<()> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        match limiter.check_key(&caller.to_string()) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let retry_after = not_until.wait_time_from(DefaultClock::default().now());
                warn!(
                    "Rate limit exceeded for {}, retry after {}ms",
                    caller,
                    retry_after.as_millis()
                );
                Err(TriageError::RateLimited {
                    caller: caller.to_string(),
                    retry_after,
                })
            }
        }
    }

    /// Drop buckets that have refilled completely.
    pub fn sweep(&self) {
        if let Some(limiter) = &self.limiter {
            let before = limiter.len();
            limiter.retain_recent();
            limiter.shrink_to_fit();
            debug!("Rate limiter sweep: {} -> {} callers", before, limiter.len());
        }
    }

    pub fn tracked_callers(&self) -> usize {
        self.limiter.as_ref().map(|l| l.len()).unwrap_or(0)
    }

    /// Periodic sweep on the current runtime. `None` when disabled.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> Option<JoinHandle<()>> {
        if !self.is_enabled() || every.is_zero() {
            return None;
        }
        let limiter = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        }))
    }
}

impl std::fmt::Debug for CallerRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallerRateLimiter")
            .field("enabled", &self.is_enabled())
            .field("per_minute", &self.per_minute)
            .field("burst", &self.burst)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(per_minute: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            per_minute,
            burst,
            sweep_interval_secs: 60,
        }
    }

    #[test]
    fn burst_is_exhausted_then_rejected() {
        let limiter = CallerRateLimiter::new(&config(1, 3)).unwrap();
        for _ in 0..3 {
            limiter.check("client:a").unwrap();
        }
        match limiter.check("client:a").unwrap_err() {
            TriageError::RateLimited {
                caller,
                retry_after,
            } => {
                assert_eq!(caller, "client:a");
                assert!(retry_after > Duration::ZERO);
                assert!(retry_after <= Duration::from_secs(60));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[test]
    fn callers_have_independent_buckets() {
        let limiter = CallerRateLimiter::new(&config(1, 1)).unwrap();
        limiter.check("client:a").unwrap();
        assert!(limiter.check("client:a").is_err());
        limiter.check("client:b").unwrap();
        assert_eq!(limiter.tracked_callers(), 2);
    }

    #[test]
    fn disabled_limiter_admits_everything() {
        let limiter = CallerRateLimiter::new(&RateLimitConfig {
            enabled: false,
            ..config(1, 1)
        })
        .unwrap();
        for _ in 0..100 {
            limiter.check("client:a").unwrap();
        }
        assert_eq!(limiter.tracked_callers(), 0);
        assert!(!limiter.is_enabled());
    }

    #[test]
    fn zero_quota_is_invalid() {
        let err = CallerRateLimiter::new(&config(0, 1)).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }
}
