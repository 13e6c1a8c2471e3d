//! Per-source token-bucket rate limiting with deadline-aware acquisition.
//!
//! Wraps [`tooling::rate_limit::RateLimiter`] (which already implements the
//! token bucket itself) with a registry keyed by [`Source`] and a
//! cancellable `acquire_before` that respects a node's remaining budget
//! instead of blocking forever.

use std::time::Duration;

use tooling::rate_limit::RateLimiter;

use crate::domain::Source;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limiter deadline exceeded for source {0:?}")]
    DeadlineExceeded(Source),
}

/// Registry of one limiter per source, built from configured RPS values.
pub struct SourceRateLimiters {
    pubs: RateLimiter,
    trials: RateLimiter,
    rag: RateLimiter,
}

impl SourceRateLimiters {
    /// `burst` is the bucket capacity; `rps` tokens refill per second. The
    /// spec leaves exact burst sizes per source unspecified beyond "3-8
    /// tokens"; defaults below sit at the low end for pubs/trials (narrower,
    /// more rate-sensitive upstreams) and the high end for rag (an internal
    /// store, cheaper to burst against).
    pub fn new(pubs_rps: f64, trials_rps: f64, rag_rps: f64) -> Self {
        Self {
            pubs: RateLimiter::new(3, Duration::from_secs_f64(3.0 / pubs_rps.max(0.001))),
            trials: RateLimiter::new(3, Duration::from_secs_f64(3.0 / trials_rps.max(0.001))),
            rag: RateLimiter::new(8, Duration::from_secs_f64(8.0 / rag_rps.max(0.001))),
        }
    }

    fn limiter(&self, source: Source) -> &RateLimiter {
        match source {
            Source::Publications => &self.pubs,
            Source::Trials => &self.trials,
            Source::Rag => &self.rag,
        }
    }

    /// Non-blocking check: does `source` have a token available right now?
    pub async fn check(&self, source: Source) -> bool {
        self.limiter(source).check().await
    }

    /// Block until a token is available, but never past `deadline` from now.
    /// A pending acquisition that would exceed the caller's deadline is
    /// cancelled and reported rather than silently over-running the node's
    /// budget.
    pub async fn acquire_before(
        &self,
        source: Source,
        deadline: Duration,
    ) -> Result<(), RateLimitError> {
        tokio::time::timeout(deadline, self.limiter(source).acquire())
            .await
            .map_err(|_| RateLimitError::DeadlineExceeded(source))
    }
}
