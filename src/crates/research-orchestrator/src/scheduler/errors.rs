//! Error taxonomy, retry strategy table, and backoff computation.
//!
//! Every caught exception is classified by pattern-matching over its message
//! into one of eight kinds. Classification is total: anything that doesn't
//! match a known pattern falls into [`ErrorKind::Unknown`] rather than
//! failing to classify.

use std::time::Duration;

use crate::domain::ErrorKind;

/// What to do once an error's retries (if any) are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackAction {
    SkipNode,
    ExponentialBackoff,
    UseEmptyResult,
    RelaxValidation,
    SwitchToCacheOnly,
    ReduceBatchSizeAndRetryOnce,
}

impl FallbackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackAction::SkipNode => "skip_node",
            FallbackAction::ExponentialBackoff => "exponential_backoff",
            FallbackAction::UseEmptyResult => "use_empty_result",
            FallbackAction::RelaxValidation => "relax_validation",
            FallbackAction::SwitchToCacheOnly => "switch_to_cache_only",
            FallbackAction::ReduceBatchSizeAndRetryOnce => "reduce_batch_size_and_retry_once",
        }
    }
}

/// How backoff delay is computed between attempts of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Multiply the node's remaining per-attempt timeout by `factor` each retry.
    ExtendTimeout { factor_tenths: u32 },
    /// Fixed-step linear backoff: `step_ms * attempt`.
    Linear { step_ms: u64 },
    /// `min(base * 2^attempt, cap) + uniform(0.1, 0.3) * delay` jitter.
    ExponentialJitter,
    /// One immediate retry, no delay.
    Immediate,
}

/// The full retry policy for one error kind.
#[derive(Debug, Clone, Copy)]
pub struct RetryPlan {
    pub retryable: bool,
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub fallback: FallbackAction,
}

/// Static policy table, one retry plan per error kind.
pub fn retry_plan(kind: ErrorKind) -> RetryPlan {
    match kind {
        ErrorKind::Timeout => RetryPlan {
            retryable: true,
            max_attempts: 3,
            backoff: Backoff::ExtendTimeout { factor_tenths: 15 },
            fallback: FallbackAction::SkipNode,
        },
        ErrorKind::Connection => RetryPlan {
            retryable: true,
            max_attempts: 2,
            backoff: Backoff::Linear { step_ms: 500 },
            fallback: FallbackAction::SkipNode,
        },
        ErrorKind::RateLimit => RetryPlan {
            retryable: true,
            max_attempts: 3,
            backoff: Backoff::ExponentialJitter,
            fallback: FallbackAction::ExponentialBackoff,
        },
        ErrorKind::Parse => RetryPlan {
            retryable: false,
            max_attempts: 0,
            backoff: Backoff::Immediate,
            fallback: FallbackAction::UseEmptyResult,
        },
        ErrorKind::Validation => RetryPlan {
            retryable: true,
            max_attempts: 1,
            backoff: Backoff::Immediate,
            fallback: FallbackAction::RelaxValidation,
        },
        ErrorKind::DatabaseOrStore => RetryPlan {
            retryable: true,
            max_attempts: 2,
            backoff: Backoff::Linear { step_ms: 1000 },
            fallback: FallbackAction::SwitchToCacheOnly,
        },
        ErrorKind::Resource => RetryPlan {
            retryable: false,
            max_attempts: 0,
            backoff: Backoff::Immediate,
            fallback: FallbackAction::ReduceBatchSizeAndRetryOnce,
        },
        ErrorKind::Unknown => RetryPlan {
            retryable: true,
            max_attempts: 1,
            backoff: Backoff::Immediate,
            fallback: FallbackAction::SkipNode,
        },
    }
}

/// Compute the delay before `attempt` (1-based) given a backoff strategy and
/// the node's initial per-attempt timeout (used by `ExtendTimeout`, which
/// grows the *timeout*, not a sleep, so it returns zero delay there — the
/// caller reads the grown timeout from [`extended_timeout`] instead).
pub fn backoff_delay(backoff: Backoff, attempt: u32) -> Duration {
    match backoff {
        Backoff::ExtendTimeout { .. } => Duration::ZERO,
        Backoff::Linear { step_ms } => Duration::from_millis(step_ms * attempt as u64),
        Backoff::ExponentialJitter => exponential_jitter_delay(attempt),
        Backoff::Immediate => Duration::ZERO,
    }
}

/// `delay = min(base * 2^attempt, 60s) + uniform(0.1, 0.3) * delay` jitter.
fn exponential_jitter_delay(attempt: u32) -> Duration {
    let base_ms = 200u64;
    let cap_ms = 60_000u64;
    let raw = (base_ms as f64 * 2f64.powi(attempt as i32)).min(cap_ms as f64);
    let jitter_fraction = 0.1 + rand::random::<f64>() * 0.2;
    let delay_ms = raw + raw * jitter_fraction;
    Duration::from_millis(delay_ms as u64)
}

/// The node's next per-attempt timeout under `ExtendTimeout` backoff.
pub fn extended_timeout(base: Duration, backoff: Backoff, attempt: u32) -> Duration {
    match backoff {
        Backoff::ExtendTimeout { factor_tenths } => {
            let factor = factor_tenths as f64 / 10.0;
            let millis = base.as_millis() as f64 * factor.powi(attempt as i32);
            Duration::from_millis(millis as u64)
        }
        _ => base,
    }
}

/// Classify an error message into one of the eight kinds. Total: anything
/// unmatched is [`ErrorKind::Unknown`].
pub fn classify(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();

    if lower.contains("rate limit") || lower.contains("too many requests") || lower.contains("429")
    {
        return ErrorKind::RateLimit;
    }
    if lower.contains("timeout") || lower.contains("timed out") || lower.contains("deadline exceeded")
    {
        return ErrorKind::Timeout;
    }
    if lower.contains("connection")
        || lower.contains("network")
        || lower.contains("dns")
        || lower.contains("503")
        || lower.contains("service unavailable")
        || lower.contains("502")
        || lower.contains("bad gateway")
    {
        return ErrorKind::Connection;
    }
    if lower.contains("out of memory") || lower.contains("oom") || lower.contains("resource exhausted")
    {
        return ErrorKind::Resource;
    }
    if lower.contains("parse") || lower.contains("malformed") || lower.contains("unexpected token") {
        return ErrorKind::Parse;
    }
    if lower.contains("validation") || lower.contains("invalid field") || lower.contains("schema") {
        return ErrorKind::Validation;
    }
    if lower.contains("database")
        || lower.contains("store")
        || lower.contains("sqlite")
        || lower.contains("sql")
    {
        return ErrorKind::DatabaseOrStore;
    }
    ErrorKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_total() {
        let samples = [
            "429 Too Many Requests",
            "operation timed out",
            "connection refused",
            "Resource exhausted: OOM killed",
            "failed to parse JSON: unexpected token",
            "validation failed: missing field",
            "sqlite: database is locked",
            "a completely novel failure mode",
        ];
        for s in samples {
            // classify() always returns a variant; nothing panics or is skipped.
            let _ = classify(s);
        }
    }

    #[test]
    fn rate_limit_and_timeout_are_distinct() {
        assert_eq!(classify("429 rate limit exceeded"), ErrorKind::RateLimit);
        assert_eq!(classify("request timed out after 5s"), ErrorKind::Timeout);
    }

    #[test]
    fn parse_and_resource_are_not_retryable() {
        assert!(!retry_plan(ErrorKind::Parse).retryable);
        assert!(!retry_plan(ErrorKind::Resource).retryable);
    }

    #[test]
    fn exponential_jitter_grows_and_caps() {
        let d0 = backoff_delay(Backoff::ExponentialJitter, 0);
        let d5 = backoff_delay(Backoff::ExponentialJitter, 5);
        assert!(d5 >= d0);
        let d_huge = backoff_delay(Backoff::ExponentialJitter, 30);
        assert!(d_huge.as_millis() <= 60_000 * 2);
    }

    #[test]
    fn extended_timeout_grows_by_factor_per_attempt() {
        let base = Duration::from_millis(1000);
        let backoff = Backoff::ExtendTimeout { factor_tenths: 15 };
        let t1 = extended_timeout(base, backoff, 1);
        let t2 = extended_timeout(base, backoff, 2);
        assert!(t1.as_millis() > base.as_millis());
        assert!(t2.as_millis() > t1.as_millis());
    }

    #[test]
    fn unknown_kind_allows_exactly_one_retry() {
        let plan = retry_plan(ErrorKind::Unknown);
        assert!(plan.retryable);
        assert_eq!(plan.max_attempts, 1);
    }
}
