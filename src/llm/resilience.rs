//! Rate limiting and retry policy for LLM calls.
//!
//! [`ResilientLlm`] wraps any [`LlmProvider`] with the client policy the
//! pipelines rely on: a shared inter-request limiter capping requests per
//! minute, and a bounded exponential-backoff retry budget that only retries
//! failures classified as transient. Configuration errors (missing API key,
//! rejected credentials) pass through untouched.

use super::{CompletionOptions, LlmProvider};
use crate::config::LlmConfig;
use crate::{Error, Result};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Minimum-interval request limiter.
///
/// Serializes callers so that consecutive requests are at least
/// `60s / rpm` apart, which caps throughput at `rpm` requests per minute
/// while also guaranteeing the per-call spacing the extractor batch mode
/// requires.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter for the given requests-per-minute budget.
    #[must_use]
    pub fn per_minute(rpm: u32) -> Self {
        Self {
            min_interval: Duration::from_secs_f64(60.0 / f64::from(rpm.max(1))),
            last_request: Mutex::new(None),
        }
    }

    /// Creates a limiter with an explicit minimum interval.
    #[must_use]
    pub const fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Blocks until the next request is allowed, then records it.
    pub fn acquire(&self) {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

/// Bounded retry policy with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per call, first try included.
    pub max_attempts: u32,
    /// Base delay; attempt `n` sleeps `base * 2^(n-1)`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Builds the policy from the LLM client configuration.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: Duration::from_secs_f64(config.retry_base_seconds.max(0.0)),
        }
    }

    /// Runs `call` up to the attempt budget, backing off between retryable
    /// failures. Non-retryable errors short-circuit.
    ///
    /// # Errors
    ///
    /// Returns the final error once the budget is exhausted or a
    /// non-retryable error occurs.
    pub fn run<T, F>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "retrying after transient failure"
                    );
                    std::thread::sleep(delay);
                },
                Err(err) => return Err(err),
            }
        }
    }
}

/// LLM provider wrapper enforcing the rate limit and retry policy.
pub struct ResilientLlm {
    inner: Arc<dyn LlmProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl ResilientLlm {
    /// Wraps a provider with the given limiter and retry policy.
    #[must_use]
    pub fn new(inner: Arc<dyn LlmProvider>, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            inner,
            limiter,
            retry,
        }
    }

    /// Wraps a provider with policy derived from configuration. The limiter
    /// is created fresh; use [`ResilientLlm::new`] to share one across
    /// clients.
    #[must_use]
    pub fn from_config(inner: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        Self::new(
            inner,
            Arc::new(RateLimiter::per_minute(config.rate_limit_rpm)),
            RetryPolicy::from_config(config),
        )
    }
}

impl LlmProvider for ResilientLlm {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn complete_with_options(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        self.retry.run("llm_complete", || {
            self.limiter.acquire();
            self.inner.complete_with_options(system, user, options)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyLlm {
        calls: AtomicU32,
        fail_first: u32,
        error: fn() -> Error,
    }

    impl LlmProvider for FlakyLlm {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn complete_with_options(
            &self,
            _system: &str,
            _user: &str,
            _options: &CompletionOptions,
        ) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err((self.error)())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn wrap(inner: FlakyLlm) -> (Arc<FlakyLlm>, ResilientLlm) {
        let inner = Arc::new(inner);
        let resilient = ResilientLlm::new(
            Arc::clone(&inner) as Arc<dyn LlmProvider>,
            Arc::new(RateLimiter::with_interval(Duration::ZERO)),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
        );
        (inner, resilient)
    }

    #[test]
    fn transient_failures_are_retried_within_budget() {
        let (inner, resilient) = wrap(FlakyLlm {
            calls: AtomicU32::new(0),
            fail_first: 2,
            error: || Error::transient("test", "503"),
        });
        assert_eq!(resilient.complete("", "q").expect("recovers"), "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn budget_exhaustion_surfaces_the_error() {
        let (inner, resilient) = wrap(FlakyLlm {
            calls: AtomicU32::new(0),
            fail_first: 10,
            error: || Error::transient("test", "503"),
        });
        assert!(resilient.complete("", "q").is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn configuration_errors_are_never_retried() {
        let (inner, resilient) = wrap(FlakyLlm {
            calls: AtomicU32::new(0),
            fail_first: 10,
            error: || Error::Configuration("no key".to_string()),
        });
        let err = resilient.complete("", "q").expect_err("fails fast");
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn limiter_enforces_spacing() {
        let limiter = RateLimiter::with_interval(Duration::from_millis(20));
        let start = Instant::now();
        limiter.acquire();
        limiter.acquire();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
