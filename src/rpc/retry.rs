//! Retry middleware
//!
//! Re-runs the remainder of the chain (tracing, auth-gate and handler) until
//! it succeeds or the attempt budget is spent. The retry marker it patches
//! into the context has `can_retry = false`, so any retry middleware deeper
//! in the same call degenerates to a single pass-through.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::Span;

use super::context::{Context, ContextPatch, RetryState};
use super::middleware::{Middleware, Next, ProcedureResult};
use crate::config::RetrySettings;
use crate::error::ApiError;

/// Delay schedule between attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Delay before the second attempt; zero disables waiting
    pub initial_delay: Duration,

    /// Maximum delay between attempts (caps exponential growth)
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (typically 2.0)
    pub multiplier: f64,

    /// Whether to add jitter to delays
    pub use_jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::none()
    }
}

impl Backoff {
    /// Retry immediately
    pub fn none() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            use_jitter: false,
        }
    }

    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            use_jitter: true,
        }
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Delay to wait after the given failed attempt (0-indexed)
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let delay_ms = self.initial_delay.as_millis() as f64
            * self.multiplier.powi(failed_attempt as i32);

        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        if delay_ms <= 0.0 {
            return Duration::ZERO;
        }

        // Jitter adds a random value between 0 and delay
        let delay_ms = if self.use_jitter {
            delay_ms + rand::thread_rng().gen_range(0.0..delay_ms)
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms as u64)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("retry policy needs at least one attempt")]
pub struct InvalidRetryPolicy;

/// Attempt budget and error classification, fixed per procedure base
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    retry_deterministic_errors: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Result<Self, InvalidRetryPolicy> {
        if max_attempts == 0 {
            return Err(InvalidRetryPolicy);
        }
        Ok(Self {
            max_attempts,
            backoff: Backoff::none(),
            retry_deterministic_errors: false,
        })
    }

    pub fn from_settings(settings: &RetrySettings) -> Result<Self, InvalidRetryPolicy> {
        let backoff = if settings.initial_delay_ms == 0 {
            Backoff::none()
        } else {
            Backoff::exponential(
                Duration::from_millis(settings.initial_delay_ms),
                Duration::from_millis(settings.max_delay_ms.max(settings.initial_delay_ms)),
            )
            .with_jitter(settings.jitter)
        };

        Ok(Self::new(settings.max_attempts)?
            .with_backoff(backoff)
            .retry_deterministic_errors(settings.retry_deterministic_errors))
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Also retry unauthorized, validation and not-found failures
    pub fn retry_deterministic_errors(mut self, enabled: bool) -> Self {
        self.retry_deterministic_errors = enabled;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn should_retry(&self, err: &ApiError) -> bool {
        self.retry_deterministic_errors || err.is_retryable()
    }
}

pub struct RetryMiddleware {
    policy: RetryPolicy,
}

impl RetryMiddleware {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn call(&self, ctx: Context, next: Next<'_>) -> ProcedureResult {
        // Already inside a retry loop
        if !ctx.can_retry() {
            return next.run(ctx).await;
        }

        let max_attempts = self.policy.max_attempts;
        let span = Span::current();
        span.record("retry.max_attempts", max_attempts);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let is_retry = attempt > 1;

            span.record("retry.attempt", attempt);
            span.record("retry.is_retry", is_retry);

            let patch = ContextPatch::retry(RetryState {
                attempt,
                max_attempts,
                can_retry: false,
                is_retry,
            });

            let err = match next.run_with(&ctx, patch).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.policy.should_retry(&err) {
                tracing::debug!(
                    event = "retry.nonRetryable",
                    attempt,
                    code = err.code(),
                    error = %err,
                    "Failure is not retryable"
                );
                return Err(err);
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    event = "retry.exhausted",
                    total_attempts = attempt,
                    error = %err,
                    "Retry attempts exhausted"
                );
                return Err(err);
            }

            tracing::warn!(
                event = "retry.attemptFailed",
                attempt,
                error = %err,
                remaining_attempts = max_attempts - attempt,
                "Procedure attempt failed"
            );

            let delay = self.policy.backoff.delay_for(attempt - 1);
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }
}
