//! Retry engine: bounded retries with exponential backoff and jitter.
//!
//! Mirrors the teacher SDK's `retry_with_backoff` shape but adds
//! cancellation (a [`tokio_util::sync::CancellationToken`]), retryability
//! sourced from [`Error::retryable`] rather than a hardcoded match, and an
//! [`Outcome`] that reports attempts/timing back to the orchestrator.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorCode};

/// Configuration for retry behavior (C3).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Result of a full retry execution, successful or not.
#[derive(Debug)]
pub struct Outcome<T> {
    pub success: bool,
    pub attempts: u32,
    pub first_error: Option<Error>,
    pub last_error: Option<Error>,
    pub total_time: Duration,
    pub value: Option<T>,
}

/// Execute `f` with bounded retries. Only errors with `retryable == true`
/// are retried; a non-retryable error (including cancellation) returns
/// immediately. Cancellation during a backoff sleep returns a
/// `UserCancel`-coded error without counting as an attempt.
pub async fn execute<F, Fut, T>(config: &RetryConfig, cancel: &CancellationToken, mut f: F) -> Outcome<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    execute_with_callback(config, cancel, &mut f, |_, _| {}).await
}

/// Like [`execute`], but `on_failure(attempt, &error)` is invoked after
/// every failed attempt (including the final, non-retried one), before any
/// sleep. Useful for circuit-breaker bookkeeping and structured logging.
pub async fn execute_with_callback<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    f: &mut F,
    mut on_failure: impl FnMut(u32, &Error),
) -> Outcome<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let start = Instant::now();
    let mut first_error: Option<Error> = None;
    let mut last_error: Option<Error> = None;
    let mut delay = config.initial_delay;
    let max_attempts = config.max_attempts.max(1);
    let mut attempts_made = 0u32;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Outcome {
                success: false,
                attempts: attempts_made,
                first_error,
                last_error: Some(Error::new(ErrorCode::UserCancel, "operation cancelled")),
                total_time: start.elapsed(),
                value: None,
            };
        }

        match f().await {
            Ok(value) => {
                return Outcome {
                    success: true,
                    attempts: attempt,
                    first_error,
                    last_error: None,
                    total_time: start.elapsed(),
                    value: Some(value),
                };
            }
            Err(err) => {
                attempts_made = attempt;
                on_failure(attempt, &err);
                if first_error.is_none() {
                    first_error = Some(err.clone_shallow());
                }
                let retryable = err.retryable;
                last_error = Some(err);

                if !retryable || attempt >= max_attempts {
                    break;
                }

                let sleep_for = apply_jitter(delay.min(config.max_delay), config.jitter);
                tokio::select! {
                    _ = sleep(sleep_for) => {}
                    _ = cancel.cancelled() => {
                        return Outcome {
                            success: false,
                            attempts: attempts_made,
                            first_error,
                            last_error: Some(Error::new(ErrorCode::UserCancel, "operation cancelled during backoff")),
                            total_time: start.elapsed(),
                            value: None,
                        };
                    }
                }

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_factor).min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }

    Outcome {
        success: false,
        attempts: attempts_made,
        first_error,
        last_error,
        total_time: start.elapsed(),
        value: None,
    }
}

/// Scale `delay` by an independent uniform draw in `[0.75, 1.25]` when
/// jitter is enabled. Each call draws fresh randomness — the source
/// implementation alternated sign by attempt number, which produced
/// regular oscillation; this draws independently per attempt instead,
/// per the spec's resolved open question.
fn apply_jitter(delay: Duration, jitter: bool) -> Duration {
    if !jitter {
        return delay;
    }
    let factor = 0.75 + rand::random::<f64>() * 0.5;
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

impl Error {
    /// Clone used internally by the retry engine to keep both
    /// `first_error` and `last_error` without fighting the borrow checker
    /// over a single owned `Error`. Recurses down the cause chain since
    /// `Error` itself deliberately doesn't derive `Clone` (cloning an
    /// arbitrary error chain isn't meaningful outside this bookkeeping).
    fn clone_shallow(&self) -> Error {
        Error {
            code: self.code,
            message: self.message.clone(),
            details: self.details.clone(),
            retryable: self.retryable,
            user_facing: self.user_facing,
            context: self.context.clone(),
            stack: self.stack.clone(),
            cause: self.cause.as_deref().map(|c| Box::new(c.clone_shallow())),
        }
    }
}
