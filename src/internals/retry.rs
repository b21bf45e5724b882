//! Retry logic with exponential backoff and jitter
//!
//! - Exponential backoff: `retry_delay × backoff_multiplier^attempt`
//! - Up to 10% uniform jitter on top of every delay
//! - Pluggable retry predicate, defaulting to [`Retryable`]
//! - Side-effect-only observers for retries and exhaustion
//!
//! Total attempts are `max_retries + 1`.

use crate::core_types::{Failure, FailureOrigin};
use crate::enhanced::EnhancedError;
use crate::logging::{log_debug, log_error};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay before the first retry
    pub retry_delay: Duration,
    /// Maximum delay between retries, jitter included
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the zero-based `attempt`, without jitter.
    ///
    /// Saturates at `max_delay`; an overflowing, negative or NaN product
    /// also yields `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let seconds = self.retry_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        Duration::try_from_secs_f64(seconds)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay for exponential backoff with jitter, in
    /// `[base_delay, 1.1 × base_delay)` and never above `max_delay`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);

        // Add jitter to prevent thundering herd
        let jitter = fastrand::f64() * 0.1; // Up to 10% jitter
        Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Default retry predicate.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for Failure {
    /// Network failures (no response), 5xx, 408 and 429. Aborted and
    /// circuit-open failures are never retried.
    fn is_retryable(&self) -> bool {
        if self.origin() != FailureOrigin::Operation {
            return false;
        }
        match self.status_code() {
            None => true,
            Some(status) => status >= 500 || status == 408 || status == 429,
        }
    }
}

impl Retryable for EnhancedError {
    fn is_retryable(&self) -> bool {
        EnhancedError::is_retryable(self)
    }
}

pub type RetryCondition<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
/// Called with `(error, retry_number, max_retries)` just before a retry.
pub type RetryObserver<E> = Arc<dyn Fn(&E, u32, u32) + Send + Sync>;
/// Called with `(last_error, max_retries)` once every attempt failed.
pub type ExhaustionObserver<E> = Arc<dyn Fn(&E, u32) + Send + Sync>;

/// Retry executor that handles exponential backoff
pub struct RetryExecutor<E> {
    policy: RetryPolicy,
    retry_condition: RetryCondition<E>,
    on_retry: Option<RetryObserver<E>>,
    on_max_retries_reached: Option<ExhaustionObserver<E>>,
}

impl<E> Clone for RetryExecutor<E> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            retry_condition: Arc::clone(&self.retry_condition),
            on_retry: self.on_retry.clone(),
            on_max_retries_reached: self.on_max_retries_reached.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryExecutor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("on_retry", &self.on_retry.is_some())
            .field("on_max_retries_reached", &self.on_max_retries_reached.is_some())
            .finish()
    }
}

impl<E: Retryable + 'static> Default for RetryExecutor<E> {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl<E: Retryable + 'static> RetryExecutor<E> {
    /// Create a new retry executor that retries whatever [`Retryable`] allows
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_condition(policy, |error: &E| error.is_retryable())
    }
}

impl<E> RetryExecutor<E> {
    /// Create a retry executor with a custom retry predicate
    pub fn with_condition<C>(policy: RetryPolicy, condition: C) -> Self
    where
        C: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            policy,
            retry_condition: Arc::new(condition),
            on_retry: None,
            on_max_retries_reached: None,
        }
    }

    pub fn retry_if<C>(mut self, condition: C) -> Self
    where
        C: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_condition = Arc::new(condition);
        self
    }

    pub fn on_retry<O>(mut self, observer: O) -> Self
    where
        O: Fn(&E, u32, u32) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    pub fn on_max_retries_reached<O>(mut self, observer: O) -> Self
    where
        O: Fn(&E, u32) + Send + Sync + 'static,
    {
        self.on_max_retries_reached = Some(Arc::new(observer));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, the predicate refuses a retry, or
    /// `max_retries` retries have failed. Returns the last error.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_retries = self.policy.max_retries;
        let mut attempt: u32 = 0;

        loop {
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        log_debug!(
                            attempt = attempt + 1,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if attempt >= max_retries {
                log_error!(
                    attempts = attempt + 1,
                    max_retries = max_retries,
                    "Operation failed after all retry attempts"
                );
                if let Some(observer) = &self.on_max_retries_reached {
                    observer(&error, max_retries);
                }
                return Err(error);
            }

            if !(self.retry_condition)(&error) {
                log_debug!(
                    attempt = attempt + 1,
                    "Operation failed with non-retryable error"
                );
                return Err(error);
            }

            let delay = self.policy.calculate_delay(attempt);
            log_debug!(
                attempt = attempt + 1,
                max_retries = max_retries,
                delay_ms = delay.as_millis(),
                "Operation failed, retrying after delay"
            );
            sleep(delay).await;

            attempt += 1;
            if let Some(observer) = &self.on_retry {
                observer(&error, attempt, max_retries);
            }
        }
    }
}

/// An operation bundled with its retry executor; see [`with_retry`].
pub struct Retrying<F, E> {
    operation: F,
    executor: RetryExecutor<E>,
}

/// Wrap `operation` so every [`Retrying::call`] retries per `executor`.
///
/// The wrapped call takes the same argument and yields the same result as
/// `operation`; multiple arguments are passed as a tuple.
pub fn with_retry<F, E>(operation: F, executor: RetryExecutor<E>) -> Retrying<F, E> {
    Retrying {
        operation,
        executor,
    }
}

impl<F, E> Retrying<F, E> {
    pub async fn call<A, Fut, T>(&self, args: A) -> Result<T, E>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.executor
            .execute(|| (self.operation)(args.clone()))
            .await
    }

    pub fn executor(&self) -> &RetryExecutor<E> {
        &self.executor
    }
}
