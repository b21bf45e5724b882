//! Circuit breaker guarding calls to a potentially failing dependency.
//!
//! Three states:
//! - **Closed**: calls pass through; consecutive failures are counted and
//!   `failure_threshold` of them trip the breaker
//! - **Open**: calls are rejected without running until `reset_timeout` has
//!   elapsed since the last failure, then one probe is let through
//! - **HalfOpen**: calls pass through as probes; any failure reopens the
//!   breaker, [`REQUIRED_HALF_OPEN_SUCCESSES`] consecutive successes close it
//!
//! State only changes inside [`CircuitBreaker::execute`] (and the explicit
//! operator [`CircuitBreaker::reset`]).

use super::lock;
use super::retry::Retryable;
use crate::core_types::Failure;
use crate::logging::{log_debug, log_info, log_warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Consecutive half-open successes needed to close the breaker.
pub const REQUIRED_HALF_OPEN_SUCCESSES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,
    /// Cool-down before a probe is allowed
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing, blocking requests
    HalfOpen, // Testing if service recovered
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Rejected without running the operation
    #[error("Circuit breaker is open for {name}")]
    CircuitOpen { name: String },

    /// The operation ran and failed
    #[error("{0}")]
    Operation(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(error) => Some(error),
            Self::CircuitOpen { .. } => None,
        }
    }
}

impl<E: Retryable> Retryable for CircuitBreakerError<E> {
    /// Never retry into an open breaker.
    fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitOpen { .. } => false,
            Self::Operation(error) => error.is_retryable(),
        }
    }
}

impl<E: Into<Failure>> From<CircuitBreakerError<E>> for Failure {
    fn from(err: CircuitBreakerError<E>) -> Self {
        match err {
            CircuitBreakerError::CircuitOpen { name } => Failure::circuit_open(&name),
            CircuitBreakerError::Operation(error) => error.into(),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for one logical endpoint
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        log_debug!(
            circuit_breaker = %name,
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis(),
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get current circuit breaker state. Never transitions.
    pub fn state(&self) -> CircuitState {
        lock(&self.inner).state
    }

    pub fn failure_count(&self) -> u32 {
        lock(&self.inner).failure_count
    }

    /// Run `operation` if the breaker allows it and record the outcome.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.should_allow_request() {
            log_debug!(circuit_breaker = %self.name, "Circuit breaker rejected call");
            return Err(CircuitBreakerError::CircuitOpen {
                name: self.name.clone(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(CircuitBreakerError::Operation(error))
            }
        }
    }

    /// Force the breaker closed and clear its counters.
    pub fn reset(&self) {
        let mut inner = lock(&self.inner);
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure_time = None;
        log_warn!(circuit_breaker = %self.name, "Circuit breaker manually reset");
    }

    fn should_allow_request(&self) -> bool {
        let mut inner = lock(&self.inner);
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure_time
                    .map_or(true, |t| t.elapsed() >= self.config.reset_timeout);
                if cooled_down {
                    log_info!(
                        circuit_breaker = %self.name,
                        "Circuit breaker half-open, probing dependency"
                    );
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                }
                cooled_down
            }
        }
    }

    fn record_success(&self) {
        let mut inner = lock(&self.inner);
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= REQUIRED_HALF_OPEN_SUCCESSES {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    log_info!(
                        circuit_breaker = %self.name,
                        "Circuit breaker recovered, returning to closed state"
                    );
                }
            }
            // A call admitted before the breaker tripped; it proves nothing
            // about the current cool-down.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = lock(&self.inner);
        inner.last_failure_time = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    log_warn!(
                        circuit_breaker = %self.name,
                        failure_count = inner.failure_count,
                        failure_threshold = self.config.failure_threshold,
                        reset_timeout_ms = self.config.reset_timeout.as_millis(),
                        "Circuit breaker opened due to repeated failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                log_warn!(
                    circuit_breaker = %self.name,
                    "Circuit breaker probe failed, reopening"
                );
            }
            CircuitState::Open => inner.failure_count += 1,
        }
    }
}
