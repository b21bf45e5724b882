use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{ResilienceError, ResilienceResult};
use crate::loading::{LoadingOptions, OrchestratorConfig};
use crate::logging::log_debug;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Settings for the [`ErrorHandler`](crate::handler::ErrorHandler).
///
/// `environment` and `version` tag every outgoing error report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlerConfig {
    pub environment: String,
    pub version: String,
    /// Where reportable errors are POSTed. `None` disables HTTP reporting.
    pub reporting_endpoint: Option<String>,
    pub enable_reporting: bool,
    /// Upper bound on the in-memory error history.
    pub max_history: usize,
}

impl Default for ErrorHandlerConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            reporting_endpoint: None,
            enable_reporting: true,
            max_history: 100,
        }
    }
}

impl ErrorHandlerConfig {
    /// Validate handler configuration
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::ConfigurationError`] if:
    /// - `max_history` is zero
    /// - `reporting_endpoint` is set but is not an http(s) URL
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.max_history == 0 {
            return Err(ResilienceError::configuration_error(
                "Error history must hold at least one entry",
            ));
        }

        if let Some(endpoint) = &self.reporting_endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ResilienceError::configuration_error(format!(
                    "Reporting endpoint must be an http(s) URL: {endpoint}"
                )));
            }
        }

        Ok(())
    }
}

/// Aggregate configuration for the composition root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub error_handler: ErrorHandlerConfig,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    pub loading: LoadingOptions,
    pub orchestrator: OrchestratorConfig,
}

impl ResilienceConfig {
    /// Parse and validate a JSON configuration document. Missing sections
    /// take their defaults.
    pub fn from_json_str(json: &str) -> ResilienceResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            ResilienceError::configuration_error(format!("Invalid configuration JSON: {e}"))
        })?;
        config.validate()?;

        log_debug!(
            environment = %config.error_handler.environment,
            max_retries = config.retry.max_retries,
            failure_threshold = config.circuit_breaker.failure_threshold,
            "Resilience configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> ResilienceResult<()> {
        self.error_handler.validate().map_err(|e| {
            ResilienceError::configuration_error(format!("Error handler validation failed: {e}"))
        })?;

        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(ResilienceError::configuration_error(format!(
                "Retry backoff multiplier must be a finite number of at least 1.0, got {}",
                self.retry.backoff_multiplier
            )));
        }

        if self.retry.max_delay < self.retry.retry_delay {
            return Err(ResilienceError::configuration_error(
                "Retry max delay must not be shorter than the base retry delay",
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ResilienceError::configuration_error(
                "Circuit breaker failure threshold must be at least 1",
            ));
        }

        if self.loading.timeout.is_zero() {
            return Err(ResilienceError::configuration_error(
                "Loading timeout must be greater than zero",
            ));
        }

        if self.orchestrator.history_capacity == 0 {
            return Err(ResilienceError::configuration_error(
                "Operation history must hold at least one entry",
            ));
        }

        Ok(())
    }
}
