//! Error types for resilient operations.
//!
//! [`ResilienceError`] is what orchestrated operations return to their
//! callers:
//! - `Failed` carries the [`EnhancedError`] produced when a terminal failure
//!   was routed through the [`ErrorHandler`](crate::handler::ErrorHandler)
//! - `Cancelled` signals cooperative cancellation, which is never retried
//!   and never reported
//! - `ConfigurationError` covers invalid settings
//!
//! # Error Handling Example
//!
//! ```rust,no_run
//! use resilient_ops::ResilienceError;
//!
//! fn describe(err: &ResilienceError) -> String {
//!     match err {
//!         ResilienceError::Failed(enhanced) => enhanced.user_message().to_string(),
//!         ResilienceError::Cancelled { operation } => format!("{operation} was cancelled"),
//!         ResilienceError::ConfigurationError { message } => message.clone(),
//!     }
//! }
//! ```

use crate::core_types::Failure;
use crate::enhanced::{EnhanceOptions, EnhancedError, IntoEnhanced};
use crate::logging::{log_debug, log_error};
use thiserror::Error;

/// Convenient result type for resilient operations.
pub type ResilienceResult<T> = std::result::Result<T, ResilienceError>;

/// Errors returned by the orchestration layer.
#[derive(Error, Debug, Clone)]
pub enum ResilienceError {
    /// A terminal failure, already classified, logged, and (if reportable)
    /// reported.
    #[error("Operation failed: {0}")]
    Failed(Box<EnhancedError>),

    /// The operation was cancelled before it settled.
    #[error("Operation cancelled: {operation}")]
    Cancelled {
        /// Key of the cancelled operation.
        operation: String,
    },

    /// Configuration is invalid or incomplete.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },
}

impl ResilienceError {
    /// Whether this is a cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The enhanced record behind a terminal failure.
    pub fn enhanced(&self) -> Option<&EnhancedError> {
        match self {
            Self::Failed(enhanced) => Some(enhanced),
            _ => None,
        }
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Failed(enhanced) => enhanced.user_message().to_string(),
            Self::Cancelled { .. } => "The operation was cancelled".to_string(),
            Self::ConfigurationError { .. } => {
                "The application is misconfigured. Please contact support".to_string()
            }
        }
    }

    // =========================================================================
    // Constructor methods with automatic logging
    // =========================================================================

    pub fn failed(enhanced: EnhancedError) -> Self {
        Self::Failed(Box::new(enhanced))
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        log_debug!(
            error_type = "cancelled",
            operation = %operation,
            "Operation cancelled"
        );
        Self::Cancelled { operation }
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "configuration_error",
            message = %message,
            "Resilience configuration validation failed"
        );
        Self::ConfigurationError { message }
    }
}

impl From<EnhancedError> for ResilienceError {
    fn from(enhanced: EnhancedError) -> Self {
        Self::failed(enhanced)
    }
}

impl IntoEnhanced for ResilienceError {
    fn into_enhanced(self, options: EnhanceOptions) -> EnhancedError {
        match self {
            Self::Failed(enhanced) => *enhanced,
            Self::Cancelled { operation } => {
                Failure::aborted(format!("Operation cancelled: {operation}")).into_enhanced(options)
            }
            Self::ConfigurationError { message } => Failure::new(message)
                .with_name("ConfigurationError")
                .into_enhanced(options),
        }
    }
}
