//! # resilient-ops
//!
//! Client-side resilience and async-operation orchestration.
//!
//! ## Key Features
//!
//! - **Error Taxonomy**: Deterministic classification of raw failures into a closed set of kinds
//! - **Enhanced Errors**: Structured records with severity, category, context and stable IDs
//! - **Retry**: Bounded exponential backoff with jitter and pluggable predicates
//! - **Circuit Breaking**: Closed/Open/HalfOpen guard around failing dependencies
//! - **Loading Orchestration**: Named operations with timeouts, cooperative cancellation,
//!   batching, and bounded history
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use resilient_ops::{
//!     ErrorHandler, ErrorHandlerConfig, Failure, LoadingOptions, LoadingOrchestrator,
//!     OrchestratorConfig,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let handler = Arc::new(ErrorHandler::new(ErrorHandlerConfig::default()));
//! let loading = LoadingOrchestrator::new(handler, OrchestratorConfig::default());
//!
//! let accounts = loading
//!     .with_enhanced_loading("accounts", "Loading accounts", LoadingOptions::default(), |ctx| async move {
//!         if ctx.is_cancelled() {
//!             return Err(Failure::aborted("accounts request cancelled"));
//!         }
//!         Ok::<_, Failure>(vec!["checking", "savings"])
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

// Allow missing errors documentation - errors are self-documenting via type signatures
#![allow(clippy::missing_errors_doc)]

pub mod core_types;

// Logging utilities (re-exports tracing with log_* naming) - internal only
pub(crate) mod logging;

mod internals;

pub mod classifier;
pub mod config;
pub mod enhanced;
pub mod error;
pub mod handler;
pub mod loading;
pub mod reporting;
pub mod toast;

pub use internals::{circuit_breaker, retry};

#[cfg(test)]
pub mod tests;

// Re-export main types
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use classifier::ErrorClassifier;
pub use config::{ErrorHandlerConfig, ResilienceConfig};
pub use core_types::{
    ErrorCategory, ErrorContext, ErrorKind, ErrorSeverity, Failure, FailureOrigin,
    TransportResponse,
};
pub use enhanced::{EnhanceOptions, EnhancedError, IntoEnhanced};
pub use error::{ResilienceError, ResilienceResult};
pub use handler::{ErrorHandler, ErrorStats, ListenerId};
pub use loading::{
    BatchOperation, BatchOptions, BatchOutcome, CancellationToken, LoadingEvent, LoadingOptions,
    LoadingOrchestrator, OperationContext, OperationStats, OrchestratorConfig,
};
pub use reporting::{ErrorReport, ErrorReporter, HttpErrorReporter};
pub use retry::{with_retry, RetryExecutor, RetryPolicy, Retryable};
pub use toast::{error_toast_listener, ToastOptions, ToastSink};
