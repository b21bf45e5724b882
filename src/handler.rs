//! Global error coordination.
//!
//! The [`ErrorHandler`] is the single place that decides what happens to a
//! terminal failure: it enhances the failure, logs it at a level matching its
//! severity, records it in a bounded history, forwards reportable errors to
//! the reporting sink, and fans out to registered listeners.
//!
//! The handler is an ordinary value owned by the composition root; share it
//! with an `Arc` rather than through global state.
//!
//! ```rust,no_run
//! use resilient_ops::config::ErrorHandlerConfig;
//! use resilient_ops::core_types::Failure;
//! use resilient_ops::enhanced::EnhanceOptions;
//! use resilient_ops::handler::ErrorHandler;
//!
//! let handler = ErrorHandler::new(ErrorHandlerConfig::default());
//! let id = handler.add_listener(|err| println!("{}", err.user_message()));
//! let enhanced = handler.handle(
//!     Failure::http(503, "upstream unavailable"),
//!     EnhanceOptions::default().with_context("operation", "load-accounts"),
//! );
//! assert!(enhanced.is_retryable());
//! handler.remove_listener(id);
//! ```

use crate::config::ErrorHandlerConfig;
use crate::core_types::{ErrorCategory, ErrorSeverity};
use crate::enhanced::{EnhanceOptions, EnhancedError, IntoEnhanced};
use crate::internals::lock;
use crate::logging::{log_debug, log_error, log_info, log_warn};
use crate::reporting::{ErrorReport, ErrorReporter, HttpErrorReporter};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Number of errors returned in [`ErrorStats::recent`].
pub const RECENT_ERRORS: usize = 10;

/// Callback invoked synchronously with every handled error.
pub type ErrorListener = Arc<dyn Fn(&EnhancedError) + Send + Sync>;

/// Handle returned by [`ErrorHandler::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Read-only snapshot of the error history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total: usize,
    pub by_severity: BTreeMap<ErrorSeverity, usize>,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    /// Most recent errors, newest last.
    pub recent: Vec<EnhancedError>,
}

pub struct ErrorHandler {
    config: ErrorHandlerConfig,
    reporter: Option<Arc<dyn ErrorReporter>>,
    listeners: Mutex<Vec<(ListenerId, ErrorListener)>>,
    next_listener_id: AtomicU64,
    history: Mutex<VecDeque<EnhancedError>>,
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("config", &self.config)
            .field("has_reporter", &self.reporter.is_some())
            .field("listeners", &lock(&self.listeners).len())
            .field("history", &lock(&self.history).len())
            .finish()
    }
}

impl ErrorHandler {
    /// Create a handler. An HTTP reporter is installed when reporting is
    /// enabled and an endpoint is configured.
    pub fn new(config: ErrorHandlerConfig) -> Self {
        let reporter = match (&config.reporting_endpoint, config.enable_reporting) {
            (Some(endpoint), true) => {
                Some(Arc::new(HttpErrorReporter::new(endpoint.clone())) as Arc<dyn ErrorReporter>)
            }
            _ => None,
        };
        Self::build(config, reporter)
    }

    /// Create a handler that reports through a custom sink.
    pub fn with_reporter(config: ErrorHandlerConfig, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self::build(config, Some(reporter))
    }

    fn build(config: ErrorHandlerConfig, reporter: Option<Arc<dyn ErrorReporter>>) -> Self {
        log_debug!(
            environment = %config.environment,
            version = %config.version,
            reporting = reporter.is_some(),
            max_history = config.max_history,
            "Error handler initialized"
        );

        Self {
            history: Mutex::new(VecDeque::with_capacity(config.max_history)),
            config,
            reporter,
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ErrorHandlerConfig {
        &self.config
    }

    /// Enhance, log, record, report, and fan out a failure.
    ///
    /// Already-enhanced errors pass through unchanged. Reporting runs in the
    /// background on the current tokio runtime; without a runtime the report
    /// is skipped.
    pub fn handle<E: IntoEnhanced>(&self, error: E, options: EnhanceOptions) -> EnhancedError {
        let enhanced = error.into_enhanced(options);

        self.log(&enhanced);
        self.record(&enhanced);
        if enhanced.is_reportable() {
            self.report(&enhanced);
        }
        self.notify(&enhanced);

        enhanced
    }

    fn log(&self, error: &EnhancedError) {
        match error.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => log_error!(
                error_id = %error.error_id(),
                kind = %error.kind(),
                category = ?error.category(),
                context = ?error.context(),
                message = %error.message(),
                "Handled error"
            ),
            ErrorSeverity::Medium => log_warn!(
                error_id = %error.error_id(),
                kind = %error.kind(),
                category = ?error.category(),
                context = ?error.context(),
                message = %error.message(),
                "Handled error"
            ),
            ErrorSeverity::Low => log_info!(
                error_id = %error.error_id(),
                kind = %error.kind(),
                category = ?error.category(),
                message = %error.message(),
                "Handled error"
            ),
        }
    }

    fn record(&self, error: &EnhancedError) {
        let mut history = lock(&self.history);
        while history.len() >= self.config.max_history.max(1) {
            history.pop_front();
        }
        history.push_back(error.clone());
    }

    fn report(&self, error: &EnhancedError) {
        let Some(reporter) = self.reporter.clone() else {
            return;
        };

        let report = ErrorReport {
            error: error.clone(),
            environment: self.config.environment.clone(),
            version: self.config.version.clone(),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = reporter.report(&report).await {
                        log_warn!(
                            error_id = %report.error.error_id(),
                            error = %e,
                            "Failed to report error"
                        );
                    }
                });
            }
            Err(_) => log_debug!(
                error_id = %error.error_id(),
                "No async runtime available, error report skipped"
            ),
        }
    }

    fn notify(&self, error: &EnhancedError) {
        // Snapshot so listeners may add or remove listeners while running.
        let listeners: Vec<ErrorListener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(error))).is_err() {
                log_warn!(
                    error_id = %error.error_id(),
                    "Error listener panicked"
                );
            }
        }
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&EnhancedError) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Returns whether a listener was removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn error_stats(&self) -> ErrorStats {
        let history = lock(&self.history);
        let mut by_severity = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        for error in history.iter() {
            *by_severity.entry(error.severity()).or_insert(0) += 1;
            *by_category.entry(error.category()).or_insert(0) += 1;
        }

        let skip = history.len().saturating_sub(RECENT_ERRORS);
        ErrorStats {
            total: history.len(),
            by_severity,
            by_category,
            recent: history.iter().skip(skip).cloned().collect(),
        }
    }

    /// Up to `limit` most recent errors, newest last.
    pub fn recent_errors(&self, limit: usize) -> Vec<EnhancedError> {
        let history = lock(&self.history);
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn clear_errors(&self) {
        lock(&self.history).clear();
        log_debug!("Error history cleared");
    }
}
