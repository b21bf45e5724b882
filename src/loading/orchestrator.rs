//! Named asynchronous operations with timeout, cooperative cancellation and
//! retry-on-timeout.
//!
//! Each call to [`LoadingOrchestrator::with_enhanced_loading`] moves through
//! `running → {succeeded | failed | timed-out-retry → running | cancelled}`.
//! A timed-out attempt is the only way back to `running`; every terminal
//! state removes the operation from live state and appends exactly one
//! history entry.
//!
//! The timeout is raced against the operation. A late result from a
//! timed-out or cancelled attempt is dropped together with its future, so it
//! can never overwrite the recorded outcome.

use super::cancellation::CancellationToken;
use super::history::{
    OperationHistory, OperationHistoryEntry, OperationStats, OperationStatus,
};
use crate::core_types::Failure;
use crate::enhanced::EnhanceOptions;
use crate::error::{ResilienceError, ResilienceResult};
use crate::handler::ErrorHandler;
use crate::internals::lock;
use crate::logging::{log_debug, log_info, log_warn};
use crate::toast::{ToastOptions, ToastSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

/// Per-call loading options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingOptions {
    pub timeout: Duration,
    /// Register the operation so [`LoadingOrchestrator::cancel_operation`]
    /// can reach it.
    pub enable_abort: bool,
    pub retry_on_timeout: bool,
    /// Timeout retries allowed after the first attempt
    pub max_retries: u32,
    pub show_success_toast: bool,
    pub show_error_toast: bool,
    pub success_message: Option<String>,
    pub error_message: Option<String>,
}

impl Default for LoadingOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30_000),
            enable_abort: true,
            retry_on_timeout: true,
            max_retries: 2,
            show_success_toast: false,
            show_error_toast: true,
            success_message: None,
            error_message: None,
        }
    }
}

/// Orchestrator-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Entries kept in the operation history
    pub history_capacity: usize,
    /// Linear backoff unit between timeout retries
    pub timeout_retry_backoff: Duration,
    /// Buffer of the loading event channel
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 10,
            timeout_retry_backoff: Duration::from_millis(1000),
            event_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    Indeterminate,
    Percent(u8),
}

/// Live state of an in-flight operation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingOperation {
    pub key: String,
    pub message: String,
    pub progress: Progress,
    pub start_time: DateTime<Utc>,
    pub attempt: u32,
    pub max_retries: u32,
    pub timeout: Duration,
}

/// Published on the orchestrator's event channel for UI consumption.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadingEvent {
    Started { key: String, attempt: u32 },
    Progress { key: String, progress: u8 },
    Retrying { key: String, attempt: u32, delay: Duration },
    Succeeded { key: String, duration: Duration },
    Failed { key: String, error_id: String },
    Cancelled { key: String },
}

/// Handed to every orchestrated closure.
#[derive(Debug, Clone)]
pub struct OperationContext {
    token: CancellationToken,
    attempt: u32,
    progress: Option<ProgressReporter>,
}

impl OperationContext {
    /// Token to observe at safe points; cancelled on timeout or on
    /// [`LoadingOrchestrator::cancel_operation`].
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Present only under progress loading.
    pub fn progress(&self) -> Option<&ProgressReporter> {
        self.progress.as_ref()
    }

    /// Report progress if this is a progress-loading call; otherwise a no-op.
    pub fn report_progress(&self, percent: u8) {
        if let Some(reporter) = &self.progress {
            reporter.report(percent);
        }
    }
}

/// Mirrors progress updates (0 to 100) into the live operation state.
#[derive(Clone)]
pub struct ProgressReporter {
    key: String,
    id: u64,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl ProgressReporter {
    /// Values above 100 are clamped.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        self.shared.set_progress(&self.key, self.id, percent);
    }
}

struct LiveEntry {
    id: u64,
    operation: LoadingOperation,
}

struct State {
    live: HashMap<String, LiveEntry>,
    tokens: HashMap<String, Vec<(u64, CancellationToken)>>,
    history: OperationHistory,
}

pub(super) struct Shared {
    handler: Arc<ErrorHandler>,
    toasts: Option<Arc<dyn ToastSink>>,
    config: OrchestratorConfig,
    state: Mutex<State>,
    events: broadcast::Sender<LoadingEvent>,
    next_id: AtomicU64,
}

impl Shared {
    fn emit(&self, event: LoadingEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(super) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(super) fn set_live(&self, id: u64, operation: LoadingOperation) {
        let key = operation.key.clone();
        lock(&self.state).live.insert(key, LiveEntry { id, operation });
    }

    pub(super) fn remove_live(&self, key: &str, id: u64) {
        let mut state = lock(&self.state);
        if state.live.get(key).is_some_and(|entry| entry.id == id) {
            state.live.remove(key);
        }
    }

    pub(super) fn set_progress(&self, key: &str, id: u64, percent: u8) {
        let updated = {
            let mut state = lock(&self.state);
            match state.live.get_mut(key) {
                Some(entry) if entry.id == id => {
                    entry.operation.progress = Progress::Percent(percent);
                    true
                }
                _ => false,
            }
        };
        if updated {
            self.emit(LoadingEvent::Progress {
                key: key.to_string(),
                progress: percent,
            });
        }
    }

    pub(super) fn register_token(&self, key: &str, id: u64, token: CancellationToken) {
        lock(&self.state)
            .tokens
            .entry(key.to_string())
            .or_default()
            .push((id, token));
    }

    pub(super) fn unregister_token(&self, key: &str, id: u64) {
        let mut state = lock(&self.state);
        if let Some(tokens) = state.tokens.get_mut(key) {
            tokens.retain(|(existing, _)| *existing != id);
            if tokens.is_empty() {
                state.tokens.remove(key);
            }
        }
    }

    fn record(&self, entry: OperationHistoryEntry) {
        lock(&self.state).history.push(entry);
    }
}

enum Settled<T> {
    Completed(T),
    TimedOut,
    Cancelled,
}

enum Outcome<T> {
    Success(T),
    Failed(Failure),
    Cancelled,
}

/// Runs named operations and tracks their live state and history.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct LoadingOrchestrator {
    pub(super) shared: Arc<Shared>,
}

impl std::fmt::Debug for LoadingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("LoadingOrchestrator")
            .field("config", &self.shared.config)
            .field("live", &state.live.len())
            .field("history", &state.history.len())
            .finish()
    }
}

impl LoadingOrchestrator {
    pub fn new(handler: Arc<ErrorHandler>, config: OrchestratorConfig) -> Self {
        Self::build(handler, config, None)
    }

    pub fn with_toast_sink(
        handler: Arc<ErrorHandler>,
        config: OrchestratorConfig,
        toasts: Arc<dyn ToastSink>,
    ) -> Self {
        Self::build(handler, config, Some(toasts))
    }

    fn build(
        handler: Arc<ErrorHandler>,
        config: OrchestratorConfig,
        toasts: Option<Arc<dyn ToastSink>>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let state = State {
            live: HashMap::new(),
            tokens: HashMap::new(),
            history: OperationHistory::new(config.history_capacity),
        };

        Self {
            shared: Arc::new(Shared {
                handler,
                toasts,
                config,
                state: Mutex::new(state),
                events,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn error_handler(&self) -> &Arc<ErrorHandler> {
        &self.shared.handler
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    /// Receive loading events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LoadingEvent> {
        self.shared.events.subscribe()
    }

    /// Run `operation` under `key` with timeout, cancellation and
    /// retry-on-timeout.
    ///
    /// Terminal failures are routed through the [`ErrorHandler`] and
    /// returned as [`ResilienceError::Failed`]; cancellation returns
    /// [`ResilienceError::Cancelled`] and is never retried or reported.
    pub async fn with_enhanced_loading<F, Fut, T, E>(
        &self,
        key: &str,
        message: &str,
        options: LoadingOptions,
        operation: F,
    ) -> ResilienceResult<T>
    where
        F: FnMut(OperationContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        self.run(key, message, &options, operation, false).await
    }

    /// Same as [`with_enhanced_loading`](Self::with_enhanced_loading), with
    /// a [`ProgressReporter`] available through
    /// [`OperationContext::progress`].
    pub async fn with_enhanced_progress_loading<F, Fut, T, E>(
        &self,
        key: &str,
        message: &str,
        options: LoadingOptions,
        operation: F,
    ) -> ResilienceResult<T>
    where
        F: FnMut(OperationContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        self.run(key, message, &options, operation, true).await
    }

    async fn run<F, Fut, T, E>(
        &self,
        key: &str,
        message: &str,
        options: &LoadingOptions,
        mut operation: F,
        with_progress: bool,
    ) -> ResilienceResult<T>
    where
        F: FnMut(OperationContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        let shared = &self.shared;
        let id = shared.next_id();
        let invocation = CancellationToken::new();
        if options.enable_abort {
            shared.register_token(key, id, invocation.clone());
        }

        let started = Instant::now();
        let mut attempt: u32 = 1;

        let outcome = loop {
            if invocation.is_cancelled() {
                break Outcome::Cancelled;
            }

            let attempt_token = CancellationToken::new();
            {
                let linked = attempt_token.clone();
                invocation.on_cancel(move || linked.cancel());
            }

            shared.set_live(
                id,
                LoadingOperation {
                    key: key.to_string(),
                    message: message.to_string(),
                    progress: Progress::Indeterminate,
                    start_time: Utc::now(),
                    attempt,
                    max_retries: options.max_retries,
                    timeout: options.timeout,
                },
            );
            shared.emit(LoadingEvent::Started {
                key: key.to_string(),
                attempt,
            });
            log_debug!(operation = %key, attempt = attempt, "Operation started");

            let context = OperationContext {
                token: attempt_token.clone(),
                attempt,
                progress: with_progress.then(|| ProgressReporter {
                    key: key.to_string(),
                    id,
                    shared: Arc::clone(shared),
                }),
            };

            let settled = tokio::select! {
                result = operation(context) => Settled::Completed(result),
                _ = sleep(options.timeout) => Settled::TimedOut,
                _ = invocation.cancelled() => Settled::Cancelled,
            };

            match settled {
                Settled::Completed(Ok(value)) => break Outcome::Success(value),
                Settled::Completed(Err(error)) => {
                    let failure: Failure = error.into();
                    if failure.is_aborted() || attempt_token.is_cancelled() {
                        break Outcome::Cancelled;
                    }
                    break Outcome::Failed(failure);
                }
                Settled::Cancelled => break Outcome::Cancelled,
                Settled::TimedOut => {
                    attempt_token.cancel();
                    shared.remove_live(key, id);
                    log_warn!(
                        operation = %key,
                        attempt = attempt,
                        timeout_ms = options.timeout.as_millis(),
                        "Operation timed out"
                    );

                    if !(options.retry_on_timeout && attempt <= options.max_retries) {
                        break Outcome::Failed(Failure::timed_out(options.timeout));
                    }

                    let delay = shared.config.timeout_retry_backoff * attempt;
                    shared.emit(LoadingEvent::Retrying {
                        key: key.to_string(),
                        attempt: attempt + 1,
                        delay,
                    });
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = invocation.cancelled() => break Outcome::Cancelled,
                    }
                    attempt += 1;
                }
            }
        };

        shared.unregister_token(key, id);
        shared.remove_live(key, id);
        self.finish(key, message, options, attempt, started, outcome)
    }

    fn finish<T>(
        &self,
        key: &str,
        message: &str,
        options: &LoadingOptions,
        attempt: u32,
        started: Instant,
        outcome: Outcome<T>,
    ) -> ResilienceResult<T> {
        let shared = &self.shared;
        let entry = |status: OperationStatus, duration: Option<Duration>, error: Option<String>| {
            OperationHistoryEntry {
                key: key.to_string(),
                message: message.to_string(),
                status,
                duration,
                error,
                timestamp: Utc::now(),
                attempt,
            }
        };

        match outcome {
            Outcome::Success(value) => {
                let duration = started.elapsed();
                shared.record(entry(OperationStatus::Success, Some(duration), None));
                shared.emit(LoadingEvent::Succeeded {
                    key: key.to_string(),
                    duration,
                });
                log_debug!(
                    operation = %key,
                    attempt = attempt,
                    duration_ms = duration.as_millis(),
                    "Operation succeeded"
                );

                if options.show_success_toast {
                    if let Some(toasts) = &shared.toasts {
                        let text = options
                            .success_message
                            .clone()
                            .unwrap_or_else(|| format!("{message} completed"));
                        toasts.show_success(&text, ToastOptions::default());
                    }
                }
                Ok(value)
            }
            Outcome::Cancelled => {
                shared.record(entry(OperationStatus::Aborted, None, None));
                shared.emit(LoadingEvent::Cancelled {
                    key: key.to_string(),
                });
                Err(ResilienceError::cancelled(key))
            }
            Outcome::Failed(failure) => {
                shared.record(entry(
                    OperationStatus::Error,
                    None,
                    Some(failure.message().to_string()),
                ));

                let enhanced = shared.handler.handle(
                    failure,
                    EnhanceOptions::default()
                        .with_context("operation", key)
                        .with_context("message", message)
                        .with_context("attempt", attempt)
                        .with_context("maxRetries", options.max_retries),
                );
                shared.emit(LoadingEvent::Failed {
                    key: key.to_string(),
                    error_id: enhanced.error_id().to_string(),
                });

                if options.show_error_toast {
                    if let Some(toasts) = &shared.toasts {
                        let text = options
                            .error_message
                            .as_deref()
                            .unwrap_or(enhanced.user_message());
                        toasts.show_error(text, ToastOptions::default());
                    }
                }
                Err(ResilienceError::failed(enhanced))
            }
        }
    }

    /// Signal cancellation on every live token under `key` and drop its live
    /// state. Returns how many operations were signalled; idempotent.
    ///
    /// The underlying futures are not forcibly stopped; their results are
    /// discarded.
    pub fn cancel_operation(&self, key: &str) -> usize {
        let tokens = {
            let mut state = lock(&self.shared.state);
            state.live.remove(key);
            state.tokens.remove(key).unwrap_or_default()
        };

        for (_, token) in &tokens {
            token.cancel();
        }
        if !tokens.is_empty() {
            log_info!(operation = %key, cancelled = tokens.len(), "Operation cancelled");
        }
        tokens.len()
    }

    pub fn is_loading(&self, key: &str) -> bool {
        lock(&self.shared.state).live.contains_key(key)
    }

    pub fn operation(&self, key: &str) -> Option<LoadingOperation> {
        lock(&self.shared.state)
            .live
            .get(key)
            .map(|entry| entry.operation.clone())
    }

    pub fn active_operations(&self) -> Vec<LoadingOperation> {
        lock(&self.shared.state)
            .live
            .values()
            .map(|entry| entry.operation.clone())
            .collect()
    }

    /// Derived from the bounded history only; live operations are ignored.
    pub fn operation_stats(&self) -> OperationStats {
        lock(&self.shared.state).history.stats()
    }

    pub fn clear_history(&self) {
        lock(&self.shared.state).history.clear();
    }
}
