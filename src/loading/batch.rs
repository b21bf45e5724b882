//! Sequential batches of independent operations sharing one progress
//! indicator.
//!
//! Entries run strictly one after another so the aggregate percentage under
//! the batch key stays meaningful. Each entry goes through
//! [`LoadingOrchestrator::with_enhanced_loading`] under its own key.

use super::cancellation::CancellationToken;
use super::orchestrator::{
    LoadingOperation, LoadingOptions, LoadingOrchestrator, OperationContext, Progress,
};
use crate::core_types::Failure;
use crate::error::{ResilienceError, ResilienceResult};
use crate::logging::{log_debug, log_warn};
use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::Future;

type BoxedOperation<T> =
    Box<dyn FnMut(OperationContext) -> BoxFuture<'static, Result<T, Failure>> + Send>;

/// One named entry of a batch.
pub struct BatchOperation<T> {
    pub key: String,
    pub message: String,
    operation: BoxedOperation<T>,
}

impl<T: Send + 'static> BatchOperation<T> {
    pub fn new<F, Fut, E>(key: impl Into<String>, message: impl Into<String>, mut operation: F) -> Self
    where
        F: FnMut(OperationContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<Failure> + 'static,
    {
        Self {
            key: key.into(),
            message: message.into(),
            operation: Box::new(move |context| {
                let future = operation(context);
                async move { future.await.map_err(Into::into) }.boxed()
            }),
        }
    }
}

impl<T> std::fmt::Debug for BatchOperation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOperation")
            .field("key", &self.key)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Record a failed entry and keep going instead of aborting the batch.
    pub continue_on_error: bool,
    /// Key under which aggregate progress is published.
    pub key: String,
    pub message: String,
    /// Options applied to every entry.
    pub loading: LoadingOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            key: "batch".to_string(),
            message: "Processing batch".to_string(),
            loading: LoadingOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchResult<T> {
    pub key: String,
    pub value: T,
}

#[derive(Debug, Clone)]
pub struct BatchError {
    pub key: String,
    pub error: ResilienceError,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome<T> {
    pub results: Vec<BatchResult<T>>,
    pub errors: Vec<BatchError>,
    /// `true` when no entry failed.
    pub success: bool,
}

impl LoadingOrchestrator {
    /// Run `operations` in order, publishing aggregate progress under
    /// `options.key`.
    ///
    /// With `continue_on_error` a failed entry is collected and the batch
    /// moves on; without it the first failure is returned immediately and
    /// later entries never run. Cancelling the batch key stops the batch
    /// before its next entry.
    pub async fn with_batch_loading<T>(
        &self,
        operations: Vec<BatchOperation<T>>,
        options: BatchOptions,
    ) -> ResilienceResult<BatchOutcome<T>> {
        let shared = &self.shared;
        let total = operations.len();
        let id = shared.next_id();
        let batch_token = CancellationToken::new();
        shared.register_token(&options.key, id, batch_token.clone());
        shared.set_live(
            id,
            LoadingOperation {
                key: options.key.clone(),
                message: options.message.clone(),
                progress: Progress::Percent(0),
                start_time: Utc::now(),
                attempt: 1,
                max_retries: 0,
                timeout: options.loading.timeout,
            },
        );
        log_debug!(batch = %options.key, operations = total, "Batch started");

        let mut results = Vec::with_capacity(total);
        let mut errors = Vec::new();

        for (index, entry) in operations.into_iter().enumerate() {
            if batch_token.is_cancelled() {
                shared.unregister_token(&options.key, id);
                shared.remove_live(&options.key, id);
                return Err(ResilienceError::cancelled(options.key.clone()));
            }

            let BatchOperation {
                key,
                message,
                mut operation,
            } = entry;

            let result = self
                .with_enhanced_loading(&key, &message, options.loading.clone(), |context| {
                    operation(context)
                })
                .await;

            match result {
                Ok(value) => results.push(BatchResult { key, value }),
                Err(error) if options.continue_on_error => {
                    log_warn!(
                        batch = %options.key,
                        operation = %key,
                        error = %error,
                        "Batch entry failed, continuing"
                    );
                    errors.push(BatchError { key, error });
                }
                Err(error) => {
                    log_warn!(
                        batch = %options.key,
                        operation = %key,
                        error = %error,
                        "Batch entry failed, aborting batch"
                    );
                    shared.unregister_token(&options.key, id);
                    shared.remove_live(&options.key, id);
                    return Err(error);
                }
            }

            let percent = ((index + 1) * 100 / total).min(100);
            shared.set_progress(&options.key, id, u8::try_from(percent).unwrap_or(100));
        }

        shared.unregister_token(&options.key, id);
        shared.remove_live(&options.key, id);
        log_debug!(
            batch = %options.key,
            succeeded = results.len(),
            failed = errors.len(),
            "Batch finished"
        );

        Ok(BatchOutcome {
            success: errors.is_empty(),
            results,
            errors,
        })
    }
}
