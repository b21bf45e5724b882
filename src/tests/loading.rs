// Unit Tests for LoadingOrchestrator
//
// UNIT UNDER TEST: LoadingOrchestrator (with_enhanced_loading and friends)
//
// BUSINESS RESPONSIBILITY:
//   - Runs named operations under a timeout with retry-on-timeout
//   - Exposes live state while an operation is in flight
//   - Supports cooperative cancellation by key
//   - Routes terminal failures through the ErrorHandler and toasts
//   - Keeps a bounded history and derives statistics from it
//
// TEST COVERAGE:
//   - Success path, live state and success toasts
//   - Timeout retries with linear backoff and terminal timeout classification
//   - Non-timeout failures are not retried and are reported exactly once
//   - Cancellation during an attempt and during backoff
//   - Progress reporting with clamping and loading events
//   - History bounds and statistics

use crate::config::ErrorHandlerConfig;
use crate::core_types::{ErrorKind, Failure};
use crate::error::ResilienceError;
use crate::handler::ErrorHandler;
use crate::loading::{
    LoadingEvent, LoadingOptions, LoadingOrchestrator, OperationStatus, OrchestratorConfig,
    Progress,
};
use crate::toast::MockToastSink;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[cfg(test)]
mod loading_orchestrator_tests {
    use super::*;

    fn create_test_handler() -> Arc<ErrorHandler> {
        Arc::new(ErrorHandler::new(ErrorHandlerConfig {
            enable_reporting: false,
            ..ErrorHandlerConfig::default()
        }))
    }

    fn create_test_orchestrator() -> LoadingOrchestrator {
        LoadingOrchestrator::new(create_test_handler(), OrchestratorConfig::default())
    }

    fn create_orchestrator_with_toasts(toasts: MockToastSink) -> LoadingOrchestrator {
        LoadingOrchestrator::with_toast_sink(
            create_test_handler(),
            OrchestratorConfig::default(),
            Arc::new(toasts),
        )
    }

    fn fast_timeout_options(timeout_ms: u64, max_retries: u32) -> LoadingOptions {
        LoadingOptions {
            timeout: Duration::from_millis(timeout_ms),
            max_retries,
            ..LoadingOptions::default()
        }
    }

    /// Yield until `key` shows up in live state.
    async fn wait_until_loading(orchestrator: &LoadingOrchestrator, key: &str) {
        for _ in 0..100 {
            if orchestrator.is_loading(key) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("operation {key} never became live");
    }

    #[test]
    fn test_loading_option_defaults() {
        let options = LoadingOptions::default();

        assert_eq!(options.timeout, Duration::from_secs(30));
        assert!(options.enable_abort);
        assert!(options.retry_on_timeout);
        assert_eq!(options.max_retries, 2);
        assert!(!options.show_success_toast);
        assert!(options.show_error_toast);

        let config = OrchestratorConfig::default();
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.timeout_retry_backoff, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_successful_operation_returns_value_and_records_history() {
        // Arrange
        let orchestrator = create_test_orchestrator();

        // Act
        let result = orchestrator
            .with_enhanced_loading("accounts", "Loading accounts", LoadingOptions::default(), |_| async {
                Ok::<_, Failure>(vec!["checking", "savings"])
            })
            .await;

        // Assert
        assert_eq!(result.unwrap(), vec!["checking", "savings"]);
        assert!(!orchestrator.is_loading("accounts"), "Live state is cleared on success");

        let stats = orchestrator.operation_stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.recent[0].key, "accounts");
        assert_eq!(stats.recent[0].status, OperationStatus::Success);
        assert!(stats.recent[0].duration.is_some());
    }

    #[tokio::test]
    async fn test_live_state_visible_while_running() {
        // Arrange
        let orchestrator = create_test_orchestrator();
        let gate = Arc::new(Notify::new());
        let task = {
            let orchestrator = orchestrator.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                orchestrator
                    .with_enhanced_loading("profile", "Loading profile", LoadingOptions::default(), move |_| {
                        let gate = gate.clone();
                        async move {
                            gate.notified().await;
                            Ok::<_, Failure>("jane")
                        }
                    })
                    .await
            })
        };

        // Act
        wait_until_loading(&orchestrator, "profile").await;
        let live = orchestrator.operation("profile").unwrap();

        // Assert
        assert_eq!(live.message, "Loading profile");
        assert_eq!(live.attempt, 1);
        assert_eq!(live.max_retries, 2);
        assert_eq!(live.progress, Progress::Indeterminate);
        assert_eq!(orchestrator.active_operations().len(), 1);

        gate.notify_one();
        assert_eq!(task.await.unwrap().unwrap(), "jane");
        assert!(!orchestrator.is_loading("profile"));
        assert!(orchestrator.active_operations().is_empty());
    }

    #[tokio::test]
    async fn test_success_toast_uses_custom_message() {
        // Arrange
        let mut toasts = MockToastSink::new();
        toasts
            .expect_show_success()
            .withf(|message, _| message.to_string() == "Accounts refreshed")
            .times(1)
            .return_const(());
        let orchestrator = create_orchestrator_with_toasts(toasts);
        let options = LoadingOptions {
            show_success_toast: true,
            success_message: Some("Accounts refreshed".to_string()),
            ..LoadingOptions::default()
        };

        // Act
        let result = orchestrator
            .with_enhanced_loading("accounts", "Loading accounts", options, |_| async {
                Ok::<_, Failure>(())
            })
            .await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retries_with_linear_backoff() {
        // Test verifies timeout retry numbering and total elapsed time:
        // 100ms + 1s backoff + 100ms + 2s backoff + 100ms

        // Arrange
        let orchestrator = create_test_orchestrator();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let attempts_clone = attempts.clone();
        let started = tokio::time::Instant::now();

        // Act
        let result = orchestrator
            .with_enhanced_loading("slow", "Loading slowly", fast_timeout_options(100, 2), move |ctx| {
                attempts_clone.lock().unwrap().push(ctx.attempt());
                std::future::pending::<Result<(), Failure>>()
            })
            .await;

        // Assert
        assert_eq!(*attempts.lock().unwrap(), vec![1, 2, 3]);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3300), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(3400), "elapsed {elapsed:?}");

        let err = result.unwrap_err();
        let enhanced = err.enhanced().expect("timeouts surface as failures");
        assert_eq!(enhanced.kind(), ErrorKind::Network);
        assert_eq!(enhanced.message(), "Operation timed out after 100ms");
        assert_eq!(enhanced.context().get("attempt"), Some(&json!(3)));

        let stats = orchestrator.operation_stats();
        assert_eq!(stats.total, 1, "One history entry per invocation, not per attempt");
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.recent[0].attempt, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_retry_fails_after_one_attempt() {
        // Arrange
        let orchestrator = create_test_orchestrator();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let options = LoadingOptions {
            retry_on_timeout: false,
            ..fast_timeout_options(100, 2)
        };

        // Act
        let result = orchestrator
            .with_enhanced_loading("slow", "Loading slowly", options, move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<Result<(), Failure>>()
            })
            .await;

        // Assert
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ResilienceError::Failed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_timeout_can_succeed() {
        // Arrange
        let orchestrator = create_test_orchestrator();

        // Act
        let result = orchestrator
            .with_enhanced_loading("flaky", "Loading", fast_timeout_options(100, 2), |ctx| async move {
                if ctx.attempt() == 1 {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
                Ok::<_, Failure>(ctx.attempt())
            })
            .await;

        // Assert
        assert_eq!(result.unwrap(), 2);
        let stats = orchestrator.operation_stats();
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.recent[0].attempt, 2);
    }

    #[tokio::test]
    async fn test_operation_failure_is_not_retried_and_is_reported_once() {
        // Arrange
        let mut toasts = MockToastSink::new();
        toasts
            .expect_show_error()
            .withf(|message, _| {
                message.to_string() == "The server encountered an error. Please try again later."
            })
            .times(1)
            .return_const(());
        let orchestrator = create_orchestrator_with_toasts(toasts);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        // Act
        let result = orchestrator
            .with_enhanced_loading("accounts", "Loading accounts", LoadingOptions::default(), move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Failure::http(503, "upstream unavailable")) }
            })
            .await;

        // Assert
        assert_eq!(calls.load(Ordering::SeqCst), 1, "Only timeouts are retried here");
        let enhanced = result.unwrap_err().enhanced().cloned().unwrap();
        assert_eq!(enhanced.kind(), ErrorKind::Server);
        assert_eq!(enhanced.context().get("operation"), Some(&json!("accounts")));
        assert_eq!(enhanced.context().get("maxRetries"), Some(&json!(2)));

        let handled = orchestrator.error_handler().error_stats();
        assert_eq!(handled.total, 1);
        assert_eq!(handled.recent[0].error_id(), enhanced.error_id());

        let stats = orchestrator.operation_stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.recent[0].error.as_deref(), Some("upstream unavailable"));
    }

    #[tokio::test]
    async fn test_error_toast_prefers_configured_message() {
        let mut toasts = MockToastSink::new();
        toasts
            .expect_show_error()
            .withf(|message, _| message.to_string() == "Could not load accounts")
            .times(1)
            .return_const(());
        let orchestrator = create_orchestrator_with_toasts(toasts);
        let options = LoadingOptions {
            error_message: Some("Could not load accounts".to_string()),
            ..LoadingOptions::default()
        };

        let result = orchestrator
            .with_enhanced_loading("accounts", "Loading accounts", options, |_| async {
                Err::<(), _>(Failure::http(500, "boom"))
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cancel_operation_stops_waiting_and_skips_reporting() {
        // Arrange
        let mut toasts = MockToastSink::new();
        toasts.expect_show_error().never();
        let orchestrator = create_orchestrator_with_toasts(toasts);
        let task = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .with_enhanced_loading("report", "Building report", LoadingOptions::default(), |_| {
                        std::future::pending::<Result<(), Failure>>()
                    })
                    .await
            })
        };
        wait_until_loading(&orchestrator, "report").await;

        // Act
        let signalled = orchestrator.cancel_operation("report");

        // Assert
        assert_eq!(signalled, 1);
        assert!(!orchestrator.is_loading("report"), "Cancel clears live state immediately");
        let result = task.await.unwrap();
        assert!(result.unwrap_err().is_cancelled());

        let stats = orchestrator.operation_stats();
        assert_eq!(stats.aborted, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(
            orchestrator.error_handler().error_stats().total,
            0,
            "Cancellation is never reported"
        );
        assert_eq!(orchestrator.cancel_operation("report"), 0, "Cancel is idempotent");
    }

    #[tokio::test]
    async fn test_operation_observing_token_returns_aborted() {
        // Arrange
        let orchestrator = create_test_orchestrator();
        let task = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .with_enhanced_loading("sync", "Syncing", LoadingOptions::default(), |ctx| async move {
                        ctx.token().cancelled().await;
                        Err::<(), _>(Failure::aborted("sync cancelled"))
                    })
                    .await
            })
        };
        wait_until_loading(&orchestrator, "sync").await;

        // Act
        orchestrator.cancel_operation("sync");

        // Assert
        assert!(task.await.unwrap().unwrap_err().is_cancelled());
        assert_eq!(orchestrator.operation_stats().aborted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_timeout_backoff() {
        // Arrange
        let orchestrator = create_test_orchestrator();
        let calls = Arc::new(AtomicU32::new(0));
        let task = {
            let orchestrator = orchestrator.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                orchestrator
                    .with_enhanced_loading("slow", "Loading", fast_timeout_options(100, 2), move |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::future::pending::<Result<(), Failure>>()
                    })
                    .await
            })
        };

        // Act - first attempt timed out, now inside the 1s backoff
        tokio::time::sleep(Duration::from_millis(500)).await;
        let signalled = orchestrator.cancel_operation("slow");

        // Assert
        assert_eq!(signalled, 1);
        assert!(task.await.unwrap().unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "No attempt runs after cancellation");
    }

    #[tokio::test]
    async fn test_cancel_unknown_key_is_noop() {
        let orchestrator = create_test_orchestrator();

        assert_eq!(orchestrator.cancel_operation("missing"), 0);
    }

    #[tokio::test]
    async fn test_progress_loading_clamps_and_publishes_events() {
        // Arrange
        let orchestrator = create_test_orchestrator();
        let mut events = orchestrator.subscribe();
        let probe = orchestrator.clone();

        // Act
        let observed = orchestrator
            .with_enhanced_progress_loading("upload", "Uploading", LoadingOptions::default(), move |ctx| {
                let probe = probe.clone();
                async move {
                    ctx.report_progress(40);
                    let midway = probe.operation("upload").map(|op| op.progress);
                    ctx.progress().unwrap().report(250);
                    let end = probe.operation("upload").map(|op| op.progress);
                    Ok::<_, Failure>((midway, end))
                }
            })
            .await
            .unwrap();

        // Assert
        assert_eq!(observed.0, Some(Progress::Percent(40)));
        assert_eq!(observed.1, Some(Progress::Percent(100)), "Progress is clamped to 100");

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(
            received[0],
            LoadingEvent::Started {
                key: "upload".to_string(),
                attempt: 1
            }
        );
        assert_eq!(
            received[1],
            LoadingEvent::Progress {
                key: "upload".to_string(),
                progress: 40
            }
        );
        assert!(matches!(received.last(), Some(LoadingEvent::Succeeded { key, .. }) if key == "upload"));
    }

    #[tokio::test]
    async fn test_plain_loading_ignores_progress_reports() {
        let orchestrator = create_test_orchestrator();
        let probe = orchestrator.clone();

        let progress = orchestrator
            .with_enhanced_loading("plain", "Loading", LoadingOptions::default(), move |ctx| {
                let probe = probe.clone();
                async move {
                    assert!(ctx.progress().is_none());
                    ctx.report_progress(50);
                    Ok::<_, Failure>(probe.operation("plain").map(|op| op.progress))
                }
            })
            .await
            .unwrap();

        assert_eq!(progress, Some(Progress::Indeterminate));
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_recent_is_last_five() {
        // Arrange
        let orchestrator = create_test_orchestrator();

        // Act
        for i in 0..15 {
            let key = format!("op-{i}");
            orchestrator
                .with_enhanced_loading(&key, "Loading", LoadingOptions::default(), |_| async {
                    Ok::<_, Failure>(())
                })
                .await
                .unwrap();
        }

        // Assert
        let stats = orchestrator.operation_stats();
        assert_eq!(stats.total, 10, "History keeps the last 10 entries");
        assert_eq!(stats.successful, 10);
        let recent: Vec<_> = stats.recent.iter().map(|entry| entry.key.as_str()).collect();
        assert_eq!(recent, vec!["op-10", "op-11", "op-12", "op-13", "op-14"]);

        orchestrator.clear_history();
        assert_eq!(orchestrator.operation_stats().total, 0);
    }

    #[tokio::test]
    async fn test_concurrent_operations_have_independent_state() {
        // Arrange
        let orchestrator = create_test_orchestrator();
        let gate = Arc::new(Notify::new());
        let waiting = {
            let orchestrator = orchestrator.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                orchestrator
                    .with_enhanced_loading("first", "First", LoadingOptions::default(), move |_| {
                        let gate = gate.clone();
                        async move {
                            gate.notified().await;
                            Ok::<_, Failure>(1)
                        }
                    })
                    .await
            })
        };
        wait_until_loading(&orchestrator, "first").await;

        // Act
        let second = orchestrator
            .with_enhanced_loading("second", "Second", LoadingOptions::default(), |_| async {
                Ok::<_, Failure>(2)
            })
            .await
            .unwrap();

        // Assert
        assert_eq!(second, 2);
        assert!(orchestrator.is_loading("first"), "Other keys are unaffected");
        gate.notify_one();
        assert_eq!(waiting.await.unwrap().unwrap(), 1);
    }
}
