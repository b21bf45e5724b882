//! Toast/notification sink consumed by the orchestration layer.
//!
//! The concrete UI lives outside this crate; it implements [`ToastSink`].

use crate::core_types::ErrorSeverity;
use crate::enhanced::EnhancedError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Button attached to a toast, typically "Retry".
#[derive(Clone)]
pub struct ToastAction {
    pub label: String,
    pub callback: Arc<dyn Fn() + Send + Sync>,
}

impl fmt::Debug for ToastAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToastAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToastOptions {
    pub duration: Option<Duration>,
    pub action: Option<ToastAction>,
}

impl ToastOptions {
    pub fn with_action<F>(mut self, label: impl Into<String>, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.action = Some(ToastAction {
            label: label.into(),
            callback: Arc::new(callback),
        });
        self
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait ToastSink: Send + Sync {
    fn show_success(&self, message: &str, options: ToastOptions);
    fn show_error(&self, message: &str, options: ToastOptions);
    fn show_warning(&self, message: &str, options: ToastOptions);
}

/// Adapt a toast sink into an error listener for
/// [`ErrorHandler::add_listener`](crate::handler::ErrorHandler::add_listener).
///
/// Low-severity errors become warnings, everything else an error toast.
pub fn error_toast_listener(
    sink: Arc<dyn ToastSink>,
) -> impl Fn(&EnhancedError) + Send + Sync + 'static {
    move |error: &EnhancedError| {
        if error.severity() == ErrorSeverity::Low {
            sink.show_warning(error.user_message(), ToastOptions::default());
        } else {
            sink.show_error(error.user_message(), ToastOptions::default());
        }
    }
}
