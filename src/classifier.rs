//! Transport classification of raw failures.
//!
//! Classification is a pure, total function of the transport response: the
//! same [`Failure`] always maps to the same [`ErrorKind`], and anything not
//! matched by a rule falls back to [`ErrorKind::Unknown`].

use crate::core_types::{ErrorCategory, ErrorKind, ErrorSeverity, Failure, TransportResponse};

/// Stateless classifier and policy table for [`ErrorKind`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a raw failure.
    pub fn classify(failure: &Failure) -> ErrorKind {
        Self::classify_response(failure.response())
    }

    /// Classify from the transport response alone. First matching rule wins.
    pub fn classify_response(response: Option<&TransportResponse>) -> ErrorKind {
        let Some(response) = response else {
            return ErrorKind::Network;
        };

        match response.status_code {
            status if status >= 500 => ErrorKind::Server,
            429 => ErrorKind::RateLimit,
            408 => ErrorKind::Timeout,
            401 => ErrorKind::Authentication,
            403 => ErrorKind::Authorization,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            422 => ErrorKind::Validation,
            400..=499 => ErrorKind::Client,
            _ => ErrorKind::Unknown,
        }
    }

    /// Human-facing message: the server's own message when present,
    /// otherwise the per-kind template.
    pub fn user_message(failure: &Failure, kind: ErrorKind) -> String {
        match failure.server_message() {
            Some(message) if !message.trim().is_empty() => message.to_string(),
            _ => Self::template(kind).to_string(),
        }
    }

    /// Fixed one-sentence template for a kind.
    pub fn template(kind: ErrorKind) -> &'static str {
        match kind {
            ErrorKind::Network => {
                "Unable to connect to the server. Please check your connection and try again."
            }
            ErrorKind::Server => "The server encountered an error. Please try again later.",
            ErrorKind::Timeout => "The request took too long to complete. Please try again.",
            ErrorKind::RateLimit => "Too many requests. Please wait a moment and try again.",
            ErrorKind::Authentication => "Your session has expired. Please sign in again.",
            ErrorKind::Authorization => "You do not have permission to perform this action.",
            ErrorKind::Validation => "Some of the information provided is invalid.",
            ErrorKind::NotFound => "The requested item could not be found.",
            ErrorKind::Conflict => "This item was changed by someone else. Please refresh.",
            ErrorKind::Client | ErrorKind::Unknown => {
                "An unexpected error occurred. Please try again."
            }
        }
    }

    pub fn is_retryable(kind: ErrorKind) -> bool {
        matches!(
            kind,
            ErrorKind::Network | ErrorKind::Server | ErrorKind::Timeout | ErrorKind::RateLimit
        )
    }

    pub fn is_reportable(kind: ErrorKind) -> bool {
        !matches!(kind, ErrorKind::Validation | ErrorKind::NotFound)
    }

    pub fn severity(kind: ErrorKind) -> ErrorSeverity {
        match kind {
            ErrorKind::Server => ErrorSeverity::High,
            ErrorKind::Network
            | ErrorKind::Authentication
            | ErrorKind::Authorization
            | ErrorKind::Timeout
            | ErrorKind::RateLimit => ErrorSeverity::Medium,
            ErrorKind::Validation | ErrorKind::Client => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }

    pub fn category(kind: ErrorKind) -> ErrorCategory {
        match kind {
            ErrorKind::Network => ErrorCategory::Network,
            ErrorKind::Authentication => ErrorCategory::Authentication,
            ErrorKind::Authorization => ErrorCategory::Authorization,
            ErrorKind::Validation => ErrorCategory::Validation,
            _ => ErrorCategory::System,
        }
    }
}
