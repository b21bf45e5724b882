//! Enhanced error records.
//!
//! An [`EnhancedError`] is built exactly once from a raw [`Failure`], the
//! first time the failure is handled, and is immutable afterwards. Severity
//! and category come from the kind via [`ErrorClassifier`]; retryability and
//! reportability default from the kind and may be overridden by the call
//! site through [`EnhanceOptions`]. Aborted and circuit-open failures are
//! never retryable by default, and aborted failures are never reportable.

use crate::classifier::ErrorClassifier;
use crate::core_types::{
    ErrorCategory, ErrorContext, ErrorKind, ErrorSeverity, Failure, FailureOrigin,
};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Call-site overrides applied while enhancing a failure.
#[derive(Debug, Clone, Default)]
pub struct EnhanceOptions {
    pub context: ErrorContext,
    pub user_message: Option<String>,
    pub retryable: Option<bool>,
    pub reportable: Option<bool>,
}

impl EnhanceOptions {
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = Some(message.into());
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn reportable(mut self, reportable: bool) -> Self {
        self.reportable = Some(reportable);
        self
    }
}

/// Structured, enriched failure record surfaced to the rest of the system.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedError {
    error_id: String,
    kind: ErrorKind,
    message: String,
    user_message: String,
    severity: ErrorSeverity,
    category: ErrorCategory,
    context: ErrorContext,
    timestamp: DateTime<Utc>,
    retryable: bool,
    reportable: bool,
    #[serde(serialize_with = "serialize_original_error")]
    original_error: Option<Box<Failure>>,
}

impl EnhancedError {
    /// Classify and enrich a raw failure, taking ownership of it.
    pub fn from_failure(failure: Failure, options: EnhanceOptions) -> Self {
        let kind = ErrorClassifier::classify(&failure);
        let origin = failure.origin();
        let user_message = options
            .user_message
            .unwrap_or_else(|| ErrorClassifier::user_message(&failure, kind));
        let timestamp = Utc::now();

        Self {
            error_id: generate_error_id(&timestamp),
            kind,
            message: failure.message().to_string(),
            user_message,
            severity: ErrorClassifier::severity(kind),
            category: ErrorClassifier::category(kind),
            context: options.context,
            timestamp,
            retryable: options.retryable.unwrap_or_else(|| {
                origin == FailureOrigin::Operation && ErrorClassifier::is_retryable(kind)
            }),
            reportable: options.reportable.unwrap_or_else(|| {
                origin != FailureOrigin::Aborted && ErrorClassifier::is_reportable(kind)
            }),
            original_error: Some(Box::new(failure)),
        }
    }

    pub fn error_id(&self) -> &str {
        &self.error_id
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn is_reportable(&self) -> bool {
        self.reportable
    }

    pub fn original_error(&self) -> Option<&Failure> {
        self.original_error.as_deref()
    }
}

impl fmt::Display for EnhancedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.error_id, self.message, self.kind)
    }
}

impl std::error::Error for EnhancedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.original_error
            .as_deref()
            .map(|f| f as &(dyn std::error::Error + 'static))
    }
}

/// Conversion into an [`EnhancedError`]; idempotent on already-enhanced errors.
pub trait IntoEnhanced {
    fn into_enhanced(self, options: EnhanceOptions) -> EnhancedError;
}

impl IntoEnhanced for Failure {
    fn into_enhanced(self, options: EnhanceOptions) -> EnhancedError {
        EnhancedError::from_failure(self, options)
    }
}

impl IntoEnhanced for EnhancedError {
    /// Returns the record unchanged; the options are ignored.
    fn into_enhanced(self, _options: EnhanceOptions) -> EnhancedError {
        self
    }
}

impl IntoEnhanced for anyhow::Error {
    fn into_enhanced(self, options: EnhanceOptions) -> EnhancedError {
        EnhancedError::from_failure(Failure::from(self), options)
    }
}

impl IntoEnhanced for reqwest::Error {
    fn into_enhanced(self, options: EnhanceOptions) -> EnhancedError {
        EnhancedError::from_failure(Failure::from(self), options)
    }
}

fn generate_error_id(timestamp: &DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("err_{}_{}", timestamp.timestamp_millis(), &suffix[..9])
}

#[derive(Serialize)]
struct OriginalErrorRecord<'a> {
    name: &'a str,
    message: &'a str,
    stack: Option<String>,
}

fn serialize_original_error<S>(value: &Option<Box<Failure>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(failure) => serializer.serialize_some(&OriginalErrorRecord {
            name: failure.name(),
            message: failure.message(),
            stack: failure.stack(),
        }),
        None => serializer.serialize_none(),
    }
}
