//! Failure taxonomy shared by every resilience primitive.
//!
//! [`ErrorKind`] is the transport classification of a raw [`Failure`];
//! [`ErrorSeverity`] and [`ErrorCategory`] are the policy classification
//! derived from it when the failure is enhanced.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Closed taxonomy of failure classes derived from transport status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Server,
    Client,
    Timeout,
    RateLimit,
    Authentication,
    Authorization,
    Validation,
    NotFound,
    Conflict,
    Unknown,
}

impl ErrorKind {
    /// Stable snake_case name used in logs and serialized records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Server => "server",
            Self::Client => "client",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity for logging and alerting. Ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Expected, user-recoverable failure (bad input).
    Low,
    /// Unexpected but recoverable.
    Medium,
    /// A dependency is failing.
    High,
    /// Data integrity or availability at risk.
    Critical,
}

/// High-level categorization for routing and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Authentication,
    Authorization,
    Validation,
    BusinessLogic,
    System,
    UserInput,
    ExternalService,
}

/// Where a [`Failure`] came from.
///
/// Classification never looks at the origin; only retry and cancellation
/// decisions do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureOrigin {
    /// The guarded operation itself failed.
    Operation,
    /// The operation observed its cancellation token and gave up.
    Aborted,
    /// A circuit breaker rejected the call without running it.
    CircuitOpen,
}

/// Transport response attached to a failure.
///
/// No assumption is made about the wire shape of `body`; a server-supplied
/// human message must be extracted by the caller into `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status_code: u16,
    pub body: Option<Vec<u8>>,
    pub message: Option<String>,
}

impl TransportResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            body: None,
            message: None,
        }
    }
}

/// A raw failure as produced by an operation, before enhancement.
#[derive(Debug, Clone)]
pub struct Failure {
    name: String,
    message: String,
    response: Option<TransportResponse>,
    origin: FailureOrigin,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Failure {
    /// Generic failure with no transport response.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_string(),
            message: message.into(),
            response: None,
            origin: FailureOrigin::Operation,
            source: None,
        }
    }

    /// The request never produced a response.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(message).with_name("NetworkError")
    }

    /// The request produced a response with the given status code.
    pub fn http(status_code: u16, message: impl Into<String>) -> Self {
        let mut failure = Self::new(message).with_name("HttpError");
        failure.response = Some(TransportResponse::new(status_code));
        failure
    }

    /// The operation observed cancellation and stopped.
    pub fn aborted(message: impl Into<String>) -> Self {
        let mut failure = Self::new(message).with_name("AbortError");
        failure.origin = FailureOrigin::Aborted;
        failure
    }

    /// A circuit breaker refused to run the operation.
    pub fn circuit_open(breaker: &str) -> Self {
        let mut failure = Self::new(format!("Circuit breaker is open for {breaker}"))
            .with_name("CircuitOpenError");
        failure.origin = FailureOrigin::CircuitOpen;
        failure
    }

    /// The operation did not settle before its deadline.
    pub fn timed_out(after: Duration) -> Self {
        Self::new(format!("Operation timed out after {}ms", after.as_millis()))
            .with_name("TimeoutError")
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a full transport response, replacing any previous one.
    pub fn with_response(mut self, response: TransportResponse) -> Self {
        self.response = Some(response);
        self
    }

    /// Attach a server-supplied human message. Ignored without a response.
    pub fn with_server_message(mut self, message: impl Into<String>) -> Self {
        if let Some(response) = self.response.as_mut() {
            response.message = Some(message.into());
        }
        self
    }

    /// Attach the raw response body. Ignored without a response.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        if let Some(response) = self.response.as_mut() {
            response.body = Some(body.into());
        }
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn response(&self) -> Option<&TransportResponse> {
        self.response.as_ref()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status_code)
    }

    pub fn server_message(&self) -> Option<&str> {
        self.response.as_ref().and_then(|r| r.message.as_deref())
    }

    pub fn origin(&self) -> FailureOrigin {
        self.origin
    }

    pub fn is_aborted(&self) -> bool {
        self.origin == FailureOrigin::Aborted
    }

    /// Rendered chain of underlying causes, outermost first.
    pub fn stack(&self) -> Option<String> {
        let mut current: Option<&(dyn std::error::Error + 'static)> = self
            .source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static));
        let mut frames = Vec::new();
        while let Some(err) = current {
            frames.push(format!("caused by: {err}"));
            current = err.source();
        }
        if frames.is_empty() {
            None
        } else {
            Some(frames.join("\n"))
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code() {
            Some(status) => write!(f, "{}: {} (status {status})", self.name, self.message),
            None => write!(f, "{}: {}", self.name, self.message),
        }
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        let message = err.to_string();
        let source: Box<dyn std::error::Error + Send + Sync> = err.into();
        let mut failure = Self::new(message);
        failure.source = Some(Arc::from(source));
        failure
    }
}

impl From<reqwest::Error> for Failure {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        let failure = match err.status() {
            Some(status) => Self::http(status.as_u16(), message),
            None if err.is_timeout() => Self::network(message).with_name("TimeoutError"),
            None => Self::network(message),
        };
        failure.with_source(err)
    }
}
