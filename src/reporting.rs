//! Error reporting sink.
//!
//! Reportable errors are forwarded as JSON to an upstream collector. The
//! [`ErrorHandler`](crate::handler::ErrorHandler) calls reporters
//! fire-and-forget: a failing reporter is logged and never surfaces to the
//! code that raised the original error.

use crate::enhanced::EnhancedError;
use crate::logging::log_debug;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use thiserror::Error;

/// Failure to deliver a report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Report rejected with status {status}")]
    Rejected { status: u16 },
}

/// Wire payload: the serialized [`EnhancedError`] plus deployment tags.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    #[serde(flatten)]
    pub error: EnhancedError,
    pub environment: String,
    pub version: String,
}

/// Destination for reportable errors.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, report: &ErrorReport) -> Result<(), ReportError>;
}

/// Posts reports to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpErrorReporter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpErrorReporter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ErrorReporter for HttpErrorReporter {
    async fn report(&self, report: &ErrorReport) -> Result<(), ReportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(report)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::Rejected {
                status: status.as_u16(),
            });
        }

        log_debug!(
            endpoint = %self.endpoint,
            error_id = %report.error.error_id(),
            "Error report delivered"
        );
        Ok(())
    }
}
