//! Core types shared by the classifier, the error handler, and the
//! retry/loading primitives.
//!
//! ## Organization
//! - `errors` - Failure taxonomy and the raw [`Failure`] record

pub mod errors;

pub use errors::{
    ErrorCategory, ErrorKind, ErrorSeverity, Failure, FailureOrigin, TransportResponse,
};

/// Free-form key/value context attached to an enhanced error.
pub type ErrorContext = std::collections::BTreeMap<String, serde_json::Value>;
