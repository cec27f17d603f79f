//! Error types for the loan approval serving layer.
//!
//! Request problems are [`ValidationError`]s and map to 4xx responses.
//! Worker problems are [`InvocationError`]s and map to 5xx responses.
//! [`ServingError`] joins the two for handlers.

use axum::http::StatusCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The request body could not be turned into a feature record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No JSON data provided")]
    NoData,

    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("Missing required feature: {0}")]
    MissingField(&'static str),

    #[error("Input array too short: got {got} values, need {need}")]
    InsufficientLength { got: usize, need: usize },

    #[error("Feature {0} is not numeric")]
    NonNumeric(&'static str),

    #[error("Unsupported input format")]
    UnsupportedShape,
}

/// Category of a failed worker invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Timeout,
    WorkerError,
    MalformedOutput,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::WorkerError => "worker_error",
            FailureKind::MalformedOutput => "malformed_output",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The prediction worker did not produce a usable result.
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("Prediction timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Worker prediction failed: {stderr}")]
    Worker { status: Option<i32>, stderr: String },

    #[error("Invalid JSON from worker ({reason}): {raw}")]
    MalformedOutput { raw: String, reason: String },
}

impl InvocationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            InvocationError::Timeout(_) => FailureKind::Timeout,
            InvocationError::Worker { .. } => FailureKind::WorkerError,
            InvocationError::MalformedOutput { .. } => FailureKind::MalformedOutput,
        }
    }

    /// Worker could not be started or fed its input.
    pub fn launch(err: std::io::Error) -> Self {
        InvocationError::Worker {
            status: None,
            stderr: format!("failed to launch worker: {}", err),
        }
    }
}

/// Any failure surfaced to an HTTP caller
#[derive(Error, Debug)]
pub enum ServingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

impl ServingError {
    /// HTTP status for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServingError::Validation(_) => StatusCode::BAD_REQUEST,
            ServingError::Invocation(InvocationError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ServingError::Invocation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let missing: ServingError = ValidationError::MissingField("income").into();
        assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(missing.to_string(), "Missing required feature: income");

        let timeout: ServingError = InvocationError::Timeout(Duration::from_secs(30)).into();
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.to_string(), "Prediction timeout after 30000ms");

        let worker: ServingError = InvocationError::Worker {
            status: Some(1),
            stderr: "Error in readRDS".to_string(),
        }
        .into();
        assert_eq!(worker.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(worker.to_string().contains("Error in readRDS"));
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            InvocationError::Timeout(Duration::from_millis(1)).kind(),
            FailureKind::Timeout
        );
        assert_eq!(
            InvocationError::launch(std::io::Error::from(std::io::ErrorKind::NotFound)).kind(),
            FailureKind::WorkerError
        );
        assert_eq!(
            InvocationError::MalformedOutput {
                raw: "oops".to_string(),
                reason: "expected value".to_string(),
            }
            .kind(),
            FailureKind::MalformedOutput
        );
    }
}
