use aws_sdk_dynamodb::error::{BuildError, ProvideErrorMetadata};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use serde_dynamo::Error as SerdeDynamoError;
use std::fmt;

use crate::stats::OperationKind;

/// Which half of a key a shape check was applied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyRole {
    /// Partition (hash) key
    Partition,
    /// Sort (range) key
    Sort,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::Partition => f.write_str("partition key"),
            KeyRole::Sort => f.write_str("sort key"),
        }
    }
}

/// Per-item reason reported by a cancelled transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancellationReason {
    /// Position of the item inside the transaction request
    pub index: usize,
    /// Store reason code (`None`, `ConditionalCheckFailed`, `ThrottlingError`, ...)
    pub code: Option<String>,
    /// Human readable message from the store
    pub message: Option<String>,
}

/// Access layer error
///
/// Variants fall into four groups: validation (never retried), conditional
/// failures, transient store faults (see [`Error::is_retryable`]) and
/// transaction cancellations carrying per-item reasons.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A key could not be built or parsed
    #[error("invalid key part at position {position}: {reason}")]
    InvalidKey {
        /// Zero-based position of the offending part
        position: usize,
        /// What was wrong with it
        reason: String,
    },
    /// Malformed request, configuration or pattern definition
    #[error("validation error: {0}")]
    Validation(String),
    /// An access pattern with this name is already registered
    #[error("access pattern `{0}` is already registered")]
    DuplicatePattern(String),
    /// No access pattern with this name
    #[error("access pattern `{0}` is not registered")]
    PatternNotFound(String),
    /// A key does not match the declared index shape
    #[error(
        "key shape mismatch for pattern `{pattern}` on {target} {role}: expected {expected}, got {actual}",
        target = describe_target(.index)
    )]
    KeyShapeMismatch {
        /// Pattern being resolved
        pattern: String,
        /// Index the pattern targets, `None` for the base table
        index: Option<String>,
        /// Key half that failed
        role: KeyRole,
        /// Declared shape, e.g. `[tenantId:S, userId:S]`
        expected: String,
        /// Supplied shape
        actual: String,
    },
    /// A condition expression did not hold
    #[error("conditional check failed for {operation} on table `{table}`")]
    ConditionalCheckFailed {
        /// Operation that carried the condition
        operation: OperationKind,
        /// Target table
        table: String,
    },
    /// A transaction was cancelled; reasons are in request order
    #[error("transaction cancelled: {}", summarize_reasons(.reasons))]
    TransactionCanceled {
        /// One entry per transaction item
        reasons: Vec<CancellationReason>,
    },
    /// Throttling, capacity exceeded or timeout. Safe to retry.
    #[error("{operation} throttled or timed out: {message}")]
    Throttled {
        /// Store operation name
        operation: &'static str,
        /// Store message
        message: String,
    },
    /// Any other store failure
    #[error("{operation} failed ({error_code}): {message}", error_code = describe_code(.code))]
    Store {
        /// Store operation name
        operation: &'static str,
        /// Store error code when one was returned
        code: Option<String>,
        /// Store message
        message: String,
    },
    /// Serde DynamoDB serialization/deserialization error
    #[error("DynamoDB serialization error: {0}")]
    SerdeDynamo(#[from] SerdeDynamoError),
    /// DynamoDB request builder error
    #[error("DynamoDB request builder error: {0}")]
    BuildError(#[from] BuildError),
    /// Telemetry export could not be encoded
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_target(index: &Option<String>) -> String {
    match index {
        Some(index) => format!("index `{index}`"),
        None => "table".to_string(),
    }
}

fn describe_code(code: &Option<String>) -> &str {
    code.as_deref().unwrap_or("unknown")
}

fn summarize_reasons(reasons: &[CancellationReason]) -> String {
    let failed: Vec<String> = reasons
        .iter()
        .filter(|r| r.code.as_deref().is_some_and(|c| c != "None"))
        .map(|r| format!("#{} {}", r.index, r.code.as_deref().unwrap_or_default()))
        .collect();

    if failed.is_empty() {
        "no item reasons reported".to_string()
    } else {
        failed.join(", ")
    }
}

impl Error {
    /// Whether the failure is transient and the same request may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Throttled { .. })
    }

    /// Check if the error is a failed condition expression
    ///
    /// Useful for detecting optimistic locking failures.
    pub fn is_conditional_check_failed(&self) -> bool {
        matches!(self, Error::ConditionalCheckFailed { .. })
    }

    /// Check if the error was raised locally before reaching the store
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidKey { .. }
                | Error::Validation(_)
                | Error::DuplicatePattern(_)
                | Error::PatternNotFound(_)
                | Error::KeyShapeMismatch { .. }
        )
    }

    /// Check if the error is a serialization/deserialization error
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Error::SerdeDynamo(_) | Error::Json(_))
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Classify an SDK error by transport failure kind and service error code
    pub(crate) fn from_sdk<E>(
        operation: &'static str,
        table: &str,
        kind: OperationKind,
        err: SdkError<E, Response>,
    ) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        match &err {
            SdkError::TimeoutError(_) => {
                return Error::Throttled {
                    operation,
                    message: "request timed out".to_string(),
                };
            }
            SdkError::DispatchFailure(failure) if failure.is_timeout() || failure.is_io() => {
                return Error::Throttled {
                    operation,
                    message: format!("dispatch failure: {err}"),
                };
            }
            _ => {}
        }

        let code = err.as_service_error().and_then(|e| e.code()).map(str::to_owned);
        let message = err
            .as_service_error()
            .and_then(|e| e.message())
            .map(str::to_owned)
            .unwrap_or_else(|| err.to_string());

        match code.as_deref() {
            Some("ConditionalCheckFailedException") => Error::ConditionalCheckFailed {
                operation: kind,
                table: table.to_string(),
            },
            Some(
                "ProvisionedThroughputExceededException"
                | "ThrottlingException"
                | "RequestLimitExceeded"
                | "InternalServerError"
                | "ServiceUnavailable"
                | "TransactionInProgressException",
            ) => Error::Throttled { operation, message },
            Some("ValidationException") => Error::Validation(format!("{operation}: {message}")),
            _ => Error::Store {
                operation,
                code,
                message,
            },
        }
    }
}
