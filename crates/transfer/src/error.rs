//! Error and failure taxonomy for the transfer engine.

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised inside the pipeline before they are folded into a
/// terminal [`TransferResult`](crate::TransferResult).
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("declared length {declared} does not match source length {actual}")]
    LengthMismatch { declared: u64, actual: u64 },

    #[error("source ended after {read} of {expected} bytes")]
    SourceTruncated { read: u64, expected: u64 },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("server stopped reading the upload for {0:?}")]
    Stalled(Duration),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

impl TransferError {
    /// Maps the error onto the failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            TransferError::Io(_)
            | TransferError::NotFound(_)
            | TransferError::PermissionDenied(_)
            | TransferError::NotAFile(_)
            | TransferError::SourceTruncated { .. } => FailureKind::IoError,
            TransferError::LengthMismatch { .. }
            | TransferError::InvalidPath(_)
            | TransferError::InvalidRequest(_) => FailureKind::ValidationError,
            TransferError::Http(e) if e.is_builder() => FailureKind::ValidationError,
            TransferError::Http(_) | TransferError::Stalled(_) => FailureKind::TransientError,
            TransferError::InvariantViolation(_) => FailureKind::InternalInvariantViolation,
        }
    }
}

/// Kind of a failed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Local file unreadable or vanished. Not retried.
    IoError,
    /// Bad request shape (422, length mismatch, invalid path). User must fix input.
    ValidationError,
    /// Token invalid or expired (401). Caller should log in again.
    Unauthorized,
    /// Any other 4xx.
    ClientError,
    /// 5xx, connection reset, timeout. Safe to retry with backoff.
    TransientError,
    /// Aborted through the cancellation token.
    Cancelled,
    /// The server answered with something that is not a decodable entry.
    UnexpectedResponse,
    /// A pipeline invariant was broken. Always a bug.
    InternalInvariantViolation,
}

impl FailureKind {
    /// Only transient failures are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::TransientError)
    }

    /// Short machine-friendly name.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::IoError => "io_error",
            FailureKind::ValidationError => "validation_error",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::ClientError => "client_error",
            FailureKind::TransientError => "transient_error",
            FailureKind::Cancelled => "cancelled",
            FailureKind::UnexpectedResponse => "unexpected_response",
            FailureKind::InternalInvariantViolation => "internal_invariant_violation",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
