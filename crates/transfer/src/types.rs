use std::fmt;
use std::path::{Path, PathBuf};

use prismdrive_protocol::constants::join_url;
use prismdrive_protocol::{FileEntry, Token};

use crate::{FailureKind, TransferError};

/// A progress notification: bytes read from the source so far, and the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub transferred: u64,
    pub total: u64,
}

impl ProgressEvent {
    /// Percentage complete (0.0 - 100.0). A zero-byte transfer is complete.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.transferred as f64 / self.total as f64) * 100.0
    }
}

/// Where an upload lands on the remote side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destination {
    /// Folder id; `None` means the drive root.
    pub parent_id: Option<u64>,
    /// Path under the folder, creating intermediate folders on the server.
    pub relative_path: Option<String>,
}

impl Destination {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn folder(parent_id: u64) -> Self {
        Self {
            parent_id: Some(parent_id),
            relative_path: None,
        }
    }

    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = Some(relative_path.into());
        self
    }
}

/// Server and credential for a single transfer.
///
/// Passed per call, so concurrent transfers can target different accounts.
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    base_url: String,
    token: Token,
}

impl RemoteTarget {
    pub fn new(base_url: impl Into<String>, token: Token) -> Self {
        Self {
            base_url: base_url.into(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub(crate) fn url(&self, endpoint: &str) -> String {
        join_url(&self.base_url, endpoint)
    }
}

/// Immutable description of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    local_path: PathBuf,
    byte_length: u64,
    file_name: Option<String>,
    parent_id: Option<u64>,
    relative_path: Option<String>,
}

impl TransferRequest {
    /// `byte_length` must equal what the source will yield.
    pub fn new(local_path: impl Into<PathBuf>, byte_length: u64) -> Self {
        Self {
            local_path: local_path.into(),
            byte_length,
            file_name: None,
            parent_id: None,
            relative_path: None,
        }
    }

    /// Applies a [`Destination`].
    pub fn to(self, destination: &Destination) -> Self {
        self.with_parent_id(destination.parent_id)
            .with_relative_path(destination.relative_path.clone())
    }

    pub fn with_parent_id(mut self, parent_id: Option<u64>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_relative_path(mut self, relative_path: Option<String>) -> Self {
        self.relative_path = relative_path;
        self
    }

    /// Overrides the name sent for the file part (defaults to the path's
    /// last component).
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn byte_length(&self) -> u64 {
        self.byte_length
    }

    pub fn remote_name(&self) -> Option<String> {
        self.file_name
            .clone()
            .or_else(|| crate::source::file_name_of(&self.local_path))
    }

    pub fn parent_id(&self) -> Option<u64> {
        self.parent_id
    }

    pub fn relative_path(&self) -> Option<&str> {
        self.relative_path.as_deref()
    }
}

/// Failure produced by the executor, before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub kind: FailureKind,
    /// HTTP status, when the server answered.
    pub status: Option<u16>,
    pub message: String,
    /// Per-field messages for validation failures.
    pub details: Vec<String>,
}

impl TransferFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

impl From<TransferError> for TransferFailure {
    fn from(err: TransferError) -> Self {
        TransferFailure::new(err.kind(), err.to_string())
    }
}

/// Raw result of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferResult {
    Success(FileEntry),
    Failure(TransferFailure),
}

impl TransferResult {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        TransferResult::Failure(TransferFailure::new(kind, message))
    }
}

impl From<TransferError> for TransferResult {
    fn from(err: TransferError) -> Self {
        TransferResult::Failure(err.into())
    }
}

/// Final, reconciled outcome handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed { entry: FileEntry, bytes: u64 },
    Failed(FailureReport),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Completed { .. })
    }

    pub fn entry(&self) -> Option<&FileEntry> {
        match self {
            TransferOutcome::Completed { entry, .. } => Some(entry),
            TransferOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        match self {
            TransferOutcome::Completed { .. } => None,
            TransferOutcome::Failed(report) => Some(report),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure().map(|r| r.kind)
    }
}

/// Caller-facing description of a failed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub kind: FailureKind,
    pub status: Option<u16>,
    /// Message for the user, chosen by failure kind.
    pub message: String,
    pub details: Vec<String>,
    /// Bytes read from the source before the transfer ended.
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl FailureReport {
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for detail in &self.details {
            write!(f, "\n  - {detail}")?;
        }
        Ok(())
    }
}
