use tracing::{error, info, warn};

use crate::source::ByteSourceHandle;
use crate::{FailureKind, FailureReport, TransferFailure, TransferOutcome, TransferResult};

/// Turns an execution result into the caller-facing outcome.
///
/// The only component that closes a [`ByteSourceHandle`]; it takes the
/// handle by value, so each handle is closed exactly once.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompletionReconciler;

impl CompletionReconciler {
    pub fn reconcile(&self, result: TransferResult, handle: ByteSourceHandle) -> TransferOutcome {
        let sent = handle.consumed();
        let total = handle.size();
        let label = handle.label().to_string();

        if let Err(e) = handle.close() {
            warn!(source = %label, error = %e, "failed to close source");
        }

        // A server answer that breaks the length invariant is reported, not asserted.
        let (failure, engine_fault) = match result {
            TransferResult::Success(entry) if sent == total => {
                info!(source = %label, id = entry.id, bytes = total, "upload complete");
                return TransferOutcome::Completed {
                    entry,
                    bytes: total,
                };
            }
            TransferResult::Success(entry) => (
                TransferFailure::new(
                    FailureKind::InternalInvariantViolation,
                    format!(
                        "server confirmed entry {} after only {sent} of {total} bytes were read",
                        entry.id
                    ),
                ),
                false,
            ),
            TransferResult::Failure(failure) => {
                let engine_fault = failure.kind == FailureKind::InternalInvariantViolation;
                (failure, engine_fault)
            }
        };

        let report = FailureReport {
            kind: failure.kind,
            status: failure.status,
            message: user_message(&failure, sent, total),
            details: failure.details,
            bytes_sent: sent,
            total_bytes: total,
        };

        match report.kind {
            FailureKind::InternalInvariantViolation => {
                error!(source = %label, detail = %failure.message, "transfer invariant violated");
                debug_assert!(!engine_fault, "transfer invariant violated: {}", failure.message);
            }
            FailureKind::Cancelled => info!(source = %label, sent, total, "upload cancelled"),
            kind => warn!(
                source = %label,
                kind = %kind,
                status = ?report.status,
                sent,
                total,
                detail = %failure.message,
                "upload failed"
            ),
        }
        TransferOutcome::Failed(report)
    }
}

pub(crate) fn user_message(failure: &TransferFailure, sent: u64, total: u64) -> String {
    let detail = &failure.message;
    match failure.kind {
        FailureKind::IoError => format!("could not read the local file: {detail}"),
        FailureKind::ValidationError => format!("the upload was rejected as invalid: {detail}"),
        FailureKind::Unauthorized => {
            format!("not authorized ({detail}); run `prismdrive login` and try again")
        }
        FailureKind::ClientError => match failure.status {
            Some(status) => format!("the server refused the upload (HTTP {status}): {detail}"),
            None => format!("the server refused the upload: {detail}"),
        },
        FailureKind::TransientError => {
            format!("the upload was interrupted after {sent} of {total} bytes: {detail}")
        }
        FailureKind::Cancelled => format!("upload cancelled after {sent} of {total} bytes"),
        FailureKind::UnexpectedResponse => format!("unexpected server response: {detail}"),
        FailureKind::InternalInvariantViolation => format!("internal error: {detail}"),
    }
}
