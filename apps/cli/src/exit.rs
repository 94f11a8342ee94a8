use std::process::ExitCode;

use prismdrive_api::ApiError;
use prismdrive_settings::AuthError;
use prismdrive_transfer::{FailureKind, FailureReport};

pub const SUCCESS: u8 = 0;
pub const FAILURE: u8 = 1;
pub const UNAUTHORIZED: u8 = 3;
/// `EX_SOFTWARE` from sysexits.
pub const INTERNAL: u8 = 70;
/// 128 + SIGINT.
pub const CANCELLED: u8 = 130;

/// A streaming upload that ended in failure after all attempts.
#[derive(Debug, thiserror::Error)]
#[error("{report}")]
pub struct UploadFailed {
    pub report: FailureReport,
}

/// Maps a command error onto the process exit status.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(failed) = err.downcast_ref::<UploadFailed>() {
        return match failed.report.kind {
            FailureKind::Unauthorized => UNAUTHORIZED,
            FailureKind::Cancelled => CANCELLED,
            FailureKind::InternalInvariantViolation => INTERNAL,
            _ => FAILURE,
        };
    }
    if err.downcast_ref::<AuthError>().is_some() {
        return UNAUTHORIZED;
    }
    if let Some(api) = err.downcast_ref::<ApiError>() {
        if api.is_unauthorized() {
            return UNAUTHORIZED;
        }
    }
    FAILURE
}

pub fn to_exit_code(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::from(SUCCESS),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}
