//! Wire types for the PrismDrive REST API.
//!
//! Shared by the plain request/response client (`prismdrive-api`) and the
//! streaming transfer engine (`prismdrive-transfer`) so both decode server
//! answers the same way.

pub mod constants;
pub mod envelope;
pub mod types;

// Re-export primary types for convenience.
pub use envelope::{ApiErrorBody, ProtocolError, decode_entry, summarize_error};
pub use types::{
    CreateFolderRequest, FileEntry, LoginRequest, LoginResponse, LoginUser, Token,
    UpdateEntryRequest,
};
