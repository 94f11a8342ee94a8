//! Endpoint paths, header values and form field names.

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://app.prismdrive.com";

/// `User-Agent` sent with every request.
pub const USER_AGENT: &str = "PrismDriveCLI/0.1.0";

/// Login endpoint (no Authorization header).
pub const LOGIN_ENDPOINT: &str = "/auth/login";

/// Multipart upload endpoint.
pub const UPLOADS_ENDPOINT: &str = "/api/v1/uploads";

/// Folder creation endpoint.
pub const FOLDERS_ENDPOINT: &str = "/api/v1/folders";

/// File entry collection; single entries live at `{FILE_ENTRIES_ENDPOINT}/{id}`.
pub const FILE_ENTRIES_ENDPOINT: &str = "/api/v1/file-entries";

/// Multipart part carrying the file bytes.
pub const FIELD_FILE: &str = "file";

/// Multipart field carrying the destination folder id.
pub const FIELD_PARENT_ID: &str = "parentId";

/// Multipart field carrying the path relative to the destination folder.
pub const FIELD_RELATIVE_PATH: &str = "relativePath";

/// Content type of the file part.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Default upload chunk size: 256 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Maximum number of characters of a raw error body echoed back to the user.
pub const MAX_ERROR_BODY_CHARS: usize = 500;

/// Joins a base URL and an endpoint path with exactly one `/` between them.
pub fn join_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}
