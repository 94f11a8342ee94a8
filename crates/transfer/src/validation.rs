use crate::TransferError;

/// Validates a destination path relative to the target folder.
///
/// Remote paths always use `/` separators, so the check is done on the
/// string itself rather than through the host's path rules.
///
/// Rejects:
/// - Empty paths
/// - Absolute paths (`/x`, `\x`)
/// - Drive prefixes (`C:`)
/// - Parent directory traversal (`..`)
/// - Control characters
pub fn validate_relative_path(relative_path: &str) -> Result<(), TransferError> {
    if relative_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    if relative_path.starts_with('/') || relative_path.starts_with('\\') {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {relative_path}"
        )));
    }

    let bytes = relative_path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Err(TransferError::InvalidPath(format!(
            "path prefix not allowed: {relative_path}"
        )));
    }

    if relative_path.chars().any(char::is_control) {
        return Err(TransferError::InvalidPath(
            "control characters not allowed in path".into(),
        ));
    }

    for segment in relative_path.split(['/', '\\']) {
        if segment == ".." {
            return Err(TransferError::InvalidPath(format!(
                "parent directory traversal not allowed: {relative_path}"
            )));
        }
    }

    Ok(())
}

/// Validates the name sent for the file part.
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.trim().is_empty() {
        return Err(TransferError::InvalidRequest("empty file name".into()));
    }
    if name == "." || name == ".." {
        return Err(TransferError::InvalidRequest(format!(
            "reserved file name: {name}"
        )));
    }
    if name.contains(['/', '\\']) || name.chars().any(char::is_control) {
        return Err(TransferError::InvalidRequest(format!(
            "file name must be a single path segment: {name:?}"
        )));
    }
    Ok(())
}
