use prismdrive_protocol::FileEntry;

const UNITS: [&str; 3] = ["KB", "MB", "GB"];

/// Human-readable size: bytes below 1 KiB, then one decimal in KB/MB/GB.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Where an upload or folder lands, as shown to the user.
pub fn destination_label(parent_id: Option<u64>) -> String {
    match parent_id {
        Some(id) => format!("folder with ID: {id}"),
        None => "root folder".to_string(),
    }
}

/// Detail lines printed after a successful upload or update.
pub fn entry_lines(entry: &FileEntry) -> Vec<String> {
    let mut lines = vec![format!("  Name: {}", entry.name)];
    if let Some(kind) = &entry.entry_type {
        lines.push(format!("  Type: {kind}"));
    }
    if let Some(size) = entry.file_size {
        lines.push(format!("  Size: {}", format_size(size)));
    }
    if let Some(description) = entry.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(format!("  Description: {description}"));
    }
    lines
}
