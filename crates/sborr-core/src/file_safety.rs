//! File handling for uploads: extension parsing, content type detection,
//! storage path naming and basic safety checks.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use uuid::Uuid;

/// Blocked file extensions (case-insensitive)
static BLOCKED_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Windows executables
        "exe", "dll", "scr", "pif", "com", "msi", "bat", "cmd",
        // Unix binaries and packages
        "so", "dylib", "deb", "rpm", "apk", "app", "dmg", "pkg",
        // Office macros
        "xlsm", "docm", "pptm",
        // Other dangerous
        "jar", "lnk", "hta",
    ]
    .into_iter()
    .collect()
});

/// Result of file safety validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub allowed: bool,
    pub block_reason: Option<String>,
}

impl ValidationResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            block_reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            block_reason: Some(reason.into()),
        }
    }
}

/// Validate an upload before it leaves the device.
pub fn validate_file(uri: &str, data: &[u8], max_size_bytes: u64) -> ValidationResult {
    if data.is_empty() {
        return ValidationResult::blocked("File is empty");
    }

    if data.len() as u64 > max_size_bytes {
        return ValidationResult::blocked(format!(
            "File exceeds maximum size of {} bytes",
            max_size_bytes
        ));
    }

    if let Some(ext) = file_extension(uri) {
        if BLOCKED_EXTENSIONS.contains(ext.as_str()) {
            return ValidationResult::blocked(format!("File extension .{} is not allowed", ext));
        }
    }

    ValidationResult::allowed()
}

/// Lowercased extension of the last path segment of a URI.
///
/// Query strings and fragments are ignored; a name without a dot has no
/// extension.
pub fn file_extension(uri: &str) -> Option<String> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Detect the content type of an upload.
///
/// Magic bytes win, then the URI's extension, then `fallback`.
pub fn detect_content_type(uri: &str, data: &[u8], fallback: &str) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    if let Some(mime) = file_extension(uri).and_then(|ext| mime_from_extension(&ext)) {
        return mime.to_string();
    }

    fallback.to_string()
}

/// Extension-based lookup for the formats council staff upload.
fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "pdf" => Some("application/pdf"),
        "doc" => Some("application/msword"),
        "docx" => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        "xls" => Some("application/vnd.ms-excel"),
        "xlsx" => Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        "ppt" => Some("application/vnd.ms-powerpoint"),
        "pptx" => {
            Some("application/vnd.openxmlformats-officedocument.presentationml.presentation")
        }
        "odt" => Some("application/vnd.oasis.opendocument.text"),
        "rtf" => Some("application/rtf"),
        "txt" => Some("text/plain"),
        "csv" => Some("text/csv"),
        "md" => Some("text/markdown"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Object path for an uploaded document: `documents/{millis}.{ext}`.
///
/// Returns `(file_name, storage_path)`.
pub fn document_storage_path(uri: &str, epoch_millis: i64) -> (String, String) {
    let file_name = match file_extension(uri) {
        Some(ext) => format!("{}.{}", epoch_millis, ext),
        None => epoch_millis.to_string(),
    };
    let path = format!("documents/{}", file_name);
    (file_name, path)
}

/// Object path for an avatar: `avatars/{user_id}-{millis}.{ext}`, `jpg` when
/// the URI has no extension.
pub fn avatar_storage_path(uri: &str, user_id: Uuid, epoch_millis: i64) -> String {
    let ext = file_extension(uri).unwrap_or_else(|| crate::defaults::AVATAR_EXTENSION.to_string());
    format!("avatars/{}-{}.{}", user_id, epoch_millis, ext)
}
