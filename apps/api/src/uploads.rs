//! Upload handling: filename hygiene, type/size limits and disk layout.
//!
//! Files are stored under `<upload_dir>/<session_id>/<uuid>_<name>` so a
//! session's documents can be removed with one directory delete.

use std::path::Path;

use uuid::Uuid;

use crate::errors::AppError;
use crate::models::file::FileDescriptor;

pub const MAX_FILE_SIZE_BYTES: usize = 10 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "gif", "bmp", "tiff"];

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_allowed_file_type(filename: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&extension_of(filename).as_str())
}

pub fn mime_type_for(filename: &str) -> &'static str {
    match extension_of(filename).as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Strips any path components and every character that is not alphanumeric,
/// dot, dash or underscore.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw)
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(['_', '.']).is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

pub fn format_file_size(bytes: i64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    let bytes = bytes as f64;
    if bytes >= MB {
        format!("{:.1} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes / KB)
    } else {
        format!("{bytes:.0} B")
    }
}

/// Writes one uploaded document to disk and returns its descriptor.
pub async fn save_upload(
    upload_dir: &str,
    session_id: &str,
    filename: &str,
    data: &[u8],
) -> Result<FileDescriptor, AppError> {
    if !is_allowed_file_type(filename) {
        return Err(AppError::Upload(format!(
            "Unsupported file type: {filename} (allowed: {})",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    if data.is_empty() {
        return Err(AppError::Upload(format!("File {filename} is empty")));
    }
    if data.len() > MAX_FILE_SIZE_BYTES {
        return Err(AppError::Upload(format!(
            "File {filename} exceeds the {} limit",
            format_file_size(MAX_FILE_SIZE_BYTES as i64)
        )));
    }

    let safe_name = sanitize_filename(filename);
    let session_dir = Path::new(upload_dir).join(session_id);
    tokio::fs::create_dir_all(&session_dir)
        .await
        .map_err(|e| AppError::Upload(format!("Cannot create upload directory: {e}")))?;

    let short_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    let stored_name = format!("{short_id}_{safe_name}");
    let storage_path = session_dir.join(&stored_name);
    tokio::fs::write(&storage_path, data)
        .await
        .map_err(|e| AppError::Upload(format!("Cannot store {filename}: {e}")))?;

    Ok(FileDescriptor {
        filename: safe_name,
        storage_path: storage_path.to_string_lossy().into_owned(),
        mime_type: mime_type_for(filename).to_string(),
        size_bytes: data.len() as i64,
        file_id: None,
    })
}
