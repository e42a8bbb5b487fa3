//! Attachment upload API handler
//!
//! Accepts a multipart form and stores the file under the site directory.
//! Uses the attachment service layer for business logic.

use crate::error::AppError;
use crate::services::attachments::FileService;
use crate::state::SharedState;
use crate::store::FileRecord;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Json,
};
use tracing::{error, info, warn};

/// POST /api/files - Upload an attachment
///
/// Accepts multipart form data with:
/// - `file`: the file content (required)
/// - `is_private`: `1`/`true` stores under `private/files` (default), `0`/`false` under `public/files`
pub async fn upload_file(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileRecord>), AppError> {
    let max_bytes = state.config.uploads.max_upload_bytes;
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut is_private = true;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error!("Failed to read multipart field: {}", e);
        AppError::InvalidRequest(format!("Invalid multipart data: {}", e))
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let file_name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| AppError::InvalidRequest("File name is required".to_string()))?;
                let data = field.bytes().await.map_err(|e| {
                    error!("Failed to read file field: {}", e);
                    AppError::InvalidRequest(format!("Failed to read file: {}", e))
                })?;
                if data.len() > max_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "{} is {} bytes, limit is {}",
                        file_name,
                        data.len(),
                        max_bytes
                    )));
                }
                upload = Some((file_name, data.to_vec()));
            }
            "is_private" => {
                let text = field.text().await.map_err(|e| {
                    AppError::InvalidRequest(format!("Failed to read is_private: {}", e))
                })?;
                is_private = parse_flag(&text).ok_or_else(|| {
                    AppError::InvalidRequest(format!("Invalid is_private value: {}", text))
                })?;
            }
            _ => {
                warn!("Unknown multipart field: {}", field_name);
            }
        }
    }

    let (file_name, content) =
        upload.ok_or_else(|| AppError::InvalidRequest("No file uploaded".to_string()))?;

    let record = FileService::save_upload(
        &state.db,
        &state.config.site.site_dir,
        &file_name,
        &content,
        is_private,
    )
    .await?;
    info!(file_url = %record.file_url, bytes = record.file_size, "Uploaded attachment");

    Ok((StatusCode::CREATED, Json(record)))
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
