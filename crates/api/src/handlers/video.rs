//! Video upload handling.
//!
//! Uploads are streamed to the artifact directory chunk by chunk with
//! the size cap enforced mid-stream, so an oversized body never lands
//! fully on disk. Extension checks live in `iva_core::submission`.

use std::path::Path;

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use iva_core::submission::validate_video_extension;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub video_id: Uuid,
    pub metadata: UploadMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub file_name: String,
    pub size: u64,
    pub content_type: Option<String>,
}

/// POST /api/video/upload
///
/// Accepts a multipart form with a `file` field. The stored name is
/// `{video_id}.{ext}` so later submissions can address the video by id
/// alone.
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .ok_or_else(|| AppError::BadRequest("Upload is missing a file name".to_string()))?
            .to_string();
        validate_video_extension(&file_name)?;
        let ext = Path::new(&file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4")
            .to_ascii_lowercase();
        let content_type = field.content_type().map(str::to_string);

        let video_id = Uuid::new_v4();
        let dest = state.config.artifact_dir.join(format!("{video_id}.{ext}"));

        tokio::fs::create_dir_all(&state.config.artifact_dir)
            .await
            .map_err(|e| AppError::InternalError(format!("Cannot create artifact dir: {e}")))?;
        let mut file = tokio::fs::File::create(&dest)
            .await
            .map_err(|e| AppError::InternalError(format!("Cannot create upload file: {e}")))?;

        let mut total: u64 = 0;
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&dest).await;
                    return Err(AppError::BadRequest(format!("Upload aborted: {e}")));
                }
            };
            total += chunk.len() as u64;
            if total > state.config.max_upload_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(&dest).await;
                return Err(AppError::BadRequest(format!(
                    "File too large. Maximum size: {} MB",
                    state.config.max_upload_bytes / (1024 * 1024)
                )));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| AppError::InternalError(format!("Failed to store upload: {e}")))?;
        }
        file.flush()
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to store upload: {e}")))?;

        tracing::info!(
            video_id = %video_id,
            file = %file_name,
            size = total,
            "Video uploaded",
        );

        return Ok(Json(UploadResponse {
            video_id,
            metadata: UploadMetadata {
                file_name,
                size: total,
                content_type,
            },
        }));
    }

    Err(AppError::BadRequest(
        "Multipart body has no `file` field".to_string(),
    ))
}
