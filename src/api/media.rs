//! Case media endpoints.

use axum::extract::{multipart::MultipartError, Multipart, Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use super::{success, ApiResult};
use crate::auth::Caller;
use crate::errors::{codes, AppError};
use crate::models::{CaseMedia, MediaUpload};
use crate::AppState;

/// Files accepted in one upload request.
pub const MAX_FILES_PER_UPLOAD: usize = 5;

/// POST /api/cases/{id}/media - multipart upload; every `file` (or `files`)
/// part becomes one attachment.
pub async fn upload_media(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<Vec<CaseMedia>> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if !matches!(field.name(), Some("file") | Some("files")) {
            continue;
        }
        if files.len() == MAX_FILES_PER_UPLOAD {
            return Err(AppError::Validation(format!(
                "At most {} files per upload",
                MAX_FILES_PER_UPLOAD
            )));
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("File part has no file name".to_string()))?;
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        files.push(MediaUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    success(state.media.upload(id, caller.id(), files).await?)
}

/// GET /api/cases/{id}/media - Attachments, oldest first.
pub async fn list_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<CaseMedia>> {
    success(state.media.list(id).await?)
}

/// DELETE /api/media/{id}
pub async fn delete_media(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state.media.delete(id, caller.id()).await?;
    success(())
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::rejected(codes::FILE_TOO_LARGE, "Upload is too large")
    } else {
        AppError::Validation(format!("Malformed upload: {}", err.body_text()))
    }
}
