//! Case attachments: validation, blob storage and the index rows.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::db::Repository;
use crate::errors::{codes, AppError};
use crate::models::{Case, CaseMedia, MediaType, MediaUpload, VolunteerStatus};
use crate::storage::MediaStore;

#[derive(Clone)]
pub struct MediaService {
    repo: Arc<Repository>,
    store: Arc<dyn MediaStore>,
    max_bytes: usize,
}

impl MediaService {
    pub fn new(repo: Arc<Repository>, store: Arc<dyn MediaStore>, max_bytes: usize) -> Self {
        Self {
            repo,
            store,
            max_bytes,
        }
    }

    /// Attach files to a case. Every file is checked before any is stored, so a
    /// bad file rejects the whole request.
    pub async fn upload(
        &self,
        case_id: Uuid,
        uploader: Uuid,
        files: Vec<MediaUpload>,
    ) -> Result<Vec<CaseMedia>, AppError> {
        if files.is_empty() {
            return Err(AppError::Validation("At least one file is required".to_string()));
        }

        let case = self.repo.require_case(case_id).await?;
        self.ensure_involved(&case, uploader).await?;

        let mut checked = Vec::with_capacity(files.len());
        for file in files {
            let kind = self.check(&file)?;
            checked.push((file, kind));
        }

        let mut stored = Vec::with_capacity(checked.len());
        for (file, (media_type, ext)) in checked {
            let id = Uuid::new_v4();
            let key = format!("cases/{}/{}.{}", case_id, id, ext);
            let url = self
                .store
                .put(&key, &file.bytes, file.content_type.as_deref())
                .await?;

            let media = CaseMedia {
                id,
                case_id,
                media_type,
                url,
                file_name: file.file_name,
                file_size: file.bytes.len() as i64,
                uploaded_by: Some(uploader),
                storage_key: key,
                created_at: Utc::now(),
            };

            if let Err(e) = self.repo.insert_media(&media).await {
                if let Err(cleanup) = self.store.delete(&media.storage_key).await {
                    tracing::warn!(key = %media.storage_key, error = %cleanup, "Orphaned media blob");
                }
                return Err(e);
            }

            tracing::info!(
                case_id = %case_id,
                media_id = %media.id,
                media_type = media.media_type.as_str(),
                size = media.file_size,
                "Media uploaded"
            );
            stored.push(media);
        }

        Ok(stored)
    }

    pub async fn list(&self, case_id: Uuid) -> Result<Vec<CaseMedia>, AppError> {
        self.repo.require_case(case_id).await?;
        self.repo.list_media(case_id).await
    }

    /// Remove an attachment. Allowed for its uploader and the case reporter.
    pub async fn delete(&self, media_id: Uuid, requester: Uuid) -> Result<(), AppError> {
        let media = self
            .repo
            .get_media(media_id)
            .await?
            .ok_or_else(|| media_not_found(media_id))?;

        if media.uploaded_by != Some(requester) {
            let reporter = self
                .repo
                .get_case(media.case_id)
                .await?
                .is_some_and(|case| case.is_reported_by(requester));
            if !reporter {
                return Err(AppError::Forbidden(
                    "Only the uploader or the reporter can delete this media".to_string(),
                ));
            }
        }

        if !self.repo.delete_media(media_id).await? {
            return Err(media_not_found(media_id));
        }
        if let Err(e) = self.store.delete(&media.storage_key).await {
            tracing::warn!(media_id = %media_id, error = %e, "Failed to delete media blob");
        }

        tracing::info!(media_id = %media_id, case_id = %media.case_id, "Media deleted");
        Ok(())
    }

    fn check(&self, file: &MediaUpload) -> Result<(MediaType, String), AppError> {
        if file.bytes.is_empty() {
            return Err(AppError::Validation(format!("{} is empty", file.file_name)));
        }
        if file.bytes.len() > self.max_bytes {
            return Err(AppError::rejected(
                codes::FILE_TOO_LARGE,
                format!(
                    "{} exceeds the upload limit of {} bytes",
                    file.file_name, self.max_bytes
                ),
            ));
        }
        MediaType::from_file_name(&file.file_name).ok_or_else(|| {
            AppError::rejected(
                codes::INVALID_FILE_TYPE,
                format!("{} is not an allowed image or video", file.file_name),
            )
        })
    }

    /// Uploads come from the reporter or a volunteer still on the case.
    async fn ensure_involved(&self, case: &Case, user_id: Uuid) -> Result<(), AppError> {
        if case.is_reported_by(user_id) {
            return Ok(());
        }
        match self.repo.get_volunteer(case.id, user_id).await? {
            Some(record) if record.status != VolunteerStatus::Withdrawn => Ok(()),
            _ => Err(AppError::Forbidden(
                "Only the reporter or an engaged volunteer can upload media".to_string(),
            )),
        }
    }
}

fn media_not_found(id: Uuid) -> AppError {
    AppError::not_found(codes::MEDIA_NOT_FOUND, format!("Media {} not found", id))
}
