//! Case media rows. Blobs live in the media store; this table only indexes them.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::repository::{opt_uuid_col, ts, ts_col, uuid_col, Repository};
use crate::errors::AppError;
use crate::models::{CaseMedia, MediaType};

const MEDIA_COLUMNS: &str =
    "id, case_id, media_type, url, storage_key, file_name, file_size, uploaded_by, created_at";

impl Repository {
    // ==================== MEDIA OPERATIONS ====================

    pub async fn insert_media(&self, media: &CaseMedia) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO case_media (id, case_id, media_type, url, storage_key, file_name, file_size, uploaded_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(media.id.to_string())
        .bind(media.case_id.to_string())
        .bind(media.media_type.as_str())
        .bind(&media.url)
        .bind(&media.storage_key)
        .bind(&media.file_name)
        .bind(media.file_size)
        .bind(media.uploaded_by.map(|id| id.to_string()))
        .bind(ts(&media.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_media(&self, id: Uuid) -> Result<Option<CaseMedia>, AppError> {
        let sql = format!("SELECT {} FROM case_media WHERE id = ?", MEDIA_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(media_from_row))
    }

    /// Attachments of a case, oldest first.
    pub async fn list_media(&self, case_id: Uuid) -> Result<Vec<CaseMedia>, AppError> {
        let sql = format!(
            "SELECT {} FROM case_media WHERE case_id = ? ORDER BY created_at ASC, rowid ASC",
            MEDIA_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(case_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(media_from_row).collect())
    }

    /// Returns false when no such row existed.
    pub async fn delete_media(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM case_media WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn media_from_row(row: &SqliteRow) -> CaseMedia {
    let media_type: String = row.get("media_type");
    CaseMedia {
        id: uuid_col(row, "id"),
        case_id: uuid_col(row, "case_id"),
        media_type: MediaType::parse(&media_type).unwrap_or(MediaType::Image),
        url: row.get("url"),
        file_name: row.get("file_name"),
        file_size: row.get("file_size"),
        uploaded_by: opt_uuid_col(row, "uploaded_by"),
        storage_key: row.get("storage_key"),
        created_at: ts_col(row, "created_at"),
    }
}
