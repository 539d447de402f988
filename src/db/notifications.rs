//! In-app notification inbox.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::repository::{opt_uuid_col, parse_enum, ts, ts_col, uuid_col, Repository};
use crate::errors::AppError;
use crate::models::{
    Notification, NotificationPayload, NotificationType, Page, PageQuery,
};

impl Repository {
    // ==================== NOTIFICATION OPERATIONS ====================

    /// Store one inbox row per recipient in a single transaction.
    pub async fn insert_notifications(
        &self,
        user_ids: &[Uuid],
        payload: &NotificationPayload,
    ) -> Result<(), AppError> {
        let now = ts(&Utc::now());
        let mut tx = self.pool.begin().await?;

        for user_id in user_ids {
            sqlx::query(
                r#"
                INSERT INTO notifications (id, user_id, type, title, body, case_id, case_type, urgency, distance_km, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(user_id.to_string())
            .bind(payload.kind.as_str())
            .bind(&payload.title)
            .bind(&payload.body)
            .bind(payload.case_id.map(|id| id.to_string()))
            .bind(payload.case_type.map(|t| t.as_str()))
            .bind(payload.urgency.map(|u| u.as_str()))
            .bind(payload.distance_km)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// A user's inbox, newest first.
    pub async fn list_notifications(
        &self,
        user_id: Uuid,
        page: &PageQuery,
    ) -> Result<Page<Notification>, AppError> {
        let total: i64 =
            sqlx::query("SELECT COUNT(*) AS total FROM notifications WHERE user_id = ?")
                .bind(user_id.to_string())
                .fetch_one(&self.pool)
                .await?
                .get("total");

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, type, title, body, case_id, case_type, urgency, distance_km, is_read, created_at
            FROM notifications
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(page.limit() as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(
            rows.iter().map(notification_from_row).collect(),
            page,
            total,
        ))
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS unread FROM notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("unread"))
    }

    /// Mark every notification of the user read.
    pub async fn mark_notifications_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Mark one of the user's notifications read. Returns false when the user
    /// has no such notification.
    pub async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn notification_from_row(row: &SqliteRow) -> Notification {
    let kind: String = row.get("type");
    let case_type: Option<String> = row.get("case_type");
    let urgency: Option<String> = row.get("urgency");
    let is_read: i32 = row.get("is_read");

    Notification {
        id: uuid_col(row, "id"),
        user_id: uuid_col(row, "user_id"),
        payload: NotificationPayload {
            kind: NotificationType::parse(&kind).unwrap_or(NotificationType::System),
            title: row.get("title"),
            body: row.get("body"),
            case_id: opt_uuid_col(row, "case_id"),
            case_type: case_type.as_deref().and_then(parse_enum),
            urgency: urgency.as_deref().and_then(parse_enum),
            distance_km: row.get("distance_km"),
        },
        is_read: is_read != 0,
        created_at: ts_col(row, "created_at"),
    }
}
