//! In-app notification inbox.

use axum::extract::{Path, Query, State};
use serde::Serialize;
use uuid::Uuid;

use super::{success, ApiResult};
use crate::auth::Caller;
use crate::errors::{codes, AppError};
use crate::models::{Inbox, PageMeta, PageQuery};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxPage {
    #[serde(flatten)]
    pub inbox: Inbox,
    pub meta: PageMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedRead {
    pub marked: u64,
}

/// GET /api/notifications - The caller's inbox, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<PageQuery>,
) -> ApiResult<InboxPage> {
    let notifications = state.repo.list_notifications(caller.id(), &page).await?;
    let unread_count = state.repo.unread_count(caller.id()).await?;

    success(InboxPage {
        inbox: Inbox {
            notifications: notifications.items,
            unread_count,
        },
        meta: notifications.meta,
    })
}

/// POST /api/notifications/read - Mark the whole inbox read.
pub async fn mark_notifications_read(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<MarkedRead> {
    let marked = state.repo.mark_notifications_read(caller.id()).await?;
    tracing::debug!(user_id = %caller.id(), marked, "Notifications marked read");
    success(MarkedRead { marked })
}

/// POST /api/notifications/{id}/read - Mark one notification read.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<MarkedRead> {
    if !state.repo.mark_notification_read(caller.id(), id).await? {
        return Err(AppError::not_found(
            codes::NOTIFICATION_NOT_FOUND,
            format!("Notification {} not found", id),
        ));
    }
    success(MarkedRead { marked: 1 })
}
