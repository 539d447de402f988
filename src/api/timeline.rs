//! Case timeline and comment endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use super::{error, paged, success, ApiResult};
use crate::auth::Caller;
use crate::errors::{codes, AppError};
use crate::models::{
    CaseUpdate, Comment, CreateCommentRequest, PageQuery, PostUpdateRequest,
};
use crate::AppState;

const MAX_COMMENT_LEN: usize = 2000;

/// GET /api/cases/{id}/updates - Timeline, newest first.
pub async fn list_updates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<CaseUpdate>> {
    state.repo.require_case(id).await?;
    paged(state.repo.list_updates(id, &page).await?)
}

/// POST /api/cases/{id}/updates
pub async fn post_update(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(request): Json<PostUpdateRequest>,
) -> ApiResult<CaseUpdate> {
    success(
        state
            .coordinator
            .post_update(id, caller.id(), &request.content)
            .await?,
    )
}

/// GET /api/cases/{id}/comments - Oldest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<Comment>> {
    state.repo.require_case(id).await?;
    paged(state.repo.list_comments(id, &page).await?)
}

/// POST /api/cases/{id}/comments
pub async fn create_comment(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateCommentRequest>,
) -> ApiResult<Comment> {
    let content = request.content.trim();
    if content.is_empty() || content.len() > MAX_COMMENT_LEN {
        return error(AppError::Validation(format!(
            "Comment must be 1 to {} characters",
            MAX_COMMENT_LEN
        )));
    }

    state.repo.require_case(id).await?;
    state.repo.require_user(caller.id()).await?;
    success(state.repo.create_comment(id, caller.id(), content).await?)
}

/// DELETE /api/comments/{id} - Author only.
pub async fn delete_comment(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let Some(comment) = state.repo.get_comment(id).await? else {
        return error(AppError::NotFound {
            code: codes::COMMENT_NOT_FOUND,
            message: format!("Comment {} not found", id),
        });
    };
    if comment.user_id != caller.id() {
        return error(AppError::Forbidden(
            "Only the author can delete this comment".to_string(),
        ));
    }

    state.repo.delete_comment(id).await?;
    success(())
}
