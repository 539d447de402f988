//! User profile API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::{error, paged, success, ApiResult};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::geo::GeoPoint;
use crate::models::{
    Case, CreateUserRequest, PageQuery, Preferences, PushToken, RegisterPushTokenRequest,
    UpdateAvailabilityRequest, UpdateLocationRequest, UpdatePreferencesRequest,
    UpdateUserRequest, User, UserStats,
};
use crate::AppState;

/// POST /api/users - Register a user.
pub async fn create_user(
    State(state): State<AppState>,
    Json(mut request): Json<CreateUserRequest>,
) -> ApiResult<User> {
    request.display_name = request.display_name.trim().to_string();
    if request.display_name.is_empty() {
        return error(AppError::Validation(
            "Display name is required".to_string(),
        ));
    }

    let user = state.repo.create_user(&request).await?;
    tracing::info!(user_id = %user.id, "User registered");
    success(user)
}

/// GET /api/users/{id} - Get a single user.
pub async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<User> {
    match state.repo.get_user(id).await {
        Ok(Some(user)) => success(user),
        Ok(None) => error(AppError::user_not_found(id)),
        Err(e) => error(e),
    }
}

/// PUT /api/users/{id} - Edit display name, email or phone.
pub async fn update_user(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<User> {
    caller.ensure_is(id)?;
    let patch = request.normalized()?;
    let user = state.repo.update_profile(id, &patch).await?;
    tracing::info!(user_id = %id, "Profile updated");
    success(user)
}

/// GET /api/users/{id}/stats
pub async fn user_stats(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<UserStats> {
    success(state.repo.user_stats(id).await?)
}

/// PUT /api/users/{id}/location - Report the volunteer's live position.
pub async fn update_location(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateLocationRequest>,
) -> ApiResult<User> {
    caller.ensure_is(id)?;

    let point = GeoPoint::new(request.latitude, request.longitude);
    if !point.is_valid() {
        return error(AppError::Validation("Location is out of range".to_string()));
    }
    success(state.repo.update_location(id, point).await?)
}

/// PUT /api/users/{id}/availability - Toggle whether the user takes alerts.
pub async fn update_availability(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateAvailabilityRequest>,
) -> ApiResult<User> {
    caller.ensure_is(id)?;
    let user = state.repo.set_availability(id, request.is_available).await?;
    tracing::info!(user_id = %id, available = request.is_available, "Availability changed");
    success(user)
}

/// GET /api/users/{id}/preferences
pub async fn get_preferences(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Preferences> {
    state.repo.require_user(id).await?;
    success(state.repo.get_preferences(id).await?)
}

/// PUT /api/users/{id}/preferences - Partial update.
pub async fn update_preferences(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePreferencesRequest>,
) -> ApiResult<Preferences> {
    caller.ensure_is(id)?;
    state.repo.require_user(id).await?;

    let current = state.repo.get_preferences(id).await?;
    let next = request.apply_to(&current)?;
    state.repo.save_preferences(id, &next).await?;
    success(next)
}

/// GET /api/users/{id}/cases/reported
pub async fn reported_cases(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<Case>> {
    state.repo.require_user(id).await?;
    paged(state.repo.reported_cases(id, &page).await?)
}

/// GET /api/users/{id}/cases/accepted
pub async fn accepted_cases(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<Case>> {
    state.repo.require_user(id).await?;
    paged(state.repo.accepted_cases(id, &page).await?)
}

#[derive(Debug, Serialize)]
pub struct Removed {
    pub removed: bool,
}

/// POST /api/users/{id}/push-tokens - Register this device for push alerts.
pub async fn register_push_token(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(request): Json<RegisterPushTokenRequest>,
) -> ApiResult<PushToken> {
    caller.ensure_is(id)?;
    if request.token.trim().is_empty() {
        return error(AppError::Validation("token is required".to_string()));
    }
    state.repo.require_user(id).await?;

    let token = state.repo.register_push_token(id, &request).await?;
    tracing::info!(user_id = %id, platform = token.platform.as_str(), "Push token registered");
    success(token)
}

/// DELETE /api/users/{id}/push-tokens/{token} - Forget a device. Idempotent.
pub async fn delete_push_token(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, token)): Path<(Uuid, String)>,
) -> ApiResult<Removed> {
    caller.ensure_is(id)?;
    let removed = state.repo.delete_push_token(id, &token).await?;
    success(Removed { removed })
}
