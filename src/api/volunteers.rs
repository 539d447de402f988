//! Volunteer participation endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use super::{error, success, ApiResult};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::geo::GeoPoint;
use crate::models::{AcceptCaseRequest, CaseVolunteer, UpdateVolunteerStatusRequest};
use crate::AppState;

/// POST /api/cases/{id}/accept - Join a case. The body may carry the
/// volunteer's position to record the distance at acceptance.
pub async fn accept_case(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(request): Json<AcceptCaseRequest>,
) -> ApiResult<CaseVolunteer> {
    let location = match (request.latitude, request.longitude) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
        (None, None) => None,
        _ => {
            return error(AppError::Validation(
                "latitude and longitude must be sent together".to_string(),
            ))
        }
    };

    success(
        state
            .coordinator
            .accept_case(id, caller.id(), location)
            .await?,
    )
}

/// POST /api/cases/{id}/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state.coordinator.withdraw(id, caller.id()).await?;
    success(())
}

/// PUT /api/cases/{id}/volunteer-status
pub async fn update_volunteer_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateVolunteerStatusRequest>,
) -> ApiResult<CaseVolunteer> {
    success(
        state
            .coordinator
            .update_volunteer_status(id, caller.id(), request.status, request.note)
            .await?,
    )
}

/// GET /api/cases/{id}/volunteers - Engaged volunteers, withdrawn excluded.
pub async fn list_volunteers(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<CaseVolunteer>> {
    state.repo.require_case(id).await?;
    success(state.repo.list_volunteers(id).await?)
}
