//! Case API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{error, paged, success, ApiResult};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::geo::GeoPoint;
use crate::matcher::{DEFAULT_NEARBY_LIMIT, MAX_NEARBY_LIMIT};
use crate::models::{
    Case, CaseFilter, CaseType, CreateCaseRequest, NearbyCase, PageQuery, UpdateCaseRequest,
};
use crate::AppState;

/// `GET /api/cases/nearby` query. `types` is a comma-separated list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub radius_km: Option<f64>,
    #[serde(default)]
    pub types: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl NearbyQuery {
    fn case_types(&self) -> Result<Vec<CaseType>, AppError> {
        let Some(raw) = self.types.as_deref() else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                CaseType::parse(s)
                    .ok_or_else(|| AppError::Validation(format!("Unknown case type: {}", s)))
            })
            .collect()
    }
}

/// POST /api/cases - Report a new case. Anonymous reports are allowed.
pub async fn create_case(
    State(state): State<AppState>,
    caller: Option<Caller>,
    Json(request): Json<CreateCaseRequest>,
) -> ApiResult<Case> {
    let case = state
        .coordinator
        .create_case(request, caller.map(|c| c.id()))
        .await?;
    success(case)
}

/// GET /api/cases - List cases, newest first.
pub async fn list_cases(
    State(state): State<AppState>,
    Query(filter): Query<CaseFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<Case>> {
    paged(state.repo.list_cases(&filter, &page).await?)
}

/// GET /api/cases/nearby - Active cases around a point, most urgent first.
pub async fn nearby_cases(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> ApiResult<Vec<NearbyCase>> {
    let center = GeoPoint::new(query.lat, query.lng);
    if !center.is_valid() {
        return error(AppError::Validation("Location is out of range".to_string()));
    }

    let radius_km = query.radius_km.unwrap_or(state.config.nearby_radius_km);
    if !(radius_km > 0.0 && radius_km <= state.config.scan_radius_km) {
        return error(AppError::Validation(format!(
            "radiusKm must be greater than 0 and at most {}",
            state.config.scan_radius_km
        )));
    }

    let types = query.case_types()?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_NEARBY_LIMIT)
        .clamp(1, MAX_NEARBY_LIMIT);

    let cases = state
        .matcher
        .nearby_cases(&center, radius_km, &types, limit)
        .await?;
    success(cases)
}

/// GET /api/cases/{id} - Get a single case with its details.
pub async fn get_case(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Case> {
    match state.repo.get_case(id).await {
        Ok(Some(case)) => success(case),
        Ok(None) => error(AppError::case_not_found(id)),
        Err(e) => error(e),
    }
}

/// PUT /api/cases/{id} - Reporter edit.
pub async fn update_case(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCaseRequest>,
) -> ApiResult<Case> {
    success(
        state
            .coordinator
            .update_case(id, caller.id(), request)
            .await?,
    )
}

/// DELETE /api/cases/{id} - Reporter cancels the case.
pub async fn delete_case(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state.coordinator.delete_case(id, caller.id()).await?;
    success(())
}
