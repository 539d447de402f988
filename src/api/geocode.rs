//! Address lookup endpoints.

use axum::extract::{Query, State};
use serde::Deserialize;

use super::{error, success, ApiResult};
use crate::errors::AppError;
use crate::geo::GeoPoint;
use crate::geocode::Address;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReverseQuery {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

/// GET /api/geocode/reverse?lat=&lng= - `data` is null when nothing is there.
pub async fn reverse_geocode(
    State(state): State<AppState>,
    Query(query): Query<ReverseQuery>,
) -> ApiResult<Option<Address>> {
    let point = GeoPoint::new(query.lat, query.lng);
    if !point.is_valid() {
        return error(AppError::Validation("Location is out of range".to_string()));
    }
    success(state.geocoder.reverse(point).await?)
}

/// GET /api/geocode/search?q=
pub async fn search_address(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<Address>> {
    let q = query.q.trim();
    if q.is_empty() {
        return error(AppError::Validation("Query is required".to_string()));
    }
    success(state.geocoder.search(q).await?)
}
