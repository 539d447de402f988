//! REST API module.
//!
//! Contains all API routes and handlers. Every handler answers with the
//! `{ success, data }` envelope; list endpoints add `meta`.

mod cases;
mod geocode;
mod media;
mod notifications;
mod timeline;
mod users;
mod volunteers;

pub use cases::*;
pub use geocode::*;
pub use media::*;
pub use notifications::*;
pub use timeline::*;
pub use users::*;
pub use volunteers::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::{Page, PageMeta};

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            meta: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Create a successful paginated response.
pub fn paged<T: Serialize>(page: Page<T>) -> ApiResult<Vec<T>> {
    Ok(ApiResponse {
        success: true,
        data: page.items,
        meta: Some(page.meta),
    })
}

/// Create an error API response.
pub fn error<T: Serialize>(err: AppError) -> ApiResult<T> {
    Err(err)
}
