//! PSK-based authentication and caller identity.
//!
//! The pre-shared key check uses constant-time comparison to mitigate timing
//! attacks. The calling user is asserted by the upstream gateway in the
//! `x-user-id` header.

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::errors::AppError;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// PSK authentication layer function that takes the expected PSK as a parameter.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    // If no PSK is configured, allow all requests (dev mode)
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            // Also accept the key as a bearer token
            request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        })
        .map(|s| s.to_string());

    match provided {
        Some(key) if constant_time_compare(&key, &expected) => next.run(request).await,
        Some(_) => AppError::Unauthorized("Invalid API key".to_string()).into_response(),
        None => AppError::Unauthorized("Missing API key".to_string()).into_response(),
    }
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// The authenticated user making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Uuid);

impl Caller {
    pub fn id(&self) -> Uuid {
        self.0
    }

    /// Fail with `Forbidden` unless the caller is `user_id`.
    pub fn ensure_is(&self, user_id: Uuid) -> Result<(), AppError> {
        if self.0 == user_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You can only change your own profile".to_string(),
            ))
        }
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing x-user-id header".to_string()))?;

        Uuid::parse_str(raw.trim())
            .map(Caller)
            .map_err(|_| AppError::Unauthorized("Malformed x-user-id header".to_string()))
    }
}

/// Anonymous callers are allowed where the route accepts them; a header that is
/// present but malformed is still rejected.
impl<S> OptionalFromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        if !parts.headers.contains_key(USER_ID_HEADER) {
            return Ok(None);
        }
        <Caller as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    #[test]
    fn test_constant_time_compare_equal() {
        assert!(constant_time_compare("test-key-123", "test-key-123"));
    }

    #[test]
    fn test_constant_time_compare_not_equal() {
        assert!(!constant_time_compare("test-key-123", "test-key-124"));
    }

    #[test]
    fn test_constant_time_compare_different_lengths() {
        assert!(!constant_time_compare("short", "much-longer-key"));
    }

    async fn extract(header: Option<&str>) -> Result<Caller, AppError> {
        let mut builder = HttpRequest::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        <Caller as FromRequestParts<()>>::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_caller_extraction() {
        let id = Uuid::new_v4();
        assert_eq!(extract(Some(&id.to_string())).await.unwrap(), Caller(id));
        assert_eq!(
            extract(None).await.unwrap_err().error_code(),
            "UNAUTHORIZED"
        );
        assert_eq!(
            extract(Some("not-a-uuid")).await.unwrap_err().error_code(),
            "UNAUTHORIZED"
        );
    }

    #[tokio::test]
    async fn test_optional_caller() {
        let (mut parts, _) = HttpRequest::builder()
            .uri("/")
            .body(())
            .unwrap()
            .into_parts();
        let anonymous =
            <Caller as OptionalFromRequestParts<()>>::from_request_parts(&mut parts, &()).await;
        assert_eq!(anonymous.unwrap(), None);

        let (mut parts, _) = HttpRequest::builder()
            .uri("/")
            .header(USER_ID_HEADER, "garbage")
            .body(())
            .unwrap()
            .into_parts();
        let malformed =
            <Caller as OptionalFromRequestParts<()>>::from_request_parts(&mut parts, &()).await;
        assert!(malformed.is_err());
    }

    #[test]
    fn test_ensure_is() {
        let id = Uuid::new_v4();
        assert!(Caller(id).ensure_is(id).is_ok());
        assert_eq!(
            Caller(id).ensure_is(Uuid::new_v4()).unwrap_err().error_code(),
            "FORBIDDEN"
        );
    }
}
