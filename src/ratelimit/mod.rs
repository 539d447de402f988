//! Per-caller request limiter.
//!
//! Each key gets `limit` requests per `window` (GCRA via `governor`, burst equal
//! to the limit). State lives in memory and a periodic sweep drops keys that
//! have fully recovered.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota};

use crate::auth::USER_ID_HEADER;
use crate::errors::AppError;

/// Keyed limiter shared by every clone.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<DefaultKeyedRateLimiter<String>>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        let burst = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(window / burst.get())
            .map(|q| q.allow_burst(burst))
            .unwrap_or_else(|| Quota::per_second(burst));

        Self {
            inner: Arc::new(governor::RateLimiter::keyed(quota)),
            window,
        }
    }

    /// Count one hit for `key`; false once the key is over its limit.
    pub fn check(&self, key: &str) -> bool {
        self.inner.check_key(&key.to_string()).is_ok()
    }

    /// Drop keys that are back to a full allowance. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.inner.len();
        self.inner.retain_recent();
        self.inner.shrink_to_fit();
        before.saturating_sub(self.inner.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.inner.len()
    }

    /// Sweep every `window` until the runtime shuts down.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        let period = self.window.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "Swept idle rate limit keys");
                }
            }
        })
    }
}

/// Key a request by caller id, falling back to the forwarded client address.
fn request_key(request: &Request) -> String {
    let headers = request.headers();
    if let Some(user) = headers.get(USER_ID_HEADER).and_then(|v| v.to_str().ok()) {
        return format!("user:{}", user);
    }
    if let Some(addr) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        return format!("ip:{}", addr.trim());
    }
    "anonymous".to_string()
}

/// Rate limiting middleware layer.
pub async fn rate_limit_layer(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let key = request_key(&request);
    if !limiter.check(&key) {
        tracing::warn!(key = %key, path = %request.uri().path(), "Rate limit exceeded");
        return AppError::RateLimited("Too many requests, slow down".to_string()).into_response();
    }
    next.run(request).await
}
