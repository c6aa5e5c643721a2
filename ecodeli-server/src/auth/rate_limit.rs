//! Application-layer rate limiting (fixed window per key)

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::state::AppState;
use crate::util::client_ip;

struct KeyEntry {
    count: u32,
    window_start: Instant,
    window: Duration,
}

#[derive(Clone, Default)]
pub struct RateLimiter {
    /// route name -> (key -> entry)
    inner: Arc<Mutex<HashMap<&'static str, HashMap<String, KeyEntry>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the request is allowed, `false` if rate-limited.
    ///
    /// `key` is usually the client IP; delivery validation uses the delivery id.
    pub async fn check(
        &self,
        route: &'static str,
        key: &str,
        max_requests: u32,
        window_secs: u64,
    ) -> bool {
        let mut map = self.inner.lock().await;
        let route_map = map.entry(route).or_default();
        let now = Instant::now();

        let window = Duration::from_secs(window_secs);
        let entry = route_map.entry(key.to_owned()).or_insert_with(|| KeyEntry {
            count: 0,
            window_start: now,
            window,
        });
        entry.window = window;

        if now.duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        entry.count <= max_requests
    }

    /// Whether `key` already used its `max_requests` in the current window.
    /// Unlike [`check`](Self::check) this does not count as a request.
    pub async fn is_exhausted(&self, route: &'static str, key: &str, max_requests: u32) -> bool {
        let map = self.inner.lock().await;
        let now = Instant::now();
        map.get(route)
            .and_then(|route_map| route_map.get(key))
            .is_some_and(|entry| {
                now.duration_since(entry.window_start) < entry.window && entry.count >= max_requests
            })
    }

    /// Remove entries whose window has passed
    pub async fn cleanup(&self) {
        let mut map = self.inner.lock().await;
        let now = Instant::now();

        for route_map in map.values_mut() {
            route_map.retain(|_, entry| now.duration_since(entry.window_start) < entry.window);
        }

        map.retain(|_, route_map| !route_map.is_empty());
    }
}

fn too_many_requests() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        axum::Json(serde_json::json!({"error": "Too many requests, try again later"})),
    )
        .into_response()
}

/// Rate limit middleware for login: 5 requests/minute per IP
pub async fn login_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = client_ip(&request);
    if !state.rate_limiter.check("login", &ip, 5, 60).await {
        tracing::warn!(ip = %ip, "Login rate limit exceeded");
        return Err(too_many_requests());
    }
    Ok(next.run(request).await)
}

/// Rate limit middleware for registration: 3 requests/minute per IP
pub async fn register_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = client_ip(&request);
    if !state.rate_limiter.check("register", &ip, 3, 60).await {
        tracing::warn!(ip = %ip, "Registration rate limit exceeded");
        return Err(too_many_requests());
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_window_limit() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("register", "1.2.3.4", 3, 60).await);
        }
        assert!(!limiter.check("register", "1.2.3.4", 3, 60).await);
        // other keys and routes are independent
        assert!(limiter.check("register", "5.6.7.8", 3, 60).await);
        assert!(limiter.check("login", "1.2.3.4", 3, 60).await);
    }

    #[tokio::test]
    async fn test_exhausted_does_not_count() {
        let limiter = RateLimiter::new();
        for _ in 0..10 {
            assert!(!limiter.is_exhausted("delivery_validation", "7", 2).await);
        }
        assert!(limiter.check("delivery_validation", "7", 2, 900).await);
        assert!(!limiter.is_exhausted("delivery_validation", "7", 2).await);
        assert!(limiter.check("delivery_validation", "7", 2, 900).await);
        assert!(limiter.is_exhausted("delivery_validation", "7", 2).await);
        assert!(!limiter.is_exhausted("delivery_validation", "8", 2).await);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_fresh_entries() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("login", "1.2.3.4", 1, 60).await);
        limiter.cleanup().await;
        assert!(!limiter.check("login", "1.2.3.4", 1, 60).await);
    }
}
