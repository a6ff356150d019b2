//! API-key authentication and per-IP rate limiting.
//!
//! When `API_KEY` is set, mutating endpoints require a matching `X-API-Key`
//! header; when unset the gateway runs open (dev mode). The chat endpoint
//! additionally passes through a per-IP token bucket.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::api::ApiError;

/// Environment variable holding the shared API key.
pub const API_KEY_ENV: &str = "API_KEY";

/// Header clients present the key in.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authentication state shared with the auth middleware.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    api_key: Option<String>,
}

impl AuthState {
    /// Read the key from `API_KEY`; an unset or empty variable means dev
    /// mode.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()),
        }
    }

    /// Require the given key on protected endpoints.
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
        }
    }

    /// No authentication (dev mode).
    pub fn open() -> Self {
        Self::default()
    }

    pub fn is_dev_mode(&self) -> bool {
        self.api_key.is_none()
    }
}

/// Reject protected requests whose `X-API-Key` does not match the
/// configured key. A no-op in dev mode.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &auth.api_key else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if provided != Some(expected.as_str()) {
        warn!("rejected request with missing or invalid API key");
        return ApiError::unauthorized("missing or invalid API key").into_response();
    }

    next.run(request).await
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-IP token bucket. Buckets refill continuously at `rate_per_sec` up to
/// `burst`; the map mutex is held only across bucket lookup and update.
pub struct RateLimiter {
    rate_per_sec: f64,
    burst: f64,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

impl Default for RateLimiter {
    /// 2 requests per second, burst of 5.
    fn default() -> Self {
        Self::new(2.0, 5)
    }
}

impl RateLimiter {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            rate_per_sec,
            burst: f64::from(burst),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consume one token for `ip`. Returns `false` when the bucket is dry.
    pub fn check(&self, ip: IpAddr) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let bucket = buckets.entry(ip).or_insert(Bucket {
            tokens: self.burst,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Apply the shared limiter to a route. Requests without peer-address
/// information (in-process tests) fall into one shared bucket.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    if !limiter.check(ip) {
        warn!(%ip, "rate limit exceeded");
        return ApiError::too_many_requests("rate limit exceeded").into_response();
    }

    next.run(request).await
}
