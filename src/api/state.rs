//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::{AuthState, RateLimiter};
use crate::cache::SessionDirCache;
use crate::paths::Paths;
use crate::queue::QueueRegistry;
use crate::upstream::UpstreamClient;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Directory roots for session storage.
    pub paths: Paths,
    /// Per-project session-listing cache.
    pub cache: Arc<SessionDirCache>,
    /// Per-session turn queues.
    pub queues: Arc<QueueRegistry>,
    /// Client for the upstream SDK service.
    pub upstream: UpstreamClient,
    /// API-key authentication state.
    pub auth: AuthState,
    /// Per-IP limiter for the chat endpoint.
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Create new application state.
    pub fn new(paths: Paths, upstream: UpstreamClient, auth: AuthState) -> Self {
        Self {
            paths,
            cache: Arc::new(SessionDirCache::new()),
            queues: Arc::new(QueueRegistry::new()),
            upstream,
            auth,
            limiter: Arc::new(RateLimiter::default()),
        }
    }
}
