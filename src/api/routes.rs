//! API route definitions.

use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::{
    Router,
    handler::Handler,
    middleware,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::auth::{auth_middleware, rate_limit_middleware};

use super::chat;
use super::handlers;
use super::state::AppState;

/// Create the application router.
///
/// Read endpoints are open; mutating endpoints sit behind the API-key
/// middleware, and chat additionally behind the per-IP rate limiter.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let auth = middleware::from_fn_with_state(state.auth.clone(), auth_middleware);
    let rate = middleware::from_fn_with_state(state.limiter.clone(), rate_limit_middleware);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/projects", get(handlers::list_projects))
        .route(
            "/api/projects/{project}",
            delete(handlers::delete_project.layer(auth.clone())),
        )
        .route(
            "/api/projects/{project}/sessions",
            get(handlers::list_sessions),
        )
        .route(
            "/api/projects/{project}/sessions/{session_id}",
            get(handlers::read_session).delete(handlers::delete_session.layer(auth.clone())),
        )
        .route(
            "/api/clear-history",
            post(handlers::clear_history.layer(auth.clone())),
        )
        .route(
            "/api/fork-session",
            post(handlers::fork_session.layer(auth.clone())),
        )
        .route("/api/chat", post(chat::chat.layer(rate).layer(auth)))
        .route("/api/live-session", get(handlers::live_session))
        .with_state(state)
        .layer(cors)
        .layer(trace_layer)
}

/// CORS for the browser client: explicit localhost origins only.
fn build_cors_layer() -> CorsLayer {
    let origins = [
        "http://localhost:3000",
        "http://localhost:3001",
        "http://localhost:3002",
        "http://localhost:3003",
    ]
    .map(|origin| origin.parse::<HeaderValue>().unwrap());

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-api-key"),
        ])
        .allow_credentials(true)
}
