//! HTTP API module.
//!
//! Provides the REST + SSE surface for chat turns and session management.

mod chat;
mod error;
mod handlers;
mod routes;
mod state;

pub use chat::ChatRequest;
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
