//! Parlor gateway library.
//!
//! Fronts a conversational AI backend over HTTP: browser clients get a REST
//! surface for JSONL session management plus a Server-Sent-Events stream for
//! chat turns, while the upstream SDK service remains the single writer of
//! session content on disk.

pub mod api;
pub mod auth;
pub mod cache;
pub mod locator;
pub mod paths;
pub mod queue;
pub mod sessions;
pub mod upstream;
pub mod validate;
