//! Chat endpoint: accepts a turn, enqueues it on the session's queue, and
//! streams the normalized events back as Server-Sent Events.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    Json,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    response::{AppendHeaders, IntoResponse},
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument};

use crate::cache::SessionDirCache;
use crate::locator;
use crate::queue::{EVENT_BUFFER, EnqueuedTurn, StreamEvent};
use crate::upstream;
use crate::validate;

use super::error::ApiError;
use super::state::AppState;

/// Body of a chat POST.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
}

/// One SSE frame on the wire.
#[derive(Debug, Serialize)]
struct SseMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

impl From<StreamEvent> for SseMessage {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Text(content) => SseMessage {
                kind: "text",
                content,
                session_id: None,
            },
            StreamEvent::Error(content) => SseMessage {
                kind: "error",
                content,
                session_id: None,
            },
            StreamEvent::Done { session_id } => SseMessage {
                kind: "done",
                content: String::new(),
                session_id: Some(session_id),
            },
        }
    }
}

/// Handle a chat turn.
///
/// The turn is appended to its session's FIFO; if the queue was idle this
/// request's task spawns the worker. The response then streams whatever the
/// worker publishes on the turn's channel until the channel closes.
#[instrument(skip(state, request))]
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = validate::sanitize_message(&request.message)?.to_string();

    let target = locator::resolve(
        &state.paths,
        request.session_id.as_deref(),
        request.project_name.as_deref(),
    )?;
    info!(
        session_id = %target.session_id,
        dir = %target.project_dir.display(),
        resumes = target.exists,
        "chat turn accepted"
    );

    let queue = state.queues.get_or_create(&target.session_id);
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    queue.enqueue(EnqueuedTurn {
        message,
        events: events_tx,
    });

    if queue.try_start() {
        tokio::spawn(upstream::run_worker(
            state.upstream.clone(),
            queue,
            target.session_id.clone(),
            target.project_dir.clone(),
        ));
    } else {
        debug!(session_id = %target.session_id, "worker already running, turn queued behind it");
    }

    let stream = TurnStream {
        events: ReceiverStream::new(events_rx),
        _invalidate: InvalidateOnClose {
            cache: state.cache.clone(),
            project: request.project_name.clone(),
        },
    };

    Ok((
        AppendHeaders([
            ("cache-control", "no-cache"),
            ("x-accel-buffering", "no"),
        ]),
        Sse::new(stream).keep_alive(KeepAlive::default()),
    ))
}

/// Adapts the turn's event channel into an SSE stream. Ends when the worker
/// closes the channel.
struct TurnStream {
    events: ReceiverStream<StreamEvent>,
    _invalidate: InvalidateOnClose,
}

impl Stream for TurnStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.events).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                let message = SseMessage::from(event);
                let data = serde_json::to_string(&message).unwrap_or_default();
                Poll::Ready(Some(Ok(Event::default().data(data))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Invalidate the directory cache once the turn's stream ends, whether the
/// channel closed normally or the client disconnected mid-stream. With no
/// project name the touched project is unknown, so everything cached goes.
struct InvalidateOnClose {
    cache: Arc<SessionDirCache>,
    project: Option<String>,
}

impl Drop for InvalidateOnClose {
    fn drop(&mut self) {
        match &self.project {
            Some(project) => self.cache.invalidate(project),
            None => self.cache.invalidate_all(),
        }
    }
}
