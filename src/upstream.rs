//! Streaming proxy to the upstream SDK service.
//!
//! For each dequeued turn the worker POSTs the chat payload to the
//! upstream's `/api/chat`, consumes its SSE response frame by frame, and
//! publishes normalized [`StreamEvent`]s on the turn's channel. The channel
//! is closed exactly once when the stream terminates, success or failure;
//! closure is the only completion signal the fan-out relies on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use reqwest::header;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::queue::{EnqueuedTurn, SessionQueue, StreamEvent};
use crate::sessions;

/// Client for the upstream SDK service.
///
/// Deliberately built without a request timeout: the upstream runs long
/// pre-flight work and may stall for arbitrary stretches. Cancellation
/// comes from the turn's channel instead: a disconnected client makes the
/// next send fail, and the in-flight response body is dropped.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    chat_url: String,
}

impl UpstreamClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            chat_url: format!("{}/api/chat", base_url.trim_end_matches('/')),
        }
    }

    /// Stream one turn. Consumes the turn so its sender drops (closing the
    /// channel) on every exit path.
    async fn stream_turn(&self, turn: EnqueuedTurn, session_id: &str, project_dir: &Path) {
        let events = turn.events;

        let project_id = project_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| project_dir.to_string_lossy().into_owned());
        let payload = serde_json::json!({
            "message": turn.message,
            "session_id": session_id,
            "project_id": project_id,
            "cwd": project_dir,
        });

        let response = match self
            .http
            .post(&self.chat_url)
            .header(header::ACCEPT, "text/event-stream")
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let _ = events
                    .send(StreamEvent::Error(format!(
                        "upstream connection failed: {err}"
                    )))
                    .await;
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let _ = events
                .send(StreamEvent::Error(format!(
                    "upstream returned {status}: {body}"
                )))
                .await;
            return;
        }

        let mut stream = response.bytes_stream();
        let mut lines = SseLineBuffer::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(session_id, error = %err, "upstream stream read failed");
                    let _ = events
                        .send(StreamEvent::Error(format!("upstream stream failed: {err}")))
                        .await;
                    return;
                }
            };

            for line in lines.push(&chunk) {
                let event = match parse_frame(&line, session_id) {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(session_id, error = %err, "undecodable upstream frame");
                        let _ = events
                            .send(StreamEvent::Error(format!(
                                "undecodable upstream frame: {err}"
                            )))
                            .await;
                        return;
                    }
                };

                if events.send(event).await.is_err() {
                    // Client gone; dropping the response aborts the transfer.
                    debug!(session_id, "client disconnected, abandoning upstream stream");
                    return;
                }
            }
        }

        debug!(session_id, "upstream stream finished");
    }
}

/// Drain a session's queue, one turn at a time.
///
/// Spawned by whichever request wins `try_start`. Exits when `dequeue`
/// reports the queue empty (which also clears the worker flag). The
/// session file is re-probed before every turn because an earlier turn in
/// this same loop may have just created it; the probe only informs logging,
/// the upstream owns all writes.
pub async fn run_worker(
    client: UpstreamClient,
    queue: Arc<SessionQueue>,
    session_id: String,
    project_dir: PathBuf,
) {
    while let Some(turn) = queue.dequeue() {
        let session_file = sessions::session_file(&project_dir, &session_id);
        if session_file.is_file() {
            debug!(session_id = %session_id, "session file present, turn resumes conversation");
        } else {
            debug!(session_id = %session_id, "no session file yet, turn starts conversation");
        }

        client.stream_turn(turn, &session_id, &project_dir).await;
    }
    debug!(session_id = %session_id, "queue drained, worker exiting");
}

/// Fields of one upstream SSE frame. Unknown `type`s are skipped.
#[derive(Debug, Deserialize)]
struct UpstreamFrame {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Map one SSE line to a normalized event. Only `data:` lines carry frames;
/// everything else (blank keep-alives, comments) is skipped.
fn parse_frame(line: &str, session_id: &str) -> Result<Option<StreamEvent>, serde_json::Error> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }

    let frame: UpstreamFrame = serde_json::from_str(data)?;
    Ok(match frame.kind.as_str() {
        "text" | "content" => Some(StreamEvent::Text(
            frame.content.or(frame.text).unwrap_or_default(),
        )),
        "done" | "session_created" => Some(StreamEvent::Done {
            session_id: session_id.to_string(),
        }),
        "error" => Some(StreamEvent::Error(frame.error.unwrap_or_default())),
        _ => None,
    })
}

/// Splits an SSE byte stream into complete lines, buffering partials across
/// chunk boundaries.
struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }
}
