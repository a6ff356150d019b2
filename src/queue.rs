//! Per-session turn queues.
//!
//! Each session id owns a FIFO of pending turns plus a single-worker flag.
//! The flag flips on only when a turn arrives at an idle queue and flips off
//! only when the worker drains the queue to empty, so at most one worker
//! ever services a session while independent sessions run fully in
//! parallel. Queue locks guard list and flag access only, never I/O.
//!
//! Queues are retained for the life of the process; an idle one is a pair
//! of empty allocations behind an `Arc`, so eviction has not been needed.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

/// Normalized event published from the upstream proxy to the SSE fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A chunk of assistant text.
    Text(String),
    /// Terminal failure for this turn.
    Error(String),
    /// Successful completion, carrying the session id.
    Done { session_id: String },
}

/// Buffered capacity of a turn's event channel. A fast upstream fills the
/// buffer before a slow client stalls it; a full buffer blocks the proxy,
/// propagating backpressure.
pub const EVENT_BUFFER: usize = 100;

/// One accepted chat turn waiting for (or receiving) its upstream stream.
///
/// Dropping `events` closes the channel; the worker does so exactly once,
/// after the turn's upstream stream terminates. A dropped receiver (client
/// disconnect) makes sends fail, which is the cancellation signal.
pub struct EnqueuedTurn {
    pub message: String,
    pub events: mpsc::Sender<StreamEvent>,
}

#[derive(Default)]
struct QueueInner {
    turns: VecDeque<EnqueuedTurn>,
    processing: bool,
}

/// FIFO of pending turns for one session.
#[derive(Default)]
pub struct SessionQueue {
    inner: Mutex<QueueInner>,
}

impl SessionQueue {
    fn new() -> Self {
        Self::default()
    }

    /// Append a turn.
    pub fn enqueue(&self, turn: EnqueuedTurn) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.turns.push_back(turn);
        debug!(pending = inner.turns.len(), "turn enqueued");
    }

    /// Claim the worker role. Returns `true` exactly once per busy period:
    /// the caller that flips `processing` on must spawn the worker.
    pub fn try_start(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.processing {
            return false;
        }
        inner.processing = true;
        true
    }

    /// Pop the next turn. An empty queue clears the worker flag and returns
    /// `None` in the same critical section, so a concurrent `try_start`
    /// either sees the running worker or gets to start a new one, never
    /// both.
    pub fn dequeue(&self) -> Option<EnqueuedTurn> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.turns.pop_front() {
            Some(turn) => {
                debug!(pending = inner.turns.len(), "turn dequeued");
                Some(turn)
            }
            None => {
                inner.processing = false;
                None
            }
        }
    }

    /// Whether a worker currently owns this queue.
    pub fn is_processing(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .processing
    }
}

/// Registry mapping session ids to their queues. The registry mutex covers
/// map lookup and insert only.
#[derive(Default)]
pub struct QueueRegistry {
    queues: Mutex<HashMap<String, Arc<SessionQueue>>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue for `session_id`, created on first use. Concurrent callers for
    /// the same id always receive the same queue.
    pub fn get_or_create(&self, session_id: &str) -> Arc<SessionQueue> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id, "queue created");
                Arc::new(SessionQueue::new())
            })
            .clone()
    }
}
