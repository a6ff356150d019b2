//! Test utilities: a gateway instance on a temporary base directory wired
//! to a scripted mock upstream.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode, header},
    response::Response,
    routing::post,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower::ServiceExt;

use parlor::api::{AppState, create_router};
use parlor::auth::{AuthState, RateLimiter};
use parlor::paths::Paths;
use parlor::upstream::UpstreamClient;

/// What the mock upstream streams back for each chat call.
#[derive(Debug, Clone)]
pub struct UpstreamScript {
    /// Raw JSON frame payloads, each sent as `data: <json>\n\n`.
    pub frames: Vec<String>,
    /// Pause before responding, simulating upstream work.
    pub delay: Duration,
    /// HTTP status of the response.
    pub status: u16,
}

impl Default for UpstreamScript {
    fn default() -> Self {
        Self {
            frames: vec![
                r#"{"type":"text","content":"hello"}"#.to_string(),
                r#"{"type":"done"}"#.to_string(),
            ],
            delay: Duration::ZERO,
            status: 200,
        }
    }
}

/// One recorded upstream invocation.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub payload: Value,
    pub started: Instant,
    pub finished: Instant,
}

type MockState = (Arc<Mutex<Vec<CallRecord>>>, Arc<Mutex<UpstreamScript>>);

/// In-process stand-in for the upstream SDK service.
#[derive(Clone)]
pub struct MockUpstream {
    pub url: String,
    calls: Arc<Mutex<Vec<CallRecord>>>,
    script: Arc<Mutex<UpstreamScript>>,
}

impl MockUpstream {
    pub async fn start(script: UpstreamScript) -> Self {
        let calls: Arc<Mutex<Vec<CallRecord>>> = Arc::default();
        let script = Arc::new(Mutex::new(script));

        let app = Router::new()
            .route("/api/chat", post(mock_chat))
            .with_state((calls.clone(), script.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            calls,
            script,
        }
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_script(&self, script: UpstreamScript) {
        *self.script.lock().unwrap() = script;
    }
}

async fn mock_chat(State((calls, script)): State<MockState>, Json(payload): Json<Value>) -> Response {
    let script = script.lock().unwrap().clone();
    let started = Instant::now();

    tokio::time::sleep(script.delay).await;

    let body: String = script
        .frames
        .iter()
        .map(|frame| format!("data: {frame}\n\n"))
        .collect();
    let finished = Instant::now();

    calls.lock().unwrap().push(CallRecord {
        payload,
        started,
        finished,
    });

    Response::builder()
        .status(StatusCode::from_u16(script.status).unwrap_or(StatusCode::OK))
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from(body))
        .unwrap()
}

/// A gateway wired to a fresh base directory and mock upstream.
pub struct TestEnv {
    pub app: Router,
    pub upstream: MockUpstream,
    base: TempDir,
}

impl TestEnv {
    pub fn base(&self) -> &Path {
        self.base.path()
    }

    pub fn paths(&self) -> Paths {
        Paths::with_base(self.base.path())
    }

    /// Create a session file under the projects root, returning its path.
    pub fn seed_session(&self, project: &str, session_id: &str, lines: &[&str]) -> PathBuf {
        let dir = self.paths().projects_root().join(project);
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join(format!("{session_id}.jsonl"));
        let content: String = lines.iter().map(|l| format!("{l}\n")).collect();
        std::fs::write(&file, content).unwrap();
        file
    }
}

pub async fn test_env() -> TestEnv {
    test_env_with(UpstreamScript::default(), None, None).await
}

pub async fn test_env_with(
    script: UpstreamScript,
    api_key: Option<&str>,
    limiter: Option<RateLimiter>,
) -> TestEnv {
    let base = TempDir::new().unwrap();
    std::fs::create_dir_all(base.path()).unwrap();

    let upstream = MockUpstream::start(script).await;
    let auth = match api_key {
        Some(key) => AuthState::with_key(key),
        None => AuthState::open(),
    };

    let mut state = AppState::new(
        Paths::with_base(base.path()),
        UpstreamClient::new(&upstream.url),
        auth,
    );
    if let Some(limiter) = limiter {
        state.limiter = Arc::new(limiter);
    }

    TestEnv {
        app: create_router(state),
        upstream,
        base,
    }
}

/// Send a request with an optional JSON body and API key, returning status
/// and collected body text.
pub async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    api_key: Option<&str>,
) -> (StatusCode, String) {
    let mut builder = Request::builder().uri(uri).method(method);
    if body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    let request = builder
        .body(match body {
            Some(value) => Body::from(serde_json::to_string(&value).unwrap()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

/// Send a request and parse the response body as JSON.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    api_key: Option<&str>,
) -> (StatusCode, Value) {
    let (status, text) = send_raw(app, method, uri, body, api_key).await;
    let json = serde_json::from_str(&text).unwrap_or(Value::Null);
    (status, json)
}

/// Parse the `data:` frames out of an SSE body.
pub fn sse_frames(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter(|data| !data.trim().is_empty())
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}
