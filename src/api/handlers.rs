//! API request handlers for session lifecycle management.
//!
//! Each handler is a thin composition: validate input, resolve and check
//! paths, perform the filesystem call, invalidate the directory cache, and
//! answer with JSON. The filesystem stays authoritative throughout.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::paths;
use crate::sessions::{self, ProjectInfo, SessionEntry};
use crate::validate::{self, FileOp};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Project holding the browser client's default conversation.
const HOME_PROJECT: &str = "home";

/// Fixed id of the home conversation's session file.
const HOME_SESSION_ID: &str = "00000000-0000-0000-0000-000000000001";

/// How many lines the live-session preview returns.
const LIVE_TAIL_LINES: usize = 20;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub lang: &'static str,
    pub method: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        lang: "rust",
        method: "sdk-proxy",
    })
}

#[derive(Debug, Serialize)]
pub struct ProjectsResponse {
    pub projects: Vec<ProjectInfo>,
}

/// List project directories with their session counts.
#[instrument(skip(state))]
pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<ProjectsResponse>> {
    let projects = sessions::list_projects(&state.paths.projects_root())?;
    info!(count = projects.len(), "listed projects");
    Ok(Json(ProjectsResponse { projects }))
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub success: bool,
    pub message: String,
}

/// Delete a project from both roots.
///
/// The upstream names its directory after the full working-directory path;
/// the gateway-owned directory uses the plain name, recovered here as the
/// last hyphen-separated token. Either directory may already be gone.
#[instrument(skip(state))]
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    let name = validate::sanitize_project_name(&project)?;
    let simple = name.rsplit('-').next().unwrap_or(name);
    let simple = validate::sanitize_project_name(simple)?;

    let formatted_dir = state.paths.projects_root().join(name);
    paths::validate(&formatted_dir, &state.paths.projects_root())?;
    if let Err(err) = std::fs::remove_dir_all(&formatted_dir) {
        warn!(dir = %formatted_dir.display(), error = %err, "project dir not removed");
    } else {
        info!(dir = %formatted_dir.display(), "project dir removed");
    }

    let simple_dir = state.paths.projetos_root().join(simple);
    paths::validate(&simple_dir, &state.paths.projetos_root())?;
    if let Err(err) = std::fs::remove_dir_all(&simple_dir) {
        warn!(dir = %simple_dir.display(), error = %err, "project dir not removed");
    } else {
        info!(dir = %simple_dir.display(), "project dir removed");
    }

    state.cache.invalidate(name);

    Ok(Json(OkResponse {
        success: true,
        message: format!("project {name} deleted"),
    }))
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionEntry>,
}

/// List a project's sessions, served from the directory cache when fresh.
#[instrument(skip(state))]
pub async fn list_sessions(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> ApiResult<Json<SessionsResponse>> {
    if let Some(sessions) = state.cache.get(&project) {
        info!(project, count = sessions.len(), "session listing served from cache");
        return Ok(Json(SessionsResponse { sessions }));
    }

    let project_dir = state.paths.projects_root().join(&project);
    paths::validate(&project_dir, &state.paths.projects_root())?;

    let sessions = sessions::scan_sessions(&project_dir, &project)?;
    info!(project, count = sessions.len(), "session listing rescanned");
    state.cache.put(&project, sessions.clone());

    Ok(Json(SessionsResponse { sessions }))
}

#[derive(Debug, Serialize)]
pub struct SessionContentResponse {
    pub lines: Vec<String>,
    pub session_file: String,
    pub total: usize,
}

/// Read a session file as lines.
#[instrument(skip(state))]
pub async fn read_session(
    State(state): State<AppState>,
    Path((project, session_id)): Path<(String, String)>,
) -> ApiResult<Json<SessionContentResponse>> {
    let file = sessions::session_file(&state.paths.projects_root().join(&project), &session_id);
    paths::validate(&file, &state.paths.projects_root())?;
    validate::validate_file_operation(&file, FileOp::Read)?;

    let lines = sessions::read_lines(&file)?;
    Ok(Json(SessionContentResponse {
        total: lines.len(),
        session_file: file.to_string_lossy().into_owned(),
        lines,
    }))
}

/// Delete one session file.
#[instrument(skip(state))]
pub async fn delete_session(
    State(state): State<AppState>,
    Path((project, session_id)): Path<(String, String)>,
) -> ApiResult<Json<OkResponse>> {
    let file = sessions::session_file(&state.paths.projects_root().join(&project), &session_id);
    paths::validate(&file, &state.paths.projects_root())?;
    validate::validate_file_operation(&file, FileOp::Delete)?;

    std::fs::remove_file(&file)?;
    info!(session_id, project, "session deleted");

    state.cache.invalidate(&project);

    Ok(Json(OkResponse {
        success: true,
        message: format!("session {session_id} deleted"),
    }))
}

/// Remove the home conversation's session file. Already-absent is success.
#[instrument(skip(state))]
pub async fn clear_history(State(state): State<AppState>) -> ApiResult<Json<OkResponse>> {
    let home_dir = state.paths.projetos_root().join(HOME_PROJECT);
    let project = paths::formatted_project_name(&home_dir);
    let file = sessions::session_file(&state.paths.projects_root().join(&project), HOME_SESSION_ID);

    if let Err(err) = validate::validate_file_operation(&file, FileOp::Delete) {
        warn!(error = %err, "clear-history target failed validation, continuing");
    }

    match std::fs::remove_file(&file) {
        Ok(()) => info!(file = %file.display(), "history cleared"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(file = %file.display(), "history already empty");
        }
        Err(err) => return Err(err.into()),
    }

    state.cache.invalidate(&project);

    Ok(Json(OkResponse {
        success: true,
        message: "history cleared".to_string(),
    }))
}

/// Body of a fork request.
#[derive(Debug, Deserialize)]
pub struct ForkRequest {
    pub source_session: String,
    pub fork_session: String,
    pub project_name: String,
}

#[derive(Debug, Serialize)]
pub struct ForkResponse {
    pub success: bool,
    pub fork_session_id: String,
    pub source_session_id: String,
    pub project_name: String,
    pub fork_path: String,
}

/// Fork a session: byte-identical copy of the source file under a new id.
#[instrument(skip(state, request), fields(project = %request.project_name))]
pub async fn fork_session(
    State(state): State<AppState>,
    Json(request): Json<ForkRequest>,
) -> ApiResult<Json<ForkResponse>> {
    if !validate::is_uuid(&request.source_session) || !validate::is_uuid(&request.fork_session) {
        return Err(ApiError::bad_request("session ids must be UUIDs"));
    }
    if request.source_session == request.fork_session {
        return Err(ApiError::bad_request(
            "fork id must differ from the source id",
        ));
    }
    let project = validate::sanitize_project_name(&request.project_name)?;

    let project_dir = state.paths.projects_root().join(project);
    paths::validate(&project_dir, &state.paths.projects_root())?;
    let source = sessions::session_file(&project_dir, &request.source_session);
    let fork = sessions::session_file(&project_dir, &request.fork_session);

    validate::validate_file_operation(&source, FileOp::Read)
        .map_err(|err| ApiError::not_found(format!("source session unavailable: {err}")))?;

    if fork.exists() {
        return Err(ApiError::conflict("fork target already exists"));
    }

    sessions::fork_session(&source, &fork)?;
    info!(
        source = %request.source_session,
        fork = %request.fork_session,
        "session forked"
    );

    state.cache.invalidate(project);

    Ok(Json(ForkResponse {
        success: true,
        fork_session_id: request.fork_session,
        source_session_id: request.source_session,
        project_name: request.project_name.clone(),
        fork_path: fork.to_string_lossy().into_owned(),
    }))
}

#[derive(Debug, Serialize)]
pub struct LiveSessionResponse {
    pub lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Preview the most recently modified session file in the base directory.
#[instrument(skip(state))]
pub async fn live_session(State(state): State<AppState>) -> ApiResult<Json<LiveSessionResponse>> {
    let Some(file) = sessions::most_recent_session(state.paths.base())? else {
        return Ok(Json(LiveSessionResponse {
            lines: Vec::new(),
            total: None,
            session_file: None,
            message: Some("no session found".to_string()),
        }));
    };

    validate::validate_file_operation(&file, FileOp::Read)?;
    let (lines, total) = sessions::tail_lines(&file, LIVE_TAIL_LINES)?;

    Ok(Json(LiveSessionResponse {
        lines,
        total: Some(total),
        session_file: file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        message: None,
    }))
}
