//! Resume-or-create resolution for incoming chat turns.
//!
//! Given the optional session id and project name of a chat request, decide
//! which directory the turn runs in and whether a session file already
//! exists there. Existing sessions are searched under the upstream-owned
//! `projects/` root; fresh projects are provisioned under the gateway-owned
//! `projetos/` root so the upstream's bookkeeping is never raced.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::paths::{self, PathError, Paths};
use crate::sessions::{self, SESSION_FILE_EXT};

/// Where a chat turn will execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub session_id: String,
    pub project_dir: PathBuf,
    /// Whether the session file was on disk at resolution time. Captured
    /// for logging; the worker re-probes before each turn.
    pub exists: bool,
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("unable to prepare project directory: {0}")]
    Io(#[from] io::Error),
}

/// Resolve the target directory and session id for a chat turn.
pub fn resolve(
    paths: &Paths,
    session_id: Option<&str>,
    project_name: Option<&str>,
) -> Result<SessionTarget, LocateError> {
    let session_id = session_id.filter(|s| !s.is_empty());
    let project_name = project_name.filter(|p| !p.is_empty());

    match (session_id, project_name) {
        (Some(id), Some(project)) => resolve_in_project(paths, id, project),
        (Some(id), None) => Ok(resolve_by_scan(paths, id)),
        (None, _) => Ok(resolve_unnamed(paths)),
    }
}

/// Session id and project both given: probe the upstream-owned root first,
/// provision a fresh gateway-owned directory otherwise.
fn resolve_in_project(
    paths: &Paths,
    session_id: &str,
    project: &str,
) -> Result<SessionTarget, LocateError> {
    let existing_dir = paths.projects_root().join(project);
    paths::validate(&existing_dir, &paths.projects_root())?;

    if sessions::session_file(&existing_dir, session_id).is_file() {
        debug!(session_id, dir = %existing_dir.display(), "resuming existing session");
        return Ok(SessionTarget {
            session_id: session_id.to_string(),
            project_dir: existing_dir,
            exists: true,
        });
    }

    let fresh_dir = paths.projetos_root().join(project);
    paths::validate(&fresh_dir, &paths.projetos_root())?;
    std::fs::create_dir_all(&fresh_dir)?;
    debug!(session_id, dir = %fresh_dir.display(), "provisioned fresh project directory");

    Ok(SessionTarget {
        session_id: session_id.to_string(),
        project_dir: fresh_dir,
        exists: false,
    })
}

/// Session id without a project: the first project directory containing the
/// session file wins; otherwise fall back to the base directory.
fn resolve_by_scan(paths: &Paths, session_id: &str) -> SessionTarget {
    let projects_root = paths.projects_root();
    if let Ok(entries) = std::fs::read_dir(&projects_root) {
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            if sessions::session_file(&dir, session_id).is_file() {
                debug!(session_id, dir = %dir.display(), "session found by scan");
                return SessionTarget {
                    session_id: session_id.to_string(),
                    project_dir: dir,
                    exists: true,
                };
            }
        }
    }

    SessionTarget {
        session_id: session_id.to_string(),
        project_dir: paths.base().to_path_buf(),
        exists: false,
    }
}

/// No session id: adopt the first loose session file in the base directory,
/// or mint a new id.
fn resolve_unnamed(paths: &Paths) -> SessionTarget {
    let base = paths.base().to_path_buf();

    if let Ok(entries) = std::fs::read_dir(&base) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().is_some_and(|ext| ext == SESSION_FILE_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    debug!(session_id = stem, "adopted loose session from base directory");
                    return SessionTarget {
                        session_id: stem.to_string(),
                        project_dir: base,
                        exists: true,
                    };
                }
            }
        }
    }

    let minted = Uuid::new_v4().to_string();
    debug!(session_id = %minted, "minted new session id");
    SessionTarget {
        session_id: minted,
        project_dir: base,
        exists: false,
    }
}
