//! Filesystem-as-truth session store.
//!
//! Sessions live on disk as `<uuid>.jsonl` files inside project directories;
//! the upstream SDK is the only writer of their content. This module only
//! indexes file names and streams file contents on demand; nothing here
//! keeps a long-lived copy of session data in memory.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Extension carried by every session file.
pub const SESSION_FILE_EXT: &str = "jsonl";

/// One discovered session file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub id: String,
    pub path: String,
}

/// One project directory with its session count.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectInfo {
    pub name: String,
    pub path: String,
    #[serde(rename = "sessionCount")]
    pub session_count: usize,
}

/// Absolute path of a session file inside a project directory.
pub fn session_file(project_dir: &Path, session_id: &str) -> PathBuf {
    project_dir.join(format!("{session_id}.{SESSION_FILE_EXT}"))
}

fn is_session_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SESSION_FILE_EXT)
}

/// List project directories under the projects root with their session
/// counts. A missing root is an empty listing, not an error.
pub fn list_projects(projects_root: &Path) -> io::Result<Vec<ProjectInfo>> {
    let entries = match std::fs::read_dir(projects_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut projects = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.path().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let session_count = match scan_sessions(&entry.path(), &name) {
            Ok(sessions) => sessions.len(),
            Err(err) => {
                debug!(project = %name, error = %err, "skipping unreadable project dir");
                continue;
            }
        };

        projects.push(ProjectInfo {
            path: name.clone(),
            name,
            session_count,
        });
    }

    Ok(projects)
}

/// Scan one project directory for session files.
pub fn scan_sessions(project_dir: &Path, project_name: &str) -> io::Result<Vec<SessionEntry>> {
    let mut sessions = Vec::new();
    for entry in std::fs::read_dir(project_dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if !path.is_file() || !is_session_file(&path) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            sessions.push(SessionEntry {
                id: stem.to_string(),
                path: format!("{project_name}/{stem}"),
            });
        }
    }
    Ok(sessions)
}

/// Read a session file as its constituent lines.
pub fn read_lines(file: &Path) -> io::Result<Vec<String>> {
    let content = std::fs::read_to_string(file)?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Byte-copy `source` to `fork`, creating the parent directory if needed.
/// The caller has already checked that `fork` does not exist.
pub fn fork_session(source: &Path, fork: &Path) -> io::Result<()> {
    let data = std::fs::read(source)?;
    if let Some(parent) = fork.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(fork, data)
}

/// Most recently modified session file directly under `base`, if any.
/// The scan is non-recursive.
pub fn most_recent_session(base: &Path) -> io::Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(base)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if !path.is_file() || !is_session_file(&path) {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => continue,
        };
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Last `limit` lines of a session file plus the total line count.
pub fn tail_lines(file: &Path, limit: usize) -> io::Result<(Vec<String>, usize)> {
    let lines = read_lines(file)?;
    let total = lines.len();
    let start = total.saturating_sub(limit);
    Ok((lines[start..].to_vec(), total))
}
