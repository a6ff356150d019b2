//! Base-directory resolution and path containment.
//!
//! Every filesystem operation in the gateway goes through one of the roots
//! resolved here and is checked with [`validate`] before any syscall. The
//! check is applied even to paths the gateway constructed itself, so new
//! callers cannot accidentally bypass it.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// Environment variable overriding the session base directory.
pub const BASE_DIR_ENV: &str = "CLAUDE_BASE_DIR";

/// Path validation failure.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("path contains parent directory components")]
    Traversal,

    #[error("path escapes the allowed root")]
    Escape,

    #[error("unable to resolve path: {0}")]
    Resolve(#[from] std::io::Error),
}

/// Resolved directory roots for session storage.
///
/// Two project namespaces exist side by side: `projects/` is written by the
/// upstream SDK, `projetos/` is where this gateway provisions fresh project
/// directories so it never races the upstream's own bookkeeping.
#[derive(Debug, Clone)]
pub struct Paths {
    base: PathBuf,
}

impl Paths {
    /// Resolve the base directory from `CLAUDE_BASE_DIR`, falling back to
    /// `~/.claude`.
    pub fn from_env() -> Self {
        if let Some(dir) = std::env::var_os(BASE_DIR_ENV).filter(|v| !v.is_empty()) {
            return Self {
                base: PathBuf::from(dir),
            };
        }

        let home = dirs::home_dir().unwrap_or_else(|| {
            warn!("could not determine home directory, using current directory");
            PathBuf::from(".")
        });
        Self {
            base: home.join(".claude"),
        }
    }

    /// Use an explicit base directory (CLI override and tests).
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Root owned by the upstream SDK.
    pub fn projects_root(&self) -> PathBuf {
        self.base.join("projects")
    }

    /// Root owned by this gateway, used when creating fresh projects.
    pub fn projetos_root(&self) -> PathBuf {
        self.base.join("projetos")
    }
}

/// Reject `path` unless its absolute form stays under `allowed_root`.
///
/// Any occurrence of `..`, as a component or inside a name, is rejected
/// outright, before any filesystem access.
pub fn validate(path: &Path, allowed_root: &Path) -> Result<(), PathError> {
    if path.to_string_lossy().contains("..") {
        return Err(PathError::Traversal);
    }

    let abs = std::path::absolute(path)?;
    let abs_root = std::path::absolute(allowed_root)?;
    if !abs.starts_with(&abs_root) {
        return Err(PathError::Escape);
    }

    Ok(())
}

/// Directory name the upstream SDK derives from a working directory: the
/// full path with every `/` and `.` replaced by `-`.
///
/// `/home/x/.claude/projetos/home` becomes `-home-x--claude-projetos-home`.
pub fn formatted_project_name(path: &Path) -> String {
    path.to_string_lossy()
        .chars()
        .map(|c| if c == '/' || c == '.' { '-' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_hang_off_base() {
        let paths = Paths::with_base("/tmp/claude-test");
        assert_eq!(paths.base(), Path::new("/tmp/claude-test"));
        assert_eq!(
            paths.projects_root(),
            PathBuf::from("/tmp/claude-test/projects")
        );
        assert_eq!(
            paths.projetos_root(),
            PathBuf::from("/tmp/claude-test/projetos")
        );
    }

    #[test]
    fn validate_accepts_children() {
        let root = Path::new("/data/claude/projects");
        assert!(validate(Path::new("/data/claude/projects/p/a.jsonl"), root).is_ok());
        assert!(validate(root, root).is_ok());
    }

    #[test]
    fn validate_rejects_parent_components() {
        let root = Path::new("/data/claude/projects");
        let err = validate(Path::new("/data/claude/projects/../secrets"), root).unwrap_err();
        assert!(matches!(err, PathError::Traversal));

        // Dot-dot hidden inside a name is refused too.
        let err = validate(Path::new("/data/claude/projects/a..b"), root).unwrap_err();
        assert!(matches!(err, PathError::Traversal));
    }

    #[test]
    fn validate_rejects_paths_outside_root() {
        let root = Path::new("/data/claude/projects");
        let err = validate(Path::new("/data/claude/projetos/p"), root).unwrap_err();
        assert!(matches!(err, PathError::Escape));
    }

    #[test]
    fn formatted_name_replaces_separators_and_dots() {
        assert_eq!(
            formatted_project_name(Path::new("/home/x/.claude/projetos/home")),
            "-home-x--claude-projetos-home"
        );
        assert_eq!(formatted_project_name(Path::new("plain")), "plain");
    }
}
