//! Input validators shared by the HTTP handlers.
//!
//! Chat messages, project names, session ids, and file operations are all
//! checked here before anything touches the filesystem or the upstream.

use std::path::Path;

use thiserror::Error;
use uuid::Uuid;

/// Maximum chat message length, in characters.
pub const MAX_MESSAGE_CHARS: usize = 10_000;

/// Maximum project name length, in characters.
pub const MAX_PROJECT_NAME_CHARS: usize = 255;

/// Maximum session file size accepted for any file operation.
pub const MAX_SESSION_FILE_BYTES: u64 = 100 * 1024 * 1024;

/// Sequences a chat message may not contain. The message is forwarded to a
/// process-spawning backend, so shell metacharacters are refused wholesale.
const FORBIDDEN_MESSAGE_SEQUENCES: [&str; 11] = [
    ";", "&", "|", "`", "$", "(", ")", "<", ">", "\n\n\n", "\r",
];

/// Characters a project name may not contain.
const FORBIDDEN_NAME_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Validation failure, surfaced to clients as a 400 (except missing files,
/// which map to 404).
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("message too long (max {MAX_MESSAGE_CHARS} characters)")]
    MessageTooLong,

    #[error("message cannot be empty")]
    MessageEmpty,

    #[error("message contains forbidden sequence {0:?}")]
    MessageForbidden(&'static str),

    #[error("project name too long (max {MAX_PROJECT_NAME_CHARS} characters)")]
    ProjectNameTooLong,

    #[error("project name cannot be empty")]
    ProjectNameEmpty,

    #[error("invalid characters in project name")]
    ProjectNameForbidden,

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("file not found")]
    FileMissing,

    #[error("path is a directory, not a file")]
    NotAFile,

    #[error("invalid extension: only .jsonl is allowed")]
    BadExtension,

    #[error("file too large (max 100 MiB)")]
    FileTooLarge,
}

/// Kind of filesystem access being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Read,
    Delete,
    Create,
}

/// Check a chat message, returning it unchanged when acceptable.
pub fn sanitize_message(message: &str) -> Result<&str, ValidationError> {
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ValidationError::MessageTooLong);
    }
    if message.trim().is_empty() {
        return Err(ValidationError::MessageEmpty);
    }
    for seq in FORBIDDEN_MESSAGE_SEQUENCES {
        if message.contains(seq) {
            return Err(ValidationError::MessageForbidden(seq));
        }
    }
    Ok(message)
}

/// Check a project directory name, returning it unchanged when acceptable.
pub fn sanitize_project_name(name: &str) -> Result<&str, ValidationError> {
    if name.chars().count() > MAX_PROJECT_NAME_CHARS {
        return Err(ValidationError::ProjectNameTooLong);
    }
    if name.trim().is_empty() {
        return Err(ValidationError::ProjectNameEmpty);
    }
    if name.contains(FORBIDDEN_NAME_CHARS) || name.contains("..") {
        return Err(ValidationError::ProjectNameForbidden);
    }
    Ok(name)
}

/// True when `s` has the hyphenated `8-4-4-4-12` UUID shape.
pub fn is_uuid(s: &str) -> bool {
    s.len() == 36 && Uuid::parse_str(s).is_ok()
}

/// Sanity-check a file target before an operation: only `.jsonl` (or bare)
/// names, regular files, and sizes up to 100 MiB. A missing target is an
/// error for anything but `Create`.
pub fn validate_file_operation(path: &Path, op: FileOp) -> Result<(), ValidationError> {
    let meta = std::fs::metadata(path).ok();

    if meta.is_none() && op != FileOp::Create {
        return Err(ValidationError::FileMissing);
    }

    if let Some(meta) = &meta {
        if meta.is_dir() {
            return Err(ValidationError::NotAFile);
        }
    }

    match path.extension() {
        None => {}
        Some(ext) if ext == "jsonl" => {}
        Some(_) => return Err(ValidationError::BadExtension),
    }

    if let Some(meta) = &meta {
        if meta.len() > MAX_SESSION_FILE_BYTES {
            return Err(ValidationError::FileTooLarge);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn message_length_boundary() {
        let ok = "a".repeat(MAX_MESSAGE_CHARS);
        assert!(sanitize_message(&ok).is_ok());

        let too_long = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            sanitize_message(&too_long),
            Err(ValidationError::MessageTooLong)
        ));
    }

    #[test]
    fn message_length_counts_characters_not_bytes() {
        // Multibyte characters: 10 000 of them exceed 10 000 bytes but are fine.
        let ok = "é".repeat(MAX_MESSAGE_CHARS);
        assert!(sanitize_message(&ok).is_ok());
    }

    #[test]
    fn message_rejects_shell_metacharacters() {
        for bad in ["a;b", "a&b", "a|b", "a`b", "a$b", "a(b", "a)b", "a<b", "a>b"] {
            assert!(sanitize_message(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(sanitize_message("a\n\n\nb").is_err());
        assert!(sanitize_message("a\rb").is_err());
        assert!(sanitize_message("hello\nworld").is_ok());
    }

    #[test]
    fn message_rejects_empty() {
        assert!(matches!(
            sanitize_message("   "),
            Err(ValidationError::MessageEmpty)
        ));
    }

    #[test]
    fn project_name_rules() {
        assert!(sanitize_project_name("my-project").is_ok());
        assert!(sanitize_project_name("-home-x--claude-projetos-home").is_ok());
        assert!(sanitize_project_name("").is_err());
        assert!(sanitize_project_name("a/b").is_err());
        assert!(sanitize_project_name("a\\b").is_err());
        assert!(sanitize_project_name("a|b").is_err());
        assert!(sanitize_project_name("..").is_err());
        assert!(sanitize_project_name("a..b").is_err());
        assert!(sanitize_project_name(&"a".repeat(256)).is_err());
        assert!(sanitize_project_name(&"a".repeat(255)).is_ok());
    }

    #[test]
    fn uuid_shape() {
        assert!(is_uuid("00000000-0000-0000-0000-000000000001"));
        assert!(is_uuid("a3bb189e-8bf9-3888-9912-ace4e6543002"));
        assert!(!is_uuid("not-a-uuid"));
        assert!(!is_uuid("a3bb189e8bf9388899 12ace4e6543002"));
        // Un-hyphenated hex parses as a UUID but is not the on-disk shape.
        assert!(!is_uuid("a3bb189e8bf938889912ace4e6543002"));
    }

    #[test]
    fn file_op_extension_and_kind() {
        let dir = tempfile::tempdir().unwrap();

        let jsonl = dir.path().join("s.jsonl");
        std::fs::File::create(&jsonl).unwrap();
        assert!(validate_file_operation(&jsonl, FileOp::Read).is_ok());

        let txt = dir.path().join("s.txt");
        std::fs::File::create(&txt).unwrap();
        assert!(matches!(
            validate_file_operation(&txt, FileOp::Read),
            Err(ValidationError::BadExtension)
        ));

        assert!(matches!(
            validate_file_operation(dir.path(), FileOp::Read),
            Err(ValidationError::NotAFile)
        ));
    }

    #[test]
    fn file_op_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone.jsonl");

        assert!(matches!(
            validate_file_operation(&gone, FileOp::Read),
            Err(ValidationError::FileMissing)
        ));
        assert!(matches!(
            validate_file_operation(&gone, FileOp::Delete),
            Err(ValidationError::FileMissing)
        ));
        assert!(validate_file_operation(&gone, FileOp::Create).is_ok());
    }

    #[test]
    fn file_op_size_cap() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.jsonl");

        // Sparse file sized one byte past the cap.
        let f = std::fs::File::create(&file).unwrap();
        f.set_len(MAX_SESSION_FILE_BYTES + 1).unwrap();
        drop(f);
        assert!(matches!(
            validate_file_operation(&file, FileOp::Read),
            Err(ValidationError::FileTooLarge)
        ));

        // Exactly at the cap is accepted.
        let f = std::fs::OpenOptions::new().write(true).open(&file).unwrap();
        f.set_len(MAX_SESSION_FILE_BYTES).unwrap();
        drop(f);
        assert!(validate_file_operation(&file, FileOp::Read).is_ok());

        let mut small = std::fs::File::create(dir.path().join("small.jsonl")).unwrap();
        small.write_all(b"{}\n").unwrap();
        assert!(validate_file_operation(&dir.path().join("small.jsonl"), FileOp::Read).is_ok());
    }
}
