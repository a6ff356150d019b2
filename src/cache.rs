//! Per-project session directory cache.
//!
//! Memoizes the set of session files discovered under each project
//! directory. Entries expire after a fixed TTL and are invalidated
//! explicitly on every mutation touching the project, so the filesystem
//! stays authoritative: a stale read here costs at most one 404 on a
//! follow-up request, never a wrong write.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::sessions::SessionEntry;

/// How long a cached listing stays fresh.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    sessions: Vec<SessionEntry>,
    stored_at: Instant,
}

/// Thread-safe session-listing cache. Readers share the lock, writers take
/// it exclusively; the lock is never held across I/O.
pub struct SessionDirCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl Default for SessionDirCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionDirCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Cache with a custom TTL (tests exercise the freshness boundary).
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh listing for `project`, or `None` on miss or expiry.
    pub fn get(&self, project: &str) -> Option<Vec<SessionEntry>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(project)?;
        if entry.stored_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.sessions.clone())
    }

    /// Store a listing for `project` stamped with the current time.
    pub fn put(&self, project: &str, sessions: Vec<SessionEntry>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        debug!(project, count = sessions.len(), "session cache updated");
        entries.insert(
            project.to_string(),
            CacheEntry {
                sessions,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop the entry for `project`, if any.
    pub fn invalidate(&self, project: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.remove(project).is_some() {
            debug!(project, "session cache invalidated");
        }
    }

    /// Drop every entry. Used when a mutation's project is unknown.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if !entries.is_empty() {
            debug!(count = entries.len(), "session cache cleared");
        }
        entries.clear();
    }
}
