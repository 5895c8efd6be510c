//! Session management
//!
//! Per-conversation rolling history, persisted as one JSON file per session
//! under `{workspace}/sessions/`. The in-memory map is authoritative; disk is
//! a write-behind copy. Persistence failures are logged and swallowed so a
//! bad disk never loses in-memory state.

pub mod types;

pub use types::{Message, Role, Session, ToolCall, MAX_HISTORY_SIZE};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::Result;

/// Stores and persists conversation sessions.
///
/// Cloning is cheap and shares the underlying map, so the manager can be
/// handed to multiple tasks.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    storage_path: PathBuf,
}

impl SessionManager {
    /// Create a manager persisting under `{workspace}/sessions`.
    pub fn new(workspace: impl Into<PathBuf>) -> Result<Self> {
        let storage_path = workspace.into().join("sessions");
        std::fs::create_dir_all(&storage_path)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path,
        })
    }

    /// Get a snapshot of a session, creating an empty one if absent.
    pub async fn get_or_create(&self, key: &str) -> Session {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.to_string())
            .or_insert_with(|| Session::new(key))
            .clone()
    }

    /// Append a message to a session, creating the session lazily.
    pub async fn append(&self, key: &str, message: Message) {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.to_string())
            .or_insert_with(|| Session::new(key))
            .add_message(message);
    }

    /// Trim a session to the history limit and write it to disk atomically
    /// (temp file + rename).
    ///
    /// Persistence errors are logged and swallowed; the in-memory session is
    /// unaffected by a failed write.
    pub async fn save(&self, key: &str) {
        let session = {
            let mut sessions = self.sessions.write().await;
            let Some(session) = sessions.get_mut(key) else {
                return;
            };
            // Overflow past the limit is dropped here; archival happens via
            // trim_all before save.
            let _ = session.trim();
            session.clone()
        };

        if let Err(e) = self.write_session(&session).await {
            warn!(key = %key, error = %e, "Failed to persist session");
        }
    }

    async fn write_session(&self, session: &Session) -> Result<()> {
        let path = self.session_path(&session.key);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Load every readable session file into memory. Best-effort: unreadable
    /// or malformed files are skipped silently.
    pub async fn load_all(&self) {
        let mut dir = match tokio::fs::read_dir(&self.storage_path).await {
            Ok(dir) => dir,
            Err(e) => {
                debug!(error = %e, "No session directory to load");
                return;
            }
        };

        let mut sessions = self.sessions.write().await;
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let Ok(content) = tokio::fs::read_to_string(&path).await else {
                    continue;
                };
                let Ok(session) = serde_json::from_str::<Session>(&content) else {
                    continue;
                };
                sessions.insert(session.key.clone(), session);
            }
        }
    }

    /// Trim every session, returning the concatenated discarded prefixes for
    /// archival into persistent memory.
    pub async fn trim_all(&self) -> Vec<Message> {
        let mut sessions = self.sessions.write().await;
        let mut trimmed = Vec::new();
        for session in sessions.values_mut() {
            trimmed.extend(session.trim());
        }
        trimmed
    }

    /// Number of sessions currently in memory.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn session_path(&self, key: &str) -> PathBuf {
        self.storage_path
            .join(format!("{}.json", sanitize_key(key)))
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            storage_path: self.storage_path.clone(),
        }
    }
}

/// Sanitize a session key for use as a filename.
///
/// Percent-encodes filesystem-hostile characters so the mapping is bijective:
/// distinct keys never collide on disk, and the stored `key` field always
/// matches the in-memory identity.
fn sanitize_key(key: &str) -> String {
    let mut result = String::with_capacity(key.len() * 3);
    for c in key.chars() {
        match c {
            '/' => result.push_str("%2F"),
            '\\' => result.push_str("%5C"),
            ':' => result.push_str("%3A"),
            '*' => result.push_str("%2A"),
            '?' => result.push_str("%3F"),
            '"' => result.push_str("%22"),
            '<' => result.push_str("%3C"),
            '>' => result.push_str("%3E"),
            '|' => result.push_str("%7C"),
            '%' => result.push_str("%25"),
            c => result.push(c),
        }
    }
    result
}
