use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder title given to every new session until the first user
/// message rewrites it.
pub const DEFAULT_SESSION_TITLE: &str = "New conversation";

/// Maximum length accepted for a manually entered session title.
pub const MANUAL_TITLE_MAX_LEN: usize = 64;

/// Lightweight session metadata shown in the history sidebar. Sessions are
/// ordered most-recent-first by insertion; activity never re-sorts them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: String,
    pub title: String,
    /// Creation time, Unix milliseconds.
    pub ts: i64,
}

impl SessionMeta {
    pub fn new() -> Self {
        Self {
            id: generate_session_id(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            ts: Utc::now().timestamp_millis(),
        }
    }

    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_SESSION_TITLE
    }
}

impl Default for SessionMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate an opaque client-side session id.
pub fn generate_session_id() -> String {
    format!("s_{}", Uuid::new_v4().simple())
}
