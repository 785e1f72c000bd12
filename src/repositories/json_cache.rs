use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::error::{RepositoryError, RepositoryResult};
use super::session_cache::SessionCache;
use crate::models::{ChatMessage, SessionMeta};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheState {
    #[serde(default)]
    current_session_id: Option<String>,
    #[serde(default)]
    auto_cleanup: Option<bool>,
}

/// JSON file-backed session cache.
/// Layout under the cache root (default `~/.config/docchat/`):
/// `sessions.json`, `state.json`, `messages/<session_id>.json`.
pub struct JsonSessionCache {
    root: PathBuf,
}

impl JsonSessionCache {
    pub fn new() -> RepositoryResult<Self> {
        let root = dirs::config_dir()
            .ok_or_else(|| RepositoryError::Initialization {
                message: "could not determine config directory".to_string(),
            })?
            .join("docchat");
        Ok(Self { root })
    }

    /// Cache rooted at an explicit directory (tests, portable installs).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn sessions_path(&self) -> PathBuf {
        self.root.join("sessions.json")
    }

    fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    fn messages_path(&self, session_id: &str) -> PathBuf {
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.root.join("messages").join(format!("{safe}.json"))
    }

    fn read_state(&self) -> RepositoryResult<CacheState> {
        read_json_or_default(&self.state_path())
    }

    fn write_state(&self, state: &CacheState) -> RepositoryResult<()> {
        write_json_atomic(&self.state_path(), state)
    }
}

/// Missing file reads as the type's default; malformed content is an error.
fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> RepositoryResult<T> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(err.into()),
    }
}

/// Write to a temp file, then rename into place.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> RepositoryResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, json)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

impl SessionCache for JsonSessionCache {
    fn sessions(&self) -> RepositoryResult<Vec<SessionMeta>> {
        read_json_or_default(&self.sessions_path())
    }

    fn set_sessions(&self, sessions: &[SessionMeta]) -> RepositoryResult<()> {
        write_json_atomic(&self.sessions_path(), &sessions)
    }

    fn messages(&self, session_id: &str) -> RepositoryResult<Vec<ChatMessage>> {
        read_json_or_default(&self.messages_path(session_id))
    }

    fn set_messages(&self, session_id: &str, messages: &[ChatMessage]) -> RepositoryResult<()> {
        write_json_atomic(&self.messages_path(session_id), &messages)
    }

    fn remove_messages(&self, session_id: &str) -> RepositoryResult<()> {
        let path = self.messages_path(session_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn current_session_id(&self) -> RepositoryResult<Option<String>> {
        Ok(self.read_state()?.current_session_id)
    }

    fn set_current_session_id(&self, session_id: &str) -> RepositoryResult<()> {
        let mut state = self.read_state()?;
        state.current_session_id = Some(session_id.to_string());
        self.write_state(&state)
    }

    fn auto_cleanup(&self) -> RepositoryResult<Option<bool>> {
        Ok(self.read_state()?.auto_cleanup)
    }

    fn set_auto_cleanup(&self, enabled: bool) -> RepositoryResult<()> {
        let mut state = self.read_state()?;
        state.auto_cleanup = Some(enabled);
        self.write_state(&state)
    }
}
