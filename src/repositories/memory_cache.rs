use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::RepositoryResult;
use super::session_cache::SessionCache;
use crate::models::{ChatMessage, SessionMeta};

#[derive(Default)]
struct CacheData {
    sessions: Vec<SessionMeta>,
    messages: HashMap<String, Vec<ChatMessage>>,
    current: Option<String>,
    auto_cleanup: Option<bool>,
}

/// In-memory session cache, useful for testing and development.
#[derive(Clone, Default)]
pub struct InMemorySessionCache {
    data: Arc<Mutex<CacheData>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionCache for InMemorySessionCache {
    fn sessions(&self) -> RepositoryResult<Vec<SessionMeta>> {
        Ok(self.data.lock().sessions.clone())
    }

    fn set_sessions(&self, sessions: &[SessionMeta]) -> RepositoryResult<()> {
        self.data.lock().sessions = sessions.to_vec();
        Ok(())
    }

    fn messages(&self, session_id: &str) -> RepositoryResult<Vec<ChatMessage>> {
        Ok(self
            .data
            .lock()
            .messages
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    fn set_messages(&self, session_id: &str, messages: &[ChatMessage]) -> RepositoryResult<()> {
        self.data
            .lock()
            .messages
            .insert(session_id.to_string(), messages.to_vec());
        Ok(())
    }

    fn remove_messages(&self, session_id: &str) -> RepositoryResult<()> {
        self.data.lock().messages.remove(session_id);
        Ok(())
    }

    fn current_session_id(&self) -> RepositoryResult<Option<String>> {
        Ok(self.data.lock().current.clone())
    }

    fn set_current_session_id(&self, session_id: &str) -> RepositoryResult<()> {
        self.data.lock().current = Some(session_id.to_string());
        Ok(())
    }

    fn auto_cleanup(&self) -> RepositoryResult<Option<bool>> {
        Ok(self.data.lock().auto_cleanup)
    }

    fn set_auto_cleanup(&self, enabled: bool) -> RepositoryResult<()> {
        self.data.lock().auto_cleanup = Some(enabled);
        Ok(())
    }
}
