use super::error::RepositoryResult;
use crate::models::{ChatMessage, SessionMeta};

/// Local durable cache for chat sessions: the session list, per-session
/// message lists, the current session id and the auto-cleanup flag. All
/// operations are synchronous; the remote half of persistence lives in
/// `SessionStore`.
///
/// Reads of missing keys return empty collections / `None`, never errors.
pub trait SessionCache: Send + Sync + 'static {
    fn sessions(&self) -> RepositoryResult<Vec<SessionMeta>>;

    fn set_sessions(&self, sessions: &[SessionMeta]) -> RepositoryResult<()>;

    fn messages(&self, session_id: &str) -> RepositoryResult<Vec<ChatMessage>>;

    fn set_messages(&self, session_id: &str, messages: &[ChatMessage]) -> RepositoryResult<()>;

    fn remove_messages(&self, session_id: &str) -> RepositoryResult<()>;

    fn current_session_id(&self) -> RepositoryResult<Option<String>>;

    fn set_current_session_id(&self, session_id: &str) -> RepositoryResult<()>;

    /// `None` until the flag has been written once (first run).
    fn auto_cleanup(&self) -> RepositoryResult<Option<bool>>;

    fn set_auto_cleanup(&self, enabled: bool) -> RepositoryResult<()>;
}
