use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::error::RepositoryResult;
use super::session_cache::SessionCache;
use crate::api::BackendClient;
use crate::models::{ChatMessage, MANUAL_TITLE_MAX_LEN, Role, SessionMeta};
use crate::services::title::{TITLE_MAX_LEN, derive_title};

/// Dual-write persistence for chat sessions: every read prefers the backend
/// and falls back to the local cache, every write lands in the cache first
/// and is then pushed to the backend best-effort. Remote failures are logged
/// and swallowed so the app keeps working offline; only cache failures
/// propagate.
#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn SessionCache>,
    client: Arc<BackendClient>,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn SessionCache>, client: Arc<BackendClient>) -> Self {
        Self { cache, client }
    }

    /// First-run setup: default the auto-cleanup flag to on, pull the remote
    /// session list into the cache, and make sure a current session exists.
    /// Returns the current session id.
    pub async fn initialize(&self) -> RepositoryResult<String> {
        if self.cache.auto_cleanup()?.is_none() {
            self.cache.set_auto_cleanup(true)?;
        }
        let _ = self.sessions().await?;
        self.ensure_current()
    }

    /// Session list, most recent first. The remote list only replaces the
    /// cache when it is non-empty: a fresh backend must not wipe out local
    /// history that has not been synced yet.
    pub async fn sessions(&self) -> RepositoryResult<Vec<SessionMeta>> {
        match self.client.list_sessions().await {
            Ok(remote) if !remote.is_empty() => {
                self.cache.set_sessions(&remote)?;
                Ok(remote)
            }
            Ok(_) => self.cache.sessions(),
            Err(err) => {
                debug!(error = %err, "session list unavailable remotely, using cache");
                self.cache.sessions()
            }
        }
    }

    /// A session's messages, remote-first. Any well-formed remote answer
    /// (including an empty list) replaces the cached copy.
    pub async fn messages(&self, session_id: &str) -> RepositoryResult<Vec<ChatMessage>> {
        match self.client.load_messages(session_id).await {
            Ok(remote) => {
                self.cache.set_messages(session_id, &remote)?;
                Ok(remote)
            }
            Err(err) => {
                debug!(session_id, error = %err, "messages unavailable remotely, using cache");
                self.cache.messages(session_id)
            }
        }
    }

    /// Persist a session's messages: cache synchronously, backend
    /// best-effort. The session's title and timestamp ride along so the
    /// backend copy of the sidebar stays consistent.
    pub async fn save_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> RepositoryResult<()> {
        self.cache.set_messages(session_id, messages)?;

        let meta = self.session_meta(session_id)?;
        let json = serde_json::to_string(messages)?;
        if let Err(err) = self
            .client
            .save_messages(session_id, json, &meta.title, meta.ts)
            .await
        {
            warn!(session_id, error = %err, "remote save failed, keeping local copy");
        }
        Ok(())
    }

    /// Fire-and-forget variant of [`save_messages`](Self::save_messages) for
    /// callers that must not await the backend (chip removal, window close).
    /// The cache write still happens inline; outside a runtime the remote
    /// half is skipped.
    pub fn save_messages_detached(&self, session_id: &str, messages: &[ChatMessage]) {
        if let Err(err) = self.cache.set_messages(session_id, messages) {
            warn!(session_id, error = %err, "local save failed");
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                let store = self.clone();
                let session_id = session_id.to_string();
                let messages = messages.to_vec();
                handle.spawn(async move {
                    let _ = store.save_messages(&session_id, &messages).await;
                });
            }
            Err(_) => warn!(session_id, "no runtime, remote save skipped"),
        }
    }

    /// Create a new session, put it at the top of the list and make it
    /// current. Nothing is sent to the backend until the first save.
    pub fn create_session(&self) -> RepositoryResult<SessionMeta> {
        let meta = SessionMeta::new();
        let mut sessions = self.cache.sessions()?;
        sessions.insert(0, meta.clone());
        self.cache.set_sessions(&sessions)?;
        self.cache.set_current_session_id(&meta.id)?;
        debug!(session_id = %meta.id, "session created");
        Ok(meta)
    }

    /// The current session id. When no session is marked current, or the
    /// marked id no longer exists in the session list, a fresh session is
    /// created and marked current; existing sessions are never silently
    /// reused. Falling back to a survivor happens only on delete.
    pub fn ensure_current(&self) -> RepositoryResult<String> {
        let sessions = self.cache.sessions()?;
        if let Some(current) = self.cache.current_session_id()? {
            if sessions.iter().any(|s| s.id == current) {
                return Ok(current);
            }
        }
        Ok(self.create_session()?.id)
    }

    pub fn current_session_id(&self) -> RepositoryResult<Option<String>> {
        self.cache.current_session_id()
    }

    pub fn set_current_session_id(&self, session_id: &str) -> RepositoryResult<()> {
        self.cache.set_current_session_id(session_id)
    }

    /// Replace the placeholder title with one derived from the first
    /// question. Returns whether anything changed; callers persist the
    /// messages afterwards, which pushes the new title to the backend.
    pub fn rename_if_default(&self, session_id: &str, question: &str) -> RepositoryResult<bool> {
        let mut sessions = self.cache.sessions()?;
        let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) else {
            return Ok(false);
        };
        if !session.has_default_title() {
            return Ok(false);
        }
        session.title = derive_title(question, TITLE_MAX_LEN);
        self.cache.set_sessions(&sessions)?;
        Ok(true)
    }

    /// Manual rename from the sidebar. Empty input is ignored; the title is
    /// capped at [`MANUAL_TITLE_MAX_LEN`] characters. The new title reaches
    /// the backend with the next message save.
    pub async fn rename_session(&self, session_id: &str, title: &str) -> RepositoryResult<bool> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Ok(false);
        }
        let capped: String = trimmed.chars().take(MANUAL_TITLE_MAX_LEN).collect();

        let mut sessions = self.cache.sessions()?;
        let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) else {
            return Ok(false);
        };
        if session.title == capped {
            return Ok(false);
        }
        session.title = capped;
        self.cache.set_sessions(&sessions)?;

        let messages = self.cache.messages(session_id)?;
        self.save_messages(session_id, &messages).await?;
        Ok(true)
    }

    /// Delete a session everywhere: backend (best-effort), cached messages,
    /// session list. When the deleted session was current, selection moves
    /// to the most recent survivor or a fresh session. Returns the current
    /// session id afterwards.
    pub async fn delete_session(&self, session_id: &str) -> RepositoryResult<String> {
        if let Err(err) = self.client.remove_session(session_id).await {
            warn!(session_id, error = %err, "remote session removal failed");
        }
        self.cache.remove_messages(session_id)?;

        let mut sessions = self.cache.sessions()?;
        sessions.retain(|s| s.id != session_id);
        self.cache.set_sessions(&sessions)?;

        let was_current = self
            .cache
            .current_session_id()?
            .is_some_and(|current| current == session_id);
        if !was_current {
            return self.ensure_current();
        }
        match sessions.first() {
            Some(next) => {
                self.cache.set_current_session_id(&next.id)?;
                Ok(next.id.clone())
            }
            None => Ok(self.create_session()?.id),
        }
    }

    /// Whether rejected questions are swept from history automatically.
    /// Defaults to on.
    pub fn auto_cleanup_enabled(&self) -> RepositoryResult<bool> {
        Ok(self.cache.auto_cleanup()?.unwrap_or(true))
    }

    pub fn set_auto_cleanup(&self, enabled: bool) -> RepositoryResult<()> {
        self.cache.set_auto_cleanup(enabled)
    }

    /// Run the cleanup sweep over one session and persist the result if
    /// anything was removed. Returns the number of messages dropped.
    pub async fn clean_session(&self, session_id: &str) -> RepositoryResult<usize> {
        let messages = self.cache.messages(session_id)?;
        let (cleaned, removed) = sweep_invalid_questions(&messages);
        if removed > 0 {
            self.save_messages(session_id, &cleaned).await?;
            debug!(session_id, removed, "cleanup sweep removed messages");
        }
        Ok(removed)
    }

    /// Sweep every cached session. Returns the total number of messages
    /// removed across all of them.
    pub async fn clean_all_sessions(&self) -> RepositoryResult<usize> {
        let mut total = 0;
        for session in self.cache.sessions()? {
            total += self.clean_session(&session.id).await?;
        }
        Ok(total)
    }

    fn session_meta(&self, session_id: &str) -> RepositoryResult<SessionMeta> {
        let sessions = self.cache.sessions()?;
        Ok(sessions
            .into_iter()
            .find(|s| s.id == session_id)
            .unwrap_or_else(|| SessionMeta {
                id: session_id.to_string(),
                ..SessionMeta::new()
            }))
    }
}

/// Remove every user question flagged as rejected for lack of documents,
/// together with the bot reply immediately following it.
pub fn sweep_invalid_questions(messages: &[ChatMessage]) -> (Vec<ChatMessage>, usize) {
    let mut cleaned = Vec::with_capacity(messages.len());
    let mut i = 0;
    while i < messages.len() {
        let msg = &messages[i];
        if msg.role == Role::User && msg.no_docs_warning {
            i += 1;
            if messages.get(i).is_some_and(|next| next.role == Role::Bot) {
                i += 1;
            }
            continue;
        }
        cleaned.push(msg.clone());
        i += 1;
    }
    let removed = messages.len() - cleaned.len();
    (cleaned, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory_cache::InMemorySessionCache;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn store_with_dead_remote() -> (InMemorySessionCache, SessionStore) {
        let cache = InMemorySessionCache::new();
        let store = SessionStore::new(
            Arc::new(cache.clone()),
            Arc::new(BackendClient::new("http://127.0.0.1:1")),
        );
        (cache, store)
    }

    /// Serve one canned HTTP response on an ephemeral port, then stop.
    async fn one_shot_server(body: String) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 8192];
                let _ = sock.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn messages_round_trip_locally_when_remote_is_down() {
        let (_cache, store) = store_with_dead_remote();
        let session = store.create_session().unwrap();
        let msgs = vec![
            ChatMessage::user("What is the refund policy?"),
            ChatMessage::bot("Thirty days.", vec![]),
        ];
        store.save_messages(&session.id, &msgs).await.unwrap();
        assert_eq!(store.messages(&session.id).await.unwrap(), msgs);
    }

    #[tokio::test]
    async fn remote_session_list_replaces_cache_when_non_empty() {
        let cache = InMemorySessionCache::new();
        cache
            .set_sessions(&[SessionMeta {
                id: "s_local".to_string(),
                title: "Stale".to_string(),
                ts: 1,
            }])
            .unwrap();

        let body = r#"{"ok":true,"sessions":[{"id":"s_remote","title":"Fresh","ts":2}]}"#;
        let base = one_shot_server(body.to_string()).await;
        let store = SessionStore::new(
            Arc::new(cache.clone()),
            Arc::new(BackendClient::new(base)),
        );

        let sessions = store.sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "s_remote");
        assert_eq!(cache.sessions().unwrap()[0].id, "s_remote");
    }

    #[tokio::test]
    async fn empty_remote_session_list_does_not_wipe_cache() {
        let cache = InMemorySessionCache::new();
        cache
            .set_sessions(&[SessionMeta {
                id: "s_local".to_string(),
                title: "Unsynced".to_string(),
                ts: 1,
            }])
            .unwrap();

        let base = one_shot_server(r#"{"ok":true,"sessions":[]}"#.to_string()).await;
        let store = SessionStore::new(Arc::new(cache), Arc::new(BackendClient::new(base)));

        let sessions = store.sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "s_local");
    }

    #[tokio::test]
    async fn remote_messages_replace_the_cached_copy() {
        let cache = InMemorySessionCache::new();
        cache
            .set_messages("s_1", &[ChatMessage::user("stale local")])
            .unwrap();

        let body =
            r#"{"ok":true,"messages":[{"role":"user","text":"fresh"},{"role":"bot","text":"answer"}]}"#;
        let base = one_shot_server(body.to_string()).await;
        let store = SessionStore::new(
            Arc::new(cache.clone()),
            Arc::new(BackendClient::new(base)),
        );

        let messages = store.messages("s_1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "fresh");
        assert_eq!(cache.messages("s_1").unwrap(), messages);
    }

    #[tokio::test]
    async fn missing_current_pointer_creates_a_fresh_session() {
        let (cache, store) = store_with_dead_remote();
        cache
            .set_sessions(&[SessionMeta {
                id: "s_existing".to_string(),
                title: "Old".to_string(),
                ts: 1,
            }])
            .unwrap();

        let current = store.ensure_current().unwrap();
        assert_ne!(current, "s_existing");
        assert_eq!(cache.current_session_id().unwrap(), Some(current.clone()));
        // the existing session stays in the list, below the new one
        let sessions = cache.sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, current);
        assert_eq!(sessions[1].id, "s_existing");
    }

    #[tokio::test]
    async fn stale_current_pointer_creates_a_fresh_session() {
        let (cache, store) = store_with_dead_remote();
        cache
            .set_sessions(&[SessionMeta {
                id: "s_existing".to_string(),
                title: "Old".to_string(),
                ts: 1,
            }])
            .unwrap();
        cache.set_current_session_id("s_gone").unwrap();

        let current = store.ensure_current().unwrap();
        assert_ne!(current, "s_existing");
        assert_ne!(current, "s_gone");
        assert_eq!(cache.sessions().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn valid_current_pointer_is_kept() {
        let (_cache, store) = store_with_dead_remote();
        let session = store.create_session().unwrap();
        assert_eq!(store.ensure_current().unwrap(), session.id);
        assert_eq!(store.sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn initialize_defaults_cleanup_on_and_creates_a_session() {
        let (cache, store) = store_with_dead_remote();
        let current = store.initialize().await.unwrap();
        assert!(current.starts_with("s_"));
        assert_eq!(cache.auto_cleanup().unwrap(), Some(true));
        assert!(store.auto_cleanup_enabled().unwrap());

        store.set_auto_cleanup(false).unwrap();
        assert!(!store.auto_cleanup_enabled().unwrap());
    }

    #[tokio::test]
    async fn rename_if_default_applies_once() {
        let (_cache, store) = store_with_dead_remote();
        let session = store.create_session().unwrap();

        assert!(store
            .rename_if_default(&session.id, "What is the refund policy? Please be exact.")
            .unwrap());
        let sessions = store.sessions().await.unwrap();
        assert_eq!(sessions[0].title, "What is the refund policy");

        assert!(!store
            .rename_if_default(&session.id, "Second question")
            .unwrap());
        let sessions = store.sessions().await.unwrap();
        assert_eq!(sessions[0].title, "What is the refund policy");
    }

    #[tokio::test]
    async fn manual_rename_trims_and_caps() {
        let (_cache, store) = store_with_dead_remote();
        let session = store.create_session().unwrap();

        assert!(!store.rename_session(&session.id, "   ").await.unwrap());

        let long = "x".repeat(100);
        assert!(store.rename_session(&session.id, &long).await.unwrap());
        let sessions = store.sessions().await.unwrap();
        assert_eq!(sessions[0].title.chars().count(), MANUAL_TITLE_MAX_LEN);
    }

    #[tokio::test]
    async fn deleting_current_session_reselects_most_recent() {
        let (_cache, store) = store_with_dead_remote();
        let older = store.create_session().unwrap();
        let newer = store.create_session().unwrap();
        assert_eq!(
            store.current_session_id().unwrap().as_deref(),
            Some(newer.id.as_str())
        );

        let current = store.delete_session(&newer.id).await.unwrap();
        assert_eq!(current, older.id);
        let sessions = store.sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, older.id);
    }

    #[tokio::test]
    async fn deleting_last_session_creates_a_fresh_one() {
        let (_cache, store) = store_with_dead_remote();
        let only = store.create_session().unwrap();
        let current = store.delete_session(&only.id).await.unwrap();
        assert_ne!(current, only.id);
        assert_eq!(store.sessions().await.unwrap().len(), 1);
    }

    #[test]
    fn sweep_removes_flagged_question_and_its_reply() {
        let mut flagged = ChatMessage::user("anything indexed?");
        flagged.no_docs_warning = true;
        let messages = vec![
            flagged,
            ChatMessage::bot("No documents yet.", vec![]),
            ChatMessage::user("keep me"),
        ];
        let (cleaned, removed) = sweep_invalid_questions(&messages);
        assert_eq!(removed, 2);
        assert_eq!(cleaned, vec![ChatMessage::user("keep me")]);
    }

    #[test]
    fn sweep_handles_flagged_question_without_reply() {
        let mut flagged = ChatMessage::user("rejected, no answer came");
        flagged.no_docs_warning = true;
        let messages = vec![ChatMessage::user("keep"), flagged];
        let (cleaned, removed) = sweep_invalid_questions(&messages);
        assert_eq!(removed, 1);
        assert_eq!(cleaned, vec![ChatMessage::user("keep")]);
    }

    #[tokio::test]
    async fn clean_session_persists_the_swept_list() {
        let (_cache, store) = store_with_dead_remote();
        let session = store.create_session().unwrap();
        let mut flagged = ChatMessage::user("bad");
        flagged.no_docs_warning = true;
        store
            .save_messages(
                &session.id,
                &[
                    flagged,
                    ChatMessage::bot("rejected", vec![]),
                    ChatMessage::user("good"),
                ],
            )
            .await
            .unwrap();

        let removed = store.clean_session(&session.id).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            store.messages(&session.id).await.unwrap(),
            vec![ChatMessage::user("good")]
        );
    }
}
