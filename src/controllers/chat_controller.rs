use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, BackendClient, QueryOptions, QueryOutcome, QueryRequest};
use crate::models::{AppState, AttachmentEntry, ChatMessage, FileRef, SessionMeta};
use crate::repositories::SessionStore;
use crate::services::UploadController;
use crate::view::{IndexPanelState, TranscriptRow, build_transcript, qa_export_text};

/// How one send attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Nothing to send: no text and no pending attachments.
    Idle,
    /// Another send is already in flight.
    Busy,
    /// The pipeline was cancelled; uncommitted input was restored.
    Cancelled,
    /// At least one upload failed; any draft text was kept for retry.
    UploadsFailed,
    /// Attachments were indexed and there was no text to send.
    UploadedOnly,
    /// The question was answered.
    Answered,
    /// The backend rejected the question. The message is rendered inline by
    /// the embedder; it is never written into history.
    Rejected { no_documents: bool, message: String },
    /// Transport failure while querying, reported inline next to the
    /// question; nothing is persisted for it.
    Failed { message: String },
}

/// Orchestrates the send pipeline and the session-level operations around
/// it. Owns nothing exclusively; everything is shared handles so the
/// embedding UI can clone the controller freely.
#[derive(Clone)]
pub struct ChatController {
    state: Arc<AppState>,
    store: SessionStore,
    client: Arc<BackendClient>,
    uploads: UploadController,
    options: Arc<Mutex<QueryOptions>>,
}

/// Releases the busy flag on every exit path of `send`.
struct BusyGuard<'a>(&'a AppState);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set_busy(false);
    }
}

impl ChatController {
    pub fn new(state: Arc<AppState>, store: SessionStore, client: Arc<BackendClient>) -> Self {
        let uploads = UploadController::new(Arc::clone(&client));
        Self {
            state,
            store,
            client,
            uploads,
            options: Arc::new(Mutex::new(QueryOptions::default())),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn query_options(&self) -> QueryOptions {
        self.options.lock().clone()
    }

    pub fn set_query_options(&self, options: QueryOptions) {
        *self.options.lock() = options;
    }

    /// Startup: pick (or create) the current session and, when the
    /// auto-cleanup flag is on, sweep rejected questions out of every cached
    /// session. Returns the current session id.
    pub async fn initialize(&self) -> Result<String> {
        let current = self.store.initialize().await?;
        if self.store.auto_cleanup_enabled()? {
            let removed = self.store.clean_all_sessions().await?;
            if removed > 0 {
                info!(removed, "cleanup sweep on startup");
            }
        }
        Ok(current)
    }

    /// Run the full send pipeline once: upload pending attachments, commit
    /// the question, query the backend, reconcile the answer into the store.
    pub async fn send(&self) -> Result<SendOutcome> {
        if !self.state.can_send() {
            return Ok(SendOutcome::Idle);
        }
        if !self.state.try_set_busy() {
            return Ok(SendOutcome::Busy);
        }
        let _busy = BusyGuard(&self.state);

        let token = self.state.pipeline_token();
        let session_id = self.store.ensure_current()?;

        let pending = self.state.pending_attachments();
        if !pending.is_empty() {
            let all_ok = self.uploads.upload_all(&pending, &session_id, &token).await;
            if token.is_cancelled() {
                return Ok(SendOutcome::Cancelled);
            }
            if !all_ok {
                return Ok(SendOutcome::UploadsFailed);
            }
        }

        let question = self.state.input().trim().to_string();
        if question.is_empty() {
            return Ok(SendOutcome::UploadedOnly);
        }
        self.state.set_input("");

        let mut messages = self.store.messages(&session_id).await?;
        messages.push(ChatMessage::user(&question));
        self.store.rename_if_default(&session_id, &question)?;
        self.store.save_messages(&session_id, &messages).await?;

        let request = QueryRequest {
            question: question.clone(),
            session_id: session_id.clone(),
            options: self.query_options(),
        };
        match self.client.query(&request, &token).await {
            Ok(QueryOutcome::Answer { text, sources }) => {
                messages.push(ChatMessage::bot(text, sources));
                self.store.save_messages(&session_id, &messages).await?;
                Ok(SendOutcome::Answered)
            }
            Ok(QueryOutcome::Rejected(rejection)) => {
                let no_documents = rejection.is_no_documents();
                if no_documents {
                    // flag the question so the cleanup sweep can find it;
                    // the rejection text itself is rendered inline, never
                    // written into history
                    if let Some(last) = messages.last_mut() {
                        last.no_docs_warning = true;
                    }
                    self.store.save_messages(&session_id, &messages).await?;
                }
                debug!(session_id, no_documents, "question rejected");
                Ok(SendOutcome::Rejected {
                    no_documents,
                    message: rejection.display_message(),
                })
            }
            Err(ApiError::Cancelled) => {
                // roll back the optimistic question and give the text back
                messages.pop();
                self.store.save_messages(&session_id, &messages).await?;
                self.state.set_input(question);
                Ok(SendOutcome::Cancelled)
            }
            Err(err) => {
                warn!(session_id, error = %err, "query failed");
                Ok(SendOutcome::Failed {
                    message: err.to_string(),
                })
            }
        }
    }

    /// Cancel everything in flight: the query, every uploading attachment,
    /// and the busy state they hold.
    pub fn stop_all(&self) {
        self.state.cancel_pipeline();
        for entry in self.state.attachments() {
            if entry.status().is_uploading() {
                entry.cancel();
            }
        }
    }

    /// Start a fresh conversation and make it current. Draft input and the
    /// attachment tray are cleared.
    pub fn new_chat(&self) -> Result<SessionMeta> {
        let meta = self.store.create_session()?;
        self.state.set_input("");
        self.state.clear_attachments();
        Ok(meta)
    }

    /// Make a session current and return its rendered transcript, with the
    /// cleanup sweep applied first when enabled.
    pub async fn select_session(&self, session_id: &str) -> Result<Vec<TranscriptRow>> {
        self.store.set_current_session_id(session_id)?;
        self.render_session(session_id).await
    }

    pub async fn render_session(&self, session_id: &str) -> Result<Vec<TranscriptRow>> {
        if self.store.auto_cleanup_enabled()? {
            self.store.clean_session(session_id).await?;
        }
        let messages = self.store.messages(session_id).await?;
        Ok(build_transcript(&messages))
    }

    /// Delete a session; returns the id that is current afterwards.
    pub async fn delete_session(&self, session_id: &str) -> Result<String> {
        Ok(self.store.delete_session(session_id).await?)
    }

    pub async fn rename_session(&self, session_id: &str, title: &str) -> Result<bool> {
        Ok(self.store.rename_session(session_id, title).await?)
    }

    /// Plain-text Q/A export of a session, for the clipboard.
    pub async fn copy_qa_text(&self, session_id: &str) -> Result<String> {
        let messages = self.store.messages(session_id).await?;
        Ok(qa_export_text(&messages))
    }

    pub fn add_attachment(&self, file: FileRef) -> AttachmentEntry {
        let entry = AttachmentEntry::new(file);
        self.state.add_attachment(entry.clone());
        entry
    }

    /// Remove an attachment chip. A successfully indexed file is also
    /// dropped from the backend index, fire-and-forget.
    pub fn remove_attachment(&self, id: u64) -> Option<AttachmentEntry> {
        let entry = self.state.remove_attachment(id)?;
        entry.cancel();
        if entry.status().is_success() {
            if let (Ok(handle), Ok(Some(session_id))) =
                (Handle::try_current(), self.store.current_session_id())
            {
                let client = Arc::clone(&self.client);
                let filename = entry.file().name().to_string();
                handle.spawn(async move {
                    if let Err(err) = client.remove_indexed(&filename, &session_id).await {
                        warn!(filename, error = %err, "index removal failed");
                    }
                });
            }
        }
        Some(entry)
    }

    /// Retry a failed upload immediately, outside the send pipeline.
    pub async fn retry_attachment(&self, id: u64) -> Result<bool> {
        let Some(entry) = self
            .state
            .attachments()
            .into_iter()
            .find(|e| e.id() == id)
        else {
            return Ok(false);
        };
        let session_id = self.store.ensure_current()?;
        let token = self.state.pipeline_token();
        Ok(self.uploads.upload(&entry, &session_id, &token).await)
    }

    pub fn cancel_attachment(&self, id: u64) {
        if let Some(entry) = self.state.attachments().into_iter().find(|e| e.id() == id) {
            entry.cancel();
        }
    }

    /// Render state for the indexed-documents panel of the current session.
    pub async fn index_panel(&self) -> Result<IndexPanelState> {
        let Some(session_id) = self.store.current_session_id()? else {
            return Ok(IndexPanelState::NoSession);
        };
        Ok(IndexPanelState::from_stats(
            self.client.session_stats(&session_id).await,
        ))
    }

    /// Remove a document from the index panel. Unlike chip removal this is
    /// awaited so the panel can report the failure.
    pub async fn remove_indexed_document(&self, filename: &str) -> Result<()> {
        let session_id = self.store.ensure_current()?;
        self.client.remove_indexed(filename, &session_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::repositories::InMemorySessionCache;

    fn controller() -> ChatController {
        controller_against("http://127.0.0.1:1")
    }

    fn controller_against(base_url: impl Into<String>) -> ChatController {
        let client = Arc::new(BackendClient::new(base_url));
        let store = SessionStore::new(
            Arc::new(InMemorySessionCache::new()),
            Arc::clone(&client),
        );
        ChatController::new(Arc::new(AppState::new()), store, client)
    }

    /// Serve the same canned HTTP response to every request.
    async fn canned_server(body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    use tokio::io::{AsyncReadExt, AsyncWriteExt};
                    let mut buf = [0u8; 8192];
                    let _ = sock.read(&mut buf).await;
                    let resp = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = sock.write_all(resp.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn empty_send_is_a_no_op() {
        let ctl = controller();
        ctl.initialize().await.unwrap();
        assert_eq!(ctl.send().await.unwrap(), SendOutcome::Idle);
        assert!(!ctl.state().is_busy());
    }

    #[tokio::test]
    async fn second_concurrent_send_is_rejected() {
        let ctl = controller();
        ctl.initialize().await.unwrap();
        ctl.state().set_input("question");
        ctl.state().set_busy(true);
        assert_eq!(ctl.send().await.unwrap(), SendOutcome::Busy);
        assert!(ctl.state().is_busy());
    }

    #[tokio::test]
    async fn transport_failure_is_reported_inline_and_never_persisted() {
        let ctl = controller();
        let session_id = ctl.initialize().await.unwrap();
        ctl.state().set_input("What is the refund policy?");

        let outcome = ctl.send().await.unwrap();
        assert!(matches!(outcome, SendOutcome::Failed { .. }));
        assert!(!ctl.state().is_busy());
        assert!(ctl.state().input().is_empty());

        // the question stays in history, the failure does not
        let messages = ctl.store().messages(&session_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert!(!messages.iter().any(|m| m.role == Role::Bot));

        // title was derived from the first question
        let sessions = ctl.store().sessions().await.unwrap();
        assert_eq!(sessions[0].title, "What is the refund policy");
    }

    #[tokio::test]
    async fn no_documents_rejection_flags_the_question_without_a_bot_row() {
        let base = canned_server(
            r#"{"ok":false,"error":"No documents indexed","message":"Upload a file first.","suggestion":"Drop a PDF into the chat."}"#,
        )
        .await;
        let ctl = controller_against(base);
        let session_id = ctl.initialize().await.unwrap();
        ctl.state().set_input("anything indexed?");

        let outcome = ctl.send().await.unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Rejected {
                no_documents: true,
                message:
                    "No documents indexed\n\nUpload a file first.\n\nDrop a PDF into the chat."
                        .to_string(),
            }
        );

        let messages = ctl.store().messages(&session_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert!(messages[0].no_docs_warning);
    }

    #[tokio::test]
    async fn plain_rejection_persists_neither_flag_nor_bot_row() {
        let base = canned_server(r#"{"ok":false,"error":"Question too long."}"#).await;
        let ctl = controller_against(base);
        let session_id = ctl.initialize().await.unwrap();
        ctl.state().set_input("a perfectly ordinary question");

        let outcome = ctl.send().await.unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Rejected {
                no_documents: false,
                message: "Question too long.".to_string(),
            }
        );

        let messages = ctl.store().messages(&session_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert!(!messages[0].no_docs_warning);
    }

    #[tokio::test]
    async fn failed_upload_keeps_the_draft_text() {
        let ctl = controller();
        ctl.initialize().await.unwrap();
        ctl.state().set_input("pending question");
        ctl.add_attachment(FileRef::from_bytes("a.pdf", vec![1, 2, 3]));

        assert_eq!(ctl.send().await.unwrap(), SendOutcome::UploadsFailed);
        assert_eq!(ctl.state().input(), "pending question");
        assert!(ctl.state().attachments()[0].status().is_error());
        assert!(!ctl.state().is_busy());
    }

    #[tokio::test]
    async fn new_chat_resets_the_composer() {
        let ctl = controller();
        ctl.initialize().await.unwrap();
        ctl.state().set_input("draft");
        ctl.add_attachment(FileRef::from_bytes("a.pdf", vec![1]));

        let meta = ctl.new_chat().unwrap();
        assert!(ctl.state().input().is_empty());
        assert!(ctl.state().attachments().is_empty());
        assert_eq!(
            ctl.store().current_session_id().unwrap(),
            Some(meta.id)
        );
    }

    #[tokio::test]
    async fn render_session_applies_cleanup_sweep() {
        let ctl = controller();
        let session_id = ctl.initialize().await.unwrap();

        let mut flagged = ChatMessage::user("rejected");
        flagged.no_docs_warning = true;
        ctl.store()
            .save_messages(
                &session_id,
                &[
                    flagged,
                    ChatMessage::bot("no documents", vec![]),
                    ChatMessage::user("kept"),
                ],
            )
            .await
            .unwrap();

        let rows = ctl.render_session(&session_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bubbles, vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn render_session_keeps_flagged_rows_when_cleanup_is_off() {
        let ctl = controller();
        let session_id = ctl.initialize().await.unwrap();
        ctl.store().set_auto_cleanup(false).unwrap();

        let mut flagged = ChatMessage::user("rejected");
        flagged.no_docs_warning = true;
        ctl.store()
            .save_messages(&session_id, &[flagged])
            .await
            .unwrap();

        let rows = ctl.render_session(&session_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].no_docs_warning);
    }

    #[tokio::test]
    async fn qa_text_pairs_questions_and_answers() {
        let ctl = controller();
        let session_id = ctl.initialize().await.unwrap();
        ctl.store()
            .save_messages(
                &session_id,
                &[
                    ChatMessage::user("why?"),
                    ChatMessage::bot("because.", vec![]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            ctl.copy_qa_text(&session_id).await.unwrap(),
            "Q1: why?\n\nA1: because."
        );
    }

    #[tokio::test]
    async fn stop_all_cancels_uploading_attachments() {
        let ctl = controller();
        ctl.initialize().await.unwrap();
        let entry = ctl.add_attachment(FileRef::from_bytes("a.pdf", vec![1]));
        entry.begin_upload();

        ctl.stop_all();
        assert!(matches!(
            entry.status(),
            crate::models::AttachmentStatus::Canceled
        ));
        // a fresh pipeline token is armed for the next send
        assert!(!ctl.state().pipeline_token().is_cancelled());
    }

    #[tokio::test]
    async fn removing_a_pending_attachment_needs_no_backend() {
        let ctl = controller();
        ctl.initialize().await.unwrap();
        let entry = ctl.add_attachment(FileRef::from_bytes("a.pdf", vec![1]));
        let removed = ctl.remove_attachment(entry.id()).unwrap();
        assert_eq!(removed.id(), entry.id());
        assert!(ctl.state().attachments().is_empty());
        assert!(ctl.remove_attachment(entry.id()).is_none());
    }

    #[tokio::test]
    async fn index_panel_reports_error_when_backend_is_down() {
        let ctl = controller();
        ctl.initialize().await.unwrap();
        assert!(matches!(
            ctl.index_panel().await.unwrap(),
            IndexPanelState::Error { .. }
        ));
    }
}
