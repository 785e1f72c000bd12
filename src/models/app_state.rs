use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::attachment::AttachmentEntry;
use crate::services::cancellation::CancellationToken;

/// Process-wide transient state for the chat surface: the busy flag that
/// serializes the send pipeline, the draft input text, the attachment list
/// and the pipeline cancellation token. Persisted state (current session id,
/// auto-cleanup flag) lives in the session cache, not here.
pub struct AppState {
    busy: AtomicBool,
    input: Mutex<String>,
    attachments: Mutex<Vec<AttachmentEntry>>,
    pipeline: Mutex<CancellationToken>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            input: Mutex::new(String::new()),
            attachments: Mutex::new(Vec::new()),
            pipeline: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    /// Claim the busy flag. Returns false when a send is already in flight.
    pub fn try_set_busy(&self) -> bool {
        !self.busy.swap(true, Ordering::SeqCst)
    }

    pub fn input(&self) -> String {
        self.input.lock().clone()
    }

    pub fn set_input(&self, text: impl Into<String>) {
        *self.input.lock() = text.into();
    }

    pub fn attachments(&self) -> Vec<AttachmentEntry> {
        self.attachments.lock().clone()
    }

    pub fn pending_attachments(&self) -> Vec<AttachmentEntry> {
        self.attachments
            .lock()
            .iter()
            .filter(|e| e.status().is_pending())
            .cloned()
            .collect()
    }

    pub fn add_attachment(&self, entry: AttachmentEntry) {
        self.attachments.lock().push(entry);
    }

    pub fn remove_attachment(&self, id: u64) -> Option<AttachmentEntry> {
        let mut list = self.attachments.lock();
        let pos = list.iter().position(|e| e.id() == id)?;
        Some(list.remove(pos))
    }

    pub fn clear_attachments(&self) {
        self.attachments.lock().clear();
    }

    /// Send is available when there is draft text or at least one pending
    /// attachment.
    pub fn can_send(&self) -> bool {
        !self.input.lock().trim().is_empty() || !self.pending_attachments().is_empty()
    }

    /// Current pipeline token, replaced with a fresh one if a previous
    /// cancellation already consumed it.
    pub fn pipeline_token(&self) -> CancellationToken {
        let mut token = self.pipeline.lock();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        token.clone()
    }

    /// Cancel everything attached to the current pipeline and arm a fresh
    /// token for the next send.
    pub fn cancel_pipeline(&self) {
        let mut token = self.pipeline.lock();
        token.cancel();
        *token = CancellationToken::new();
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
