use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::services::cancellation::CancellationToken;

/// Per-entry upload lifecycle.
///
/// ```text
/// Pending --(send / retry trigger)--> Uploading
/// Uploading --(progress)--> Uploading      (percent updated, clamped 0-100)
/// Uploading --(server accepts)--> Success
/// Uploading --(server rejects / network)--> Error
/// Uploading --(user cancels)--> Canceled
/// Error --(user retries)--> Uploading
/// ```
///
/// `Success` and `Canceled` are terminal: nothing short of removing the
/// entry leaves them, and a network callback arriving after cancellation is
/// ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentStatus {
    Pending,
    Uploading { percent: f32 },
    Success { replaced: bool },
    Error { message: String },
    Canceled,
}

impl AttachmentStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, AttachmentStatus::Pending)
    }

    pub fn is_uploading(&self) -> bool {
        matches!(self, AttachmentStatus::Uploading { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttachmentStatus::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AttachmentStatus::Error { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttachmentStatus::Success { .. } | AttachmentStatus::Canceled
        )
    }
}

/// Coarse file kind derived from the extension, used for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Pptx,
    Docx,
    Other,
}

/// A file selected for upload: name plus owned content bytes.
#[derive(Debug, Clone)]
pub struct FileRef {
    name: String,
    bytes: Arc<Vec<u8>>,
}

impl FileRef {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::new(bytes),
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_bytes(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn bytes(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.bytes)
    }

    pub fn kind(&self) -> FileKind {
        let ext = self
            .name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match ext.as_str() {
            "pdf" => FileKind::Pdf,
            "ppt" | "pptx" => FileKind::Pptx,
            "doc" | "docx" => FileKind::Docx,
            _ => FileKind::Other,
        }
    }
}

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

struct EntryInner {
    id: u64,
    file: FileRef,
    status: Mutex<AttachmentStatus>,
    cancel: CancellationToken,
}

/// One file-upload attempt. Entries are compared by identity, never by
/// filename: re-adding a same-named file creates a second independent entry.
/// Cloning shares the same underlying entry.
#[derive(Clone)]
pub struct AttachmentEntry {
    inner: Arc<EntryInner>,
}

impl AttachmentEntry {
    pub fn new(file: FileRef) -> Self {
        Self {
            inner: Arc::new(EntryInner {
                id: NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed),
                file,
                status: Mutex::new(AttachmentStatus::Pending),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn file(&self) -> &FileRef {
        &self.inner.file
    }

    pub fn status(&self) -> AttachmentStatus {
        self.inner.status.lock().clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn error_message(&self) -> Option<String> {
        match &*self.inner.status.lock() {
            AttachmentStatus::Error { message } => Some(message.clone()),
            _ => None,
        }
    }

    /// `Pending | Error -> Uploading`. Returns false from any other state.
    pub fn begin_upload(&self) -> bool {
        if self.inner.cancel.is_cancelled() {
            return false;
        }
        let mut status = self.inner.status.lock();
        match *status {
            AttachmentStatus::Pending | AttachmentStatus::Error { .. } => {
                *status = AttachmentStatus::Uploading { percent: 0.0 };
                true
            }
            _ => false,
        }
    }

    /// Update upload progress. Only meaningful while `Uploading`; the
    /// percentage is clamped to `[0, 100]`.
    pub fn set_progress(&self, percent: f32) {
        let mut status = self.inner.status.lock();
        if status.is_uploading() {
            *status = AttachmentStatus::Uploading {
                percent: percent.clamp(0.0, 100.0),
            };
        }
    }

    /// `Uploading -> Success`. Ignored after cancellation: a late server
    /// acceptance must not overwrite `Canceled`.
    pub fn complete(&self, replaced: bool) -> bool {
        if self.inner.cancel.is_cancelled() {
            return false;
        }
        let mut status = self.inner.status.lock();
        if status.is_uploading() {
            *status = AttachmentStatus::Success { replaced };
            true
        } else {
            false
        }
    }

    /// `Uploading -> Error`. Ignored after cancellation, like `complete`.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        if self.inner.cancel.is_cancelled() {
            return false;
        }
        let mut status = self.inner.status.lock();
        if status.is_uploading() {
            *status = AttachmentStatus::Error {
                message: message.into(),
            };
            true
        } else {
            false
        }
    }

    /// Cancel the in-flight upload. The token is cancelled unconditionally
    /// (aborting any network call); the status only moves to `Canceled`
    /// from `Uploading` — a pending or settled entry keeps its state.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
        let mut status = self.inner.status.lock();
        if status.is_uploading() {
            *status = AttachmentStatus::Canceled;
        }
    }
}
