use crate::models::{AttachmentStatus, ChatMessage, Role, SourceRef};

/// Longest bot bubble before the text is split across several.
pub const BUBBLE_MAX_LEN: usize = 600;

/// One rendered row of the message stream.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptRow {
    pub role: Role,
    /// Bubble texts, in order. User rows always have exactly one; bot rows
    /// may be split into several when the answer is long.
    pub bubbles: Vec<String>,
    pub sources: Vec<SourceRef>,
    pub no_docs_warning: bool,
}

/// Project a session's messages onto renderable rows. Long bot answers are
/// split into bubbles of at most [`BUBBLE_MAX_LEN`] characters each.
pub fn build_transcript(messages: &[ChatMessage]) -> Vec<TranscriptRow> {
    messages
        .iter()
        .map(|msg| {
            let bubbles = match msg.role {
                Role::User => vec![msg.text.clone()],
                Role::Bot => split_long_text(&msg.text, BUBBLE_MAX_LEN),
            };
            TranscriptRow {
                role: msg.role,
                bubbles,
                sources: msg.sources.clone().unwrap_or_default(),
                no_docs_warning: msg.no_docs_warning,
            }
        })
        .collect()
}

/// Split text into pieces of at most `max_len` characters, breaking at the
/// last space inside the window when one exists and hard-cutting otherwise.
/// Leading and trailing whitespace of each remainder is dropped.
pub fn split_long_text(text: &str, max_len: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut remaining = text.trim();
    while remaining.chars().count() > max_len {
        let window_end = remaining
            .char_indices()
            .nth(max_len)
            .map_or(remaining.len(), |(idx, _)| idx);
        let cut = match remaining[..window_end].rfind(' ') {
            Some(idx) if idx > 0 => idx,
            _ => window_end,
        };
        let piece = remaining[..cut].trim_end();
        if !piece.is_empty() {
            parts.push(piece.to_string());
        }
        remaining = remaining[cut..].trim();
    }
    if !remaining.is_empty() {
        parts.push(remaining.to_string());
    }
    parts
}

/// Build the plain-text Q/A export of a session. Questions and answers are
/// numbered in pairs; the counter advances on each answer.
pub fn qa_export_text(messages: &[ChatMessage]) -> String {
    let mut lines = Vec::new();
    let mut index = 1;
    for msg in messages {
        match msg.role {
            Role::User => lines.push(format!("Q{index}: {}", msg.text)),
            Role::Bot => {
                lines.push(format!("A{index}: {}", msg.text));
                index += 1;
            }
        }
    }
    lines.join("\n\n")
}

/// Short label shown under an attachment chip.
pub fn chip_status_label(status: &AttachmentStatus) -> &'static str {
    match status {
        AttachmentStatus::Pending => "Waiting",
        AttachmentStatus::Uploading { .. } => "Uploading…",
        AttachmentStatus::Success { replaced: false } => "Done",
        AttachmentStatus::Success { replaced: true } => "Replaced",
        AttachmentStatus::Error { .. } => "Failed",
        AttachmentStatus::Canceled => "Canceled",
    }
}
