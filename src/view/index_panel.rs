use crate::api::{ApiResult, SessionStats};

/// What the indexed-documents side panel should show for the current
/// session.
#[derive(Debug, Clone)]
pub enum IndexPanelState {
    /// No session selected yet.
    NoSession,
    /// The session exists but nothing has been indexed into it.
    Empty,
    /// Stats could not be fetched.
    Error { message: String },
    /// Per-document stats plus the session totals.
    Loaded { stats: SessionStats },
}

impl IndexPanelState {
    pub fn from_stats(result: ApiResult<SessionStats>) -> Self {
        match result {
            Ok(stats) if stats.documents.is_empty() => IndexPanelState::Empty,
            Ok(stats) => IndexPanelState::Loaded { stats },
            Err(err) => IndexPanelState::Error {
                message: err.to_string(),
            },
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, IndexPanelState::Loaded { .. })
    }
}

/// One-line usage summary for the panel footer.
pub fn usage_summary(stats: &SessionStats) -> String {
    format!(
        "{} documents · {} chunks · {} tokens · {:.1}% used · {} remaining",
        stats.documents.len(),
        stats.total_chunks,
        stats.total_tokens,
        stats.usage_percentage,
        stats.remaining_budget,
    )
}
