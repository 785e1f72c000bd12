use serde::Deserialize;

use crate::models::{ChatMessage, SessionMeta, SourceRef};

/// Retrieval/LLM knobs carried with every `/query` call.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Number of passages to retrieve, clamped to 1..=50 on send.
    pub k: u32,
    pub use_llm: bool,
    pub llm_extractive: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            k: 15,
            use_llm: true,
            llm_extractive: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub question: String,
    pub session_id: String,
    pub options: QueryOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub sources: Option<Vec<SourceRef>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

/// Application-level rejection of a question. The backend enriches the
/// "nothing indexed for this session" case with `message` and `suggestion`
/// fields; that shape is classified as an explicit kind instead of
/// pattern-matching free text.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRejection {
    NoDocuments {
        error: String,
        message: String,
        suggestion: String,
    },
    Other {
        error: String,
    },
}

impl QueryRejection {
    pub fn from_response(resp: &QueryResponse) -> Self {
        match (&resp.message, &resp.suggestion) {
            (Some(message), Some(suggestion)) => QueryRejection::NoDocuments {
                error: resp.error.clone().unwrap_or_default(),
                message: message.clone(),
                suggestion: suggestion.clone(),
            },
            _ => QueryRejection::Other {
                error: resp
                    .error
                    .clone()
                    .unwrap_or_else(|| "Request failed".to_string()),
            },
        }
    }

    pub fn is_no_documents(&self) -> bool {
        matches!(self, QueryRejection::NoDocuments { .. })
    }

    /// User-facing text, verbatim server wording.
    pub fn display_message(&self) -> String {
        match self {
            QueryRejection::NoDocuments {
                error,
                message,
                suggestion,
            } => format!("{error}\n\n{message}\n\n{suggestion}"),
            QueryRejection::Other { error } => error.clone(),
        }
    }
}

/// Result of a `/query` call that produced a well-formed response.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Answer {
        text: String,
        sources: Vec<SourceRef>,
    },
    Rejected(QueryRejection),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailedFile {
    pub name: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub replaced: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub failed: Vec<FailedFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub sessions: Vec<SessionMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OkResponse {
    #[serde(default)]
    pub ok: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentStats {
    pub name: String,
    #[serde(default)]
    pub chunks: u64,
    #[serde(default)]
    pub pages: u64,
    #[serde(default)]
    pub tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionStats {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub documents: Vec<DocumentStats>,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub total_chunks: u64,
    #[serde(default)]
    pub remaining_budget: u64,
    #[serde(default)]
    pub usage_percentage: f64,
}
