use serde::{Deserialize, Serialize};

/// Who produced a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// Citation reference attached to a bot answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub filename: String,
    pub page: u32,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// One message in a session's ordered list. Append-only; the only mutation
/// ever applied after the fact is setting `no_docs_warning` on a user
/// question the backend rejected for lack of indexed documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceRef>>,
    #[serde(rename = "noDocsWarning", default, skip_serializing_if = "is_false")]
    pub no_docs_warning: bool,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            sources: None,
            no_docs_warning: false,
        }
    }

    pub fn bot(text: impl Into<String>, sources: Vec<SourceRef>) -> Self {
        Self {
            role: Role::Bot,
            text: text.into(),
            sources: if sources.is_empty() {
                None
            } else {
                Some(sources)
            },
            no_docs_warning: false,
        }
    }
}
