pub mod app_state;
pub mod attachment;
pub mod message;
pub mod session;

pub use app_state::AppState;
pub use attachment::{AttachmentEntry, AttachmentStatus, FileKind, FileRef};
pub use message::{ChatMessage, Role, SourceRef};
pub use session::{DEFAULT_SESSION_TITLE, MANUAL_TITLE_MAX_LEN, SessionMeta, generate_session_id};
