mod error;
mod json_cache;
mod memory_cache;
mod session_cache;
mod session_store;

pub use error::{RepositoryError, RepositoryResult};
pub use json_cache::JsonSessionCache;
pub use memory_cache::InMemorySessionCache;
pub use session_cache::SessionCache;
pub use session_store::{SessionStore, sweep_invalid_questions};
