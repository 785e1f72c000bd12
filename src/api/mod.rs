pub mod client;
pub mod error;
pub mod types;

pub use client::BackendClient;
pub use error::{ApiError, ApiResult};
pub use types::{
    DocumentStats, FailedFile, MessagesResponse, QueryOptions, QueryOutcome, QueryRejection,
    QueryRequest, QueryResponse, SessionStats, SessionsResponse, UploadResponse,
};
