use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("server reported failure")]
    Rejected,

    #[error("cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
