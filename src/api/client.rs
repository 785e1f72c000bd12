use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tracing::debug;

use super::error::{ApiError, ApiResult};
use super::types::{
    MessagesResponse, OkResponse, QueryOutcome, QueryRejection, QueryRequest, QueryResponse,
    SessionStats, SessionsResponse, UploadResponse,
};
use crate::models::{ChatMessage, FileRef, SessionMeta};
use crate::services::cancellation::CancellationToken;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Typed client for the document-QA backend. One instance is shared across
/// the upload controller, the session store and the chat controller.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Submit a question. Application rejections (`ok:false` payloads) are a
    /// well-formed outcome, not an error; only transport and decoding
    /// failures surface as `ApiError`.
    pub async fn query(
        &self,
        request: &QueryRequest,
        token: &CancellationToken,
    ) -> ApiResult<QueryOutcome> {
        let form = reqwest::multipart::Form::new()
            .text("question", request.question.clone())
            .text("k", request.options.k.clamp(1, 50).to_string())
            .text("use_llm", if request.options.use_llm { "1" } else { "0" })
            .text(
                "llm_extractive",
                if request.options.llm_extractive { "1" } else { "0" },
            )
            .text("session_id", request.session_id.clone());

        let send = async {
            let response = self
                .http
                .post(self.url("/query"))
                .multipart(form)
                .send()
                .await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            let payload: QueryResponse =
                serde_json::from_str(&body).map_err(|_| ApiError::Status(status))?;
            if !payload.ok {
                return Ok(QueryOutcome::Rejected(QueryRejection::from_response(
                    &payload,
                )));
            }
            match payload.answer {
                Some(text) => Ok(QueryOutcome::Answer {
                    text,
                    sources: payload.sources.unwrap_or_default(),
                }),
                None => Err(ApiError::Status(status)),
            }
        };

        tokio::select! {
            _ = token.cancelled() => Err(ApiError::Cancelled),
            result = send => result,
        }
    }

    /// Upload one file for indexing. Returns the HTTP status and the parsed
    /// payload when the body was well-formed JSON; status/message mapping is
    /// the upload controller's concern.
    pub async fn upload_file(
        &self,
        file: &FileRef,
        session_id: &str,
        progress: impl Fn(f32) + Send + Sync + 'static,
    ) -> ApiResult<(u16, Option<UploadResponse>)> {
        let bytes = file.bytes();
        let total = bytes.len();
        let body = reqwest::Body::wrap_stream(upload_progress_stream(bytes, progress));
        let part = reqwest::multipart::Part::stream_with_length(body, total as u64)
            .file_name(file.name().to_string())
            .mime_str("application/octet-stream")?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("session_id", session_id.to_string());

        let response = self
            .http
            .post(self.url("/index/batch"))
            .multipart(form)
            .send()
            .await?;
        let status = response.status().as_u16();
        let payload = response.text().await.ok().and_then(|body| {
            serde_json::from_str::<UploadResponse>(&body).ok()
        });
        Ok((status, payload))
    }

    /// Drop an indexed document from the session. Used both fire-and-forget
    /// (chip removal) and awaited (index panel).
    pub async fn remove_indexed(&self, filename: &str, session_id: &str) -> ApiResult<()> {
        let form = reqwest::multipart::Form::new()
            .text("filename", filename.to_string())
            .text("session_id", session_id.to_string());
        let response = self
            .http
            .post(self.url("/index/remove"))
            .multipart(form)
            .send()
            .await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(ApiError::Status(status));
        }
        let payload: OkResponse = serde_json::from_str(&response.text().await?)?;
        if payload.ok { Ok(()) } else { Err(ApiError::Rejected) }
    }

    pub async fn list_sessions(&self) -> ApiResult<Vec<SessionMeta>> {
        let response = self.http.get(self.url("/chat/history/list")).send().await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(ApiError::Status(status));
        }
        let payload: SessionsResponse = serde_json::from_str(&response.text().await?)?;
        if payload.ok {
            Ok(payload.sessions)
        } else {
            Err(ApiError::Rejected)
        }
    }

    pub async fn load_messages(&self, session_id: &str) -> ApiResult<Vec<ChatMessage>> {
        let response = self
            .http
            .get(self.url("/chat/history/load"))
            .query(&[("session_id", session_id)])
            .send()
            .await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(ApiError::Status(status));
        }
        let payload: MessagesResponse = serde_json::from_str(&response.text().await?)?;
        if payload.ok {
            Ok(payload.messages)
        } else {
            Err(ApiError::Rejected)
        }
    }

    /// Persist a session's full message list plus its metadata. Best-effort:
    /// the response body is ignored, only transport/status failures surface.
    pub async fn save_messages(
        &self,
        session_id: &str,
        messages_json: String,
        title: &str,
        timestamp: i64,
    ) -> ApiResult<()> {
        let form = reqwest::multipart::Form::new()
            .text("session_id", session_id.to_string())
            .text("messages", messages_json)
            .text("title", title.to_string())
            .text("timestamp", timestamp.to_string());
        let response = self
            .http
            .post(self.url("/chat/history/save"))
            .multipart(form)
            .send()
            .await?;
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(ApiError::Status(status))
        }
    }

    /// Delete a session's history and indexed content server-side.
    pub async fn remove_session(&self, session_id: &str) -> ApiResult<()> {
        let form =
            reqwest::multipart::Form::new().text("session_id", session_id.to_string());
        let response = self
            .http
            .post(self.url("/sessions/remove"))
            .multipart(form)
            .send()
            .await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(ApiError::Status(status));
        }
        let payload: OkResponse = serde_json::from_str(&response.text().await?)?;
        if payload.ok {
            debug!(session_id, "session removed from backend");
            Ok(())
        } else {
            Err(ApiError::Rejected)
        }
    }

    pub async fn session_stats(&self, session_id: &str) -> ApiResult<SessionStats> {
        let response = self
            .http
            .get(self.url(&format!("/sessions/{session_id}/stats")))
            .send()
            .await?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(ApiError::Status(status));
        }
        let payload: SessionStats = serde_json::from_str(&response.text().await?)?;
        if payload.ok { Ok(payload) } else { Err(ApiError::Rejected) }
    }
}

/// Chunk the file bytes into the request body, reporting cumulative progress
/// as a clamped percentage after each chunk.
fn upload_progress_stream(
    bytes: Arc<Vec<u8>>,
    progress: impl Fn(f32) + Send + Sync + 'static,
) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send {
    async_stream::stream! {
        let total = bytes.len();
        if total == 0 {
            progress(100.0);
            return;
        }
        let mut sent = 0usize;
        while sent < total {
            let end = (sent + UPLOAD_CHUNK_SIZE).min(total);
            let chunk = bytes[sent..end].to_vec();
            sent = end;
            let percent = (sent as f32 / total as f32) * 100.0;
            progress(percent.clamp(0.0, 100.0));
            yield Ok(chunk);
        }
    }
}
