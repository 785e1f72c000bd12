use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{ApiError, BackendClient, UploadResponse};
use crate::models::AttachmentEntry;
use crate::services::cancellation::CancellationToken;

const NETWORK_FAILURE_MESSAGE: &str = "Network error during upload";

/// Drives attachment entries through their upload lifecycle against the
/// backend, wiring progress callbacks and cancellation into each attempt.
#[derive(Clone)]
pub struct UploadController {
    client: Arc<BackendClient>,
}

impl UploadController {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }

    /// Upload a single entry. Returns true only when the entry settled in
    /// `Success`. The entry is left untouched when it was not in a startable
    /// state or the pipeline was already cancelled.
    pub async fn upload(
        &self,
        entry: &AttachmentEntry,
        session_id: &str,
        pipeline: &CancellationToken,
    ) -> bool {
        if pipeline.is_cancelled() {
            return false;
        }
        if !entry.begin_upload() {
            return false;
        }

        let progress_entry = entry.clone();
        let entry_token = entry.cancel_token();
        let attempt = self.client.upload_file(entry.file(), session_id, move |pct| {
            progress_entry.set_progress(pct);
        });

        let result = tokio::select! {
            _ = pipeline.cancelled() => {
                entry.cancel();
                return false;
            }
            _ = entry_token.cancelled() => {
                // entry.cancel() already moved the status
                return false;
            }
            result = attempt => result,
        };

        match result {
            Ok((status, payload)) => {
                let accepted = (200..300).contains(&status)
                    && payload.as_ref().is_some_and(|p| p.ok);
                if accepted {
                    let replaced = payload.as_ref().is_some_and(|p| p.replaced);
                    entry.complete(replaced);
                    debug!(file = entry.file().name(), replaced, "upload accepted");
                    true
                } else {
                    let message =
                        failure_message(entry.file().name(), status, payload.as_ref());
                    warn!(file = entry.file().name(), status, %message, "upload rejected");
                    entry.fail(message);
                    false
                }
            }
            Err(ApiError::Cancelled) => {
                entry.cancel();
                false
            }
            Err(err) => {
                warn!(file = entry.file().name(), error = %err, "upload failed");
                entry.fail(NETWORK_FAILURE_MESSAGE);
                false
            }
        }
    }

    /// Upload all entries concurrently and join them. Returns true only when
    /// every entry succeeded.
    pub async fn upload_all(
        &self,
        entries: &[AttachmentEntry],
        session_id: &str,
        pipeline: &CancellationToken,
    ) -> bool {
        if pipeline.is_cancelled() {
            return false;
        }
        let attempts = entries
            .iter()
            .map(|entry| self.upload(entry, session_id, pipeline));
        futures::future::join_all(attempts)
            .await
            .into_iter()
            .all(|ok| ok)
    }
}

/// Pick the most specific failure text the response offers: the failed-file
/// entry matching this file's name (with its pipeline stage when present),
/// then the top-level error, then the message, then a generic HTTP fallback.
pub fn failure_message(filename: &str, status: u16, payload: Option<&UploadResponse>) -> String {
    if let Some(payload) = payload {
        if let Some(failed) = payload.failed.iter().find(|f| f.name == filename) {
            if let Some(reason) = &failed.reason {
                return match &failed.stage {
                    Some(stage) => format!("{reason} (stage: {stage})"),
                    None => reason.clone(),
                };
            }
        }
        if let Some(error) = &payload.error {
            return error.clone();
        }
        if let Some(message) = &payload.message {
            return message.clone();
        }
    }
    format!("Upload failed (HTTP {status})")
}
