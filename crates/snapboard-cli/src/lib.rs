//! Helpers shared by the `snapboard` command-line uploader.

use anyhow::Context;
use bytes::Bytes;
use serde::Serialize;
use snapboard_core::constants::MAX_UPLOAD_RETRIES;
use snapboard_core::models::{UploadStatus, UploadTask};
use snapboard_services::{PendingFile, UploadError, UploadOrchestrator};
use std::path::Path;
use uuid::Uuid;

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// MIME type from the file extension. Unknown extensions are left for the
/// upload validator to reject.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

pub async fn read_pending_file(path: &Path) -> anyhow::Result<PendingFile> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(
        PendingFile::new(name, content_type_for(path), Bytes::from(data))
            .with_preview(path.display().to_string()),
    )
}

/// Retry every failed task until it completes or runs out of retries.
///
/// Returns the number of retry attempts made.
pub async fn retry_failed(orchestrator: &UploadOrchestrator) -> anyhow::Result<u32> {
    let failed: Vec<Uuid> = orchestrator
        .get_state()
        .await
        .tasks
        .iter()
        .filter(|t| t.status == UploadStatus::Error)
        .map(|t| t.id)
        .collect();

    let mut attempts = 0;
    for id in failed {
        for _ in 0..MAX_UPLOAD_RETRIES {
            match orchestrator.retry(id).await {
                Ok(task) => {
                    attempts += 1;
                    if task.status == UploadStatus::Completed {
                        break;
                    }
                }
                Err(UploadError::MaxRetriesExceeded { .. }) => break,
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(attempts)
}

/// One line of the upload report.
#[derive(Debug, Serialize, PartialEq)]
pub struct FileReport {
    pub file: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retries: u32,
}

impl From<&UploadTask> for FileReport {
    fn from(task: &UploadTask) -> Self {
        Self {
            file: task.file.name.clone(),
            status: task.status.to_string(),
            public_id: task.asset.as_ref().map(|a| a.public_id.clone()),
            url: task.asset.as_ref().map(|a| a.url.clone()),
            error: task.error.clone(),
            retries: task.retry_count,
        }
    }
}
