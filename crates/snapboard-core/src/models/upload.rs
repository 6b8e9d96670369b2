use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

use super::asset::Asset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Error,
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadStatus::Pending => write!(f, "pending"),
            UploadStatus::Uploading => write!(f, "uploading"),
            UploadStatus::Completed => write!(f, "completed"),
            UploadStatus::Error => write!(f, "error"),
        }
    }
}

/// Descriptive facts about a file offered for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub content_type: String,
}

/// One file moving through the batch uploader. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTask {
    pub id: Uuid,
    pub file: FileInfo,
    /// Local preview reference (e.g. a file path or object URL)
    pub preview: Option<String>,
    pub status: UploadStatus,
    /// 0-100
    pub progress: u8,
    pub retry_count: u32,
    pub error: Option<String>,
    pub asset: Option<Asset>,
}

impl UploadTask {
    pub fn new(file: FileInfo, preview: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            preview,
            status: UploadStatus::Pending,
            progress: 0,
            retry_count: 0,
            error: None,
            asset: None,
        }
    }
}

/// Aggregate counters over every task in a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub failed: usize,
    /// Percent of the tasks pending at the start of the current run that have completed
    pub overall_progress: f64,
}

/// Snapshot of orchestrator state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadState {
    pub tasks: Vec<UploadTask>,
    pub progress: UploadProgress,
    pub is_uploading: bool,
}
