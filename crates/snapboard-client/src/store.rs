use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snapboard_core::constants::CAPTION_CONTEXT_KEY;
use snapboard_core::models::{normalize_tags, parse_ownership, Asset};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// 4xx other than 404/429. Retrying will not help.
    #[error("Request rejected by media store ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// 5xx or 429.
    #[error("Media store unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response from media store: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => StoreError::NotFound(message),
            429 | 500..=599 => StoreError::Unavailable { status, message },
            _ => StoreError::Rejected { status, message },
        }
    }

    /// Whether a later attempt of the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. } | StoreError::Transport(_)
        )
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            StoreError::from_status(status.as_u16(), err.to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
    pub folder: String,
    pub tags: Vec<String>,
    pub context: BTreeMap<String, String>,
}

/// New tags for an existing resource. Context keys present here are overwritten;
/// keys not mentioned keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceUpdate {
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub prefix: String,
    /// Every listed resource must carry all of these tags.
    pub tags: Vec<String>,
    pub max_results: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceContext {
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
}

/// Resource as reported by the media store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResource {
    pub public_id: String,
    pub secure_url: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub bytes: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: Option<ResourceContext>,
}

impl StoredResource {
    /// Stored description. An empty caption counts as none.
    pub fn caption(&self) -> Option<&str> {
        self.context
            .as_ref()
            .and_then(|c| c.custom.get(CAPTION_CONTEXT_KEY))
            .map(String::as_str)
            .filter(|c| !c.is_empty())
    }

    pub fn has_tags(&self, required: &[String]) -> bool {
        required.iter().all(|t| self.tags.contains(t))
    }

    /// Folder the resource lives in, from the explicit field or the public id path.
    pub fn folder_path(&self) -> String {
        match &self.folder {
            Some(folder) if !folder.is_empty() => folder.clone(),
            _ => self
                .public_id
                .rsplit_once('/')
                .map(|(folder, _)| folder.to_string())
                .unwrap_or_default(),
        }
    }

    /// Convert to an `Asset`. `None` when owner or game number cannot be recovered.
    pub fn to_asset(&self) -> Option<Asset> {
        let (owner_id, collection_id) = parse_ownership(&self.tags, &self.folder_path())?;
        Some(Asset {
            public_id: self.public_id.clone(),
            url: self.secure_url.clone(),
            format: self.format.clone(),
            width: self.width,
            height: self.height,
            bytes: self.bytes,
            created_at: self.created_at,
            tags: normalize_tags(self.tags.iter().cloned()),
            description: self.caption().map(str::to_string),
            owner_id,
            collection_id,
        })
    }
}

/// Media store abstraction
///
/// Implementations must be safe to share across tasks. Every method other than
/// `delivery_url` performs I/O against the store.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> StoreResult<StoredResource>;

    /// Replace tags and context of an existing resource.
    async fn update(&self, public_id: &str, update: ResourceUpdate)
        -> StoreResult<StoredResource>;

    async fn destroy(&self, public_id: &str) -> StoreResult<()>;

    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<StoredResource>>;

    /// Delivery URL with an optional transformation, passed through verbatim.
    fn delivery_url(&self, public_id: &str, transformation: Option<&str>) -> String;
}
