use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::constants::{COLLECTION_TAG_PREFIX, OWNER_TAG_PREFIX};

/// A photo held by the media store.
///
/// The store is the source of truth; an `Asset` held locally is a snapshot and may be
/// stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub public_id: String,
    /// Secure delivery URL
    pub url: String,
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner_id: String,
    /// Game number
    pub collection_id: u32,
}

impl Asset {
    /// Replace the tag list, keeping first-seen order and dropping duplicates and blanks.
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = normalize_tags(tags);
    }

    /// Tags a user set, without the owner/collection bookkeeping tags.
    pub fn user_tags(&self) -> Vec<&str> {
        self.tags
            .iter()
            .map(String::as_str)
            .filter(|t| !is_system_tag(t))
            .collect()
    }
}

/// Trim, drop empties, and deduplicate while preserving first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.into();
        let tag = tag.trim();
        if tag.is_empty() || out.iter().any(|t| t == tag) {
            continue;
        }
        out.push(tag.to_string());
    }
    out
}

/// Store folder for one owner's game: `{root}/{owner}/game-{n}`.
pub fn collection_folder(root_folder: &str, owner_id: &str, collection_id: u32) -> String {
    format!(
        "{}/{}/game-{}",
        root_folder.trim_end_matches('/'),
        owner_id,
        collection_id
    )
}

/// Tags every stored asset carries so listings can recover owner and game.
pub fn system_tags(owner_id: &str, collection_id: u32) -> Vec<String> {
    vec![
        format!("{}{}", OWNER_TAG_PREFIX, owner_id),
        format!("{}{}", COLLECTION_TAG_PREFIX, collection_id),
    ]
}

pub fn is_system_tag(tag: &str) -> bool {
    tag.starts_with(OWNER_TAG_PREFIX) || tag.starts_with(COLLECTION_TAG_PREFIX)
}

/// Recover `(owner_id, collection_id)` from store tags, then from the folder path.
pub fn parse_ownership(tags: &[String], folder: &str) -> Option<(String, u32)> {
    let owner = tags
        .iter()
        .find_map(|t| t.strip_prefix(OWNER_TAG_PREFIX))
        .map(str::to_string);
    let collection = tags
        .iter()
        .find_map(|t| t.strip_prefix(COLLECTION_TAG_PREFIX))
        .and_then(|n| n.parse::<u32>().ok());

    if let (Some(owner), Some(collection)) = (owner.clone(), collection) {
        return Some((owner, collection));
    }

    // {root}/{owner}/game-{n}
    let mut segments = folder.trim_end_matches('/').rsplit('/');
    let game = segments.next()?.strip_prefix("game-")?.parse::<u32>().ok()?;
    let folder_owner = segments.next()?.to_string();
    Some((owner.unwrap_or(folder_owner), collection.unwrap_or(game)))
}

/// Gallery listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderQuery {
    pub owner_id: String,
    pub collection_id: u32,
    pub max_results: u32,
}

pub const DEFAULT_MAX_RESULTS: u32 = 100;
pub const MAX_RESULTS_LIMIT: u32 = 500;

/// Request body for updating one photo's tags and description.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePhotoRequest {
    #[validate(length(max = 50, message = "At most 50 tags are allowed"))]
    #[serde(default)]
    pub tags: Vec<String>,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
}

/// A single metadata write against the store.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataUpdate {
    pub public_id: String,
    pub tags: Vec<String>,
    pub description: Option<String>,
}
