//! Cache+retry facade over the media store.
//!
//! Reads go through a TTL response cache; every remote call goes through bounded
//! exponential-backoff retry. Writes invalidate the cache entries that depend on the
//! written resource before returning.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use snapboard_client::{ListQuery, MediaStore, ResourceUpdate, StoreError, UploadRequest};
use snapboard_core::constants::CAPTION_CONTEXT_KEY;
use snapboard_core::models::{
    collection_folder, is_system_tag, normalize_tags, parse_ownership, system_tags, Asset,
    FileInfo, FolderQuery, MetadataUpdate,
};
use snapboard_core::{AppError, Config};
use snapboard_infra::cache::DEFAULT_CACHE_CAPACITY;
use snapboard_infra::{cache_key, retry_with_backoff, ResponseCache, RetryError, RetryPolicy};

/// Per-call caching behaviour for [`PhotoService::execute`].
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub cacheable: bool,
    /// Falls back to the service default when `None`.
    pub ttl: Option<Duration>,
    /// Dependency keys; see [`resource_dependency`] and [`folder_dependency`].
    pub dependencies: Vec<String>,
}

impl CacheOptions {
    pub fn uncached() -> Self {
        Self::default()
    }

    pub fn cached(dependencies: Vec<String>) -> Self {
        Self {
            cacheable: true,
            ttl: None,
            dependencies,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Dependency key for a single resource.
pub fn resource_dependency(public_id: &str) -> String {
    format!("resource:{}", public_id)
}

/// Dependency key for everything listed under a folder.
pub fn folder_dependency(folder: &str) -> String {
    format!("folder:{}", folder.trim_end_matches('/'))
}

fn folder_of(public_id: &str) -> Option<&str> {
    public_id.rsplit_once('/').map(|(folder, _)| folder)
}

#[derive(Debug, Clone)]
pub struct PhotoServiceConfig {
    pub root_folder: String,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for PhotoServiceConfig {
    fn default() -> Self {
        Self {
            root_folder: "photos".to_string(),
            cache_ttl: Duration::from_secs(300),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

impl PhotoServiceConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root_folder: config.media_store.root_folder.clone(),
            cache_ttl: config.cache_ttl(),
            cache_capacity: config.cache_retry.cache_max_entries,
            retry: RetryPolicy::from_config(&config.cache_retry),
        }
    }
}

/// Photo operations against the media store with caching and retry.
pub struct PhotoService {
    store: Arc<dyn MediaStore>,
    cache: ResponseCache<serde_json::Value>,
    retry: RetryPolicy,
    root_folder: String,
}

impl PhotoService {
    pub fn new(store: Arc<dyn MediaStore>, config: PhotoServiceConfig) -> Self {
        Self {
            store,
            cache: ResponseCache::new(config.cache_ttl, config.cache_capacity),
            retry: config.retry,
            root_folder: config.root_folder,
        }
    }

    pub fn root_folder(&self) -> &str {
        &self.root_folder
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Number of live or not-yet-evicted cache entries.
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Run a store call through the cache and retry layers.
    ///
    /// A live cache entry short-circuits the call. Otherwise `f` is invoked through
    /// [`retry_with_backoff`] and a successful result is cached when `cacheable`.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        params: &[(&str, String)],
        f: F,
        options: CacheOptions,
    ) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let key = cache_key(operation, params);

        if options.cacheable {
            if let Some(cached) = self.cache.get(&key) {
                match serde_json::from_value::<T>(cached) {
                    Ok(value) => {
                        tracing::debug!(key = %key, "Cache hit");
                        return Ok(value);
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                        self.cache.invalidate(&key);
                    }
                }
            }
        }

        let value = retry_with_backoff(operation, &self.retry, f)
            .await
            .map_err(map_store_error)?;

        if options.cacheable {
            match serde_json::to_value(&value) {
                Ok(json) => self.cache.insert(key, json, options.ttl, options.dependencies),
                Err(e) => tracing::warn!(key = %key, error = %e, "Result not cacheable"),
            }
        }

        Ok(value)
    }

    /// Gallery listing for one owner's game, newest first.
    #[tracing::instrument(skip(self), fields(owner_id = %query.owner_id, collection_id = query.collection_id))]
    pub async fn fetch_photos_by_folder(&self, query: &FolderQuery) -> Result<Vec<Asset>, AppError> {
        let folder = collection_folder(&self.root_folder, &query.owner_id, query.collection_id);
        let list_query = ListQuery {
            prefix: format!("{}/", folder),
            tags: system_tags(&query.owner_id, query.collection_id),
            max_results: query.max_results,
        };

        let params = [
            ("folder", folder.clone()),
            ("max_results", query.max_results.to_string()),
        ];

        let store = self.store.clone();
        let mut assets: Vec<Asset> = self
            .execute(
                "list",
                &params,
                || {
                    let store = store.clone();
                    let list_query = list_query.clone();
                    async move {
                        let resources = store.list(&list_query).await?;
                        Ok::<_, StoreError>(
                            resources.iter().filter_map(|r| r.to_asset()).collect(),
                        )
                    }
                },
                CacheOptions::cached(vec![folder_dependency(&folder)]),
            )
            .await?;

        assets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(assets)
    }

    /// Replace an asset's user tags and, when given, its description.
    ///
    /// Owner and game tags are kept regardless of the supplied tag list, so the
    /// public id must carry the `{root}/{owner}/game-{n}` folder they are rebuilt
    /// from. A `None` description leaves the stored caption untouched; an empty one
    /// clears it.
    #[tracing::instrument(skip(self, update), fields(public_id = %update.public_id))]
    pub async fn update_metadata(&self, update: MetadataUpdate) -> Result<Asset, AppError> {
        let public_id = update.public_id.trim().to_string();
        if public_id.is_empty() {
            return Err(AppError::InvalidInput("publicId must not be empty".to_string()));
        }

        let resource_update = self.resource_update(&public_id, &update.tags, update.description)?;

        let store = self.store.clone();
        let id = public_id.clone();
        let resource = retry_with_backoff("update", &self.retry, || {
            let store = store.clone();
            let id = id.clone();
            let resource_update = resource_update.clone();
            async move { store.update(&id, resource_update).await }
        })
        .await
        .map_err(map_store_error)?;

        self.invalidate_resource(&public_id);
        self.cache
            .invalidate_resource(&folder_dependency(&resource.folder_path()));

        resource.to_asset().ok_or_else(|| {
            AppError::Internal(format!(
                "Media store returned {} without owner or game information",
                public_id
            ))
        })
    }

    fn resource_update(
        &self,
        public_id: &str,
        tags: &[String],
        description: Option<String>,
    ) -> Result<ResourceUpdate, AppError> {
        let (owner, collection) = folder_of(public_id)
            .and_then(|f| parse_ownership(&[], f))
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Cannot determine owner and game of {}; expected {}/<owner>/game-<n>/<name>",
                    public_id, self.root_folder
                ))
            })?;
        let mut all_tags = system_tags(&owner, collection);
        all_tags.extend(tags.iter().filter(|t| !is_system_tag(t)).cloned());

        let mut context = BTreeMap::new();
        if let Some(description) = description {
            context.insert(CAPTION_CONTEXT_KEY.to_string(), description.trim().to_string());
        }

        Ok(ResourceUpdate {
            tags: normalize_tags(all_tags),
            context,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, public_id: &str) -> Result<(), AppError> {
        let store = self.store.clone();
        let id = public_id.to_string();
        retry_with_backoff("destroy", &self.retry, || {
            let store = store.clone();
            let id = id.clone();
            async move { store.destroy(&id).await }
        })
        .await
        .map_err(map_store_error)?;

        self.invalidate_resource(public_id);
        tracing::info!(public_id = %public_id, "Photo deleted");
        Ok(())
    }

    /// Upload one file into an owner's game folder.
    ///
    /// Uploads are not retried here; the upload orchestrator exposes manual retry.
    #[tracing::instrument(skip(self, file, data), fields(file = %file.name))]
    pub async fn upload_photo(
        &self,
        owner_id: &str,
        collection_id: u32,
        file: &FileInfo,
        data: bytes::Bytes,
    ) -> Result<Asset, AppError> {
        let folder = collection_folder(&self.root_folder, owner_id, collection_id);
        let request = UploadRequest {
            filename: file.name.clone(),
            content_type: file.content_type.clone(),
            data,
            folder: folder.clone(),
            tags: system_tags(owner_id, collection_id),
            context: BTreeMap::new(),
        };

        let resource = self
            .store
            .upload(request)
            .await
            .map_err(|error| store_error_to_app("upload", 1, error))?;

        self.cache.invalidate_resource(&folder_dependency(&folder));

        resource.to_asset().ok_or_else(|| {
            AppError::Internal(format!(
                "Media store returned {} without owner or game information",
                resource.public_id
            ))
        })
    }

    /// Drop every cache entry that depends on `public_id` or on the folder it lives in.
    pub fn invalidate_resource(&self, public_id: &str) -> usize {
        let mut removed = self.cache.invalidate_resource(&resource_dependency(public_id));
        if let Some(folder) = folder_of(public_id) {
            removed += self.cache.invalidate_resource(&folder_dependency(folder));
        }
        removed
    }

    pub fn delivery_url(&self, public_id: &str, transformation: Option<&str>) -> String {
        self.store.delivery_url(public_id, transformation)
    }
}

/// Map a failed, retried store call to the domain error.
pub fn map_store_error(err: RetryError<StoreError>) -> AppError {
    let operation = err.operation().to_string();
    let attempts = err.attempts();
    store_error_to_app(&operation, attempts, err.into_inner())
}

fn store_error_to_app(operation: &str, attempts: u32, error: StoreError) -> AppError {
    match error {
        StoreError::NotFound(id) => AppError::NotFound(format!("Photo not found: {}", id)),
        StoreError::Rejected { message, .. } => AppError::BadRequest(message),
        error => AppError::RemoteStore {
            operation: operation.to_string(),
            attempts,
            message: error.to_string(),
        },
    }
}
