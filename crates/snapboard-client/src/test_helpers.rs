//! In-memory `MediaStore` for tests

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::store::{
    ListQuery, MediaStore, ResourceContext, ResourceUpdate, StoreError, StoreResult,
    StoredResource, UploadRequest,
};

#[derive(Default)]
struct Failures {
    /// Uploads of these filenames always fail.
    upload_by_filename: HashMap<String, StoreError>,
    /// Updates of these public ids always fail.
    update_by_id: HashMap<String, StoreError>,
    /// The next N calls of any kind fail with the given error.
    next_calls: Vec<StoreError>,
}

/// Mock media store that keeps resources in memory
///
/// Supports failure injection per filename / public id, or for the next N calls,
/// and counts calls per operation for assertions.
#[derive(Clone, Default)]
pub struct MockMediaStore {
    resources: Arc<Mutex<HashMap<String, StoredResource>>>,
    failures: Arc<Mutex<Failures>>,
    latency: Option<Duration>,
    upload_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    destroy_calls: Arc<AtomicUsize>,
    list_calls: Arc<AtomicUsize>,
    sequence: Arc<AtomicUsize>,
}

impl MockMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each store call sleeps for `latency` before completing.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Insert a resource directly (bypasses call counters)
    pub fn insert(&self, resource: StoredResource) {
        self.resources
            .lock()
            .unwrap()
            .insert(resource.public_id.clone(), resource);
    }

    pub fn get(&self, public_id: &str) -> Option<StoredResource> {
        self.resources.lock().unwrap().get(public_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.resources.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fail_upload_of(&self, filename: &str, error: StoreError) {
        self.failures
            .lock()
            .unwrap()
            .upload_by_filename
            .insert(filename.to_string(), error);
    }

    pub fn fail_update_of(&self, public_id: &str, error: StoreError) {
        self.failures
            .lock()
            .unwrap()
            .update_by_id
            .insert(public_id.to_string(), error);
    }

    /// Fail the next `times` calls (any operation) with `error`.
    pub fn fail_next(&self, times: usize, error: StoreError) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..times {
            failures.next_calls.push(error.clone());
        }
    }

    pub fn clear_failures(&self) {
        *self.failures.lock().unwrap() = Failures::default();
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_next_failure(&self) -> Option<StoreError> {
        let mut failures = self.failures.lock().unwrap();
        if failures.next_calls.is_empty() {
            None
        } else {
            Some(failures.next_calls.remove(0))
        }
    }
}

fn format_from_content_type(content_type: &str) -> String {
    match content_type.rsplit('/').next().unwrap_or("bin") {
        "jpeg" => "jpg".to_string(),
        other => other.to_string(),
    }
}

/// A stored resource for fixtures.
pub fn create_test_resource(public_id: &str, tags: &[&str]) -> StoredResource {
    StoredResource {
        public_id: public_id.to_string(),
        secure_url: format!("https://mock.media/{}.jpg", public_id),
        format: "jpg".to_string(),
        width: 800,
        height: 600,
        bytes: 1024,
        created_at: Utc::now(),
        folder: public_id.rsplit_once('/').map(|(f, _)| f.to_string()),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        context: None,
    }
}

#[async_trait]
impl MediaStore for MockMediaStore {
    async fn upload(&self, request: UploadRequest) -> StoreResult<StoredResource> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(err) = self.take_next_failure() {
            return Err(err);
        }
        if let Some(err) = self
            .failures
            .lock()
            .unwrap()
            .upload_by_filename
            .get(&request.filename)
        {
            return Err(err.clone());
        }

        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        let stem = request
            .filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&request.filename);
        let public_id = format!("{}/{}_{}", request.folder, stem, n);
        let format = format_from_content_type(&request.content_type);

        let resource = StoredResource {
            secure_url: format!("https://mock.media/{}.{}", public_id, format),
            public_id: public_id.clone(),
            format,
            width: 800,
            height: 600,
            bytes: request.data.len() as u64,
            created_at: Utc::now(),
            folder: Some(request.folder.clone()),
            tags: request.tags.clone(),
            context: Some(ResourceContext {
                custom: request.context.clone(),
            }),
        };

        self.resources
            .lock()
            .unwrap()
            .insert(public_id, resource.clone());
        Ok(resource)
    }

    async fn update(
        &self,
        public_id: &str,
        update: ResourceUpdate,
    ) -> StoreResult<StoredResource> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(err) = self.take_next_failure() {
            return Err(err);
        }
        if let Some(err) = self.failures.lock().unwrap().update_by_id.get(public_id) {
            return Err(err.clone());
        }

        let mut resources = self.resources.lock().unwrap();
        let resource = resources
            .get_mut(public_id)
            .ok_or_else(|| StoreError::NotFound(public_id.to_string()))?;
        resource.tags = update.tags;
        if !update.context.is_empty() {
            resource
                .context
                .get_or_insert_with(ResourceContext::default)
                .custom
                .extend(update.context);
        }
        Ok(resource.clone())
    }

    async fn destroy(&self, public_id: &str) -> StoreResult<()> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(err) = self.take_next_failure() {
            return Err(err);
        }

        self.resources
            .lock()
            .unwrap()
            .remove(public_id)
            .ok_or_else(|| StoreError::NotFound(public_id.to_string()))?;
        Ok(())
    }

    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<StoredResource>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(err) = self.take_next_failure() {
            return Err(err);
        }

        let mut resources: Vec<StoredResource> = self
            .resources
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.public_id.starts_with(&query.prefix) && r.has_tags(&query.tags))
            .cloned()
            .collect();
        resources.sort_by(|a, b| a.public_id.cmp(&b.public_id));
        resources.truncate(query.max_results as usize);
        Ok(resources)
    }

    fn delivery_url(&self, public_id: &str, transformation: Option<&str>) -> String {
        match transformation {
            Some(t) => format!("https://mock.media/{}/{}", t, public_id),
            None => format!("https://mock.media/{}", public_id),
        }
    }
}
