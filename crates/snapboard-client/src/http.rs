//! reqwest implementation of `MediaStore`.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use snapboard_core::config::MediaStoreConfig;
use std::time::Duration;

use crate::store::{
    ListQuery, MediaStore, ResourceUpdate, StoreError, StoreResult, StoredResource, UploadRequest,
};

/// HTTP client for the media store API, authenticated with the account key pair.
#[derive(Clone, Debug)]
pub struct HttpMediaStore {
    client: Client,
    api_url: String,
    delivery_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    resources: Vec<StoredResource>,
}

impl HttpMediaStore {
    pub fn new(config: &MediaStoreConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            delivery_url: config.delivery_url.trim_end_matches('/').to_string(),
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}/{}{}", self.api_url, self.cloud_name, path)
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.api_key, Some(&self.api_secret))
    }

    async fn check_status(response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(StoreError::from_status(status.as_u16(), error_text))
    }
}

#[async_trait]
impl MediaStore for HttpMediaStore {
    #[tracing::instrument(skip(self, request), fields(filename = %request.filename, folder = %request.folder))]
    async fn upload(&self, request: UploadRequest) -> StoreResult<StoredResource> {
        let size = request.data.len();
        let part = reqwest::multipart::Part::bytes(request.data.to_vec())
            .file_name(request.filename.clone())
            .mime_str(&request.content_type)
            .map_err(|e| StoreError::Rejected {
                status: 400,
                message: format!("Invalid content type: {}", e),
            })?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("folder", request.folder)
            .text("tags", request.tags.join(","));

        if !request.context.is_empty() {
            let context = request
                .context
                .iter()
                .map(|(k, v)| format!("{}={}", k, v.replace('|', "\\|").replace('=', "\\=")))
                .collect::<Vec<_>>()
                .join("|");
            form = form.text("context", context);
        }

        let response = self
            .apply_auth(self.client.post(self.build_url("/image/upload")))
            .multipart(form)
            .send()
            .await?;
        let resource: StoredResource = Self::check_status(response).await?.json().await?;

        tracing::debug!(public_id = %resource.public_id, bytes = size, "Uploaded resource");
        Ok(resource)
    }

    #[tracing::instrument(skip(self, update))]
    async fn update(
        &self,
        public_id: &str,
        update: ResourceUpdate,
    ) -> StoreResult<StoredResource> {
        let url = self.build_url(&format!("/resources/image/upload/{}", public_id));
        let response = self
            .apply_auth(self.client.post(&url))
            .json(&update)
            .send()
            .await?;

        let resource: StoredResource = Self::check_status(response).await?.json().await?;
        Ok(resource)
    }

    #[tracing::instrument(skip(self))]
    async fn destroy(&self, public_id: &str) -> StoreResult<()> {
        let response = self
            .apply_auth(self.client.post(self.build_url("/image/destroy")))
            .json(&json!({ "public_id": public_id }))
            .send()
            .await?;

        let body: DestroyResponse = Self::check_status(response).await?.json().await?;
        match body.result.as_str() {
            "ok" => Ok(()),
            "not found" => Err(StoreError::NotFound(public_id.to_string())),
            other => Err(StoreError::InvalidResponse(format!(
                "Unexpected destroy result: {}",
                other
            ))),
        }
    }

    #[tracing::instrument(skip(self), fields(prefix = %query.prefix))]
    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<StoredResource>> {
        let response = self
            .apply_auth(self.client.get(self.build_url("/resources/image/upload")))
            .query(&[
                ("prefix", query.prefix.clone()),
                ("max_results", query.max_results.to_string()),
                ("tags", "true".to_string()),
                ("context", "true".to_string()),
            ])
            .send()
            .await?;

        let body: ListResponse = Self::check_status(response).await?.json().await?;
        let resources: Vec<StoredResource> = body
            .resources
            .into_iter()
            .filter(|r| r.has_tags(&query.tags))
            .collect();

        tracing::debug!(count = resources.len(), "Listed resources");
        Ok(resources)
    }

    fn delivery_url(&self, public_id: &str, transformation: Option<&str>) -> String {
        match transformation.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => format!(
                "{}/{}/image/upload/{}/{}",
                self.delivery_url, self.cloud_name, t, public_id
            ),
            None => format!(
                "{}/{}/image/upload/{}",
                self.delivery_url, self.cloud_name, public_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> HttpMediaStore {
        HttpMediaStore::new(&MediaStoreConfig {
            api_url: "https://api.media.test/v1_1/".to_string(),
            delivery_url: "https://res.media.test".to_string(),
            cloud_name: "demo".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            root_folder: "photos".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_build_url() {
        assert_eq!(
            store().build_url("/image/upload"),
            "https://api.media.test/v1_1/demo/image/upload"
        );
    }

    #[test]
    fn test_delivery_url_passes_transformation_through() {
        let store = store();
        assert_eq!(
            store.delivery_url("photos/a/game-1/x", Some("w_400,h_400,c_fill")),
            "https://res.media.test/demo/image/upload/w_400,h_400,c_fill/photos/a/game-1/x"
        );
        assert_eq!(
            store.delivery_url("photos/a/game-1/x", None),
            "https://res.media.test/demo/image/upload/photos/a/game-1/x"
        );
        assert_eq!(
            store.delivery_url("x", Some("  ")),
            "https://res.media.test/demo/image/upload/x"
        );
    }
}
