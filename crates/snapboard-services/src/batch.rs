//! Batch metadata updates.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use snapboard_core::models::{
    normalize_tags, BatchItemFailure, BatchItemSuccess, BatchOperationResult, BatchStats,
    BatchUpdateRequest, MetadataOperation, MetadataUpdate,
};
use snapboard_core::{AppError, ErrorMetadata};

use crate::photos::PhotoService;

/// Applies many metadata updates in paced, concurrent sub-batches.
#[derive(Clone)]
pub struct BatchUpdater {
    photos: Arc<PhotoService>,
}

impl BatchUpdater {
    pub fn new(photos: Arc<PhotoService>) -> Self {
        Self { photos }
    }

    /// Apply every operation and report one outcome per operation.
    ///
    /// Only a malformed request fails as a whole. Operations inside a sub-batch run
    /// concurrently; a failing one never cancels its siblings.
    #[tracing::instrument(
        skip(self, request),
        fields(
            operations = request.operations.len(),
            dry_run = request.options.dry_run,
            batch_size = request.options.batch_size
        )
    )]
    pub async fn batch_update(
        &self,
        request: BatchUpdateRequest,
    ) -> Result<BatchOperationResult, AppError> {
        request.check()?;

        let options = request.options;
        let delay = Duration::from_millis(options.delay_between_batches);
        let start = Instant::now();

        let mut successful = Vec::new();
        let mut failed = Vec::new();
        let mut batches = 0;

        for (index, chunk) in request.operations.chunks(options.batch_size).enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            batches += 1;

            if options.dry_run {
                successful.extend(chunk.iter().map(dry_run_outcome));
                continue;
            }

            let outcomes = join_all(chunk.iter().map(|op| self.apply(op))).await;
            for (op, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(success) => successful.push(success),
                    Err(e) => {
                        tracing::debug!(public_id = %op.public_id, error = %e, "Batch item failed");
                        failed.push(BatchItemFailure {
                            public_id: op.public_id.clone(),
                            error: e.to_string(),
                            code: e.error_code().to_string(),
                        });
                    }
                }
            }
        }

        let total_ms = start.elapsed().as_millis() as u64;
        let stats = BatchStats::compute(successful.len(), failed.len(), total_ms, batches);

        tracing::info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            batches = stats.batches,
            total_ms = stats.total_ms,
            "Batch update finished"
        );

        Ok(BatchOperationResult {
            successful,
            failed,
            dry_run: options.dry_run,
            stats,
        })
    }

    async fn apply(&self, op: &MetadataOperation) -> Result<BatchItemSuccess, AppError> {
        let asset = self
            .photos
            .update_metadata(MetadataUpdate {
                public_id: op.public_id.clone(),
                tags: op.tags.clone(),
                description: op.description.clone(),
            })
            .await?;

        Ok(BatchItemSuccess {
            public_id: asset.public_id.clone(),
            tags: asset.user_tags().into_iter().map(str::to_string).collect(),
            description: asset.description,
        })
    }
}

fn dry_run_outcome(op: &MetadataOperation) -> BatchItemSuccess {
    BatchItemSuccess {
        public_id: op.public_id.clone(),
        tags: normalize_tags(op.tags.iter().cloned()),
        description: op.description.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photos::PhotoServiceConfig;
    use snapboard_client::test_helpers::{create_test_resource, MockMediaStore};
    use snapboard_client::StoreError;
    use snapboard_core::models::{BatchOptions, FolderQuery};
    use snapboard_infra::RetryPolicy;

    fn setup(count: usize) -> (MockMediaStore, Arc<PhotoService>, Vec<String>) {
        let store = MockMediaStore::new();
        let ids: Vec<String> = (0..count)
            .map(|i| {
                let id = format!("photos/alice/game-1/p{}", i);
                store.insert(create_test_resource(&id, &["user:alice", "game:1"]));
                id
            })
            .collect();
        let photos = Arc::new(PhotoService::new(
            Arc::new(store.clone()),
            PhotoServiceConfig {
                retry: RetryPolicy::immediate(0),
                ..Default::default()
            },
        ));
        (store, photos, ids)
    }

    fn request(ids: &[String], options: BatchOptions) -> BatchUpdateRequest {
        BatchUpdateRequest {
            operations: ids
                .iter()
                .map(|id| MetadataOperation {
                    public_id: id.clone(),
                    tags: vec!["keeper".to_string()],
                    description: Some("updated".to_string()),
                })
                .collect(),
            options,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_twenty_five_items_run_in_three_paced_batches() {
        let (store, photos, ids) = setup(25);
        let updater = BatchUpdater::new(photos);

        let start = Instant::now();
        let result = updater
            .batch_update(request(
                &ids,
                BatchOptions {
                    dry_run: false,
                    batch_size: 10,
                    delay_between_batches: 100,
                },
            ))
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(result.stats.batches, 3);
        assert_eq!(result.successful.len(), 25);
        assert!(result.failed.is_empty());
        assert_eq!(store.update_calls(), 25);
        // two gaps, none after the last batch
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_in_a_sub_batch_run_concurrently() {
        let store = MockMediaStore::new().with_latency(Duration::from_millis(100));
        let ids: Vec<String> = (0..10)
            .map(|i| {
                let id = format!("photos/alice/game-1/slow{}", i);
                store.insert(create_test_resource(&id, &["user:alice", "game:1"]));
                id
            })
            .collect();
        let photos = Arc::new(PhotoService::new(
            Arc::new(store.clone()),
            PhotoServiceConfig {
                retry: RetryPolicy::immediate(0),
                ..Default::default()
            },
        ));

        let start = Instant::now();
        let result = BatchUpdater::new(photos)
            .batch_update(request(
                &ids,
                BatchOptions {
                    dry_run: false,
                    batch_size: 10,
                    delay_between_batches: 0,
                },
            ))
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(result.successful.len(), 10);
        assert_eq!(result.stats.batches, 1);
        assert_eq!(store.update_calls(), 10);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_partial_failure_reports_every_item() {
        let (store, photos, ids) = setup(5);
        store.fail_update_of(
            &ids[2],
            StoreError::Rejected {
                status: 400,
                message: "bad tag".to_string(),
            },
        );
        let updater = BatchUpdater::new(photos);

        let result = updater
            .batch_update(request(
                &ids,
                BatchOptions {
                    delay_between_batches: 0,
                    ..Default::default()
                },
            ))
            .await
            .unwrap();

        assert_eq!(result.successful.len() + result.failed.len(), 5);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].public_id, ids[2]);
        assert_eq!(result.failed[0].code, "BAD_REQUEST");
        assert_eq!(result.stats.success_rate, 80.0);
        assert_eq!(result.successful[0].tags, vec!["keeper"]);
    }

    #[tokio::test]
    async fn test_missing_photo_fails_only_that_item() {
        let (_store, photos, mut ids) = setup(2);
        ids.push("photos/alice/game-1/ghost".to_string());
        let updater = BatchUpdater::new(photos);

        let result = updater
            .batch_update(request(&ids, BatchOptions::default()))
            .await
            .unwrap();

        assert_eq!(result.successful.len(), 2);
        assert_eq!(result.failed[0].code, "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_dry_run_never_calls_the_store() {
        let (store, photos, ids) = setup(12);
        let updater = BatchUpdater::new(photos);

        let mut req = request(
            &ids,
            BatchOptions {
                dry_run: true,
                batch_size: 5,
                delay_between_batches: 0,
            },
        );
        req.operations[0].tags = vec!["a".to_string(), "a".to_string(), " ".to_string()];

        let result = updater.batch_update(req).await.unwrap();

        assert!(result.dry_run);
        assert_eq!(result.successful.len(), 12);
        assert_eq!(result.stats.batches, 3);
        assert_eq!(result.successful[0].tags, vec!["a"]);
        assert_eq!(store.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_request_is_rejected_whole() {
        let (store, photos, mut ids) = setup(3);
        ids[1] = "  ".to_string();
        let updater = BatchUpdater::new(photos);

        let err = updater
            .batch_update(request(&ids, BatchOptions::default()))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(err.to_string().contains("operations[1]"));
        assert_eq!(store.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_updates_invalidate_cached_listing() {
        let (store, photos, ids) = setup(2);
        let query = FolderQuery {
            owner_id: "alice".to_string(),
            collection_id: 1,
            max_results: 100,
        };
        photos.fetch_photos_by_folder(&query).await.unwrap();

        BatchUpdater::new(photos.clone())
            .batch_update(request(&ids[..1], BatchOptions::default()))
            .await
            .unwrap();

        let listed = photos.fetch_photos_by_folder(&query).await.unwrap();
        assert_eq!(store.list_calls(), 2);
        assert!(listed
            .iter()
            .any(|a| a.description.as_deref() == Some("updated")));
    }
}
