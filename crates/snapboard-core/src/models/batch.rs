use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::constants::{DEFAULT_BATCH_DELAY_MS, DEFAULT_BATCH_SIZE, MAX_BATCH_OPERATIONS};
use crate::error::AppError;

/// One metadata change inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetadataOperation {
    pub public_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptions {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Milliseconds to wait between sub-batches
    #[serde(default = "default_batch_delay")]
    pub delay_between_batches: u64,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_batch_delay() -> u64 {
    DEFAULT_BATCH_DELAY_MS
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: DEFAULT_BATCH_SIZE,
            delay_between_batches: DEFAULT_BATCH_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateRequest {
    pub operations: Vec<MetadataOperation>,
    #[serde(default)]
    pub options: BatchOptions,
}

impl BatchUpdateRequest {
    /// Structural checks. A request failing here is rejected whole; nothing is applied.
    pub fn check(&self) -> Result<(), AppError> {
        if self.operations.is_empty() {
            return Err(AppError::InvalidInput(
                "operations must contain at least one entry".to_string(),
            ));
        }
        if self.operations.len() > MAX_BATCH_OPERATIONS {
            return Err(AppError::InvalidInput(format!(
                "operations may contain at most {} entries, got {}",
                MAX_BATCH_OPERATIONS,
                self.operations.len()
            )));
        }
        if let Some(index) = self
            .operations
            .iter()
            .position(|op| op.public_id.trim().is_empty())
        {
            return Err(AppError::InvalidInput(format!(
                "operations[{}].publicId must not be empty",
                index
            )));
        }
        if self.options.batch_size == 0 {
            return Err(AppError::InvalidInput(
                "options.batchSize must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemSuccess {
    pub public_id: String,
    /// Tags as applied (or as they would be applied on a dry run)
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub public_id: String,
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Percentage rounded to two decimals
    pub success_rate: f64,
    pub total_ms: u64,
    pub average_ms_per_operation: f64,
    pub batches: usize,
}

impl BatchStats {
    pub fn compute(succeeded: usize, failed: usize, total_ms: u64, batches: usize) -> Self {
        let processed = succeeded + failed;
        let (success_rate, average_ms_per_operation) = if processed == 0 {
            (0.0, 0.0)
        } else {
            (
                round2(succeeded as f64 / processed as f64 * 100.0),
                round2(total_ms as f64 / processed as f64),
            )
        };
        Self {
            processed,
            succeeded,
            failed,
            success_rate,
            total_ms,
            average_ms_per_operation,
            batches,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchOperationResult {
    pub successful: Vec<BatchItemSuccess>,
    pub failed: Vec<BatchItemFailure>,
    pub dry_run: bool,
    pub stats: BatchStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(id: &str) -> MetadataOperation {
        MetadataOperation {
            public_id: id.to_string(),
            tags: vec!["a".to_string()],
            description: None,
        }
    }

    #[test]
    fn test_options_default_when_omitted() {
        let req: BatchUpdateRequest =
            serde_json::from_str(r#"{"operations":[{"publicId":"p1","tags":["x"]}]}"#).unwrap();
        assert_eq!(req.options, BatchOptions::default());
        assert_eq!(req.operations[0].public_id, "p1");
    }

    #[test]
    fn test_partial_options_fill_defaults() {
        let req: BatchUpdateRequest = serde_json::from_str(
            r#"{"operations":[{"publicId":"p1"}],"options":{"dryRun":true}}"#,
        )
        .unwrap();
        assert!(req.options.dry_run);
        assert_eq!(req.options.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(req.options.delay_between_batches, DEFAULT_BATCH_DELAY_MS);
    }

    #[test]
    fn test_check_rejects_malformed_requests() {
        let empty = BatchUpdateRequest {
            operations: vec![],
            options: BatchOptions::default(),
        };
        assert!(matches!(empty.check(), Err(AppError::InvalidInput(_))));

        let too_many = BatchUpdateRequest {
            operations: (0..101).map(|i| op(&format!("p{}", i))).collect(),
            options: BatchOptions::default(),
        };
        assert!(matches!(too_many.check(), Err(AppError::InvalidInput(_))));

        let blank = BatchUpdateRequest {
            operations: vec![op("p1"), op("  ")],
            options: BatchOptions::default(),
        };
        match blank.check() {
            Err(AppError::InvalidInput(msg)) => assert!(msg.contains("operations[1]")),
            other => panic!("unexpected: {:?}", other),
        }

        let zero_size = BatchUpdateRequest {
            operations: vec![op("p1")],
            options: BatchOptions {
                batch_size: 0,
                ..Default::default()
            },
        };
        assert!(zero_size.check().is_err());

        let max = BatchUpdateRequest {
            operations: (0..100).map(|i| op(&format!("p{}", i))).collect(),
            options: BatchOptions::default(),
        };
        assert!(max.check().is_ok());
    }

    #[test]
    fn test_stats_rounding() {
        let stats = BatchStats::compute(2, 1, 100, 1);
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.success_rate, 66.67);
        assert_eq!(stats.average_ms_per_operation, 33.33);

        let empty = BatchStats::compute(0, 0, 0, 0);
        assert_eq!(empty.success_rate, 0.0);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = BatchOperationResult {
            successful: vec![],
            failed: vec![],
            dry_run: true,
            stats: BatchStats::compute(0, 0, 0, 0),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["dryRun"], true);
        assert!(json["stats"].get("successRate").is_some());
        assert!(json["stats"].get("averageMsPerOperation").is_some());
    }
}
