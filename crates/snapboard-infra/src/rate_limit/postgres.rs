use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use std::time::Duration;

use super::{retry_after_secs, RateLimitDecision, RateLimitStore, RateLimitStoreError};

/// Fixed-window counters in the `rate_limit_counters` table.
///
/// Increment and window reset happen in a single upsert, so concurrent instances
/// observe a consistent count.
#[derive(Clone)]
pub struct PostgresRateLimitStore {
    pool: PgPool,
}

impl PostgresRateLimitStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete rows whose window ended more than one window ago.
    #[tracing::instrument(skip(self), fields(db.table = "rate_limit_counters", db.operation = "delete"))]
    pub async fn cleanup_expired(&self, window: Duration) -> Result<u64, RateLimitStoreError> {
        let result = sqlx::query(
            "DELETE FROM rate_limit_counters WHERE window_start < now() - make_interval(secs => $1)",
        )
        .bind(window.as_secs_f64() * 2.0)
        .execute(&self.pool)
        .await
        .map_err(|e| RateLimitStoreError::Backend(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RateLimitStore for PostgresRateLimitStore {
    #[tracing::instrument(skip(self), fields(db.table = "rate_limit_counters", db.operation = "upsert"))]
    async fn check_and_record(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        let (count, reset_in_secs) = sqlx::query_as::<Postgres, (i32, f64)>(
            r#"
            INSERT INTO rate_limit_counters (key, count, window_start)
            VALUES ($1, 1, now())
            ON CONFLICT (key) DO UPDATE SET
                count = CASE
                    WHEN rate_limit_counters.window_start <= now() - make_interval(secs => $2)
                    THEN 1
                    ELSE rate_limit_counters.count + 1
                END,
                window_start = CASE
                    WHEN rate_limit_counters.window_start <= now() - make_interval(secs => $2)
                    THEN now()
                    ELSE rate_limit_counters.window_start
                END
            RETURNING
                count,
                GREATEST(
                    EXTRACT(EPOCH FROM (window_start + make_interval(secs => $2) - now())),
                    0
                )::float8
            "#,
        )
        .bind(key)
        .bind(window.as_secs_f64())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RateLimitStoreError::Backend(e.to_string()))?;

        let count = count.max(0) as u32;
        if count > limit {
            Ok(RateLimitDecision::Rejected {
                retry_after_secs: retry_after_secs(Duration::from_secs_f64(reset_in_secs.max(0.0))),
            })
        } else {
            Ok(RateLimitDecision::Allowed {
                remaining: limit - count,
            })
        }
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
