//! Service construction: media store client, rate limiter, photo facade.

use crate::state::AppState;
use anyhow::{Context, Result};
use snapboard_client::HttpMediaStore;
use snapboard_core::{Config, RateLimitBackend};
use snapboard_infra::rate_limit::PostgresRateLimitStore;
use snapboard_infra::{FailurePolicy, MemoryRateLimitStore, RateLimitStore, RateLimiter};
use snapboard_services::{PhotoService, PhotoServiceConfig};
use sqlx::postgres::PgPoolOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How often expired rate-limit counters are swept.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

pub async fn initialize_services(config: Config) -> Result<Arc<AppState>> {
    let store = HttpMediaStore::new(&config.media_store)
        .context("Failed to build media store client")?;
    let photos = Arc::new(PhotoService::new(
        Arc::new(store),
        PhotoServiceConfig::from_config(&config),
    ));

    let rate_limiter = Arc::new(setup_rate_limiter(&config).await?);

    tracing::info!(
        root_folder = %photos.root_folder(),
        cache_ttl_secs = config.cache_retry.cache_ttl_secs,
        cache_max_entries = config.cache_retry.cache_max_entries,
        max_retries = config.cache_retry.max_retries,
        "Photo service initialized"
    );

    Ok(Arc::new(AppState::new(config, photos, rate_limiter)))
}

/// Build the limiter for the configured backend and start its periodic cleanup.
async fn setup_rate_limiter(config: &Config) -> Result<RateLimiter> {
    let window = config.rate_limit_window();
    let failure_policy = if config.rate_limit.fail_open {
        FailurePolicy::Open
    } else {
        FailurePolicy::Closed
    };

    let store: Arc<dyn RateLimitStore> = match config.rate_limit.backend {
        RateLimitBackend::Memory => {
            let store = Arc::new(MemoryRateLimitStore::new());
            let cleanup = store.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
                loop {
                    interval.tick().await;
                    let removed = cleanup.cleanup_expired(window).await;
                    if removed > 0 {
                        tracing::debug!(removed, "Cleaned up expired rate limit keys");
                    }
                }
            });
            store
        }
        RateLimitBackend::Postgres => {
            let store = Arc::new(PostgresRateLimitStore::new(setup_database(config).await?));
            let cleanup = store.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
                loop {
                    interval.tick().await;
                    if let Err(e) = cleanup.cleanup_expired(window).await {
                        tracing::warn!(error = %e, "Rate limit counter cleanup failed");
                    }
                }
            });
            store
        }
    };

    tracing::info!(
        backend = store.backend_name(),
        window_ms = config.rate_limit.window_ms,
        failure_policy = ?failure_policy,
        api_per_window = config.rate_limit.api_per_window,
        metadata_per_window = config.rate_limit.metadata_per_window,
        batch_per_window = config.rate_limit.batch_per_window,
        "Rate limiting enabled"
    );

    Ok(RateLimiter::new(store, window, failure_policy))
}

/// Connect to Postgres and apply pending migrations.
async fn setup_database(config: &Config) -> Result<sqlx::PgPool> {
    let database_url = config
        .rate_limit
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set when RATE_LIMIT_BACKEND=postgres")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
