//! Application setup and initialization

pub mod routes;
pub mod server;
pub mod services;

use crate::state::AppState;
use anyhow::Result;
use snapboard_core::Config;
use snapboard_infra::telemetry::LogFormat;
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    snapboard_infra::init_telemetry("snapboard-api", &config.environment, LogFormat::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!("Configuration loaded and validated successfully");

    let state = services::initialize_services(config).await?;
    let router = routes::setup_routes(&state.config, state.clone())?;

    Ok((state, router))
}
