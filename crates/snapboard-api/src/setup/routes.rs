//! Route configuration and setup

use crate::constants::{
    API_PREFIX, DEFAULT_HTTP_CONCURRENCY_LIMIT, MAX_JSON_BODY_BYTES, WEBHOOK_PATH,
};
use crate::handlers;
use crate::middleware::rate_limit_middleware;
use crate::state::AppState;
use axum::{
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Json, Router,
};
use snapboard_core::Config;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    let cors = setup_cors(config)?;
    let limits = &state.rate_limits;

    let api = Router::new()
        .route(
            &format!("{}/photos", API_PREFIX),
            get(handlers::photos::list_photos),
        )
        .route_layer(from_fn_with_state(
            limits.api.clone(),
            rate_limit_middleware,
        ));

    let metadata = Router::new()
        .route(
            &format!("{}/photos/{{public_id}}", API_PREFIX),
            patch(handlers::photos::update_photo).delete(handlers::photos::delete_photo),
        )
        .route_layer(from_fn_with_state(
            limits.metadata.clone(),
            rate_limit_middleware,
        ));

    let batch = Router::new()
        .route(
            &format!("{}/photos/batch-update", API_PREFIX),
            post(handlers::batch::batch_update),
        )
        .route_layer(from_fn_with_state(
            limits.batch.clone(),
            rate_limit_middleware,
        ));

    let webhooks = Router::new()
        .route(WEBHOOK_PATH, post(handlers::webhooks::media_webhook))
        .route_layer(from_fn_with_state(
            limits.webhook.clone(),
            rate_limit_middleware,
        ));

    tracing::info!(
        http_concurrency_limit = DEFAULT_HTTP_CONCURRENCY_LIMIT,
        "HTTP concurrency limit layer enabled"
    );

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(api)
        .merge(metadata)
        .merge(batch)
        .merge(webhooks)
        .with_state(state)
        .route(
            "/api/openapi.json",
            get(|| async { Json(crate::api_doc::get_openapi_spec()) }),
        )
        .merge(utoipa_rapidoc::RapiDoc::new("/api/openapi.json").path("/docs"))
        .layer(ConcurrencyLimitLayer::new(DEFAULT_HTTP_CONCURRENCY_LIMIT))
        .layer(RequestBodyLimitLayer::new(MAX_JSON_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

/// Setup CORS configuration
fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    };
    Ok(cors)
}
