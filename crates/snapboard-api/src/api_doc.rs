//! OpenAPI documentation, served at `/api/openapi.json` and rendered at `/docs`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use snapboard_core::models;

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Snapboard API",
        version = "0.1.0",
        description = "Gallery listing, photo metadata and batch updates over the media store, plus the store's webhook receiver. Versioned endpoints live under /api/v0/."
    ),
    paths(
        handlers::health::health_check,
        handlers::photos::list_photos,
        handlers::photos::update_photo,
        handlers::photos::delete_photo,
        handlers::batch::batch_update,
        handlers::webhooks::media_webhook,
    ),
    components(
        schemas(
            models::Asset,
            models::UpdatePhotoRequest,
            models::MetadataOperation,
            models::BatchOptions,
            models::BatchUpdateRequest,
            models::BatchItemSuccess,
            models::BatchItemFailure,
            models::BatchStats,
            models::BatchOperationResult,
            handlers::health::HealthResponse,
            handlers::photos::PhotoListResponse,
            handlers::webhooks::WebhookAck,
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "photos", description = "Gallery listing and photo metadata"),
        (name = "webhooks", description = "Notifications pushed by the media store")
    )
)]
pub struct ApiDoc;
