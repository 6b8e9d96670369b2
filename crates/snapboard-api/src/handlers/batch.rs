use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::middleware::{audit, ClientIp};
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Extension, Json};
use snapboard_core::models::{BatchOperationResult, BatchUpdateRequest};
use std::sync::Arc;

/// Apply up to 100 metadata updates.
///
/// A structurally valid request always answers 200; per-item failures are listed
/// in `failed`.
#[utoipa::path(
    post,
    path = "/api/v0/photos/batch-update",
    tag = "photos",
    request_body = BatchUpdateRequest,
    responses(
        (status = 200, description = "Batch processed", body = BatchOperationResult),
        (status = 400, description = "Malformed batch", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, client_ip, request), fields(operation = "batch_update"))]
pub async fn batch_update(
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
    ValidatedJson(request): ValidatedJson<BatchUpdateRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let result = state.batch.batch_update(request).await?;

    audit::log_batch_updated(
        client_ip.map(|Extension(ClientIp(ip))| ip),
        result.stats.processed,
        result.stats.failed,
        result.dry_run,
    );

    Ok(Json(result))
}
