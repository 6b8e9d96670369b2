use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::middleware::{audit, ClientIp};
use crate::state::AppState;
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use snapboard_core::models::{
    Asset, FolderQuery, MetadataUpdate, UpdatePhotoRequest, DEFAULT_MAX_RESULTS,
    MAX_RESULTS_LIMIT,
};
use snapboard_core::AppError;
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListPhotosQuery {
    /// Owner whose gallery is listed
    pub user_id: String,
    /// Game number within the owner's gallery
    pub game_number: u32,
    /// Clamped to 1..=500
    #[serde(default)]
    pub max_results: Option<u32>,
}

impl ListPhotosQuery {
    fn into_folder_query(self) -> Result<FolderQuery, AppError> {
        let owner_id = self.user_id.trim().to_string();
        if owner_id.is_empty() || owner_id.contains('/') {
            return Err(AppError::InvalidInput(
                "userId must be a non-empty identifier without '/'".to_string(),
            ));
        }
        Ok(FolderQuery {
            owner_id,
            collection_id: self.game_number,
            max_results: self
                .max_results
                .unwrap_or(DEFAULT_MAX_RESULTS)
                .clamp(1, MAX_RESULTS_LIMIT),
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PhotoListResponse {
    pub photos: Vec<Asset>,
    pub count: usize,
}

#[utoipa::path(
    get,
    path = "/api/v0/photos",
    tag = "photos",
    params(ListPhotosQuery),
    responses(
        (status = 200, description = "Gallery for one owner's game, newest first", body = PhotoListResponse),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 502, description = "Media store unavailable", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, query), fields(operation = "list_photos"))]
pub async fn list_photos(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListPhotosQuery>, QueryRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Query(query) = query?;
    let folder_query = query.into_folder_query()?;

    let photos = state.photos.fetch_photos_by_folder(&folder_query).await?;

    Ok(Json(PhotoListResponse {
        count: photos.len(),
        photos,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/v0/photos/{public_id}",
    tag = "photos",
    params(
        ("public_id" = String, Path, description = "Store public id, percent-encoded ('/' as %2F)")
    ),
    request_body = UpdatePhotoRequest,
    responses(
        (status = 200, description = "Photo updated", body = Asset),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Photo not found", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 502, description = "Media store unavailable", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(public_id = %public_id, operation = "update_photo"))]
pub async fn update_photo(
    State(state): State<Arc<AppState>>,
    Path(public_id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdatePhotoRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    request.validate()?;

    let asset = state
        .photos
        .update_metadata(MetadataUpdate {
            public_id,
            tags: request.tags,
            description: request.description,
        })
        .await?;

    Ok(Json(asset))
}

#[utoipa::path(
    delete,
    path = "/api/v0/photos/{public_id}",
    tag = "photos",
    params(
        ("public_id" = String, Path, description = "Store public id, percent-encoded ('/' as %2F)")
    ),
    responses(
        (status = 204, description = "Photo deleted"),
        (status = 404, description = "Photo not found", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 502, description = "Media store unavailable", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, client_ip), fields(public_id = %public_id, operation = "delete_photo"))]
pub async fn delete_photo(
    State(state): State<Arc<AppState>>,
    Path(public_id): Path<String>,
    client_ip: Option<Extension<ClientIp>>,
) -> Result<impl IntoResponse, HttpAppError> {
    state.photos.delete(&public_id).await?;

    audit::log_photo_deleted(client_ip.map(|Extension(ClientIp(ip))| ip), &public_id);

    Ok(StatusCode::NO_CONTENT)
}
