use crate::error::{ErrorResponse, HttpAppError};
use crate::middleware::{audit, ClientIp};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use bytes::Bytes;
use serde::Serialize;
use snapboard_core::AppError;
use snapboard_infra::webhook::{Verification, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use snapboard_infra::WebhookNotification;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub verified: bool,
    /// Cache entries dropped because of this notification
    pub invalidated: usize,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Receive a change notification from the media store.
///
/// The body is verified against the raw bytes before it is parsed.
#[utoipa::path(
    post,
    path = "/api/v0/webhooks/media",
    tag = "webhooks",
    request_body(content = String, description = "Store notification JSON", content_type = "application/json"),
    responses(
        (status = 200, description = "Notification accepted", body = WebhookAck),
        (status = 400, description = "Malformed notification", body = ErrorResponse),
        (status = 401, description = "Signature missing, stale or wrong", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip_all, fields(operation = "media_webhook"))]
pub async fn media_webhook(
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    let client_ip = client_ip.map(|Extension(ClientIp(ip))| ip);

    let verification = match state.webhook_verifier.verify(
        header(&headers, SIGNATURE_HEADER),
        header(&headers, TIMESTAMP_HEADER),
        &body,
    ) {
        Ok(verification) => verification,
        Err(e) => {
            audit::log_webhook_rejected(client_ip, e.to_string());
            return Err(AppError::Unauthorized(e.to_string()).into());
        }
    };

    let notification: WebhookNotification = serde_json::from_slice(&body).map_err(|e| {
        AppError::InvalidInput(format!("Invalid webhook payload: {}", e))
    })?;

    let mut invalidated = 0;
    if notification.is_asset_change() {
        for public_id in notification.affected_public_ids() {
            invalidated += state.photos.invalidate_resource(&public_id);
        }
    }

    tracing::info!(
        notification_type = %notification.notification_type,
        invalidated,
        verified = verification == Verification::Verified,
        "Webhook processed"
    );

    Ok((
        StatusCode::OK,
        Json(WebhookAck {
            received: true,
            verified: verification == Verification::Verified,
            invalidated,
        }),
    ))
}
