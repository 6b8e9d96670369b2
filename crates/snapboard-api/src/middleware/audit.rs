//! Audit logging for security-relevant and destructive events:
//! - Rate limit violations
//! - Rejected webhook deliveries
//! - Photo deletions and batch metadata updates

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RateLimitExceeded,
    WebhookRejected,
    PhotoDeleted,
    BatchUpdated,
}

/// Structured audit log entry
#[derive(Debug, Serialize)]
pub struct AuditLogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: AuditEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_path: Option<String>,
    /// Event details (JSON object)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditLogEntry {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            client_ip: None,
            request_path: None,
            details: None,
            success: true,
            error_message: None,
        }
    }

    pub fn with_client_ip(mut self, client_ip: String) -> Self {
        self.client_ip = Some(client_ip);
        self
    }

    pub fn with_request_path(mut self, path: String) -> Self {
        self.request_path = Some(path);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failure
    pub fn with_failure(mut self, error_message: String) -> Self {
        self.success = false;
        self.error_message = Some(error_message);
        self
    }

    /// Emit the entry under the `audit` target so it can be filtered separately.
    pub fn log(&self) {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());

        if self.success {
            tracing::event!(
                target: "audit",
                tracing::Level::INFO,
                audit_entry = %json,
                event_type = ?self.event_type,
                client_ip = ?self.client_ip,
                success = self.success,
                "Security audit log"
            );
        } else {
            tracing::event!(
                target: "audit",
                tracing::Level::WARN,
                audit_entry = %json,
                event_type = ?self.event_type,
                client_ip = ?self.client_ip,
                success = self.success,
                error = ?self.error_message,
                "Security audit log - failure"
            );
        }
    }
}

pub fn log_rate_limit_exceeded(
    client_ip: String,
    request_path: String,
    purpose: &str,
    limit: u32,
) {
    AuditLogEntry::new(AuditEventType::RateLimitExceeded)
        .with_client_ip(client_ip)
        .with_request_path(request_path)
        .with_details(serde_json::json!({ "purpose": purpose, "limit": limit }))
        .with_failure("Rate limit exceeded".to_string())
        .log();
}

pub fn log_webhook_rejected(client_ip: Option<String>, reason: String) {
    let mut entry = AuditLogEntry::new(AuditEventType::WebhookRejected)
        .with_request_path(crate::constants::WEBHOOK_PATH.to_string());
    if let Some(ip) = client_ip {
        entry = entry.with_client_ip(ip);
    }
    entry.with_failure(reason).log();
}

pub fn log_photo_deleted(client_ip: Option<String>, public_id: &str) {
    let mut entry = AuditLogEntry::new(AuditEventType::PhotoDeleted)
        .with_details(serde_json::json!({ "public_id": public_id }));
    if let Some(ip) = client_ip {
        entry = entry.with_client_ip(ip);
    }
    entry.log();
}

pub fn log_batch_updated(
    client_ip: Option<String>,
    processed: usize,
    failed: usize,
    dry_run: bool,
) {
    let mut entry = AuditLogEntry::new(AuditEventType::BatchUpdated).with_details(
        serde_json::json!({ "processed": processed, "failed": failed, "dry_run": dry_run }),
    );
    if let Some(ip) = client_ip {
        entry = entry.with_client_ip(ip);
    }
    entry.log();
}
