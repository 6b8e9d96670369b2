//! Verification of notifications pushed by the media store.
//!
//! Signature: hex HMAC-SHA256 over `"{timestamp}.{raw body}"`, sent in
//! `X-Webhook-Signature` (optionally prefixed `v1=`), with the Unix timestamp in
//! `X-Webhook-Timestamp`.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Missing X-Webhook-Signature header")]
    MissingSignature,

    #[error("Missing X-Webhook-Timestamp header")]
    MissingTimestamp,

    #[error("Invalid webhook timestamp")]
    InvalidTimestamp,

    #[error("Webhook timestamp outside tolerance ({age_secs}s)")]
    Expired { age_secs: i64 },

    #[error("Webhook signature mismatch")]
    Mismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    /// No secret configured; the payload was accepted unchecked.
    Unverified,
}

/// Hex HMAC-SHA256 of `"{timestamp}.{body}"`.
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
    ) -> Result<Verification, SignatureError> {
        self.verify_at(signature, timestamp, body, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
        now: i64,
    ) -> Result<Verification, SignatureError> {
        let Some(secret) = self.secret.as_deref() else {
            tracing::warn!("WEBHOOK_SECRET not configured, accepting unsigned webhook");
            return Ok(Verification::Unverified);
        };

        let signature = signature.ok_or(SignatureError::MissingSignature)?.trim();
        let signature = signature.strip_prefix("v1=").unwrap_or(signature);
        let timestamp: i64 = timestamp
            .ok_or(SignatureError::MissingTimestamp)?
            .trim()
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp)?;

        let age_secs = now - timestamp;
        if age_secs.unsigned_abs() > self.tolerance.as_secs() {
            return Err(SignatureError::Expired { age_secs });
        }

        let expected = sign_payload(secret, timestamp, body);
        if bool::from(expected.as_bytes().ct_eq(signature.to_lowercase().as_bytes())) {
            Ok(Verification::Verified)
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifiedResource {
    pub public_id: String,
}

/// Notification payload. Only the fields used for cache invalidation are read.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookNotification {
    pub notification_type: String,
    #[serde(default)]
    pub public_id: Option<String>,
    #[serde(default)]
    pub resources: Vec<NotifiedResource>,
}

impl WebhookNotification {
    /// Whether this notification changes an asset.
    pub fn is_asset_change(&self) -> bool {
        matches!(
            self.notification_type.as_str(),
            "upload" | "delete" | "update"
        )
    }

    /// Public ids touched by this notification.
    pub fn affected_public_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.public_id.iter().cloned().collect();
        for resource in &self.resources {
            if !ids.contains(&resource.public_id) {
                ids.push(resource.public_id.clone());
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_valid_signature_verifies() {
        let verifier = WebhookVerifier::new(Some("s3cret".to_string()));
        let body = br#"{"notification_type":"upload","public_id":"p1"}"#;
        let sig = sign_payload("s3cret", NOW, body);

        let ts = NOW.to_string();
        assert_eq!(
            verifier.verify_at(Some(sig.as_str()), Some(ts.as_str()), body, NOW + 10),
            Ok(Verification::Verified)
        );
        let prefixed = format!("v1={}", sig);
        assert_eq!(
            verifier.verify_at(Some(prefixed.as_str()), Some(ts.as_str()), body, NOW),
            Ok(Verification::Verified)
        );
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let verifier = WebhookVerifier::new(Some("s3cret".to_string()));
        let sig = sign_payload("s3cret", NOW, b"original");
        assert_eq!(
            verifier.verify_at(Some(sig.as_str()), Some(NOW.to_string().as_str()), b"tampered", NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_old_timestamp_is_rejected() {
        let verifier = WebhookVerifier::new(Some("s3cret".to_string()));
        let sig = sign_payload("s3cret", NOW, b"x");
        assert_eq!(
            verifier.verify_at(Some(sig.as_str()), Some(NOW.to_string().as_str()), b"x", NOW + 301),
            Err(SignatureError::Expired { age_secs: 301 })
        );
    }

    #[test]
    fn test_missing_headers() {
        let verifier = WebhookVerifier::new(Some("s3cret".to_string()));
        assert_eq!(
            verifier.verify_at(None, Some("1"), b"x", NOW),
            Err(SignatureError::MissingSignature)
        );
        assert_eq!(
            verifier.verify_at(Some("abc"), None, b"x", NOW),
            Err(SignatureError::MissingTimestamp)
        );
        assert_eq!(
            verifier.verify_at(Some("abc"), Some("yesterday"), b"x", NOW),
            Err(SignatureError::InvalidTimestamp)
        );
    }

    #[test]
    fn test_no_secret_accepts_unverified() {
        let verifier = WebhookVerifier::new(Some(String::new()));
        assert!(!verifier.has_secret());
        assert_eq!(
            verifier.verify_at(None, None, b"x", NOW),
            Ok(Verification::Unverified)
        );
    }

    #[test]
    fn test_notification_affected_ids() {
        let n: WebhookNotification = serde_json::from_str(
            r#"{"notification_type":"delete","resources":[{"public_id":"a"},{"public_id":"b"}]}"#,
        )
        .unwrap();
        assert!(n.is_asset_change());
        assert_eq!(n.affected_public_ids(), vec!["a", "b"]);

        let other: WebhookNotification =
            serde_json::from_str(r#"{"notification_type":"eager","public_id":"a"}"#).unwrap();
        assert!(!other.is_asset_change());
    }
}
